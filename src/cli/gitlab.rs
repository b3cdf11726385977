//! `gitlab` command group: rotate and create access tokens

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use std::sync::Arc;
use tracing::info;

use super::config;
use super::CliContext;
use crate::gitlab::{AccessLevel, GitLabConnector, TokenOwner, GITLAB_TOKEN_ENV};
use crate::secrets::{SecretReference, SecretString};
use crate::tokens::{CreateRequest, DuplicateCheck, RotationRequest, Rotator, TokenCreator};

#[derive(Args, Debug)]
pub struct GitlabArgs {
    /// GitLab instance URL [default: https://gitlab.com]
    #[arg(long, global = true)]
    pub url: Option<String>,

    /// URL of the secret containing the admin token
    #[arg(long, global = true)]
    pub admin_token_url: Option<String>,

    #[command(subcommand)]
    pub command: GitlabCommands,
}

#[derive(Subcommand, Debug)]
pub enum GitlabCommands {
    /// Rotate the token stored in a secret store
    Rotate {
        /// Secret reference URL holding the token
        token_url: String,

        /// Validity of the rotated token in days [default: 30]
        #[arg(long)]
        duration: Option<i64>,

        /// Project the token belongs to
        #[arg(long, conflicts_with = "group")]
        project: Option<String>,

        /// Group the token belongs to
        #[arg(long)]
        group: Option<String>,

        /// Do not write the new token to a rescue file when storing it fails
        #[arg(long)]
        no_rescue: bool,
    },

    /// Create a project or group access token and store it in an existing secret
    Create {
        /// Secret reference URL to store the token in
        token_url: String,

        /// Name of the token
        #[arg(long)]
        name: String,

        /// Token scopes
        #[arg(long = "scope", value_delimiter = ',', default_value = "read_repository")]
        scopes: Vec<String>,

        /// Role of the token (guest, reporter, developer, maintainer, owner, ...)
        #[arg(long)]
        access_level: AccessLevel,

        /// Validity of the token in days [default: 30]
        #[arg(long)]
        duration: Option<i64>,

        /// Project the token belongs to
        #[arg(long, conflicts_with = "group", required_unless_present = "group")]
        project: Option<String>,

        /// Group the token belongs to
        #[arg(long)]
        group: Option<String>,

        /// Fail when existing tokens cannot be listed for the duplicate check
        #[arg(long)]
        strict: bool,
    },
}

pub async fn handle_gitlab_command(args: GitlabArgs, ctx: &CliContext) -> Result<()> {
    let base_url = config::resolve_base_url(args.url, &ctx.config, ctx.insecure_http)?;

    let admin_reference = config::resolve_admin_token_url(args.admin_token_url, &ctx.config)
        .map(|url| ctx.factory.resolve(&url))
        .transpose()
        .context("admin-token-url is not a valid secret reference url")?;

    // Read once; rotation only uses an explicitly referenced admin token.
    let explicit_admin_token = match &admin_reference {
        Some(reference) => Some(
            reference
                .read()
                .await
                .with_context(|| format!("Failed to read the admin token from {}", reference))?,
        ),
        None => None,
    };
    let admin_token = explicit_admin_token.clone().or_else(|| {
        std::env::var(GITLAB_TOKEN_ENV).ok().filter(|t| !t.is_empty()).map(SecretString::new)
    });

    if let Some(token) = &admin_token {
        let host = ctx.admin_clients.host_key(&base_url).unwrap_or_default();
        ctx.admin_clients
            .get_client(&host, Some(token))
            .context("Failed to initialise the GitLab admin client")?;
    }

    let connector = Arc::new(GitLabConnector::new(ctx.timeout));

    match args.command {
        GitlabCommands::Rotate { token_url, duration, project, group, no_rescue } => {
            let request = RotationRequest {
                base_url,
                owner: TokenOwner::from_target(project.as_deref(), group.as_deref())?,
                duration_days: config::resolve_duration(duration, &ctx.config),
                token: ctx.factory.resolve(&token_url)?,
                admin_token: explicit_admin_token,
            };
            let rescue_dir = (!no_rescue).then(|| config::resolve_rescue_dir(&ctx.config));
            let rotated = Rotator::new(connector).with_rescue_dir(rescue_dir).rotate(&request).await?;
            info!(token = %rotated.name, expires_on = %rotated.expires_on, "Rotation complete");
        }
        GitlabCommands::Create {
            token_url,
            name,
            scopes,
            access_level,
            duration,
            project,
            group,
            strict,
        } => {
            let admin_token = admin_token.with_context(|| {
                format!(
                    "An admin token is required to create tokens: set {} or --admin-token-url",
                    GITLAB_TOKEN_ENV
                )
            })?;
            let destination: Arc<dyn SecretReference> = ctx.factory.resolve(&token_url)?;
            let request = CreateRequest {
                base_url,
                owner: TokenOwner::from_target(project.as_deref(), group.as_deref())?,
                name,
                scopes,
                access_level,
                duration_days: config::resolve_duration(duration, &ctx.config),
                destination,
            };
            let check = if strict { DuplicateCheck::Strict } else { DuplicateCheck::BestEffort };
            let created = TokenCreator::new(connector, admin_token)
                .with_duplicate_check(check)
                .with_rescue_dir(config::resolve_rescue_dir(&ctx.config))
                .create(&request)
                .await?;
            info!(token = %created.name, expires_on = %created.expires_on, "Creation complete");
        }
    }
    Ok(())
}

