//! Creation of new project and group access tokens.

use chrono::{DateTime, NaiveDate, Utc};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use url::Url;

use super::expiry::TokenLifetime;
use super::rescue;
use crate::errors::{Error, Result};
use crate::gitlab::{AccessLevel, CreateAccessToken, IssuerConnector, TokenIssuer, TokenOwner};
use crate::secrets::{SecretReference, SecretString};

/// How a failure to list existing tokens is treated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DuplicateCheck {
    /// Log the listing failure and create the token anyway
    #[default]
    BestEffort,
    /// Abort creation when existing tokens cannot be listed
    Strict,
}

#[derive(Debug, Clone, Copy)]
enum Namespace<'a> {
    Project(&'a str),
    Group(&'a str),
}

#[derive(Debug, Clone)]
pub struct CreateRequest {
    /// GitLab instance, e.g. `https://gitlab.com`
    pub base_url: Url,
    pub owner: TokenOwner,
    pub name: String,
    pub scopes: Vec<String>,
    pub access_level: AccessLevel,
    pub duration_days: i64,
    /// Must already exist and be readable; receives the new token
    pub destination: Arc<dyn SecretReference>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedToken {
    pub id: u64,
    pub name: String,
    pub expires_on: NaiveDate,
}

/// Creates access tokens with an admin token and stores them.
pub struct TokenCreator {
    connector: Arc<dyn IssuerConnector>,
    admin_token: SecretString,
    duplicate_check: DuplicateCheck,
    rescue_dir: PathBuf,
    clock: fn() -> DateTime<Utc>,
}

impl std::fmt::Debug for TokenCreator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenCreator")
            .field("duplicate_check", &self.duplicate_check)
            .field("rescue_dir", &self.rescue_dir)
            .finish()
    }
}

impl TokenCreator {
    pub fn new(connector: Arc<dyn IssuerConnector>, admin_token: SecretString) -> Self {
        Self {
            connector,
            admin_token,
            duplicate_check: DuplicateCheck::default(),
            rescue_dir: std::env::temp_dir(),
            clock: Utc::now,
        }
    }

    pub fn with_duplicate_check(mut self, duplicate_check: DuplicateCheck) -> Self {
        self.duplicate_check = duplicate_check;
        self
    }

    pub fn with_rescue_dir(mut self, dir: PathBuf) -> Self {
        self.rescue_dir = dir;
        self
    }

    pub fn with_clock(mut self, clock: fn() -> DateTime<Utc>) -> Self {
        self.clock = clock;
        self
    }

    /// Create a token and store it in `request.destination`.
    ///
    /// Nothing is created when validation fails, the destination cannot be
    /// read or a token with the same name exists. A token that was created
    /// but could not be stored is always written to a rescue file.
    pub async fn create(&self, request: &CreateRequest) -> Result<CreatedToken> {
        let lifetime = TokenLifetime::days(request.duration_days)?;
        if request.name.trim().is_empty() {
            return Err(Error::validation("a token name is required"));
        }
        if request.scopes.is_empty() {
            return Err(Error::validation("at least one scope is required"));
        }
        let namespace = match &request.owner {
            TokenOwner::Project(project) => Namespace::Project(project),
            TokenOwner::Group(group) => Namespace::Group(group),
            TokenOwner::Personal => {
                return Err(Error::validation(
                    "personal access tokens cannot be created, specify a project or a group",
                ));
            }
        };

        if let Err(e) = request.destination.read().await {
            return Err(Error::DestinationUnreadable {
                reference: request.destination.to_string(),
                source: Box::new(e),
            });
        }

        let admin = self.connector.connect(&request.base_url, &self.admin_token)?;
        self.ensure_unique(admin.as_ref(), namespace, request).await?;

        let body = CreateAccessToken {
            name: request.name.clone(),
            scopes: request.scopes.clone(),
            access_level: request.access_level,
            expires_at: lifetime.expires_on((self.clock)()),
        };
        let issued = match namespace {
            Namespace::Project(project) => admin.create_project_access_token(project, &body).await?,
            Namespace::Group(group) => admin.create_group_access_token(group, &body).await?,
        };
        let expires_on = issued.expires_at.unwrap_or(body.expires_at);

        if let Err(e) = request.destination.update(&issued.token, expires_on).await {
            warn!(error = %e, reference = %request.destination, "Failed to store the new token");
            rescue::rescue(&self.rescue_dir, &issued.token);
            return Err(Error::persistence(&request.destination, e));
        }

        info!(
            token = %issued.name,
            owner = %request.owner,
            access_level = %request.access_level,
            expires_on = %expires_on,
            reference = %request.destination,
            "Created access token"
        );
        Ok(CreatedToken { id: issued.id, name: issued.name, expires_on })
    }

    async fn ensure_unique(
        &self,
        admin: &dyn TokenIssuer,
        namespace: Namespace<'_>,
        request: &CreateRequest,
    ) -> Result<()> {
        let existing = match namespace {
            Namespace::Project(project) => admin.list_project_access_tokens(project).await,
            Namespace::Group(group) => admin.list_group_access_tokens(group).await,
        };

        match existing {
            Ok(tokens) if tokens.iter().any(|t| t.name == request.name) => {
                Err(Error::DuplicateToken { name: request.name.clone(), owner: request.owner.to_string() })
            }
            Ok(_) => Ok(()),
            Err(e) if self.duplicate_check == DuplicateCheck::BestEffort => {
                warn!(error = %e, owner = %request.owner, "Could not list existing access tokens, skipping duplicate check");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}
