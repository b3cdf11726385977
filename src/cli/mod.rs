//! # Command Line Interface
//!
//! `read` prints a secret, `gitlab rotate` and `gitlab create` manage
//! access tokens. Secret references in the process environment are
//! resolved before any command runs.

pub mod config;
pub mod gitlab;
pub mod read;

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use crate::gitlab::AdminClientCache;
use crate::secrets::{apply_environment, ReferenceContext, ReferenceFactory};
use config::CliConfig;

#[derive(Parser)]
#[command(name = "gitlab-token-manager")]
#[command(about = "Create and rotate GitLab access tokens kept in secret stores")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to the configuration file
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Timeout in seconds for API calls and secret store commands
    #[arg(long, global = true)]
    pub timeout: Option<u64>,

    /// Allow plain http GitLab URLs
    #[arg(long, global = true, hide = true)]
    pub insecure_http: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Print the value stored in a secret reference
    Read {
        /// Secret reference URL
        url: String,
    },

    /// Manage GitLab access tokens
    Gitlab(gitlab::GitlabArgs),
}

/// State shared by the command handlers
pub struct CliContext {
    pub config: CliConfig,
    pub factory: ReferenceFactory,
    pub admin_clients: Arc<AdminClientCache>,
    pub timeout: Duration,
    pub insecure_http: bool,
}

/// Run CLI commands
pub async fn run_cli() -> anyhow::Result<()> {
    // Optional; a missing .env file is not an error.
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    initialise_logging(cli.verbose)?;

    let config = CliConfig::load(cli.config.as_deref())?;
    let timeout = config::resolve_timeout(cli.timeout, &config);

    let scheme = if cli.insecure_http { "http" } else { "https" };
    let admin_clients =
        Arc::new(AdminClientCache::from_env().with_scheme(scheme).with_timeout(timeout));
    let context = ReferenceContext::new(Arc::clone(&admin_clients), timeout)?;
    let factory = ReferenceFactory::with_default_backends(context);

    apply_environment(&factory)
        .await
        .context("Failed to resolve secret references in the environment")?;

    let ctx = CliContext { config, factory, admin_clients, timeout, insecure_http: cli.insecure_http };

    match cli.command {
        Commands::Read { url } => read::handle_read_command(&url, &ctx.factory).await?,
        Commands::Gitlab(args) => gitlab::handle_gitlab_command(args, &ctx).await?,
    }

    Ok(())
}

pub fn initialise_logging(verbose: bool) -> anyhow::Result<()> {
    let default_level = if verbose { "debug" } else { "info" };
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", default_level);
    }

    if tracing::subscriber::set_global_default(
        FmtSubscriber::builder()
            .with_env_filter(EnvFilter::from_default_env())
            .with_writer(std::io::stderr)
            .finish(),
    )
    .is_err()
    {
        // Subscriber already set elsewhere (e.g. integration tests); ignore.
    }
    Ok(())
}
