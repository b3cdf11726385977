//! # gitlab-token-manager
//!
//! Creates and rotates GitLab personal, project and group access tokens
//! whose values live in external secret stores.
//!
//! ## Architecture
//!
//! ```text
//! CLI → Token engines (rotate / create) → GitLab REST API
//!            ↓
//!      Secret references (gitlab, op, gsm, ssm, arn, vault)
//! ```
//!
//! A token is addressed by a secret reference URL such as
//! `gsm:///my-project/gitlab-pat` or `op://Private/gitlab access token`.
//! The engines read the current token from the reference, ask GitLab for a
//! new one and write it back.
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use gitlab_token_manager::gitlab::{AdminClientCache, GitLabConnector, TokenOwner};
//! use gitlab_token_manager::secrets::{ReferenceContext, ReferenceFactory};
//! use gitlab_token_manager::tokens::{RotationRequest, Rotator};
//!
//! #[tokio::main]
//! async fn main() -> gitlab_token_manager::Result<()> {
//!     let admin_clients = Arc::new(AdminClientCache::from_env());
//!     let context = ReferenceContext::new(admin_clients, Duration::from_secs(30))?;
//!     let factory = ReferenceFactory::with_default_backends(context);
//!
//!     let request = RotationRequest {
//!         base_url: "https://gitlab.com".parse().expect("valid url"),
//!         owner: TokenOwner::Personal,
//!         duration_days: 30,
//!         token: factory.resolve("gsm:///gitlab-pat")?,
//!         admin_token: None,
//!     };
//!     Rotator::new(Arc::new(GitLabConnector::default())).rotate(&request).await?;
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod errors;
pub mod gitlab;
pub mod secrets;
pub mod tokens;

// Re-export commonly used types and traits
pub use errors::{Error, Result};
pub use secrets::{ReferenceFactory, SecretReference, SecretString};

/// Application version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name from Cargo.toml
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
