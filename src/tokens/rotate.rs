//! Rotation of the access token held in a secret reference.

use chrono::{DateTime, NaiveDate, Utc};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use url::Url;

use super::expiry::TokenLifetime;
use super::rescue;
use crate::errors::{Error, Result};
use crate::gitlab::{AccessToken, IssuerConnector, TokenIssuer, TokenOwner};
use crate::secrets::{SecretReference, SecretString};

/// Scope a token needs to rotate itself
pub const SELF_ROTATION_SCOPE: &str = "api";

/// Which credential performs the rotation call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdminPolicy {
    /// A separate admin token was supplied
    Explicit,
    /// The token rotates itself, which requires the `api` scope
    SelfRotation,
}

impl AdminPolicy {
    pub fn select(has_admin_token: bool, current: &AccessToken) -> Result<Self> {
        if has_admin_token {
            Ok(AdminPolicy::Explicit)
        } else if current.has_scope(SELF_ROTATION_SCOPE) {
            Ok(AdminPolicy::SelfRotation)
        } else {
            Err(Error::PermissionDenied { token: current.name.clone() })
        }
    }
}

/// What to rotate and where the result goes.
#[derive(Debug, Clone)]
pub struct RotationRequest {
    /// GitLab instance, e.g. `https://gitlab.com`
    pub base_url: Url,
    pub owner: TokenOwner,
    pub duration_days: i64,
    /// Holds the current token and receives the new one
    pub token: Arc<dyn SecretReference>,
    /// Token used for the rotation call instead of the token itself,
    /// already read from its secret reference
    pub admin_token: Option<SecretString>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RotatedToken {
    pub id: u64,
    pub name: String,
    pub expires_on: NaiveDate,
}

/// Rotates tokens and writes them back to their secret reference.
pub struct Rotator {
    connector: Arc<dyn IssuerConnector>,
    rescue_dir: Option<PathBuf>,
    clock: fn() -> DateTime<Utc>,
}

impl std::fmt::Debug for Rotator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Rotator").field("rescue_dir", &self.rescue_dir).finish()
    }
}

impl Rotator {
    /// Rotator that writes a rescue file to the system temp directory when
    /// storing the new token fails
    pub fn new(connector: Arc<dyn IssuerConnector>) -> Self {
        Self { connector, rescue_dir: Some(std::env::temp_dir()), clock: Utc::now }
    }

    /// Rescue file directory, `None` disables the rescue file
    pub fn with_rescue_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.rescue_dir = dir;
        self
    }

    pub fn with_clock(mut self, clock: fn() -> DateTime<Utc>) -> Self {
        self.clock = clock;
        self
    }

    /// Rotate the token stored in `request.token`.
    ///
    /// The old token is invalid as soon as the rotate call succeeds. If the
    /// new token cannot be stored the result is a [`Error::Persistence`]
    /// and, when enabled, the token is in a rescue file.
    pub async fn rotate(&self, request: &RotationRequest) -> Result<RotatedToken> {
        let lifetime = TokenLifetime::days(request.duration_days)?;

        let token = request.token.read().await?;
        let token_client = self.connector.connect(&request.base_url, &token)?;

        let admin_client = request
            .admin_token
            .as_ref()
            .map(|admin_token| self.connector.connect(&request.base_url, admin_token))
            .transpose()?;

        let current = token_client.current_access_token().await?;
        match current.expires_at {
            Some(expires_at) => {
                info!(token = %current.name, expires_at = %expires_at, "Current access token will expire")
            }
            None => info!(token = %current.name, "Current access token does not expire"),
        }

        let issuer: Arc<dyn TokenIssuer> = match AdminPolicy::select(admin_client.is_some(), &current)? {
            AdminPolicy::Explicit => admin_client.unwrap_or(token_client),
            AdminPolicy::SelfRotation => token_client,
        };

        let expires_on = lifetime.expires_on((self.clock)());
        let issued = match &request.owner {
            TokenOwner::Personal => issuer.rotate_personal_access_token(current.id, expires_on).await?,
            TokenOwner::Project(project) => {
                issuer.rotate_project_access_token(project, current.id, expires_on).await?
            }
            TokenOwner::Group(group) => {
                issuer.rotate_group_access_token(group, current.id, expires_on).await?
            }
        };
        let expires_on = issued.expires_at.unwrap_or(expires_on);

        if let Err(e) = request.token.update(&issued.token, expires_on).await {
            warn!(error = %e, reference = %request.token, "Failed to store the rotated token");
            if let Some(dir) = &self.rescue_dir {
                rescue::rescue(dir, &issued.token);
            }
            return Err(Error::persistence(&request.token, e));
        }

        info!(
            token = %issued.name,
            owner = %request.owner,
            expires_on = %expires_on,
            reference = %request.token,
            "Rotated access token"
        );
        Ok(RotatedToken { id: issued.id, name: issued.name, expires_on })
    }
}
