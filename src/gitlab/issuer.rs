//! The token-issuing API as seen by the rotation and creation engines.

use async_trait::async_trait;
use chrono::NaiveDate;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

use super::client::GitLabClient;
use super::models::{AccessToken, CreateAccessToken, IssuedToken};
use crate::errors::Result;
use crate::secrets::SecretString;

/// Operations the engines need from the issuing authority.
#[async_trait]
pub trait TokenIssuer: Send + Sync {
    /// Metadata (id, name, scopes, expiry) of the authenticating token
    async fn current_access_token(&self) -> Result<AccessToken>;

    async fn rotate_personal_access_token(&self, id: u64, expires_at: NaiveDate) -> Result<IssuedToken>;

    async fn rotate_project_access_token(
        &self,
        project: &str,
        id: u64,
        expires_at: NaiveDate,
    ) -> Result<IssuedToken>;

    async fn rotate_group_access_token(
        &self,
        group: &str,
        id: u64,
        expires_at: NaiveDate,
    ) -> Result<IssuedToken>;

    async fn list_project_access_tokens(&self, project: &str) -> Result<Vec<AccessToken>>;

    async fn list_group_access_tokens(&self, group: &str) -> Result<Vec<AccessToken>>;

    async fn create_project_access_token(
        &self,
        project: &str,
        request: &CreateAccessToken,
    ) -> Result<IssuedToken>;

    async fn create_group_access_token(
        &self,
        group: &str,
        request: &CreateAccessToken,
    ) -> Result<IssuedToken>;
}

/// Builds an authenticated [`TokenIssuer`] for a base URL and token.
pub trait IssuerConnector: Send + Sync {
    fn connect(&self, base_url: &Url, token: &SecretString) -> Result<Arc<dyn TokenIssuer>>;
}

/// Connects to the GitLab REST API.
#[derive(Debug, Clone)]
pub struct GitLabConnector {
    timeout: Duration,
}

impl GitLabConnector {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl Default for GitLabConnector {
    fn default() -> Self {
        Self::new(super::client::DEFAULT_TIMEOUT)
    }
}

impl IssuerConnector for GitLabConnector {
    fn connect(&self, base_url: &Url, token: &SecretString) -> Result<Arc<dyn TokenIssuer>> {
        Ok(Arc::new(GitLabClient::new(base_url, token.clone(), self.timeout)?))
    }
}

#[async_trait]
impl TokenIssuer for GitLabClient {
    async fn current_access_token(&self) -> Result<AccessToken> {
        GitLabClient::current_access_token(self).await
    }

    async fn rotate_personal_access_token(&self, id: u64, expires_at: NaiveDate) -> Result<IssuedToken> {
        GitLabClient::rotate_personal_access_token(self, id, expires_at).await
    }

    async fn rotate_project_access_token(
        &self,
        project: &str,
        id: u64,
        expires_at: NaiveDate,
    ) -> Result<IssuedToken> {
        GitLabClient::rotate_project_access_token(self, project, id, expires_at).await
    }

    async fn rotate_group_access_token(
        &self,
        group: &str,
        id: u64,
        expires_at: NaiveDate,
    ) -> Result<IssuedToken> {
        GitLabClient::rotate_group_access_token(self, group, id, expires_at).await
    }

    async fn list_project_access_tokens(&self, project: &str) -> Result<Vec<AccessToken>> {
        GitLabClient::list_project_access_tokens(self, project).await
    }

    async fn list_group_access_tokens(&self, group: &str) -> Result<Vec<AccessToken>> {
        GitLabClient::list_group_access_tokens(self, group).await
    }

    async fn create_project_access_token(
        &self,
        project: &str,
        request: &CreateAccessToken,
    ) -> Result<IssuedToken> {
        GitLabClient::create_project_access_token(self, project, request).await
    }

    async fn create_group_access_token(
        &self,
        group: &str,
        request: &CreateAccessToken,
    ) -> Result<IssuedToken> {
        GitLabClient::create_group_access_token(self, group, request).await
    }
}
