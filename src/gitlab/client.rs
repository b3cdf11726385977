//! Authenticated client for the GitLab REST API (v4).

use chrono::NaiveDate;
use reqwest::{Client, Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;
use url::Url;

use super::models::{
    AccessToken, CreateAccessToken, IssuedToken, RotateAccessToken, UpdateVariable, Variable,
};
use crate::errors::{Error, Result};
use crate::secrets::SecretString;

const PRIVATE_TOKEN_HEADER: &str = "PRIVATE-TOKEN";
const NEXT_PAGE_HEADER: &str = "x-next-page";
const PER_PAGE: &str = "100";

/// Default request timeout for GitLab API calls
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// GitLab API client bound to one instance and one token.
#[derive(Debug, Clone)]
pub struct GitLabClient {
    client: Client,
    base_url: Url,
    api_url: Url,
    token: SecretString,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    message: Option<serde_json::Value>,
    #[serde(default)]
    error: Option<String>,
}

impl GitLabClient {
    /// Create a client for the instance at `base_url` (e.g. `https://gitlab.com`)
    pub fn new(base_url: &Url, token: SecretString, timeout: Duration) -> Result<Self> {
        if base_url.host_str().is_none() {
            return Err(Error::validation(format!("GitLab URL '{}' has no host", base_url)));
        }

        let mut base_url = base_url.clone();
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        let api_url = base_url
            .join("api/v4/")
            .map_err(|source| Error::InvalidUrl { url: base_url.to_string(), source })?;

        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self { client, base_url, api_url, token })
    }

    /// Instance URL this client talks to
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.api_url
            .join(path)
            .map_err(|source| Error::InvalidUrl { url: format!("{}{}", self.api_url, path), source })
    }

    fn request(&self, method: Method, path: &str) -> Result<RequestBuilder> {
        let url = self.endpoint(path)?;
        debug!("{} {}", method, url);
        Ok(self
            .client
            .request(method, url)
            .header(PRIVATE_TOKEN_HEADER, self.token.expose_secret()))
    }

    /// Check the status and deserialize the JSON body.
    ///
    /// Response bodies may contain token values and are never logged.
    async fn handle_response<T: DeserializeOwned>(response: Response) -> Result<T> {
        let status = response.status();
        debug!("Response status: {}", status);

        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let message = match serde_json::from_str::<ApiErrorBody>(&text) {
                Ok(ApiErrorBody { message: Some(serde_json::Value::String(m)), .. }) => m,
                Ok(ApiErrorBody { message: Some(other), .. }) => other.to_string(),
                Ok(ApiErrorBody { error: Some(e), .. }) => e,
                _ if text.is_empty() => status.canonical_reason().unwrap_or("").to_string(),
                _ => text,
            };
            return Err(Error::Api { status: status.as_u16(), message });
        }

        Ok(response.json::<T>().await?)
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str, query: &[(&str, &str)]) -> Result<T> {
        let response = self.request(Method::GET, path)?.query(query).send().await?;
        Self::handle_response(response).await
    }

    /// Follow `X-Next-Page` until the last page and concatenate the results.
    async fn get_all<T: DeserializeOwned>(&self, path: &str) -> Result<Vec<T>> {
        let mut items = Vec::new();
        let mut page = "1".to_string();
        loop {
            let response = self
                .request(Method::GET, path)?
                .query(&[("per_page", PER_PAGE), ("page", page.as_str())])
                .send()
                .await?;
            let next = response
                .headers()
                .get(NEXT_PAGE_HEADER)
                .and_then(|v| v.to_str().ok())
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty());
            let mut batch: Vec<T> = Self::handle_response(response).await?;
            items.append(&mut batch);
            match next {
                Some(next) if next != page => page = next,
                _ => return Ok(items),
            }
        }
    }

    // === Access tokens ===

    /// Metadata of the token this client authenticates with
    pub async fn current_access_token(&self) -> Result<AccessToken> {
        self.get_json("personal_access_tokens/self", &[]).await
    }

    pub async fn rotate_personal_access_token(
        &self,
        token_id: u64,
        expires_at: NaiveDate,
    ) -> Result<IssuedToken> {
        self.rotate(&format!("personal_access_tokens/{}/rotate", token_id), expires_at).await
    }

    pub async fn rotate_project_access_token(
        &self,
        project: &str,
        token_id: u64,
        expires_at: NaiveDate,
    ) -> Result<IssuedToken> {
        let path = format!("projects/{}/access_tokens/{}/rotate", encode_id(project), token_id);
        self.rotate(&path, expires_at).await
    }

    pub async fn rotate_group_access_token(
        &self,
        group: &str,
        token_id: u64,
        expires_at: NaiveDate,
    ) -> Result<IssuedToken> {
        let path = format!("groups/{}/access_tokens/{}/rotate", encode_id(group), token_id);
        self.rotate(&path, expires_at).await
    }

    async fn rotate(&self, path: &str, expires_at: NaiveDate) -> Result<IssuedToken> {
        let response = self
            .request(Method::POST, path)?
            .json(&RotateAccessToken { expires_at })
            .send()
            .await?;
        Self::handle_response(response).await
    }

    pub async fn list_project_access_tokens(&self, project: &str) -> Result<Vec<AccessToken>> {
        self.get_all(&format!("projects/{}/access_tokens", encode_id(project))).await
    }

    pub async fn list_group_access_tokens(&self, group: &str) -> Result<Vec<AccessToken>> {
        self.get_all(&format!("groups/{}/access_tokens", encode_id(group))).await
    }

    pub async fn create_project_access_token(
        &self,
        project: &str,
        request: &CreateAccessToken,
    ) -> Result<IssuedToken> {
        let path = format!("projects/{}/access_tokens", encode_id(project));
        let response = self.request(Method::POST, &path)?.json(request).send().await?;
        Self::handle_response(response).await
    }

    pub async fn create_group_access_token(
        &self,
        group: &str,
        request: &CreateAccessToken,
    ) -> Result<IssuedToken> {
        let path = format!("groups/{}/access_tokens", encode_id(group));
        let response = self.request(Method::POST, &path)?.json(request).send().await?;
        Self::handle_response(response).await
    }

    // === CI/CD variables ===

    pub async fn list_project_variables(&self, project: &str) -> Result<Vec<Variable>> {
        self.get_all(&format!("projects/{}/variables", encode_id(project))).await
    }

    pub async fn project_variable(
        &self,
        project: &str,
        key: &str,
        environment_scope: &str,
    ) -> Result<Variable> {
        let path = format!("projects/{}/variables/{}", encode_id(project), encode_id(key));
        self.get_json(&path, &[("filter[environment_scope]", environment_scope)]).await
    }

    pub async fn update_project_variable(
        &self,
        project: &str,
        key: &str,
        value: &SecretString,
        environment_scope: &str,
    ) -> Result<Variable> {
        let path = format!("projects/{}/variables/{}", encode_id(project), encode_id(key));
        let response = self
            .request(Method::PUT, &path)?
            .query(&[("filter[environment_scope]", environment_scope)])
            .json(&UpdateVariable { value: value.expose_secret() })
            .send()
            .await?;
        Self::handle_response(response).await
    }

    pub async fn group_variable(&self, group: &str, key: &str) -> Result<Variable> {
        let path = format!("groups/{}/variables/{}", encode_id(group), encode_id(key));
        self.get_json(&path, &[]).await
    }

    pub async fn update_group_variable(
        &self,
        group: &str,
        key: &str,
        value: &SecretString,
    ) -> Result<Variable> {
        let path = format!("groups/{}/variables/{}", encode_id(group), encode_id(key));
        let response = self
            .request(Method::PUT, &path)?
            .json(&UpdateVariable { value: value.expose_secret() })
            .send()
            .await?;
        Self::handle_response(response).await
    }
}

/// Encode a numeric id or a namespaced path as one path segment
fn encode_id(id: &str) -> String {
    urlencoding::encode(id).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(base: &str) -> GitLabClient {
        GitLabClient::new(&Url::parse(base).unwrap(), SecretString::new("t"), DEFAULT_TIMEOUT)
            .unwrap()
    }

    #[test]
    fn test_api_url_from_base() {
        assert_eq!(client("https://gitlab.com").api_url.as_str(), "https://gitlab.com/api/v4/");
        assert_eq!(
            client("https://example.com/gitlab").api_url.as_str(),
            "https://example.com/gitlab/api/v4/"
        );
    }

    #[test]
    fn test_namespaced_project_stays_one_segment() {
        let c = client("https://gitlab.com");
        let url = c.endpoint(&format!("projects/{}/access_tokens", encode_id("group/app"))).unwrap();
        assert_eq!(url.as_str(), "https://gitlab.com/api/v4/projects/group%2Fapp/access_tokens");
    }

    #[test]
    fn test_rejects_url_without_host() {
        let url = Url::parse("file:///tmp/x").unwrap();
        assert!(GitLabClient::new(&url, SecretString::new("t"), DEFAULT_TIMEOUT).is_err());
    }
}
