//! Google Secret Manager through its REST API.
//!
//! `gsm:///<name>` where name is one of:
//!
//! - `<secret>` (latest version, project from the environment)
//! - `<secret>/<version>` when the second part is a number or `latest`
//! - `<project>/<secret>`
//! - `<project>/<secret>/<version>`
//! - `projects/<project>/secrets/<secret>/versions/<version>`
//!
//! Access tokens come from `gcloud auth print-access-token`, or from
//! Application Default Credentials when built with the `gcp` feature.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::debug;
use url::Url;

use crate::errors::{Error, Result};
use crate::secrets::exec::CommandRunner;
use crate::secrets::factory::ReferenceContext;
use crate::secrets::reference::SecretReference;
use crate::secrets::types::SecretString;

const SCHEME: &str = "gsm";
const LATEST: &str = "latest";
const PROJECT_ENV_VARS: [&str; 2] = ["GOOGLE_CLOUD_PROJECT", "CLOUDSDK_CORE_PROJECT"];

static RESOURCE_NAME_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^projects/([^/]+)/secrets/([^/]+)/versions/([^/]+)$").unwrap()
});
static VERSION_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"^([0-9]+|latest)$").unwrap());

/// Secret version location. `project` is filled in at access time when the
/// URL did not name one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecretLocator {
    pub project: Option<String>,
    pub secret: String,
    pub version: String,
}

impl SecretLocator {
    pub fn parse(name: &str) -> Result<Self> {
        if let Some(captures) = RESOURCE_NAME_REGEX.captures(name) {
            return Ok(Self {
                project: Some(captures[1].to_string()),
                secret: captures[2].to_string(),
                version: captures[3].to_string(),
            });
        }

        let parts: Vec<&str> = name.split('/').collect();
        if parts.iter().any(|p| p.is_empty()) {
            return Err(Self::invalid(name));
        }
        let locator = match parts.as_slice() {
            [secret] => Self { project: None, secret: secret.to_string(), version: LATEST.into() },
            [secret, version] if VERSION_REGEX.is_match(version) => {
                Self { project: None, secret: secret.to_string(), version: version.to_string() }
            }
            [project, secret] => Self {
                project: Some(project.to_string()),
                secret: secret.to_string(),
                version: LATEST.into(),
            },
            [project, secret, version] => Self {
                project: Some(project.to_string()),
                secret: secret.to_string(),
                version: version.to_string(),
            },
            _ => return Err(Self::invalid(name)),
        };
        Ok(locator)
    }

    fn invalid(name: &str) -> Error {
        Error::invalid_reference(
            SCHEME,
            format!(
                "'{}' is not a secret name; expected [<project>/]<secret>[/<version>] or projects/<project>/secrets/<secret>/versions/<version>",
                name
            ),
        )
    }

    /// Fully qualified version resource name
    pub fn version_name(&self, project: &str) -> String {
        format!("projects/{}/secrets/{}/versions/{}", project, self.secret, self.version)
    }

    /// Fully qualified secret resource name
    pub fn secret_name(&self, project: &str) -> String {
        format!("projects/{}/secrets/{}", project, self.secret)
    }
}

#[derive(Debug, Deserialize)]
struct AccessResponse {
    payload: Payload,
}

#[derive(Debug, Serialize, Deserialize)]
struct Payload {
    data: String,
}

#[derive(Debug, Serialize)]
struct AddVersionRequest {
    payload: Payload,
}

#[derive(Debug)]
pub struct GoogleSecretReference {
    name: String,
    locator: SecretLocator,
    http: Client,
    endpoint: Url,
    commands: Arc<dyn CommandRunner>,
}

impl fmt::Display for GoogleSecretReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "gsm:///{}", self.name)
    }
}

pub fn from_url(url: &Url, context: &ReferenceContext) -> Result<Arc<dyn SecretReference>> {
    if url.host_str().is_some_and(|h| !h.is_empty()) {
        return Err(Error::invalid_reference(SCHEME, "expected gsm:///<name>, the host must be empty"));
    }
    let name = urlencoding::decode(url.path().trim_start_matches('/'))
        .map_err(|_| Error::invalid_reference(SCHEME, "secret name is not valid UTF-8"))?
        .into_owned();
    let locator = SecretLocator::parse(&name)?;
    Ok(Arc::new(GoogleSecretReference {
        name,
        locator,
        http: context.http.clone(),
        endpoint: context.gsm_endpoint.clone(),
        commands: Arc::clone(&context.commands),
    }))
}

impl GoogleSecretReference {
    async fn project(&self) -> Result<String> {
        if let Some(project) = &self.locator.project {
            return Ok(project.clone());
        }
        for var in PROJECT_ENV_VARS {
            if let Ok(project) = std::env::var(var) {
                if !project.trim().is_empty() {
                    return Ok(project.trim().to_string());
                }
            }
        }
        let args = ["config", "get-value", "project"].map(String::from);
        let project = self.commands.run("gcloud", &args).await?.trim().to_string();
        if project.is_empty() || project == "(unset)" {
            return Err(Error::config(format!(
                "no Google Cloud project in {} and none set in gcloud; name it in the reference",
                self
            )));
        }
        Ok(project)
    }

    fn url(&self, resource: &str) -> Result<Url> {
        let path = format!("v1/{}", resource);
        self.endpoint
            .join(&path)
            .map_err(|source| Error::InvalidUrl { url: format!("{}{}", self.endpoint, path), source })
    }

    async fn send<T: serde::de::DeserializeOwned>(&self, request: reqwest::RequestBuilder) -> Result<T> {
        let token = access_token(self.commands.as_ref()).await?;
        let response = request.bearer_auth(token.expose_secret()).send().await?;
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(Error::backend(
                "google secret manager",
                format!("{} returned {}: {}", self, status, message.trim()),
            ));
        }
        Ok(response.json::<T>().await?)
    }
}

#[async_trait]
impl SecretReference for GoogleSecretReference {
    async fn read(&self) -> Result<SecretString> {
        let project = self.project().await?;
        let url = self.url(&format!("{}:access", self.locator.version_name(&project)))?;
        let response: AccessResponse = self.send(self.http.get(url)).await?;
        let bytes = BASE64.decode(response.payload.data.as_bytes()).map_err(|e| {
            Error::backend("google secret manager", format!("payload of {} is not base64: {}", self, e))
        })?;
        let value = String::from_utf8(bytes).map_err(|_| {
            Error::backend("google secret manager", format!("payload of {} is not UTF-8", self))
        })?;
        debug!(reference = %self, "Read Google secret version");
        Ok(SecretString::new(value))
    }

    async fn update(&self, value: &SecretString, _expires_on: NaiveDate) -> Result<()> {
        let project = self.project().await?;
        let url = self.url(&format!("{}:addVersion", self.locator.secret_name(&project)))?;
        let body = AddVersionRequest {
            payload: Payload { data: BASE64.encode(value.expose_secret().as_bytes()) },
        };
        let _: serde_json::Value = self.send(self.http.post(url).json(&body)).await?;
        debug!(reference = %self, "Added Google secret version");
        Ok(())
    }

    fn scheme(&self) -> &'static str {
        SCHEME
    }
}

#[cfg(not(feature = "gcp"))]
async fn access_token(commands: &dyn CommandRunner) -> Result<SecretString> {
    let args = ["auth", "print-access-token"].map(String::from);
    let token = commands.run("gcloud", &args).await?;
    Ok(SecretString::new(token.trim()))
}

#[cfg(feature = "gcp")]
async fn access_token(_commands: &dyn CommandRunner) -> Result<SecretString> {
    use yup_oauth2::authenticator::ApplicationDefaultCredentialsTypes;
    use yup_oauth2::{ApplicationDefaultCredentialsAuthenticator, ApplicationDefaultCredentialsFlowOpts};

    const SCOPES: &[&str] = &["https://www.googleapis.com/auth/cloud-platform"];

    let opts = ApplicationDefaultCredentialsFlowOpts::default();
    let authenticator = match ApplicationDefaultCredentialsAuthenticator::builder(opts).await {
        ApplicationDefaultCredentialsTypes::InstanceMetadata(builder) => builder.build().await,
        ApplicationDefaultCredentialsTypes::ServiceAccount(builder) => builder.build().await,
    }
    .map_err(|e| Error::backend("google secret manager", format!("default credentials: {}", e)))?;

    let token = authenticator
        .token(SCOPES)
        .await
        .map_err(|e| Error::backend("google secret manager", format!("access token: {}", e)))?;
    token
        .token()
        .map(SecretString::new)
        .ok_or_else(|| Error::backend("google secret manager", "credentials returned no access token"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_locator_forms() {
        let l = SecretLocator::parse("gitlab-pat").unwrap();
        assert_eq!((l.project, l.version.as_str()), (None, "latest"));

        let l = SecretLocator::parse("gitlab-pat/3").unwrap();
        assert_eq!((l.project, l.version.as_str()), (None, "3"));

        let l = SecretLocator::parse("my-project/gitlab-pat").unwrap();
        assert_eq!(l.project.as_deref(), Some("my-project"));
        assert_eq!(l.secret, "gitlab-pat");
        assert_eq!(l.version, "latest");

        let l = SecretLocator::parse("p/s/7").unwrap();
        assert_eq!(l.version_name("p"), "projects/p/secrets/s/versions/7");

        let l = SecretLocator::parse("projects/p/secrets/s/versions/latest").unwrap();
        assert_eq!(l.project.as_deref(), Some("p"));
        assert_eq!(l.secret, "s");
    }

    #[test]
    fn test_numeric_suffix_in_secret_name_is_a_project_pair() {
        let l = SecretLocator::parse("ops/token2").unwrap();
        assert_eq!(l.project.as_deref(), Some("ops"));
        assert_eq!(l.secret, "token2");
    }

    #[test]
    fn test_rejects_bad_names() {
        assert!(SecretLocator::parse("").is_err());
        assert!(SecretLocator::parse("a/b/c/d").is_err());
        assert!(SecretLocator::parse("a//b").is_err());
    }
}
