//! GitLab CI/CD variables as a secret store.
//!
//! `gitlab://<host>/projects/<id>/variables/<key>[?environment=<scope>]`
//! `gitlab://<host>/groups/<id>/variables/<key>`

use async_trait::async_trait;
use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;
use std::sync::Arc;
use tracing::debug;
use url::Url;

use crate::errors::{Error, Result};
use crate::gitlab::models::default_environment_scope;
use crate::gitlab::{AdminClientCache, GitLabClient};
use crate::secrets::factory::ReferenceContext;
use crate::secrets::reference::SecretReference;
use crate::secrets::types::SecretString;

const SCHEME: &str = "gitlab";
const ENVIRONMENT_PARAM: &str = "environment";

static VARIABLE_PATH_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^/(projects|groups)/(.+)/variables/([^/]+)$").unwrap());

#[derive(Debug, Clone, PartialEq, Eq)]
enum VariableOwner {
    Project(String),
    Group(String),
}

/// A project or group CI/CD variable
pub struct VariableReference {
    url: Url,
    host: String,
    owner: VariableOwner,
    key: String,
    environment_scope: Option<String>,
    clients: Arc<AdminClientCache>,
}

impl fmt::Debug for VariableReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VariableReference")
            .field("host", &self.host)
            .field("owner", &self.owner)
            .field("key", &self.key)
            .field("environment_scope", &self.environment_scope)
            .finish()
    }
}

impl fmt::Display for VariableReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.url.as_str())
    }
}

pub fn from_url(url: &Url, context: &ReferenceContext) -> Result<Arc<dyn SecretReference>> {
    Ok(Arc::new(VariableReference::parse(url, Arc::clone(&context.admin_clients))?))
}

fn decode(value: &str) -> Result<String> {
    urlencoding::decode(value)
        .map(|v| v.into_owned())
        .map_err(|_| Error::invalid_reference(SCHEME, format!("'{}' is not valid UTF-8", value)))
}

impl VariableReference {
    pub fn parse(url: &Url, clients: Arc<AdminClientCache>) -> Result<Self> {
        let host = clients
            .host_key(url)
            .ok_or_else(|| Error::invalid_reference(SCHEME, "a host name is required"))?;

        let captures = VARIABLE_PATH_REGEX.captures(url.path()).ok_or_else(|| {
            Error::invalid_reference(
                SCHEME,
                "expected gitlab://<host>/(projects|groups)/<id>/variables/<name>",
            )
        })?;
        let id = decode(&captures[2])?;
        let owner = match &captures[1] {
            "projects" => VariableOwner::Project(id),
            _ => VariableOwner::Group(id),
        };
        let key = decode(&captures[3])?;

        let mut environment_scope = None;
        for (name, value) in url.query_pairs() {
            if name != ENVIRONMENT_PARAM {
                return Err(Error::invalid_reference(
                    SCHEME,
                    format!("unsupported query parameter '{}', only 'environment' is allowed", name),
                ));
            }
            if environment_scope.is_some() {
                return Err(Error::invalid_reference(
                    SCHEME,
                    "the environment parameter may only be specified once",
                ));
            }
            environment_scope = Some(value.into_owned());
        }
        if matches!(owner, VariableOwner::Group(_)) {
            environment_scope = None;
        }

        Ok(Self { url: url.clone(), host, owner, key, environment_scope, clients })
    }

    fn client(&self) -> Result<Arc<GitLabClient>> {
        self.clients.get_client(&self.host, None)
    }

    /// Environment scope to address. Without an explicit scope the variable
    /// must exist in at most one scope.
    async fn resolve_scope(&self, client: &GitLabClient, project: &str) -> Result<String> {
        if let Some(scope) = &self.environment_scope {
            return Ok(scope.clone());
        }

        let scopes: Vec<String> = client
            .list_project_variables(project)
            .await?
            .into_iter()
            .filter(|v| v.key == self.key)
            .map(|v| v.environment_scope)
            .collect();

        match scopes.as_slice() {
            [] => Ok(default_environment_scope()),
            [only] => Ok(only.clone()),
            many => Err(Error::backend(
                "gitlab",
                format!(
                    "no environment scope was specified, but variable {} has multiple scopes: {}",
                    self.key,
                    many.join(", ")
                ),
            )),
        }
    }
}

#[async_trait]
impl SecretReference for VariableReference {
    async fn read(&self) -> Result<SecretString> {
        let client = self.client()?;
        let variable = match &self.owner {
            VariableOwner::Project(project) => {
                let scope = self.resolve_scope(&client, project).await?;
                client.project_variable(project, &self.key, &scope).await?
            }
            VariableOwner::Group(group) => client.group_variable(group, &self.key).await?,
        };
        debug!(reference = %self, "Read GitLab variable");
        Ok(variable.value)
    }

    async fn update(&self, value: &SecretString, _expires_on: NaiveDate) -> Result<()> {
        let client = self.client()?;
        match &self.owner {
            VariableOwner::Project(project) => {
                let scope = self.resolve_scope(&client, project).await?;
                client.update_project_variable(project, &self.key, value, &scope).await?;
            }
            VariableOwner::Group(group) => {
                client.update_group_variable(group, &self.key, value).await?;
            }
        }
        debug!(reference = %self, "Updated GitLab variable");
        Ok(())
    }

    fn scheme(&self) -> &'static str {
        SCHEME
    }
}
