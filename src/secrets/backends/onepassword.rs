//! 1Password items of category API Credential, driven through the `op` CLI.
//!
//! `op://<vault>/<item>` or `op:///<vault>/<item>`

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveTime};
use serde::Deserialize;
use std::fmt;
use std::sync::Arc;
use tracing::debug;
use url::Url;

use crate::errors::{Error, Result};
use crate::secrets::exec::CommandRunner;
use crate::secrets::factory::ReferenceContext;
use crate::secrets::reference::SecretReference;
use crate::secrets::types::SecretString;

const SCHEME: &str = "op";
const PROGRAM: &str = "op";
const CATEGORY: &str = "API_CREDENTIAL";
const CREDENTIAL_FIELD: &str = "credential";
const EXPIRES_FIELD: &str = "expires";

#[derive(Debug, Deserialize)]
struct Item {
    category: String,
    #[serde(default)]
    fields: Vec<Field>,
}

#[derive(Debug, Deserialize)]
struct Field {
    #[serde(default)]
    label: Option<String>,
    #[serde(default)]
    value: Option<String>,
}

#[derive(Debug)]
pub struct OnePasswordReference {
    vault: String,
    item: String,
    commands: Arc<dyn CommandRunner>,
}

impl fmt::Display for OnePasswordReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "op://{}/{}",
            urlencoding::encode(&self.vault),
            urlencoding::encode(&self.item)
        )
    }
}

pub fn from_url(url: &Url, context: &ReferenceContext) -> Result<Arc<dyn SecretReference>> {
    Ok(Arc::new(OnePasswordReference::parse(url, Arc::clone(&context.commands))?))
}

impl OnePasswordReference {
    pub fn parse(url: &Url, commands: Arc<dyn CommandRunner>) -> Result<Self> {
        let invalid = || {
            Error::invalid_reference(SCHEME, "expected op://<vault>/<item name or id>")
        };
        let segments: Vec<String> = url
            .path()
            .split('/')
            .filter(|s| !s.is_empty())
            .map(|s| urlencoding::decode(s).map(|s| s.into_owned()).map_err(|_| invalid()))
            .collect::<Result<_>>()?;
        let host = url.host_str().unwrap_or("");
        let host = urlencoding::decode(host).map_err(|_| invalid())?.into_owned();

        let (vault, item) = match (host.is_empty(), segments.as_slice()) {
            (false, [item]) => (host, item.clone()),
            (true, [vault, item]) => (vault.clone(), item.clone()),
            _ => return Err(invalid()),
        };
        Ok(Self { vault, item, commands })
    }

    async fn item(&self) -> Result<Item> {
        let args = vec![
            "item".to_string(),
            "get".to_string(),
            self.item.clone(),
            "--vault".to_string(),
            self.vault.clone(),
            "--format".to_string(),
            "json".to_string(),
        ];
        let output = self.commands.run(PROGRAM, &args).await?;
        let item: Item = serde_json::from_str(&output)?;
        if item.category != CATEGORY {
            return Err(Error::backend(
                "1password",
                format!("item {} is a {}, expected {}", self, item.category, CATEGORY),
            ));
        }
        Ok(item)
    }
}

#[async_trait]
impl SecretReference for OnePasswordReference {
    async fn read(&self) -> Result<SecretString> {
        let item = self.item().await?;
        let value = item
            .fields
            .into_iter()
            .find(|f| f.label.as_deref() == Some(CREDENTIAL_FIELD))
            .and_then(|f| f.value)
            .ok_or_else(|| {
                Error::backend("1password", format!("item {} has no credential field", self))
            })?;
        debug!(reference = %self, "Read 1Password credential");
        Ok(SecretString::new(value))
    }

    async fn update(&self, value: &SecretString, expires_on: NaiveDate) -> Result<()> {
        self.item().await?;
        let expires = expires_on.and_time(NaiveTime::MIN).and_utc().timestamp();
        let args = vec![
            "item".to_string(),
            "edit".to_string(),
            self.item.clone(),
            "--vault".to_string(),
            self.vault.clone(),
            format!("{}={}", CREDENTIAL_FIELD, value.expose_secret()),
            format!("{}={}", EXPIRES_FIELD, expires),
        ];
        self.commands.run(PROGRAM, &args).await?;
        debug!(reference = %self, "Updated 1Password credential");
        Ok(())
    }

    fn scheme(&self) -> &'static str {
        SCHEME
    }
}
