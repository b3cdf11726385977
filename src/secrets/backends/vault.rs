//! HashiCorp Vault KV v2 secrets.
//!
//! `vault:///<mount>/<path>[?field=<key>]`. The token is stored under
//! `field` (default `token`) and its expiry date under `expires_at`; other
//! keys of the secret are preserved on update.

use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::debug;
use url::Url;
use vaultrs::client::{VaultClient, VaultClientSettingsBuilder};
use vaultrs::kv2;

use crate::errors::{Error, Result};
use crate::secrets::factory::ReferenceContext;
use crate::secrets::reference::SecretReference;
use crate::secrets::types::SecretString;

const SCHEME: &str = "vault";
const DEFAULT_FIELD: &str = "token";
const EXPIRES_FIELD: &str = "expires_at";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VaultReference {
    mount: String,
    path: String,
    field: Option<String>,
}

impl fmt::Display for VaultReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "vault:///{}", urlencoding::encode(&self.mount))?;
        for segment in self.path.split('/') {
            write!(f, "/{}", urlencoding::encode(segment))?;
        }
        if let Some(field) = &self.field {
            write!(f, "?field={}", urlencoding::encode(field))?;
        }
        Ok(())
    }
}

pub fn from_url(url: &Url, _context: &ReferenceContext) -> Result<Arc<dyn SecretReference>> {
    Ok(Arc::new(VaultReference::parse(url)?))
}

impl VaultReference {
    pub fn parse(url: &Url) -> Result<Self> {
        if url.host_str().is_some_and(|h| !h.is_empty()) {
            return Err(Error::invalid_reference(
                SCHEME,
                "expected vault:///<mount>/<path>, the Vault address comes from VAULT_ADDR",
            ));
        }
        let full = urlencoding::decode(url.path().trim_matches('/'))
            .map_err(|_| Error::invalid_reference(SCHEME, "path is not valid UTF-8"))?
            .into_owned();
        let (mount, path) = full
            .split_once('/')
            .filter(|(m, p)| !m.is_empty() && !p.is_empty())
            .ok_or_else(|| Error::invalid_reference(SCHEME, "expected vault:///<mount>/<path>"))?;

        let mut field = None;
        for (key, value) in url.query_pairs() {
            if key != "field" || value.is_empty() {
                return Err(Error::invalid_reference(
                    SCHEME,
                    format!("unsupported query parameter '{}={}'", key, value),
                ));
            }
            field = Some(value.into_owned());
        }

        Ok(Self { mount: mount.to_string(), path: path.to_string(), field })
    }

    fn field(&self) -> &str {
        self.field.as_deref().unwrap_or(DEFAULT_FIELD)
    }

    /// Client from `VAULT_ADDR`, `VAULT_TOKEN` and optional `VAULT_NAMESPACE`
    fn client() -> Result<VaultClient> {
        let address = std::env::var("VAULT_ADDR")
            .map_err(|_| Error::config("VAULT_ADDR is required for vault:// references"))?;
        let token = std::env::var("VAULT_TOKEN")
            .map_err(|_| Error::config("VAULT_TOKEN is required for vault:// references"))?;

        let mut settings_builder = VaultClientSettingsBuilder::default();
        settings_builder.address(&address);
        settings_builder.token(token);
        if let Ok(namespace) = std::env::var("VAULT_NAMESPACE") {
            settings_builder.namespace(Some(namespace));
        }
        let settings = settings_builder
            .build()
            .map_err(|e| Error::config(format!("invalid Vault settings: {}", e)))?;

        VaultClient::new(settings)
            .map_err(|e| Error::backend("vault", format!("failed to create client: {}", e)))
    }

    async fn read_data(&self, client: &VaultClient) -> Result<HashMap<String, String>> {
        kv2::read(client, &self.mount, &self.path).await.map_err(|e| {
            tracing::error!(error = %e, reference = %self, "Failed to read secret from Vault");
            Error::backend("vault", format!("failed to read {}: {}", self, e))
        })
    }
}

#[async_trait]
impl SecretReference for VaultReference {
    async fn read(&self) -> Result<SecretString> {
        let client = Self::client()?;
        let mut data = self.read_data(&client).await?;
        let value = data.remove(self.field()).ok_or_else(|| {
            Error::backend("vault", format!("{} has no '{}' key", self, self.field()))
        })?;
        debug!(reference = %self, "Read Vault secret");
        Ok(SecretString::new(value))
    }

    async fn update(&self, value: &SecretString, expires_on: NaiveDate) -> Result<()> {
        let client = Self::client()?;
        let mut data = self.read_data(&client).await?;
        data.insert(self.field().to_string(), value.expose_secret().to_string());
        data.insert(EXPIRES_FIELD.to_string(), expires_on.format("%Y-%m-%d").to_string());

        kv2::set(&client, &self.mount, &self.path, &data).await.map_err(|e| {
            tracing::error!(error = %e, reference = %self, "Failed to write secret to Vault");
            Error::backend("vault", format!("failed to write {}: {}", self, e))
        })?;
        debug!(reference = %self, "Updated Vault secret");
        Ok(())
    }

    fn scheme(&self) -> &'static str {
        SCHEME
    }
}
