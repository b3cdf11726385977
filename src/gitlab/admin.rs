//! Per-host cache of admin API clients.
//!
//! `gitlab://` secret references need an admin client for the host named in
//! the URL. Clients are built lazily, once per host, and shared by every
//! reference for the lifetime of the cache.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

use super::client::{GitLabClient, DEFAULT_TIMEOUT};
use crate::errors::{Error, Result};
use crate::secrets::SecretString;

/// Environment variable holding the ambient admin token
pub const GITLAB_TOKEN_ENV: &str = "GITLAB_TOKEN";

/// Append-only map from host to admin client.
///
/// Lookups take the read lock only. Construction is serialized by a
/// separate mutex and re-checks the map, so each host gets exactly one
/// client even under concurrent first access.
#[derive(Debug)]
pub struct AdminClientCache {
    clients: RwLock<HashMap<String, Arc<GitLabClient>>>,
    init: Mutex<()>,
    ambient_token: Option<SecretString>,
    ambient_from_env: bool,
    scheme: String,
    timeout: Duration,
}

impl AdminClientCache {
    /// Create an empty cache. `ambient_token` is used for hosts that are
    /// first requested without an explicit token.
    pub fn new(ambient_token: Option<SecretString>) -> Self {
        Self {
            clients: RwLock::new(HashMap::new()),
            init: Mutex::new(()),
            ambient_token: ambient_token.filter(|t| !t.is_empty()),
            ambient_from_env: false,
            scheme: "https".to_string(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Create a cache whose ambient token is `GITLAB_TOKEN`, read when a
    /// client is first built so that a resolved environment is seen
    pub fn from_env() -> Self {
        Self { ambient_from_env: true, ..Self::new(None) }
    }

    fn ambient_token(&self) -> Option<SecretString> {
        if let Some(token) = &self.ambient_token {
            return Some(token.clone());
        }
        if self.ambient_from_env {
            return std::env::var(GITLAB_TOKEN_ENV).ok().filter(|t| !t.is_empty()).map(SecretString::new);
        }
        None
    }

    /// URL scheme used to reach hosts. Only plain-HTTP test servers need
    /// anything other than `https`.
    pub fn with_scheme(mut self, scheme: impl Into<String>) -> Self {
        self.scheme = scheme.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Cache key for the host of `url`: the host name, plus the port when
    /// it differs from the default port of the cache's scheme.
    pub fn host_key(&self, url: &Url) -> Option<String> {
        let host = url.host_str().filter(|h| !h.is_empty())?;
        let default_port = if self.scheme == "http" { 80 } else { 443 };
        Some(match url.port() {
            Some(port) if port != default_port => format!("{}:{}", host, port),
            _ => host.to_string(),
        })
    }

    /// Return the admin client for `host`, building it on first use.
    ///
    /// The explicit `token` is only consulted when the host has no client
    /// yet; an empty or missing token falls back to the ambient token. A
    /// construction failure leaves the host absent.
    pub fn get_client(&self, host: &str, token: Option<&SecretString>) -> Result<Arc<GitLabClient>> {
        if let Some(client) = self.lookup(host) {
            return Ok(client);
        }

        let _guard = self.init.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(client) = self.lookup(host) {
            return Ok(client);
        }

        let token = token
            .filter(|t| !t.is_empty())
            .cloned()
            .or_else(|| self.ambient_token())
            .ok_or_else(|| {
                Error::config(format!(
                    "no admin token for GitLab host {}: set {} or pass an admin token reference",
                    host, GITLAB_TOKEN_ENV
                ))
            })?;

        let raw = format!("{}://{}", self.scheme, host);
        let base_url = Url::parse(&raw).map_err(|source| Error::InvalidUrl { url: raw, source })?;
        let client = Arc::new(GitLabClient::new(&base_url, token, self.timeout)?);

        self.clients
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(host.to_string(), Arc::clone(&client));
        info!(host = %host, "Created GitLab admin client");
        Ok(client)
    }

    fn lookup(&self, host: &str) -> Option<Arc<GitLabClient>> {
        let clients = self.clients.read().unwrap_or_else(PoisonError::into_inner);
        let client = clients.get(host).cloned();
        if client.is_some() {
            debug!(host = %host, "Reusing GitLab admin client");
        }
        client
    }

    pub fn contains(&self, host: &str) -> bool {
        self.clients.read().unwrap_or_else(PoisonError::into_inner).contains_key(host)
    }

    pub fn len(&self) -> usize {
        self.clients.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_token_wins() {
        let cache = AdminClientCache::new(None);
        let first = cache.get_client("gitlab.example.com", Some(&SecretString::new("one"))).unwrap();
        let second = cache.get_client("gitlab.example.com", Some(&SecretString::new("two"))).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_ambient_token_fallback() {
        let cache = AdminClientCache::new(Some(SecretString::new("ambient")));
        assert!(cache.get_client("gitlab.com", Some(&SecretString::new(""))).is_ok());
        assert!(cache.contains("gitlab.com"));
    }

    #[test]
    fn test_missing_token_leaves_host_absent() {
        let cache = AdminClientCache::new(None);
        let err = cache.get_client("gitlab.com", None).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_host_key_drops_default_port() {
        let cache = AdminClientCache::new(None);
        let key = |raw: &str| cache.host_key(&Url::parse(raw).unwrap());
        assert_eq!(key("https://gitlab.example.com:443").as_deref(), Some("gitlab.example.com"));
        assert_eq!(key("gitlab://gitlab.example.com:443/projects/1/variables/X"), key("https://gitlab.example.com"));
        assert_eq!(key("gitlab://gitlab.example.com:8443/projects/1/variables/X").as_deref(), Some("gitlab.example.com:8443"));
        assert_eq!(key("https://gitlab.example.com:8443").as_deref(), Some("gitlab.example.com:8443"));

        let plain = AdminClientCache::new(None).with_scheme("http");
        assert_eq!(plain.host_key(&Url::parse("gitlab://localhost:80/groups/1/variables/X").unwrap()).as_deref(), Some("localhost"));
        assert_eq!(plain.host_key(&Url::parse("http://localhost:8080").unwrap()).as_deref(), Some("localhost:8080"));
    }

    #[test]
    fn test_concurrent_first_access_builds_one_client() {
        let cache = Arc::new(AdminClientCache::new(Some(SecretString::new("ambient"))));
        let handles: Vec<_> = (0..16)
            .map(|i| {
                let cache = Arc::clone(&cache);
                let token = SecretString::new(format!("token-{}", i));
                std::thread::spawn(move || cache.get_client("gitlab.com", Some(&token)).unwrap())
            })
            .collect();
        let clients: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert!(clients.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
        assert_eq!(cache.len(), 1);
    }
}
