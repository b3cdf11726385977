//! Scheme registry that turns secret URLs into [`SecretReference`]s.

use reqwest::Client;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

use super::backends;
use super::exec::{CommandRunner, SystemCommandRunner};
use super::reference::SecretReference;
use crate::errors::{Error, Result};
use crate::gitlab::AdminClientCache;

/// Default Google Secret Manager REST endpoint.
pub const GSM_ENDPOINT: &str = "https://secretmanager.googleapis.com/";

/// Builds a reference for one scheme. Must not perform network I/O.
pub type Constructor =
    Arc<dyn Fn(&Url, &ReferenceContext) -> Result<Arc<dyn SecretReference>> + Send + Sync>;

/// Shared dependencies handed to every reference constructor.
#[derive(Debug, Clone)]
pub struct ReferenceContext {
    /// Admin clients used by `gitlab://` variable references
    pub admin_clients: Arc<AdminClientCache>,
    /// Runner for `op`, `aws` and `gcloud`
    pub commands: Arc<dyn CommandRunner>,
    /// HTTP client for REST-backed stores
    pub http: Client,
    /// Base URL of the Google Secret Manager API
    pub gsm_endpoint: Url,
}

impl ReferenceContext {
    pub fn new(admin_clients: Arc<AdminClientCache>, timeout: Duration) -> Result<Self> {
        let http = Client::builder().timeout(timeout).build()?;
        let gsm_endpoint = Url::parse(GSM_ENDPOINT)
            .map_err(|source| Error::InvalidUrl { url: GSM_ENDPOINT.to_string(), source })?;
        Ok(Self {
            admin_clients,
            commands: Arc::new(SystemCommandRunner::new(timeout)),
            http,
            gsm_endpoint,
        })
    }

    pub fn with_command_runner(mut self, commands: Arc<dyn CommandRunner>) -> Self {
        self.commands = commands;
        self
    }

    pub fn with_gsm_endpoint(mut self, endpoint: Url) -> Self {
        self.gsm_endpoint = endpoint;
        self
    }
}

/// Maps URL schemes to reference constructors.
///
/// The registry is populated once at startup and read-only afterwards.
pub struct ReferenceFactory {
    constructors: HashMap<String, Constructor>,
    context: ReferenceContext,
}

impl std::fmt::Debug for ReferenceFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReferenceFactory")
            .field("schemes", &self.supported_schemes())
            .field("context", &self.context)
            .finish()
    }
}

impl ReferenceFactory {
    /// Create a factory with no schemes registered
    pub fn new(context: ReferenceContext) -> Self {
        Self { constructors: HashMap::new(), context }
    }

    /// Create a factory with every built-in secret store registered
    pub fn with_default_backends(context: ReferenceContext) -> Self {
        let mut factory = Self::new(context);
        factory.register("gitlab", backends::gitlab::from_url);
        factory.register("op", backends::onepassword::from_url);
        factory.register("gsm", backends::gsm::from_url);
        factory.register("ssm", backends::ssm::from_url);
        factory.register("arn", backends::ssm::from_url);
        factory.register("vault", backends::vault::from_url);
        factory
    }

    /// Register a constructor for `scheme`, replacing any previous one
    pub fn register<F>(&mut self, scheme: impl Into<String>, constructor: F)
    where
        F: Fn(&Url, &ReferenceContext) -> Result<Arc<dyn SecretReference>> + Send + Sync + 'static,
    {
        let scheme = scheme.into().to_ascii_lowercase();
        info!(scheme = %scheme, "Registering secret reference scheme");
        self.constructors.insert(scheme, Arc::new(constructor));
    }

    /// Registered schemes in sorted order
    pub fn supported_schemes(&self) -> Vec<&str> {
        let mut schemes: Vec<&str> = self.constructors.keys().map(String::as_str).collect();
        schemes.sort_unstable();
        schemes
    }

    pub fn is_supported(&self, scheme: &str) -> bool {
        self.constructors.contains_key(&scheme.to_ascii_lowercase())
    }

    pub fn context(&self) -> &ReferenceContext {
        &self.context
    }

    /// Parse `raw` and build the reference for its scheme.
    ///
    /// Returns [`Error::InvalidUrl`] when `raw` is not a URL and
    /// [`Error::UnsupportedScheme`] when no constructor is registered.
    pub fn resolve(&self, raw: &str) -> Result<Arc<dyn SecretReference>> {
        let url = Url::parse(raw).map_err(|source| Error::InvalidUrl { url: raw.to_string(), source })?;
        self.resolve_url(&url)
    }

    pub fn resolve_url(&self, url: &Url) -> Result<Arc<dyn SecretReference>> {
        let constructor = self
            .constructors
            .get(url.scheme())
            .ok_or_else(|| Error::UnsupportedScheme(url.scheme().to_string()))?;
        let reference = constructor(url, &self.context)?;
        debug!(scheme = %url.scheme(), reference = %reference, "Resolved secret reference");
        Ok(reference)
    }
}
