//! Shared test doubles and GitLab fixtures
#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use serde_json::{json, Value};
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use url::Url;
use wiremock::MockServer;

use gitlab_token_manager::errors::{Error, Result};
use gitlab_token_manager::gitlab::AdminClientCache;
use gitlab_token_manager::secrets::{
    CommandRunner, ReferenceContext, ReferenceFactory, SecretReference, SecretString,
};

/// 2024-03-15 10:00 UTC
pub fn fixed_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 15, 10, 0, 0).unwrap()
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

/// Secret reference backed by memory, with failure injection
#[derive(Debug)]
pub struct MemorySecret {
    name: String,
    value: Mutex<Option<String>>,
    updates: Mutex<Vec<(String, NaiveDate)>>,
    reads: AtomicUsize,
    fail_update: bool,
}

impl MemorySecret {
    pub fn new(name: &str, value: &str) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            value: Mutex::new(Some(value.to_string())),
            updates: Mutex::new(Vec::new()),
            reads: AtomicUsize::new(0),
            fail_update: false,
        })
    }

    /// Reads fail as if the secret did not exist
    pub fn missing(name: &str) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            value: Mutex::new(None),
            updates: Mutex::new(Vec::new()),
            reads: AtomicUsize::new(0),
            fail_update: false,
        })
    }

    /// Reads succeed, updates fail
    pub fn read_only(name: &str, value: &str) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            value: Mutex::new(Some(value.to_string())),
            updates: Mutex::new(Vec::new()),
            reads: AtomicUsize::new(0),
            fail_update: true,
        })
    }

    pub fn value(&self) -> Option<String> {
        self.value.lock().unwrap().clone()
    }

    pub fn updates(&self) -> Vec<(String, NaiveDate)> {
        self.updates.lock().unwrap().clone()
    }

    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }
}

impl fmt::Display for MemorySecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "mem://{}", self.name)
    }
}

#[async_trait]
impl SecretReference for MemorySecret {
    async fn read(&self) -> Result<SecretString> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.value
            .lock()
            .unwrap()
            .clone()
            .map(SecretString::new)
            .ok_or_else(|| Error::backend("memory", format!("{} does not exist", self)))
    }

    async fn update(&self, value: &SecretString, expires_on: NaiveDate) -> Result<()> {
        if self.fail_update {
            return Err(Error::backend("memory", format!("{} is read-only", self)));
        }
        *self.value.lock().unwrap() = Some(value.expose_secret().to_string());
        self.updates.lock().unwrap().push((value.expose_secret().to_string(), expires_on));
        Ok(())
    }

    fn scheme(&self) -> &'static str {
        "mem"
    }
}

/// Command runner that answers from a script and records every call
#[derive(Debug, Default)]
pub struct ScriptedRunner {
    responses: Mutex<Vec<(String, Vec<String>, Result<String>)>>,
    calls: Mutex<Vec<(String, Vec<String>)>>,
}

impl ScriptedRunner {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Answer calls of `program` whose arguments start with `prefix`
    pub fn respond(&self, program: &str, prefix: &[&str], output: &str) {
        self.responses.lock().unwrap().push((
            program.to_string(),
            prefix.iter().map(|s| s.to_string()).collect(),
            Ok(output.to_string()),
        ));
    }

    pub fn fail(&self, program: &str, prefix: &[&str], message: &str) {
        self.responses.lock().unwrap().push((
            program.to_string(),
            prefix.iter().map(|s| s.to_string()).collect(),
            Err(Error::command(program, message)),
        ));
    }

    pub fn calls(&self) -> Vec<(String, Vec<String>)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl CommandRunner for ScriptedRunner {
    async fn run(&self, program: &str, args: &[String]) -> Result<String> {
        self.calls.lock().unwrap().push((program.to_string(), args.to_vec()));
        let responses = self.responses.lock().unwrap();
        let found = responses
            .iter()
            .find(|(p, prefix, _)| p == program && args.starts_with(prefix))
            .map(|(_, _, result)| match result {
                Ok(out) => Ok(out.clone()),
                Err(e) => Err(Error::command(program, e.to_string())),
            });
        found.unwrap_or_else(|| Err(Error::command(program, format!("unscripted call {:?}", args))))
    }
}

/// Base URL of a mock GitLab instance
pub fn base_url(server: &MockServer) -> Url {
    Url::parse(&server.uri()).unwrap()
}

/// `host:port` of a mock server, as used in `gitlab://` references
pub fn host(server: &MockServer) -> String {
    let url = base_url(server);
    format!("{}:{}", url.host_str().unwrap(), url.port().unwrap())
}

/// Factory with the built-in backends, reaching GitLab hosts over http
pub fn factory_with(
    admin_token: Option<&str>,
    commands: Arc<ScriptedRunner>,
    gsm_endpoint: Option<Url>,
) -> ReferenceFactory {
    let cache = Arc::new(
        AdminClientCache::new(admin_token.map(SecretString::new))
            .with_scheme("http")
            .with_timeout(Duration::from_secs(5)),
    );
    let mut context =
        ReferenceContext::new(cache, Duration::from_secs(5)).unwrap().with_command_runner(commands);
    if let Some(endpoint) = gsm_endpoint {
        context = context.with_gsm_endpoint(endpoint);
    }
    ReferenceFactory::with_default_backends(context)
}

pub fn access_token_json(id: u64, name: &str, scopes: &[&str]) -> Value {
    json!({
        "id": id,
        "name": name,
        "revoked": false,
        "created_at": "2024-01-01T00:00:00.000Z",
        "scopes": scopes,
        "user_id": 1,
        "last_used_at": null,
        "active": true,
        "expires_at": "2024-03-20"
    })
}

pub fn issued_token_json(id: u64, name: &str, token: &str, expires_at: &str) -> Value {
    json!({
        "id": id,
        "name": name,
        "revoked": false,
        "created_at": "2024-03-15T10:00:00.000Z",
        "scopes": ["api"],
        "user_id": 1,
        "active": true,
        "expires_at": expires_at,
        "token": token
    })
}

pub fn variable_json(key: &str, value: &str, scope: &str) -> Value {
    json!({
        "variable_type": "env_var",
        "key": key,
        "value": value,
        "protected": false,
        "masked": true,
        "raw": false,
        "environment_scope": scope
    })
}
