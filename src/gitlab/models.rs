//! GitLab REST API payloads and the value types built around them.

use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::errors::{Error, Result};
use crate::secrets::SecretString;

/// GitLab role granted to a project or group access token.
///
/// Variants are ordered by privilege. On the wire the level is the numeric
/// value GitLab uses (`0` for no access up to `60` for admin).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum AccessLevel {
    No,
    Minimal,
    Guest,
    Reporter,
    Developer,
    Maintainer,
    Owner,
    Admin,
}

impl AccessLevel {
    pub const ALL: [AccessLevel; 8] = [
        AccessLevel::No,
        AccessLevel::Minimal,
        AccessLevel::Guest,
        AccessLevel::Reporter,
        AccessLevel::Developer,
        AccessLevel::Maintainer,
        AccessLevel::Owner,
        AccessLevel::Admin,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AccessLevel::No => "no",
            AccessLevel::Minimal => "minimal",
            AccessLevel::Guest => "guest",
            AccessLevel::Reporter => "reporter",
            AccessLevel::Developer => "developer",
            AccessLevel::Maintainer => "maintainer",
            AccessLevel::Owner => "owner",
            AccessLevel::Admin => "admin",
        }
    }

    /// Numeric value used by the GitLab API
    pub fn value(&self) -> u8 {
        match self {
            AccessLevel::No => 0,
            AccessLevel::Minimal => 5,
            AccessLevel::Guest => 10,
            AccessLevel::Reporter => 20,
            AccessLevel::Developer => 30,
            AccessLevel::Maintainer => 40,
            AccessLevel::Owner => 50,
            AccessLevel::Admin => 60,
        }
    }

    pub fn from_value(value: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|level| level.value() == value)
    }
}

impl fmt::Display for AccessLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for AccessLevel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let name = s.trim().to_ascii_lowercase();
        Self::ALL.into_iter().find(|level| level.as_str() == name).ok_or_else(|| {
            let names: Vec<&str> = Self::ALL.iter().map(|l| l.as_str()).collect();
            Error::validation(format!(
                "invalid access level '{}', expected one of: {}",
                s,
                names.join(", ")
            ))
        })
    }
}

impl Serialize for AccessLevel {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.value())
    }
}

impl<'de> Deserialize<'de> for AccessLevel {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let value = u8::deserialize(deserializer)?;
        Self::from_value(value)
            .ok_or_else(|| serde::de::Error::custom(format!("unknown access level {}", value)))
    }
}

/// Who an access token belongs to.
///
/// Project and group identifiers are either numeric ids or full paths such
/// as `my-group/my-project`; both are accepted by the API once URL-encoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenOwner {
    Personal,
    Project(String),
    Group(String),
}

impl TokenOwner {
    /// Build the owner from the optional `--project` / `--group` selectors.
    ///
    /// Empty strings count as absent. Setting both is a validation error.
    pub fn from_target(project: Option<&str>, group: Option<&str>) -> Result<Self> {
        let project = project.map(str::trim).filter(|p| !p.is_empty());
        let group = group.map(str::trim).filter(|g| !g.is_empty());
        match (project, group) {
            (Some(_), Some(_)) => {
                Err(Error::validation("specify either a project or a group, not both"))
            }
            (Some(project), None) => Ok(TokenOwner::Project(project.to_string())),
            (None, Some(group)) => Ok(TokenOwner::Group(group.to_string())),
            (None, None) => Ok(TokenOwner::Personal),
        }
    }
}

impl fmt::Display for TokenOwner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenOwner::Personal => write!(f, "personal account"),
            TokenOwner::Project(id) => write!(f, "project {}", id),
            TokenOwner::Group(id) => write!(f, "group {}", id),
        }
    }
}

/// Access token metadata as returned by the list and `self` endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AccessToken {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub scopes: Vec<String>,
    #[serde(default)]
    pub expires_at: Option<NaiveDate>,
    #[serde(default)]
    pub active: bool,
    #[serde(default)]
    pub revoked: bool,
    /// Raw numeric level. Kept as a number so that roles this crate does
    /// not model (GitLab's planner role is `15`) still decode.
    #[serde(default)]
    pub access_level: Option<u8>,
}

impl AccessToken {
    pub fn level(&self) -> Option<AccessLevel> {
        self.access_level.and_then(AccessLevel::from_value)
    }

    pub fn has_scope(&self, scope: &str) -> bool {
        self.scopes.iter().any(|s| s == scope)
    }
}

/// A token as returned by the create and rotate endpoints, including the
/// secret value which GitLab shows exactly once.
#[derive(Debug, Clone, Deserialize)]
pub struct IssuedToken {
    pub id: u64,
    pub name: String,
    pub token: SecretString,
    #[serde(default)]
    pub expires_at: Option<NaiveDate>,
    #[serde(default)]
    pub scopes: Vec<String>,
}

/// Body of `POST .../access_tokens`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CreateAccessToken {
    pub name: String,
    pub scopes: Vec<String>,
    pub access_level: AccessLevel,
    pub expires_at: NaiveDate,
}

/// Body of `POST .../rotate`
#[derive(Debug, Clone, Serialize)]
pub(crate) struct RotateAccessToken {
    pub expires_at: NaiveDate,
}

/// A project or group CI/CD variable.
#[derive(Debug, Clone, Deserialize)]
pub struct Variable {
    pub key: String,
    pub value: SecretString,
    #[serde(default = "default_environment_scope")]
    pub environment_scope: String,
    #[serde(default)]
    pub masked: bool,
    #[serde(default)]
    pub protected: bool,
}

pub(crate) fn default_environment_scope() -> String {
    "*".to_string()
}

/// Body of `PUT .../variables/:key`
#[derive(Debug, Serialize)]
pub(crate) struct UpdateVariable<'a> {
    pub value: &'a str,
}
