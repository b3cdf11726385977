//! # Error Handling
//!
//! A single error type for token management operations. Variants map onto the
//! categories callers need to branch on: validation problems detected before
//! any I/O, unsupported secret reference schemes, permission and duplicate
//! checks, issuer (GitLab API) failures and secret store failures.

use thiserror::Error;

/// Result type for token management operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by secret references, the GitLab client and the token engines
#[derive(Error, Debug)]
pub enum Error {
    /// Local validation failure, raised before any network call
    #[error("Validation error: {0}")]
    Validation(String),

    /// The value could not be parsed as a URL
    #[error("Invalid URL '{url}': {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    /// No secret store is registered for the URL scheme
    #[error("Unsupported scheme '{0}'")]
    UnsupportedScheme(String),

    /// The URL scheme is known but the backend rejected the rest of the URL
    #[error("Invalid {scheme} reference: {reason}")]
    InvalidReference { scheme: String, reason: String },

    /// The current token may not rotate itself and no admin token was given
    #[error("Access token '{token}' does not have the permission to rotate itself")]
    PermissionDenied { token: String },

    /// An access token with the requested name already exists
    #[error("An access token named '{name}' already exists for {owner}")]
    DuplicateToken { name: String, owner: String },

    /// The secret a new token should be stored in cannot be read
    #[error("The secret to store the token in, {reference}, does not exist or cannot be read: {source}")]
    DestinationUnreadable {
        reference: String,
        #[source]
        source: Box<Error>,
    },

    /// Storing a newly issued token failed
    #[error("Failed to store the new token in {reference}: {source}")]
    Persistence {
        reference: String,
        #[source]
        source: Box<Error>,
    },

    /// The GitLab API answered with a non-success status
    #[error("GitLab API error (status: {status}): {message}")]
    Api { status: u16, message: String },

    /// HTTP transport failure
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// A secret store returned an error
    #[error("{backend} error: {message}")]
    Backend { backend: &'static str, message: String },

    /// An external command used by a secret store failed
    #[error("Command '{program}' failed: {message}")]
    Command { program: String, message: String },

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create a new validation error
    pub fn validation<S: Into<String>>(message: S) -> Self {
        Self::Validation(message.into())
    }

    /// Create an invalid reference error for the given scheme
    pub fn invalid_reference<S: Into<String>, R: Into<String>>(scheme: S, reason: R) -> Self {
        Self::InvalidReference { scheme: scheme.into(), reason: reason.into() }
    }

    /// Create a secret store error
    pub fn backend<S: Into<String>>(backend: &'static str, message: S) -> Self {
        Self::Backend { backend, message: message.into() }
    }

    /// Create an external command error
    pub fn command<P: Into<String>, M: Into<String>>(program: P, message: M) -> Self {
        Self::Command { program: program.into(), message: message.into() }
    }

    /// Create a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config(message.into())
    }

    /// Wrap a failed `update` of the given reference
    pub fn persistence(reference: impl ToString, source: Error) -> Self {
        Self::Persistence { reference: reference.to_string(), source: Box::new(source) }
    }

    /// True when the error only says "this is not a secret reference we know".
    ///
    /// The environment resolver uses this to skip ordinary variables whose
    /// values happen to parse as URLs.
    pub fn is_unsupported_scheme(&self) -> bool {
        matches!(self, Self::UnsupportedScheme(_))
    }

    /// True for errors detected locally before any I/O took place
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_) | Self::InvalidUrl { .. } | Self::InvalidReference { .. })
    }

    /// HTTP status reported by the GitLab API, if any
    pub fn api_status(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => Some(*status),
            Self::Http(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}
