//! # GitLab
//!
//! REST client for the GitLab API, the models it exchanges, the shared
//! admin client cache and the [`TokenIssuer`] seam used by the engines.

pub mod admin;
pub mod client;
pub mod issuer;
pub mod models;

pub use admin::{AdminClientCache, GITLAB_TOKEN_ENV};
pub use client::{GitLabClient, DEFAULT_TIMEOUT};
pub use issuer::{GitLabConnector, IssuerConnector, TokenIssuer};
pub use models::{AccessLevel, AccessToken, CreateAccessToken, IssuedToken, TokenOwner, Variable};
