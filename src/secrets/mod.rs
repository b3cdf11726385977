//! # Secret references
//!
//! A secret reference is a URL naming one secret in one secret store. The
//! token engines only see the [`SecretReference`] trait; the
//! [`ReferenceFactory`] maps URL schemes to the store implementations in
//! [`backends`].
//!
//! | Scheme   | Store                                   |
//! |----------|-----------------------------------------|
//! | `gitlab` | GitLab project or group CI/CD variable  |
//! | `op`     | 1Password API credential item           |
//! | `gsm`    | Google Secret Manager                   |
//! | `ssm`    | AWS SSM parameter by name               |
//! | `arn`    | AWS SSM parameter by ARN                |
//! | `vault`  | HashiCorp Vault KV v2                   |
//!
//! ```rust,ignore
//! let factory = ReferenceFactory::with_default_backends(context);
//! let reference = factory.resolve("gsm:///my-project/gitlab-pat")?;
//! let token = reference.read().await?;
//! ```

pub mod backends;
pub mod env;
pub mod exec;
pub mod factory;
pub mod reference;
pub mod types;

pub use env::{apply_environment, resolve_environment};
pub use exec::{CommandRunner, SystemCommandRunner};
pub use factory::{ReferenceContext, ReferenceFactory};
pub use reference::SecretReference;
pub use types::SecretString;
