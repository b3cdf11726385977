//! Built-in secret stores, one module per URL scheme.

pub mod gitlab;
pub mod gsm;
pub mod onepassword;
pub mod ssm;
pub mod vault;

pub use gitlab::VariableReference;
pub use gsm::{GoogleSecretReference, SecretLocator};
pub use onepassword::OnePasswordReference;
pub use ssm::ParameterReference;
pub use vault::VaultReference;
