//! The capability every secret store exposes to the token engines.

use async_trait::async_trait;
use chrono::NaiveDate;
use std::fmt;

use super::types::SecretString;
use crate::errors::Result;

/// Handle to one secret slot in one secret store.
///
/// A reference is built from a URL by the [`ReferenceFactory`] and is
/// immutable afterwards. `Display` renders the URL it was built from, so a
/// reference can be logged and rebuilt from its own string form.
///
/// Implementations MUST NOT log secret values.
///
/// [`ReferenceFactory`]: super::factory::ReferenceFactory
#[async_trait]
pub trait SecretReference: Send + Sync + fmt::Debug + fmt::Display {
    /// Read the current secret value.
    async fn read(&self) -> Result<SecretString>;

    /// Replace the secret value. `expires_on` is the expiry date of the
    /// token being stored; stores that keep metadata record it, others
    /// ignore it.
    async fn update(&self, value: &SecretString, expires_on: NaiveDate) -> Result<()>;

    /// URL scheme this reference was created from
    fn scheme(&self) -> &'static str;
}
