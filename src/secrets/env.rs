//! Replace secret references in environment variables with their values.
//!
//! Any variable whose value is a URL with a registered scheme is read
//! through the matching secret store. Values that are not URLs, or URLs
//! with other schemes (`https://...`, `postgres://...`), are left alone.

use std::collections::BTreeMap;
use tracing::{debug, info};

use super::factory::ReferenceFactory;
use crate::errors::Result;

/// Resolve `NAME=VALUE` entries.
///
/// Returns only the variables that were resolved, mapped to their secret
/// values. Entries without `=` are skipped, as are values the factory
/// reports as an unsupported scheme (including ARNs of services other than
/// SSM). The first reference that fails to build otherwise, or to read,
/// aborts the whole resolution.
pub async fn resolve_environment<I, S>(
    entries: I,
    factory: &ReferenceFactory,
) -> Result<BTreeMap<String, String>>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut resolved = BTreeMap::new();
    for entry in entries {
        let Some((name, value)) = entry.as_ref().split_once('=') else {
            continue;
        };
        if url::Url::parse(value).is_err() {
            continue;
        }

        let reference = match factory.resolve(value) {
            Ok(reference) => reference,
            Err(e) if e.is_unsupported_scheme() => continue,
            Err(e) => return Err(e),
        };

        let secret = reference.read().await?;
        debug!(variable = %name, reference = %reference, "Resolved secret reference");
        resolved.insert(name.to_string(), secret.expose_secret().to_string());
    }
    Ok(resolved)
}

/// Resolve the current process environment and write the values back.
///
/// Must run before other tasks read the environment. Variables whose name
/// or value is not valid UTF-8 are ignored.
pub async fn apply_environment(factory: &ReferenceFactory) -> Result<usize> {
    let entries: Vec<String> = std::env::vars_os()
        .filter_map(|(name, value)| {
            Some(format!("{}={}", name.into_string().ok()?, value.into_string().ok()?))
        })
        .collect();

    let resolved = resolve_environment(entries, factory).await?;
    for (name, value) in &resolved {
        std::env::set_var(name, value);
    }
    if !resolved.is_empty() {
        info!(count = resolved.len(), "Resolved secret references in the environment");
    }
    Ok(resolved.len())
}
