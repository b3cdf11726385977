//! `read` command: print the value of a secret reference

use anyhow::{Context, Result};

use crate::secrets::ReferenceFactory;

pub async fn handle_read_command(url: &str, factory: &ReferenceFactory) -> Result<()> {
    let reference = factory.resolve(url)?;
    let secret =
        reference.read().await.with_context(|| format!("Failed to read secret from {}", reference))?;
    println!("{}", secret.expose_secret());
    Ok(())
}
