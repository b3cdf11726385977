//! Last-resort copy of a token that could not be stored.

use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{error, warn};

use crate::errors::Result;
use crate::secrets::SecretString;

pub const RESCUE_FILE_PREFIX: &str = "gl-token-";

/// Write `token` to a new owner-only file in `dir` and return its path.
pub fn write_rescue_file(dir: &Path, token: &SecretString) -> Result<PathBuf> {
    let mut file = tempfile::Builder::new().prefix(RESCUE_FILE_PREFIX).tempfile_in(dir)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        file.as_file().set_permissions(std::fs::Permissions::from_mode(0o600))?;
    }

    file.write_all(token.expose_secret().as_bytes())?;
    file.as_file().sync_all()?;
    let (_, path) = file.keep().map_err(|e| e.error)?;
    Ok(path)
}

/// Write the rescue file and log where it went. Failures are logged only,
/// the caller is already reporting the original error.
pub(crate) fn rescue(dir: &Path, token: &SecretString) -> Option<PathBuf> {
    match write_rescue_file(dir, token) {
        Ok(path) => {
            warn!(path = %path.display(), "The new token was written to a rescue file; store it manually and delete the file");
            Some(path)
        }
        Err(e) => {
            error!(error = %e, directory = %dir.display(), "Failed to write rescue file, the new token is lost");
            None
        }
    }
}
