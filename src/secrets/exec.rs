//! External command execution for CLI-backed secret stores.
//!
//! 1Password, AWS SSM and the gcloud credential helper are driven through
//! their command line tools. The runner is a trait so tests can script the
//! output instead of requiring the binaries.

use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

use crate::errors::{Error, Result};

/// Default maximum execution time for a secret store command.
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(60);

/// Runs a program with arguments and returns its standard output.
#[async_trait]
pub trait CommandRunner: Send + Sync + std::fmt::Debug {
    /// Run `program` with `args`. A non-zero exit status is an error carrying
    /// the trimmed standard error.
    async fn run(&self, program: &str, args: &[String]) -> Result<String>;
}

/// Runs commands as child processes of this process.
#[derive(Debug, Clone)]
pub struct SystemCommandRunner {
    timeout: Duration,
}

impl SystemCommandRunner {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl Default for SystemCommandRunner {
    fn default() -> Self {
        Self::new(DEFAULT_COMMAND_TIMEOUT)
    }
}

#[async_trait]
impl CommandRunner for SystemCommandRunner {
    async fn run(&self, program: &str, args: &[String]) -> Result<String> {
        // Arguments can carry token values, only the program name is logged.
        debug!(program = %program, "Running secret store command");

        let mut cmd = Command::new(program);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = match tokio::time::timeout(self.timeout, cmd.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::command(program, format!("{} not found in $PATH", program)));
            }
            Ok(Err(e)) => return Err(Error::command(program, e.to_string())),
            Err(_) => {
                return Err(Error::command(
                    program,
                    format!("timed out after {}s", self.timeout.as_secs()),
                ));
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::command(
                program,
                format!("exited with {}: {}", output.status, stderr.trim()),
            ));
        }

        String::from_utf8(output.stdout)
            .map_err(|_| Error::command(program, "produced output that is not valid UTF-8"))
    }
}
