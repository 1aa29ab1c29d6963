use std::process::Stdio;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use tokio::process::Command;

use crate::handler::{BoxError, JobHandler};

#[derive(Error, Debug)]
pub enum ShellError {
    #[error("Shell job expects a command string as its first argument")]
    MissingCommand,

    #[error("Failed to start shell: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("{0}")]
    Failed(String),
}

/// Runs `sh -c <args[0]>`. Fails when the command exits non-zero, using its
/// stderr (or the exit code) as the error message.
#[derive(Debug, Clone, Copy, Default)]
pub struct ShellJob;

impl ShellJob {
    pub const CLASS: &'static str = "Shell";

    async fn run(command: &str) -> Result<Option<String>, ShellError> {
        let output = Command::new("sh")
            .arg("-c")
            .arg(command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await?;

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();

        if output.status.success() {
            Ok(if stdout.is_empty() { None } else { Some(stdout) })
        } else if stderr.is_empty() {
            Err(ShellError::Failed(format!(
                "Exit code: {:?}",
                output.status.code()
            )))
        } else {
            Err(ShellError::Failed(stderr.trim_end().to_string()))
        }
    }
}

#[async_trait]
impl JobHandler for ShellJob {
    async fn perform(&self, args: Vec<Value>) -> Result<(), BoxError> {
        let command = args
            .first()
            .and_then(Value::as_str)
            .ok_or(ShellError::MissingCommand)?;

        tracing::info!(command, "Running shell job");
        if let Some(output) = Self::run(command).await? {
            tracing::info!(command, output = %output.trim_end(), "Shell job finished");
        }
        Ok(())
    }
}
