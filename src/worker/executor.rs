use std::os::unix::process::ExitStatusExt;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};

use tokio::process::{Child, Command};

use crate::error::{ResqError, Result};
use crate::queue::{Job, JobFault};

/// Environment variable carrying the serialized job into the child.
pub const JOB_ENV: &str = "RESQ_JOB";

/// Environment variable carrying the log filter into the child.
pub const LOG_ENV: &str = "RUST_LOG";

/// How to launch the process that runs a single job.
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
}

impl ExecutorConfig {
    /// Re-run this binary as `<exe> perform`.
    pub fn current_exe() -> Result<Self> {
        let program = std::env::current_exe().map_err(ResqError::Fork)?;
        Ok(Self::command(program, ["perform"]))
    }

    pub fn command<I, S>(program: impl Into<PathBuf>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
            env: Vec::new(),
        }
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Log filter for the job process, passed as `RUST_LOG`.
    pub fn with_log_filter(self, filter: impl Into<String>) -> Self {
        self.with_env(LOG_ENV, filter)
    }
}

/// How a job process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChildExit {
    Clean,
    Code(i32),
    Signal(i32),
    Unknown,
}

impl ChildExit {
    pub fn from_status(status: ExitStatus) -> Self {
        match (status.code(), status.signal()) {
            (Some(0), _) => ChildExit::Clean,
            (Some(code), _) => ChildExit::Code(code),
            (None, Some(signal)) => ChildExit::Signal(signal),
            (None, None) => ChildExit::Unknown,
        }
    }

    pub fn is_clean(&self) -> bool {
        matches!(self, ChildExit::Clean)
    }

    /// The dirty-exit fault for an abnormal exit, or `None` for a clean one.
    pub fn fault(&self) -> Option<JobFault> {
        match self {
            ChildExit::Clean => None,
            ChildExit::Code(code) => Some(JobFault::dirty_exit(format!(
                "Job exited with exit code {}",
                code
            ))),
            ChildExit::Signal(signal) => Some(JobFault::dirty_exit(format!(
                "Job was killed by signal {}",
                signal
            ))),
            ChildExit::Unknown => Some(JobFault::dirty_exit("Job exited abnormally")),
        }
    }
}

/// Launches one child process per job.
///
/// The child gets the job as JSON in [`JOB_ENV`] and is expected to open its
/// own store connection, record the outcome and exit 0. The parent only
/// looks at the exit status.
#[derive(Debug, Clone)]
pub struct JobExecutor {
    config: ExecutorConfig,
}

impl JobExecutor {
    pub fn new(config: ExecutorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    pub fn spawn(&self, job: &Job) -> Result<Child> {
        let encoded = serde_json::to_string(job)?;

        let child = Command::new(&self.config.program)
            .args(&self.config.args)
            .envs(self.config.env.iter().cloned())
            .env(JOB_ENV, encoded)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(ResqError::Fork)?;

        tracing::debug!(
            program = %self.config.program.display(),
            pid = ?child.id(),
            job = %job,
            "Spawned job process"
        );
        Ok(child)
    }
}
