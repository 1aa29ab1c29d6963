use std::any::Any;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::queue::{Job, JobPayload};
use crate::store::{keys, Store};

/// Why a job did not complete.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobFault {
    /// The job's own code returned an error or panicked.
    Execution {
        message: String,
        backtrace: Vec<String>,
    },
    /// The process running the job went away without recording an outcome.
    DirtyExit { message: String },
}

impl JobFault {
    pub fn execution(message: impl Into<String>) -> Self {
        JobFault::Execution {
            message: message.into(),
            backtrace: Vec::new(),
        }
    }

    /// Error message plus its `source()` chain as the backtrace.
    pub fn from_error(err: &(dyn std::error::Error + 'static)) -> Self {
        let mut backtrace = Vec::new();
        let mut source = err.source();
        while let Some(cause) = source {
            backtrace.push(format!("caused by: {}", cause));
            source = cause.source();
        }
        JobFault::Execution {
            message: err.to_string(),
            backtrace,
        }
    }

    pub fn panicked(payload: Box<dyn Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "job panicked".to_string()
        };
        JobFault::Execution {
            message: format!("panicked: {}", message),
            backtrace: Vec::new(),
        }
    }

    pub fn dirty_exit(message: impl Into<String>) -> Self {
        JobFault::DirtyExit {
            message: message.into(),
        }
    }

    /// Name stored in the failure record's `exception` field.
    pub fn kind(&self) -> &'static str {
        match self {
            JobFault::Execution { .. } => "ExecutionFault",
            JobFault::DirtyExit { .. } => "DirtyExit",
        }
    }

    pub fn message(&self) -> &str {
        match self {
            JobFault::Execution { message, .. } | JobFault::DirtyExit { message } => message,
        }
    }

    pub fn backtrace(&self) -> &[String] {
        match self {
            JobFault::Execution { backtrace, .. } => backtrace,
            JobFault::DirtyExit { .. } => &[],
        }
    }
}

impl std::fmt::Display for JobFault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.kind(), self.message())
    }
}

/// One entry of the `failed` list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureRecord {
    pub failed_at: String,
    pub payload: JobPayload,
    pub exception: String,
    pub error: String,
    pub backtrace: Vec<String>,
    pub worker: String,
    pub queue: String,
}

impl FailureRecord {
    pub fn new(job: &Job, fault: &JobFault) -> Self {
        Self {
            failed_at: Utc::now().format("%a %b %d %H:%M:%S UTC %Y").to_string(),
            payload: job.payload.clone(),
            exception: fault.kind().to_string(),
            error: fault.message().to_string(),
            backtrace: fault.backtrace().to_vec(),
            worker: job.worker.clone().unwrap_or_default(),
            queue: job.queue.clone(),
        }
    }
}

pub async fn record(store: &dyn Store, job: &Job, fault: &JobFault) -> Result<()> {
    let record = FailureRecord::new(job, fault);
    store
        .rpush(&keys::failed(), &serde_json::to_string(&record)?)
        .await?;
    tracing::debug!(queue = %job.queue, class = %job.payload.class, fault = fault.kind(), "Recorded failure");
    Ok(())
}

pub async fn count(store: &dyn Store) -> Result<usize> {
    store.llen(&keys::failed()).await
}

/// Every failure record, oldest first.
pub async fn all(store: &dyn Store) -> Result<Vec<FailureRecord>> {
    store
        .lrange(&keys::failed(), 0, -1)
        .await?
        .iter()
        .map(|raw| serde_json::from_str(raw).map_err(Into::into))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use serde_json::json;

    #[derive(Debug)]
    struct Outer(std::io::Error);

    impl std::fmt::Display for Outer {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "could not send")
        }
    }

    impl std::error::Error for Outer {
        fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
            Some(&self.0)
        }
    }

    #[test]
    fn from_error_walks_sources() {
        let err = Outer(std::io::Error::new(std::io::ErrorKind::Other, "smtp down"));
        let fault = JobFault::from_error(&err);
        assert_eq!(fault.kind(), "ExecutionFault");
        assert_eq!(fault.message(), "could not send");
        assert_eq!(fault.backtrace(), ["caused by: smtp down".to_string()]);
    }

    #[test]
    fn panicked_extracts_message() {
        let fault = JobFault::panicked(Box::new("boom"));
        assert_eq!(fault.message(), "panicked: boom");
        let fault = JobFault::panicked(Box::new(String::from("bang")));
        assert_eq!(fault.message(), "panicked: bang");
    }

    #[test]
    fn dirty_exit_display() {
        let fault = JobFault::dirty_exit("Job exited with exit code 1");
        assert_eq!(fault.to_string(), "DirtyExit: Job exited with exit code 1");
        assert!(fault.backtrace().is_empty());
    }

    #[tokio::test]
    async fn record_appends_to_failed_list() {
        let store = MemoryStore::new();
        let mut job = Job::new("emails", JobPayload::new("Send", vec![json!("a@x.com")]));
        job.worker = Some("host:1:emails".to_string());

        record(&store, &job, &JobFault::execution("nope")).await.unwrap();
        record(&store, &job, &JobFault::dirty_exit("gone")).await.unwrap();

        assert_eq!(count(&store).await.unwrap(), 2);
        let records = all(&store).await.unwrap();
        assert_eq!(records[0].exception, "ExecutionFault");
        assert_eq!(records[0].error, "nope");
        assert_eq!(records[0].worker, "host:1:emails");
        assert_eq!(records[0].queue, "emails");
        assert_eq!(records[0].payload, job.payload);
        assert_eq!(records[1].exception, "DirtyExit");
    }
}
