use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::Result;
use crate::handler::JobRegistry;
use crate::queue::failure::{self, JobFault};
use crate::queue::{stat, status};
use crate::store::Store;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum JobStatus {
    Waiting,
    Running,
    Failed,
    Complete,
}

impl JobStatus {
    /// Failed and Complete are final; later updates are ignored.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Failed | JobStatus::Complete)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobStatus::Waiting => write!(f, "waiting"),
            JobStatus::Running => write!(f, "running"),
            JobStatus::Failed => write!(f, "failed"),
            JobStatus::Complete => write!(f, "complete"),
        }
    }
}

impl From<JobStatus> for u8 {
    fn from(status: JobStatus) -> u8 {
        match status {
            JobStatus::Waiting => 1,
            JobStatus::Running => 2,
            JobStatus::Failed => 3,
            JobStatus::Complete => 4,
        }
    }
}

impl TryFrom<u8> for JobStatus {
    type Error = String;

    fn try_from(code: u8) -> std::result::Result<Self, Self::Error> {
        match code {
            1 => Ok(JobStatus::Waiting),
            2 => Ok(JobStatus::Running),
            3 => Ok(JobStatus::Failed),
            4 => Ok(JobStatus::Complete),
            other => Err(format!("unknown job status {}", other)),
        }
    }
}

/// What gets pushed onto a queue: `{"class": ..., "args": [...], "id": ...}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobPayload {
    pub class: String,
    #[serde(default)]
    pub args: Vec<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

impl JobPayload {
    pub fn new(class: impl Into<String>, args: Vec<Value>) -> Self {
        Self {
            class: class.into(),
            args,
            id: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }
}

/// A payload taken off a queue, plus the worker processing it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub queue: String,
    pub payload: JobPayload,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub worker: Option<String>,
}

impl Job {
    pub fn new(queue: impl Into<String>, payload: JobPayload) -> Self {
        Self {
            queue: queue.into(),
            payload,
            worker: None,
        }
    }

    /// Push a new job onto `queue` and return its id. With `track`, a
    /// Waiting status record is written so the job's progress can be read.
    pub async fn create(
        store: &dyn Store,
        queue: &str,
        class: &str,
        args: Vec<Value>,
        track: bool,
    ) -> Result<String> {
        let id = Uuid::new_v4().simple().to_string();
        if track {
            status::track(store, &id, JobStatus::Waiting).await?;
        }
        let payload = JobPayload::new(class, args).with_id(id.clone());
        crate::queue::push(store, queue, &payload).await?;
        Ok(id)
    }

    /// Pop the next job off `queue`. Undecodable payloads are dropped.
    pub async fn reserve(store: &dyn Store, queue: &str) -> Result<Option<Job>> {
        match crate::queue::pop(store, queue).await {
            Ok(Some(payload)) => Ok(Some(Job::new(queue, payload))),
            Ok(None) => Ok(None),
            Err(crate::error::ResqError::Serialization(e)) => {
                tracing::warn!(queue, error = %e, "Dropping undecodable payload");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    pub fn id(&self) -> Option<&str> {
        self.payload.id.as_deref()
    }

    /// Update the tracked status. A no-op for untracked jobs and for jobs
    /// that already reached a terminal status.
    pub async fn update_status(&self, store: &dyn Store, to: JobStatus) -> Result<()> {
        if let Some(id) = self.id() {
            status::update(store, id, to).await?;
        }
        Ok(())
    }

    pub async fn status(&self, store: &dyn Store) -> Result<Option<JobStatus>> {
        match self.id() {
            Some(id) => Ok(status::get(store, id).await?.map(|r| r.status)),
            None => Ok(None),
        }
    }

    /// Mark the job Failed, append a failure record and bump the failure stats.
    pub async fn fail(&self, store: &dyn Store, fault: &JobFault) -> Result<()> {
        self.update_status(store, JobStatus::Failed).await?;
        failure::record(store, self, fault).await?;
        stat::incr(store, "failed").await?;
        if let Some(worker) = &self.worker {
            stat::incr(store, &format!("failed:{}", worker)).await?;
        }
        Ok(())
    }

    /// Run the job's handler. Errors and panics come back as an
    /// [`JobFault::Execution`]; nothing is recorded here.
    pub async fn perform(&self, registry: &JobRegistry) -> std::result::Result<(), JobFault> {
        let handler = registry.get(&self.payload.class).ok_or_else(|| {
            JobFault::execution(format!("Could not find job class {}", self.payload.class))
        })?;

        let args = self.payload.args.clone();
        match tokio::spawn(async move { handler.perform(args).await }).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(JobFault::from_error(&*e)),
            Err(join) if join.is_panic() => Err(JobFault::panicked(join.into_panic())),
            Err(join) => Err(JobFault::execution(join.to_string())),
        }
    }
}

impl std::fmt::Display for Job {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let args = serde_json::to_string(&self.payload.args).unwrap_or_default();
        write!(
            f,
            "(Job{{{}}} | ID: {} | {} | {})",
            self.queue,
            self.id().unwrap_or(""),
            self.payload.class,
            args
        )
    }
}
