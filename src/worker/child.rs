//! The job process side of process-per-job execution.

use crate::error::{ResqError, Result};
use crate::handler::JobRegistry;
use crate::queue::{Job, JobStatus};
use crate::store::Store;
use crate::worker::executor::JOB_ENV;

/// Run `job` and record how it went. A job fault is recorded against the
/// job and is not an error here; only store failures are.
pub async fn perform(store: &dyn Store, registry: &JobRegistry, job: &Job) -> Result<()> {
    tracing::info!(job = %job, "Processing job");
    match job.perform(registry).await {
        Ok(()) => {
            job.update_status(store, JobStatus::Complete).await?;
            tracing::info!(job = %job, "Job done");
        }
        Err(fault) => {
            tracing::warn!(job = %job, error = %fault, "Job failed");
            job.fail(store, &fault).await?;
        }
    }
    Ok(())
}

/// Decode the job handed over by the parent and perform it.
pub async fn perform_from_env(store: &dyn Store, registry: &JobRegistry) -> Result<()> {
    let raw = std::env::var(JOB_ENV)
        .map_err(|_| ResqError::Internal(format!("{} is not set", JOB_ENV)))?;
    let job: Job = serde_json::from_str(&raw)?;
    perform(store, registry, &job).await
}
