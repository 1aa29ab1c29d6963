//! The fleet-wide worker registry.
//!
//! Every running worker is a member of `resque:workers`. Alongside that
//! membership it owns two keys: `resque:worker:<id>` (the working-on record,
//! present only while a job runs) and `resque:worker:<id>:started`.

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::queue::{stat, Job, JobFault, JobPayload};
use crate::store::{keys, Store};
use crate::worker::WorkerId;

/// What a worker is busy with, as stored under `resque:worker:<id>`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkingOn {
    pub queue: String,
    pub run_at: String,
    pub payload: JobPayload,
}

impl WorkingOn {
    pub fn new(job: &Job) -> Self {
        Self {
            queue: job.queue.clone(),
            run_at: Utc::now().format("%a %b %d %H:%M:%S UTC %Y").to_string(),
            payload: job.payload.clone(),
        }
    }

    /// Rebuild the job this record describes, owned by `worker`.
    pub fn into_job(self, worker: &WorkerId) -> Job {
        let mut job = Job::new(self.queue, self.payload);
        job.worker = Some(worker.to_string());
        job
    }
}

/// Every registered worker. Entries that do not parse are skipped.
pub async fn all(store: &dyn Store) -> Result<Vec<WorkerId>> {
    let mut workers = Vec::new();
    for raw in store.smembers(&keys::workers()).await? {
        match raw.parse() {
            Ok(id) => workers.push(id),
            Err(e) => tracing::warn!(entry = %raw, error = %e, "Skipping malformed worker entry"),
        }
    }
    Ok(workers)
}

pub async fn exists(store: &dyn Store, id: &str) -> Result<bool> {
    store.sismember(&keys::workers(), id).await
}

/// Look up a registered worker by its identity string.
pub async fn find(store: &dyn Store, id: &str) -> Result<Option<WorkerId>> {
    if !exists(store, id).await? {
        return Ok(None);
    }
    Ok(id.parse().ok())
}

pub async fn register(store: &dyn Store, id: &WorkerId) -> Result<()> {
    let name = id.to_string();
    store.sadd(&keys::workers(), &name).await?;
    store
        .set(
            &keys::worker_started(&name),
            &Utc::now().format("%a %b %d %H:%M:%S UTC %Y").to_string(),
        )
        .await?;
    tracing::debug!(worker = %name, "Registered worker");
    Ok(())
}

pub async fn set_working_on(store: &dyn Store, id: &WorkerId, job: &Job) -> Result<()> {
    let record = WorkingOn::new(job);
    store
        .set(&keys::worker(&id.to_string()), &serde_json::to_string(&record)?)
        .await
}

pub async fn clear_working_on(store: &dyn Store, id: &WorkerId) -> Result<()> {
    store.del(&keys::worker(&id.to_string())).await?;
    Ok(())
}

pub async fn working_on(store: &dyn Store, id: &WorkerId) -> Result<Option<WorkingOn>> {
    match store.get(&keys::worker(&id.to_string())).await? {
        Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
        None => Ok(None),
    }
}

/// Remove a worker and everything it owns.
///
/// The job it was running (`current_job`, or else the one named by its
/// working-on record) is failed with a dirty exit first, so a vanished
/// worker never silently drops work.
pub async fn unregister(store: &dyn Store, id: &WorkerId, current_job: Option<&Job>) -> Result<()> {
    let name = id.to_string();

    let orphan = match current_job {
        Some(job) => Some(job.clone()),
        None => match working_on(store, id).await {
            Ok(record) => record.map(|r| r.into_job(id)),
            Err(e) => {
                tracing::warn!(worker = %name, error = %e, "Unreadable working-on record");
                None
            }
        },
    };
    if let Some(job) = orphan {
        tracing::warn!(worker = %name, job = %job, "Failing job held by departing worker");
        job.fail(store, &JobFault::dirty_exit("Worker exited while job was running"))
            .await?;
    }

    store.srem(&keys::workers(), &name).await?;
    store.del(&keys::worker(&name)).await?;
    store.del(&keys::worker_started(&name)).await?;
    stat::clear(store, &format!("processed:{}", name)).await?;
    stat::clear(store, &format!("failed:{}", name)).await?;
    tracing::debug!(worker = %name, "Unregistered worker");
    Ok(())
}
