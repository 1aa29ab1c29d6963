//! Tracked job status, stored as `{"status": n, "updated": ts, "started": ts}`.

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::queue::JobStatus;
use crate::store::{keys, Store};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusRecord {
    pub status: JobStatus,
    pub updated: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started: Option<i64>,
}

/// Start tracking job `id` with an initial status.
pub async fn track(store: &dyn Store, id: &str, status: JobStatus) -> Result<()> {
    let now = Utc::now().timestamp();
    let record = StatusRecord {
        status,
        updated: now,
        started: Some(now),
    };
    store
        .set(&keys::job_status(id), &serde_json::to_string(&record)?)
        .await
}

pub async fn get(store: &dyn Store, id: &str) -> Result<Option<StatusRecord>> {
    match store.get(&keys::job_status(id)).await? {
        Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
        None => Ok(None),
    }
}

pub async fn is_tracking(store: &dyn Store, id: &str) -> Result<bool> {
    Ok(store.get(&keys::job_status(id)).await?.is_some())
}

/// Move a tracked job to `status`. Returns false when nothing was written:
/// the job is not tracked, or it already reached Failed or Complete.
pub async fn update(store: &dyn Store, id: &str, status: JobStatus) -> Result<bool> {
    let Some(current) = get(store, id).await? else {
        return Ok(false);
    };
    if current.status.is_terminal() {
        tracing::debug!(job_id = id, current = %current.status, requested = %status, "Ignoring update of finished job");
        return Ok(false);
    }

    let record = StatusRecord {
        status,
        updated: Utc::now().timestamp(),
        started: current.started,
    };
    store
        .set(&keys::job_status(id), &serde_json::to_string(&record)?)
        .await?;
    Ok(true)
}

/// Stop tracking job `id`.
pub async fn stop(store: &dyn Store, id: &str) -> Result<()> {
    store.del(&keys::job_status(id)).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    #[tokio::test]
    async fn untracked_jobs_are_ignored() {
        let store = MemoryStore::new();
        assert!(!update(&store, "nope", JobStatus::Running).await.unwrap());
        assert!(get(&store, "nope").await.unwrap().is_none());
        assert!(!is_tracking(&store, "nope").await.unwrap());
    }

    #[tokio::test]
    async fn status_moves_forward_until_terminal() {
        let store = MemoryStore::new();
        track(&store, "j1", JobStatus::Waiting).await.unwrap();
        assert!(is_tracking(&store, "j1").await.unwrap());

        assert!(update(&store, "j1", JobStatus::Running).await.unwrap());
        assert!(update(&store, "j1", JobStatus::Complete).await.unwrap());
        assert!(!update(&store, "j1", JobStatus::Failed).await.unwrap());

        let record = get(&store, "j1").await.unwrap().unwrap();
        assert_eq!(record.status, JobStatus::Complete);
        assert!(record.started.is_some());
    }

    #[tokio::test]
    async fn stop_removes_record() {
        let store = MemoryStore::new();
        track(&store, "j2", JobStatus::Waiting).await.unwrap();
        stop(&store, "j2").await.unwrap();
        assert!(!is_tracking(&store, "j2").await.unwrap());
    }
}
