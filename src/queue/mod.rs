//! Named FIFO queues and the job contract built on them.
//!
//! A queue is a store list at `resque:queue:<name>` holding JSON payloads;
//! producers append to the tail, workers pop from the head. Every queue name
//! ever pushed to is remembered in the `resque:queues` set, which only grows.
//!
//! # Components
//!
//! - [`Job`]: create / reserve / perform / fail / update_status
//! - [`status`]: tracked job status records
//! - [`failure`]: fault kinds and the `failed` list
//! - [`stat`]: processed / failed counters

pub mod failure;
pub mod job;
pub mod stat;
pub mod status;

use serde_json::Value;

use crate::error::Result;
use crate::store::{keys, Store};

pub use failure::{FailureRecord, JobFault};
pub use job::{Job, JobPayload, JobStatus};

/// Append `payload` to the tail of `queue`, registering the queue name.
pub async fn push(store: &dyn Store, queue: &str, payload: &JobPayload) -> Result<()> {
    store.sadd(&keys::queues(), queue).await?;
    store
        .rpush(&keys::queue(queue), &serde_json::to_string(payload)?)
        .await?;
    Ok(())
}

/// Pop and decode the payload at the head of `queue`.
pub async fn pop(store: &dyn Store, queue: &str) -> Result<Option<JobPayload>> {
    match store.lpop(&keys::queue(queue)).await? {
        Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
        None => Ok(None),
    }
}

/// Number of pending jobs on `queue`.
pub async fn size(store: &dyn Store, queue: &str) -> Result<usize> {
    store.llen(&keys::queue(queue)).await
}

/// Create a job for `class` on `queue` and return its id.
pub async fn enqueue(
    store: &dyn Store,
    queue: &str,
    class: &str,
    args: Vec<Value>,
    track: bool,
) -> Result<String> {
    let id = Job::create(store, queue, class, args, track).await?;
    tracing::debug!(queue, class, job_id = %id, "Enqueued job");
    Ok(id)
}

/// Take the next job off `queue`, if any.
pub async fn reserve(store: &dyn Store, queue: &str) -> Result<Option<Job>> {
    Job::reserve(store, queue).await
}

/// Every queue name that has ever been pushed to.
pub async fn queues(store: &dyn Store) -> Result<Vec<String>> {
    store.smembers(&keys::queues()).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use serde_json::json;

    #[tokio::test]
    async fn push_then_pop() {
        let store = MemoryStore::new();
        let payload = JobPayload::new("Send", vec![json!("a@x.com")]);
        push(&store, "emails", &payload).await.unwrap();

        assert_eq!(size(&store, "emails").await.unwrap(), 1);
        assert_eq!(pop(&store, "emails").await.unwrap(), Some(payload));
        assert_eq!(size(&store, "emails").await.unwrap(), 0);
        assert_eq!(pop(&store, "emails").await.unwrap(), None);
    }

    #[tokio::test]
    async fn registry_only_grows() {
        let store = MemoryStore::new();
        push(&store, "b", &JobPayload::new("X", vec![])).await.unwrap();
        push(&store, "a", &JobPayload::new("X", vec![])).await.unwrap();
        pop(&store, "a").await.unwrap();
        pop(&store, "b").await.unwrap();

        let mut names = queues(&store).await.unwrap();
        names.sort();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn enqueue_with_tracking() {
        let store = MemoryStore::new();
        let id = enqueue(&store, "images", "Resize", vec![json!(640)], true)
            .await
            .unwrap();
        assert!(status::is_tracking(&store, &id).await.unwrap());

        let job = reserve(&store, "images").await.unwrap().unwrap();
        assert_eq!(job.id(), Some(id.as_str()));
        assert_eq!(job.queue, "images");
        assert_eq!(job.status(&store).await.unwrap(), Some(JobStatus::Waiting));
    }

    #[tokio::test]
    async fn enqueue_without_tracking() {
        let store = MemoryStore::new();
        let id = enqueue(&store, "images", "Resize", vec![], false)
            .await
            .unwrap();
        assert!(!status::is_tracking(&store, &id).await.unwrap());
        let job = reserve(&store, "images").await.unwrap().unwrap();
        assert_eq!(job.status(&store).await.unwrap(), None);
    }

    #[tokio::test]
    async fn reserve_drops_garbage() {
        let store = MemoryStore::new();
        store.rpush(&keys::queue("q"), "not json").await.unwrap();
        assert!(reserve(&store, "q").await.unwrap().is_none());
        assert_eq!(size(&store, "q").await.unwrap(), 0);
    }
}
