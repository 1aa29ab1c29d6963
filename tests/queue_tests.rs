
use serde_json::json;

use resq::queue::{self, failure, status, Job, JobFault, JobPayload, JobStatus};
use resq::store::{keys, Store};
use test_harness::memory_store;

#[tokio::test]
async fn test_push_then_pop_returns_payload() {
    let store = memory_store();
    let payload = JobPayload::new("Send", vec![json!("a@x.com")]);

    queue::push(store.as_ref(), "emails", &payload).await.unwrap();
    let popped = queue::pop(store.as_ref(), "emails").await.unwrap().unwrap();

    assert_eq!(
        serde_json::to_value(&popped).unwrap(),
        json!({"class": "Send", "args": ["a@x.com"]})
    );
    assert_eq!(queue::size(store.as_ref(), "emails").await.unwrap(), 0);
}

#[tokio::test]
async fn test_fifo_order() {
    let store = memory_store();
    let payloads: Vec<JobPayload> = (0..20)
        .map(|i| JobPayload::new("Count", vec![json!(i)]))
        .collect();

    for payload in &payloads {
        queue::push(store.as_ref(), "numbers", payload).await.unwrap();
    }
    for expected in &payloads {
        let popped = queue::pop(store.as_ref(), "numbers").await.unwrap();
        assert_eq!(popped.as_ref(), Some(expected));
    }
    assert!(queue::pop(store.as_ref(), "numbers").await.unwrap().is_none());
}

#[tokio::test]
async fn test_queues_are_independent() {
    let store = memory_store();
    queue::enqueue(store.as_ref(), "a", "X", vec![json!(1)], false).await.unwrap();
    queue::enqueue(store.as_ref(), "b", "X", vec![json!(2)], false).await.unwrap();

    let job = queue::reserve(store.as_ref(), "b").await.unwrap().unwrap();
    assert_eq!(job.payload.args, vec![json!(2)]);
    assert_eq!(queue::size(store.as_ref(), "a").await.unwrap(), 1);
}

#[tokio::test]
async fn test_payload_wire_format_is_shared() {
    let store = memory_store();
    let id = queue::enqueue(store.as_ref(), "emails", "Send", vec![json!("a@x.com")], false)
        .await
        .unwrap();

    let raw = store.lpop(&keys::queue("emails")).await.unwrap().unwrap();
    let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
    assert_eq!(value, json!({"class": "Send", "args": ["a@x.com"], "id": id}));
}

#[tokio::test]
async fn test_status_is_terminal_once_failed() {
    let store = memory_store();
    let id = queue::enqueue(store.as_ref(), "q", "X", vec![], true).await.unwrap();
    let mut job = queue::reserve(store.as_ref(), "q").await.unwrap().unwrap();
    job.worker = Some("host:1:q".to_string());

    job.update_status(store.as_ref(), JobStatus::Running).await.unwrap();
    job.fail(store.as_ref(), &JobFault::execution("boom")).await.unwrap();
    job.update_status(store.as_ref(), JobStatus::Complete).await.unwrap();

    let record = status::get(store.as_ref(), &id).await.unwrap().unwrap();
    assert_eq!(record.status, JobStatus::Failed);
    assert_eq!(queue::stat::get(store.as_ref(), "failed").await.unwrap(), 1);
    assert_eq!(
        queue::stat::get(store.as_ref(), "failed:host:1:q").await.unwrap(),
        1
    );
}

#[tokio::test]
async fn test_failure_record_format() {
    let store = memory_store();
    let mut job = Job::new("emails", JobPayload::new("Send", vec![json!("a@x.com")]));
    job.worker = Some("web-1:42:emails".to_string());

    job.fail(store.as_ref(), &JobFault::dirty_exit("Job exited with exit code 1"))
        .await
        .unwrap();

    let raw = store.lrange(&keys::failed(), 0, -1).await.unwrap();
    let value: serde_json::Value = serde_json::from_str(&raw[0]).unwrap();
    assert_eq!(value["exception"], "DirtyExit");
    assert_eq!(value["error"], "Job exited with exit code 1");
    assert_eq!(value["worker"], "web-1:42:emails");
    assert_eq!(value["queue"], "emails");
    assert_eq!(value["payload"], json!({"class": "Send", "args": ["a@x.com"]}));
    assert_eq!(value["backtrace"], json!([]));
    assert!(value["failed_at"].as_str().unwrap().contains("UTC"));
    assert_eq!(failure::count(store.as_ref()).await.unwrap(), 1);
}
