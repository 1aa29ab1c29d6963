//! Store key layout. Every key lives under the `resque:` namespace.

pub const NAMESPACE: &str = "resque";

/// Set of every queue name ever pushed to.
pub fn queues() -> String {
    format!("{}:queues", NAMESPACE)
}

pub fn queue(name: &str) -> String {
    format!("{}:queue:{}", NAMESPACE, name)
}

/// Set of registered worker ids.
pub fn workers() -> String {
    format!("{}:workers", NAMESPACE)
}

/// What the worker is currently processing.
pub fn worker(id: &str) -> String {
    format!("{}:worker:{}", NAMESPACE, id)
}

pub fn worker_started(id: &str) -> String {
    format!("{}:worker:{}:started", NAMESPACE, id)
}

pub fn stat(name: &str) -> String {
    format!("{}:stat:{}", NAMESPACE, name)
}

pub fn failed() -> String {
    format!("{}:failed", NAMESPACE)
}

pub fn job_status(id: &str) -> String {
    format!("{}:job:{}:status", NAMESPACE, id)
}
