//! Key-value store abstraction.
//!
//! Everything the worker and queues persist goes through the [`Store`] trait,
//! which covers just the set, list and string primitives they need:
//!
//! - [`MemoryStore`]: in-process map, used by tests and embedded setups
//! - [`RedisStore`]: a single Redis server over a multiplexed connection
//! - [`ClusterRouter`](crate::cluster::ClusterRouter): several Redis servers
//!   behind a consistent-hash ring
//!
//! Key names are built by [`keys`] so every component agrees on the layout.

pub mod keys;
pub mod memory;
pub mod redis;

use std::sync::Arc;

use async_trait::async_trait;

use crate::cluster::ClusterRouter;
use crate::config::BackendConfig;
use crate::error::{ResqError, Result};

pub use self::memory::MemoryStore;
pub use self::redis::RedisStore;

#[async_trait]
pub trait Store: Send + Sync {
    /// Add `member` to the set at `key`. Returns true if it was not already present.
    async fn sadd(&self, key: &str, member: &str) -> Result<bool>;

    /// Remove `member` from the set at `key`. Returns true if it was present.
    async fn srem(&self, key: &str, member: &str) -> Result<bool>;

    async fn sismember(&self, key: &str, member: &str) -> Result<bool>;

    async fn smembers(&self, key: &str) -> Result<Vec<String>>;

    /// Append to the tail of the list at `key`, returning the new length.
    async fn rpush(&self, key: &str, value: &str) -> Result<usize>;

    /// Pop from the head of the list at `key`.
    async fn lpop(&self, key: &str) -> Result<Option<String>>;

    async fn llen(&self, key: &str) -> Result<usize>;

    /// Inclusive range with Redis index semantics (negative counts from the tail).
    async fn lrange(&self, key: &str, start: isize, stop: isize) -> Result<Vec<String>>;

    async fn get(&self, key: &str) -> Result<Option<String>>;

    async fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Delete `key`. Returns true if it existed.
    async fn del(&self, key: &str) -> Result<bool>;

    async fn incr(&self, key: &str, by: i64) -> Result<i64>;

    async fn dbsize(&self) -> Result<usize>;

    async fn flushdb(&self) -> Result<()>;

    /// Drop the current connection and open a new one.
    async fn reconnect(&self) -> Result<()>;
}

/// Open a fresh connection to the configured backend.
///
/// Every process calls this itself; connections are never inherited
/// across a process boundary.
pub async fn connect(backend: &BackendConfig, database: i64) -> Result<Arc<dyn Store>> {
    match backend {
        BackendConfig::Cluster(nodes) => {
            let router = ClusterRouter::connect(nodes, database).await?;
            Ok(Arc::new(router))
        }
        other => {
            let url = other
                .connection_url(database)
                .ok_or_else(|| ResqError::InvalidBackend(other.to_string()))?;
            let store = RedisStore::connect(&url).await?;
            Ok(Arc::new(store))
        }
    }
}
