//! Integer counters: `processed`, `failed` and their per-worker variants.

use crate::error::Result;
use crate::store::{keys, Store};

pub async fn incr(store: &dyn Store, name: &str) -> Result<i64> {
    store.incr(&keys::stat(name), 1).await
}

pub async fn get(store: &dyn Store, name: &str) -> Result<i64> {
    Ok(store
        .get(&keys::stat(name))
        .await?
        .and_then(|v| v.parse().ok())
        .unwrap_or(0))
}

pub async fn clear(store: &dyn Store, name: &str) -> Result<()> {
    store.del(&keys::stat(name)).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    #[tokio::test]
    async fn counters() {
        let store = MemoryStore::new();
        assert_eq!(get(&store, "processed").await.unwrap(), 0);
        incr(&store, "processed").await.unwrap();
        incr(&store, "processed").await.unwrap();
        assert_eq!(get(&store, "processed").await.unwrap(), 2);
        clear(&store, "processed").await.unwrap();
        assert_eq!(get(&store, "processed").await.unwrap(), 0);
    }
}
