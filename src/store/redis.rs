use async_trait::async_trait;
use ::redis::aio::MultiplexedConnection;
use ::redis::{AsyncCommands, Client};
use tokio::sync::RwLock;

use crate::error::Result;
use crate::store::Store;

/// A single Redis server.
///
/// Holds one multiplexed connection; [`Store::reconnect`] swaps it for a
/// freshly opened one.
pub struct RedisStore {
    client: Client,
    conn: RwLock<MultiplexedConnection>,
}

impl RedisStore {
    pub async fn connect(url: &str) -> Result<Self> {
        let client = Client::open(url)?;
        let conn = client.get_multiplexed_async_connection().await?;
        tracing::debug!(url, "Connected to store");
        Ok(Self {
            client,
            conn: RwLock::new(conn),
        })
    }

    async fn conn(&self) -> MultiplexedConnection {
        self.conn.read().await.clone()
    }
}

#[async_trait]
impl Store for RedisStore {
    async fn sadd(&self, key: &str, member: &str) -> Result<bool> {
        let added: i64 = self.conn().await.sadd(key, member).await?;
        Ok(added > 0)
    }

    async fn srem(&self, key: &str, member: &str) -> Result<bool> {
        let removed: i64 = self.conn().await.srem(key, member).await?;
        Ok(removed > 0)
    }

    async fn sismember(&self, key: &str, member: &str) -> Result<bool> {
        Ok(self.conn().await.sismember(key, member).await?)
    }

    async fn smembers(&self, key: &str) -> Result<Vec<String>> {
        Ok(self.conn().await.smembers(key).await?)
    }

    async fn rpush(&self, key: &str, value: &str) -> Result<usize> {
        Ok(self.conn().await.rpush(key, value).await?)
    }

    async fn lpop(&self, key: &str) -> Result<Option<String>> {
        Ok(self.conn().await.lpop(key, None).await?)
    }

    async fn llen(&self, key: &str) -> Result<usize> {
        Ok(self.conn().await.llen(key).await?)
    }

    async fn lrange(&self, key: &str, start: isize, stop: isize) -> Result<Vec<String>> {
        Ok(self.conn().await.lrange(key, start, stop).await?)
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.conn().await.get(key).await?)
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.conn().await.set::<_, _, ()>(key, value).await?;
        Ok(())
    }

    async fn del(&self, key: &str) -> Result<bool> {
        let removed: i64 = self.conn().await.del(key).await?;
        Ok(removed > 0)
    }

    async fn incr(&self, key: &str, by: i64) -> Result<i64> {
        Ok(self.conn().await.incr(key, by).await?)
    }

    async fn dbsize(&self) -> Result<usize> {
        let mut conn = self.conn().await;
        Ok(::redis::cmd("DBSIZE").query_async(&mut conn).await?)
    }

    async fn flushdb(&self) -> Result<()> {
        let mut conn = self.conn().await;
        ::redis::cmd("FLUSHDB")
            .query_async::<_, ()>(&mut conn)
            .await?;
        Ok(())
    }

    async fn reconnect(&self) -> Result<()> {
        let fresh = self.client.get_multiplexed_async_connection().await?;
        *self.conn.write().await = fresh;
        tracing::info!("Re-established store connection");
        Ok(())
    }
}
