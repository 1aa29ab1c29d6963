use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::cluster::ring::{HashRing, DEFAULT_REPLICAS};
use crate::config::NodeAddr;
use crate::error::{ResqError, Result};
use crate::store::{RedisStore, Store};

/// Commands that are not tied to a key. They always go to the first node.
pub const EXEMPT_COMMANDS: &[&str] = &[
    "RANDOMKEY", "DBSIZE", "SELECT", "MOVE", "FLUSHDB", "FLUSHALL", "SAVE", "BGSAVE",
    "LASTSAVE", "SHUTDOWN", "INFO", "MONITOR", "SLAVEOF",
];

/// Case-insensitive membership test against [`EXEMPT_COMMANDS`].
pub fn is_exempt(command: &str) -> bool {
    EXEMPT_COMMANDS
        .iter()
        .any(|exempt| exempt.eq_ignore_ascii_case(command))
}

/// One backend node behind the router.
pub struct ClusterNode {
    addr: NodeAddr,
    store: Arc<dyn Store>,
}

impl ClusterNode {
    pub fn addr(&self) -> &NodeAddr {
        &self.addr
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }
}

impl std::fmt::Debug for ClusterNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClusterNode").field("addr", &self.addr).finish()
    }
}

/// Routes store commands across several nodes with a consistent-hash ring.
///
/// Keyed commands go to the node owning `crc32(key)` on the ring; commands in
/// [`EXEMPT_COMMANDS`] go to the first configured node. Nodes registered with
/// an alias can also be addressed directly through [`to_alias`](Self::to_alias).
///
/// The router itself implements [`Store`], forwarding each typed operation
/// to the node chosen for its key, so the queues and workers never know
/// whether they talk to one server or many.
#[derive(Debug)]
pub struct ClusterRouter {
    nodes: Vec<ClusterNode>,
    ring: HashRing,
    aliases: HashMap<String, usize>,
}

impl ClusterRouter {
    pub fn new(nodes: Vec<(NodeAddr, Arc<dyn Store>)>) -> Result<Self> {
        Self::with_replicas(nodes, DEFAULT_REPLICAS)
    }

    pub fn with_replicas(nodes: Vec<(NodeAddr, Arc<dyn Store>)>, replicas: usize) -> Result<Self> {
        if nodes.is_empty() {
            return Err(ResqError::EmptyCluster);
        }

        let nodes: Vec<ClusterNode> = nodes
            .into_iter()
            .map(|(addr, store)| ClusterNode { addr, store })
            .collect();

        let aliases = nodes
            .iter()
            .enumerate()
            .filter_map(|(i, node)| node.addr.alias.clone().map(|alias| (alias, i)))
            .collect();

        let ring = HashRing::new(
            nodes.iter().map(|n| (n.addr.host.as_str(), n.addr.port)),
            replicas,
        );
        if ring.is_empty() {
            return Err(ResqError::EmptyCluster);
        }

        tracing::debug!(
            nodes = nodes.len(),
            positions = ring.len(),
            "Built cluster hash ring"
        );

        Ok(Self {
            nodes,
            ring,
            aliases,
        })
    }

    /// Open a Redis connection to every node and build the ring over them.
    pub async fn connect(addrs: &[NodeAddr], database: i64) -> Result<Self> {
        let mut nodes: Vec<(NodeAddr, Arc<dyn Store>)> = Vec::with_capacity(addrs.len());
        for addr in addrs {
            let store = RedisStore::connect(&addr.redis_url(database)).await?;
            nodes.push((addr.clone(), Arc::new(store)));
        }
        Self::new(nodes)
    }

    /// Pick the node for `command`. Exempt commands go to the first node;
    /// everything else hashes its first argument.
    pub fn dispatch(&self, command: &str, args: &[&str]) -> Result<&ClusterNode> {
        if is_exempt(command) {
            return Ok(self.first());
        }
        let key = args
            .first()
            .ok_or_else(|| ResqError::MissingKey(command.to_ascii_uppercase()))?;
        Ok(self.node_for_key(key))
    }

    pub fn node_for_key(&self, key: &str) -> &ClusterNode {
        let index = self.ring.node_for_key(key).unwrap_or(0);
        &self.nodes[index]
    }

    pub fn to_alias(&self, alias: &str) -> Result<&ClusterNode> {
        self.aliases
            .get(alias)
            .map(|&i| &self.nodes[i])
            .ok_or_else(|| ResqError::AliasNotFound(alias.to_string()))
    }

    pub fn first(&self) -> &ClusterNode {
        &self.nodes[0]
    }

    pub fn nodes(&self) -> &[ClusterNode] {
        &self.nodes
    }

    pub fn ring(&self) -> &HashRing {
        &self.ring
    }

    fn keyed(&self, key: &str) -> &dyn Store {
        self.node_for_key(key).store.as_ref()
    }
}

#[async_trait]
impl Store for ClusterRouter {
    async fn sadd(&self, key: &str, member: &str) -> Result<bool> {
        self.keyed(key).sadd(key, member).await
    }

    async fn srem(&self, key: &str, member: &str) -> Result<bool> {
        self.keyed(key).srem(key, member).await
    }

    async fn sismember(&self, key: &str, member: &str) -> Result<bool> {
        self.keyed(key).sismember(key, member).await
    }

    async fn smembers(&self, key: &str) -> Result<Vec<String>> {
        self.keyed(key).smembers(key).await
    }

    async fn rpush(&self, key: &str, value: &str) -> Result<usize> {
        self.keyed(key).rpush(key, value).await
    }

    async fn lpop(&self, key: &str) -> Result<Option<String>> {
        self.keyed(key).lpop(key).await
    }

    async fn llen(&self, key: &str) -> Result<usize> {
        self.keyed(key).llen(key).await
    }

    async fn lrange(&self, key: &str, start: isize, stop: isize) -> Result<Vec<String>> {
        self.keyed(key).lrange(key, start, stop).await
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        self.keyed(key).get(key).await
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.keyed(key).set(key, value).await
    }

    async fn del(&self, key: &str) -> Result<bool> {
        self.keyed(key).del(key).await
    }

    async fn incr(&self, key: &str, by: i64) -> Result<i64> {
        self.keyed(key).incr(key, by).await
    }

    async fn dbsize(&self) -> Result<usize> {
        self.first().store.dbsize().await
    }

    async fn flushdb(&self) -> Result<()> {
        self.first().store.flushdb().await
    }

    async fn reconnect(&self) -> Result<()> {
        for node in &self.nodes {
            node.store.reconnect().await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn router(addrs: &[NodeAddr]) -> ClusterRouter {
        let nodes = addrs
            .iter()
            .map(|a| (a.clone(), Arc::new(MemoryStore::new()) as Arc<dyn Store>))
            .collect();
        ClusterRouter::new(nodes).unwrap()
    }

    #[test]
    fn exempt_is_case_insensitive() {
        assert!(is_exempt("FLUSHDB"));
        assert!(is_exempt("flushdb"));
        assert!(is_exempt("Select"));
        assert!(!is_exempt("GET"));
        assert!(!is_exempt("RPUSH"));
    }

    #[test]
    fn empty_cluster_is_rejected() {
        assert!(matches!(
            ClusterRouter::new(Vec::new()),
            Err(ResqError::EmptyCluster)
        ));
    }

    #[test]
    fn zero_replicas_is_rejected() {
        let nodes = vec![(
            NodeAddr::new("a", 6379),
            Arc::new(MemoryStore::new()) as Arc<dyn Store>,
        )];
        assert!(matches!(
            ClusterRouter::with_replicas(nodes, 0),
            Err(ResqError::EmptyCluster)
        ));
    }

    #[test]
    fn hashed_command_without_key_is_invalid() {
        let r = router(&[NodeAddr::new("a", 6379)]);
        assert!(matches!(
            r.dispatch("get", &[]),
            Err(ResqError::MissingKey(cmd)) if cmd == "GET"
        ));
        assert!(r.dispatch("INFO", &[]).is_ok());
    }

    #[test]
    fn alias_lookup() {
        let r = router(&[
            NodeAddr::new("a", 6379),
            NodeAddr::new("b", 6379).with_alias("stats"),
        ]);
        assert_eq!(r.to_alias("stats").unwrap().addr().host, "b");
        assert!(matches!(
            r.to_alias("nope"),
            Err(ResqError::AliasNotFound(name)) if name == "nope"
        ));
    }

    #[test]
    fn single_node_gets_everything() {
        let r = router(&[NodeAddr::new("only", 6379)]);
        for key in ["a", "b", "resque:queue:emails"] {
            assert_eq!(r.node_for_key(key).addr().host, "only");
        }
    }

    #[tokio::test]
    async fn keyed_writes_land_on_the_owning_node() {
        let r = router(&[NodeAddr::new("a", 6379), NodeAddr::new("b", 6379)]);
        for i in 0..50 {
            let key = format!("key:{}", i);
            r.set(&key, "v").await.unwrap();
            let owner = r.node_for_key(&key);
            assert_eq!(owner.store().get(&key).await.unwrap().as_deref(), Some("v"));
            for other in r.nodes().iter().filter(|n| n.addr() != owner.addr()) {
                assert_eq!(other.store().get(&key).await.unwrap(), None);
            }
        }
    }

    #[tokio::test]
    async fn exempt_operations_hit_first_node() {
        let r = router(&[NodeAddr::new("a", 6379), NodeAddr::new("b", 6379)]);
        r.nodes()[1].store().set("x", "1").await.unwrap();
        r.nodes()[0].store().set("y", "1").await.unwrap();

        assert_eq!(r.dbsize().await.unwrap(), 1);
        r.flushdb().await.unwrap();
        assert_eq!(r.nodes()[0].store().dbsize().await.unwrap(), 0);
        assert_eq!(r.nodes()[1].store().dbsize().await.unwrap(), 1);
    }
}
