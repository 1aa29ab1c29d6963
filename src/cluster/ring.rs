use std::collections::BTreeMap;

/// Virtual positions placed on the ring for each node.
pub const DEFAULT_REPLICAS: usize = 128;

/// CRC-32 (IEEE) of `data`, the hash used for both ring positions and keys.
pub fn hash(data: &str) -> u32 {
    crc32fast::hash(data.as_bytes())
}

/// Ring position label for one replica of a node.
pub fn replica_label(host: &str, port: u16, replica: usize) -> String {
    format!("{}:{}-{}", host, port, replica)
}

/// Consistent-hash ring mapping 32-bit positions to node indices.
///
/// Built once and immutable afterwards, so it can be shared between any
/// number of readers. Positions are kept sorted ascending; when two
/// replicas hash to the same position the later node owns it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HashRing {
    positions: Vec<u32>,
    owners: Vec<usize>,
    replicas: usize,
}

impl HashRing {
    /// Build a ring over `(host, port)` pairs. Node `i` in the input is
    /// reported as owner index `i`.
    pub fn new<'a, I>(nodes: I, replicas: usize) -> Self
    where
        I: IntoIterator<Item = (&'a str, u16)>,
    {
        let mut ring = BTreeMap::new();
        for (index, (host, port)) in nodes.into_iter().enumerate() {
            for replica in 1..=replicas {
                ring.insert(hash(&replica_label(host, port, replica)), index);
            }
        }

        let (positions, owners) = ring.into_iter().unzip();
        Self {
            positions,
            owners,
            replicas,
        }
    }

    /// Sorted ring positions.
    pub fn positions(&self) -> &[u32] {
        &self.positions
    }

    pub fn replicas(&self) -> usize {
        self.replicas
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Index into [`positions`](Self::positions) of the position serving `needle`.
    ///
    /// The smallest position `>= needle` wins. A needle beyond the largest
    /// position falls back to that largest position; it does not wrap to the
    /// smallest one. Returns `None` only for an empty ring.
    pub fn next_position(&self, needle: u32) -> Option<usize> {
        if self.positions.is_empty() {
            return None;
        }
        let index = self.positions.partition_point(|&p| p < needle);
        Some(index.min(self.positions.len() - 1))
    }

    /// Owner index of the node serving `needle`.
    pub fn node_for_hash(&self, needle: u32) -> Option<usize> {
        self.next_position(needle).map(|i| self.owners[i])
    }

    /// Owner index of the node serving `key`.
    pub fn node_for_key(&self, key: &str) -> Option<usize> {
        self.node_for_hash(hash(key))
    }
}
