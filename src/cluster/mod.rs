//! Consistent-hash routing over several store nodes.
//!
//! - [`HashRing`]: sorted CRC-32 positions, `replicas` per node
//! - [`ClusterRouter`]: picks the node for a command and implements
//!   [`Store`](crate::store::Store) by forwarding to it

pub mod ring;
pub mod router;

pub use ring::{HashRing, DEFAULT_REPLICAS};
pub use router::{is_exempt, ClusterNode, ClusterRouter, EXEMPT_COMMANDS};
