//! Public routing contract: object key -> partition.
//!
//! [`ShardRouter`] composes [`derive_routing_key`] with a [`HashRing`]. It holds
//! no mutable state, so one instance can be shared behind an `Arc` by any
//! number of concurrent callers.

use std::collections::BTreeMap;

use tracing::trace;

use crate::error::ShardResult;
use crate::key_policy::derive_routing_key;
use crate::ring::HashRing;
use crate::types::Partition;

/// Routes object keys to partitions.
///
/// # Examples
///
/// ```
/// use s3shard_core::ShardRouter;
/// use s3shard_core::types::partitions;
///
/// let router = ShardRouter::new(partitions(["bucket1", "bucket2", "bucket3"]), 100).unwrap();
/// assert_eq!(
///     router.route("single-tenant/abc123/bloom-0"),
///     router.route("single-tenant/abc123/chunks-001"),
/// );
/// assert_eq!(router.all_partitions().len(), 3);
/// ```
#[derive(Debug, Clone)]
pub struct ShardRouter {
    ring: HashRing,
}

impl ShardRouter {
    /// Build a router over `partitions` with `replicas` ring points each.
    ///
    /// # Errors
    ///
    /// Returns [`crate::ShardError::Config`] when the ring cannot be built.
    pub fn new(partitions: Vec<Partition>, replicas: usize) -> ShardResult<Self> {
        Ok(Self::from_ring(HashRing::build(partitions, replicas)?))
    }

    /// Wrap an already built ring.
    #[must_use]
    pub fn from_ring(ring: HashRing) -> Self {
        Self { ring }
    }

    /// The partition that stores `object_key`.
    #[must_use]
    pub fn route(&self, object_key: &str) -> &Partition {
        let routing_key = derive_routing_key(object_key);
        let partition = self.ring.resolve(routing_key);
        trace!(object_key, routing_key, partition = %partition, "routed key");
        partition
    }

    /// Every configured partition, in configuration order.
    #[must_use]
    pub fn all_partitions(&self) -> &[Partition] {
        self.ring.partitions()
    }

    /// The underlying ring.
    #[must_use]
    pub fn ring(&self) -> &HashRing {
        &self.ring
    }

    /// Count how many of `keys` route to each partition.
    ///
    /// Every configured partition appears in the result, possibly with zero.
    pub fn distribution<I, S>(&self, keys: I) -> BTreeMap<Partition, usize>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut counts: BTreeMap<Partition, usize> = self
            .all_partitions()
            .iter()
            .map(|p| (p.clone(), 0))
            .collect();
        for key in keys {
            let partition = self.ring.resolve(derive_routing_key(key.as_ref()));
            if let Some(count) = counts.get_mut(partition) {
                *count += 1;
            }
        }
        counts
    }
}
