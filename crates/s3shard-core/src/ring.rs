//! Consistent hash ring with virtual replicas.
//!
//! Each partition is placed on a 32-bit ring `replicas` times, at
//! `hash(partition_id + replica_index)`. A routing key resolves to the owner
//! of the first point at or after `hash(routing_key)`, wrapping around to the
//! smallest point when it hashes past the last one.
//!
//! The hash is the first four bytes of the SHA-256 digest, read big-endian.
//! Changing it (or the truncation) produces a different, incompatible ring.
//!
//! The ring is built once and never mutated; changing the partition set means
//! building a new ring. Only keys whose nearest point moved change owner.

use std::collections::{HashMap, HashSet};

use sha2::{Digest, Sha256};
use tracing::debug;

use crate::error::{ShardError, ShardResult};
use crate::types::Partition;

/// Recommended number of virtual replicas per partition.
pub const DEFAULT_REPLICAS: usize = 100;

/// Hash `input` onto the ring.
///
/// # Examples
///
/// ```
/// use s3shard_core::ring::hash_point;
///
/// // sha256("hello") starts with 2c f2 4d ba
/// assert_eq!(hash_point("hello"), 0x2cf2_4dba);
/// ```
#[must_use]
pub fn hash_point(input: &str) -> u32 {
    let digest = Sha256::digest(input.as_bytes());
    u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]])
}

/// An immutable consistent hash ring over a fixed partition list.
///
/// # Examples
///
/// ```
/// use s3shard_core::ring::HashRing;
/// use s3shard_core::types::partitions;
///
/// let ring = HashRing::build(partitions(["bucket1", "bucket2", "bucket3"]), 100).unwrap();
/// assert_eq!(ring.len(), 300);
/// assert_eq!(ring.resolve("single-tenant/abc123").as_str(), "bucket2");
/// ```
#[derive(Debug, Clone)]
pub struct HashRing {
    /// Ring points, ascending. Collisions are kept as duplicates.
    points: Vec<u32>,
    /// Point -> index into `partitions`. Later insertions win on collision.
    owners: HashMap<u32, usize>,
    /// Partitions in configuration order.
    partitions: Vec<Partition>,
    replicas: usize,
}

impl HashRing {
    /// Build a ring from `partitions`, placing each one `replicas` times.
    ///
    /// # Errors
    ///
    /// Returns [`ShardError::Config`] if `partitions` is empty, contains an
    /// empty or duplicate identifier, or `replicas` is zero.
    pub fn build(partitions: Vec<Partition>, replicas: usize) -> ShardResult<Self> {
        if partitions.is_empty() {
            return Err(ShardError::config("at least one partition is required"));
        }
        if replicas == 0 {
            return Err(ShardError::config("replicas per partition must be positive"));
        }
        let mut seen = HashSet::with_capacity(partitions.len());
        for partition in &partitions {
            if partition.as_str().is_empty() {
                return Err(ShardError::config("partition identifier must not be empty"));
            }
            if !seen.insert(partition.as_str()) {
                return Err(ShardError::config(format!(
                    "duplicate partition identifier: {partition}"
                )));
            }
        }

        let mut points = Vec::with_capacity(partitions.len() * replicas);
        let mut owners = HashMap::with_capacity(partitions.len() * replicas);
        for (index, partition) in partitions.iter().enumerate() {
            for replica in 0..replicas {
                let point = hash_point(&format!("{partition}{replica}"));
                points.push(point);
                owners.insert(point, index);
            }
        }
        points.sort_unstable();

        debug!(
            partitions = partitions.len(),
            replicas,
            points = points.len(),
            distinct_points = owners.len(),
            "built hash ring"
        );

        Ok(Self {
            points,
            owners,
            partitions,
            replicas,
        })
    }

    /// Resolve a routing key to the partition that owns it.
    #[must_use]
    pub fn resolve(&self, routing_key: &str) -> &Partition {
        let hash = hash_point(routing_key);
        let mut idx = self.points.partition_point(|&point| point < hash);
        if idx == self.points.len() {
            idx = 0;
        }
        self.owner_at(self.points[idx])
    }

    /// The partition owning `point`, if it is a ring point.
    #[must_use]
    pub fn owner_of(&self, point: u32) -> Option<&Partition> {
        self.owners.get(&point).map(|&i| &self.partitions[i])
    }

    fn owner_at(&self, point: u32) -> &Partition {
        // Every entry of `points` was inserted into `owners` in `build`.
        &self.partitions[self.owners[&point]]
    }

    /// Ring points in ascending order.
    #[must_use]
    pub fn points(&self) -> &[u32] {
        &self.points
    }

    /// Partitions in configuration order.
    #[must_use]
    pub fn partitions(&self) -> &[Partition] {
        &self.partitions
    }

    /// Virtual replicas per partition.
    #[must_use]
    pub fn replicas(&self) -> usize {
        self.replicas
    }

    /// Number of ring points (`partitions * replicas`).
    #[must_use]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Always false for a successfully built ring.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}
