//! Shard routing core for s3shard.
//!
//! s3shard presents one virtual bucket to clients while distributing objects
//! across N backend buckets ("partitions"). Related objects are grouped by
//! their first two key segments so they land on the same partition.
//!
//! # Architecture
//!
//! ```text
//!   ShardedBucket (single-object ops + listing facade)
//!        |                         |
//!        v                         v
//!   ShardRouter               Aggregator (fan-out + ordered merge)
//!     |      |                     |
//!     v      v                     v
//! key_policy HashRing        StorageBackend (in-memory, S3, ...)
//! ```
//!
//! Routing is a pure function of the configured partition list and replica
//! count; nothing here keeps global state.

pub mod aggregate;
pub mod backend;
pub mod bucket;
pub mod config;
pub mod error;
pub mod key_policy;
pub mod memory;
pub mod ring;
pub mod router;
pub mod types;

pub use aggregate::{Aggregator, ListContext, ListOutput, PartitionFailure};
pub use backend::{ObjectEntry, ObjectMetadata, StorageBackend};
pub use bucket::ShardedBucket;
pub use config::ShardConfig;
pub use error::{BackendError, ShardError, ShardResult};
pub use memory::InMemoryBackend;
pub use ring::HashRing;
pub use router::ShardRouter;
pub use types::Partition;
