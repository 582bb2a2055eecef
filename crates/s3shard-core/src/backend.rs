//! Storage backend contract.
//!
//! Every partition is reached through the same [`StorageBackend`] capability
//! set, parameterized by the partition identifier. The routing core never
//! talks to storage directly; the facade and aggregator call this trait.

use std::collections::BTreeMap;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::stream::BoxStream;

use crate::error::BackendError;
use crate::types::Partition;

/// Content type used when the caller does not supply one.
pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Object tags, ordered by name.
pub type TagSet = BTreeMap<String, String>;

/// Lazy, finite stream of listing entries for one partition.
pub type ObjectEntryStream = BoxStream<'static, Result<ObjectEntry, BackendError>>;

/// One entry of a listing.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ObjectEntry {
    /// Object key.
    pub key: String,
    /// Size in bytes.
    pub size: u64,
    /// Last modification time.
    pub last_modified: DateTime<Utc>,
    /// Entity tag, without surrounding quotes.
    pub etag: String,
}

/// Object metadata returned by `get` and `head`.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ObjectMetadata {
    /// MIME type of the body.
    pub content_type: String,
    /// Size in bytes.
    pub size: u64,
    /// Entity tag, without surrounding quotes.
    pub etag: String,
    /// Last modification time.
    pub last_modified: DateTime<Utc>,
}

/// Body and metadata of a fetched object.
#[derive(Debug, Clone)]
pub struct GetObjectOutput {
    /// Full object body.
    pub body: Bytes,
    /// Object metadata.
    pub metadata: ObjectMetadata,
}

/// Storage operations against a single partition.
///
/// Implementations must be cheap to share: the aggregator calls
/// [`list_objects`](Self::list_objects) from one task per partition.
#[async_trait]
pub trait StorageBackend: Send + Sync + std::fmt::Debug + 'static {
    /// Store `body` under `key`, returning the ETag.
    async fn put_object(
        &self,
        partition: &Partition,
        key: &str,
        body: Bytes,
        content_type: &str,
    ) -> Result<String, BackendError>;

    /// Fetch an object.
    async fn get_object(
        &self,
        partition: &Partition,
        key: &str,
    ) -> Result<GetObjectOutput, BackendError>;

    /// Delete an object. Deleting a missing key is not an error.
    async fn delete_object(&self, partition: &Partition, key: &str) -> Result<(), BackendError>;

    /// Fetch object metadata without the body.
    async fn head_object(
        &self,
        partition: &Partition,
        key: &str,
    ) -> Result<ObjectMetadata, BackendError>;

    /// List objects under `prefix`.
    ///
    /// When `recursive` is false only keys with no `/` after the prefix are
    /// expected; the exact grouping semantics belong to the backend.
    fn list_objects(&self, partition: &Partition, prefix: &str, recursive: bool)
    -> ObjectEntryStream;

    /// Fetch the tags of an object.
    async fn get_object_tagging(
        &self,
        partition: &Partition,
        key: &str,
    ) -> Result<TagSet, BackendError>;

    /// Replace the tags of an object.
    async fn put_object_tagging(
        &self,
        partition: &Partition,
        key: &str,
        tags: &TagSet,
    ) -> Result<(), BackendError>;

    /// Create the partition's bucket if it does not exist yet.
    async fn ensure_partition_exists(&self, partition: &Partition) -> Result<(), BackendError>;
}
