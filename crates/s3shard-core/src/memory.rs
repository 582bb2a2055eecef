//! In-memory storage backend.
//!
//! [`InMemoryBackend`] keeps every partition's objects in one [`DashMap`]
//! keyed by `(partition, key)`. It is used by tests and local dry runs; it
//! behaves like a bucket store closely enough for routing and listing:
//!
//! - ETags are the hex MD5 of the body.
//! - Listings are lexicographic by key and filtered by prefix.
//! - Non-recursive listings skip keys that have a `/` after the prefix.
//! - Partitions must be provisioned with
//!   [`ensure_partition_exists`](StorageBackend::ensure_partition_exists)
//!   before use.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use dashmap::{DashMap, DashSet};
use futures::StreamExt;
use md5::{Digest, Md5};
use tracing::{debug, trace};

use crate::backend::{
    GetObjectOutput, ObjectEntry, ObjectEntryStream, ObjectMetadata, StorageBackend, TagSet,
};
use crate::error::BackendError;
use crate::types::Partition;

/// Composite key identifying a stored object: `(partition, key)`.
type StorageKey = (String, String);

#[derive(Debug, Clone)]
struct StoredObject {
    data: Bytes,
    metadata: ObjectMetadata,
    tags: TagSet,
}

/// Thread-safe in-memory [`StorageBackend`].
///
/// # Examples
///
/// ```
/// use bytes::Bytes;
/// use s3shard_core::{InMemoryBackend, Partition, StorageBackend};
///
/// # tokio_test::block_on(async {
/// let backend = InMemoryBackend::new();
/// let p = Partition::new("bucket1");
/// backend.ensure_partition_exists(&p).await.unwrap();
/// backend
///     .put_object(&p, "tenant/a/data", Bytes::from("hello"), "text/plain")
///     .await
///     .unwrap();
/// let out = backend.get_object(&p, "tenant/a/data").await.unwrap();
/// assert_eq!(out.body.as_ref(), b"hello");
/// # });
/// ```
#[derive(Debug, Default)]
pub struct InMemoryBackend {
    partitions: DashSet<String>,
    objects: DashMap<StorageKey, StoredObject>,
}

impl InMemoryBackend {
    /// Create an empty backend with no partitions.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of objects stored in `partition`.
    #[must_use]
    pub fn object_count(&self, partition: &Partition) -> usize {
        self.objects
            .iter()
            .filter(|entry| entry.key().0 == partition.as_str())
            .count()
    }

    /// Whether `partition` has been provisioned.
    #[must_use]
    pub fn has_partition(&self, partition: &Partition) -> bool {
        self.partitions.contains(partition.as_str())
    }

    /// Drop all partitions and objects.
    pub fn reset(&self) {
        self.objects.clear();
        self.partitions.clear();
    }

    fn require_partition(&self, partition: &Partition) -> Result<(), BackendError> {
        if self.has_partition(partition) {
            Ok(())
        } else {
            Err(BackendError::request(
                partition.as_str(),
                anyhow::anyhow!("partition {partition} does not exist"),
            ))
        }
    }

    fn storage_key(partition: &Partition, key: &str) -> StorageKey {
        (partition.as_str().to_owned(), key.to_owned())
    }

    fn not_found(partition: &Partition, key: &str) -> BackendError {
        BackendError::NotFound {
            partition: partition.as_str().to_owned(),
            key: key.to_owned(),
        }
    }

    fn snapshot(&self, partition: &Partition, prefix: &str, recursive: bool) -> Vec<ObjectEntry> {
        let mut entries: Vec<ObjectEntry> = self
            .objects
            .iter()
            .filter(|entry| {
                let (p, key) = entry.key();
                p == partition.as_str()
                    && key
                        .strip_prefix(prefix)
                        .is_some_and(|rest| recursive || !rest.contains('/'))
            })
            .map(|entry| {
                let meta = &entry.value().metadata;
                ObjectEntry {
                    key: entry.key().1.clone(),
                    size: meta.size,
                    last_modified: meta.last_modified,
                    etag: meta.etag.clone(),
                }
            })
            .collect();
        entries.sort_by(|a, b| a.key.cmp(&b.key));
        entries
    }
}

#[async_trait]
impl StorageBackend for InMemoryBackend {
    async fn put_object(
        &self,
        partition: &Partition,
        key: &str,
        body: Bytes,
        content_type: &str,
    ) -> Result<String, BackendError> {
        self.require_partition(partition)?;

        let etag = hex::encode(Md5::digest(&body));
        let metadata = ObjectMetadata {
            content_type: content_type.to_owned(),
            size: body.len() as u64,
            etag: etag.clone(),
            last_modified: Utc::now(),
        };
        trace!(partition = %partition, key, size = metadata.size, "stored object");
        self.objects.insert(
            Self::storage_key(partition, key),
            StoredObject {
                data: body,
                metadata,
                tags: TagSet::new(),
            },
        );
        Ok(etag)
    }

    async fn get_object(
        &self,
        partition: &Partition,
        key: &str,
    ) -> Result<GetObjectOutput, BackendError> {
        self.require_partition(partition)?;
        let entry = self
            .objects
            .get(&Self::storage_key(partition, key))
            .ok_or_else(|| Self::not_found(partition, key))?;
        Ok(GetObjectOutput {
            body: entry.data.clone(),
            metadata: entry.metadata.clone(),
        })
    }

    async fn delete_object(&self, partition: &Partition, key: &str) -> Result<(), BackendError> {
        self.require_partition(partition)?;
        if self
            .objects
            .remove(&Self::storage_key(partition, key))
            .is_some()
        {
            trace!(partition = %partition, key, "deleted object");
        }
        Ok(())
    }

    async fn head_object(
        &self,
        partition: &Partition,
        key: &str,
    ) -> Result<ObjectMetadata, BackendError> {
        self.require_partition(partition)?;
        self.objects
            .get(&Self::storage_key(partition, key))
            .map(|entry| entry.metadata.clone())
            .ok_or_else(|| Self::not_found(partition, key))
    }

    fn list_objects(
        &self,
        partition: &Partition,
        prefix: &str,
        recursive: bool,
    ) -> ObjectEntryStream {
        if let Err(e) = self.require_partition(partition) {
            return futures::stream::once(async move { Err(e) }).boxed();
        }
        let entries = self.snapshot(partition, prefix, recursive);
        futures::stream::iter(entries.into_iter().map(Ok)).boxed()
    }

    async fn get_object_tagging(
        &self,
        partition: &Partition,
        key: &str,
    ) -> Result<TagSet, BackendError> {
        self.require_partition(partition)?;
        self.objects
            .get(&Self::storage_key(partition, key))
            .map(|entry| entry.tags.clone())
            .ok_or_else(|| Self::not_found(partition, key))
    }

    async fn put_object_tagging(
        &self,
        partition: &Partition,
        key: &str,
        tags: &TagSet,
    ) -> Result<(), BackendError> {
        self.require_partition(partition)?;
        let mut entry = self
            .objects
            .get_mut(&Self::storage_key(partition, key))
            .ok_or_else(|| Self::not_found(partition, key))?;
        entry.tags = tags.clone();
        Ok(())
    }

    async fn ensure_partition_exists(&self, partition: &Partition) -> Result<(), BackendError> {
        if self.partitions.insert(partition.as_str().to_owned()) {
            debug!(partition = %partition, "created partition");
        }
        Ok(())
    }
}
