//! The virtual bucket.
//!
//! [`ShardedBucket`] is what an adapter (HTTP server, CLI) talks to. Single
//! object operations are routed to exactly one partition and forwarded to the
//! backend; errors come back untranslated. Listings go through the
//! [`Aggregator`].

use std::sync::Arc;

use bytes::Bytes;
use tracing::{Instrument, debug, debug_span, info};

use crate::aggregate::{Aggregator, ListContext, ListOutput, recursive_for_delimiter};
use crate::backend::{DEFAULT_CONTENT_TYPE, GetObjectOutput, ObjectMetadata, StorageBackend, TagSet};
use crate::error::{BackendError, ShardResult};
use crate::router::ShardRouter;
use crate::types::Partition;

/// Result of a routed upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PutObjectOutput {
    /// Partition the object was written to.
    pub partition: Partition,
    /// ETag reported by the backend.
    pub etag: String,
}

/// One virtual bucket spread over the router's partitions.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
///
/// use bytes::Bytes;
/// use s3shard_core::{InMemoryBackend, ListContext, ShardRouter, ShardedBucket};
/// use s3shard_core::types::partitions;
///
/// # tokio_test::block_on(async {
/// let router = ShardRouter::new(partitions(["bucket1", "bucket2"]), 100).unwrap();
/// let bucket = ShardedBucket::new(Arc::new(router), Arc::new(InMemoryBackend::new()));
/// bucket.ensure_partitions().await.unwrap();
///
/// bucket.put_object("tenant/block/data", Bytes::from("x"), None).await.unwrap();
/// let listing = bucket.list_objects("tenant/", None, &ListContext::new()).await;
/// assert_eq!(listing.entries.len(), 1);
/// # });
/// ```
#[derive(Debug, Clone)]
pub struct ShardedBucket {
    router: Arc<ShardRouter>,
    backend: Arc<dyn StorageBackend>,
    aggregator: Aggregator,
}

impl ShardedBucket {
    /// Create a bucket over `router`'s partitions stored in `backend`.
    #[must_use]
    pub fn new(router: Arc<ShardRouter>, backend: Arc<dyn StorageBackend>) -> Self {
        let aggregator = Aggregator::new(Arc::clone(&router), Arc::clone(&backend));
        Self {
            router,
            backend,
            aggregator,
        }
    }

    /// Limit how many partitions a listing touches at once.
    #[must_use]
    pub fn with_list_concurrency(mut self, limit: usize) -> Self {
        self.aggregator = self.aggregator.with_concurrency(limit);
        self
    }

    /// The router in use.
    #[must_use]
    pub fn router(&self) -> &ShardRouter {
        &self.router
    }

    /// Every partition, in configuration order.
    #[must_use]
    pub fn partitions(&self) -> &[Partition] {
        self.router.all_partitions()
    }

    /// The partition that stores `key`.
    #[must_use]
    pub fn route(&self, key: &str) -> &Partition {
        self.router.route(key)
    }

    /// Create every partition's backing bucket if needed.
    ///
    /// Partitions are provisioned in configuration order; the first failure
    /// stops the loop and is returned.
    pub async fn ensure_partitions(&self) -> ShardResult<()> {
        for partition in self.partitions() {
            self.backend.ensure_partition_exists(partition).await?;
        }
        info!(partitions = self.partitions().len(), "partitions ready");
        Ok(())
    }

    /// Upload an object to its partition.
    ///
    /// `content_type` defaults to `application/octet-stream`.
    pub async fn put_object(
        &self,
        key: &str,
        body: Bytes,
        content_type: Option<&str>,
    ) -> ShardResult<PutObjectOutput> {
        let partition = self.route(key);
        let content_type = content_type
            .filter(|ct| !ct.is_empty())
            .unwrap_or(DEFAULT_CONTENT_TYPE);
        let etag = routed(
            "put",
            key,
            partition,
            self.backend.put_object(partition, key, body, content_type),
        )
        .await?;
        Ok(PutObjectOutput {
            partition: partition.clone(),
            etag,
        })
    }

    /// Download an object from its partition.
    pub async fn get_object(&self, key: &str) -> ShardResult<GetObjectOutput> {
        let partition = self.route(key);
        routed("get", key, partition, self.backend.get_object(partition, key)).await
    }

    /// Fetch object metadata from its partition.
    pub async fn head_object(&self, key: &str) -> ShardResult<ObjectMetadata> {
        let partition = self.route(key);
        routed("head", key, partition, self.backend.head_object(partition, key)).await
    }

    /// Delete an object from its partition.
    pub async fn delete_object(&self, key: &str) -> ShardResult<()> {
        let partition = self.route(key);
        routed(
            "delete",
            key,
            partition,
            self.backend.delete_object(partition, key),
        )
        .await
    }

    /// Fetch an object's tags.
    pub async fn get_object_tagging(&self, key: &str) -> ShardResult<TagSet> {
        let partition = self.route(key);
        routed(
            "get_tags",
            key,
            partition,
            self.backend.get_object_tagging(partition, key),
        )
        .await
    }

    /// Replace an object's tags.
    pub async fn put_object_tagging(&self, key: &str, tags: &TagSet) -> ShardResult<()> {
        let partition = self.route(key);
        routed(
            "put_tags",
            key,
            partition,
            self.backend.put_object_tagging(partition, key, tags),
        )
        .await
    }

    /// List the whole virtual bucket under `prefix`.
    ///
    /// A non-empty `delimiter` makes the per-partition listing non-recursive;
    /// common prefixes are not computed.
    pub async fn list_objects(
        &self,
        prefix: &str,
        delimiter: Option<&str>,
        ctx: &ListContext,
    ) -> ListOutput {
        self.aggregator
            .list(prefix, recursive_for_delimiter(delimiter), ctx)
            .await
    }
}

/// Run one routed backend call inside a span naming the operation and its
/// partition, and record the outcome.
async fn routed<T>(
    op: &'static str,
    key: &str,
    partition: &Partition,
    call: impl Future<Output = Result<T, BackendError>>,
) -> ShardResult<T> {
    let span = debug_span!("routed", op, key, partition = %partition);
    async move {
        let result = call.await;
        match &result {
            Ok(_) => debug!(outcome = "ok", "routed operation finished"),
            Err(e) => debug!(outcome = "error", error = %e, "routed operation finished"),
        }
        Ok(result?)
    }
    .instrument(span)
    .await
}
