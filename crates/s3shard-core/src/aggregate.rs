//! Bucket-wide listing across all partitions.
//!
//! [`Aggregator::list`] fans one listing out to every configured partition,
//! one tokio task per partition, and merges the results:
//!
//! - Entries are concatenated in partition configuration order, then in each
//!   partition's own order. Nothing is re-sorted, and task completion order
//!   never affects the output.
//! - A partition that fails (backend error, cancellation, deadline, panic)
//!   contributes no entries and is reported as a [`PartitionFailure`]. The
//!   listing as a whole never fails.
//! - Results are never truncated and carry no continuation token.
//! - Common-prefix grouping is not computed.

use std::sync::Arc;
use std::time::Duration;

use futures::TryStreamExt;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::backend::{ObjectEntry, StorageBackend};
use crate::error::BackendError;
use crate::router::ShardRouter;
use crate::types::Partition;

/// Cancellation and deadline for one listing.
///
/// Cloning shares the cancellation token, so cancelling any clone stops every
/// in-flight partition call.
#[derive(Debug, Clone, Default)]
pub struct ListContext {
    cancel: CancellationToken,
    deadline: Option<Instant>,
}

impl ListContext {
    /// A context with a fresh token and no deadline.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A context observing an existing cancellation token.
    #[must_use]
    pub fn with_cancellation(cancel: CancellationToken) -> Self {
        Self {
            cancel,
            deadline: None,
        }
    }

    /// Set an absolute deadline.
    #[must_use]
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Set a deadline `timeout` from now.
    #[must_use]
    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// The token observed by partition calls.
    #[must_use]
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// The deadline, if any.
    #[must_use]
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Cancel every call running under this context.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }
}

/// A partition whose listing did not complete.
#[derive(Debug)]
pub struct PartitionFailure {
    /// The failed partition.
    pub partition: Partition,
    /// Why it failed.
    pub error: BackendError,
}

/// Merged result of a bucket-wide listing.
#[derive(Debug, Default)]
pub struct ListOutput {
    /// Entries in partition order, then per-partition order.
    pub entries: Vec<ObjectEntry>,
    /// Partitions whose entries are missing from `entries`.
    pub failures: Vec<PartitionFailure>,
}

impl ListOutput {
    /// Always false: listings are never paginated.
    #[must_use]
    pub fn is_truncated(&self) -> bool {
        false
    }

    /// Whether every partition contributed.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Fans listings out across all partitions of a [`ShardRouter`].
#[derive(Debug, Clone)]
pub struct Aggregator {
    router: Arc<ShardRouter>,
    backend: Arc<dyn StorageBackend>,
    concurrency: usize,
}

impl Aggregator {
    /// Create an aggregator that lists every partition at once.
    #[must_use]
    pub fn new(router: Arc<ShardRouter>, backend: Arc<dyn StorageBackend>) -> Self {
        let concurrency = router.all_partitions().len();
        Self {
            router,
            backend,
            concurrency,
        }
    }

    /// Limit how many partitions are listed at the same time (minimum 1).
    #[must_use]
    pub fn with_concurrency(mut self, limit: usize) -> Self {
        self.concurrency = limit.max(1);
        self
    }

    /// Maximum number of partitions listed at the same time.
    #[must_use]
    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// List every partition under `prefix` and merge the results.
    ///
    /// `recursive` is passed through to the backend: true for flat listings,
    /// false when the caller asked for delimiter grouping.
    pub async fn list(&self, prefix: &str, recursive: bool, ctx: &ListContext) -> ListOutput {
        let partitions = self.router.all_partitions();
        let permits = Arc::new(Semaphore::new(self.concurrency));
        let started = Instant::now();

        // Dropping the set aborts every task still running.
        let mut tasks = JoinSet::new();
        for (index, partition) in partitions.iter().enumerate() {
            let backend = Arc::clone(&self.backend);
            let partition = partition.clone();
            let prefix = prefix.to_owned();
            let ctx = ctx.clone();
            let permits = Arc::clone(&permits);
            tasks.spawn(async move {
                let result =
                    list_partition(backend.as_ref(), &partition, &prefix, recursive, &ctx, permits)
                        .await;
                (index, result)
            });
        }

        let mut slots: Vec<Option<Result<Vec<ObjectEntry>, BackendError>>> =
            std::iter::repeat_with(|| None).take(partitions.len()).collect();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, result)) => slots[index] = Some(result),
                Err(e) => warn!(error = %e, "partition list task did not finish"),
            }
        }

        let mut output = ListOutput::default();
        for (partition, slot) in partitions.iter().zip(slots) {
            let result = slot.unwrap_or_else(|| {
                Err(BackendError::request(
                    partition.as_str(),
                    anyhow::anyhow!("list task aborted"),
                ))
            });
            match result {
                Ok(entries) => output.entries.extend(entries),
                Err(error) => {
                    warn!(partition = %partition, prefix, error = %error, "partition listing failed");
                    output.failures.push(PartitionFailure {
                        partition: partition.clone(),
                        error,
                    });
                }
            }
        }

        debug!(
            prefix,
            recursive,
            partitions = partitions.len(),
            entries = output.entries.len(),
            failures = output.failures.len(),
            elapsed_ms = started.elapsed().as_millis(),
            "aggregated listing"
        );
        output
    }
}

/// List one partition, honoring the permit pool, cancellation and deadline.
async fn list_partition(
    backend: &dyn StorageBackend,
    partition: &Partition,
    prefix: &str,
    recursive: bool,
    ctx: &ListContext,
    permits: Arc<Semaphore>,
) -> Result<Vec<ObjectEntry>, BackendError> {
    let work = async {
        let _permit = permits
            .acquire_owned()
            .await
            .map_err(|e| BackendError::request(partition.as_str(), e))?;
        let started = Instant::now();
        let entries: Vec<ObjectEntry> = backend
            .list_objects(partition, prefix, recursive)
            .try_collect()
            .await?;
        debug!(
            partition = %partition,
            count = entries.len(),
            elapsed_ms = started.elapsed().as_millis(),
            "listed partition"
        );
        Ok(entries)
    };

    let bounded = async {
        match ctx.deadline {
            Some(deadline) => tokio::time::timeout_at(deadline, work)
                .await
                .unwrap_or_else(|_| Err(BackendError::DeadlineExceeded)),
            None => work.await,
        }
    };

    tokio::select! {
        biased;
        () = ctx.cancel.cancelled() => Err(BackendError::Cancelled),
        result = bounded => result,
    }
}

/// Whether a listing with this delimiter should be recursive.
///
/// A missing or empty delimiter means a flat, recursive listing.
#[must_use]
pub fn recursive_for_delimiter(delimiter: Option<&str>) -> bool {
    delimiter.is_none_or(str::is_empty)
}

#[cfg(test)]
mod tests {
    use std::collections::{HashMap, HashSet};
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use bytes::Bytes;
    use futures::StreamExt;

    use super::*;
    use crate::backend::{GetObjectOutput, ObjectEntryStream, ObjectMetadata, TagSet};
    use crate::memory::InMemoryBackend;
    use crate::types::partitions;

    /// Wraps [`InMemoryBackend`] and injects listing faults per partition.
    #[derive(Debug, Default)]
    struct FlakyBackend {
        inner: InMemoryBackend,
        failing: HashSet<String>,
        failing_mid_stream: HashSet<String>,
        panicking: HashSet<String>,
        delays: HashMap<String, Duration>,
        in_flight: Arc<AtomicUsize>,
        peak_in_flight: Arc<AtomicUsize>,
    }

    /// Counts a listing as in flight until its stream is dropped.
    struct InFlight(Arc<AtomicUsize>);

    impl InFlight {
        fn start(counter: &Arc<AtomicUsize>, peak: &AtomicUsize) -> Self {
            let now = counter.fetch_add(1, Ordering::SeqCst) + 1;
            peak.fetch_max(now, Ordering::SeqCst);
            Self(Arc::clone(counter))
        }
    }

    impl Drop for InFlight {
        fn drop(&mut self) {
            self.0.fetch_sub(1, Ordering::SeqCst);
        }
    }

    impl FlakyBackend {
        fn fail(mut self, partition: &str) -> Self {
            self.failing.insert(partition.to_owned());
            self
        }

        fn fail_mid_stream(mut self, partition: &str) -> Self {
            self.failing_mid_stream.insert(partition.to_owned());
            self
        }

        fn panic_on(mut self, partition: &str) -> Self {
            self.panicking.insert(partition.to_owned());
            self
        }

        fn delay(mut self, partition: &str, delay: Duration) -> Self {
            self.delays.insert(partition.to_owned(), delay);
            self
        }

        fn peak_in_flight(&self) -> usize {
            self.peak_in_flight.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl StorageBackend for FlakyBackend {
        async fn put_object(
            &self,
            partition: &Partition,
            key: &str,
            body: Bytes,
            content_type: &str,
        ) -> Result<String, BackendError> {
            self.inner.put_object(partition, key, body, content_type).await
        }

        async fn get_object(
            &self,
            partition: &Partition,
            key: &str,
        ) -> Result<GetObjectOutput, BackendError> {
            self.inner.get_object(partition, key).await
        }

        async fn delete_object(&self, partition: &Partition, key: &str) -> Result<(), BackendError> {
            self.inner.delete_object(partition, key).await
        }

        async fn head_object(
            &self,
            partition: &Partition,
            key: &str,
        ) -> Result<ObjectMetadata, BackendError> {
            self.inner.head_object(partition, key).await
        }

        fn list_objects(
            &self,
            partition: &Partition,
            prefix: &str,
            recursive: bool,
        ) -> ObjectEntryStream {
            let id = partition.as_str();
            assert!(!self.panicking.contains(id), "injected panic for {id}");
            if self.failing.contains(id) {
                let err = BackendError::request(id, anyhow::anyhow!("connection refused"));
                return futures::stream::once(async move { Err(err) }).boxed();
            }

            let mut stream = self.inner.list_objects(partition, prefix, recursive);
            if self.failing_mid_stream.contains(id) {
                let err = BackendError::request(id, anyhow::anyhow!("connection reset"));
                stream = stream
                    .chain(futures::stream::once(async move { Err(err) }))
                    .boxed();
            }
            let stream = match self.delays.get(id).copied() {
                Some(delay) => futures::stream::once(async move {
                    tokio::time::sleep(delay).await;
                    stream
                })
                .flatten()
                .boxed(),
                None => stream,
            };
            let guard = InFlight::start(&self.in_flight, &self.peak_in_flight);
            stream
                .map(move |item| {
                    let _ = &guard;
                    item
                })
                .boxed()
        }

        async fn get_object_tagging(
            &self,
            partition: &Partition,
            key: &str,
        ) -> Result<TagSet, BackendError> {
            self.inner.get_object_tagging(partition, key).await
        }

        async fn put_object_tagging(
            &self,
            partition: &Partition,
            key: &str,
            tags: &TagSet,
        ) -> Result<(), BackendError> {
            self.inner.put_object_tagging(partition, key, tags).await
        }

        async fn ensure_partition_exists(&self, partition: &Partition) -> Result<(), BackendError> {
            self.inner.ensure_partition_exists(partition).await
        }
    }

    /// Provision `layout` directly into named partitions, bypassing routing.
    async fn seeded(backend: FlakyBackend, layout: &[(&str, &[&str])]) -> Arc<FlakyBackend> {
        for (partition, keys) in layout {
            let p = Partition::new(*partition);
            backend
                .ensure_partition_exists(&p)
                .await
                .unwrap_or_else(|e| panic!("ensure {p}: {e}"));
            for key in *keys {
                backend
                    .put_object(&p, key, Bytes::from_static(b"x"), "text/plain")
                    .await
                    .unwrap_or_else(|e| panic!("put {key}: {e}"));
            }
        }
        Arc::new(backend)
    }

    fn aggregator(ids: &[&str], backend: Arc<FlakyBackend>) -> Aggregator {
        let router = ShardRouter::new(partitions(ids.iter().copied()), 10)
            .unwrap_or_else(|e| panic!("router: {e}"));
        Aggregator::new(Arc::new(router), backend)
    }

    fn keys(output: &ListOutput) -> Vec<&str> {
        output.entries.iter().map(|e| e.key.as_str()).collect()
    }

    #[tokio::test]
    async fn test_should_concatenate_in_partition_order() {
        let backend = seeded(
            FlakyBackend::default(),
            &[("A", &["a1", "a2"]), ("B", &["b1"])],
        )
        .await;
        let agg = aggregator(&["A", "B"], backend);

        let output = agg.list("", true, &ListContext::new()).await;
        assert_eq!(keys(&output), ["a1", "a2", "b1"]);
        assert!(output.is_complete());
        assert!(!output.is_truncated());
    }

    #[tokio::test]
    async fn test_should_not_reorder_when_first_partition_is_slow() {
        let backend = seeded(
            FlakyBackend::default().delay("A", Duration::from_millis(150)),
            &[("A", &["a1", "a2"]), ("B", &["b1"]), ("C", &["c1", "c0"])],
        )
        .await;
        let agg = aggregator(&["A", "B", "C"], backend);

        let output = agg.list("", true, &ListContext::new()).await;
        // Per-partition order is the backend's (sorted), not re-sorted globally.
        assert_eq!(keys(&output), ["a1", "a2", "b1", "c0", "c1"]);
    }

    #[tokio::test]
    async fn test_should_keep_listing_when_one_partition_fails() {
        let backend = seeded(
            FlakyBackend::default().fail("B"),
            &[("A", &["a1"]), ("B", &["b1"]), ("C", &["c1"])],
        )
        .await;
        let agg = aggregator(&["A", "B", "C"], backend);

        let output = agg.list("", true, &ListContext::new()).await;
        assert_eq!(keys(&output), ["a1", "c1"]);
        assert_eq!(output.failures.len(), 1);
        assert_eq!(output.failures[0].partition.as_str(), "B");
        assert!(matches!(output.failures[0].error, BackendError::Request { .. }));
        assert!(!output.is_complete());
        assert!(!output.is_truncated());
    }

    #[tokio::test]
    async fn test_should_discard_partial_entries_of_failed_partition() {
        let backend = seeded(
            FlakyBackend::default().fail_mid_stream("A"),
            &[("A", &["a1", "a2"]), ("B", &["b1"])],
        )
        .await;
        let agg = aggregator(&["A", "B"], backend);

        let output = agg.list("", true, &ListContext::new()).await;
        assert_eq!(keys(&output), ["b1"]);
        assert_eq!(output.failures[0].partition.as_str(), "A");
    }

    #[tokio::test]
    async fn test_should_record_panicking_partition_as_failure() {
        let backend = seeded(
            FlakyBackend::default().panic_on("B"),
            &[("A", &["a1"]), ("B", &["b1"])],
        )
        .await;
        let agg = aggregator(&["A", "B"], backend);

        let output = agg.list("", true, &ListContext::new()).await;
        assert_eq!(keys(&output), ["a1"]);
        assert_eq!(output.failures.len(), 1);
        assert_eq!(output.failures[0].partition.as_str(), "B");
    }

    #[tokio::test]
    async fn test_should_pass_prefix_and_recursion_flag() {
        let backend = seeded(
            FlakyBackend::default(),
            &[
                ("A", &["logs/1", "logs/deep/2", "other"]),
                ("B", &["logs/3"]),
            ],
        )
        .await;
        let agg = aggregator(&["A", "B"], backend);

        let flat = agg.list("logs/", true, &ListContext::new()).await;
        assert_eq!(keys(&flat), ["logs/1", "logs/deep/2", "logs/3"]);

        let shallow = agg.list("logs/", false, &ListContext::new()).await;
        assert_eq!(keys(&shallow), ["logs/1", "logs/3"]);
    }

    #[tokio::test]
    async fn test_should_record_deadline_as_failure() {
        let backend = seeded(
            FlakyBackend::default().delay("B", Duration::from_secs(30)),
            &[("A", &["a1"]), ("B", &["b1"])],
        )
        .await;
        let agg = aggregator(&["A", "B"], backend);

        let ctx = ListContext::new().with_timeout(Duration::from_millis(100));
        let output = agg.list("", true, &ctx).await;
        assert_eq!(keys(&output), ["a1"]);
        assert_eq!(output.failures.len(), 1);
        assert!(matches!(
            output.failures[0].error,
            BackendError::DeadlineExceeded
        ));
    }

    #[tokio::test]
    async fn test_should_record_cancellation_as_failure() {
        let backend = seeded(
            FlakyBackend::default()
                .delay("A", Duration::from_secs(30))
                .delay("C", Duration::from_secs(30)),
            &[("A", &["a1"]), ("B", &["b1"]), ("C", &["c1"])],
        )
        .await;
        let agg = aggregator(&["A", "B", "C"], backend);

        let ctx = ListContext::new();
        let canceller = ctx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            canceller.cancel();
        });

        let output = agg.list("", true, &ctx).await;
        assert_eq!(keys(&output), ["b1"]);
        let failed: Vec<&str> = output
            .failures
            .iter()
            .map(|f| f.partition.as_str())
            .collect();
        assert_eq!(failed, ["A", "C"]);
        assert!(
            output
                .failures
                .iter()
                .all(|f| matches!(f.error, BackendError::Cancelled))
        );
    }

    fn slow_backend() -> FlakyBackend {
        FlakyBackend::default()
            .delay("A", Duration::from_millis(20))
            .delay("B", Duration::from_millis(20))
            .delay("C", Duration::from_millis(20))
    }

    const SLOW_LAYOUT: &[(&str, &[&str])] = &[("A", &["a1"]), ("B", &["b1"]), ("C", &["c1"])];

    #[tokio::test]
    async fn test_should_respect_concurrency_limit() {
        let backend = seeded(slow_backend(), SLOW_LAYOUT).await;
        let agg = aggregator(&["A", "B", "C"], Arc::clone(&backend)).with_concurrency(1);
        assert_eq!(agg.concurrency(), 1);

        let output = agg.list("", true, &ListContext::new()).await;
        assert_eq!(keys(&output), ["a1", "b1", "c1"]);
        assert!(output.is_complete());
        assert_eq!(backend.peak_in_flight(), 1);
    }

    #[tokio::test]
    async fn test_should_list_all_partitions_at_once_by_default() {
        let backend = seeded(slow_backend(), SLOW_LAYOUT).await;
        let agg = aggregator(&["A", "B", "C"], Arc::clone(&backend));
        assert_eq!(agg.concurrency(), 3);

        let output = agg.list("", true, &ListContext::new()).await;
        assert!(output.is_complete());
        assert_eq!(backend.peak_in_flight(), 3);
    }

    #[test]
    fn test_should_derive_recursion_from_delimiter() {
        assert!(recursive_for_delimiter(None));
        assert!(recursive_for_delimiter(Some("")));
        assert!(!recursive_for_delimiter(Some("/")));
    }
}
