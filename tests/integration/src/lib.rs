//! Integration tests for s3shard against an S3-compatible server.
//!
//! These tests require a running server (MinIO by default at
//! `localhost:9000` with `minioadmin` credentials). They are marked
//! `#[ignore]` so they don't run during normal `cargo test`.
//!
//! Run them with:
//! ```text
//! docker run -p 9000:9000 minio/minio server /data
//! cargo test -p s3shard-integration -- --ignored
//! ```

use std::sync::{Arc, Once};

use s3shard_core::{Partition, ShardConfig, ShardRouter, ShardedBucket};
use s3shard_s3::S3Backend;

static INIT: Once = Once::new();

/// Initialize tracing (once).
fn init_tracing() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
            )
            .with_test_writer()
            .init();
    });
}

/// Configuration with three fresh, uniquely named partitions.
///
/// Endpoint and credentials come from the usual `S3SHARD_*` variables.
#[must_use]
pub fn test_config(prefix: &str) -> ShardConfig {
    init_tracing();

    let id = uuid::Uuid::new_v4().to_string()[..8].to_owned();
    let partitions = (1..=3).map(|i| format!("s3shard-{prefix}-{id}-{i}")).collect();
    ShardConfig::builder()
        .endpoint(String::from("http://localhost:9000"))
        .partitions(partitions)
        .build()
        .apply_env()
}

/// Backend for `config`.
#[must_use]
pub fn s3_backend(config: &ShardConfig) -> Arc<S3Backend> {
    Arc::new(S3Backend::new(config).unwrap_or_else(|e| panic!("failed to create backend: {e}")))
}

/// Sharded bucket over `backend` using the router described by `config`.
#[must_use]
pub fn sharded_bucket(config: &ShardConfig, backend: Arc<S3Backend>) -> ShardedBucket {
    let router = config
        .build_router()
        .unwrap_or_else(|e| panic!("invalid config: {e}"));
    ShardedBucket::new(Arc::new(router), backend)
}

/// Router described by `config`.
#[must_use]
pub fn router(config: &ShardConfig) -> Arc<ShardRouter> {
    Arc::new(
        config
            .build_router()
            .unwrap_or_else(|e| panic!("invalid config: {e}")),
    )
}

/// Delete all objects in every partition bucket, then the buckets.
pub async fn cleanup_partitions(client: &aws_sdk_s3::Client, partitions: &[Partition]) {
    for partition in partitions {
        let bucket = partition.as_str();
        let mut continuation_token = None;
        loop {
            let mut req = client.list_objects_v2().bucket(bucket);
            if let Some(token) = continuation_token.take() {
                req = req.continuation_token(token);
            }
            let Ok(resp) = req.send().await else {
                break; // Bucket may not exist.
            };

            for obj in resp.contents() {
                if let Some(key) = obj.key() {
                    let _ = client.delete_object().bucket(bucket).key(key).send().await;
                }
            }

            if resp.is_truncated() == Some(true) {
                continuation_token = resp.next_continuation_token().map(ToOwned::to_owned);
            } else {
                break;
            }
        }
        let _ = client.delete_bucket().bucket(bucket).send().await;
        tracing::info!(bucket, "cleaned up partition bucket");
    }
}

mod test_listing;
mod test_object;
