//! s3shard - one virtual bucket spread across several S3 buckets.
//!
//! Objects are routed to a partition by the first two segments of their key,
//! so related objects stay together. Listings fan out to every partition and
//! merge the results.
//!
//! # Usage
//!
//! ```text
//! s3shard --config shard.json route single-tenant/abc123/bloom-0
//! s3shard list --prefix single-tenant/ --timeout-secs 10
//! s3shard put tenant/block/data ./data.bin --content-type application/octet-stream
//! ```
//!
//! # Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `S3SHARD_CONFIG` | *(unset)* | JSON configuration file |
//! | `S3SHARD_ENDPOINT` | `localhost:9000` | Backend endpoint |
//! | `S3SHARD_ACCESS_KEY_ID` | `minioadmin` | Backend access key |
//! | `S3SHARD_SECRET_ACCESS_KEY` | `minioadmin` | Backend secret key |
//! | `S3SHARD_USE_SSL` | `false` | TLS for scheme-less endpoints |
//! | `S3SHARD_REGION` | `us-east-1` | Backend region |
//! | `S3SHARD_PARTITIONS` | `bucket1,bucket2,bucket3` | Partition buckets |
//! | `S3SHARD_REPLICAS` | `100` | Ring points per partition |
//! | `S3SHARD_LIST_CONCURRENCY` | *(all)* | Partitions listed at once |
//! | `LOG_LEVEL` | `info` | Log level filter |
//! | `RUST_LOG` | *(unset)* | Fine-grained tracing filter (overrides `LOG_LEVEL`) |

mod cli;

use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use bytes::Bytes;
use clap::Parser;
use s3shard_core::backend::TagSet;
use s3shard_core::key_policy::derive_routing_key;
use s3shard_core::{ListContext, ListOutput, ShardConfig, ShardRouter, ShardedBucket};
use s3shard_s3::S3Backend;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::cli::{BackendCommand, Cli, Command};

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initialize the tracing subscriber.
///
/// Uses `RUST_LOG` if set, otherwise falls back to the `log_level` config value.
fn init_tracing(log_level: &str) -> Result<()> {
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        EnvFilter::try_new(log_level)
            .with_context(|| format!("invalid log level filter: {log_level}"))?
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    Ok(())
}

/// Load the configuration file (if any) and apply overrides from `lookup`.
///
/// A file that cannot be loaded is reported back instead of failing, so the
/// caller can log it once tracing is up and continue with defaults.
fn load_config(
    path: Option<&Path>,
    lookup: impl Fn(&str) -> Option<String>,
) -> (ShardConfig, Option<String>) {
    let (config, load_error) = match path {
        Some(path) => match ShardConfig::from_file(path) {
            Ok(config) => (config, None),
            Err(e) => (ShardConfig::default(), Some(e.to_string())),
        },
        None => (ShardConfig::default(), None),
    };
    (config.apply_vars(lookup), load_error)
}

/// Render a listing the way a bucket listing response reads.
fn listing_json(
    listing: &ListOutput,
    prefix: &str,
    delimiter: Option<&str>,
    max_keys: Option<u32>,
) -> serde_json::Value {
    let failed: Vec<serde_json::Value> = listing
        .failures
        .iter()
        .map(|f| {
            serde_json::json!({
                "partition": f.partition,
                "error": f.error.to_string(),
            })
        })
        .collect();
    serde_json::json!({
        "prefix": prefix,
        "delimiter": delimiter,
        "max_keys": max_keys,
        "is_truncated": listing.is_truncated(),
        "key_count": listing.entries.len(),
        "contents": listing.entries,
        "failed_partitions": failed,
    })
}

fn print_json(value: &impl serde::Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn run_backend_command(
    config: &ShardConfig,
    router: Arc<ShardRouter>,
    command: BackendCommand,
) -> Result<()> {
    let backend = S3Backend::new(config).context("failed to create s3 client")?;
    let mut bucket = ShardedBucket::new(router, Arc::new(backend));
    if let Some(limit) = config.list_concurrency {
        bucket = bucket.with_list_concurrency(limit);
    }

    if let Err(e) = bucket.ensure_partitions().await {
        warn!(error = %e, "failed to ensure partitions exist");
    }

    match command {
        BackendCommand::List {
            prefix,
            delimiter,
            max_keys,
            timeout_secs,
        } => {
            let mut ctx = ListContext::new();
            if let Some(secs) = timeout_secs {
                ctx = ctx.with_timeout(Duration::from_secs(secs));
            }
            let cancel = ctx.cancellation_token().clone();
            let interrupt = tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    info!("received interrupt, cancelling listing");
                    cancel.cancel();
                }
            });

            let listing = bucket
                .list_objects(&prefix, delimiter.as_deref(), &ctx)
                .await;
            interrupt.abort();

            if !listing.is_complete() {
                warn!(
                    failed = listing.failures.len(),
                    "listing is missing partitions"
                );
            }
            print_json(&listing_json(
                &listing,
                &prefix,
                delimiter.as_deref(),
                max_keys,
            ))
        }
        BackendCommand::Put {
            key,
            file,
            content_type,
        } => {
            let body = tokio::fs::read(&file)
                .await
                .with_context(|| format!("cannot read {}", file.display()))?;
            let out = bucket
                .put_object(&key, Bytes::from(body), content_type.as_deref())
                .await
                .with_context(|| format!("failed to upload {key}"))?;
            print_json(&serde_json::json!({
                "key": key,
                "partition": out.partition,
                "etag": out.etag,
            }))
        }
        BackendCommand::Get { key, output } => {
            let out = bucket
                .get_object(&key)
                .await
                .with_context(|| format!("failed to download {key}"))?;
            match output {
                Some(path) => tokio::fs::write(&path, &out.body)
                    .await
                    .with_context(|| format!("cannot write {}", path.display()))?,
                None => {
                    let mut stdout = std::io::stdout().lock();
                    stdout.write_all(&out.body)?;
                    stdout.flush()?;
                }
            }
            Ok(())
        }
        BackendCommand::Head { key } => {
            let meta = bucket
                .head_object(&key)
                .await
                .with_context(|| format!("failed to stat {key}"))?;
            print_json(&meta)
        }
        BackendCommand::Delete { key } => {
            bucket
                .delete_object(&key)
                .await
                .with_context(|| format!("failed to delete {key}"))?;
            info!(key = %key, partition = %bucket.route(&key), "deleted");
            Ok(())
        }
        BackendCommand::GetTags { key } => {
            let tags = bucket
                .get_object_tagging(&key)
                .await
                .with_context(|| format!("failed to read tags of {key}"))?;
            print_json(&tags)
        }
        BackendCommand::PutTags { key, tags } => {
            let tags: TagSet = tags.into_iter().collect();
            bucket
                .put_object_tagging(&key, &tags)
                .await
                .with_context(|| format!("failed to tag {key}"))?;
            Ok(())
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let (config, load_error) =
        load_config(cli.config.as_deref(), |name| std::env::var(name).ok());

    init_tracing(&config.log_level)?;

    if let Some(error) = load_error {
        warn!(%error, "failed to load config file, using defaults");
    }

    let router = Arc::new(
        config
            .build_router()
            .context("invalid shard configuration")?,
    );

    info!(
        endpoint = %config.endpoint,
        partitions = ?config.partitions,
        replicas = config.replicas,
        version = VERSION,
        "starting s3shard",
    );

    match cli.command {
        Command::Partitions => {
            for partition in router.all_partitions() {
                println!("{partition}");
            }
            Ok(())
        }
        Command::Route { keys } => {
            for key in &keys {
                println!("{key}\t{}\t{}", derive_routing_key(key), router.route(key));
            }
            Ok(())
        }
        Command::Backend(command) => run_backend_command(&config, router, command).await,
    }
}
