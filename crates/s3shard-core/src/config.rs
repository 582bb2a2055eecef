//! s3shard configuration.
//!
//! Provides [`ShardConfig`]. Values come from a JSON file (snake_case keys,
//! missing keys take defaults) and can be overridden by environment
//! variables.

use std::path::Path;

use serde::{Deserialize, Serialize};
use typed_builder::TypedBuilder;

use crate::error::{ShardError, ShardResult};
use crate::ring::DEFAULT_REPLICAS;
use crate::router::ShardRouter;
use crate::types::Partition;

/// Backend endpoint split into host and transport security.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    /// `host[:port]`.
    pub host: String,
    /// Whether to use TLS.
    pub use_ssl: bool,
}

impl Endpoint {
    /// The endpoint as a URL with an explicit scheme.
    #[must_use]
    pub fn url(&self) -> String {
        let scheme = if self.use_ssl { "https" } else { "http" };
        format!("{scheme}://{}", self.host)
    }
}

/// s3shard configuration.
///
/// # Examples
///
/// ```
/// use s3shard_core::config::ShardConfig;
///
/// let config = ShardConfig::default();
/// assert_eq!(config.partitions, ["bucket1", "bucket2", "bucket3"]);
/// assert_eq!(config.replicas, 100);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TypedBuilder)]
#[serde(default)]
pub struct ShardConfig {
    /// Backend endpoint, `host[:port]` or a full `http(s)://` URL.
    #[builder(default = String::from("localhost:9000"))]
    pub endpoint: String,

    /// Access key for the backend.
    #[builder(default = String::from("minioadmin"))]
    pub access_key_id: String,

    /// Secret key for the backend.
    #[builder(default = String::from("minioadmin"))]
    pub secret_access_key: String,

    /// TLS for scheme-less endpoints; ignored when the endpoint has a scheme.
    #[builder(default = false)]
    pub use_ssl: bool,

    /// Backend region.
    #[builder(default = String::from("us-east-1"))]
    pub region: String,

    /// Backend buckets objects are spread over, in routing order.
    #[serde(alias = "buckets")]
    #[builder(default = default_partitions())]
    pub partitions: Vec<String>,

    /// Ring points per partition.
    #[builder(default = DEFAULT_REPLICAS)]
    pub replicas: usize,

    /// Partitions listed concurrently; unset means all at once.
    #[builder(default)]
    pub list_concurrency: Option<usize>,

    /// Log level filter string (e.g. `"info"`, `"debug"`).
    #[builder(default = String::from("info"))]
    pub log_level: String,
}

fn default_partitions() -> Vec<String> {
    vec!["bucket1".to_owned(), "bucket2".to_owned(), "bucket3".to_owned()]
}

impl Default for ShardConfig {
    fn default() -> Self {
        Self {
            endpoint: String::from("localhost:9000"),
            access_key_id: String::from("minioadmin"),
            secret_access_key: String::from("minioadmin"),
            use_ssl: false,
            region: String::from("us-east-1"),
            partitions: default_partitions(),
            replicas: DEFAULT_REPLICAS,
            list_concurrency: None,
            log_level: String::from("info"),
        }
    }
}

impl ShardConfig {
    /// Load configuration from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns [`ShardError::Config`] if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> ShardResult<Self> {
        let path = path.as_ref();
        let data = std::fs::read_to_string(path).map_err(|e| {
            ShardError::config(format!("cannot read config file {}: {e}", path.display()))
        })?;
        serde_json::from_str(&data).map_err(|e| {
            ShardError::config(format!("invalid config file {}: {e}", path.display()))
        })
    }

    /// Defaults overridden by environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        Self::default().apply_env()
    }

    /// Override fields from environment variables.
    ///
    /// | Variable | Field |
    /// |----------|-------|
    /// | `S3SHARD_ENDPOINT` | `endpoint` |
    /// | `S3SHARD_ACCESS_KEY_ID` | `access_key_id` |
    /// | `S3SHARD_SECRET_ACCESS_KEY` | `secret_access_key` |
    /// | `S3SHARD_USE_SSL` | `use_ssl` |
    /// | `S3SHARD_REGION` | `region` |
    /// | `S3SHARD_PARTITIONS` | `partitions` (comma separated) |
    /// | `S3SHARD_REPLICAS` | `replicas` |
    /// | `S3SHARD_LIST_CONCURRENCY` | `list_concurrency` |
    /// | `LOG_LEVEL` | `log_level` |
    #[must_use]
    pub fn apply_env(self) -> Self {
        self.apply_vars(|name| std::env::var(name).ok())
    }

    /// Override fields from an arbitrary variable lookup.
    #[must_use]
    pub fn apply_vars(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(v) = lookup("S3SHARD_ENDPOINT") {
            self.endpoint = v;
        }
        if let Some(v) = lookup("S3SHARD_ACCESS_KEY_ID") {
            self.access_key_id = v;
        }
        if let Some(v) = lookup("S3SHARD_SECRET_ACCESS_KEY") {
            self.secret_access_key = v;
        }
        if let Some(v) = lookup("S3SHARD_USE_SSL") {
            self.use_ssl = parse_bool(&v);
        }
        if let Some(v) = lookup("S3SHARD_REGION") {
            self.region = v;
        }
        if let Some(v) = lookup("S3SHARD_PARTITIONS") {
            self.partitions = v
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_owned)
                .collect();
        }
        if let Some(v) = lookup("S3SHARD_REPLICAS") {
            if let Ok(n) = v.parse::<usize>() {
                self.replicas = n;
            }
        }
        if let Some(v) = lookup("S3SHARD_LIST_CONCURRENCY") {
            if let Ok(n) = v.parse::<usize>() {
                self.list_concurrency = Some(n);
            }
        }
        if let Some(v) = lookup("LOG_LEVEL") {
            self.log_level = v;
        }
        self
    }

    /// Split [`endpoint`](Self::endpoint) into host and TLS flag.
    ///
    /// Without a scheme the endpoint is the host and [`use_ssl`](Self::use_ssl)
    /// decides TLS. With a scheme, TLS is on iff it is `https` and the host is
    /// the URL authority.
    ///
    /// # Errors
    ///
    /// Returns [`ShardError::Config`] if the endpoint has no host.
    pub fn parsed_endpoint(&self) -> ShardResult<Endpoint> {
        let (host, use_ssl) = match self.endpoint.split_once("://") {
            Some((scheme, rest)) => {
                let authority = rest.split(['/', '?', '#']).next().unwrap_or_default();
                (authority, scheme.eq_ignore_ascii_case("https"))
            }
            None => (self.endpoint.as_str(), self.use_ssl),
        };
        if host.is_empty() {
            return Err(ShardError::config(format!(
                "endpoint has no host: {:?}",
                self.endpoint
            )));
        }
        Ok(Endpoint {
            host: host.to_owned(),
            use_ssl,
        })
    }

    /// Partition identifiers as [`Partition`] values.
    #[must_use]
    pub fn partition_list(&self) -> Vec<Partition> {
        self.partitions.iter().map(Partition::new).collect()
    }

    /// Build the router described by this configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ShardError::Config`] if the partition list or replica count
    /// is invalid.
    pub fn build_router(&self) -> ShardResult<ShardRouter> {
        ShardRouter::new(self.partition_list(), self.replicas)
    }
}

/// Parse a string as a boolean, accepting `"1"` and `"true"` (case-insensitive).
fn parse_bool(value: &str) -> bool {
    value == "1" || value.eq_ignore_ascii_case("true")
}
