//! Command-line arguments.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Operate on one virtual bucket spread across several S3 buckets.
#[derive(Parser, Debug)]
#[command(name = "s3shard", version, about)]
pub struct Cli {
    /// JSON configuration file.
    #[arg(short, long, global = true, env = "S3SHARD_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Command {
    /// Print the configured partitions in routing order.
    Partitions,

    /// Print the routing key and partition of each object key.
    Route {
        /// Object keys.
        #[arg(required = true)]
        keys: Vec<String>,
    },

    #[command(flatten)]
    Backend(BackendCommand),
}

/// Commands that talk to the partition buckets.
#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum BackendCommand {
    /// List the whole virtual bucket.
    List {
        /// Only keys starting with this prefix.
        #[arg(long, default_value = "")]
        prefix: String,

        /// Non-empty delimiter lists only direct children of the prefix.
        #[arg(long)]
        delimiter: Option<String>,

        /// Echoed in the output; results are never truncated.
        #[arg(long)]
        max_keys: Option<u32>,

        /// Give up on partitions that have not finished after this long.
        #[arg(long)]
        timeout_secs: Option<u64>,
    },

    /// Upload a file.
    Put {
        /// Object key.
        key: String,

        /// File to upload.
        file: PathBuf,

        /// MIME type of the body.
        #[arg(long)]
        content_type: Option<String>,
    },

    /// Download an object.
    Get {
        /// Object key.
        key: String,

        /// Write the body here instead of stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Print object metadata.
    Head {
        /// Object key.
        key: String,
    },

    /// Delete an object.
    Delete {
        /// Object key.
        key: String,
    },

    /// Print the tags of an object.
    GetTags {
        /// Object key.
        key: String,
    },

    /// Replace the tags of an object.
    PutTags {
        /// Object key.
        key: String,

        /// Tags as `NAME=VALUE`.
        #[arg(required = true, value_parser = parse_tag)]
        tags: Vec<(String, String)>,
    },
}

/// Parse a `NAME=VALUE` tag argument.
fn parse_tag(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((name, value)) if !name.is_empty() => Ok((name.to_owned(), value.to_owned())),
        _ => Err(format!("expected NAME=VALUE, got {s:?}")),
    }
}
