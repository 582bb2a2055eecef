//! S3-compatible storage backend for s3shard.
//!
//! [`S3Backend`] implements [`s3shard_core::StorageBackend`] with
//! `aws-sdk-s3`, treating every partition as a bucket on one endpoint.

mod backend;
mod convert;

pub use backend::S3Backend;
