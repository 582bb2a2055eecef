//! Conversions between SDK values and s3shard types.

use aws_sdk_s3::config::http::HttpResponse;
use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_s3::primitives::DateTime as SdkDateTime;
use aws_sdk_s3::types::{BucketLocationConstraint, Object};
use chrono::{DateTime, Utc};
use s3shard_core::backend::ObjectEntry;
use s3shard_core::{BackendError, Partition};

/// Region in which `CreateBucket` must not carry a location constraint.
const DEFAULT_REGION: &str = "us-east-1";

/// Strip the surrounding double quotes S3 puts around ETags.
pub(crate) fn normalize_etag(etag: Option<&str>) -> String {
    etag.map(|e| e.trim_matches('"').to_owned())
        .unwrap_or_default()
}

pub(crate) fn to_chrono(ts: Option<&SdkDateTime>) -> DateTime<Utc> {
    ts.and_then(|t| DateTime::from_timestamp(t.secs(), t.subsec_nanos()))
        .unwrap_or_default()
}

pub(crate) fn to_size(len: Option<i64>) -> u64 {
    len.and_then(|n| u64::try_from(n).ok()).unwrap_or(0)
}

pub(crate) fn object_entry(object: &Object) -> ObjectEntry {
    ObjectEntry {
        key: object.key().unwrap_or_default().to_owned(),
        size: to_size(object.size()),
        last_modified: to_chrono(object.last_modified()),
        etag: normalize_etag(object.e_tag()),
    }
}

/// Location constraint for `CreateBucket` in `region`, if one is needed.
pub(crate) fn location_constraint(region: &str) -> Option<BucketLocationConstraint> {
    if region.is_empty() || region == DEFAULT_REGION {
        None
    } else {
        Some(BucketLocationConstraint::from(region))
    }
}

/// Whether an error code or HTTP status means the object or bucket is absent.
///
/// `NoSuchBucket` is never "not found": a missing partition bucket is a
/// backend failure, not a missing key.
pub(crate) fn is_not_found_response(code: Option<&str>, status: Option<u16>) -> bool {
    match code {
        Some("NoSuchBucket") => false,
        Some("NoSuchKey" | "NotFound") => true,
        _ => status == Some(404),
    }
}

pub(crate) fn is_not_found<E: ProvideErrorMetadata>(err: &SdkError<E, HttpResponse>) -> bool {
    let code = err.as_service_error().and_then(ProvideErrorMetadata::code);
    let status = err.raw_response().map(|r| r.status().as_u16());
    is_not_found_response(code, status)
}

pub(crate) fn error_code<E: ProvideErrorMetadata>(err: &SdkError<E, HttpResponse>) -> Option<&str> {
    err.as_service_error().and_then(ProvideErrorMetadata::code)
}

/// Map an SDK error to a [`BackendError`].
///
/// With `key` set, "not found" responses become [`BackendError::NotFound`];
/// everything else is an opaque [`BackendError::Request`].
pub(crate) fn map_sdk_error<E>(
    partition: &Partition,
    key: Option<&str>,
    err: SdkError<E, HttpResponse>,
) -> BackendError
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
{
    match key {
        Some(key) if is_not_found(&err) => BackendError::NotFound {
            partition: partition.as_str().to_owned(),
            key: key.to_owned(),
        },
        _ => BackendError::request(
            partition.as_str(),
            anyhow::anyhow!("{}", DisplayErrorContext(&err)),
        ),
    }
}
