//! [`StorageBackend`] over an S3-compatible service.

use async_trait::async_trait;
use aws_sdk_s3::config::{BehaviorVersion, Credentials, Region};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{CreateBucketConfiguration, Tag, Tagging};
use bytes::Bytes;
use futures::{StreamExt, TryStreamExt};
use s3shard_core::backend::{
    DEFAULT_CONTENT_TYPE, GetObjectOutput, ObjectEntry, ObjectEntryStream, ObjectMetadata,
    StorageBackend, TagSet,
};
use s3shard_core::{BackendError, Partition, ShardConfig, ShardResult};
use tracing::{debug, info};

use crate::convert::{
    error_code, is_not_found, location_constraint, map_sdk_error, normalize_etag, object_entry,
    to_chrono, to_size,
};

/// Provider name attached to the static credentials.
const CREDENTIALS_PROVIDER: &str = "s3shard";

/// Partition storage on an S3-compatible endpoint (AWS S3, MinIO, ...).
///
/// Each partition is a bucket of the same name. Requests use path-style
/// addressing so MinIO and other single-host deployments work unchanged.
#[derive(Debug, Clone)]
pub struct S3Backend {
    client: aws_sdk_s3::Client,
    region: String,
}

impl S3Backend {
    /// Build a client from the endpoint, credentials and region in `config`.
    ///
    /// # Errors
    ///
    /// Returns [`ShardError::Config`](s3shard_core::ShardError::Config) if the
    /// endpoint cannot be parsed.
    pub fn new(config: &ShardConfig) -> ShardResult<Self> {
        let endpoint = config.parsed_endpoint()?;
        let creds = Credentials::new(
            config.access_key_id.clone(),
            config.secret_access_key.clone(),
            None,
            None,
            CREDENTIALS_PROVIDER,
        );

        let sdk_config = aws_sdk_s3::config::Builder::new()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new(config.region.clone()))
            .credentials_provider(creds)
            .endpoint_url(endpoint.url())
            .force_path_style(true)
            .build();

        debug!(endpoint = %endpoint.url(), region = %config.region, "created s3 client");
        Ok(Self::from_client(
            aws_sdk_s3::Client::from_conf(sdk_config),
            config.region.clone(),
        ))
    }

    /// Wrap an existing client.
    #[must_use]
    pub fn from_client(client: aws_sdk_s3::Client, region: impl Into<String>) -> Self {
        Self {
            client,
            region: region.into(),
        }
    }

    /// The underlying SDK client.
    #[must_use]
    pub fn client(&self) -> &aws_sdk_s3::Client {
        &self.client
    }
}

#[async_trait]
impl StorageBackend for S3Backend {
    async fn put_object(
        &self,
        partition: &Partition,
        key: &str,
        body: Bytes,
        content_type: &str,
    ) -> Result<String, BackendError> {
        let size = body.len();
        let resp = self
            .client
            .put_object()
            .bucket(partition.as_str())
            .key(key)
            .content_type(content_type)
            .content_length(i64::try_from(size).unwrap_or(i64::MAX))
            .body(ByteStream::from(body))
            .send()
            .await
            .map_err(|e| map_sdk_error(partition, None, e))?;
        debug!(partition = %partition, key, size, "uploaded object");
        Ok(normalize_etag(resp.e_tag()))
    }

    async fn get_object(
        &self,
        partition: &Partition,
        key: &str,
    ) -> Result<GetObjectOutput, BackendError> {
        let resp = self
            .client
            .get_object()
            .bucket(partition.as_str())
            .key(key)
            .send()
            .await
            .map_err(|e| map_sdk_error(partition, Some(key), e))?;

        let metadata = ObjectMetadata {
            content_type: resp
                .content_type()
                .unwrap_or(DEFAULT_CONTENT_TYPE)
                .to_owned(),
            size: to_size(resp.content_length()),
            etag: normalize_etag(resp.e_tag()),
            last_modified: to_chrono(resp.last_modified()),
        };
        let body = resp
            .body
            .collect()
            .await
            .map_err(|e| BackendError::request(partition.as_str(), e))?
            .into_bytes();
        Ok(GetObjectOutput { body, metadata })
    }

    async fn delete_object(&self, partition: &Partition, key: &str) -> Result<(), BackendError> {
        self.client
            .delete_object()
            .bucket(partition.as_str())
            .key(key)
            .send()
            .await
            .map_err(|e| map_sdk_error(partition, None, e))?;
        debug!(partition = %partition, key, "deleted object");
        Ok(())
    }

    async fn head_object(
        &self,
        partition: &Partition,
        key: &str,
    ) -> Result<ObjectMetadata, BackendError> {
        let resp = self
            .client
            .head_object()
            .bucket(partition.as_str())
            .key(key)
            .send()
            .await
            .map_err(|e| map_sdk_error(partition, Some(key), e))?;
        Ok(ObjectMetadata {
            content_type: resp
                .content_type()
                .unwrap_or(DEFAULT_CONTENT_TYPE)
                .to_owned(),
            size: to_size(resp.content_length()),
            etag: normalize_etag(resp.e_tag()),
            last_modified: to_chrono(resp.last_modified()),
        })
    }

    fn list_objects(
        &self,
        partition: &Partition,
        prefix: &str,
        recursive: bool,
    ) -> ObjectEntryStream {
        let client = self.client.clone();
        let partition = partition.clone();
        let prefix = prefix.to_owned();

        // State: `None` when done, `Some(token)` for the next page.
        futures::stream::try_unfold(Some(None::<String>), move |state| {
            let client = client.clone();
            let partition = partition.clone();
            let prefix = prefix.clone();
            async move {
                let Some(token) = state else {
                    return Ok(None);
                };
                let mut req = client
                    .list_objects_v2()
                    .bucket(partition.as_str())
                    .prefix(prefix);
                if !recursive {
                    req = req.delimiter("/");
                }
                if let Some(token) = token {
                    req = req.continuation_token(token);
                }
                let resp = req
                    .send()
                    .await
                    .map_err(|e| map_sdk_error(&partition, None, e))?;

                let entries: Vec<Result<ObjectEntry, BackendError>> =
                    resp.contents().iter().map(|o| Ok(object_entry(o))).collect();
                debug!(partition = %partition, count = entries.len(), "listed page");

                let next = if resp.is_truncated().unwrap_or(false) {
                    resp.next_continuation_token().map(|t| Some(t.to_owned()))
                } else {
                    None
                };
                Ok::<_, BackendError>(Some((futures::stream::iter(entries), next)))
            }
        })
        .try_flatten()
        .boxed()
    }

    async fn get_object_tagging(
        &self,
        partition: &Partition,
        key: &str,
    ) -> Result<TagSet, BackendError> {
        let resp = self
            .client
            .get_object_tagging()
            .bucket(partition.as_str())
            .key(key)
            .send()
            .await
            .map_err(|e| map_sdk_error(partition, Some(key), e))?;
        Ok(resp
            .tag_set()
            .iter()
            .map(|t| (t.key().to_owned(), t.value().to_owned()))
            .collect())
    }

    async fn put_object_tagging(
        &self,
        partition: &Partition,
        key: &str,
        tags: &TagSet,
    ) -> Result<(), BackendError> {
        let tag_set = tags
            .iter()
            .map(|(k, v)| Tag::builder().key(k).value(v).build())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| BackendError::request(partition.as_str(), e))?;
        let tagging = Tagging::builder()
            .set_tag_set(Some(tag_set))
            .build()
            .map_err(|e| BackendError::request(partition.as_str(), e))?;

        self.client
            .put_object_tagging()
            .bucket(partition.as_str())
            .key(key)
            .tagging(tagging)
            .send()
            .await
            .map_err(|e| map_sdk_error(partition, Some(key), e))?;
        Ok(())
    }

    async fn ensure_partition_exists(&self, partition: &Partition) -> Result<(), BackendError> {
        match self
            .client
            .head_bucket()
            .bucket(partition.as_str())
            .send()
            .await
        {
            Ok(_) => {
                debug!(partition = %partition, "bucket exists");
                return Ok(());
            }
            Err(err) if is_not_found(&err) || error_code(&err) == Some("NoSuchBucket") => {}
            Err(err) => return Err(map_sdk_error(partition, None, err)),
        }

        let mut req = self.client.create_bucket().bucket(partition.as_str());
        if let Some(constraint) = location_constraint(&self.region) {
            req = req.create_bucket_configuration(
                CreateBucketConfiguration::builder()
                    .location_constraint(constraint)
                    .build(),
            );
        }
        match req.send().await {
            Ok(_) => {
                info!(partition = %partition, region = %self.region, "created bucket");
                Ok(())
            }
            Err(err) if error_code(&err) == Some("BucketAlreadyOwnedByYou") => Ok(()),
            Err(err) => Err(map_sdk_error(partition, None, err)),
        }
    }
}
