//! Single-object integration tests.

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use s3shard_core::backend::TagSet;
    use s3shard_core::{BackendError, ShardError, StorageBackend};

    use crate::{cleanup_partitions, s3_backend, sharded_bucket, test_config};

    #[tokio::test]
    #[ignore = "requires running server"]
    async fn test_should_create_partitions_idempotently() {
        let config = test_config("ensure");
        let backend = s3_backend(&config);
        let bucket = sharded_bucket(&config, backend.clone());

        bucket
            .ensure_partitions()
            .await
            .unwrap_or_else(|e| panic!("ensure: {e}"));
        bucket
            .ensure_partitions()
            .await
            .unwrap_or_else(|e| panic!("second ensure: {e}"));

        for partition in bucket.partitions() {
            backend
                .client()
                .head_bucket()
                .bucket(partition.as_str())
                .send()
                .await
                .unwrap_or_else(|e| panic!("bucket {partition} missing: {e}"));
        }

        cleanup_partitions(backend.client(), bucket.partitions()).await;
    }

    #[tokio::test]
    #[ignore = "requires running server"]
    async fn test_should_store_object_in_routed_partition() {
        let config = test_config("route");
        let backend = s3_backend(&config);
        let bucket = sharded_bucket(&config, backend.clone());
        bucket
            .ensure_partitions()
            .await
            .unwrap_or_else(|e| panic!("ensure: {e}"));

        let key = "single-tenant/abc123/bloom-0";
        let out = bucket
            .put_object(key, Bytes::from_static(b"hello"), Some("text/plain"))
            .await
            .unwrap_or_else(|e| panic!("put: {e}"));
        assert_eq!(&out.partition, bucket.route(key));
        assert_eq!(out.etag, "5d41402abc4b2a76b9719d911017c592");

        // Only the routed partition holds the object.
        for partition in bucket.partitions() {
            let found = backend
                .client()
                .head_object()
                .bucket(partition.as_str())
                .key(key)
                .send()
                .await
                .is_ok();
            assert_eq!(found, partition == &out.partition, "partition {partition}");
        }

        let got = bucket
            .get_object(key)
            .await
            .unwrap_or_else(|e| panic!("get: {e}"));
        assert_eq!(got.body.as_ref(), b"hello");
        assert_eq!(got.metadata.content_type, "text/plain");
        assert_eq!(got.metadata.size, 5);

        let head = bucket
            .head_object(key)
            .await
            .unwrap_or_else(|e| panic!("head: {e}"));
        assert_eq!(head.etag, out.etag);

        bucket
            .delete_object(key)
            .await
            .unwrap_or_else(|e| panic!("delete: {e}"));
        let err = bucket.get_object(key).await.unwrap_err();
        assert!(err.is_not_found(), "expected not found, got {err}");

        cleanup_partitions(backend.client(), bucket.partitions()).await;
    }

    #[tokio::test]
    #[ignore = "requires running server"]
    async fn test_should_map_missing_key_to_not_found() {
        let config = test_config("missing");
        let backend = s3_backend(&config);
        let bucket = sharded_bucket(&config, backend.clone());
        bucket
            .ensure_partitions()
            .await
            .unwrap_or_else(|e| panic!("ensure: {e}"));

        let err = bucket.head_object("tenant/none/x").await.unwrap_err();
        assert!(matches!(
            err,
            ShardError::Backend(BackendError::NotFound { .. })
        ));

        cleanup_partitions(backend.client(), bucket.partitions()).await;
    }

    #[tokio::test]
    #[ignore = "requires running server"]
    async fn test_should_report_missing_bucket_as_request_failure() {
        let config = test_config("nobucket");
        let backend = s3_backend(&config);
        let partition = s3shard_core::Partition::new(config.partitions[0].as_str());

        let err = backend
            .get_object(&partition, "tenant/a/data")
            .await
            .unwrap_err();
        assert!(
            matches!(err, BackendError::Request { .. }),
            "expected request failure, got {err}"
        );
    }

    #[tokio::test]
    #[ignore = "requires running server"]
    async fn test_should_replace_object_tags() {
        let config = test_config("tags");
        let backend = s3_backend(&config);
        let bucket = sharded_bucket(&config, backend.clone());
        bucket
            .ensure_partitions()
            .await
            .unwrap_or_else(|e| panic!("ensure: {e}"));

        let key = "tenant/block/meta.json";
        bucket
            .put_object(key, Bytes::from_static(b"{}"), None)
            .await
            .unwrap_or_else(|e| panic!("put: {e}"));

        let mut tags = TagSet::new();
        tags.insert("env".to_owned(), "test".to_owned());
        tags.insert("owner".to_owned(), "s3shard".to_owned());
        bucket
            .put_object_tagging(key, &tags)
            .await
            .unwrap_or_else(|e| panic!("put tags: {e}"));

        let got = bucket
            .get_object_tagging(key)
            .await
            .unwrap_or_else(|e| panic!("get tags: {e}"));
        assert_eq!(got, tags);

        cleanup_partitions(backend.client(), bucket.partitions()).await;
    }
}
