//! Bucket-wide listing integration tests.

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use bytes::Bytes;
    use s3shard_core::{Aggregator, ListContext, StorageBackend};

    use crate::{cleanup_partitions, router, s3_backend, sharded_bucket, test_config};

    const KEYS: &[&str] = &[
        "tenant-a/block-1/data",
        "tenant-a/block-1/index",
        "tenant-a/block-2/data",
        "tenant-b/block-1/data",
        "tenant-c/block-9/data",
        "tenant-c/top",
        "simple-file",
    ];

    #[tokio::test]
    #[ignore = "requires running server"]
    async fn test_should_list_every_object_in_partition_order() {
        let config = test_config("list");
        let backend = s3_backend(&config);
        let bucket = sharded_bucket(&config, backend.clone());
        bucket
            .ensure_partitions()
            .await
            .unwrap_or_else(|e| panic!("ensure: {e}"));

        for key in KEYS {
            bucket
                .put_object(key, Bytes::from(key.to_string()), None)
                .await
                .unwrap_or_else(|e| panic!("put {key}: {e}"));
        }

        let listing = bucket.list_objects("", None, &ListContext::new()).await;
        assert!(listing.is_complete(), "failures: {:?}", listing.failures);
        assert!(!listing.is_truncated());
        assert_eq!(listing.entries.len(), KEYS.len());

        // Entries are grouped by partition in configuration order.
        let order: Vec<usize> = listing
            .entries
            .iter()
            .map(|e| {
                let owner = bucket.route(&e.key);
                bucket
                    .partitions()
                    .iter()
                    .position(|p| p == owner)
                    .unwrap_or_else(|| panic!("unknown partition {owner}"))
            })
            .collect();
        assert!(order.windows(2).all(|w| w[0] <= w[1]), "order: {order:?}");

        let tenant_a = bucket
            .list_objects("tenant-a/", None, &ListContext::new())
            .await;
        assert_eq!(tenant_a.entries.len(), 3);

        let direct = bucket
            .list_objects("tenant-c/", Some("/"), &ListContext::new())
            .await;
        let keys: Vec<&str> = direct.entries.iter().map(|e| e.key.as_str()).collect();
        assert_eq!(keys, ["tenant-c/top"]);

        cleanup_partitions(backend.client(), bucket.partitions()).await;
    }

    #[tokio::test]
    #[ignore = "requires running server"]
    async fn test_should_report_missing_partition_as_failure() {
        let config = test_config("partial");
        let backend = s3_backend(&config);
        let router = router(&config);

        // Provision all but the last partition.
        let (missing, present) = router
            .all_partitions()
            .split_last()
            .unwrap_or_else(|| panic!("no partitions"));
        for partition in present {
            backend
                .ensure_partition_exists(partition)
                .await
                .unwrap_or_else(|e| panic!("ensure {partition}: {e}"));
            backend
                .put_object(partition, "tenant/x/data", Bytes::from_static(b"x"), "text/plain")
                .await
                .unwrap_or_else(|e| panic!("put: {e}"));
        }

        let aggregator = Aggregator::new(Arc::clone(&router), backend.clone());
        let listing = aggregator.list("", true, &ListContext::new()).await;
        assert_eq!(listing.entries.len(), present.len());
        assert_eq!(listing.failures.len(), 1);
        assert_eq!(&listing.failures[0].partition, missing);

        cleanup_partitions(backend.client(), router.all_partitions()).await;
    }
}
