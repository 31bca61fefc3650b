//! Integration tests for cache aggregations.

mod common;

use common::{create_client, unique_name, LocalGrid};
use extend_client::core::protocol::error_codes;
use extend_client::query::Aggregators;
use extend_client::{ExtendClient, ExtendError, NamedCache};

async fn long_cache(grid: &LocalGrid, values: &[i64]) -> (ExtendClient, NamedCache<String, i64>) {
    let client = create_client(grid).await;
    let cache = client
        .get_cache::<String, i64>(&unique_name("dist-agg"))
        .await
        .unwrap();
    for (i, value) in values.iter().enumerate() {
        cache.put(format!("key-{}", i), *value).await.unwrap();
    }
    (client, cache)
}

#[tokio::test]
async fn test_long_min_across_partitions() {
    let grid = LocalGrid::new();
    let (client, cache) = long_cache(&grid, &[7, 3, 9]).await;

    assert_eq!(cache.aggregate(&Aggregators::long_min()).await.unwrap(), Some(3));
    assert_eq!(cache.aggregate(&Aggregators::long_max()).await.unwrap(), Some(9));
    assert_eq!(cache.aggregate(&Aggregators::long_sum()).await.unwrap(), Some(19));
    client.shutdown().await;
}

#[tokio::test]
async fn test_count_entries() {
    let grid = LocalGrid::new();
    let (client, cache) = long_cache(&grid, &[1, 2, 3, 4, 5]).await;

    assert_eq!(cache.aggregate(&Aggregators::count()).await.unwrap(), 5);
    client.shutdown().await;
}

#[tokio::test]
async fn test_empty_cache_has_no_result() {
    let grid = LocalGrid::new();
    let (client, cache) = long_cache(&grid, &[]).await;

    assert_eq!(cache.aggregate(&Aggregators::long_min()).await.unwrap(), None);
    assert_eq!(cache.aggregate(&Aggregators::double_max()).await.unwrap(), None);
    assert_eq!(cache.aggregate(&Aggregators::count()).await.unwrap(), 0);
    client.shutdown().await;
}

#[tokio::test]
async fn test_extreme_value_is_distinct_from_no_result() {
    let grid = LocalGrid::new();
    let (client, cache) = long_cache(&grid, &[i64::MIN, 0]).await;

    assert_eq!(
        cache.aggregate(&Aggregators::long_min()).await.unwrap(),
        Some(i64::MIN)
    );
    client.shutdown().await;
}

#[tokio::test]
async fn test_double_aggregators_widen_integral_values() {
    let grid = LocalGrid::new();
    let (client, cache) = long_cache(&grid, &[1, 2, 4]).await;

    assert_eq!(
        cache.aggregate(&Aggregators::double_sum()).await.unwrap(),
        Some(7.0)
    );
    assert_eq!(
        cache.aggregate(&Aggregators::double_min()).await.unwrap(),
        Some(1.0)
    );
    client.shutdown().await;
}

#[tokio::test]
async fn test_non_numeric_values_fail_with_type_mismatch() {
    let grid = LocalGrid::new();
    let client = create_client(&grid).await;
    let cache = client
        .get_cache::<String, String>(&unique_name("dist-agg-text"))
        .await
        .unwrap();
    cache.put("a".into(), "seven".into()).await.unwrap();

    let err = cache.aggregate(&Aggregators::long_sum()).await.unwrap_err();
    assert!(matches!(err, ExtendError::AggregationTypeMismatch(_)));

    // counting does not look at values
    assert_eq!(cache.aggregate(&Aggregators::count()).await.unwrap(), 1);
    client.shutdown().await;
}

#[tokio::test]
async fn test_double_values_rejected_by_long_aggregator() {
    let grid = LocalGrid::new();
    let client = create_client(&grid).await;
    let cache = client
        .get_cache::<String, f64>(&unique_name("dist-agg-double"))
        .await
        .unwrap();
    cache.put("a".into(), 1.5).await.unwrap();

    let err = cache.aggregate(&Aggregators::long_max()).await.unwrap_err();
    assert!(matches!(err, ExtendError::AggregationTypeMismatch(_)));
    assert_eq!(
        cache.aggregate(&Aggregators::double_max()).await.unwrap(),
        Some(1.5)
    );
    client.shutdown().await;
}

#[tokio::test]
async fn test_remote_error_is_surfaced() {
    let grid = LocalGrid::new();
    let (client, cache) = long_cache(&grid, &[1]).await;

    let err = cache
        .aggregate(&Aggregators::long_sum().with_attribute("age"))
        .await
        .unwrap_err();
    match err {
        ExtendError::Remote { code, .. } => assert_eq!(code, error_codes::UNSUPPORTED_OPERATION),
        other => panic!("unexpected error: {:?}", other),
    }
    client.shutdown().await;
}
