//! PostgreSQL destination tests
//!
//! Run with: cargo test --test postgres_loader_tests -- --ignored

mod common;

use common::*;
use rawload_ingest::config::LoadMode;
use rawload_ingest::loader::{PgDestination, RawTableSink, RecordBatch};
use rawload_ingest::pipeline::{FileState, Pipeline};
use rawload_ingest::{IngestError, TableMapping};
use sqlx::Row;

async fn count(pg: &TestPostgres, table: &str) -> i64 {
    let mut conn = pg.connect().await.unwrap();
    sqlx::query(&format!("SELECT COUNT(*) FROM {}", table))
        .fetch_one(&mut conn)
        .await
        .unwrap()
        .get(0)
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_copy_round_trip() {
    let pg = TestPostgres::start().await.unwrap();
    let mut dest = PgDestination::connect(pg.config()).await.unwrap();
    let batch = RecordBatch::from_reader(ORDERS_CSV.as_bytes()).unwrap();

    let rows = dest
        .insert_batch("orders_raw", &batch, LoadMode::Append)
        .await
        .unwrap();
    dest.close().await.unwrap();

    assert_eq!(rows, ORDERS_ROWS as u64);

    let mut conn = pg.connect().await.unwrap();
    let loaded: Vec<(String, Option<String>)> = sqlx::query_as(
        "SELECT order_status, order_delivered_carrier_date FROM orders_raw ORDER BY order_purchase_timestamp",
    )
    .fetch_all(&mut conn)
    .await
    .unwrap();

    assert_eq!(
        loaded,
        vec![
            ("invoiced".to_string(), None),
            ("delivered".to_string(), Some("2017-10-04 19:55:00".to_string())),
            ("delivered".to_string(), Some("2018-07-26 14:31:00".to_string())),
        ]
    );
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_quoted_fields_survive_copy() {
    let pg = TestPostgres::start().await.unwrap();
    let mut dest = PgDestination::connect(pg.config()).await.unwrap();
    let batch = RecordBatch::from_reader(
        "review_id,review_comment_message\nr1,\"chegou antes, recomendo\"\nr2,\"linha\nquebrada\"\n"
            .as_bytes(),
    )
    .unwrap();

    dest.insert_batch("order_reviews_raw", &batch, LoadMode::Append)
        .await
        .unwrap();
    dest.close().await.unwrap();

    let mut conn = pg.connect().await.unwrap();
    let messages: Vec<String> =
        sqlx::query_scalar("SELECT review_comment_message FROM order_reviews_raw ORDER BY review_id")
            .fetch_all(&mut conn)
            .await
            .unwrap();
    assert_eq!(messages, vec!["chegou antes, recomendo", "linha\nquebrada"]);
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_empty_fields_are_null_and_headers_fold() {
    let pg = TestPostgres::start().await.unwrap();
    let mut dest = PgDestination::connect(pg.config()).await.unwrap();

    // a lone empty field is re-encoded as "" and must still arrive as NULL
    let single = RecordBatch::from_reader("Seller_City\n\"\"\ncampinas\n".as_bytes()).unwrap();
    dest.insert_batch("sellers_raw", &single, LoadMode::Append)
        .await
        .unwrap();
    dest.close().await.unwrap();

    let mut conn = pg.connect().await.unwrap();
    let cities: Vec<Option<String>> =
        sqlx::query_scalar("SELECT seller_city FROM sellers_raw ORDER BY seller_city NULLS FIRST")
            .fetch_all(&mut conn)
            .await
            .unwrap();
    assert_eq!(cities, vec![None, Some("campinas".to_string())]);
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_unknown_column_is_schema_error() {
    let pg = TestPostgres::start().await.unwrap();
    let mut dest = PgDestination::connect(pg.config()).await.unwrap();
    let batch = RecordBatch::from_reader("seller_id,favourite_colour\ns1,blue\n".as_bytes()).unwrap();

    let err = dest
        .insert_batch("sellers_raw", &batch, LoadMode::Append)
        .await
        .unwrap_err();
    assert!(matches!(err, IngestError::Schema { .. }));

    // the connection is still usable after a failed COPY
    let ok = RecordBatch::from_reader(SELLERS_CSV.as_bytes()).unwrap();
    assert_eq!(
        dest.insert_batch("sellers_raw", &ok, LoadMode::Append)
            .await
            .unwrap(),
        2
    );
    dest.close().await.unwrap();
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_append_duplicates_and_truncate_replaces() {
    let pg = TestPostgres::start().await.unwrap();
    let mut dest = PgDestination::connect(pg.config()).await.unwrap();
    let batch = RecordBatch::from_reader(SELLERS_CSV.as_bytes()).unwrap();

    dest.insert_batch("sellers_raw", &batch, LoadMode::Append)
        .await
        .unwrap();
    dest.insert_batch("sellers_raw", &batch, LoadMode::Append)
        .await
        .unwrap();
    assert_eq!(count(&pg, "sellers_raw").await, 4);

    dest.insert_batch("sellers_raw", &batch, LoadMode::Truncate)
        .await
        .unwrap();
    dest.close().await.unwrap();
    assert_eq!(count(&pg, "sellers_raw").await, 2);
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_pipeline_into_postgres() {
    let pg = TestPostgres::start().await.unwrap();
    let root = tempfile::tempdir().unwrap();
    let store = seeded_store(&[
        (ORDERS_FILE, ORDERS_CSV),
        (SELLERS_FILE, ""),
        ("unrelated.csv", "a\n1\n"),
    ]);
    let mut dest = PgDestination::connect(pg.config()).await.unwrap();
    let mut pipeline = Pipeline::new(store, TableMapping::olist(), PREFIX, settings_in(root.path()));

    let report = pipeline.load(&mut dest).await.unwrap();

    let states: Vec<_> = report.files.iter().map(|f| f.state.clone()).collect();
    assert!(states.contains(&FileState::Loaded {
        rows: ORDERS_ROWS as u64
    }));
    assert!(states.contains(&FileState::SkippedEmpty));
    assert!(states.contains(&FileState::SkippedUnmapped));
    assert_eq!(count(&pg, "orders_raw").await, ORDERS_ROWS as i64);
    assert_eq!(count(&pg, "sellers_raw").await, 0);

    // the pipeline closed the connection
    assert!(dest
        .insert_batch(
            "orders_raw",
            &RecordBatch::from_reader(ORDERS_CSV.as_bytes()).unwrap(),
            LoadMode::Append
        )
        .await
        .is_err());
}
