//! Error classification and retry integration tests.
//!
//! Tests verify, through a full tile source:
//! - Missing objects fail fast with the payload-specific message
//! - Retryable transport failures are retried up to the attempt limit
//! - Truncated bodies never surface as successful reads
//! - Request identifiers are attached to exhausted errors

use std::time::Duration;

use serde_json::json;

use tilestore_s3::error::RequestDiagnostics;
use tilestore_s3::io::{ReadErrorPolicy, StoredObject, WritePolicy};
use tilestore_s3::{
    ErrorKind, PutOutcome, RetryPolicy, SourceOptions, TileCoord, TileData, TileError,
    TransportError,
};

use super::test_utils::{
    fast_options, hangup, open_source, open_with, service_error, tiles_url, MockStore, BUCKET,
};

fn descriptor() -> serde_json::Value {
    json!({
        "tiles": [tiles_url("t/{z}/{x}/{y}.png")],
        "grids": [tiles_url("g/{z}/{x}/{y}.grid.json")],
    })
}

const COORD: TileCoord = TileCoord::new(1, 0, 0);

#[tokio::test]
async fn test_missing_tile_is_not_retried() {
    let store = MockStore::new();
    let source = open_source(descriptor(), store.clone());

    let err = source.get_tile(COORD).await.unwrap_err();
    assert_eq!(err.to_string(), "Tile does not exist");
    assert_eq!(err.status(), Some(404));
    assert!(!err.is_retryable());
    assert_eq!(store.get_count(), 1);
}

#[tokio::test]
async fn test_missing_grid_message() {
    let store = MockStore::new();
    let source = open_source(descriptor(), store);

    let err = source.get_grid(COORD).await.unwrap_err();
    assert_eq!(err.to_string(), "Grid does not exist");
    assert_eq!(err.status(), Some(404));
}

#[tokio::test]
async fn test_forbidden_keeps_status() {
    let store = MockStore::new().fail_gets(service_error(403, Some("AccessDenied"), None), 1);
    let source = open_source(descriptor(), store.clone());

    let err = source.get_tile(COORD).await.unwrap_err();
    assert_eq!(err.to_string(), "Tile does not exist");
    assert_eq!(err.status(), Some(403));
    assert_eq!(err.kind(), Some(ErrorKind::Forbidden));
    assert_eq!(store.get_count(), 1);
}

#[tokio::test]
async fn test_connection_reset_exhausts_attempts() {
    let store = MockStore::new()
        .with_object(BUCKET, "t/1/0/0.png", &b"tile"[..])
        .fail_gets(hangup(), 10);
    let source = open_source(descriptor(), store.clone());

    let err = source.get_tile(COORD).await.unwrap_err();
    assert_eq!(err.to_string(), "socket hang up");
    assert_eq!(err.status(), Some(500));
    assert_eq!(err.kind(), Some(ErrorKind::ConnectionReset));
    assert!(err.is_retryable());
    assert_eq!(store.get_count(), 5);
}

#[tokio::test]
async fn test_transient_failures_recover() {
    let store = MockStore::new()
        .with_object(BUCKET, "t/1/0/0.png", &b"tile"[..])
        .fail_gets(service_error(500, Some("InternalError"), Some("We encountered an internal error.")), 2)
        .fail_gets(
            TransportError::Timeout {
                message: "operation timed out".to_string(),
            },
            1,
        );
    let source = open_source(descriptor(), store.clone());

    let tile = source.get_tile(COORD).await.unwrap();
    assert_eq!(&tile.data[..], b"tile");
    assert_eq!(store.get_count(), 4);
    assert_eq!(source.stats().get, 1);
}

#[tokio::test]
async fn test_truncated_body_is_retried() {
    let mut truncated = StoredObject::new(&b"Not 100 characters"[..]);
    truncated.content_length = Some(100);
    let store = MockStore::new().with_stored(BUCKET, "t/1/0/0.png", truncated);
    let source = open_source(descriptor(), store.clone());

    let err = source.get_tile(COORD).await.unwrap_err();
    assert_eq!(err.kind(), Some(ErrorKind::TruncatedResponse));
    assert_eq!(err.status(), Some(500));
    assert_eq!(err.to_string(), "Content-Length does not match response body length");
    assert_eq!(store.get_count(), 5);
}

#[tokio::test]
async fn test_unknown_503_with_request_ids() {
    let err = TransportError::Service {
        status: 503,
        code: None,
        message: None,
        diagnostics: RequestDiagnostics::new(
            Some("0000000000000000".to_string()),
            Some("01234567".to_string()),
        ),
    };
    let store = MockStore::new().fail_gets(err, 10);
    let source = open_source(descriptor(), store.clone());

    let err = source.get_tile(COORD).await.unwrap_err();
    assert_eq!(
        err.to_string(),
        "[x-amz-id-2:01234567] [x-amz-request-id:0000000000000000] 503 Unknown"
    );
    assert_eq!(err.status(), Some(503));
    assert_eq!(store.get_count(), 5);
}

#[tokio::test]
async fn test_unmanaged_errors_pass_through() {
    let store = MockStore::new().fail_gets(service_error(400, Some("InvalidRequest"), Some("Bad request")), 1);
    let source = open_source(descriptor(), store.clone());

    let err = source.get_tile(COORD).await.unwrap_err();
    assert!(matches!(err, TileError::Transport(_)));
    assert_eq!(err.to_string(), "Bad request");
    assert_eq!(err.status(), Some(400));
    assert_eq!(store.get_count(), 1);
}

#[tokio::test]
async fn test_attempt_limit_is_configurable() {
    let store = MockStore::new().fail_gets(hangup(), 10);
    let options = SourceOptions {
        retry: RetryPolicy::new(2, Duration::from_millis(1)),
        ..SourceOptions::default()
    };
    let source = open_with(descriptor(), store.clone(), options);

    assert!(source.get_tile(COORD).await.is_err());
    assert_eq!(store.get_count(), 2);
}

#[tokio::test]
async fn test_backoff_grows_between_attempts() {
    let store = MockStore::new().fail_gets(hangup(), 10);
    let options = SourceOptions {
        retry: RetryPolicy::new(4, Duration::from_millis(10)),
        ..SourceOptions::default()
    };
    let source = open_with(descriptor(), store, options);

    let start = std::time::Instant::now();
    assert!(source.get_tile(COORD).await.is_err());
    // 10 + 20 + 40 ms of backoff between four attempts
    assert!(start.elapsed() >= Duration::from_millis(70));
}

// =============================================================================
// Writes
// =============================================================================

#[tokio::test]
async fn test_put_read_failure_skips_write() {
    let store = MockStore::new().fail_gets(hangup(), 10);
    let source = open_source(descriptor(), store.clone());

    let err = source.put_tile(COORD, TileData::new(&b"tile"[..])).await.unwrap_err();
    assert_eq!(err.kind(), Some(ErrorKind::ConnectionReset));
    assert_eq!(store.put_attempts(), 0);
}

#[tokio::test]
async fn test_put_read_failure_with_overwrite_policy() {
    let store = MockStore::new().fail_gets(hangup(), 10);
    let options = SourceOptions {
        write: WritePolicy {
            on_read_error: ReadErrorPolicy::Overwrite,
            ..WritePolicy::default()
        },
        ..fast_options()
    };
    let source = open_with(descriptor(), store.clone(), options);

    let outcome = source.put_tile(COORD, TileData::new(&b"tile"[..])).await.unwrap();
    assert_eq!(outcome, PutOutcome::Written { key: "t/1/0/0.png".to_string() });
    assert_eq!(store.put_attempts(), 1);
}

#[tokio::test]
async fn test_put_failures_are_retried() {
    let store = MockStore::new().fail_puts(service_error(500, Some("InternalError"), None), 2);
    let source = open_source(descriptor(), store.clone());

    let outcome = source.put_tile(COORD, TileData::new(&b"tile"[..])).await.unwrap();
    assert!(matches!(outcome, PutOutcome::Written { .. }));
    assert_eq!(store.put_attempts(), 3);
    assert_eq!(source.stats().put, 1);
}

#[tokio::test]
async fn test_grid_round_trip_uses_json() {
    let store = MockStore::new();
    let source = open_source(descriptor(), store.clone());
    let grid = json!({ "grid": ["!!"], "keys": ["", "1"], "data": { "1": { "name": "a" } } });

    source.put_grid(COORD, &grid).await.unwrap();
    let put = &store.puts()[0];
    assert_eq!(put.key, "g/1/0/0.grid.json");
    assert_eq!(put.content_type.as_deref(), Some("application/json"));

    let read = source.get_grid(COORD).await.unwrap();
    assert_eq!(read.data, grid);
}
