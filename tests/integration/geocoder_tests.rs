//! Geocoder shard integration tests.

use serde_json::json;

use tilestore_s3::tile::{inflate, IndexPointer, FEATURE_TYPE};
use tilestore_s3::{PutOutcome, TileError};

use super::test_utils::{open_source, tiles_url, MockStore};

fn descriptor() -> serde_json::Value {
    json!({
        "tiles": [tiles_url("t/{z}/{x}/{y}.png")],
        "geocoder_data": "s3://geo-bucket/index/{prefix}",
        "geocoder_shardlevel": 0,
    })
}

#[tokio::test]
async fn test_put_and_get_shard() {
    let store = MockStore::new();
    let source = open_source(descriptor(), store.clone());

    let outcome = source.put_geocoder_data("grid", 300, b"\x01\x02\x03").await.unwrap();
    assert_eq!(
        outcome,
        PutOutcome::Written {
            key: "index/2c/grid/300.pbf".to_string()
        }
    );

    let put = &store.puts()[0];
    assert_eq!(put.bucket, "geo-bucket");
    assert_eq!(put.content_encoding.as_deref(), Some("deflate"));
    assert_eq!(put.content_type.as_deref(), Some("application/x-protobuf"));
    assert_eq!(inflate(&put.body).unwrap(), b"\x01\x02\x03".to_vec());

    let data = source.get_geocoder_data("grid", 300).await.unwrap().unwrap();
    assert_eq!(&data[..], b"\x01\x02\x03");
}

#[tokio::test]
async fn test_missing_shard_reads_as_none() {
    let source = open_source(descriptor(), MockStore::new());
    assert!(source.get_geocoder_data(FEATURE_TYPE, 4).await.unwrap().is_none());
}

#[tokio::test]
async fn test_source_without_geocoder_data() {
    let source = open_source(json!({ "tiles": [tiles_url("t/{z}/{x}/{y}.png")] }), MockStore::new());

    assert!(source.get_geocoder_data(FEATURE_TYPE, 0).await.unwrap().is_none());
    let err = source.put_geocoder_data(FEATURE_TYPE, 0, b"{}").await.unwrap_err();
    assert!(matches!(err, TileError::GeocoderUnsupported));
    assert_eq!(err.to_string(), "Geocoder data not supported");
}

#[tokio::test]
async fn test_indexable_docs_walk_every_shard() {
    let store = MockStore::new();
    let source = open_source(descriptor(), store.clone());

    let shard = json!({
        "1": "[{\"id\":1},{\"id\":2}]",
        "2": [{ "id": 3 }],
    });
    source
        .put_geocoder_data(FEATURE_TYPE, 0, shard.to_string().as_bytes())
        .await
        .unwrap();
    assert!(store.keys().contains(&"index/00/feature/0.json".to_string()));

    let (docs, pointer) = source.get_indexable_docs(None).await.unwrap();
    assert_eq!(docs, vec![json!({ "id": 1 }), json!({ "id": 2 }), json!({ "id": 3 })]);
    assert_eq!(pointer, IndexPointer { shard: 1 });

    // Shard level 0 spans shards 0..16
    let (docs, pointer) = source
        .get_indexable_docs(Some(IndexPointer { shard: 15 }))
        .await
        .unwrap();
    assert!(docs.is_empty());
    assert_eq!(pointer.shard, 16);

    let (docs, pointer) = source.get_indexable_docs(Some(pointer)).await.unwrap();
    assert!(docs.is_empty());
    assert_eq!(pointer.shard, 16);
}
