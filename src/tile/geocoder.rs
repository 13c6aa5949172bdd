//! Geocoder shard storage.
//!
//! Geocoder indexes are split into numbered shards stored next to the tiles.
//! A shard's key is derived from the source's `geocoder_data` URL, whose
//! `{prefix}` token receives `shard mod 256` as two hex digits, followed by
//! `<type>/<shard>.json` for feature shards or `<type>/<shard>.pbf` for
//! everything else. Payloads are zlib-deflated at rest.

use std::io::{Read, Write};

use bytes::Bytes;
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::source::TileSource;
use crate::error::{Payload, TileError};
use crate::io::{ObjectStore, PutObject, PutOutcome, S3Location};

/// Shard type holding the indexable documents.
pub const FEATURE_TYPE: &str = "feature";

/// Resumable position of [`TileSource::get_indexable_docs`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexPointer {
    pub shard: u64,
}

/// `shard mod 256` as two hex digits.
pub fn shard_prefix(shard: u64) -> String {
    format!("{:02x}", shard % 256)
}

fn extension(kind: &str) -> &'static str {
    if kind == FEATURE_TYPE {
        ".json"
    } else {
        ".pbf"
    }
}

fn content_type(kind: &str) -> &'static str {
    if kind == FEATURE_TYPE {
        "application/json"
    } else {
        "application/x-protobuf"
    }
}

pub fn deflate(data: &[u8]) -> Result<Vec<u8>, TileError> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(data)
        .map_err(|e| TileError::Compression(e.to_string()))?;
    encoder
        .finish()
        .map_err(|e| TileError::Compression(e.to_string()))
}

pub fn inflate(data: &[u8]) -> Result<Vec<u8>, TileError> {
    let mut out = Vec::new();
    ZlibDecoder::new(data)
        .read_to_end(&mut out)
        .map_err(|e| TileError::Compression(e.to_string()))?;
    Ok(out)
}

impl<S: ObjectStore> TileSource<S> {
    /// Bucket and key of a geocoder shard, `None` when the source has no geocoder data.
    fn shard_location(&self, kind: &str, shard: u64) -> Result<Option<S3Location>, TileError> {
        let Some(base) = self.descriptor().geocoder_data.as_deref() else {
            return Ok(None);
        };
        let url = base.replacen("{prefix}", &shard_prefix(shard), 1);
        let mut location = S3Location::from_url(&url).ok_or(TileError::GeocoderUnsupported)?;
        location.key = format!(
            "{}/{}/{}{}",
            location.key.trim_end_matches('/'),
            kind,
            shard,
            extension(kind)
        );
        Ok(Some(location))
    }

    /// Read and inflate a shard. Missing shards read as `None`.
    pub async fn get_geocoder_data(&self, kind: &str, shard: u64) -> Result<Option<Bytes>, TileError> {
        let Some(location) = self.shard_location(kind, shard)? else {
            return Ok(None);
        };

        match self
            .accessor()
            .get(&location.bucket, &location.key, Payload::Tile)
            .await
        {
            Ok(object) => Ok(Some(Bytes::from(inflate(&object.body)?))),
            Err(err) if err.is_missing() => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// Deflate and write a shard.
    pub async fn put_geocoder_data(
        &self,
        kind: &str,
        shard: u64,
        data: &[u8],
    ) -> Result<PutOutcome, TileError> {
        let location = self
            .shard_location(kind, shard)?
            .ok_or(TileError::GeocoderUnsupported)?;
        let connection = self.connection();

        let request = PutObject {
            bucket: location.bucket,
            key: location.key,
            body: Bytes::from(deflate(data)?),
            acl: Some(connection.acl.clone()),
            content_type: Some(content_type(kind).to_string()),
            content_encoding: Some("deflate".to_string()),
            server_side_encryption: connection.sse.clone(),
            sse_kms_key_id: connection.sse_kms_id.clone(),
            ..Default::default()
        };
        self.accessor().put(request, Payload::Tile).await
    }

    /// Read the documents of one feature shard and advance the pointer.
    ///
    /// A feature shard is a JSON object whose values are JSON-encoded
    /// collections of documents; they are flattened into one list. Once the
    /// pointer passes the last shard (`16^(shardlevel + 1)`), an empty list
    /// and the unchanged pointer are returned.
    pub async fn get_indexable_docs(
        &self,
        pointer: Option<IndexPointer>,
    ) -> Result<(Vec<Value>, IndexPointer), TileError> {
        let mut pointer = pointer.unwrap_or_default();
        let level = self.descriptor().geocoder_shardlevel.unwrap_or(0).saturating_add(1);
        let limit = 16u64.checked_pow(level).unwrap_or(u64::MAX);

        if pointer.shard >= limit {
            return Ok((Vec::new(), pointer));
        }

        let shard: Map<String, Value> = match self.get_geocoder_data(FEATURE_TYPE, pointer.shard).await? {
            Some(buffer) => serde_json::from_slice(&buffer)?,
            None => Map::new(),
        };

        let mut docs = Vec::new();
        for (_, entry) in shard {
            let features = match entry {
                Value::String(text) => serde_json::from_str(&text)?,
                other => other,
            };
            match features {
                Value::Array(items) => docs.extend(items),
                Value::Object(map) => docs.extend(map.into_iter().map(|(_, v)| v)),
                _ => {}
            }
        }

        pointer.shard += 1;
        Ok((docs, pointer))
    }
}
