//! Response header synthesis.
//!
//! Tile responses carry a Content-Type (and Content-Encoding for compressed
//! vector tiles) sniffed from the payload's magic bytes, a Last-Modified and
//! ETag defaulted when the store does not provide them, and cache headers
//! taken from the stored object or from source-level configuration.

use chrono::{DateTime, Duration, Utc};
use http::header::{CACHE_CONTROL, CONTENT_ENCODING, CONTENT_TYPE, ETAG, EXPIRES, LAST_MODIFIED};
use http::{HeaderMap, HeaderName, HeaderValue};

use crate::io::StoredObject;

const HTTP_DATE_FORMAT: &str = "%a, %d %b %Y %H:%M:%S GMT";

// =============================================================================
// Tile type sniffing
// =============================================================================

/// Encoding of the payload, detected from its leading bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TileType {
    Png,
    Jpeg,
    Gif,
    Webp,
    /// Protobuf vector tile, gzip compressed
    PbfGzip,
    /// Protobuf vector tile, zlib compressed
    PbfDeflate,
}

impl TileType {
    pub fn sniff(data: &[u8]) -> Option<TileType> {
        match data {
            [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, ..] => Some(TileType::Png),
            [0xFF, 0xD8, 0xFF, ..] => Some(TileType::Jpeg),
            [b'G', b'I', b'F', b'8', b'7' | b'9', b'a', ..] => Some(TileType::Gif),
            [b'R', b'I', b'F', b'F', _, _, _, _, b'W', b'E', b'B', b'P', ..] => Some(TileType::Webp),
            [0x1F, 0x8B, ..] => Some(TileType::PbfGzip),
            [0x78, 0x9C, ..] => Some(TileType::PbfDeflate),
            _ => None,
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            TileType::Png => "image/png",
            TileType::Jpeg => "image/jpeg",
            TileType::Gif => "image/gif",
            TileType::Webp => "image/webp",
            TileType::PbfGzip | TileType::PbfDeflate => "application/x-protobuf",
        }
    }

    pub fn content_encoding(&self) -> Option<&'static str> {
        match self {
            TileType::PbfGzip => Some("gzip"),
            TileType::PbfDeflate => Some("deflate"),
            _ => None,
        }
    }
}

// =============================================================================
// Dates
// =============================================================================

/// Format a timestamp as an IMF-fixdate HTTP date.
pub fn http_date(at: DateTime<Utc>) -> String {
    at.format(HTTP_DATE_FORMAT).to_string()
}

/// Parse an HTTP date, also accepting RFC 3339.
pub fn parse_http_date(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    DateTime::parse_from_rfc2822(value)
        .or_else(|_| DateTime::parse_from_rfc3339(value))
        .map(|d| d.with_timezone(&Utc))
        .ok()
}

/// Push an `Expires` value into the future.
///
/// Unset or unparseable values yield `None`.
pub fn futurize(expires: Option<&str>) -> Option<String> {
    let expires = parse_http_date(expires?)?;
    Some(http_date(futurize_at(expires, Utc::now())))
}

/// Advance `expires` by the smallest whole number of minutes that puts it
/// strictly after `now`. Future values are returned unchanged.
pub fn futurize_at(expires: DateTime<Utc>, now: DateTime<Utc>) -> DateTime<Utc> {
    if expires > now {
        return expires;
    }
    let minutes = (now - expires).num_seconds() / 60 + 1;
    expires + Duration::seconds(minutes * 60)
}

// =============================================================================
// Header synthesis
// =============================================================================

/// Source-level cache headers, used when the stored object has none.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheDefaults {
    pub cache_control: Option<String>,
    pub expires: Option<DateTime<Utc>>,
}

/// Headers for a tile payload.
pub fn tile_headers(object: &StoredObject, defaults: &CacheDefaults, now: DateTime<Utc>) -> HeaderMap {
    let mut headers = HeaderMap::new();
    if let Some(kind) = TileType::sniff(&object.body) {
        insert(&mut headers, CONTENT_TYPE, kind.content_type());
        if let Some(encoding) = kind.content_encoding() {
            insert(&mut headers, CONTENT_ENCODING, encoding);
        }
    }
    validators(&mut headers, object, now);
    cache_headers(&mut headers, object, defaults, now);
    headers
}

/// Headers for a grid payload, which is always JSON.
pub fn grid_headers(object: &StoredObject, defaults: &CacheDefaults, now: DateTime<Utc>) -> HeaderMap {
    let mut headers = HeaderMap::new();
    insert(&mut headers, CONTENT_TYPE, "application/json");
    validators(&mut headers, object, now);
    cache_headers(&mut headers, object, defaults, now);
    headers
}

fn validators(headers: &mut HeaderMap, object: &StoredObject, now: DateTime<Utc>) {
    let modified = object.last_modified.unwrap_or(now);
    insert(headers, LAST_MODIFIED, &http_date(modified));

    let etag = match &object.etag {
        Some(etag) => etag.clone(),
        None => {
            let length = object.content_length.unwrap_or(object.body.len() as u64);
            format!("{}-{}", length, modified.timestamp_millis())
        }
    };
    insert(headers, ETAG, &etag);
}

fn cache_headers(
    headers: &mut HeaderMap,
    object: &StoredObject,
    defaults: &CacheDefaults,
    now: DateTime<Utc>,
) {
    if let Some(value) = object.cache_control.as_ref().or(defaults.cache_control.as_ref()) {
        insert(headers, CACHE_CONTROL, value);
    }

    let expires = object
        .expires
        .as_deref()
        .and_then(parse_http_date)
        .or(defaults.expires);
    if let Some(expires) = expires {
        insert(headers, EXPIRES, &http_date(futurize_at(expires, now)));
    }
}

// Values that are not valid header text are dropped.
fn insert(headers: &mut HeaderMap, name: HeaderName, value: &str) {
    if let Ok(value) = HeaderValue::from_str(value) {
        headers.insert(name, value);
    }
}
