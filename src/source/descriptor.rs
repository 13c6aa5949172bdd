//! Source descriptors.
//!
//! A descriptor is the JSON document describing a tile source:
//!
//! ```json
//! {
//!   "tiles": ["https://bucket.s3.amazonaws.com/tiles/{z}/{x}/{y}.png"],
//!   "grids": ["https://bucket.s3.amazonaws.com/grids/{z}/{x}/{y}.grid.json"],
//!   "scheme": "xyz",
//!   "maskLevel": 8,
//!   "maskSolid": [8, 10, 20],
//!   "minzoom": 0,
//!   "maxzoom": 14
//! }
//! ```
//!
//! Unknown keys are kept verbatim so that [`Descriptor::info`] can return the
//! document as it was written.

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::error::SourceError;
use crate::io::S3Location;
use crate::tile::{Scheme, TileCoord};

/// Keys that are never reported by [`Descriptor::info`].
pub const HIDDEN_KEYS: &[&str] = &[
    "awsKey",
    "awsSecret",
    "maskLevel",
    "maskSolid",
    "maxSockets",
    "retry",
    "notFound",
    "reportStats",
    "conditional",
    "dryrun",
];

/// A parsed source descriptor.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Descriptor {
    #[serde(default)]
    pub tiles: Vec<String>,
    #[serde(default)]
    pub grids: Vec<String>,
    #[serde(default)]
    pub scheme: Scheme,
    #[serde(rename = "maskLevel")]
    pub mask_level: Option<u8>,
    #[serde(rename = "maskSolid")]
    pub mask_solid: Option<[u32; 3]>,
    #[serde(rename = "notFound")]
    pub not_found: Option<[u32; 3]>,
    pub fillzoom: Option<u8>,
    pub minzoom: Option<u8>,
    pub maxzoom: Option<u8>,
    pub geocoder_data: Option<String>,
    pub geocoder_shardlevel: Option<u32>,
    /// ISO 8601 modification time
    pub mtime: Option<String>,
    /// Key rewrite rule (see [`RewriteRule::parse`](crate::tile::RewriteRule::parse))
    pub prepare: Option<String>,
    #[serde(default)]
    pub strict: bool,

    #[serde(skip)]
    raw: Map<String, Value>,
}

impl Descriptor {
    /// Parse a descriptor document.
    pub fn from_json(text: &str) -> Result<Self, SourceError> {
        let value: Value =
            serde_json::from_str(text).map_err(|e| SourceError::Descriptor(e.to_string()))?;
        Self::from_value(value)
    }

    pub fn from_value(value: Value) -> Result<Self, SourceError> {
        let raw = match &value {
            Value::Object(map) => map.clone(),
            _ => {
                return Err(SourceError::Descriptor(
                    "descriptor must be a JSON object".to_string(),
                ))
            }
        };
        let mut descriptor: Descriptor =
            serde_json::from_value(value).map_err(|e| SourceError::Descriptor(e.to_string()))?;
        descriptor.raw = raw;
        Ok(descriptor)
    }

    /// The descriptor synthesized for an `s3://bucket/template` URI.
    pub fn for_template(tiles_url: String, geocoder_data: Option<String>) -> Self {
        let mut raw = Map::new();
        raw.insert("tiles".to_string(), Value::from(vec![tiles_url.clone()]));
        if let Some(geocoder_data) = &geocoder_data {
            raw.insert("geocoder_data".to_string(), Value::from(geocoder_data.clone()));
        }
        Self {
            tiles: vec![tiles_url],
            geocoder_data,
            raw,
            ..Default::default()
        }
    }

    pub fn tiles_url(&self) -> Option<&str> {
        self.tiles.first().map(String::as_str)
    }

    pub fn grids_url(&self) -> Option<&str> {
        self.grids.first().map(String::as_str)
    }

    pub fn mask_solid(&self) -> Option<TileCoord> {
        self.mask_solid.map(TileCoord::from)
    }

    pub fn not_found(&self) -> Option<TileCoord> {
        self.not_found.map(TileCoord::from)
    }

    /// Zoom above which solid placeholder tiles are not written.
    pub fn fill_ceiling(&self) -> Option<u8> {
        self.fillzoom.or(self.mask_level)
    }

    /// Whether `z` falls outside the declared zoom range.
    pub fn outside_zoom_range(&self, z: u8) -> bool {
        self.minzoom.is_some_and(|min| z < min) || self.maxzoom.is_some_and(|max| z > max)
    }

    /// Resolve the tiles and grids templates to S3 locations.
    ///
    /// Both must name a bucket and key, live in the same bucket, and agree
    /// on the region when either declares one.
    pub fn locate(&self) -> Result<Locations, SourceError> {
        let mut locations = Locations::default();

        for (name, url) in [("tiles", self.tiles_url()), ("grids", self.grids_url())] {
            let Some(url) = url else {
                continue;
            };
            let location = S3Location::from_url(url).ok_or(SourceError::NotOnS3 { key: name })?;

            if locations.bucket.as_ref().is_some_and(|b| *b != location.bucket) {
                return Err(SourceError::BucketMismatch);
            }
            locations.bucket = Some(location.bucket.clone());

            if let Some(region) = &location.region {
                if locations.region.as_ref().is_some_and(|r| r != region) {
                    return Err(SourceError::RegionMismatch);
                }
                locations.region = Some(region.clone());
            }

            match name {
                "tiles" => locations.tiles = Some(location),
                _ => locations.grids = Some(location),
            }
        }

        Ok(locations)
    }

    /// The descriptor as written, minus credentials and internal-only keys.
    pub fn info(&self) -> Map<String, Value> {
        self.raw
            .iter()
            .filter(|(key, _)| !HIDDEN_KEYS.contains(&key.as_str()))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect()
    }
}

/// Resolved S3 locations of a descriptor's templates.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Locations {
    pub bucket: Option<String>,
    pub region: Option<String>,
    pub tiles: Option<S3Location>,
    pub grids: Option<S3Location>,
}
