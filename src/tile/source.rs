//! Tile source orchestrator.
//!
//! [`TileSource`] composes templating, masking, reference tiles and the
//! retrying accessor into the tile/grid read and write operations.
//!
//! # Reading a tile
//!
//! ```text
//! get_tile(z, x, y)
//!   ├─ z > 31 or x/y outside [0, 2^z) ──────────────────────► missing
//!   ├─ strict and z outside [minzoom, maxzoom] ─────────────► missing
//!   ├─ maskLevel set and z > maskLevel
//!   │    └─ classify the covered region of the ancestor mask
//!   │         ├─ opaque      ─► solid reference tile
//!   │         ├─ transparent ─► missing
//!   │         └─ mixed       ─► fetch
//!   └─ fetch ─► tile | error
//!
//! missing, with notFound set ─► not-found reference tile
//! ```

use std::num::NonZeroUsize;
use std::sync::Arc;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use http::HeaderMap;
use lru::LruCache;
use serde_json::{Map, Value};
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::coord::TileCoord;
use super::headers::{grid_headers, parse_http_date, tile_headers, CacheDefaults, TileType};
use super::mask::{AlphaMask, MaskCache, MaskRegion, RegionClass};
use super::reference::{ReferenceTile, Tile};
use super::template::{RewriteRule, UrlTemplate};
use crate::error::{Payload, StorageError, TileError};
use crate::io::{
    ObjectStore, PutObject, PutOutcome, RetryPolicy, RetryingAccessor, StatsSnapshot, WritePolicy,
};
use crate::source::{ConnectionOptions, Descriptor, SourceUri};

/// Number of solid placeholder payloads kept for duplicate writes.
pub const DUPLICATE_CACHE_CAPACITY: usize = 64;

// =============================================================================
// Options
// =============================================================================

/// Callback told about each successful tile write: coordinate and payload length.
pub type PutListener = Arc<dyn Fn(TileCoord, usize) + Send + Sync>;

/// Behaviour of a source that is not part of its descriptor.
#[derive(Clone, Default)]
pub struct SourceOptions {
    pub retry: RetryPolicy,
    /// Conditional write policy, including dry-run
    pub write: WritePolicy,
    /// Log transfer statistics when writing stops
    pub report_stats: bool,
    /// Overrides the descriptor's `prepare` rule
    pub rewrite: Option<RewriteRule>,
    /// Called after tile writes when the URI sets `events=true`
    pub on_put: Option<PutListener>,
}

/// A tile payload to write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TileData {
    pub body: Bytes,
    /// Set for solid placeholder tiles; identifies the payload for duplicate writes
    pub solid: Option<u64>,
}

impl TileData {
    pub fn new(body: impl Into<Bytes>) -> Self {
        Self {
            body: body.into(),
            solid: None,
        }
    }

    pub fn solid(body: impl Into<Bytes>, id: u64) -> Self {
        Self {
            body: body.into(),
            solid: Some(id),
        }
    }
}

impl From<Bytes> for TileData {
    fn from(body: Bytes) -> Self {
        Self::new(body)
    }
}

/// A grid payload with its response headers.
#[derive(Debug, Clone)]
pub struct Grid {
    pub data: Value,
    pub headers: HeaderMap,
}

/// Bucket and key template of one payload kind.
#[derive(Debug, Clone)]
struct Layer {
    bucket: String,
    template: UrlTemplate,
}

// =============================================================================
// Tile Source
// =============================================================================

/// A tile source backed by an object store.
pub struct TileSource<S> {
    uri: String,
    descriptor: Descriptor,
    connection: ConnectionOptions,
    tiles: Option<Layer>,
    grids: Option<Layer>,
    bucket: Option<String>,
    region: Option<String>,
    strict: bool,
    report_stats: bool,
    on_put: Option<PutListener>,
    mtime: Option<DateTime<Utc>>,
    accessor: RetryingAccessor<S>,
    masks: MaskCache,
    solid: ReferenceTile,
    not_found: ReferenceTile,
    duplicates: Mutex<LruCache<u64, Bytes>>,
}

impl<S: ObjectStore> TileSource<S> {
    /// Open the source named by `uri` on top of `store`.
    pub async fn open(uri: &str, store: S, options: SourceOptions) -> Result<Self, TileError> {
        let parsed = SourceUri::parse(uri)?;
        let descriptor = parsed.load_descriptor().await?;
        Self::new(uri, descriptor, parsed.options(), store, options)
    }

    /// Build a source from an already loaded descriptor.
    pub fn new(
        uri: &str,
        descriptor: Descriptor,
        connection: ConnectionOptions,
        store: S,
        options: SourceOptions,
    ) -> Result<Self, TileError> {
        let locations = descriptor.locate()?;
        let rewrite = match options.rewrite {
            Some(rule) => rule,
            None => RewriteRule::parse(descriptor.prepare.as_deref().unwrap_or_default())?,
        };

        let layer = |location: Option<crate::io::S3Location>| {
            location.map(|l| Layer {
                template: UrlTemplate::new(l.key, descriptor.scheme).with_rewrite(rewrite.clone()),
                bucket: l.bucket,
            })
        };
        let tiles = layer(locations.tiles);
        let grids = layer(locations.grids);

        let mtime = descriptor.mtime.as_deref().and_then(parse_http_date);
        let strict = descriptor.strict || connection.strict;
        let region = locations.region.or_else(|| connection.region.clone());

        let duplicates = NonZeroUsize::new(DUPLICATE_CACHE_CAPACITY).unwrap_or(NonZeroUsize::MIN);

        debug!(
            uri,
            bucket = locations.bucket.as_deref().unwrap_or(""),
            region = region.as_deref().unwrap_or(""),
            "Opened tile source"
        );

        Ok(Self {
            uri: uri.to_string(),
            connection,
            tiles,
            grids,
            bucket: locations.bucket,
            region,
            strict,
            report_stats: options.report_stats,
            on_put: options.on_put,
            mtime,
            accessor: RetryingAccessor::with_policies(store, options.retry, options.write),
            masks: MaskCache::new(),
            solid: ReferenceTile::new(),
            not_found: ReferenceTile::new(),
            duplicates: Mutex::new(LruCache::new(duplicates)),
            descriptor,
        })
    }

    // -------------------------------------------------------------------------
    // Tiles
    // -------------------------------------------------------------------------

    /// Read a tile, applying mask substitution and the not-found fallback.
    pub async fn get_tile(&self, coord: TileCoord) -> Result<Tile, TileError> {
        match self.load_tile(coord).await {
            Err(err) if err.is_missing() => match self.descriptor.not_found() {
                Some(fallback) => {
                    debug!(tile = %coord, fallback = %fallback, "Serving not-found tile");
                    self.not_found.get_or_load(|| self.fetch_tile(fallback)).await
                }
                None => Err(err),
            },
            result => result,
        }
    }

    async fn load_tile(&self, coord: TileCoord) -> Result<Tile, TileError> {
        if self.tiles.is_none() {
            return Err(TileError::NoTiles);
        }
        if !coord.is_valid() {
            return Err(StorageError::missing(Payload::Tile, 404).into());
        }
        if self.strict && self.descriptor.outside_zoom_range(coord.z) {
            return Err(StorageError::missing(Payload::Tile, 404).into());
        }

        if let Some(mask_level) = self.descriptor.mask_level {
            if coord.z > mask_level {
                match self.region_class(coord, mask_level).await? {
                    RegionClass::Solid => {
                        if let Some(solid) = self.descriptor.mask_solid() {
                            debug!(tile = %coord, "Serving solid tile");
                            return self.solid.get_or_load(|| self.fetch_tile(solid)).await;
                        }
                    }
                    RegionClass::Blank => {
                        return Err(StorageError::missing(Payload::Tile, 404).into());
                    }
                    RegionClass::Indeterminate => {}
                }
            }
        }

        self.fetch_tile(coord).await
    }

    async fn fetch_tile(&self, coord: TileCoord) -> Result<Tile, TileError> {
        let layer = self.tiles.as_ref().ok_or(TileError::NoTiles)?;
        let key = layer.template.expand(coord);
        let object = self.accessor.get(&layer.bucket, &key, Payload::Tile).await?;
        let headers = tile_headers(&object, &self.cache_defaults(), Utc::now());
        Ok(Tile::new(object.body, headers))
    }

    /// Classify the part of `coord`'s ancestor mask that it covers.
    pub async fn region_class(&self, coord: TileCoord, mask_level: u8) -> Result<RegionClass, TileError> {
        if !coord.is_valid() || coord.z < mask_level {
            return Err(TileError::InvalidCoord(coord));
        }
        let mask = self.mask(coord.ancestor(mask_level)).await?;
        let region = MaskRegion::locate(coord, mask_level, mask.width());
        Ok(RegionClass::from(region.read(&mask)))
    }

    /// Decoded alpha mask of `coord`, cached.
    pub async fn mask(&self, coord: TileCoord) -> Result<Arc<AlphaMask>, TileError> {
        if let Some(mask) = self.masks.get(&coord).await {
            return Ok(mask);
        }

        let tile = self.fetch_tile(coord).await?;
        let mask = Arc::new(AlphaMask::decode(&tile.data)?);
        debug!(mask = %coord.cache_key(), width = mask.width(), height = mask.height(), "Decoded mask");
        self.masks.insert(coord, Arc::clone(&mask)).await;
        Ok(mask)
    }

    /// Write a tile.
    ///
    /// Solid placeholders above the fill zoom (or mask level) are skipped;
    /// below it they are remembered for [`put_duplicate_tile`](Self::put_duplicate_tile).
    pub async fn put_tile(&self, coord: TileCoord, data: TileData) -> Result<PutOutcome, TileError> {
        let layer = self.tiles.as_ref().ok_or(TileError::NoTiles)?;
        if !coord.is_valid() {
            return Err(TileError::InvalidCoord(coord));
        }

        if let Some(id) = data.solid {
            if self.descriptor.fill_ceiling().is_some_and(|ceiling| coord.z > ceiling) {
                debug!(tile = %coord, id, "Skipping solid tile above fill zoom");
                self.accessor.stats().record_noop();
                return Ok(PutOutcome::Skipped);
            }
            let mut duplicates = self.duplicates.lock().await;
            if !duplicates.contains(&id) {
                duplicates.put(id, data.body.clone());
            }
        }

        let kind = TileType::sniff(&data.body);
        let mut request = self.put_request(layer, coord, data.body);
        request.content_type = kind.map(|k| k.content_type().to_string());
        request.content_encoding = kind.and_then(|k| k.content_encoding()).map(str::to_string);
        let len = request.body.len();

        let outcome = self.accessor.put(request, Payload::Tile).await?;
        if self.connection.events {
            info!(event = "putTile", z = coord.z, x = coord.x, y = coord.y, bytes = len, "Tile written");
            if let Some(listener) = &self.on_put {
                listener(coord, len);
            }
        }
        Ok(outcome)
    }

    /// Write a previously seen solid placeholder by id.
    pub async fn put_duplicate_tile(&self, coord: TileCoord, id: u64) -> Result<PutOutcome, TileError> {
        let body = self.duplicates.lock().await.get(&id).cloned();
        match body {
            Some(body) => self.put_tile(coord, TileData::solid(body, id)).await,
            None => Err(TileError::DuplicateNotFound(id)),
        }
    }

    // -------------------------------------------------------------------------
    // Grids
    // -------------------------------------------------------------------------

    pub async fn get_grid(&self, coord: TileCoord) -> Result<Grid, TileError> {
        let layer = self
            .grids
            .as_ref()
            .ok_or_else(|| StorageError::missing(Payload::Grid, 404))?;
        if !coord.is_valid() {
            return Err(StorageError::missing(Payload::Grid, 404).into());
        }
        let key = layer.template.expand(coord);
        let object = self.accessor.get(&layer.bucket, &key, Payload::Grid).await?;
        let headers = grid_headers(&object, &self.cache_defaults(), Utc::now());
        let data = serde_json::from_slice(&object.body)?;
        Ok(Grid { data, headers })
    }

    pub async fn put_grid(&self, coord: TileCoord, grid: &Value) -> Result<PutOutcome, TileError> {
        let layer = self.grids.as_ref().ok_or(TileError::NoGrids)?;
        if !coord.is_valid() {
            return Err(TileError::InvalidCoord(coord));
        }
        let body = Bytes::from(serde_json::to_vec(grid)?);
        let mut request = self.put_request(layer, coord, body);
        request.content_type = Some("application/json".to_string());
        self.accessor.put(request, Payload::Grid).await
    }

    fn put_request(&self, layer: &Layer, coord: TileCoord, body: Bytes) -> PutObject {
        PutObject {
            bucket: layer.bucket.clone(),
            key: layer.template.expand(coord),
            body,
            acl: Some(self.connection.acl.clone()),
            cache_control: self.connection.cache_control.clone(),
            expires: self.connection.expires,
            server_side_encryption: self.connection.sse.clone(),
            sse_kms_key_id: self.connection.sse_kms_id.clone(),
            ..Default::default()
        }
    }

    // -------------------------------------------------------------------------
    // Metadata and lifecycle
    // -------------------------------------------------------------------------

    /// The descriptor without credentials or internal-only keys.
    pub fn get_info(&self) -> Map<String, Value> {
        self.descriptor.info()
    }

    /// Metadata is owned by the descriptor; writes are accepted and dropped.
    pub async fn put_info(&self, _info: &Value) -> Result<(), TileError> {
        Ok(())
    }

    pub async fn start_writing(&self) -> Result<(), TileError> {
        debug!(uri = %self.uri, dry_run = self.accessor.write_policy().dry_run, "Start writing");
        Ok(())
    }

    /// Finish a write session, reporting statistics when enabled.
    pub async fn stop_writing(&self) -> Result<StatsSnapshot, TileError> {
        let stats = self.stats();
        if self.report_stats {
            info!(
                uri = %self.uri,
                dry_run = self.accessor.write_policy().dry_run,
                get = stats.get,
                put = stats.put,
                noop = stats.noop,
                blocked = stats.blocked,
                txin = stats.txin,
                txout = stats.txout,
                "S3 stats"
            );
        }
        Ok(stats)
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.accessor.stats().snapshot()
    }

    pub fn mtime(&self) -> Option<DateTime<Utc>> {
        self.mtime
    }

    /// The URI this source was opened with.
    pub fn to_uri(&self) -> &str {
        &self.uri
    }

    pub fn descriptor(&self) -> &Descriptor {
        &self.descriptor
    }

    pub fn bucket(&self) -> Option<&str> {
        self.bucket.as_deref()
    }

    pub fn region(&self) -> Option<&str> {
        self.region.as_deref()
    }

    pub fn connection(&self) -> &ConnectionOptions {
        &self.connection
    }

    pub(crate) fn accessor(&self) -> &RetryingAccessor<S> {
        &self.accessor
    }

    fn cache_defaults(&self) -> CacheDefaults {
        self.connection.cache_defaults()
    }
}
