//! Tile layer.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │               TileSource                │
//! │  ┌──────────────┐  ┌─────────────────┐  │
//! │  │  MaskCache   │  │ ReferenceTile   │  │
//! │  │  (decoded    │  │ (solid and      │  │
//! │  │   alphas)    │  │  not-found)     │  │
//! │  └──────────────┘  └─────────────────┘  │
//! │  ┌──────────────┐  ┌─────────────────┐  │
//! │  │ UrlTemplate  │  │ header          │  │
//! │  │              │  │ synthesis       │  │
//! │  └──────────────┘  └─────────────────┘  │
//! └────────────────────┬────────────────────┘
//!                      │
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │            RetryingAccessor             │
//! └─────────────────────────────────────────┘
//! ```
//!
//! # Components
//!
//! - [`TileSource`]: tile/grid reads and writes, geocoder shards, metadata
//! - [`UrlTemplate`] and [`RewriteRule`]: coordinate to key expansion
//! - [`AlphaMask`], [`MaskRegion`], [`MaskCache`]: masked tile substitution
//! - [`ReferenceTile`]: fetch-once solid and not-found tiles
//! - [`tile_headers`], [`futurize`]: response headers

mod coord;
mod geocoder;
mod headers;
mod mask;
mod reference;
mod source;
mod template;

pub use coord::{TileCoord, MAX_ZOOM};
pub use geocoder::{deflate, inflate, shard_prefix, IndexPointer, FEATURE_TYPE};
pub use headers::{
    futurize, futurize_at, grid_headers, http_date, parse_http_date, tile_headers, CacheDefaults,
    TileType,
};
pub use mask::{AlphaMask, MaskCache, MaskRegion, RegionAlpha, RegionClass, MASK_CACHE_CAPACITY};
pub use reference::{ReferenceTile, Tile};
pub use source::{
    Grid, PutListener, SourceOptions, TileData, TileSource, DUPLICATE_CACHE_CAPACITY,
};
pub use template::{expand, prefix, prefix4, RewriteFn, RewriteRule, Scheme, UrlTemplate};
