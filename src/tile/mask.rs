//! Alpha masks and region homogeneity.
//!
//! Above the configured mask zoom, a tile's content can often be inferred from
//! its ancestor at the mask zoom: if the part of the ancestor's raster the tile
//! covers is fully opaque the tile is a copy of the solid reference tile, and
//! if it is fully transparent the tile does not exist.

use std::num::NonZeroUsize;
use std::sync::Arc;

use lru::LruCache;
use tokio::sync::RwLock;

use super::coord::TileCoord;
use crate::error::TileError;

/// Maximum number of decoded masks kept per source.
pub const MASK_CACHE_CAPACITY: usize = 1000;

/// One alpha sample per pixel of a decoded tile, row-major.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlphaMask {
    width: u32,
    height: u32,
    alpha: Vec<u8>,
}

impl AlphaMask {
    /// Build a mask from raw samples; `alpha` must hold `width * height` bytes.
    pub fn new(width: u32, height: u32, alpha: Vec<u8>) -> Result<Self, TileError> {
        if width == 0 || height == 0 || alpha.len() != width as usize * height as usize {
            return Err(TileError::MaskDecode {
                message: format!(
                    "Image dimensions {}x{} are invalid for {} samples",
                    width,
                    height,
                    alpha.len()
                ),
            });
        }
        Ok(Self {
            width,
            height,
            alpha,
        })
    }

    /// Decode an encoded raster and keep its alpha channel.
    pub fn decode(encoded: &[u8]) -> Result<Self, TileError> {
        let image = image::load_from_memory(encoded).map_err(|e| TileError::MaskDecode {
            message: e.to_string(),
        })?;
        let rgba = image.to_rgba8();
        let (width, height) = rgba.dimensions();
        let alpha = rgba.pixels().map(|p| p.0[3]).collect();
        Self::new(width, height, alpha)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.alpha
    }

    /// Sample at `(row, col)`.
    #[inline]
    pub fn sample(&self, row: u32, col: u32) -> u8 {
        self.alpha[row as usize * self.width as usize + col as usize]
    }

    /// Whether every sample of the square `[min_y, min_y+size) x [min_x, min_x+size)`
    /// equals the sample at its top-left corner.
    pub fn region_alpha(&self, min_x: u32, min_y: u32, size: u32) -> RegionAlpha {
        let max_x = min_x.saturating_add(size).min(self.width);
        let max_y = min_y.saturating_add(size).min(self.height);
        if min_x >= max_x || min_y >= max_y {
            return RegionAlpha::Mixed;
        }

        let pivot = self.sample(min_y, min_x);
        for row in min_y..max_y {
            let start = row as usize * self.width as usize;
            let line = &self.alpha[start + min_x as usize..start + max_x as usize];
            if line.iter().any(|&a| a != pivot) {
                return RegionAlpha::Mixed;
            }
        }
        RegionAlpha::Uniform(pivot)
    }
}

/// Alpha content of a mask region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegionAlpha {
    Uniform(u8),
    Mixed,
}

/// What a region tells us about the tile covering it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegionClass {
    /// Fully opaque: serve the solid reference tile
    Solid,
    /// Fully transparent: the tile does not exist
    Blank,
    /// Mixed, or uniform at a partial alpha: fetch the tile itself
    Indeterminate,
}

impl From<RegionAlpha> for RegionClass {
    fn from(alpha: RegionAlpha) -> Self {
        match alpha {
            RegionAlpha::Uniform(255) => RegionClass::Solid,
            RegionAlpha::Uniform(0) => RegionClass::Blank,
            _ => RegionClass::Indeterminate,
        }
    }
}

/// The part of a mask raster covered by a descendant tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MaskRegion {
    /// The ancestor tile holding the mask
    pub mask: TileCoord,
    pub min_x: u32,
    pub min_y: u32,
    pub size: u32,
}

impl MaskRegion {
    /// Locate `coord` inside the raster of its ancestor at `mask_zoom`.
    ///
    /// `raster` is the mask edge length in pixels. Tiles deeper than one
    /// pixel per tile map onto the single pixel that contains them.
    pub fn locate(coord: TileCoord, mask_zoom: u8, raster: u32) -> Self {
        let mask = coord.ancestor(mask_zoom);
        let delta = u32::from(coord.z - mask.z);
        let off_x = u64::from(coord.x - (mask.x << delta));
        let off_y = u64::from(coord.y - (mask.y << delta));
        let raster = u64::from(raster);

        let size = raster >> delta;
        if size > 0 {
            Self {
                mask,
                min_x: (size * off_x) as u32,
                min_y: (size * off_y) as u32,
                size: size as u32,
            }
        } else {
            Self {
                mask,
                min_x: ((off_x * raster) >> delta) as u32,
                min_y: ((off_y * raster) >> delta) as u32,
                size: 1,
            }
        }
    }

    pub fn read(&self, mask: &AlphaMask) -> RegionAlpha {
        mask.region_alpha(self.min_x, self.min_y, self.size)
    }
}

/// Insertion-ordered cache of decoded masks, evicting the oldest entry when full.
pub struct MaskCache {
    cache: RwLock<LruCache<TileCoord, Arc<AlphaMask>>>,
}

impl MaskCache {
    pub fn new() -> Self {
        Self::with_capacity(MASK_CACHE_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            cache: RwLock::new(LruCache::new(capacity)),
        }
    }

    /// Look up a mask without refreshing its position.
    pub async fn get(&self, coord: &TileCoord) -> Option<Arc<AlphaMask>> {
        self.cache.read().await.peek(coord).cloned()
    }

    pub async fn insert(&self, coord: TileCoord, mask: Arc<AlphaMask>) {
        self.cache.write().await.push(coord, mask);
    }

    pub async fn contains(&self, coord: &TileCoord) -> bool {
        self.cache.read().await.contains(coord)
    }

    pub async fn len(&self) -> usize {
        self.cache.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.cache.read().await.is_empty()
    }
}

impl Default for MaskCache {
    fn default() -> Self {
        Self::new()
    }
}
