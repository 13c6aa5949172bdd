use std::fmt;

/// Maximum zoom level addressable with 32-bit tile columns/rows.
pub const MAX_ZOOM: u8 = 31;

/// A tile address in the quad-tree pyramid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TileCoord {
    pub z: u8,
    pub x: u32,
    pub y: u32,
}

impl TileCoord {
    pub const fn new(z: u8, x: u32, y: u32) -> Self {
        Self { z, x, y }
    }

    /// Number of tiles along one axis at this zoom.
    pub fn dim(&self) -> u64 {
        1u64 << self.z.min(MAX_ZOOM)
    }

    /// Whether x and y fall inside `[0, 2^z)`.
    pub fn is_valid(&self) -> bool {
        self.z <= MAX_ZOOM && (self.x as u64) < self.dim() && (self.y as u64) < self.dim()
    }

    /// Row index with the y axis flipped (TMS numbering).
    pub fn flipped_y(&self) -> u64 {
        (self.dim() - 1).saturating_sub(self.y as u64)
    }

    /// Ancestor of this tile at `zoom` (which must not exceed `self.z`).
    pub fn ancestor(&self, zoom: u8) -> TileCoord {
        let delta = self.z.saturating_sub(zoom).min(MAX_ZOOM);
        TileCoord::new(zoom.min(self.z), self.x >> delta, self.y >> delta)
    }

    /// Bing-style quadkey, one base-4 digit per zoom level.
    pub fn quadkey(&self) -> String {
        (1..=self.z.min(MAX_ZOOM))
            .rev()
            .map(|i| {
                let mask = 1u32 << (i - 1);
                let mut digit = 0u8;
                if self.x & mask != 0 {
                    digit += 1;
                }
                if self.y & mask != 0 {
                    digit += 2;
                }
                char::from(b'0' + digit)
            })
            .collect()
    }

    /// `"z,x,y"`, the key used by the mask cache.
    pub fn cache_key(&self) -> String {
        format!("{},{},{}", self.z, self.x, self.y)
    }
}

impl fmt::Display for TileCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.z, self.x, self.y)
    }
}

impl From<[u32; 3]> for TileCoord {
    fn from(zxy: [u32; 3]) -> Self {
        TileCoord::new(zxy[0].min(MAX_ZOOM as u32) as u8, zxy[1], zxy[2])
    }
}
