//! Lazily fetched reference tiles (the solid tile and the not-found tile).

use std::future::Future;
use std::sync::Arc;

use bytes::Bytes;
use http::HeaderMap;
use tokio::sync::OnceCell;

use crate::error::TileError;

/// A tile payload with its response headers.
#[derive(Debug, Clone)]
pub struct Tile {
    pub data: Bytes,
    pub headers: Arc<HeaderMap>,
}

impl Tile {
    pub fn new(data: Bytes, headers: HeaderMap) -> Self {
        Self {
            data,
            headers: Arc::new(headers),
        }
    }
}

/// A tile fetched at most once per source.
///
/// Concurrent first callers share a single fetch. A failed fetch leaves the
/// slot empty so the next caller tries again.
#[derive(Debug, Default)]
pub struct ReferenceTile {
    cell: OnceCell<Tile>,
}

impl ReferenceTile {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached tile, fetching it with `load` on first use.
    ///
    /// Each call gets its own copy of the payload; headers are shared.
    pub async fn get_or_load<F, Fut>(&self, load: F) -> Result<Tile, TileError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Tile, TileError>>,
    {
        let cached = self.cell.get_or_try_init(load).await?;
        Ok(Tile {
            data: Bytes::copy_from_slice(&cached.data),
            headers: Arc::clone(&cached.headers),
        })
    }

    pub fn is_loaded(&self) -> bool {
        self.cell.initialized()
    }
}
