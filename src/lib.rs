//! # tilestore-s3
//!
//! A tile source backed by S3-compatible object storage.
//!
//! Tiles, UTFGrid-style grids and geocoder shards are addressed by key
//! templates such as `s3://bucket/{prefix}/{z}/{x}/{y}.png`. Reads and writes
//! go through an accessor that retries classified transport failures and
//! skips writes whose content is already stored.
//!
//! ## Features
//!
//! - **Conditional writes**: a PUT first reads the stored object; identical
//!   content is a no-op and suspicious shrinks are diverted to a `.blocked` key
//! - **Error classification**: timeouts, resets, truncated bodies and 5xx
//!   responses are retried with exponential backoff; 404/403 become
//!   "Tile does not exist"
//! - **Alpha masks**: above a mask zoom, tiles covered by a fully opaque or
//!   fully transparent mask region are answered without a fetch
//! - **Key enumeration**: stream the `z/x/y` of every stored tile of a template
//!
//! ## Architecture
//!
//! - [`io`] - object store abstraction, S3 implementation, error classifier, retrying accessor
//! - [`tile`] - templating, masks, headers and the [`TileSource`] orchestrator
//! - [`source`] - descriptors, connection options and source URIs
//! - [`keys`] - key enumeration stream
//! - [`config`] - CLI configuration types
//!
//! ## Example
//!
//! ```rust,no_run
//! use tilestore_s3::{create_s3_client, S3ObjectStore, SourceOptions, TileCoord, TileSource};
//! use tilestore_s3::io::DEFAULT_ATTEMPT_TIMEOUT;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), tilestore_s3::TileError> {
//!     let client = create_s3_client(None, "us-east-1", DEFAULT_ATTEMPT_TIMEOUT).await;
//!     let source = TileSource::open(
//!         "s3://my-tiles/base/{z}/{x}/{y}.png",
//!         S3ObjectStore::new(client),
//!         SourceOptions::default(),
//!     )
//!     .await?;
//!
//!     let tile = source.get_tile(TileCoord::new(3, 6, 5)).await?;
//!     println!("{} bytes", tile.data.len());
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod io;
pub mod keys;
pub mod source;
pub mod tile;

pub use error::{ErrorKind, Payload, SourceError, StorageError, TileError, TransportError};
pub use io::{
    create_s3_client, ObjectStore, PutOutcome, RetryPolicy, RetryingAccessor, S3ObjectStore,
    StatsSnapshot, WritePolicy,
};
pub use keys::{zxy_stream, zxy_stream_with, ZxyStreamConfig};
pub use source::{ConnectionOptions, Descriptor, SourceUri};
pub use tile::{SourceOptions, Tile, TileCoord, TileData, TileSource};
