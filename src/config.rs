//! Command-line configuration for the `tilestore-s3` binary.
//!
//! Options shared by every command can also be set through the environment:
//!
//! - `AWS_S3_ENDPOINT` - Custom S3 endpoint (switches to path-style addressing)
//! - `AWS_REGION` - Region used when the source does not declare one (default: us-east-1)
//! - `TILESTORE_S3_DRYRUN` - Count writes without sending them
//! - `TILESTORE_S3_STATS` - Log transfer statistics when a write session ends
//!
//! Library callers do not go through this module: they build
//! [`SourceOptions`] directly.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};

use crate::io::{ReadErrorPolicy, RetryPolicy, WritePolicy};
use crate::tile::{SourceOptions, TileCoord};

// =============================================================================
// Default Values
// =============================================================================

/// Default AWS region.
pub const DEFAULT_REGION: &str = "us-east-1";

/// Default per-attempt timeout in milliseconds.
pub const DEFAULT_TIMEOUT_MS: u64 = 2000;

/// Default delay before the first retry in milliseconds.
pub const DEFAULT_BASE_DELAY_MS: u64 = 100;

// =============================================================================
// CLI Arguments
// =============================================================================

/// tilestore-s3 - tiles, grids and geocoder shards stored in S3.
#[derive(Parser, Debug, Clone)]
#[command(name = "tilestore-s3")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalConfig,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Print a source's descriptor without credentials or internal keys
    Info(InfoConfig),
    /// Read one tile or grid
    Get(GetConfig),
    /// Write one tile or grid through the conditional PUT
    Put(PutConfig),
    /// Stream the z/x/y of every stored tile matching a template
    List(ListConfig),
    /// List the descriptor files in a directory
    Sources(SourcesConfig),
}

/// Options shared by every command.
#[derive(Args, Debug, Clone)]
pub struct GlobalConfig {
    /// Custom S3 endpoint URL for S3-compatible services (MinIO, etc.).
    #[arg(long, global = true, env = "AWS_S3_ENDPOINT")]
    pub endpoint: Option<String>,

    /// Region used when the source does not declare one.
    #[arg(long, global = true, default_value = DEFAULT_REGION, env = "AWS_REGION")]
    pub region: String,

    /// Per-attempt timeout in milliseconds.
    #[arg(long, global = true, default_value_t = DEFAULT_TIMEOUT_MS)]
    pub timeout_ms: u64,

    /// Total attempts per request, including the first.
    #[arg(long, global = true, default_value_t = RetryPolicy::DEFAULT_MAX_ATTEMPTS)]
    pub max_attempts: u32,

    /// Delay before the first retry in milliseconds; doubled on each further retry.
    #[arg(long, global = true, default_value_t = DEFAULT_BASE_DELAY_MS)]
    pub base_delay_ms: u64,

    /// What a write does when its conditional read fails: propagate or overwrite.
    #[arg(long, global = true, default_value = "propagate")]
    pub on_read_error: ReadErrorPolicy,

    /// Allow writes that shrink a stored object to half its size or less.
    #[arg(long, global = true, default_value_t = false)]
    pub no_shrink_guard: bool,

    /// Count writes without sending them.
    #[arg(long, global = true, default_value_t = false, env = "TILESTORE_S3_DRYRUN")]
    pub dry_run: bool,

    /// Log transfer statistics when a write session ends.
    #[arg(long, global = true, default_value_t = false, env = "TILESTORE_S3_STATS")]
    pub stats: bool,

    /// Enable verbose logging (debug level).
    #[arg(short, long, global = true, default_value_t = false)]
    pub verbose: bool,
}

/// A tile address on the command line.
#[derive(Args, Debug, Clone)]
pub struct CoordArgs {
    pub z: u8,
    pub x: u32,
    pub y: u32,
}

impl CoordArgs {
    pub fn coord(&self) -> TileCoord {
        TileCoord::new(self.z, self.x, self.y)
    }
}

#[derive(Args, Debug, Clone)]
pub struct InfoConfig {
    /// Source URI (`s3://bucket/template` or a descriptor path)
    pub uri: String,
}

#[derive(Args, Debug, Clone)]
pub struct GetConfig {
    /// Source URI (`s3://bucket/template` or a descriptor path)
    pub uri: String,

    #[command(flatten)]
    pub coord: CoordArgs,

    /// Read the grid instead of the tile.
    #[arg(long, default_value_t = false)]
    pub grid: bool,

    /// Write the payload to this file instead of stdout.
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct PutConfig {
    /// Source URI (`s3://bucket/template` or a descriptor path)
    pub uri: String,

    #[command(flatten)]
    pub coord: CoordArgs,

    /// File holding the payload (JSON for grids).
    pub file: PathBuf,

    /// Write a grid instead of a tile.
    #[arg(long, default_value_t = false)]
    pub grid: bool,
}

#[derive(Args, Debug, Clone)]
pub struct ListConfig {
    /// Tiles URL, e.g. `s3://bucket/{prefix}/{z}/{x}/{y}.png`
    pub tiles_url: String,
}

#[derive(Args, Debug, Clone)]
pub struct SourcesConfig {
    /// Directory holding `<id>.s3` descriptor files.
    pub dir: PathBuf,
}

// =============================================================================
// Validation and conversions
// =============================================================================

impl Cli {
    /// Validate the configuration and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        self.global.validate()?;

        let coord = match &self.command {
            Command::Get(config) => Some(config.coord.coord()),
            Command::Put(config) => Some(config.coord.coord()),
            _ => None,
        };
        if let Some(coord) = coord {
            if !coord.is_valid() {
                return Err(format!("tile {} is outside the pyramid", coord));
            }
        }

        Ok(())
    }
}

impl GlobalConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.max_attempts == 0 {
            return Err("max_attempts must be greater than 0".to_string());
        }
        if self.timeout_ms == 0 {
            return Err("timeout_ms must be greater than 0".to_string());
        }
        if self.region.is_empty() {
            return Err("region must not be empty. Set --region or AWS_REGION".to_string());
        }
        if let Some(endpoint) = &self.endpoint {
            let valid = url::Url::parse(endpoint)
                .map(|u| u.scheme() == "http" || u.scheme() == "https")
                .unwrap_or(false);
            if !valid {
                return Err(format!(
                    "endpoint '{}' must be an http(s) URL. Check --endpoint or AWS_S3_ENDPOINT",
                    endpoint
                ));
            }
        }
        Ok(())
    }

    pub fn attempt_timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_attempts, Duration::from_millis(self.base_delay_ms))
    }

    pub fn write_policy(&self) -> WritePolicy {
        WritePolicy {
            on_read_error: self.on_read_error,
            shrink_guard: !self.no_shrink_guard,
            dry_run: self.dry_run,
        }
    }

    pub fn source_options(&self) -> SourceOptions {
        SourceOptions {
            retry: self.retry_policy(),
            write: self.write_policy(),
            report_stats: self.stats,
            rewrite: None,
            on_put: None,
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
