//! tilestore-s3 - command-line access to S3 tile sources.

use std::error::Error;
use std::process::ExitCode;

use clap::Parser;
use futures::TryStreamExt;
use tokio::io::AsyncWriteExt;
use tracing::{debug, error};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tilestore_s3::{
    config::{Cli, Command, GetConfig, GlobalConfig, ListConfig, PutConfig, SourcesConfig},
    create_s3_client,
    io::{S3Location, S3ObjectStore},
    keys::zxy_stream_with,
    source::{list_sources, SourceUri},
    tile::{TileData, TileSource},
    TileError,
};

type CommandResult = Result<(), Box<dyn Error>>;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.global.verbose);

    if let Err(e) = cli.validate() {
        error!("Configuration error: {}", e);
        return ExitCode::FAILURE;
    }

    let result = match &cli.command {
        Command::Info(config) => run_info(&cli.global, &config.uri).await,
        Command::Get(config) => run_get(&cli.global, config).await,
        Command::Put(config) => run_put(&cli.global, config).await,
        Command::List(config) => run_list(&cli.global, config).await,
        Command::Sources(config) => run_sources(config).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

/// Initialize the tracing/logging subsystem.
fn init_logging(verbose: bool) {
    let env_filter = if verbose {
        "tilestore_s3=debug"
    } else {
        "tilestore_s3=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| env_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

/// Open a source, building a client for the region it declares.
async fn open_source(global: &GlobalConfig, uri: &str) -> Result<TileSource<S3ObjectStore>, TileError> {
    let parsed = SourceUri::parse(uri)?;
    let descriptor = parsed.load_descriptor().await?;
    let connection = parsed.options();

    let region = descriptor
        .locate()?
        .region
        .or_else(|| connection.region.clone())
        .unwrap_or_else(|| global.region.clone());
    let timeout = connection.timeout.unwrap_or_else(|| global.attempt_timeout());
    debug!(uri, region = %region, timeout_ms = timeout.as_millis() as u64, "Creating S3 client");

    let client = create_s3_client(global.endpoint.as_deref(), &region, timeout).await;
    TileSource::new(
        uri,
        descriptor,
        connection,
        S3ObjectStore::new(client),
        global.source_options(),
    )
}

// =============================================================================
// Commands
// =============================================================================

async fn run_info(global: &GlobalConfig, uri: &str) -> CommandResult {
    let source = open_source(global, uri).await?;
    println!("{}", serde_json::to_string_pretty(&source.get_info())?);
    Ok(())
}

async fn run_get(global: &GlobalConfig, config: &GetConfig) -> CommandResult {
    let source = open_source(global, &config.uri).await?;
    let coord = config.coord.coord();

    let (payload, headers) = if config.grid {
        let grid = source.get_grid(coord).await?;
        (serde_json::to_vec(&grid.data)?, grid.headers)
    } else {
        let tile = source.get_tile(coord).await?;
        (tile.data.to_vec(), (*tile.headers).clone())
    };

    for (name, value) in &headers {
        eprintln!("{}: {}", name, value.to_str().unwrap_or("<binary>"));
    }

    match &config.output {
        Some(path) => tokio::fs::write(path, &payload).await?,
        None => {
            let mut stdout = tokio::io::stdout();
            stdout.write_all(&payload).await?;
            stdout.flush().await?;
        }
    }
    Ok(())
}

async fn run_put(global: &GlobalConfig, config: &PutConfig) -> CommandResult {
    let source = open_source(global, &config.uri).await?;
    let coord = config.coord.coord();
    let body = tokio::fs::read(&config.file).await?;

    source.start_writing().await?;
    let outcome = if config.grid {
        let grid: serde_json::Value = serde_json::from_slice(&body)?;
        source.put_grid(coord, &grid).await?
    } else {
        source.put_tile(coord, TileData::new(body)).await?
    };
    source.stop_writing().await?;

    println!("{:?}", outcome);
    Ok(())
}

async fn run_list(global: &GlobalConfig, config: &ListConfig) -> CommandResult {
    let region = S3Location::from_url(&config.tiles_url)
        .and_then(|location| location.region)
        .unwrap_or_else(|| global.region.clone());
    let client = create_s3_client(global.endpoint.as_deref(), &region, global.attempt_timeout()).await;

    let mut stream = zxy_stream_with(
        S3ObjectStore::new(client),
        &config.tiles_url,
        global.retry_policy(),
    )?;
    let mut count = 0u64;
    while let Some(zxy) = stream.try_next().await? {
        println!("{}", zxy);
        count += 1;
    }
    debug!(count, "Listing complete");
    Ok(())
}

async fn run_sources(config: &SourcesConfig) -> CommandResult {
    for (id, uri) in list_sources(&config.dir).await? {
        println!("{}\t{}", id, uri);
    }
    Ok(())
}
