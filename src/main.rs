//! Thin CLI entry point. Assembles one `TileMap` and one `Layer` per zoom
//! in range from a bounding box, then hands everything to the task
//! controller. Region-file/polygon parsing and layered config loading are
//! external collaborators, not this binary's job.

use anyhow::{Context, Result};
use clap::Parser;
use tile_downloader::task::{OutputFormat, Task, TaskConfig};
use tile_downloader::tilecover::{BoundingBoxCover, TileCover};
use tile_downloader::tilemap::{BoundingBox, Layer, TileFormat, TileMap, TileSchema};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Download map tiles across a zoom range into an MBTiles archive or a
/// tile directory tree.
#[derive(Parser, Debug)]
#[command(name = "tile_downloader", version, about)]
struct Args {
    /// Tile URL template, e.g. "https://example/{z}/{x}/{y}.png"
    #[arg(long)]
    url_template: String,

    /// Destination directory for the output artifact.
    #[arg(long, default_value = "./out")]
    output_directory: String,

    /// Base name for the output file/tree.
    #[arg(long, default_value = "tiles")]
    name: String,

    #[arg(long, default_value_t = 0)]
    min_zoom: u8,

    #[arg(long, default_value_t = 5)]
    max_zoom: u8,

    #[arg(long, allow_hyphen_values = true)]
    min_lon: f64,
    #[arg(long, allow_hyphen_values = true)]
    min_lat: f64,
    #[arg(long, allow_hyphen_values = true)]
    max_lon: f64,
    #[arg(long, allow_hyphen_values = true)]
    max_lat: f64,

    #[arg(long, value_enum, default_value_t = CliFormat::Png)]
    format: CliFormat,

    #[arg(long, value_enum, default_value_t = CliOutput::Mbtiles)]
    output: CliOutput,

    #[arg(long, default_value_t = 16)]
    workers: usize,

    #[arg(long, default_value_t = 64)]
    save_pipe_size: usize,

    #[arg(long, default_value_t = 256)]
    merge_buf_size: usize,

    #[arg(long, default_value_t = 0)]
    inter_request_delay_ms: u64,

    #[arg(long)]
    skip_existing: bool,

    #[arg(long)]
    resume: bool,
}

#[derive(Copy, Clone, Debug, clap::ValueEnum)]
enum CliFormat {
    Png,
    Jpg,
    Webp,
    Pbf,
}

#[derive(Copy, Clone, Debug, clap::ValueEnum)]
enum CliOutput {
    Mbtiles,
    Filesystem,
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();

    let bounds = BoundingBox {
        min_lon: args.min_lon,
        min_lat: args.min_lat,
        max_lon: args.max_lon,
        max_lat: args.max_lat,
    };
    let format = match args.format {
        CliFormat::Png => TileFormat::Png,
        CliFormat::Jpg => TileFormat::Jpg,
        CliFormat::Webp => TileFormat::Webp,
        CliFormat::Pbf => TileFormat::Pbf,
    };

    let map = TileMap {
        name: args.name.clone(),
        format,
        schema: TileSchema::Xyz,
        bounds,
        min_zoom: args.min_zoom,
        max_zoom: args.max_zoom,
        json: String::new(),
    };

    let cover = BoundingBoxCover::new(bounds);
    let layers: Vec<Layer> = (args.min_zoom..=args.max_zoom)
        .map(|zoom| Layer {
            zoom,
            url_template: args.url_template.clone(),
            geometry: bounds,
            count: cover.count(zoom),
        })
        .collect();

    let config = TaskConfig {
        layers,
        output_directory: args.output_directory.clone(),
        output_format: match args.output {
            CliOutput::Mbtiles => OutputFormat::Mbtiles,
            CliOutput::Filesystem => OutputFormat::Filesystem,
        },
        skip_existing: args.skip_existing,
        resume: args.resume,
        worker_count: args.workers,
        save_pipe_size: args.save_pipe_size,
        merge_buf_size: args.merge_buf_size,
        inter_request_delay_ms: args.inter_request_delay_ms,
    };

    let task = Task::new(map, config);
    let pool = task.pool();

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("ctrl-c received, aborting task");
            pool.abort();
        }
    });

    task.run(|layer| {
        let cover = BoundingBoxCover::new(layer.geometry);
        Box::new(cover) as Box<dyn TileCover>
    })
    .await
    .context("tile download task failed")?;

    Ok(())
}
