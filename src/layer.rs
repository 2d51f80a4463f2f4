//! For one zoom level: enumerate tiles, skip known-downloaded, dispatch
//! fetches through the worker pool.

use std::sync::Arc;

use indicatif::ProgressBar;
use tokio::sync::mpsc;
use tokio::time::{sleep, Duration};
use tracing::{debug, info};

use crate::coord::TileCoord;
use crate::error::{FetchError, TaskError};
use crate::fetch::{maybe_compress, FetchOutcome, Fetcher};
use crate::pool::{Admission, WorkerPool};
use crate::progress::{DownloadedSet, ProgressBuffer, ProgressStore};
use crate::savepipe::SavePipe;
use crate::tile_store::TileStore;
use crate::tilecover::TileCover;
use crate::tilemap::{Layer, TileFormat};

pub struct LayerContext {
    pub fetcher: Fetcher,
    pub pool: Arc<WorkerPool>,
    pub tile_store: Arc<dyn TileStore>,
    pub save_pipe: Option<Arc<SavePipe>>,
    pub progress_store: Option<Arc<ProgressStore>>,
    pub progress_buffer: Option<Arc<ProgressBuffer>>,
    pub format: TileFormat,
    pub skip_existing: bool,
    pub resume: bool,
    pub inter_request_delay_ms: u64,
    pub merge_buf_size: usize,
}

/// Downloads every tile `cover` yields for `layer`, skipping coordinates
/// already in `downloaded`. Advances `overall_bar` and `layer_bar` and
/// returns once every spawned fetcher for this layer has completed.
///
/// A fatal per-tile error (currently: gzip encode failure on a vector tile)
/// stops admission of further tiles, drains the in-flight ones, and is
/// returned rather than silently dropped.
pub async fn run_layer(
    layer: &Layer,
    cover: &dyn TileCover,
    downloaded: &DownloadedSet,
    ctx: &LayerContext,
    overall_bar: &ProgressBar,
) -> Result<(), TaskError> {
    let layer_bar = ProgressBar::new(layer.count as u64);
    layer_bar.set_prefix(format!("zoom {}", layer.zoom));
    layer_bar.inc(downloaded.len() as u64);

    let (tx, mut rx) = mpsc::channel::<TileCoord>(ctx.merge_buf_size);
    let stream_handle = cover.spawn_stream(layer.zoom, tx);

    let mut join_set = tokio::task::JoinSet::new();
    let mut fatal: Option<FetchError> = None;

    loop {
        tokio::select! {
            biased;

            Some(result) = join_set.join_next(), if !join_set.is_empty() => {
                match result {
                    Ok(Ok(())) => {}
                    Ok(Err(err)) => {
                        tracing::error!(zoom = layer.zoom, error = %err, "fatal tile error, aborting layer");
                        ctx.pool.abort();
                        rx.close();
                        fatal = Some(err);
                    }
                    Err(join_err) => {
                        if join_err.is_panic() {
                            std::panic::resume_unwind(join_err.into_panic());
                        }
                    }
                }
            }

            maybe_coord = rx.recv(), if fatal.is_none() => {
                let Some(coord) = maybe_coord else { break; };

                if downloaded.contains(&coord.set_key()) {
                    debug!(z = coord.z, x = coord.x, y = coord.y, "already downloaded, skipping");
                    continue;
                }

                let permit = match ctx.pool.admit().await {
                    Admission::Admitted(permit) => permit,
                    Admission::Aborted => {
                        info!(zoom = layer.zoom, "layer enumeration aborted");
                        rx.close();
                        break;
                    }
                };

                sleep(Duration::from_millis(ctx.inter_request_delay_ms)).await;
                layer_bar.inc(1);
                overall_bar.inc(1);

                let url = crate::coord::template_url(&layer.url_template, coord);
                let fetcher = ctx.fetcher.clone();
                let tile_store = ctx.tile_store.clone();
                let save_pipe = ctx.save_pipe.clone();
                let progress_store = ctx.progress_store.clone();
                let progress_buffer = ctx.progress_buffer.clone();
                let format = ctx.format;
                let skip_existing = ctx.skip_existing;
                let resume = ctx.resume;

                join_set.spawn(async move {
                    let _permit = permit; // released on drop when this task ends
                    fetch_one(
                        coord,
                        url,
                        &fetcher,
                        tile_store,
                        save_pipe,
                        progress_store,
                        progress_buffer,
                        format,
                        skip_existing,
                        resume,
                    )
                    .await
                });
            }

            else => break,
        }
    }

    stream_handle.abort();
    while let Some(result) = join_set.join_next().await {
        match result {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                if fatal.is_none() {
                    tracing::error!(zoom = layer.zoom, error = %err, "fatal tile error, aborting layer");
                    ctx.pool.abort();
                    fatal = Some(err);
                }
            }
            Err(join_err) => {
                if join_err.is_panic() {
                    std::panic::resume_unwind(join_err.into_panic());
                }
            }
        }
    }

    layer_bar.finish_and_clear();
    info!(zoom = layer.zoom, "layer finished");

    match fatal {
        Some(err) => Err(TaskError::Fetch(err)),
        None => Ok(()),
    }
}

/// Fetches, compresses, and persists one tile. Transport/status/write
/// failures are transient and per-tile: they're logged and swallowed here.
/// A gzip encode failure on a vector tile is fatal and returned to the
/// caller, which aborts the rest of the layer rather than continuing past
/// a corrupt pipeline.
#[allow(clippy::too_many_arguments)]
async fn fetch_one(
    coord: TileCoord,
    url: String,
    fetcher: &Fetcher,
    tile_store: Arc<dyn TileStore>,
    save_pipe: Option<Arc<SavePipe>>,
    progress_store: Option<Arc<ProgressStore>>,
    progress_buffer: Option<Arc<ProgressBuffer>>,
    format: TileFormat,
    skip_existing: bool,
    resume: bool,
) -> Result<(), FetchError> {
    if skip_existing && tile_store.exists(coord).await {
        debug!(z = coord.z, x = coord.x, y = coord.y, "tile exists, skipping");
        if resume {
            if let Some(store) = &progress_store {
                let _ = store.mark_one(coord).await;
            }
        }
        return Ok(());
    }

    let outcome = match fetcher.fetch(coord, &url).await {
        Ok(outcome) => outcome,
        Err(err) => {
            tracing::warn!(z = coord.z, x = coord.x, y = coord.y, error = %err, "fetch failed");
            return Ok(());
        }
    };

    let body = match outcome {
        FetchOutcome::Tile(body) => body,
        FetchOutcome::Empty => return Ok(()),
    };

    let body = maybe_compress(coord, format, body)?;

    if let Some(pipe) = &save_pipe {
        pipe.enqueue(coord, body).await;
    } else if let Err(err) = tile_store.insert(coord, body).await {
        tracing::error!(z = coord.z, x = coord.x, y = coord.y, error = %err, "tile write failed");
        return Ok(());
    }

    if resume {
        if let (Some(buffer), Some(store)) = (&progress_buffer, &progress_store) {
            buffer.push_and_maybe_flush(coord, store).await;
        }
    }

    Ok(())
}
