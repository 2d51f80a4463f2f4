//! Task controller: sequences layers, owns the tile/progress stores, and
//! maintains the overall progress bar.

use std::sync::Arc;

use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};

use crate::error::TaskError;
use crate::layer::{run_layer, LayerContext};
use crate::pool::WorkerPool;
use crate::progress::{ProgressBuffer, ProgressStore};
use crate::savepipe::SavePipe;
use crate::tile_store::{FilesystemStore, MbtilesStore, TileStore};
use crate::tilecover::TileCover;
use crate::tilemap::{Layer, TileMap};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Mbtiles,
    Filesystem,
}

pub struct TaskConfig {
    pub layers: Vec<Layer>,
    pub output_directory: String,
    pub output_format: OutputFormat,
    pub skip_existing: bool,
    pub resume: bool,
    pub worker_count: usize,
    pub save_pipe_size: usize,
    pub merge_buf_size: usize,
    pub inter_request_delay_ms: u64,
}

pub struct Task {
    map: TileMap,
    config: TaskConfig,
    pool: Arc<WorkerPool>,
}

impl Task {
    pub fn new(map: TileMap, config: TaskConfig) -> Self {
        let pool = Arc::new(WorkerPool::new(config.worker_count));
        Self { map, config, pool }
    }

    pub fn pool(&self) -> Arc<WorkerPool> {
        self.pool.clone()
    }

    pub fn total_tile_count(&self) -> i64 {
        self.config.layers.iter().map(|l| l.count).sum()
    }

    /// Runs every layer in order, covered by `cover_for` (one `TileCover`
    /// per layer — real tile-cover collaborators are geometry-specific).
    pub async fn run(
        &self,
        cover_for: impl Fn(&Layer) -> Box<dyn TileCover>,
    ) -> Result<(), TaskError> {
        std::fs::create_dir_all(&self.config.output_directory).map_err(|source| {
            TaskError::OutputDir {
                path: self.config.output_directory.clone(),
                source,
            }
        })?;

        let total = self.total_tile_count();
        let overall_bar = ProgressBar::new(total as u64);
        overall_bar.set_style(
            ProgressStyle::with_template("{prefix} [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) ETA {eta}")?
                .progress_chars("##-"),
        );
        overall_bar.set_prefix("task");

        let (progress_store, progress_buffer, mut start_layer_index) = self.setup_progress(total).await;

        if start_layer_index > 0 {
            let skipped: i64 = self.config.layers[..start_layer_index as usize]
                .iter()
                .map(|l| l.count)
                .sum();
            overall_bar.inc(skipped as u64);
            info!(start_layer_index, "resuming from checkpoint");
        }
        if start_layer_index < 0 {
            start_layer_index = 0;
        }

        let (tile_store, mbtiles_for_pipe) = self.open_tile_store().await?;
        let fetcher = crate::fetch::Fetcher::new()?;

        let (save_pipe, save_pipe_handle) = match mbtiles_for_pipe {
            Some(mbtiles) => {
                let (pipe, handle) = SavePipe::spawn(mbtiles, self.config.save_pipe_size);
                (Some(Arc::new(pipe)), Some(handle))
            }
            None => (None, None),
        };

        let mut fatal: Option<TaskError> = None;

        for (index, layer) in self.config.layers.iter().enumerate().skip(start_layer_index as usize) {
            if let Some(store) = &progress_store {
                let _ = store.save_resume_point(index as i32).await;
            }

            let downloaded = match &progress_store {
                Some(store) => store.load_downloaded_for_zoom(layer.zoom).await.unwrap_or_default(),
                None => Default::default(),
            };
            overall_bar.inc(downloaded.len() as u64);

            let cover = cover_for(layer);
            let ctx = LayerContext {
                fetcher: fetcher.clone(),
                pool: self.pool.clone(),
                tile_store: tile_store.clone(),
                save_pipe: save_pipe.clone(),
                progress_store: progress_store.clone(),
                progress_buffer: progress_buffer.clone(),
                format: self.map.format,
                skip_existing: self.config.skip_existing,
                resume: self.config.resume,
                inter_request_delay_ms: self.config.inter_request_delay_ms,
                merge_buf_size: self.config.merge_buf_size,
            };

            if let Err(err) = run_layer(layer, cover.as_ref(), &downloaded, &ctx, &overall_bar).await {
                fatal = Some(err);
                break;
            }

            if self.pool.is_aborted() {
                break;
            }
        }

        if let Some(store) = &progress_store {
            let _ = store.save_resume_point(-1).await;
        }
        if let (Some(buffer), Some(store)) = (&progress_buffer, &progress_store) {
            buffer.flush(store).await;
        }

        drop(save_pipe);
        if let Some(handle) = save_pipe_handle {
            let _ = handle.await;
        }

        overall_bar.finish_and_clear();

        if let Some(err) = fatal {
            return Err(err);
        }

        info!("task finished");
        Ok(())
    }

    async fn setup_progress(
        &self,
        total: i64,
    ) -> (Option<Arc<ProgressStore>>, Option<Arc<ProgressBuffer>>, i32) {
        if !self.config.resume {
            return (None, None, 0);
        }

        let path = format!("{}/{}.progress.db", self.config.output_directory, self.map.name);
        match ProgressStore::open(&path, self.config.resume).await {
            Ok(store) => {
                let store = Arc::new(store);
                let resume_point = store.load_resume_point().await.unwrap_or(-1);
                let buffer = Arc::new(ProgressBuffer::new(total));
                (Some(store), Some(buffer), resume_point)
            }
            Err(err) => {
                warn!(error = %err, "failed to set up progress database, continuing without resume support");
                (None, None, 0)
            }
        }
    }

    /// Opens the configured tile store. For MBTiles output, also returns a
    /// typed `Arc<MbtilesStore>` for the save pipe, which needs the
    /// concrete type to serialize inserts — `exists()` checks still go
    /// through the same store via the returned `Arc<dyn TileStore>`.
    async fn open_tile_store(
        &self,
    ) -> Result<(Arc<dyn TileStore>, Option<Arc<MbtilesStore>>), TaskError> {
        match self.config.output_format {
            OutputFormat::Mbtiles => {
                let path = format!("{}/{}.mbtiles", self.config.output_directory, self.map.name);
                let store = Arc::new(MbtilesStore::open(&path, &self.map, self.config.skip_existing).await?);
                Ok((store.clone(), Some(store)))
            }
            OutputFormat::Filesystem => {
                let root = format!("{}/{}", self.config.output_directory, self.map.name);
                Ok((
                    Arc::new(FilesystemStore::new(root, self.map.format.extension())),
                    None,
                ))
            }
        }
    }
}
