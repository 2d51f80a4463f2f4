use std::sync::Mutex;

use tracing::warn;

use super::store::ProgressStore;
use crate::coord::TileCoord;

/// Coordinates completed since the last flush, guarded by a single mutex.
/// A coordinate in the buffer has already been fully persisted to its tile
/// store — the buffer only tracks the *progress-store* write, which can
/// lag or be lost without corrupting the tile store itself.
pub struct ProgressBuffer {
    inner: Mutex<Vec<TileCoord>>,
    threshold: usize,
}

impl ProgressBuffer {
    /// `threshold = max(1, total_tile_count / 10000)`, so any run flushes
    /// roughly 10000 times regardless of its size.
    pub fn new(total_tile_count: i64) -> Self {
        let threshold = ((total_tile_count / 10_000).max(1)) as usize;
        Self {
            inner: Mutex::new(Vec::new()),
            threshold,
        }
    }

    /// Append `coord`; if the buffer has reached `threshold`, swap it out
    /// and flush the swapped-out slice to `store` without holding the lock.
    pub async fn push_and_maybe_flush(&self, coord: TileCoord, store: &ProgressStore) {
        let drained = {
            let mut buf = self.inner.lock().unwrap();
            buf.push(coord);
            if buf.len() >= self.threshold {
                Some(std::mem::take(&mut *buf))
            } else {
                None
            }
        };

        if let Some(tiles) = drained {
            Self::flush_slice(&tiles, store).await;
        }
    }

    /// Unconditional flush, used on task shutdown.
    pub async fn flush(&self, store: &ProgressStore) {
        let tiles = {
            let mut buf = self.inner.lock().unwrap();
            std::mem::take(&mut *buf)
        };
        Self::flush_slice(&tiles, store).await;
    }

    async fn flush_slice(tiles: &[TileCoord], store: &ProgressStore) {
        if tiles.is_empty() {
            return;
        }
        if let Err(err) = store.batch_mark(tiles).await {
            warn!(count = tiles.len(), error = %err, "failed to flush progress batch");
        }
    }
}
