//! Single-consumer bounded queue serializing writes to the MBTiles store.
//! Only used for MBTiles output; filesystem writes happen directly from
//! fetcher tasks since they're safe to run concurrently.

use bytes::Bytes;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::error;

use crate::coord::TileCoord;
use crate::tile_store::MbtilesStore;

pub struct SavePipe {
    tx: mpsc::Sender<(TileCoord, Bytes)>,
}

impl SavePipe {
    /// Spawns the single consumer task and returns the sender half plus a
    /// handle to await once all producers have dropped their senders.
    pub fn spawn(store: std::sync::Arc<MbtilesStore>, depth: usize) -> (Self, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::channel::<(TileCoord, Bytes)>(depth);

        let handle = tokio::spawn(async move {
            while let Some((coord, bytes)) = rx.recv().await {
                if let Err(err) = store.insert(coord, bytes).await {
                    error!(z = coord.z, x = coord.x, y = coord.y, error = %err, "mbtiles insert failed");
                }
            }
        });

        (Self { tx }, handle)
    }

    /// Enqueues a tile; blocks (providing back-pressure) when the queue is
    /// full.
    pub async fn enqueue(&self, coord: TileCoord, bytes: Bytes) {
        // The consumer only ever stops after every sender is dropped, so a
        // send error here would mean the pipe was torn down underneath an
        // in-flight fetcher — nothing to recover, just drop the tile.
        let _ = self.tx.send((coord, bytes)).await;
    }
}
