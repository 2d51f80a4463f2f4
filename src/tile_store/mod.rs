//! Tile storage sinks: MBTiles (SQLite) or a plain directory tree.

mod filesystem;
mod mbtiles;

pub use filesystem::FilesystemStore;
pub use mbtiles::MbtilesStore;

use async_trait::async_trait;
use bytes::Bytes;

use crate::coord::TileCoord;
use crate::error::TileStoreError;

#[async_trait]
pub trait TileStore: Send + Sync {
    /// Best-effort existence check; returns `false` on any error.
    async fn exists(&self, coord: TileCoord) -> bool;

    async fn insert(&self, coord: TileCoord, bytes: Bytes) -> Result<(), TileStoreError>;
}
