use std::path::PathBuf;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::fs;

use super::TileStore;
use crate::coord::TileCoord;
use crate::error::TileStoreError;

/// Writes tiles to `<root>/<z>/<x>/<y>.<ext>`. Safe for concurrent writers:
/// each tile has its own path and directories are created as needed.
pub struct FilesystemStore {
    root: PathBuf,
    extension: &'static str,
}

impl FilesystemStore {
    pub fn new(root: impl Into<PathBuf>, extension: &'static str) -> Self {
        Self {
            root: root.into(),
            extension,
        }
    }

    fn path_for(&self, coord: TileCoord) -> PathBuf {
        self.root
            .join(coord.z.to_string())
            .join(coord.x.to_string())
            .join(format!("{}.{}", coord.y, self.extension))
    }
}

#[async_trait]
impl TileStore for FilesystemStore {
    async fn exists(&self, coord: TileCoord) -> bool {
        fs::try_exists(self.path_for(coord)).await.unwrap_or(false)
    }

    async fn insert(&self, coord: TileCoord, bytes: Bytes) -> Result<(), TileStoreError> {
        let path = self.path_for(coord);
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)
                .await
                .map_err(|source| TileStoreError::Io {
                    path: dir.display().to_string(),
                    source,
                })?;
        }
        fs::write(&path, bytes.as_ref())
            .await
            .map_err(|source| TileStoreError::Io {
                path: path.display().to_string(),
                source,
            })
    }
}
