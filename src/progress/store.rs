use std::collections::HashSet;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};

use crate::coord::TileCoord;
use crate::error::ProgressStoreError;

/// In-memory set of `(x, y)` already recorded as downloaded for one zoom,
/// keyed the same way as `TileCoord::set_key`. Loaded once per layer and
/// read-only thereafter.
pub type DownloadedSet = HashSet<u64>;

pub struct ProgressStore {
    pool: SqlitePool,
}

impl ProgressStore {
    /// Opens (creating if absent) the progress database at `path`. If
    /// `resume` is false, any pre-existing file is removed first.
    pub async fn open(path: &str, resume: bool) -> Result<Self, ProgressStoreError> {
        if !resume {
            let _ = std::fs::remove_file(path);
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS downloaded_tiles (
                z INTEGER NOT NULL,
                x INTEGER NOT NULL,
                y INTEGER NOT NULL,
                downloaded_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                PRIMARY KEY (z, x, y)
            )",
        )
        .execute(&pool)
        .await?;
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS resume_point (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                layer_index INTEGER NOT NULL,
                last_update DATETIME DEFAULT CURRENT_TIMESTAMP
            )",
        )
        .execute(&pool)
        .await?;

        Ok(Self { pool })
    }

    pub async fn load_downloaded_for_zoom(&self, z: u8) -> Result<DownloadedSet, ProgressStoreError> {
        let rows = sqlx::query("SELECT x, y FROM downloaded_tiles WHERE z = ?")
            .bind(z as i64)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows
            .into_iter()
            .map(|row| {
                let x: i64 = row.get("x");
                let y: i64 = row.get("y");
                ((x as u64) << 32) | (y as u64)
            })
            .collect())
    }

    pub async fn count_downloaded_for_zoom(&self, z: u8) -> Result<i64, ProgressStoreError> {
        let row = sqlx::query("SELECT COUNT(*) as n FROM downloaded_tiles WHERE z = ?")
            .bind(z as i64)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get("n"))
    }

    /// Marks all of `tiles` downloaded in a single transaction, one
    /// prepared statement, `INSERT OR IGNORE` per tile. Idempotent.
    pub async fn batch_mark(&self, tiles: &[TileCoord]) -> Result<(), ProgressStoreError> {
        if tiles.is_empty() {
            return Ok(());
        }
        let mut tx = self.pool.begin().await?;
        for coord in tiles {
            sqlx::query("INSERT OR IGNORE INTO downloaded_tiles (z, x, y) VALUES (?, ?, ?)")
                .bind(coord.z as i64)
                .bind(coord.x as i64)
                .bind(coord.y as i64)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    /// Used only by the skip-existing fast path; no transaction.
    pub async fn mark_one(&self, coord: TileCoord) -> Result<(), ProgressStoreError> {
        sqlx::query("INSERT OR IGNORE INTO downloaded_tiles (z, x, y) VALUES (?, ?, ?)")
            .bind(coord.z as i64)
            .bind(coord.x as i64)
            .bind(coord.y as i64)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn save_resume_point(&self, layer_index: i32) -> Result<(), ProgressStoreError> {
        sqlx::query(
            "INSERT OR REPLACE INTO resume_point (id, layer_index, last_update) VALUES (1, ?, datetime('now'))",
        )
        .bind(layer_index)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Returns the stored layer index, or `-1` if the table is empty.
    pub async fn load_resume_point(&self) -> Result<i32, ProgressStoreError> {
        let row = sqlx::query("SELECT layer_index FROM resume_point WHERE id = 1")
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| r.get("layer_index")).unwrap_or(-1))
    }
}
