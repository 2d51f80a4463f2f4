use async_trait::async_trait;
use bytes::Bytes;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use tracing::warn;

use super::TileStore;
use crate::coord::TileCoord;
use crate::error::TileStoreError;
use crate::tilemap::TileMap;

const MBTILES_VERSION: &str = "1.2";
const PIXEL_SCALE: i64 = 256;

/// A single-writer MBTiles archive. `locking_mode=EXCLUSIVE` means this
/// process must be the only one holding `path` open for the run.
pub struct MbtilesStore {
    pool: SqlitePool,
    skip_existing: bool,
}

impl MbtilesStore {
    /// Opens (creating if absent) the MBTiles file at `path`, writes schema
    /// and metadata. If `skip_existing` is false, any pre-existing file at
    /// `path` is removed first so a fresh run starts from an empty archive.
    pub async fn open(path: &str, map: &TileMap, skip_existing: bool) -> Result<Self, TileStoreError> {
        if !skip_existing {
            let _ = std::fs::remove_file(path);
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        sqlx::query("PRAGMA locking_mode=EXCLUSIVE")
            .execute(&pool)
            .await?;
        sqlx::query("PRAGMA journal_mode=DELETE")
            .execute(&pool)
            .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS tiles (zoom_level INTEGER, tile_column INTEGER, tile_row INTEGER, tile_data BLOB)",
        )
        .execute(&pool)
        .await?;
        sqlx::query("CREATE TABLE IF NOT EXISTS metadata (name TEXT, value TEXT)")
            .execute(&pool)
            .await?;
        sqlx::query("CREATE UNIQUE INDEX IF NOT EXISTS name ON metadata (name)")
            .execute(&pool)
            .await?;
        sqlx::query(
            "CREATE UNIQUE INDEX IF NOT EXISTS tile_index ON tiles (zoom_level, tile_column, tile_row)",
        )
        .execute(&pool)
        .await?;

        let store = Self { pool, skip_existing };
        store.write_metadata(map).await?;
        Ok(store)
    }

    async fn write_metadata(&self, map: &TileMap) -> Result<(), TileStoreError> {
        let (center_lon, center_lat) = map.bounds.center();
        let mid_zoom = (map.min_zoom as u32 + map.max_zoom as u32) / 2;

        let mut rows: Vec<(&str, String)> = vec![
            ("name", map.name.clone()),
            ("format", map.format.extension().to_string()),
            ("type", map.schema.as_str().to_string()),
            ("version", MBTILES_VERSION.to_string()),
            (
                "bounds",
                format!(
                    "{},{},{},{}",
                    map.bounds.min_lon, map.bounds.min_lat, map.bounds.max_lon, map.bounds.max_lat
                ),
            ),
            ("center", format!("{center_lon},{center_lat},{mid_zoom}")),
            ("minzoom", map.min_zoom.to_string()),
            ("maxzoom", map.max_zoom.to_string()),
            ("pixel_scale", PIXEL_SCALE.to_string()),
        ];
        if map.format.is_vector() {
            rows.push(("json", map.json.clone()));
        }

        for (name, value) in rows {
            sqlx::query("INSERT OR REPLACE INTO metadata (name, value) VALUES (?, ?)")
                .bind(name)
                .bind(value)
                .execute(&self.pool)
                .await?;
        }
        Ok(())
    }
}

#[async_trait]
impl TileStore for MbtilesStore {
    async fn exists(&self, coord: TileCoord) -> bool {
        let row = sqlx::query(
            "SELECT COUNT(*) as n FROM tiles WHERE zoom_level = ? AND tile_column = ? AND tile_row = ?",
        )
        .bind(coord.z as i64)
        .bind(coord.x as i64)
        .bind(coord.flip_y() as i64)
        .fetch_one(&self.pool)
        .await;

        match row {
            Ok(row) => row.get::<i64, _>("n") > 0,
            Err(_) => false,
        }
    }

    async fn insert(&self, coord: TileCoord, bytes: Bytes) -> Result<(), TileStoreError> {
        let result = sqlx::query(
            "INSERT INTO tiles (zoom_level, tile_column, tile_row, tile_data) VALUES (?, ?, ?, ?)",
        )
        .bind(coord.z as i64)
        .bind(coord.x as i64)
        .bind(coord.flip_y() as i64)
        .bind(bytes.to_vec())
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                if self.skip_existing {
                    warn!(z = coord.z, x = coord.x, y = coord.y, "tile already in mbtiles, skipping");
                    Ok(())
                } else {
                    Err(TileStoreError::Sqlite(sqlx::Error::Database(db_err)))
                }
            }
            Err(err) => Err(TileStoreError::Sqlite(err)),
        }
    }
}
