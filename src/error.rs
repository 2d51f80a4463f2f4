//! Typed errors for every component boundary. `anyhow` stays at the process
//! boundary in `main.rs`; everything below it returns one of these.

use crate::coord::TileCoord;

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("failed to build http client: {0}")]
    ClientBuild(#[from] reqwest::Error),
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("tile {coord:?} returned status {status}")]
    NonOk { coord: TileCoord, status: u16 },
    #[error("gzip encode failed for pbf tile {coord:?}: {source}")]
    GzipEncode {
        coord: TileCoord,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum TileStoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] sqlx::Error),
    #[error("filesystem error writing {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum ProgressStoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] sqlx::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum TaskError {
    #[error("failed to set up tile store: {0}")]
    TileStore(#[from] TileStoreError),
    #[error("failed to set up progress store: {0}")]
    ProgressStore(#[from] ProgressStoreError),
    #[error("failed to create output directory {path}: {source}")]
    OutputDir {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("fetch error: {0}")]
    Fetch(#[from] FetchError),
    #[error("invalid progress bar template: {0}")]
    ProgressTemplate(#[from] indicatif::style::TemplateError),
}
