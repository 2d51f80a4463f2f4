//! Bounded-concurrency map tile fetcher with resumable progress tracking,
//! writing to an MBTiles archive or a tile directory tree.

pub mod coord;
pub mod error;
pub mod fetch;
pub mod layer;
pub mod pool;
pub mod progress;
pub mod savepipe;
pub mod task;
pub mod tile_store;
pub mod tilecover;
pub mod tilemap;
