//! Resumable progress tracking: which tiles are already downloaded, and
//! which layer a task was in progress on at last checkpoint.

mod buffer;
mod store;

pub use buffer::ProgressBuffer;
pub use store::{DownloadedSet, ProgressStore};
