//! Tile-cover enumeration: turning a layer's geometry into the set of
//! `(x, y)` tiles it covers at a given zoom.
//!
//! Full tile-cover libraries walk arbitrary geometry collections; that is
//! an external collaborator here. This module defines the narrow trait the
//! rest of the engine depends on and ships one concrete implementation,
//! `BoundingBoxCover`, for standalone use and tests.

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::coord::TileCoord;
use crate::tilemap::BoundingBox;

/// Narrow boundary to an external tile-cover collaborator.
pub trait TileCover: Send + Sync + 'static {
    /// Number of tiles this cover yields at `zoom`; defines a layer's
    /// progress denominator.
    fn count(&self, zoom: u8) -> i64;

    /// Stream every covered coordinate into `tx`, then drop it. Runs on its
    /// own task so the layer driver can consume it through a bounded channel.
    fn spawn_stream(&self, zoom: u8, tx: mpsc::Sender<TileCoord>) -> JoinHandle<()>;
}

/// Enumerates every tile whose index falls inside the Web Mercator
/// projection of a lon/lat bounding box — the same `lon/lat -> tile index`
/// math used to seed a region from a bounding box rather than a polygon.
#[derive(Debug, Clone, Copy)]
pub struct BoundingBoxCover {
    pub bounds: BoundingBox,
}

impl BoundingBoxCover {
    pub fn new(bounds: BoundingBox) -> Self {
        Self { bounds }
    }

    fn x_range(&self, zoom: u8) -> (u32, u32) {
        let (x_min, _) = lonlat_to_tile(self.bounds.min_lon, self.bounds.max_lat, zoom);
        let (x_max, _) = lonlat_to_tile(self.bounds.max_lon, self.bounds.min_lat, zoom);
        (x_min.min(x_max), x_min.max(x_max))
    }

    fn y_range(&self, zoom: u8) -> (u32, u32) {
        let (_, y_max_at_min_lat) = lonlat_to_tile(self.bounds.min_lon, self.bounds.min_lat, zoom);
        let (_, y_min_at_max_lat) = lonlat_to_tile(self.bounds.min_lon, self.bounds.max_lat, zoom);
        (
            y_min_at_max_lat.min(y_max_at_min_lat),
            y_min_at_max_lat.max(y_max_at_min_lat),
        )
    }
}

impl TileCover for BoundingBoxCover {
    fn count(&self, zoom: u8) -> i64 {
        let (x_start, x_end) = self.x_range(zoom);
        let (y_start, y_end) = self.y_range(zoom);
        (x_end - x_start + 1) as i64 * (y_end - y_start + 1) as i64
    }

    fn spawn_stream(&self, zoom: u8, tx: mpsc::Sender<TileCoord>) -> JoinHandle<()> {
        let (x_start, x_end) = self.x_range(zoom);
        let (y_start, y_end) = self.y_range(zoom);
        tokio::spawn(async move {
            for x in x_start..=x_end {
                for y in y_start..=y_end {
                    if tx.send(TileCoord::new(zoom, x, y)).await.is_err() {
                        return;
                    }
                }
            }
        })
    }
}

/// Convert lon/lat (degrees) to XYZ tile indices under Web Mercator at `zoom`.
fn lonlat_to_tile(lon_deg: f64, lat_deg: f64, zoom: u8) -> (u32, u32) {
    use std::f64::consts::PI;

    let lat_rad = lat_deg.to_radians();
    let n = 2f64.powi(zoom as i32);

    let x = ((lon_deg + 180.0) / 360.0 * n).floor();
    let y = (1.0 - ((lat_rad.tan() + 1.0 / lat_rad.cos()).ln() / PI)) / 2.0 * n;

    let max_idx = n - 1.0;
    let x = x.max(0.0).min(max_idx) as u32;
    let y = y.max(0.0).min(max_idx) as u32;

    (x, y)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_world() -> BoundingBox {
        BoundingBox {
            min_lon: -10.0,
            min_lat: -10.0,
            max_lon: 10.0,
            max_lat: 10.0,
        }
    }

    #[test]
    fn zoom_zero_is_a_single_tile() {
        let cover = BoundingBoxCover::new(small_world());
        assert_eq!(cover.count(0), 1);
    }

    #[tokio::test]
    async fn stream_yields_exactly_count_coords() {
        let cover = BoundingBoxCover::new(small_world());
        let expected = cover.count(3);
        let (tx, mut rx) = mpsc::channel(16);
        let handle = cover.spawn_stream(3, tx);
        let mut seen = 0i64;
        while rx.recv().await.is_some() {
            seen += 1;
        }
        handle.await.unwrap();
        assert_eq!(seen, expected);
    }
}
