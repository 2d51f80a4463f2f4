//! Static metadata describing a tile source, and the per-zoom `Layer`s
//! a `Task` walks through in order.

/// Raster/vector tile payload format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TileFormat {
    Png,
    Jpg,
    Webp,
    Pbf,
}

impl TileFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            TileFormat::Png => "png",
            TileFormat::Jpg => "jpg",
            TileFormat::Webp => "webp",
            TileFormat::Pbf => "pbf",
        }
    }

    pub fn is_vector(&self) -> bool {
        matches!(self, TileFormat::Pbf)
    }
}

/// Row numbering convention used by the destination. The engine always
/// requests tiles in XYZ `y`; `Tms` only affects how MBTiles stores `tile_row`
/// (which it always does via the `2^z - 1 - y` flip regardless of this enum —
/// `schema` is carried through to the `type` metadata row for readers).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TileSchema {
    Xyz,
    Tms,
}

impl TileSchema {
    pub fn as_str(&self) -> &'static str {
        match self {
            TileSchema::Xyz => "xyz",
            TileSchema::Tms => "tms",
        }
    }
}

/// A rectangular lon/lat region, used by `BoundingBoxCover` and carried on
/// `TileMap` for the `bounds` metadata row.
#[derive(Debug, Clone, Copy)]
pub struct BoundingBox {
    pub min_lon: f64,
    pub min_lat: f64,
    pub max_lon: f64,
    pub max_lat: f64,
}

impl BoundingBox {
    pub fn center(&self) -> (f64, f64) {
        (
            (self.min_lon + self.max_lon) / 2.0,
            (self.min_lat + self.max_lat) / 2.0,
        )
    }
}

/// Static metadata describing the source; immutable for the lifetime of a task.
#[derive(Debug, Clone)]
pub struct TileMap {
    pub name: String,
    pub format: TileFormat,
    pub schema: TileSchema,
    pub bounds: BoundingBox,
    pub min_zoom: u8,
    pub max_zoom: u8,
    /// Vector layer JSON descriptor; empty unless `format` is `Pbf`.
    pub json: String,
}

/// One zoom level's worth of work: its geometry, URL template, and the
/// precomputed tile count that defines its progress denominator.
#[derive(Debug, Clone)]
pub struct Layer {
    pub zoom: u8,
    pub url_template: String,
    pub geometry: BoundingBox,
    pub count: i64,
}
