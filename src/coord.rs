//! Tile coordinates and URL template substitution.

/// A single XYZ tile coordinate. `x` and `y` must satisfy `x, y < 2^z`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TileCoord {
    pub z: u8,
    pub x: u32,
    pub y: u32,
}

impl TileCoord {
    pub fn new(z: u8, x: u32, y: u32) -> Self {
        Self { z, x, y }
    }

    /// `2^z - 1 - y`, the TMS row flip used by the MBTiles spec.
    pub fn flip_y(&self) -> u32 {
        flip_y(self.z, self.y)
    }

    /// Key used by `DownloadedSet`: `(x << 32) | y`.
    pub fn set_key(&self) -> u64 {
        ((self.x as u64) << 32) | (self.y as u64)
    }
}

pub fn flip_y(z: u8, y: u32) -> u32 {
    let max_index = (1u64 << z) - 1;
    (max_index - y as u64) as u32
}

/// A tile payload fetched from the server, still attached to its coordinate.
#[derive(Debug, Clone)]
pub struct TilePayload {
    pub coord: TileCoord,
    pub bytes: bytes::Bytes,
}

/// Substitute `{z}`, `{x}`, `{y}`, `{-y}` in `template` with decimal values
/// for `coord`. Unknown placeholders are left untouched.
pub fn template_url(template: &str, coord: TileCoord) -> String {
    template
        .replace("{z}", &coord.z.to_string())
        .replace("{x}", &coord.x.to_string())
        .replace("{-y}", &flip_y(coord.z, coord.y).to_string())
        .replace("{y}", &coord.y.to_string())
}
