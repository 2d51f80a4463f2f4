//! One-tile HTTP fetch: fixed headers, no redirects, gzip for vector tiles.

use std::io::Write;

use bytes::Bytes;
use reqwest::{redirect::Policy, Client, StatusCode};
use tracing::warn;

use crate::coord::TileCoord;
use crate::error::FetchError;
use crate::tilemap::TileFormat;

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";
const REFERER: &str = "https://map.tianditu.gov.cn";

/// Outcome of one fetch attempt, distinguishing an empty-body response
/// (warned, never retried, never recorded) from an actual tile.
pub enum FetchOutcome {
    Tile(Bytes),
    Empty,
}

#[derive(Clone)]
pub struct Fetcher {
    client: Client,
}

impl Fetcher {
    pub fn new() -> Result<Self, FetchError> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .redirect(Policy::none())
            .build()?;
        Ok(Self { client })
    }

    /// Issue one GET for `coord` at `url`. Redirects are treated as the
    /// final response (reqwest with `Policy::none()` surfaces a 3xx status
    /// directly rather than following it); any non-200 is `NonOk`.
    pub async fn fetch(&self, coord: TileCoord, url: &str) -> Result<FetchOutcome, FetchError> {
        let resp = self
            .client
            .get(url)
            .header(reqwest::header::REFERER, REFERER)
            .send()
            .await
            .map_err(|source| FetchError::Transport {
                url: url.to_string(),
                source,
            })?;

        if resp.status() != StatusCode::OK {
            return Err(FetchError::NonOk {
                coord,
                status: resp.status().as_u16(),
            });
        }

        let body = resp.bytes().await.map_err(|source| FetchError::Transport {
            url: url.to_string(),
            source,
        })?;

        if body.is_empty() {
            warn!(z = coord.z, x = coord.x, y = coord.y, "empty tile body");
            return Ok(FetchOutcome::Empty);
        }

        Ok(FetchOutcome::Tile(body))
    }
}

/// Gzip-encode a vector tile payload when the map format calls for it.
/// A failure here is fatal: it indicates a broken pipeline, not a
/// transient per-tile condition, and the caller is expected to propagate
/// it out rather than skip the tile and continue.
pub fn maybe_compress(coord: TileCoord, format: TileFormat, body: Bytes) -> Result<Bytes, FetchError> {
    if !format.is_vector() {
        return Ok(body);
    }
    let mut encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
    encoder
        .write_all(&body)
        .map_err(|source| FetchError::GzipEncode { coord, source })?;
    let compressed = encoder
        .finish()
        .map_err(|source| FetchError::GzipEncode { coord, source })?;
    Ok(Bytes::from(compressed))
}
