//! Static map renderer.
//!
//! Given a center coordinate, fetches the 3x3 block of slippy-map tiles
//! around it, composites them onto a square canvas, draws a marker and
//! encodes the result as PNG. A failed tile leaves its region blank and
//! compositing continues; only canvas/codec failures abort the render.

use crate::config::MapConfig;
use crate::error::{BotError, Result};
use futures_util::future::join_all;
use image::{Rgba, RgbaImage};
use std::io::Cursor;
use std::time::Duration;

/// Slippy-map tile edge length in pixels.
const TILE_SIZE: u32 = 256;

/// Tiles fetched on each side of the center tile (1 = 3x3 block).
const TILES_AROUND: i64 = 1;

/// Marker radius in pixels.
const MARKER_RADIUS: i64 = 10;

/// Canvas fill where no tile could be drawn.
const BACKGROUND: Rgba<u8> = Rgba([224, 224, 224, 255]);

const MARKER_COLOR: Rgba<u8> = Rgba([220, 30, 30, 255]);

/// Integer tile coordinates for a point at a zoom level.
pub fn tile_for(lat: f64, lon: f64, zoom: u32) -> (i64, i64) {
    let (fx, fy) = fractional_tile(lat, lon, zoom);
    (fx.floor() as i64, fy.floor() as i64)
}

/// Continuous tile coordinates; the fractional part is the position within
/// the tile.
fn fractional_tile(lat: f64, lon: f64, zoom: u32) -> (f64, f64) {
    let n = 2f64.powi(zoom as i32);
    let lat_rad = lat.to_radians();
    let x = (lon + 180.0) / 360.0 * n;
    let y = (1.0 - (lat_rad.tan() + 1.0 / lat_rad.cos()).ln() / std::f64::consts::PI) / 2.0 * n;
    (x, y)
}

/// Renders static map images from a remote tile server.
pub struct StaticMapRenderer {
    client: reqwest::Client,
    config: MapConfig,
}

impl StaticMapRenderer {
    /// Build a renderer. The tile server requires an identifying
    /// User-Agent, sent with every fetch.
    pub fn new(config: MapConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(Duration::from_secs(config.tile_timeout_secs))
            .build()?;
        Ok(Self { client, config })
    }

    /// Render a PNG map centered on the configured coordinate with a
    /// marker at `(marker_lat, marker_lon)`.
    pub async fn render(&self, marker_lat: f64, marker_lon: f64) -> Result<Vec<u8>> {
        let zoom = self.config.zoom;
        let size = self.config.canvas_size;
        let (center_fx, center_fy) =
            fractional_tile(self.config.center_lat, self.config.center_lon, zoom);
        let (center_x, center_y) = (center_fx.floor() as i64, center_fy.floor() as i64);

        let mut canvas = RgbaImage::from_pixel(size, size, BACKGROUND);

        // Fetch the whole neighborhood concurrently; tiles are independent
        // and failure-isolated.
        let fetches = (-TILES_AROUND..=TILES_AROUND).flat_map(|dx| {
            (-TILES_AROUND..=TILES_AROUND).map(move |dy| (dx, dy))
        });
        let results = join_all(fetches.map(|(dx, dy)| {
            let tile_x = center_x + dx;
            let tile_y = center_y + dy;
            async move {
                (tile_x, tile_y, self.fetch_tile(zoom, tile_x, tile_y).await)
            }
        }))
        .await;

        for (tile_x, tile_y, fetched) in results {
            let bytes = match fetched {
                Ok(bytes) => bytes,
                Err(e) => {
                    tracing::warn!(tile_x, tile_y, zoom, error = %e, "tile fetch failed, leaving region blank");
                    continue;
                }
            };

            let tile = match image::load_from_memory(&bytes) {
                Ok(img) => img.to_rgba8(),
                Err(e) => {
                    tracing::warn!(tile_x, tile_y, zoom, error = %e, "tile decode failed, leaving region blank");
                    continue;
                }
            };

            // Canvas offset aligning the center coordinate with the canvas
            // center.
            let px = ((tile_x as f64 - center_fx) * f64::from(TILE_SIZE)
                + f64::from(size) / 2.0)
                .round() as i64;
            let py = ((tile_y as f64 - center_fy) * f64::from(TILE_SIZE)
                + f64::from(size) / 2.0)
                .round() as i64;
            image::imageops::overlay(&mut canvas, &tile, px, py);
        }

        let (marker_x, marker_y) = pixel_position(
            marker_lat,
            marker_lon,
            center_fx,
            center_fy,
            zoom,
            size,
        );
        draw_marker(&mut canvas, marker_x, marker_y);

        let mut png = Vec::new();
        canvas
            .write_to(&mut Cursor::new(&mut png), image::ImageFormat::Png)
            .map_err(|e| BotError::Render(format!("PNG encoding failed: {e}")))?;
        Ok(png)
    }

    async fn fetch_tile(&self, zoom: u32, x: i64, y: i64) -> Result<Vec<u8>> {
        let url = self
            .config
            .tile_url
            .replace("{z}", &zoom.to_string())
            .replace("{x}", &x.to_string())
            .replace("{y}", &y.to_string());

        let resp = self.client.get(&url).send().await?;
        if !resp.status().is_success() {
            return Err(BotError::Render(format!(
                "tile server returned {} for {url}",
                resp.status()
            )));
        }
        Ok(resp.bytes().await?.to_vec())
    }
}

/// Canvas pixel position of a coordinate, relative to the canvas center.
fn pixel_position(
    lat: f64,
    lon: f64,
    center_fx: f64,
    center_fy: f64,
    zoom: u32,
    canvas_size: u32,
) -> (i64, i64) {
    let (fx, fy) = fractional_tile(lat, lon, zoom);
    let half = f64::from(canvas_size) / 2.0;
    let x = ((fx - center_fx) * f64::from(TILE_SIZE) + half).round() as i64;
    let y = ((fy - center_fy) * f64::from(TILE_SIZE) + half).round() as i64;
    (x, y)
}

/// Filled circle marker, clipped to the canvas.
fn draw_marker(canvas: &mut RgbaImage, cx: i64, cy: i64) {
    for dy in -MARKER_RADIUS..=MARKER_RADIUS {
        for dx in -MARKER_RADIUS..=MARKER_RADIUS {
            if dx * dx + dy * dy > MARKER_RADIUS * MARKER_RADIUS {
                continue;
            }
            let (x, y) = (cx + dx, cy + dy);
            if x >= 0 && y >= 0 && (x as u32) < canvas.width() && (y as u32) < canvas.height() {
                canvas.put_pixel(x as u32, y as u32, MARKER_COLOR);
            }
        }
    }
}
