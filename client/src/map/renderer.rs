//! Chunk rasterisation into drawable images

use std::sync::Arc;

use image::{Rgba, RgbaImage};

use super::chunk::{CHUNK_SIZE, Chunk, ChunkCoord};
use super::tile::tile_color;

/// Rendered chunk, tagged with its coordinate and placed at its world origin
#[derive(Clone, Debug)]
pub struct ChunkImage {
    pub coord: ChunkCoord,
    /// Top-left corner in world pixels
    pub origin: (f64, f64),
    pub image: Arc<RgbaImage>,
}

impl ChunkImage {
    pub fn size(&self) -> u32 {
        self.image.width()
    }

    /// Approximate memory held by the pixels
    pub fn memory_size(&self) -> usize {
        (self.image.width() * self.image.height() * 4) as usize
    }
}

/// Draw each cell as a `pixel_size` square of its legend colour
pub fn rasterize(chunk: &Chunk, pixel_size: u32) -> RgbaImage {
    let edge = CHUNK_SIZE as u32 * pixel_size;
    let mut image = RgbaImage::new(edge, edge);

    for (pos, tile) in chunk.cells() {
        let [r, g, b] = tile_color(tile);
        let color = Rgba([r, g, b, 255]);
        let x0 = pos.x as u32 * pixel_size;
        let y0 = pos.y as u32 * pixel_size;
        for y in y0..y0 + pixel_size {
            for x in x0..x0 + pixel_size {
                image.put_pixel(x, y, color);
            }
        }
    }

    image
}

/// Render a chunk into an image positioned at its world origin
pub fn render_chunk(coord: ChunkCoord, chunk: &Chunk, pixel_size: u32) -> ChunkImage {
    ChunkImage {
        coord,
        origin: coord.world_origin(pixel_size),
        image: Arc::new(rasterize(chunk, pixel_size)),
    }
}
