//! Visible world rectangle and the chunks that intersect it

use super::camera::MapCamera;
use super::chunk::ChunkCoord;
use crate::config::WorldConfig;

/// Axis-aligned rectangle in world pixels
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WorldRect {
    pub x1: f64,
    pub y1: f64,
    pub x2: f64,
    pub y2: f64,
}

/// A chunk to materialise, with its world-pixel origin
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VisibleChunk {
    pub coord: ChunkCoord,
    pub origin_x: f64,
    pub origin_y: f64,
}

/// Viewport corners pushed back through pan offset and scale
pub fn visible_world_rect(camera: &MapCamera) -> WorldRect {
    let (x1, y1) = camera.screen_to_world(0.0, 0.0);
    let (x2, y2) = camera.screen_to_world(
        camera.viewport_width as f64,
        camera.viewport_height as f64,
    );
    WorldRect { x1, y1, x2, y2 }
}

/// Every in-bounds chunk whose footprint intersects the visible rect,
/// row by row
pub fn visible_chunk_coords(camera: &MapCamera, world: &WorldConfig) -> Vec<VisibleChunk> {
    chunks_in_rect(&visible_world_rect(camera), world)
}

pub fn chunks_in_rect(rect: &WorldRect, world: &WorldConfig) -> Vec<VisibleChunk> {
    let chunk_pixels = world.chunk_pixel_size();
    let max_cx = world.width_in_chunks() as f64;
    let max_cy = world.height_in_chunks() as f64;

    let start_cx = (rect.x1 / chunk_pixels).floor().max(0.0);
    let end_cx = (rect.x2 / chunk_pixels).ceil().min(max_cx);
    let start_cy = (rect.y1 / chunk_pixels).floor().max(0.0);
    let end_cy = (rect.y2 / chunk_pixels).ceil().min(max_cy);

    if !(start_cx < end_cx && start_cy < end_cy) {
        return Vec::new();
    }

    let (start_cx, end_cx) = (start_cx as i32, end_cx as i32);
    let (start_cy, end_cy) = (start_cy as i32, end_cy as i32);

    let mut chunks = Vec::with_capacity(((end_cx - start_cx) * (end_cy - start_cy)) as usize);
    for cy in start_cy..end_cy {
        for cx in start_cx..end_cx {
            chunks.push(VisibleChunk {
                coord: ChunkCoord::new(cx, cy),
                origin_x: cx as f64 * chunk_pixels,
                origin_y: cy as f64 * chunk_pixels,
            });
        }
    }
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ViewConfig;

    fn camera(width: u32, height: u32, offset: (f64, f64), scale: f64) -> MapCamera {
        let mut camera = MapCamera::new(width, height, &ViewConfig::default());
        camera.offset = offset;
        camera.scale = scale;
        camera
    }

    #[test]
    fn test_visible_rect_inverse_transform() {
        let camera = camera(800, 600, (-100.0, -50.0), 2.0);
        let rect = visible_world_rect(&camera);
        assert_eq!(rect, WorldRect { x1: 50.0, y1: 25.0, x2: 450.0, y2: 325.0 });
    }

    #[test]
    fn test_exact_single_chunk_view() {
        let world = WorldConfig::default();
        let size = world.chunk_pixel_size() as u32;
        let visible = visible_chunk_coords(&camera(size, size, (0.0, 0.0), 1.0), &world);
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].coord, ChunkCoord::new(0, 0));
        assert_eq!((visible[0].origin_x, visible[0].origin_y), (0.0, 0.0));
    }

    #[test]
    fn test_partial_overlap_includes_straddled_chunks() {
        let world = WorldConfig::default();
        // 10px into chunk 1 on both axes
        let camera = camera(394, 394, (0.0, 0.0), 1.0);
        let coords: Vec<_> = visible_chunk_coords(&camera, &world)
            .into_iter()
            .map(|chunk| (chunk.coord.cx, chunk.coord.cy))
            .collect();
        assert_eq!(coords, vec![(0, 0), (1, 0), (0, 1), (1, 1)]);
    }

    #[test]
    fn test_clamped_to_world_bounds() {
        let world = WorldConfig {
            pixel_size: 1,
            width_in_tiles: 64,
            height_in_tiles: 48,
        };
        // zoomed out far enough to see past every edge
        let camera = camera(1000, 1000, (300.0, 300.0), 1.0);
        let visible = visible_chunk_coords(&camera, &world);
        assert_eq!(visible.len(), 4 * 3);
        for chunk in &visible {
            assert!(chunk.coord.cx >= 0 && chunk.coord.cx < 4);
            assert!(chunk.coord.cy >= 0 && chunk.coord.cy < 3);
        }
    }

    #[test]
    fn test_view_outside_world_is_empty() {
        let world = WorldConfig::default();
        let camera = camera(100, 100, (500.0, 500.0), 1.0);
        assert!(visible_chunk_coords(&camera, &world).is_empty());
    }
}
