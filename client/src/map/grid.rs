//! Tile grid overlay lines

use super::camera::MapCamera;
use super::visibility::visible_world_rect;
use crate::config::{ViewConfig, WorldConfig};

/// Grid stroke colour, straight alpha
pub const GRID_COLOR: [f32; 4] = [1.0, 1.0, 1.0, 0.25];

/// One grid line in world pixels
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GridLine {
    pub from: (f64, f64),
    pub to: (f64, f64),
}

/// Lines covering the visible part of the world
#[derive(Clone, Debug, PartialEq)]
pub struct GridOverlay {
    pub lines: Vec<GridLine>,
    /// Stroke width in world pixels, so roughly one screen pixel at any scale
    pub stroke_width: f64,
    pub color: [f32; 4],
}

/// Grid lines every tile edge inside the visible rect, clipped to the world.
///
/// Returns `None` once tiles shrink below `min_grid_pixels` on screen.
pub fn grid_lines(camera: &MapCamera, world: &WorldConfig, view: &ViewConfig) -> Option<GridOverlay> {
    let pixel_size = world.pixel_size as f64;
    if pixel_size * camera.scale < view.min_grid_pixels {
        return None;
    }

    let rect = visible_world_rect(camera);
    let x1 = rect.x1.max(0.0);
    let y1 = rect.y1.max(0.0);
    let x2 = rect.x2.min(world.width_in_pixels());
    let y2 = rect.y2.min(world.height_in_pixels());

    let mut lines = Vec::new();
    if x1 < x2 && y1 < y2 {
        let mut x = (x1 / pixel_size).floor() * pixel_size;
        while x <= x2 {
            lines.push(GridLine {
                from: (x, y1),
                to: (x, y2),
            });
            x += pixel_size;
        }

        let mut y = (y1 / pixel_size).floor() * pixel_size;
        while y <= y2 {
            lines.push(GridLine {
                from: (x1, y),
                to: (x2, y),
            });
            y += pixel_size;
        }
    }

    Some(GridOverlay {
        lines,
        stroke_width: (1.0 / camera.scale).max(0.5),
        color: GRID_COLOR,
    })
}
