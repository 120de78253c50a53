//! Map camera for viewport management, panning, and zooming

use crate::config::ViewConfig;

/// Pan offset and scale mapping world pixels to screen pixels:
/// `screen = world * scale + offset`.
#[derive(Debug, Clone, PartialEq)]
pub struct MapCamera {
    /// Screen position of the world origin
    pub offset: (f64, f64),

    pub scale: f64,

    /// Viewport size in pixels
    pub viewport_width: u32,
    pub viewport_height: u32,

    min_scale: f64,
    max_scale: f64,
    zoom_step: f64,
}

impl MapCamera {
    pub fn new(width: u32, height: u32, view: &ViewConfig) -> Self {
        Self {
            offset: (0.0, 0.0),
            scale: 1.0_f64.clamp(view.min_scale, view.max_scale),
            viewport_width: width,
            viewport_height: height,
            min_scale: view.min_scale,
            max_scale: view.max_scale,
            zoom_step: view.zoom_step,
        }
    }

    /// Update viewport size
    pub fn set_viewport(&mut self, width: u32, height: u32) {
        self.viewport_width = width;
        self.viewport_height = height;
    }

    /// Place a world point at the centre of the viewport
    pub fn center_on(&mut self, world_x: f64, world_y: f64) {
        self.offset = (
            self.viewport_width as f64 / 2.0 - world_x * self.scale,
            self.viewport_height as f64 / 2.0 - world_y * self.scale,
        );
    }

    /// Pan the map by pixel delta
    pub fn pan(&mut self, dx: f64, dy: f64) {
        self.offset.0 += dx;
        self.offset.1 += dy;
    }

    /// One zoom step at a screen point; positive `delta_y` (scrolling down)
    /// zooms out. The world point under the cursor stays fixed.
    /// Returns false when the scale is already at its limit.
    pub fn zoom_at(&mut self, delta_y: f64, screen_x: f64, screen_y: f64) -> bool {
        if delta_y == 0.0 {
            return false;
        }
        let old_scale = self.scale;
        let target = if delta_y > 0.0 {
            old_scale / self.zoom_step
        } else {
            old_scale * self.zoom_step
        };
        let new_scale = target.clamp(self.min_scale, self.max_scale);
        if (new_scale - old_scale).abs() < f64::EPSILON {
            return false;
        }

        let (world_x, world_y) = self.screen_to_world(screen_x, screen_y);
        self.scale = new_scale;
        self.offset = (screen_x - world_x * new_scale, screen_y - world_y * new_scale);
        true
    }

    /// Convert screen coordinates to world pixel coordinates
    pub fn screen_to_world(&self, screen_x: f64, screen_y: f64) -> (f64, f64) {
        (
            (screen_x - self.offset.0) / self.scale,
            (screen_y - self.offset.1) / self.scale,
        )
    }

    /// Convert world pixel coordinates to screen coordinates
    pub fn world_to_screen(&self, world_x: f64, world_y: f64) -> (f64, f64) {
        (
            world_x * self.scale + self.offset.0,
            world_y * self.scale + self.offset.1,
        )
    }
}

impl Default for MapCamera {
    fn default() -> Self {
        Self::new(800, 600, &ViewConfig::default())
    }
}
