//! Map engine configuration: defaults plus environment overrides

use std::time::Duration;

use crate::map::chunk::CHUNK_SIZE;
use crate::map::tile::TilePos;

/// Edge length of one tile in world pixels.
pub const DEFAULT_PIXEL_SIZE: u32 = 24;
pub const DEFAULT_WORLD_WIDTH_IN_TILES: u32 = 10_000;
pub const DEFAULT_WORLD_HEIGHT_IN_TILES: u32 = 10_000;

pub const DEFAULT_CHUNK_CACHE_SIZE: usize = 250;
pub const DEFAULT_IMAGE_CACHE_SIZE: usize = 300;

pub const DEFAULT_MIN_SCALE: f64 = 0.01;
pub const DEFAULT_MAX_SCALE: f64 = 5.0;
pub const DEFAULT_ZOOM_STEP: f64 = 1.1;
/// Grid lines are hidden once a tile is smaller than this on screen.
pub const DEFAULT_MIN_GRID_PIXELS: f64 = 5.0;

pub const MINIMAP_DISPLAY_SIZE: f32 = 250.0;
pub const DEFAULT_MINIMAP_FLUSH_MS: u64 = 750;
/// Chunk fetches kept in flight while the minimap is generated.
pub const DEFAULT_MINIMAP_BUILD_CONCURRENCY: usize = 32;

pub const CHUNK_ENDPOINT: &str = "/chunk";
pub const MINIMAP_ENDPOINT: &str = "/minimap";

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WorldConfig {
    pub pixel_size: u32,
    pub width_in_tiles: u32,
    pub height_in_tiles: u32,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            pixel_size: DEFAULT_PIXEL_SIZE,
            width_in_tiles: DEFAULT_WORLD_WIDTH_IN_TILES,
            height_in_tiles: DEFAULT_WORLD_HEIGHT_IN_TILES,
        }
    }
}

impl WorldConfig {
    /// Edge of one chunk in world pixels
    pub fn chunk_pixel_size(&self) -> f64 {
        (CHUNK_SIZE as u32 * self.pixel_size) as f64
    }

    pub fn width_in_chunks(&self) -> u32 {
        self.width_in_tiles.div_ceil(CHUNK_SIZE as u32)
    }

    pub fn height_in_chunks(&self) -> u32 {
        self.height_in_tiles.div_ceil(CHUNK_SIZE as u32)
    }

    pub fn width_in_pixels(&self) -> f64 {
        self.width_in_tiles as f64 * self.pixel_size as f64
    }

    pub fn height_in_pixels(&self) -> f64 {
        self.height_in_tiles as f64 * self.pixel_size as f64
    }

    pub fn contains_tile(&self, tile: TilePos) -> bool {
        (0..self.width_in_tiles as i64).contains(&tile.x)
            && (0..self.height_in_tiles as i64).contains(&tile.y)
    }

    /// World pixel at the centre of the world
    pub fn center(&self) -> (f64, f64) {
        (self.width_in_pixels() / 2.0, self.height_in_pixels() / 2.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheConfig {
    pub chunk_capacity: usize,
    pub image_capacity: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            chunk_capacity: DEFAULT_CHUNK_CACHE_SIZE,
            image_capacity: DEFAULT_IMAGE_CACHE_SIZE,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewConfig {
    pub min_scale: f64,
    pub max_scale: f64,
    pub zoom_step: f64,
    pub min_grid_pixels: f64,
}

impl Default for ViewConfig {
    fn default() -> Self {
        Self {
            min_scale: DEFAULT_MIN_SCALE,
            max_scale: DEFAULT_MAX_SCALE,
            zoom_step: DEFAULT_ZOOM_STEP,
            min_grid_pixels: DEFAULT_MIN_GRID_PIXELS,
        }
    }
}

/// Remote key-value endpoints.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiConfig {
    pub chunk_url: String,
    pub minimap_url: String,
}

impl ApiConfig {
    pub fn with_base(base: &str) -> Self {
        let base = base.trim_end_matches('/');
        Self {
            chunk_url: format!("{base}{CHUNK_ENDPOINT}"),
            minimap_url: format!("{base}{MINIMAP_ENDPOINT}"),
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self::with_base("")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MinimapConfig {
    pub flush_delay: Duration,
    pub build_concurrency: usize,
}

impl Default for MinimapConfig {
    fn default() -> Self {
        Self {
            flush_delay: Duration::from_millis(DEFAULT_MINIMAP_FLUSH_MS),
            build_concurrency: DEFAULT_MINIMAP_BUILD_CONCURRENCY,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MapConfig {
    pub world: WorldConfig,
    pub cache: CacheConfig,
    pub view: ViewConfig,
    pub minimap: MinimapConfig,
    /// `None` runs the editor against an in-memory store.
    pub api: Option<ApiConfig>,
}

impl MapConfig {
    /// Defaults overridden by `WORLDMAP_*` environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.api = api_base().map(|base| ApiConfig::with_base(&base));
        config.cache.chunk_capacity = env_usize("WORLDMAP_CHUNK_CACHE", DEFAULT_CHUNK_CACHE_SIZE);
        config.cache.image_capacity = env_usize("WORLDMAP_IMAGE_CACHE", DEFAULT_IMAGE_CACHE_SIZE);
        config.minimap.flush_delay = minimap_flush_delay();
        config
    }
}

pub fn api_base() -> Option<String> {
    std::env::var("WORLDMAP_API_BASE")
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

pub fn minimap_flush_delay() -> Duration {
    std::env::var("WORLDMAP_MINIMAP_FLUSH_MS")
        .ok()
        .and_then(|value| value.parse::<u64>().ok())
        .map(Duration::from_millis)
        .unwrap_or_else(|| Duration::from_millis(DEFAULT_MINIMAP_FLUSH_MS))
}

fn env_usize(name: &str, default: usize) -> usize {
    std::env::var(name)
        .ok()
        .and_then(|value| value.parse::<usize>().ok())
        .filter(|value| *value > 0)
        .unwrap_or(default)
}
