//! World map tile engine: chunk caching, optimistic edits and the minimap

pub mod cache;
pub mod camera;
pub mod chunk;
pub mod edit;
pub mod grid;
pub mod loader;
pub mod minimap;
pub mod renderer;
pub mod store;
pub mod tile;
pub mod view;
pub mod visibility;

#[cfg(test)]
pub(crate) mod testing;

use std::collections::VecDeque;

use cache::{CacheStats, LruCache};
use camera::MapCamera;
use chunk::{Chunk, ChunkCoord};
use edit::EditState;
use grid::GridOverlay;
use loader::{ChunkLoader, StoreResponse};
use minimap::Minimap;
use renderer::{ChunkImage, render_chunk};
use store::StoreError;
use tile::TileId;
use view::{Tooltip, ViewState};

use crate::config::MapConfig;

/// Drawing layer the engine composites chunk images into.
///
/// Images are tagged by their chunk coordinate; the surface draws them at
/// `image.origin` in world pixels through the engine's camera.
pub trait DrawSurface {
    /// Show an image, replacing any image already shown for its chunk
    fn add_image(&mut self, image: &ChunkImage);

    fn remove_image(&mut self, coord: ChunkCoord);

    fn set_grid(&mut self, grid: Option<GridOverlay>);

    /// Present all queued changes at once
    fn batch_draw(&mut self);
}

/// Input delivered to the engine, in screen pixels
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MapInput {
    /// Drag in progress
    PanBy { dx: f64, dy: f64 },
    PanEnd,
    /// Wheel notch; positive `delta_y` zooms out
    Zoom { delta_y: f64, x: f64, y: f64 },
    Click { x: f64, y: f64 },
    Hover { x: f64, y: f64, modifier: bool },
    PointerLeft,
    ModifierReleased,
    Resize { width: u32, height: u32 },
    SelectTile(TileId),
    /// Minimap click, as fractions of the minimap size
    NavigateMinimap { fx: f64, fy: f64 },
}

/// Last failed store operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MapFailure {
    Save,
    Load,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MapStatus {
    Idle,
    Loading,
    Minimap,
    Syncing,
    SaveFailed,
    LoadFailed,
}

impl MapStatus {
    pub fn label(&self) -> &'static str {
        match self {
            MapStatus::Idle => "Idle",
            MapStatus::Loading => "Loading...",
            MapStatus::Minimap => "Minimap...",
            MapStatus::Syncing => "Syncing...",
            MapStatus::SaveFailed => "Save Failed!",
            MapStatus::LoadFailed => "Load Failed!",
        }
    }

    pub fn color(&self) -> [u8; 3] {
        match self {
            MapStatus::Idle => [0x2e, 0xcc, 0x71],
            MapStatus::Loading | MapStatus::Minimap => [0xf1, 0xc4, 0x0f],
            MapStatus::Syncing => [0xf3, 0x9c, 0x12],
            MapStatus::SaveFailed | MapStatus::LoadFailed => [0xe7, 0x4c, 0x3c],
        }
    }
}

/// Result of a cache-first chunk lookup
#[derive(Debug, Clone, PartialEq)]
pub enum ChunkFetch {
    Ready(Chunk),
    /// Requested from the store; arrives through [`MapEngine::update`]
    Pending,
}

/// The tile engine context: camera, both caches, the minimap raster and
/// all edit/sync bookkeeping, driven by [`MapInput`] messages and
/// [`MapEngine::update`] once per frame.
pub struct MapEngine<S: DrawSurface> {
    config: MapConfig,
    camera: MapCamera,
    chunks: LruCache<ChunkCoord, Chunk>,
    images: LruCache<ChunkCoord, ChunkImage>,
    loader: ChunkLoader,
    surface: S,
    view: ViewState,
    edits: EditState,
    minimap: Minimap,
    selected_tile: TileId,
    failure: Option<MapFailure>,
    notifications: VecDeque<String>,
}

impl<S: DrawSurface> MapEngine<S> {
    pub fn new(config: MapConfig, loader: ChunkLoader, surface: S) -> Self {
        let mut camera = MapCamera::new(800, 600, &config.view);
        let (center_x, center_y) = config.world.center();
        camera.center_on(center_x, center_y);

        Self {
            chunks: LruCache::new(config.cache.chunk_capacity),
            images: LruCache::new(config.cache.image_capacity),
            minimap: Minimap::new(&config.world),
            camera,
            loader,
            surface,
            view: ViewState::default(),
            edits: EditState::default(),
            selected_tile: TileId::GRASS,
            failure: None,
            notifications: VecDeque::new(),
            config,
        }
    }

    /// Size the viewport before [`MapEngine::start`], keeping the world
    /// centre in the middle of the screen
    pub fn with_viewport(mut self, width: u32, height: u32) -> Self {
        if width > 0 && height > 0 {
            self.camera.set_viewport(width, height);
            let (center_x, center_y) = self.config.world.center();
            self.camera.center_on(center_x, center_y);
        }
        self
    }

    /// Load or generate the minimap and draw the initial view
    pub fn start(&mut self) {
        log::info!(
            "Starting map engine: {}x{} tiles, {} chunks",
            self.config.world.width_in_tiles,
            self.config.world.height_in_tiles,
            self.config.world.width_in_chunks() as u64 * self.config.world.height_in_chunks() as u64
        );
        self.load_minimap();
        self.redraw();
    }

    /// Drain completed store requests and run deferred work (call each frame)
    pub fn update(&mut self) {
        while let Some(response) = self.loader.poll() {
            self.handle_response(response);
        }
        self.step_minimap_build();
        self.flush_minimap(web_time::Instant::now());
    }

    /// Route one input message to the view or edit controller
    pub fn dispatch(&mut self, input: MapInput) {
        match input {
            MapInput::PanBy { dx, dy } => self.pan_by(dx, dy),
            MapInput::PanEnd => self.pan_end(),
            MapInput::Zoom { delta_y, x, y } => self.zoom(delta_y, x, y),
            MapInput::Click { x, y } => self.click(x, y),
            MapInput::Hover { x, y, modifier } => self.hover(x, y, modifier),
            MapInput::PointerLeft => self.view.hide_tooltip(),
            MapInput::ModifierReleased => self.view.reset_hover(),
            MapInput::Resize { width, height } => self.resize(width, height),
            MapInput::SelectTile(tile) => self.select_tile(tile),
            MapInput::NavigateMinimap { fx, fy } => self.navigate_minimap(fx, fy),
        }
    }

    fn handle_response(&mut self, response: StoreResponse) {
        match response {
            StoreResponse::ChunkFetched(coord, result) => self.on_chunk_fetched(coord, result),
            StoreResponse::ChunkPersisted(ticket, result) => self.on_chunk_persisted(ticket, result),
            StoreResponse::MinimapFetched(result) => self.on_minimap_fetched(result),
            StoreResponse::MinimapPersisted(ticket, result) => {
                self.on_minimap_persisted(ticket, result)
            }
        }
    }

    fn on_chunk_fetched(&mut self, coord: ChunkCoord, result: Result<Option<Chunk>, StoreError>) {
        match result {
            Ok(remote) => {
                // Local state is newer than anything the store can return
                if !self.chunks.contains(&coord) && !self.edits.is_tracking(coord) {
                    if remote.is_none() {
                        log::debug!("Chunk {} not generated yet, using default", coord);
                    }
                    self.cache_chunk(coord, remote.unwrap_or_default());
                }
                self.apply_pending_paints(coord);
                self.on_build_chunk_ready(coord);
                self.resolve_pending_hover(coord);
                self.on_redraw_chunk_ready(coord);
            }
            Err(e) => {
                log::warn!("Failed to fetch chunk {}: {}", coord, e);
                self.failure = Some(MapFailure::Load);
                self.drop_pending_paints(coord);
                self.on_build_chunk_failed(coord);
                self.view.cancel_pending_hover(coord);
                self.on_redraw_chunk_failed(coord);
            }
        }
    }

    /// Cache-first chunk lookup. A chunk the store never wrote resolves to
    /// the default chunk without being persisted.
    pub fn fetch_chunk(&mut self, coord: ChunkCoord) -> ChunkFetch {
        match self.local_chunk(coord) {
            Some(chunk) => ChunkFetch::Ready(chunk),
            None => {
                self.loader.request_chunk(coord);
                ChunkFetch::Pending
            }
        }
    }

    /// Newest local copy of a chunk: the unsynced working copy if any,
    /// otherwise the data cache. Refreshes cache recency.
    fn local_chunk(&mut self, coord: ChunkCoord) -> Option<Chunk> {
        if let Some(working) = self.edits.working(coord) {
            return Some(working.clone());
        }
        self.chunks.get(&coord).cloned()
    }

    /// Cached chunk data without touching recency
    pub fn cached_chunk(&self, coord: ChunkCoord) -> Option<&Chunk> {
        self.edits.working(coord).or_else(|| self.chunks.peek(&coord))
    }

    pub fn cached_image(&self, coord: ChunkCoord) -> Option<&ChunkImage> {
        self.images.peek(&coord)
    }

    fn cache_chunk(&mut self, coord: ChunkCoord, chunk: Chunk) {
        if let Some((evicted, _)) = self.chunks.set(coord, chunk) {
            log::debug!("Evicted chunk {} from data cache", evicted);
        }
    }

    fn cache_image(&mut self, image: ChunkImage) {
        if let Some((evicted, _)) = self.images.set(image.coord, image) {
            log::debug!("Evicted chunk {} from image cache", evicted);
        }
    }

    /// Cached image for a chunk, rendering it from cached data on a miss
    fn chunk_image(&mut self, coord: ChunkCoord) -> Option<ChunkImage> {
        if let Some(image) = self.images.get(&coord) {
            return Some(image.clone());
        }
        let chunk = self.local_chunk(coord)?;
        let image = render_chunk(coord, &chunk, self.config.world.pixel_size);
        self.cache_image(image.clone());
        Some(image)
    }

    /// Re-render a chunk after its data changed and swap it into the view
    fn refresh_chunk(&mut self, coord: ChunkCoord) {
        self.images.remove(&coord);
        let Some(image) = self.chunk_image(coord) else {
            return;
        };
        if self.view.is_rendered(coord) {
            self.surface.add_image(&image);
            self.surface.batch_draw();
        }
        if let Some(chunk) = self.local_chunk(coord) {
            self.minimap.patch_pixel(coord, &chunk);
            self.sync_tooltip(coord, &chunk);
        }
    }

    fn notify(&mut self, message: String) {
        self.notifications.push_back(message);
    }

    /// Next user-facing failure message, once
    pub fn take_notification(&mut self) -> Option<String> {
        self.notifications.pop_front()
    }

    pub fn status(&self) -> MapStatus {
        match self.failure {
            Some(MapFailure::Save) => return MapStatus::SaveFailed,
            Some(MapFailure::Load) => return MapStatus::LoadFailed,
            None => {}
        }
        if self.edits.is_syncing() || self.minimap.is_saving() {
            MapStatus::Syncing
        } else if self.minimap.is_generating() {
            MapStatus::Minimap
        } else if self.view.is_redrawing() || self.edits.has_pending_paints() {
            MapStatus::Loading
        } else {
            MapStatus::Idle
        }
    }

    pub fn failure(&self) -> Option<MapFailure> {
        self.failure
    }

    /// Nothing in flight and nothing left to flush
    pub fn is_idle(&self) -> bool {
        self.loader.in_flight() == 0
            && !self.view.is_redrawing()
            && !self.edits.is_syncing()
            && !self.edits.has_pending_paints()
            && !self.minimap.is_generating()
            && !self.minimap.is_saving()
            && !self.minimap.needs_flush()
    }

    pub fn tooltip(&self) -> Option<&Tooltip> {
        self.view.tooltip()
    }

    pub fn camera(&self) -> &MapCamera {
        &self.camera
    }

    pub fn config(&self) -> &MapConfig {
        &self.config
    }

    pub fn minimap(&self) -> &Minimap {
        &self.minimap
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    pub fn surface_mut(&mut self) -> &mut S {
        &mut self.surface
    }

    /// Data cache and image cache statistics
    pub fn cache_stats(&self) -> (CacheStats, CacheStats) {
        (self.chunks.stats(), self.images.stats())
    }

    /// Pixel bytes held by the image cache
    pub fn image_cache_bytes(&self) -> usize {
        self.images.values().map(ChunkImage::memory_size).sum()
    }

    pub fn selected_tile(&self) -> TileId {
        self.selected_tile
    }

    fn select_tile(&mut self, tile: TileId) {
        if tile.is_known() {
            self.selected_tile = tile;
        } else {
            log::warn!("Ignoring selection of unknown tile {}", tile);
        }
    }

    pub fn pending_fetches(&self) -> usize {
        self.loader.pending_fetches()
    }
}
