//! World view: redraw diffing, pan/zoom, grid and hover tooltip

use std::collections::HashSet;

use super::chunk::{Chunk, ChunkCoord};
use super::grid::grid_lines;
use super::tile::{TileId, TilePos};
use super::visibility::{WorldRect, visible_chunk_coords, visible_world_rect};
use super::{DrawSurface, MapEngine, MapFailure};

/// Hovered tile details shown while the modifier is held
#[derive(Debug, Clone, PartialEq)]
pub struct Tooltip {
    pub tile: TilePos,
    pub tile_id: TileId,
    /// Pointer position in screen pixels
    pub anchor: (f64, f64),
}

impl Tooltip {
    pub fn name(&self) -> &'static str {
        self.tile_id.legend().name
    }

    pub fn lines(&self) -> [String; 2] {
        [
            format!("Tile: {}", self.name()),
            format!("Coords: X: {}, Y: {}", self.tile.x, self.tile.y),
        ]
    }
}

#[derive(Debug, Clone, Copy)]
struct PendingHover {
    tile: TilePos,
    anchor: (f64, f64),
}

/// View-side bookkeeping owned by the engine
#[derive(Debug, Default)]
pub(crate) struct ViewState {
    /// Chunks whose image is on the surface
    rendered: HashSet<ChunkCoord>,
    /// Fetches the current redraw is waiting on; `Some` while it runs
    awaiting: Option<HashSet<ChunkCoord>>,
    dragging: bool,
    last_hovered: Option<TilePos>,
    pending_hover: Option<PendingHover>,
    tooltip: Option<Tooltip>,
}

impl ViewState {
    pub fn is_rendered(&self, coord: ChunkCoord) -> bool {
        self.rendered.contains(&coord)
    }

    pub fn is_redrawing(&self) -> bool {
        self.awaiting.is_some()
    }

    pub fn is_dragging(&self) -> bool {
        self.dragging
    }

    pub fn tooltip(&self) -> Option<&Tooltip> {
        self.tooltip.as_ref()
    }

    pub fn hide_tooltip(&mut self) {
        self.tooltip = None;
    }

    /// Forget the hovered tile so the next hover resolves again
    pub fn reset_hover(&mut self) {
        self.tooltip = None;
        self.last_hovered = None;
        self.pending_hover = None;
    }

    pub fn cancel_pending_hover(&mut self, coord: ChunkCoord) {
        if self
            .pending_hover
            .is_some_and(|pending| pending.tile.split().0 == coord)
        {
            self.pending_hover = None;
        }
    }

    /// Drop rendered chunks that left the view, returning them
    fn retain_rendered(&mut self, visible: &HashSet<ChunkCoord>) -> Vec<ChunkCoord> {
        let gone: Vec<ChunkCoord> = self
            .rendered
            .iter()
            .filter(|coord| !visible.contains(coord))
            .copied()
            .collect();
        for coord in &gone {
            self.rendered.remove(coord);
        }
        gone
    }

    /// Whether the running redraw was waiting on `coord`
    fn take_awaiting(&mut self, coord: ChunkCoord) -> bool {
        self.awaiting
            .as_mut()
            .is_some_and(|awaiting| awaiting.remove(&coord))
    }

    /// Keep a visible tooltip in step with edits to its chunk
    fn sync_tooltip(&mut self, coord: ChunkCoord, chunk: &Chunk) {
        if let Some(tooltip) = self.tooltip.as_mut() {
            let (tooltip_coord, local) = tooltip.tile.split();
            if tooltip_coord == coord {
                tooltip.tile_id = chunk.get(local);
            }
        }
    }
}

impl<S: DrawSurface> MapEngine<S> {
    /// Diff the rendered chunk set against the visible one: drop images that
    /// left the view, show cached ones, fetch the rest. A redraw still
    /// waiting on fetches suppresses new requests.
    pub fn redraw(&mut self) {
        if self.view.is_redrawing() {
            log::debug!("Redraw already in progress, skipping");
            return;
        }
        if self.failure == Some(MapFailure::Load) {
            self.failure = None;
        }

        let visible = visible_chunk_coords(&self.camera, &self.config.world);
        let visible_set: HashSet<ChunkCoord> = visible.iter().map(|chunk| chunk.coord).collect();

        for coord in self.view.retain_rendered(&visible_set) {
            self.surface.remove_image(coord);
            self.images.remove(&coord);
        }

        let mut awaiting = HashSet::new();
        for chunk in &visible {
            if self.view.is_rendered(chunk.coord) {
                continue;
            }
            match self.chunk_image(chunk.coord) {
                Some(image) => {
                    self.surface.add_image(&image);
                    self.view.rendered.insert(chunk.coord);
                }
                None => {
                    self.loader.request_chunk(chunk.coord);
                    awaiting.insert(chunk.coord);
                }
            }
        }

        self.surface.set_grid(grid_lines(
            &self.camera,
            &self.config.world,
            &self.config.view,
        ));

        if awaiting.is_empty() {
            self.surface.batch_draw();
        } else {
            log::debug!("Redraw waiting on {} chunks", awaiting.len());
            self.view.awaiting = Some(awaiting);
        }
    }

    pub(super) fn on_redraw_chunk_ready(&mut self, coord: ChunkCoord) {
        if !self.view.take_awaiting(coord) {
            return;
        }
        if let Some(image) = self.chunk_image(coord) {
            self.surface.add_image(&image);
            self.view.rendered.insert(coord);
        }
        self.finish_redraw_if_complete();
    }

    /// Leaves a partial view; the next interaction redraws the gap
    pub(super) fn on_redraw_chunk_failed(&mut self, coord: ChunkCoord) {
        if self.view.take_awaiting(coord) {
            self.finish_redraw_if_complete();
        }
    }

    fn finish_redraw_if_complete(&mut self) {
        if self.view.awaiting.as_ref().is_some_and(HashSet::is_empty) {
            self.view.awaiting = None;
            self.surface.batch_draw();
        }
    }

    pub(super) fn pan_by(&mut self, dx: f64, dy: f64) {
        if !self.view.dragging {
            self.view.dragging = true;
            self.view.hide_tooltip();
        }
        self.camera.pan(dx, dy);
    }

    pub(super) fn pan_end(&mut self) {
        self.view.dragging = false;
        self.redraw();
    }

    pub(super) fn zoom(&mut self, delta_y: f64, x: f64, y: f64) {
        self.view.hide_tooltip();
        if self.camera.zoom_at(delta_y, x, y) {
            self.redraw();
        }
    }

    pub(super) fn resize(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }
        self.camera.set_viewport(width, height);
        self.redraw();
    }

    /// Centre the camera on the world point under a minimap click
    pub(super) fn navigate_minimap(&mut self, fx: f64, fy: f64) {
        let world = &self.config.world;
        let x = fx.clamp(0.0, 1.0) * world.width_in_pixels();
        let y = fy.clamp(0.0, 1.0) * world.height_in_pixels();
        self.camera.center_on(x, y);
        self.redraw();
    }

    /// Visible world rect as fractions of the world size, for the minimap
    /// viewport indicator
    pub fn minimap_viewport(&self) -> WorldRect {
        let rect = visible_world_rect(&self.camera);
        let width = self.config.world.width_in_pixels();
        let height = self.config.world.height_in_pixels();
        WorldRect {
            x1: (rect.x1 / width).clamp(0.0, 1.0),
            y1: (rect.y1 / height).clamp(0.0, 1.0),
            x2: (rect.x2 / width).clamp(0.0, 1.0),
            y2: (rect.y2 / height).clamp(0.0, 1.0),
        }
    }

    /// Tile under a screen position, if inside the world
    pub fn tile_at(&self, x: f64, y: f64) -> Option<TilePos> {
        let (world_x, world_y) = self.camera.screen_to_world(x, y);
        let tile = TilePos::from_world(world_x, world_y, self.config.world.pixel_size);
        self.config.world.contains_tile(tile).then_some(tile)
    }

    pub(super) fn hover(&mut self, x: f64, y: f64, modifier: bool) {
        if !modifier {
            self.view.hide_tooltip();
            return;
        }
        let Some(tile) = self.tile_at(x, y) else {
            self.view.reset_hover();
            return;
        };
        if self.view.last_hovered == Some(tile) {
            return;
        }
        self.view.last_hovered = Some(tile);

        let (coord, local) = tile.split();
        match self.local_chunk(coord) {
            Some(chunk) => {
                self.view.pending_hover = None;
                self.view.tooltip = Some(Tooltip {
                    tile,
                    tile_id: chunk.get(local),
                    anchor: (x, y),
                });
            }
            None => {
                self.view.hide_tooltip();
                self.view.pending_hover = Some(PendingHover {
                    tile,
                    anchor: (x, y),
                });
                self.loader.request_chunk(coord);
            }
        }
    }

    pub(super) fn resolve_pending_hover(&mut self, coord: ChunkCoord) {
        let Some(pending) = self.view.pending_hover else {
            return;
        };
        let (pending_coord, local) = pending.tile.split();
        if pending_coord != coord {
            return;
        }
        self.view.pending_hover = None;
        if self.view.last_hovered != Some(pending.tile) {
            return;
        }
        if let Some(chunk) = self.local_chunk(coord) {
            self.view.tooltip = Some(Tooltip {
                tile: pending.tile,
                tile_id: chunk.get(local),
                anchor: pending.anchor,
            });
        }
    }

    pub(super) fn sync_tooltip(&mut self, coord: ChunkCoord, chunk: &Chunk) {
        self.view.sync_tooltip(coord, chunk);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::map::MapInput;
    use crate::map::testing::{engine, settle};

    #[test]
    fn test_initial_redraw_shows_visible_chunks() {
        let (mut engine, store) = engine();
        engine.redraw();
        assert!(engine.view.is_redrawing());
        settle(&mut engine);

        let visible = visible_chunk_coords(engine.camera(), &engine.config().world);
        assert_eq!(visible.len(), 8);
        for chunk in &visible {
            assert!(engine.surface().shown.contains_key(&chunk.coord));
            assert_eq!(store.chunk_fetches(chunk.coord), 1);
        }
        assert_eq!(engine.surface().shown.len(), 8);
        assert!(engine.surface().grid.is_some());
    }

    #[test]
    fn test_cached_chunks_are_not_refetched_or_rerendered() {
        let (mut engine, store) = engine();
        engine.redraw();
        settle(&mut engine);
        let added = engine.surface().added.len();
        let fetches = store.total_chunk_fetches();

        engine.redraw();
        settle(&mut engine);
        assert_eq!(engine.surface().added.len(), added);
        assert_eq!(store.total_chunk_fetches(), fetches);
    }

    #[test]
    fn test_scrolled_out_chunks_are_evicted() {
        let (mut engine, _) = engine();
        engine.redraw();
        settle(&mut engine);
        let before: Vec<ChunkCoord> = engine.surface().shown.keys().copied().collect();

        // one full screen to the left
        engine.dispatch(MapInput::PanBy { dx: 800.0, dy: 0.0 });
        engine.dispatch(MapInput::PanEnd);
        settle(&mut engine);

        let visible: HashSet<ChunkCoord> = visible_chunk_coords(engine.camera(), &engine.config().world)
            .into_iter()
            .map(|chunk| chunk.coord)
            .collect();
        for coord in before.iter().filter(|coord| !visible.contains(coord)) {
            assert!(engine.surface().removed.contains(coord));
            assert!(!engine.surface().shown.contains_key(coord));
            assert!(engine.cached_image(*coord).is_none());
            // data stays cached
            assert!(engine.cached_chunk(*coord).is_some());
        }
        assert_eq!(engine.surface().shown.len(), visible.len());
    }

    #[test]
    fn test_concurrent_redraw_is_suppressed() {
        let (mut engine, _) = engine();
        engine.redraw();
        let fetches = engine.pending_fetches();
        engine.dispatch(MapInput::PanBy { dx: 2000.0, dy: 0.0 });
        engine.dispatch(MapInput::PanEnd);
        // the suppressed redraw neither fetched nor removed anything
        assert_eq!(engine.pending_fetches(), fetches);
        assert!(engine.surface().removed.is_empty());
        settle(&mut engine);
        assert!(!engine.view.is_redrawing());
    }

    #[test]
    fn test_zoom_redraws_and_hides_tooltip() {
        let (mut engine, _) = engine();
        engine.redraw();
        settle(&mut engine);
        engine.dispatch(MapInput::Hover { x: 400.0, y: 300.0, modifier: true });
        assert!(engine.tooltip().is_some());

        let draws = engine.surface().batch_draws;
        engine.dispatch(MapInput::Zoom { delta_y: -1.0, x: 400.0, y: 300.0 });
        assert!(engine.tooltip().is_none());
        assert!((engine.camera().scale - 1.1).abs() < 1e-9);
        settle(&mut engine);
        assert!(engine.surface().batch_draws > draws);
    }

    #[test]
    fn test_grid_hidden_when_zoomed_out() {
        let (mut engine, _) = engine();
        for _ in 0..20 {
            engine.dispatch(MapInput::Zoom { delta_y: 1.0, x: 400.0, y: 300.0 });
            settle(&mut engine);
        }
        assert!(engine.camera().scale < 0.2);
        assert!(engine.surface().grid.is_none());
    }

    #[test]
    fn test_hover_tooltip_lifecycle() {
        let (mut engine, _) = engine();
        engine.redraw();
        settle(&mut engine);

        engine.dispatch(MapInput::Hover { x: 400.0, y: 300.0, modifier: false });
        assert!(engine.tooltip().is_none());

        engine.dispatch(MapInput::Hover { x: 400.0, y: 300.0, modifier: true });
        let tooltip = engine.tooltip().cloned().unwrap();
        // camera is centred on world pixel (1536, 1536), tile 64
        assert_eq!(tooltip.tile, TilePos::new(64, 64));
        assert_eq!(
            tooltip.lines(),
            ["Tile: Deep Water".to_string(), "Coords: X: 64, Y: 64".to_string()]
        );

        engine.dispatch(MapInput::PointerLeft);
        assert!(engine.tooltip().is_none());
        // same tile again is rate limited until the modifier is released
        engine.dispatch(MapInput::Hover { x: 401.0, y: 301.0, modifier: true });
        assert!(engine.tooltip().is_none());
        engine.dispatch(MapInput::ModifierReleased);
        engine.dispatch(MapInput::Hover { x: 401.0, y: 301.0, modifier: true });
        assert!(engine.tooltip().is_some());
    }

    #[test]
    fn test_hover_on_uncached_chunk_resolves_after_fetch() {
        let (mut engine, store) = engine();
        engine.dispatch(MapInput::Hover { x: 400.0, y: 300.0, modifier: true });
        assert!(engine.tooltip().is_none());
        settle(&mut engine);
        let tooltip = engine.tooltip().unwrap();
        assert_eq!(tooltip.tile_id, TileId::DEFAULT);
        assert_eq!(store.total_chunk_fetches(), 1);
    }

    #[test]
    fn test_hover_outside_world_hides_tooltip() {
        let (mut engine, _) = engine();
        engine.dispatch(MapInput::PanBy { dx: 5000.0, dy: 0.0 });
        engine.dispatch(MapInput::PanEnd);
        settle(&mut engine);
        engine.dispatch(MapInput::Hover { x: 10.0, y: 10.0, modifier: true });
        assert!(engine.tooltip().is_none());
    }

    #[test]
    fn test_minimap_navigation_recentres() {
        let (mut engine, _) = engine();
        engine.dispatch(MapInput::NavigateMinimap { fx: 0.25, fy: 0.75 });
        let center = engine.camera().screen_to_world(400.0, 300.0);
        assert!((center.0 - 768.0).abs() < 1e-6);
        assert!((center.1 - 2304.0).abs() < 1e-6);

        let rect = engine.minimap_viewport();
        assert!(rect.x1 < 0.25 && rect.x2 > 0.25);
        assert!(rect.y1 < 0.75 && rect.y2 > 0.75);
    }

    #[test]
    fn test_load_failure_leaves_partial_view() {
        let (mut engine, store) = engine();
        store.fail_chunk_fetches(true);
        engine.redraw();
        settle(&mut engine);
        assert_eq!(engine.failure(), Some(MapFailure::Load));
        assert!(engine.surface().shown.is_empty());
        assert!(engine.cached_chunk(ChunkCoord::new(2, 3)).is_none());

        // the next interaction retries
        store.fail_chunk_fetches(false);
        engine.dispatch(MapInput::PanEnd);
        settle(&mut engine);
        assert_eq!(engine.failure(), None);
        assert_eq!(engine.surface().shown.len(), 8);
    }
}
