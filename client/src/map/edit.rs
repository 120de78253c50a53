//! Optimistic paint edits.
//!
//! A paint is applied locally at once (data cache, chunk image, minimap
//! pixel) and persisted in the background. Each chunk has at most one
//! persist in flight; edits made meanwhile are coalesced into the next
//! snapshot. A failed persist restores the chunk to the last snapshot the
//! store confirmed.

use std::collections::HashMap;

use super::chunk::{Chunk, ChunkCoord, LocalPos};
use super::loader::SyncTicket;
use super::store::StoreError;
use super::tile::{TileId, TilePos};
use super::{DrawSurface, MapEngine, MapFailure};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaintOutcome {
    OutOfBounds,
    /// The cell already holds the tile
    Unchanged,
    Applied { previous: TileId },
    /// Chunk not cached; applied once its fetch completes
    Deferred,
}

/// Sync progress of one edited chunk
#[derive(Debug, Clone, PartialEq)]
struct ChunkSync {
    /// Last state the store is known to hold
    baseline: Chunk,
    /// Local state including unconfirmed edits
    working: Chunk,
    in_flight: Option<(SyncTicket, Chunk)>,
    /// `working` has edits not yet sent
    dirty: bool,
}

#[derive(Debug, Default)]
pub(crate) struct EditState {
    syncs: HashMap<ChunkCoord, ChunkSync>,
    tickets: HashMap<SyncTicket, ChunkCoord>,
    /// Paints waiting for their chunk to load, in click order
    pending_paints: HashMap<ChunkCoord, Vec<(LocalPos, TileId)>>,
}

impl EditState {
    pub fn is_tracking(&self, coord: ChunkCoord) -> bool {
        self.syncs.contains_key(&coord)
    }

    pub fn working(&self, coord: ChunkCoord) -> Option<&Chunk> {
        self.syncs.get(&coord).map(|sync| &sync.working)
    }

    pub fn tracked(&self) -> impl Iterator<Item = ChunkCoord> + '_ {
        self.syncs.keys().copied()
    }

    pub fn is_syncing(&self) -> bool {
        !self.syncs.is_empty()
    }

    pub fn has_pending_paints(&self) -> bool {
        !self.pending_paints.is_empty()
    }

    /// Record a local edit on top of `before`
    fn record(&mut self, coord: ChunkCoord, before: Chunk, after: Chunk) {
        let sync = self.syncs.entry(coord).or_insert_with(|| ChunkSync {
            baseline: before,
            working: after.clone(),
            in_flight: None,
            dirty: true,
        });
        sync.working = after;
        sync.dirty = true;
    }

    /// Snapshot to send, unless a persist is already in flight
    fn next_snapshot(&mut self, coord: ChunkCoord) -> Option<Chunk> {
        let sync = self.syncs.get_mut(&coord)?;
        if sync.in_flight.is_some() || !sync.dirty {
            return None;
        }
        sync.dirty = false;
        Some(sync.working.clone())
    }

    fn mark_sent(&mut self, coord: ChunkCoord, ticket: SyncTicket, snapshot: Chunk) {
        if let Some(sync) = self.syncs.get_mut(&coord) {
            sync.in_flight = Some((ticket, snapshot));
            self.tickets.insert(ticket, coord);
        }
    }

    /// The in-flight snapshot became the baseline. Returns true if newer
    /// edits still need sending; fully synced chunks are forgotten.
    fn confirm(&mut self, coord: ChunkCoord) -> bool {
        let Some(sync) = self.syncs.get_mut(&coord) else {
            return false;
        };
        if let Some((_, sent)) = sync.in_flight.take() {
            sync.baseline = sent;
        }
        if sync.dirty {
            return true;
        }
        self.syncs.remove(&coord);
        false
    }

    /// Stop tracking a chunk, returning the state to restore
    fn abandon(&mut self, coord: ChunkCoord) -> Option<Chunk> {
        self.syncs.remove(&coord).map(|sync| sync.baseline)
    }
}

impl<S: DrawSurface> MapEngine<S> {
    /// Paint the selected tile at a screen position.
    /// Ignored during a drag or while a redraw is in progress.
    pub(super) fn click(&mut self, x: f64, y: f64) {
        if self.view.is_dragging() || self.view.is_redrawing() {
            log::debug!("Ignoring click at ({}, {}) while busy", x, y);
            return;
        }
        let Some(tile) = self.tile_at(x, y) else {
            return;
        };
        self.paint(tile, self.selected_tile);
    }

    /// Set one world tile, applying locally before the store confirms
    pub fn paint(&mut self, tile: TilePos, tile_id: TileId) -> PaintOutcome {
        if !self.config.world.contains_tile(tile) {
            return PaintOutcome::OutOfBounds;
        }
        let (coord, local) = tile.split();

        let Some(chunk) = self.local_chunk(coord) else {
            log::debug!("Chunk {} not loaded, deferring paint", coord);
            self.edits
                .pending_paints
                .entry(coord)
                .or_default()
                .push((local, tile_id));
            self.loader.request_chunk(coord);
            return PaintOutcome::Deferred;
        };

        if chunk.get(local) == tile_id {
            return PaintOutcome::Unchanged;
        }
        let previous = self.apply_paint(coord, chunk, local, tile_id);
        PaintOutcome::Applied { previous }
    }

    fn apply_paint(&mut self, coord: ChunkCoord, before: Chunk, local: LocalPos, tile_id: TileId) -> TileId {
        let previous = before.get(local);
        let mut after = before.clone();
        after.set(local, tile_id);

        self.failure = None;
        self.cache_chunk(coord, after.clone());
        self.edits.record(coord, before, after);
        self.refresh_chunk(coord);
        self.send_chunk(coord);
        previous
    }

    fn send_chunk(&mut self, coord: ChunkCoord) {
        let Some(snapshot) = self.edits.next_snapshot(coord) else {
            return;
        };
        log::debug!("Saving chunk {}", coord);
        let ticket = self.loader.persist_chunk(coord, snapshot.clone());
        self.edits.mark_sent(coord, ticket, snapshot);
    }

    pub(super) fn on_chunk_persisted(&mut self, ticket: SyncTicket, result: Result<(), StoreError>) {
        let Some(coord) = self.edits.tickets.remove(&ticket) else {
            log::warn!("Ignoring unknown chunk save {:?}", ticket);
            return;
        };

        match result {
            Ok(()) => {
                log::debug!("Chunk {} saved", coord);
                self.minimap.mark_dirty(web_time::Instant::now());
                if self.edits.confirm(coord) {
                    self.send_chunk(coord);
                }
            }
            Err(e) => {
                log::error!("Failed to save chunk {}, reverting: {}", coord, e);
                self.failure = Some(MapFailure::Save);
                self.notify(format!(
                    "Failed to save map change for chunk {}. Reverting change.",
                    coord.key()
                ));
                if let Some(baseline) = self.edits.abandon(coord) {
                    self.cache_chunk(coord, baseline);
                    self.refresh_chunk(coord);
                }
            }
        }
    }

    pub(super) fn apply_pending_paints(&mut self, coord: ChunkCoord) {
        let Some(paints) = self.edits.pending_paints.remove(&coord) else {
            return;
        };
        for (local, tile_id) in paints {
            let Some(chunk) = self.local_chunk(coord) else {
                break;
            };
            if chunk.get(local) != tile_id {
                self.apply_paint(coord, chunk, local, tile_id);
            }
        }
    }

    pub(super) fn drop_pending_paints(&mut self, coord: ChunkCoord) {
        if let Some(paints) = self.edits.pending_paints.remove(&coord) {
            log::warn!("Dropped {} paints for chunk {} that failed to load", paints.len(), coord);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::map::testing::{RecordingStore, RecordingSurface, engine, settle};
    use crate::map::{MapInput, MapStatus};

    fn started() -> (MapEngine<RecordingSurface>, Arc<RecordingStore>) {
        let (mut engine, store) = engine();
        engine.start();
        settle(&mut engine);
        store.reset_calls();
        (engine, store)
    }

    #[test]
    fn test_paint_scenario_posts_chunk_and_minimap_once() {
        let (mut engine, store) = started();
        let coord = ChunkCoord::new(0, 0);
        engine.dispatch(MapInput::NavigateMinimap { fx: 0.0, fy: 0.0 });
        settle(&mut engine);
        assert!(engine.surface().shown.contains_key(&coord));
        let before = engine.surface().shown[&coord].image.clone();

        let outcome = engine.paint(TilePos::new(5, 5), TileId(3));
        assert_eq!(outcome, PaintOutcome::Applied { previous: TileId::DEFAULT });
        // applied before any store round trip
        assert_eq!(engine.cached_chunk(coord).unwrap().get(LocalPos::new(5, 5)), TileId(3));
        assert_eq!(engine.surface().added.last(), Some(&coord));
        assert_ne!(engine.surface().shown[&coord].image.as_raw(), before.as_raw());
        assert_eq!(engine.status(), MapStatus::Syncing);

        settle(&mut engine);
        assert_eq!(engine.status(), MapStatus::Idle);
        assert_eq!(store.chunk_posts(), 1);
        assert_eq!(store.minimap_posts(), 1);
        assert_eq!(
            store.stored_chunk(coord).unwrap().get(LocalPos::new(5, 5)),
            TileId(3)
        );
    }

    #[test]
    fn test_paint_swaps_visible_image() {
        let (mut engine, _) = started();
        // tile under the viewport centre lives in visible chunk (4, 4)
        let tile = engine.tile_at(400.0, 300.0).unwrap();
        let (coord, _) = tile.split();
        assert!(engine.surface().shown.contains_key(&coord));
        let adds = engine.surface().added.len();

        engine.dispatch(MapInput::SelectTile(TileId::FOREST));
        engine.dispatch(MapInput::Click { x: 400.0, y: 300.0 });

        assert_eq!(engine.surface().added.len(), adds + 1);
        assert_eq!(engine.surface().added.last(), Some(&coord));
        let shown = &engine.surface().shown[&coord];
        let cached = engine.cached_image(coord).unwrap();
        assert_eq!(shown.image.as_raw(), cached.image.as_raw());
        settle(&mut engine);
    }

    #[test]
    fn test_idempotent_paint_makes_no_calls() {
        let (mut engine, store) = started();
        let tile = TilePos::new(5, 5);
        assert_eq!(engine.paint(tile, TileId::DEFAULT), PaintOutcome::Unchanged);
        settle(&mut engine);
        assert_eq!(store.chunk_posts(), 0);
        assert_eq!(store.minimap_posts(), 0);

        engine.paint(tile, TileId::SAND);
        settle(&mut engine);
        store.reset_calls();
        let image = engine.cached_image(ChunkCoord::new(0, 0)).map(|image| image.image.clone());
        assert_eq!(engine.paint(tile, TileId::SAND), PaintOutcome::Unchanged);
        settle(&mut engine);
        assert_eq!(store.chunk_posts(), 0);
        assert_eq!(store.minimap_posts(), 0);
        assert_eq!(
            engine.cached_image(ChunkCoord::new(0, 0)).map(|image| image.image.clone()),
            image
        );
    }

    #[test]
    fn test_failed_save_reverts_bitwise() {
        let (mut engine, store) = started();
        let tile = engine.tile_at(400.0, 300.0).unwrap();
        let (coord, local) = tile.split();

        let chunk_before = engine.cached_chunk(coord).cloned().unwrap();
        let image_before = engine.surface().shown[&coord].image.as_raw().clone();
        let pixel_before = engine.minimap().pixel(coord);

        store.fail_chunk_posts(true);
        engine.paint(tile, TileId::PLAYER_RED);
        assert_eq!(engine.cached_chunk(coord).unwrap().get(local), TileId::PLAYER_RED);
        assert_ne!(engine.minimap().pixel(coord), pixel_before);
        settle(&mut engine);

        assert_eq!(engine.status(), MapStatus::SaveFailed);
        assert_eq!(
            engine.take_notification().as_deref(),
            Some("Failed to save map change for chunk 4,4. Reverting change.")
        );
        assert_eq!(engine.take_notification(), None);
        assert_eq!(engine.cached_chunk(coord), Some(&chunk_before));
        assert_eq!(engine.surface().shown[&coord].image.as_raw(), &image_before);
        assert_eq!(
            engine.cached_image(coord).unwrap().image.as_raw(),
            &image_before
        );
        assert_eq!(engine.minimap().pixel(coord), pixel_before);
        // the revert is local only
        assert_eq!(store.chunk_posts(), 1);
        assert_eq!(store.minimap_posts(), 0);
    }

    #[test]
    fn test_same_chunk_edits_are_serialised() {
        let (mut engine, store) = started();
        let coord = ChunkCoord::new(1, 1);
        engine.paint(TilePos::new(16, 16), TileId::SAND);
        engine.paint(TilePos::new(17, 16), TileId::ROCK);
        engine.paint(TilePos::new(18, 16), TileId::FOREST);
        settle(&mut engine);

        // first edit alone, then the two coalesced edits in one snapshot
        assert_eq!(store.chunk_posts(), 2);
        let stored = store.stored_chunk(coord).unwrap();
        assert_eq!(stored.get(LocalPos::new(0, 0)), TileId::SAND);
        assert_eq!(stored.get(LocalPos::new(1, 0)), TileId::ROCK);
        assert_eq!(stored.get(LocalPos::new(2, 0)), TileId::FOREST);
        assert_eq!(engine.cached_chunk(coord), Some(&stored));
    }

    #[test]
    fn test_failure_restores_last_confirmed_state() {
        let (mut engine, store) = started();
        let coord = ChunkCoord::new(1, 1);
        engine.paint(TilePos::new(16, 16), TileId::SAND);
        settle(&mut engine);
        let confirmed = engine.cached_chunk(coord).cloned().unwrap();

        store.fail_chunk_posts(true);
        engine.paint(TilePos::new(17, 16), TileId::ROCK);
        engine.paint(TilePos::new(18, 16), TileId::FOREST);
        settle(&mut engine);

        assert_eq!(engine.cached_chunk(coord), Some(&confirmed));
        assert_eq!(confirmed.get(LocalPos::new(0, 0)), TileId::SAND);
        assert_eq!(engine.minimap().pixel(coord), Some(confirmed.average_color()));
    }

    #[test]
    fn test_paint_on_unloaded_chunk_is_deferred() {
        let (mut engine, store) = engine();
        let tile = TilePos::new(5, 5);
        assert_eq!(engine.paint(tile, TileId::GRASS), PaintOutcome::Deferred);
        assert_eq!(engine.status(), MapStatus::Loading);
        settle(&mut engine);

        assert_eq!(
            engine.cached_chunk(ChunkCoord::new(0, 0)).unwrap().get(LocalPos::new(5, 5)),
            TileId::GRASS
        );
        assert_eq!(store.chunk_posts(), 1);
    }

    #[test]
    fn test_deferred_paint_dropped_on_load_failure() {
        let (mut engine, store) = engine();
        store.fail_chunk_fetches(true);
        assert_eq!(engine.paint(TilePos::new(5, 5), TileId::GRASS), PaintOutcome::Deferred);
        settle(&mut engine);
        assert_eq!(engine.status(), MapStatus::LoadFailed);
        assert!(engine.cached_chunk(ChunkCoord::new(0, 0)).is_none());
        assert_eq!(store.chunk_posts(), 0);
    }

    #[test]
    fn test_out_of_bounds_paint_is_ignored() {
        let (mut engine, store) = started();
        assert_eq!(engine.paint(TilePos::new(-1, 0), TileId::SAND), PaintOutcome::OutOfBounds);
        assert_eq!(engine.paint(TilePos::new(0, 128), TileId::SAND), PaintOutcome::OutOfBounds);
        settle(&mut engine);
        assert_eq!(store.chunk_posts(), 0);
    }

    #[test]
    fn test_clicks_ignored_while_busy() {
        let (mut engine, store) = engine();
        // first redraw still waiting on its fetches
        engine.redraw();
        engine.dispatch(MapInput::Click { x: 400.0, y: 300.0 });
        settle(&mut engine);
        assert_eq!(store.chunk_posts(), 0);

        engine.dispatch(MapInput::PanBy { dx: 1.0, dy: 0.0 });
        engine.dispatch(MapInput::Click { x: 400.0, y: 300.0 });
        engine.dispatch(MapInput::PanEnd);
        settle(&mut engine);
        assert_eq!(store.chunk_posts(), 0);

        engine.dispatch(MapInput::Click { x: 400.0, y: 300.0 });
        settle(&mut engine);
        assert_eq!(store.chunk_posts(), 1);
    }

    #[test]
    fn test_tooltip_follows_painted_tile() {
        let (mut engine, _) = started();
        engine.dispatch(MapInput::Hover { x: 400.0, y: 300.0, modifier: true });
        assert_eq!(engine.tooltip().unwrap().tile_id, TileId::DEFAULT);
        engine.dispatch(MapInput::Click { x: 400.0, y: 300.0 });
        assert_eq!(engine.tooltip().unwrap().tile_id, TileId::GRASS);
        settle(&mut engine);
    }
}
