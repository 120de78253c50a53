//! Test doubles for the engine: a recording surface and store

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use super::chunk::{Chunk, ChunkCoord};
use super::grid::GridOverlay;
use super::loader::ChunkLoader;
use super::renderer::ChunkImage;
use super::store::{ChunkStore, MemoryStore, StoreError};
use super::{DrawSurface, MapEngine};
use crate::config::{MapConfig, MinimapConfig, WorldConfig};

#[derive(Default)]
pub struct RecordingSurface {
    pub shown: HashMap<ChunkCoord, ChunkImage>,
    pub added: Vec<ChunkCoord>,
    pub removed: Vec<ChunkCoord>,
    pub grid: Option<GridOverlay>,
    pub batch_draws: usize,
}

impl DrawSurface for RecordingSurface {
    fn add_image(&mut self, image: &ChunkImage) {
        self.added.push(image.coord);
        self.shown.insert(image.coord, image.clone());
    }

    fn remove_image(&mut self, coord: ChunkCoord) {
        self.removed.push(coord);
        self.shown.remove(&coord);
    }

    fn set_grid(&mut self, grid: Option<GridOverlay>) {
        self.grid = grid;
    }

    fn batch_draw(&mut self) {
        self.batch_draws += 1;
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum StoreCall {
    FetchChunk(ChunkCoord),
    PostChunk(ChunkCoord),
    FetchMinimap,
    PostMinimap,
}

/// In-memory store that logs every call and can be told to fail
#[derive(Default)]
pub struct RecordingStore {
    inner: MemoryStore,
    calls: Mutex<Vec<StoreCall>>,
    fail_chunk_fetches: AtomicBool,
    fail_chunk_posts: AtomicBool,
    fail_minimap_fetches: AtomicBool,
    fail_minimap_posts: AtomicBool,
}

impl RecordingStore {
    fn record(&self, call: StoreCall) {
        self.calls.lock().unwrap().push(call);
    }

    fn injected(flag: &AtomicBool) -> Result<(), StoreError> {
        if flag.load(Ordering::SeqCst) {
            Err(StoreError::Status {
                endpoint: "test".into(),
                status: 503,
            })
        } else {
            Ok(())
        }
    }

    pub fn reset_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    pub fn chunk_fetches(&self, coord: ChunkCoord) -> usize {
        self.count(|call| *call == StoreCall::FetchChunk(coord))
    }

    pub fn total_chunk_fetches(&self) -> usize {
        self.count(|call| matches!(call, StoreCall::FetchChunk(_)))
    }

    pub fn chunk_posts(&self) -> usize {
        self.count(|call| matches!(call, StoreCall::PostChunk(_)))
    }

    pub fn minimap_posts(&self) -> usize {
        self.count(|call| *call == StoreCall::PostMinimap)
    }

    fn count(&self, filter: impl Fn(&StoreCall) -> bool) -> usize {
        self.calls.lock().unwrap().iter().filter(|call| filter(call)).count()
    }

    pub fn stored_chunk(&self, coord: ChunkCoord) -> Option<Chunk> {
        self.inner.fetch_chunk(coord).unwrap()
    }

    pub fn stored_minimap(&self) -> Option<String> {
        self.inner.fetch_minimap().unwrap()
    }

    pub fn seed_minimap(&self, data_url: &str) {
        self.inner.persist_minimap(data_url).unwrap();
    }

    pub fn fail_chunk_fetches(&self, fail: bool) {
        self.fail_chunk_fetches.store(fail, Ordering::SeqCst);
    }

    pub fn fail_chunk_posts(&self, fail: bool) {
        self.fail_chunk_posts.store(fail, Ordering::SeqCst);
    }

    pub fn fail_minimap_fetches(&self, fail: bool) {
        self.fail_minimap_fetches.store(fail, Ordering::SeqCst);
    }

    pub fn fail_minimap_posts(&self, fail: bool) {
        self.fail_minimap_posts.store(fail, Ordering::SeqCst);
    }
}

impl ChunkStore for RecordingStore {
    fn fetch_chunk(&self, coord: ChunkCoord) -> Result<Option<Chunk>, StoreError> {
        self.record(StoreCall::FetchChunk(coord));
        Self::injected(&self.fail_chunk_fetches)?;
        self.inner.fetch_chunk(coord)
    }

    fn persist_chunk(&self, coord: ChunkCoord, chunk: &Chunk) -> Result<(), StoreError> {
        self.record(StoreCall::PostChunk(coord));
        Self::injected(&self.fail_chunk_posts)?;
        self.inner.persist_chunk(coord, chunk)
    }

    fn fetch_minimap(&self) -> Result<Option<String>, StoreError> {
        self.record(StoreCall::FetchMinimap);
        Self::injected(&self.fail_minimap_fetches)?;
        self.inner.fetch_minimap()
    }

    fn persist_minimap(&self, data_url: &str) -> Result<(), StoreError> {
        self.record(StoreCall::PostMinimap);
        Self::injected(&self.fail_minimap_posts)?;
        self.inner.persist_minimap(data_url)
    }
}

/// 128x128 tiles: 8x8 chunks, 3072 world pixels a side
pub fn test_world() -> WorldConfig {
    WorldConfig {
        pixel_size: 24,
        width_in_tiles: 128,
        height_in_tiles: 128,
    }
}

pub fn test_config() -> MapConfig {
    MapConfig {
        world: test_world(),
        minimap: MinimapConfig {
            flush_delay: Duration::ZERO,
            build_concurrency: 8,
        },
        ..MapConfig::default()
    }
}

/// Engine with an 800x600 viewport centred on the test world
pub fn engine() -> (MapEngine<RecordingSurface>, Arc<RecordingStore>) {
    let store = Arc::new(RecordingStore::default());
    let loader = ChunkLoader::spawn(store.clone());
    let engine = MapEngine::new(test_config(), loader, RecordingSurface::default());
    (engine, store)
}

/// Pump `update` until nothing is in flight
pub fn settle(engine: &mut MapEngine<RecordingSurface>) {
    let deadline = Instant::now() + Duration::from_secs(10);
    loop {
        engine.update();
        if engine.is_idle() {
            return;
        }
        assert!(Instant::now() < deadline, "engine did not settle");
        std::thread::sleep(Duration::from_millis(1));
    }
}
