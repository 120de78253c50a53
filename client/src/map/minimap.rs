//! One-pixel-per-chunk overview of the whole world
//!
//! The raster is loaded from the store when present, otherwise generated
//! once by sampling every chunk. Edits patch single pixels; the whole image
//! is written back as a PNG data URL after a quiet period.

use std::collections::HashSet;
use std::io::Cursor;
use std::time::Duration;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use image::{ImageFormat, Rgba, RgbaImage};
use web_time::Instant;

use super::chunk::{Chunk, ChunkCoord};
use super::loader::SyncTicket;
use super::store::StoreError;
use super::tile::{TileId, tile_color};
use super::{DrawSurface, MapEngine, MapFailure};
use crate::config::WorldConfig;

const DATA_URL_PREFIX: &str = "data:image/png;base64,";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MinimapPhase {
    /// Placeholder raster, nothing requested yet
    Unloaded,
    Fetching,
    Building,
    Ready,
    Failed,
}

/// Generation progress over every chunk in row-major order
#[derive(Debug)]
struct BuildCursor {
    next: u64,
    total: u64,
    outstanding: HashSet<ChunkCoord>,
}

impl BuildCursor {
    fn is_done(&self) -> bool {
        self.next >= self.total && self.outstanding.is_empty()
    }
}

pub struct Minimap {
    raster: RgbaImage,
    phase: MinimapPhase,
    build: Option<BuildCursor>,
    /// Bumped on every pixel change so hosts know when to re-upload
    revision: u64,
    /// Time of the latest change not yet written to the store
    dirty_since: Option<Instant>,
    saving: Option<SyncTicket>,
}

impl Minimap {
    /// Placeholder filled with the default tile colour
    pub fn new(world: &WorldConfig) -> Self {
        let [r, g, b] = tile_color(TileId::DEFAULT);
        Self {
            raster: RgbaImage::from_pixel(
                world.width_in_chunks().max(1),
                world.height_in_chunks().max(1),
                Rgba([r, g, b, 255]),
            ),
            phase: MinimapPhase::Unloaded,
            build: None,
            revision: 0,
            dirty_since: None,
            saving: None,
        }
    }

    pub fn width(&self) -> u32 {
        self.raster.width()
    }

    pub fn height(&self) -> u32 {
        self.raster.height()
    }

    pub fn image(&self) -> &RgbaImage {
        &self.raster
    }

    pub fn phase(&self) -> MinimapPhase {
        self.phase
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn is_ready(&self) -> bool {
        self.phase == MinimapPhase::Ready
    }

    pub fn is_generating(&self) -> bool {
        matches!(self.phase, MinimapPhase::Fetching | MinimapPhase::Building)
    }

    pub fn is_saving(&self) -> bool {
        self.saving.is_some()
    }

    /// A write is owed and will happen once the quiet period passes
    pub fn needs_flush(&self) -> bool {
        self.dirty_since.is_some() && self.is_ready()
    }

    pub fn pixel(&self, coord: ChunkCoord) -> Option<[u8; 3]> {
        let (x, y) = self.position(coord)?;
        let Rgba([r, g, b, _]) = *self.raster.get_pixel(x, y);
        Some([r, g, b])
    }

    fn position(&self, coord: ChunkCoord) -> Option<(u32, u32)> {
        let x = u32::try_from(coord.cx).ok()?;
        let y = u32::try_from(coord.cy).ok()?;
        (x < self.raster.width() && y < self.raster.height()).then_some((x, y))
    }

    /// Overwrite one chunk's pixel with its average colour
    pub fn patch_pixel(&mut self, coord: ChunkCoord, chunk: &Chunk) -> bool {
        let Some((x, y)) = self.position(coord) else {
            return false;
        };
        let [r, g, b] = chunk.average_color();
        self.raster.put_pixel(x, y, Rgba([r, g, b, 255]));
        self.revision += 1;
        true
    }

    /// Restart the quiet period
    pub fn mark_dirty(&mut self, now: Instant) {
        self.dirty_since = Some(now);
    }

    fn flush_due(&self, now: Instant, delay: Duration) -> bool {
        if !self.is_ready() || self.saving.is_some() {
            return false;
        }
        self.dirty_since
            .is_some_and(|since| now.saturating_duration_since(since) >= delay)
    }

    /// PNG data URL of the whole raster
    pub fn to_data_url(&self) -> Result<String, StoreError> {
        encode_data_url(&self.raster)
    }

    /// Replace the raster with a stored one of the same dimensions
    pub fn load_data_url(&mut self, data_url: &str) -> Result<(), StoreError> {
        let image = decode_data_url(data_url)?;
        if image.dimensions() != self.raster.dimensions() {
            return Err(StoreError::Image(format!(
                "stored minimap is {}x{}, world needs {}x{}",
                image.width(),
                image.height(),
                self.raster.width(),
                self.raster.height()
            )));
        }
        self.raster = image;
        self.revision += 1;
        Ok(())
    }
}

pub fn encode_data_url(image: &RgbaImage) -> Result<String, StoreError> {
    let mut bytes = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .map_err(|e| StoreError::Image(e.to_string()))?;
    Ok(format!("{DATA_URL_PREFIX}{}", STANDARD.encode(&bytes)))
}

pub fn decode_data_url(data_url: &str) -> Result<RgbaImage, StoreError> {
    let (header, payload) = data_url
        .split_once(',')
        .ok_or_else(|| StoreError::Image("not a data URL".into()))?;
    if !header.starts_with("data:image/") || !header.ends_with(";base64") {
        return Err(StoreError::Image(format!("unsupported data URL header {header:?}")));
    }
    let bytes = STANDARD
        .decode(payload.trim())
        .map_err(|e| StoreError::Image(e.to_string()))?;
    let image = image::load_from_memory_with_format(&bytes, ImageFormat::Png)
        .map_err(|e| StoreError::Image(e.to_string()))?;
    Ok(image.to_rgba8())
}

impl<S: DrawSurface> MapEngine<S> {
    pub(super) fn load_minimap(&mut self) {
        if self.minimap.phase != MinimapPhase::Unloaded {
            return;
        }
        self.minimap.phase = MinimapPhase::Fetching;
        self.loader.request_minimap();
    }

    pub(super) fn on_minimap_fetched(&mut self, result: Result<Option<String>, StoreError>) {
        if self.minimap.phase != MinimapPhase::Fetching {
            log::warn!("Ignoring unexpected minimap response");
            return;
        }
        match result {
            Ok(Some(data_url)) => match self.minimap.load_data_url(&data_url) {
                Ok(()) => {
                    log::info!(
                        "Loaded minimap {}x{} from store",
                        self.minimap.width(),
                        self.minimap.height()
                    );
                    self.minimap.phase = MinimapPhase::Ready;
                    self.repatch_known_chunks();
                }
                Err(e) => {
                    log::warn!("Stored minimap is unusable, regenerating: {}", e);
                    self.begin_minimap_build();
                }
            },
            Ok(None) => self.begin_minimap_build(),
            Err(e) => {
                log::warn!("Failed to fetch minimap: {}", e);
                self.minimap.phase = MinimapPhase::Failed;
                self.failure = Some(MapFailure::Load);
            }
        }
    }

    /// Local chunk data is newer than a stored raster
    fn repatch_known_chunks(&mut self) {
        let mut known: Vec<ChunkCoord> = self.chunks.keys().copied().collect();
        known.extend(self.edits.tracked());
        for coord in known {
            if let Some(chunk) = self.cached_chunk(coord).cloned() {
                self.minimap.patch_pixel(coord, &chunk);
            }
        }
    }

    fn begin_minimap_build(&mut self) {
        let total = self.minimap.width() as u64 * self.minimap.height() as u64;
        log::info!("Generating minimap from {} chunks", total);
        self.minimap.phase = MinimapPhase::Building;
        self.minimap.build = Some(BuildCursor {
            next: 0,
            total,
            outstanding: HashSet::new(),
        });
    }

    /// Keep up to `build_concurrency` chunk fetches in flight for generation
    pub(super) fn step_minimap_build(&mut self) {
        let Some(mut cursor) = self.minimap.build.take() else {
            return;
        };
        let concurrency = self.config.minimap.build_concurrency.max(1);
        let width = self.minimap.width() as u64;

        while cursor.outstanding.len() < concurrency && cursor.next < cursor.total {
            let coord = ChunkCoord::new((cursor.next % width) as i32, (cursor.next / width) as i32);
            cursor.next += 1;
            match self.cached_chunk(coord).cloned() {
                Some(chunk) => {
                    self.minimap.patch_pixel(coord, &chunk);
                }
                None => {
                    self.loader.request_chunk(coord);
                    cursor.outstanding.insert(coord);
                }
            }
        }

        if cursor.is_done() {
            self.finish_minimap_build();
        } else {
            self.minimap.build = Some(cursor);
        }
    }

    pub(super) fn on_build_chunk_ready(&mut self, coord: ChunkCoord) {
        let awaited = self
            .minimap
            .build
            .as_mut()
            .is_some_and(|cursor| cursor.outstanding.remove(&coord));
        if !awaited {
            return;
        }
        if let Some(chunk) = self.cached_chunk(coord).cloned() {
            self.minimap.patch_pixel(coord, &chunk);
        }
    }

    pub(super) fn on_build_chunk_failed(&mut self, coord: ChunkCoord) {
        let awaited = self
            .minimap
            .build
            .as_ref()
            .is_some_and(|cursor| cursor.outstanding.contains(&coord));
        if awaited {
            log::warn!("Minimap generation aborted at chunk {}", coord);
            self.minimap.build = None;
            self.minimap.phase = MinimapPhase::Failed;
        }
    }

    fn finish_minimap_build(&mut self) {
        log::info!("Minimap generated");
        self.minimap.phase = MinimapPhase::Ready;
        self.persist_minimap();
    }

    /// Write the raster once it has been quiet for `flush_delay`
    pub(super) fn flush_minimap(&mut self, now: Instant) {
        if self.minimap.flush_due(now, self.config.minimap.flush_delay) {
            self.persist_minimap();
        }
    }

    fn persist_minimap(&mut self) {
        self.minimap.dirty_since = None;
        match self.minimap.to_data_url() {
            Ok(data_url) => {
                log::debug!("Saving minimap ({} bytes)", data_url.len());
                self.minimap.saving = Some(self.loader.persist_minimap(data_url));
            }
            Err(e) => {
                log::error!("Failed to encode minimap: {}", e);
                self.failure = Some(MapFailure::Save);
            }
        }
    }

    pub(super) fn on_minimap_persisted(&mut self, ticket: SyncTicket, result: Result<(), StoreError>) {
        if self.minimap.saving != Some(ticket) {
            log::warn!("Ignoring stale minimap save {:?}", ticket);
            return;
        }
        self.minimap.saving = None;
        match result {
            Ok(()) => log::debug!("Minimap saved"),
            Err(e) => {
                log::warn!("Failed to save minimap: {}", e);
                self.failure = Some(MapFailure::Save);
                self.notify("Failed to save the minimap. It will be saved with the next change.".into());
            }
        }
    }
}
