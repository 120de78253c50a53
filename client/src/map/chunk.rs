//! Chunk grid, typed chunk coordinates, and chunk colour aggregation

use std::fmt;

use serde::{Deserialize, Serialize};

use super::tile::{TileId, tile_color};

/// Tiles along one edge of a chunk
pub const CHUNK_SIZE: usize = 16;
pub const CHUNK_CELLS: usize = CHUNK_SIZE * CHUNK_SIZE;

/// Chunk coordinate, used as the key of both caches and of the view registry.
/// Serialises on the wire as `"cx,cy"`.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct ChunkCoord {
    pub cx: i32,
    pub cy: i32,
}

impl ChunkCoord {
    pub fn new(cx: i32, cy: i32) -> Self {
        Self { cx, cy }
    }

    /// Store key, `"cx,cy"`
    pub fn key(&self) -> String {
        self.to_string()
    }

    /// Top-left corner in world pixels
    pub fn world_origin(&self, pixel_size: u32) -> (f64, f64) {
        let chunk_pixels = (CHUNK_SIZE as u32 * pixel_size) as f64;
        (self.cx as f64 * chunk_pixels, self.cy as f64 * chunk_pixels)
    }
}

impl fmt::Display for ChunkCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.cx, self.cy)
    }
}

/// Cell offset inside a chunk
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq)]
pub struct LocalPos {
    pub x: usize,
    pub y: usize,
}

impl LocalPos {
    pub fn new(x: usize, y: usize) -> Self {
        debug_assert!(x < CHUNK_SIZE && y < CHUNK_SIZE);
        Self { x, y }
    }
}

/// CHUNK_SIZE x CHUNK_SIZE grid of tile ids, stored row-major (`cells[y][x]`).
/// On the wire this is a JSON array of rows.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Chunk {
    cells: [[TileId; CHUNK_SIZE]; CHUNK_SIZE],
}

impl Chunk {
    pub fn filled(tile: TileId) -> Self {
        Self {
            cells: [[tile; CHUNK_SIZE]; CHUNK_SIZE],
        }
    }

    pub fn get(&self, pos: LocalPos) -> TileId {
        self.cells[pos.y][pos.x]
    }

    pub fn set(&mut self, pos: LocalPos, tile: TileId) {
        self.cells[pos.y][pos.x] = tile;
    }

    /// Iterate `(pos, tile)` in row-major order
    pub fn cells(&self) -> impl Iterator<Item = (LocalPos, TileId)> + '_ {
        self.cells.iter().enumerate().flat_map(|(y, row)| {
            row.iter()
                .enumerate()
                .map(move |(x, tile)| (LocalPos { x, y }, *tile))
        })
    }

    /// Channel-wise mean of the legend colours of all cells, rounded half up
    pub fn average_color(&self) -> [u8; 3] {
        let mut totals = [0u32; 3];
        for (_, tile) in self.cells() {
            let rgb = tile_color(tile);
            for (total, channel) in totals.iter_mut().zip(rgb) {
                *total += channel as u32;
            }
        }
        let n = CHUNK_CELLS as u32;
        totals.map(|total| ((total * 2 + n) / (2 * n)) as u8)
    }
}

impl Default for Chunk {
    /// A chunk that was never written: all default tiles
    fn default() -> Self {
        Self::filled(TileId::DEFAULT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coord_key_and_origin() {
        let coord = ChunkCoord::new(12, -3);
        assert_eq!(coord.key(), "12,-3");
        assert_eq!(coord.world_origin(24), (4608.0, -1152.0));
    }

    #[test]
    fn test_default_chunk_is_deep_water() {
        let chunk = Chunk::default();
        assert_eq!(chunk.cells().count(), CHUNK_CELLS);
        assert!(chunk.cells().all(|(_, tile)| tile == TileId::DEEP_WATER));
    }

    #[test]
    fn test_average_color_uniform() {
        let chunk = Chunk::filled(TileId::GRASS);
        assert_eq!(chunk.average_color(), TileId::GRASS.legend().rgb);
    }

    #[test]
    fn test_average_color_weighted_mean() {
        // K cells of C1, (256 - K) of C2
        let k = 100u32;
        let mut chunk = Chunk::filled(TileId::SAND);
        for (i, (pos, _)) in Chunk::default().cells().enumerate() {
            if (i as u32) < k {
                chunk.set(pos, TileId::PLAYER_RED);
            }
        }
        let c1 = TileId::PLAYER_RED.legend().rgb;
        let c2 = TileId::SAND.legend().rgb;
        let expected: Vec<u8> = (0..3)
            .map(|i| {
                let mean = (k as f64 * c1[i] as f64 + (256 - k) as f64 * c2[i] as f64) / 256.0;
                mean.round() as u8
            })
            .collect();
        assert_eq!(chunk.average_color().to_vec(), expected);
    }

    #[test]
    fn test_unknown_ids_average_as_default() {
        let mut chunk = Chunk::default();
        chunk.set(LocalPos::new(3, 4), TileId(99));
        assert_eq!(chunk.average_color(), Chunk::default().average_color());
    }

    #[test]
    fn test_chunk_json_is_grid_of_rows() {
        let mut chunk = Chunk::default();
        chunk.set(LocalPos::new(1, 0), TileId::GRASS);
        let json = serde_json::to_string(&chunk).unwrap();
        assert!(json.starts_with("[[0,3,0"));
        let parsed: Chunk = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, chunk);
    }

    #[test]
    fn test_malformed_grid_rejected() {
        assert!(serde_json::from_str::<Chunk>("[[0,1],[2,3]]").is_err());
        assert!(serde_json::from_str::<Chunk>("{\"a\":1}").is_err());
    }
}
