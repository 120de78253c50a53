//! Tile ids, the static tile legend, and world tile positions

use std::fmt;

use serde::{Deserialize, Serialize};

use super::chunk::{CHUNK_SIZE, ChunkCoord, LocalPos};

/// Legend id stored in every chunk cell
#[derive(Clone, Copy, Debug, Default, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TileId(pub i64);

impl TileId {
    pub const DEEP_WATER: TileId = TileId(0);
    pub const WATER: TileId = TileId(1);
    pub const SAND: TileId = TileId(2);
    pub const GRASS: TileId = TileId(3);
    pub const FOREST: TileId = TileId(4);
    pub const ROCK: TileId = TileId(5);
    pub const PLAYER_RED: TileId = TileId(6);

    /// Tile used for cells of chunks that were never written
    pub const DEFAULT: TileId = TileId::DEEP_WATER;

    /// Legend entry, falling back to the default tile for unknown ids
    pub fn legend(self) -> &'static LegendEntry {
        lookup(self).unwrap_or(&LEGEND[0])
    }

    pub fn is_known(self) -> bool {
        lookup(self).is_some()
    }
}

impl fmt::Display for TileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One row of the tile legend
#[derive(Debug, PartialEq, Eq)]
pub struct LegendEntry {
    pub id: TileId,
    pub name: &'static str,
    pub hex: &'static str,
    pub rgb: [u8; 3],
}

const fn entry(id: i64, name: &'static str, hex: &'static str) -> LegendEntry {
    LegendEntry {
        id: TileId(id),
        name,
        hex,
        rgb: parse_hex(hex),
    }
}

/// Process-wide legend; the first row is the default tile.
pub static LEGEND: [LegendEntry; 7] = [
    entry(0, "Deep Water", "#2980b9"),
    entry(1, "Water", "#3498db"),
    entry(2, "Sand", "#f1c40f"),
    entry(3, "Grass", "#2ecc71"),
    entry(4, "Forest", "#16a085"),
    entry(5, "Rock", "#95a5a6"),
    entry(6, "Player Red", "#e74c3c"),
];

pub fn lookup(id: TileId) -> Option<&'static LegendEntry> {
    LEGEND.iter().find(|entry| entry.id == id)
}

/// Colour for a stored id; unknown ids render as the default tile
pub fn tile_color(id: TileId) -> [u8; 3] {
    id.legend().rgb
}

/// Parse `#rrggbb` at compile time
const fn parse_hex(hex: &str) -> [u8; 3] {
    let bytes = hex.as_bytes();
    assert!(bytes.len() == 7 && bytes[0] == b'#', "legend colours are #rrggbb");
    [
        hex_byte(bytes[1], bytes[2]),
        hex_byte(bytes[3], bytes[4]),
        hex_byte(bytes[5], bytes[6]),
    ]
}

const fn hex_byte(hi: u8, lo: u8) -> u8 {
    hex_digit(hi) * 16 + hex_digit(lo)
}

const fn hex_digit(digit: u8) -> u8 {
    match digit {
        b'0'..=b'9' => digit - b'0',
        b'a'..=b'f' => digit - b'a' + 10,
        b'A'..=b'F' => digit - b'A' + 10,
        _ => panic!("invalid hex digit in legend colour"),
    }
}

/// Integer tile position in the world grid
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq)]
pub struct TilePos {
    pub x: i64,
    pub y: i64,
}

impl TilePos {
    pub fn new(x: i64, y: i64) -> Self {
        Self { x, y }
    }

    /// Tile containing a world pixel position
    pub fn from_world(world_x: f64, world_y: f64, pixel_size: u32) -> Self {
        let size = pixel_size as f64;
        Self {
            x: (world_x / size).floor() as i64,
            y: (world_y / size).floor() as i64,
        }
    }

    /// Owning chunk and in-chunk offset
    pub fn split(&self) -> (ChunkCoord, LocalPos) {
        let size = CHUNK_SIZE as i64;
        let coord = ChunkCoord::new(self.x.div_euclid(size) as i32, self.y.div_euclid(size) as i32);
        let local = LocalPos::new(self.x.rem_euclid(size) as usize, self.y.rem_euclid(size) as usize);
        (coord, local)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_legend_colours_parse() {
        assert_eq!(TileId::DEEP_WATER.legend().rgb, [0x29, 0x80, 0xb9]);
        assert_eq!(TileId::GRASS.legend().rgb, [0x2e, 0xcc, 0x71]);
        assert_eq!(TileId::PLAYER_RED.legend().hex, "#e74c3c");
    }

    #[test]
    fn test_unknown_id_falls_back_to_default() {
        let unknown = TileId(200);
        assert!(!unknown.is_known());
        assert_eq!(unknown.legend().name, "Deep Water");
        assert_eq!(tile_color(unknown), tile_color(TileId::DEFAULT));
    }

    #[test]
    fn test_legend_ids_are_unique_and_ordered() {
        for (index, entry) in LEGEND.iter().enumerate() {
            assert_eq!(entry.id, TileId(index as i64));
        }
    }

    #[test]
    fn test_tile_split() {
        let (coord, local) = TilePos::new(5, 5).split();
        assert_eq!(coord, ChunkCoord::new(0, 0));
        assert_eq!(local, LocalPos::new(5, 5));

        let (coord, local) = TilePos::new(33, 17).split();
        assert_eq!(coord, ChunkCoord::new(2, 1));
        assert_eq!(local, LocalPos::new(1, 1));
    }

    #[test]
    fn test_tile_from_world_floors_negative() {
        assert_eq!(TilePos::from_world(-1.0, 23.9, 24), TilePos::new(-1, 0));
        assert_eq!(TilePos::from_world(48.0, 0.0, 24), TilePos::new(2, 0));
    }
}
