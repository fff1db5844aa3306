//! # Tile Addressing
//!
//! Tiles are fixed-size rectangular pixel blocks addressed by a coordinate
//! triple `(x, y, z)` where `z` is the mip/zoom level. The swap layer treats
//! tile contents as opaque bytes; the only geometry it needs is the byte size
//! of one tile, derived here from the pixel format of the owning buffer.
//!
//! ## Hashing
//!
//! [`TileCoord`] hashes by interleaving the 10 least significant bits of each
//! component (Morton / Z-order). Tile consumers walk rasters and quad-tree
//! pyramids, so nearby coordinates spread across nearby buckets. This is a
//! performance nicety only: equality is an exact component comparison and
//! nothing depends on the distribution of the hash.

use std::fmt;
use std::hash::{Hash, Hasher};

/// Address of one tile: column, row, and mip/zoom level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileCoord {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl TileCoord {
    pub fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    /// Morton key: the low 10 bits of x, y and z interleaved into 30 bits.
    pub fn zorder_key(self) -> u32 {
        let mut key = 0u32;
        for i in (0..10).rev() {
            key = (key << 1) | ((self.x >> i) & 1) as u32;
            key = (key << 1) | ((self.y >> i) & 1) as u32;
            key = (key << 1) | ((self.z >> i) & 1) as u32;
        }
        key
    }
}

impl Hash for TileCoord {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u32(self.zorder_key());
    }
}

impl fmt::Display for TileCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}, {}, {}", self.x, self.y, self.z)
    }
}

/// Pixel geometry of the tiles a backend stores.
///
/// The swap layer never inspects pixel data; geometry exists solely to fix
/// the byte size every entry of that backend occupies in the scratch file.
#[derive(Debug, Clone, Copy)]
pub struct TileGeometry {
    pub tile_width: u32,
    pub tile_height: u32,
    /// Bytes per pixel of the configured pixel format.
    pub bytes_per_pixel: u32,
}

impl TileGeometry {
    pub fn new(tile_width: u32, tile_height: u32, bytes_per_pixel: u32) -> Self {
        Self {
            tile_width,
            tile_height,
            bytes_per_pixel,
        }
    }

    /// Byte size of one tile.
    pub fn tile_size(&self) -> usize {
        self.tile_width as usize * self.tile_height as usize * self.bytes_per_pixel as usize
    }
}
