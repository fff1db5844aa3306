//! # Swap Backend Facade
//!
//! The four-operation tile-storage contract (get/set/void/exists) over the
//! shared [`SwapService`], plus the uniform six-command dispatch the owning
//! buffer layer speaks to every tile backend.
//!
//! ## Per-Entry State Machine
//!
//! ```text
//! Absent ──SET──► Queued ──writer drains──► OnDisk ──SET──► Queued (merged)
//!    ▲                                                          │
//!    └──────────────────────── VOID ◄───────────────────────────┘
//! ```
//!
//! ## Single-Mutator Contract
//!
//! The tile index is not internally locked. Mutating operations take
//! `&mut self` and reads take `&self`, so the borrow checker enforces what
//! the original design only documented: callers serialize SET/VOID per
//! backend, while any number of backends (each on its own thread) share the
//! service underneath.
//!
//! ## Degradation, Not Termination
//!
//! The swap is a secondary cache. I/O failures are warned and surfaced as a
//! miss or a silent no-op; a GET that cannot be satisfied is
//! indistinguishable from "not cached", and nothing here panics on a bad
//! disk.

use std::sync::Arc;

use hashbrown::HashMap;
use tracing::{debug, warn};

use crate::storage::writer::JobKey;
use crate::storage::SwapService;
use crate::tile::{TileCoord, TileGeometry};

/// A tile's location in the swap file.
#[derive(Debug)]
struct SwapEntry {
    offset: u64,
}

/// The uniform command protocol shared by all tile-storage backends.
#[derive(Debug, Clone, Copy)]
pub enum TileCommand<'a> {
    Get,
    Set(&'a [u8]),
    Void,
    Exists,
    /// Background maintenance hint; a no-op for the swap backend.
    Idle,
    /// Flush-to-stable-storage hint; a no-op, the swap is not durable.
    Flush,
}

/// Reply to a [`TileCommand`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TileReply {
    Tile(Vec<u8>),
    Exists(bool),
    Miss,
    Done,
}

/// Tile backend that spills tiles to the shared swap file.
#[derive(Debug)]
pub struct SwapBackend {
    id: u64,
    tile_size: usize,
    index: HashMap<TileCoord, SwapEntry>,
    service: Arc<SwapService>,
}

impl SwapBackend {
    pub fn new(service: Arc<SwapService>, geometry: TileGeometry) -> Self {
        Self {
            id: service.register_backend(),
            tile_size: geometry.tile_size(),
            index: HashMap::new(),
            service,
        }
    }

    /// Byte size every tile of this backend occupies.
    pub fn tile_size(&self) -> usize {
        self.tile_size
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    fn key(&self, coord: TileCoord) -> JobKey {
        JobKey {
            backend: self.id,
            coord,
        }
    }

    /// Fetch a tile's bytes; `None` both for absent tiles and for tiles the
    /// swap failed to read back.
    pub fn get(&self, x: i32, y: i32, z: i32) -> Option<Vec<u8>> {
        let coord = TileCoord::new(x, y, z);
        let entry = self.index.get(&coord)?;

        let mut data = vec![0u8; self.tile_size];
        match self.service.read_tile(self.key(coord), entry.offset, &mut data) {
            Ok(()) => Some(data),
            Err(err) => {
                warn!(coord = %coord, "swap read failed: {err:#}");
                None
            }
        }
    }

    /// Store a tile. Allocates swap space on first SET for a coordinate;
    /// subsequent SETs before the writer drains merge into the queued copy.
    pub fn set(&mut self, x: i32, y: i32, z: i32, data: &[u8]) {
        if data.len() != self.tile_size {
            warn!(
                "tile is {} bytes, backend stores {} byte tiles; dropped",
                data.len(),
                self.tile_size
            );
            return;
        }

        let coord = TileCoord::new(x, y, z);
        let offset = match self.index.get(&coord) {
            Some(entry) => entry.offset,
            None => {
                let offset = self.service.allocate(self.tile_size as u64);
                self.index.insert(coord, SwapEntry { offset });
                offset
            }
        };

        self.service.enqueue_write(self.key(coord), offset, data);
    }

    /// Drop a tile: cancel its pending write, release its space, forget it.
    pub fn void(&mut self, x: i32, y: i32, z: i32) {
        let coord = TileCoord::new(x, y, z);
        if let Some(entry) = self.index.remove(&coord) {
            debug!(coord = %coord, "void tile");
            self.service.cancel_write(self.key(coord));
            self.service.release(entry.offset, self.tile_size as u64);
        }
    }

    pub fn exists(&self, x: i32, y: i32, z: i32) -> bool {
        self.index.contains_key(&TileCoord::new(x, y, z))
    }

    /// Uniform dispatch used by the owning buffer layer.
    pub fn command(&mut self, command: TileCommand<'_>, x: i32, y: i32, z: i32) -> TileReply {
        match command {
            TileCommand::Get => match self.get(x, y, z) {
                Some(data) => TileReply::Tile(data),
                None => TileReply::Miss,
            },
            TileCommand::Set(data) => {
                self.set(x, y, z, data);
                TileReply::Done
            }
            TileCommand::Void => {
                self.void(x, y, z);
                TileReply::Done
            }
            TileCommand::Exists => TileReply::Exists(self.exists(x, y, z)),
            TileCommand::Idle | TileCommand::Flush => TileReply::Done,
        }
    }

    /// Destroy every live entry, releasing all swap space this backend held.
    pub fn close(&mut self) {
        for (coord, entry) in self.index.drain() {
            self.service.cancel_write(JobKey {
                backend: self.id,
                coord,
            });
            self.service.release(entry.offset, self.tile_size as u64);
        }
    }
}

impl Drop for SwapBackend {
    fn drop(&mut self) {
        self.close();
    }
}
