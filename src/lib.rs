//! # tileswap — Disk-Backed Tile Cache
//!
//! A swap layer that lets an image-processing system work on datasets larger
//! than memory: fixed-size pixel tiles, keyed by `(x, y, z)` with `z` the
//! mip/zoom level, spill transparently to a per-process scratch file.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │        Owning buffer layer (external)       │
//! │   GET / SET / VOID / EXISTS / IDLE / FLUSH  │
//! ├─────────────────────────────────────────────┤
//! │  SwapBackend (one per buffer)               │
//! │    tile index: TileCoord -> swap offset     │
//! ├─────────────────────────────────────────────┤
//! │  SwapService (one per process)              │
//! │    free-space allocator │ write-back queue  │
//! ├─────────────────────────┴───────────────────┤
//! │  <swap_dir>/<pid>-shared.swap               │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! One writer thread serializes all disk writes and truncations; callers
//! enqueue and move on, throttled only when the queue passes its depth
//! limit. Reads check the queue first so a SET is visible to GET before the
//! bytes ever reach disk.
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use tileswap::{SwapBackend, SwapConfig, SwapService, TileGeometry};
//!
//! # fn main() -> eyre::Result<()> {
//! let service = Arc::new(SwapService::new(&SwapConfig::new("/tmp"))?);
//! let mut backend = SwapBackend::new(service, TileGeometry::new(128, 64, 16));
//!
//! let tile = vec![0u8; backend.tile_size()];
//! backend.set(0, 0, 0, &tile);
//! assert!(backend.exists(0, 0, 0));
//! assert_eq!(backend.get(0, 0, 0), Some(tile));
//! # Ok(())
//! # }
//! ```
//!
//! Applications that want one shared engine use the explicit singleton in
//! [`storage::service`]: `init` once, `global` everywhere, `shutdown` at
//! exit.
//!
//! ## What This Is Not
//!
//! The swap is a reconstructible cache, not a system of record: no
//! durability across restarts, no transactions, no multi-process sharing.
//! I/O failures degrade to misses with a logged warning; they never abort
//! the process.

pub mod backend;
pub mod config;
pub mod storage;
pub mod tile;

pub use backend::{SwapBackend, TileCommand, TileReply};
pub use config::SwapConfig;
pub use storage::{SwapService, SwapStats};
pub use tile::{TileCoord, TileGeometry};
