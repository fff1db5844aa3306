//! # Swap Configuration Constants
//!
//! This module centralizes the tuning constants for the swap cache. Constants
//! that depend on each other are co-located and their relationships documented
//! so that changing one does not silently invalidate another.
//!
//! ## Dependency Graph
//!
//! ```text
//! GROW_BATCH_TILES (32)
//!       │
//!       ├─> file growth step: when no gap fits a tile, the file grows by
//!       │   GROW_BATCH_TILES * tile_size, amortizing the resize cost across
//!       │   a whole batch of future allocations.
//!       │
//!       └─> shrink threshold: the file is truncated only once the gap
//!           touching end-of-file exceeds GROW_BATCH_TILES * tile_size.
//!           Using the same constant on both sides forms a hysteresis band:
//!           a workload oscillating around a size boundary never triggers
//!           alternating grow/shrink truncations.
//!
//! DEFAULT_WRITE_QUEUE_LIMIT (1000)
//!       │
//!       └─> backpressure: producers enqueueing writes block once the queue
//!           depth exceeds this limit, bounding the memory held by pending
//!           tile copies to roughly limit * tile_size bytes.
//! ```

/// Number of tiles the swap file grows or keeps as slack when resizing.
///
/// Growth allocates one tile and records the remaining
/// `GROW_BATCH_TILES - 1` tiles worth of space as a trailing gap; shrink
/// leaves exactly this many tiles of slack behind the last live byte.
pub const GROW_BATCH_TILES: u64 = 32;

/// Default bound on the write-back queue depth before producers block.
pub const DEFAULT_WRITE_QUEUE_LIMIT: usize = 1000;

/// Suffix of the per-process scratch file created in the swap directory.
pub const SWAP_FILE_SUFFIX: &str = "-shared.swap";
