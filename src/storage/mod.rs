//! # Storage Layer
//!
//! The disk side of the swap: a flat, headerless scratch file whose layout
//! exists only in memory, an allocator that parcels it out, and the writer
//! thread that applies mutations.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │ service   SwapService: composition + singleton       │
//! ├──────────────┬───────────────────┬───────────────────┤
//! │ gaps         │ writer            │ swap_file         │
//! │ free-space   │ write-back queue  │ cursored file     │
//! │ allocator    │ + writer thread   │ halves            │
//! └──────────────┴───────────────────┴───────────────────┘
//! ```
//!
//! The file is not self-describing and not meant to survive the process; on
//! shutdown it is removed outright.

pub mod gaps;
pub mod service;
pub mod swap_file;
pub(crate) mod writer;

pub use gaps::{Allocator, Gap};
pub use service::{SwapService, SwapStats};
