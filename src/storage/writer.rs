//! # Write-Back Queue & Writer Thread
//!
//! All disk mutations funnel through one dedicated thread that drains a FIFO
//! queue. Callers enqueue and return without blocking on I/O, except for
//! backpressure once the queue depth passes the configured limit.
//!
//! ## Queue Shape
//!
//! ```text
//! Caller threads ──► ops: VecDeque<QueuedOp>            (FIFO order)
//!                    pending: HashMap<JobKey, WriteJob> (payloads)
//!                    in_progress: Option<Arc<WriteJob>> (at most one)
//!                                   │
//!                                   ▼
//!                          writer thread ──► swap file
//! ```
//!
//! The FIFO holds lightweight markers; write payloads live in `pending`,
//! keyed by backend and coordinate. The split buys three behaviors the rest
//! of the swap layer depends on:
//!
//! - **Merge on re-SET**: a second SET before drain overwrites the pending
//!   buffer in place instead of enqueueing a duplicate, so at most one write
//!   is ever pending per coordinate.
//! - **Cancellation on VOID**: removing the pending payload neutralizes the
//!   queued marker; when the writer pops it and finds no payload, the
//!   operation is a no-op. Stale bytes can never land at an offset that has
//!   been released and reused.
//! - **Read-your-writes**: GET copies straight out of `pending` or the
//!   in-progress job, because the file may not have caught up yet.
//!
//! `Truncate` markers carry no payload at all: the writer re-reads the shared
//! total at execution time, so a run of queued truncations collapses to the
//! latest known size.
//!
//! ## Shutdown
//!
//! The writer exits as soon as the stop flag is raised, without draining
//! whatever is still queued. The swap is a reconstructible cache, so losing
//! queued writes at teardown costs nothing; the service logs a warning if
//! the queue was not empty.

use std::collections::VecDeque;
use std::sync::Arc;

use hashbrown::HashMap;
use tracing::{trace, warn};

use super::service::Shared;
use super::swap_file::FileHalf;
use crate::tile::TileCoord;

/// Identity of a pending write: which backend, which tile.
///
/// Coordinates alone are not unique because every backend facade shares this
/// one queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct JobKey {
    pub backend: u64,
    pub coord: TileCoord,
}

/// A pending tile write: target offset plus a private copy of the bytes.
#[derive(Debug)]
pub(crate) struct WriteJob {
    pub key: JobKey,
    pub offset: u64,
    pub data: Vec<u8>,
}

/// FIFO markers drained by the writer thread.
#[derive(Debug)]
pub(crate) enum QueuedOp {
    /// Write the pending payload for this key, if it still exists.
    Write(JobKey),
    /// Resize the file to the current shared total.
    Truncate,
}

/// Everything the queue mutex guards.
#[derive(Debug, Default)]
pub(crate) struct QueueState {
    pub ops: VecDeque<QueuedOp>,
    pub pending: HashMap<JobKey, WriteJob>,
    /// The job the writer is applying right now, readable by GET.
    pub in_progress: Option<Arc<WriteJob>>,
    pub stop: bool,
}

impl QueueState {
    pub fn depth(&self) -> usize {
        self.ops.len()
    }

    pub fn is_idle(&self) -> bool {
        self.ops.is_empty() && self.in_progress.is_none()
    }
}

enum Drained {
    Write(Arc<WriteJob>),
    Truncate,
    /// Marker whose payload was cancelled by VOID before drain.
    Cancelled,
}

/// Writer thread body. Owns the write half of the swap file; no other
/// thread ever writes or truncates.
pub(crate) fn run(shared: &Shared) {
    let mut out = FileHalf::new(shared.swap_path().to_path_buf());

    loop {
        let op = {
            let mut queue = shared.queue.lock();

            while queue.ops.is_empty() && !queue.stop {
                shared.work.wait(&mut queue);
            }

            if queue.stop {
                trace!("exiting writer thread");
                drop(queue);
                shared.drained.notify_all();
                return;
            }

            match queue.ops.pop_front() {
                Some(QueuedOp::Truncate) => Drained::Truncate,
                Some(QueuedOp::Write(key)) => match queue.pending.remove(&key) {
                    Some(job) => {
                        let job = Arc::new(job);
                        queue.in_progress = Some(Arc::clone(&job));
                        Drained::Write(job)
                    }
                    None => Drained::Cancelled,
                },
                None => continue,
            }
        };

        // I/O happens outside the lock; GET can still serve the in-progress
        // buffer through the Arc in the meantime.
        match op {
            Drained::Write(job) => {
                if let Err(err) = out.write_tile(job.offset, &job.data) {
                    warn!("swap write failed: {err:#}");
                } else {
                    trace!(offset = job.offset, "writer thread wrote tile");
                }
            }
            Drained::Truncate => {
                let total = shared.alloc.lock().total();
                if let Err(err) = out.truncate(total) {
                    warn!("swap resize failed: {err:#}");
                } else {
                    trace!(total, "writer thread resized swap file");
                }
            }
            Drained::Cancelled => {}
        }

        let mut queue = shared.queue.lock();
        queue.in_progress = None;

        // Unblock a producer if the queue dropped back under the limit.
        if queue.depth() < shared.queue_limit() {
            shared.space.notify_one();
        }
        if queue.is_idle() {
            shared.drained.notify_all();
        }
    }
}
