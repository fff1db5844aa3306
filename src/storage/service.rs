//! # Swap Service
//!
//! Process-scoped composition of the scratch file, the free-space allocator,
//! and the write-back queue. Every backend facade in the process shares one
//! service: one scratch file, one writer thread, one queue.
//!
//! ## Lifecycle
//!
//! The service replaces what would otherwise be a pile of process-wide
//! statics with an explicit singleton:
//!
//! - [`init`] creates the global service on first call (safe under
//!   concurrent first use) and returns the existing one afterwards.
//! - [`global`] hands out the current instance, if any.
//! - [`shutdown`] stops the writer, joins it, closes handles and removes
//!   the scratch file.
//!
//! Tests and embedders that want isolation can construct [`SwapService`]
//! directly and skip the global entirely.
//!
//! ## Locking
//!
//! Three independent mutexes, never held together:
//!
//! - the queue mutex (FIFO, pending payloads, in-progress slot, stop flag),
//!   with condvars for work, backpressure space, and drain;
//! - the allocator mutex (gap list + shared total) — internal locking here
//!   because the writer thread reads the total when executing a truncation;
//! - the read-half mutex (GET's file handle and cursor).
//!
//! The backend tile indexes are deliberately *not* synchronized by the
//! service; see [`crate::backend`] for how that contract is encoded.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use eyre::{ensure, Result, WrapErr};
use parking_lot::{Condvar, Mutex};
use tracing::{debug, trace, warn};

use super::gaps::Allocator;
use super::swap_file::FileHalf;
use super::writer::{self, JobKey, QueueState, QueuedOp, WriteJob};

/// Point-in-time snapshot of the service, for diagnostics and tests.
#[derive(Debug, Clone, Copy)]
pub struct SwapStats {
    /// Current total allocated size of the swap file.
    pub total: u64,
    /// Sum of all gap sizes.
    pub free_bytes: u64,
    pub gap_count: usize,
    /// Operations sitting in the write-back queue.
    pub queue_depth: usize,
}

/// State shared between caller threads and the writer thread.
#[derive(Debug)]
pub(crate) struct Shared {
    path: PathBuf,
    queue_limit: usize,
    pub(crate) queue: Mutex<QueueState>,
    /// Signalled when work is queued or the stop flag is raised.
    pub(crate) work: Condvar,
    /// Signalled when the queue drops back under the depth limit.
    pub(crate) space: Condvar,
    /// Signalled when the queue is empty and no write is in progress.
    pub(crate) drained: Condvar,
    pub(crate) alloc: Mutex<Allocator>,
    read: Mutex<FileHalf>,
}

impl Shared {
    pub(crate) fn swap_path(&self) -> &Path {
        &self.path
    }

    pub(crate) fn queue_limit(&self) -> usize {
        self.queue_limit
    }
}

/// The shared swap engine behind all tile backends.
#[derive(Debug)]
pub struct SwapService {
    shared: Arc<Shared>,
    writer: Mutex<Option<JoinHandle<()>>>,
    next_backend: AtomicU64,
}

impl SwapService {
    /// Create a service and start its writer thread.
    ///
    /// The scratch file itself is not created until the first tile is
    /// written or read.
    pub fn new(config: &crate::config::SwapConfig) -> Result<Self> {
        let path = config.swap_file_path();
        debug!(path = %path.display(), "starting swap service");

        let shared = Arc::new(Shared {
            read: Mutex::new(FileHalf::new(path.clone())),
            path,
            queue_limit: config.queue_limit,
            queue: Mutex::new(QueueState::default()),
            work: Condvar::new(),
            space: Condvar::new(),
            drained: Condvar::new(),
            alloc: Mutex::new(Allocator::new()),
        });

        let writer_shared = Arc::clone(&shared);
        let handle = thread::Builder::new()
            .name("tileswap-writer".into())
            .spawn(move || writer::run(&writer_shared))
            .wrap_err("failed to spawn swap writer thread")?;

        Ok(Self {
            shared,
            writer: Mutex::new(Some(handle)),
            next_backend: AtomicU64::new(0),
        })
    }

    /// Hand out a fresh backend id, used to key pending writes.
    pub(crate) fn register_backend(&self) -> u64 {
        self.next_backend.fetch_add(1, Ordering::Relaxed)
    }

    /// Append an op to the FIFO, waiting while the queue is over the limit.
    fn push(&self, op: QueuedOp) {
        let mut queue = self.shared.queue.lock();
        while queue.depth() > self.shared.queue_limit && !queue.stop {
            self.shared.space.wait(&mut queue);
        }
        if queue.stop {
            return;
        }
        queue.ops.push_back(op);
        self.shared.work.notify_one();
    }

    /// Reserve space for one tile. Queues a truncation when the file grew.
    pub(crate) fn allocate(&self, tile_size: u64) -> u64 {
        let (offset, resized) = self.shared.alloc.lock().find_offset(tile_size);
        if resized {
            self.push(QueuedOp::Truncate);
        }
        offset
    }

    /// Return `[offset, offset + tile_size)` to the free list. Queues a
    /// truncation when the trailing gap crossed the hysteresis band.
    pub(crate) fn release(&self, offset: u64, tile_size: u64) {
        let resized = self
            .shared
            .alloc
            .lock()
            .release(offset, offset + tile_size, tile_size);
        if resized {
            self.push(QueuedOp::Truncate);
        }
    }

    /// Queue a tile write, or overwrite the already-pending buffer for the
    /// same key in place. Blocks while the queue is over the depth limit.
    pub(crate) fn enqueue_write(&self, key: JobKey, offset: u64, data: &[u8]) {
        let mut queue = self.shared.queue.lock();

        if let Some(job) = queue.pending.get_mut(&key) {
            job.data.clear();
            job.data.extend_from_slice(data);
            trace!(coord = %key.coord, offset = job.offset, "overwrote queued tile");
            return;
        }

        while queue.depth() > self.shared.queue_limit && !queue.stop {
            self.shared.space.wait(&mut queue);
        }
        if queue.stop {
            warn!("swap service is shut down; dropping tile write");
            return;
        }

        queue.pending.insert(
            key,
            WriteJob {
                key,
                offset,
                data: data.to_vec(),
            },
        );
        queue.ops.push_back(QueuedOp::Write(key));
        trace!(coord = %key.coord, offset, "queued tile write");

        self.shared.work.notify_one();
    }

    /// Discard the pending write for `key`, if any. The FIFO marker stays
    /// behind and pops as a no-op.
    pub(crate) fn cancel_write(&self, key: JobKey) {
        let mut queue = self.shared.queue.lock();
        if queue.pending.remove(&key).is_some() {
            trace!(coord = %key.coord, "cancelled queued tile write");
        }
    }

    /// Read one tile, preferring in-memory queued data over the file.
    ///
    /// A tile with a pending or in-progress write may not be on disk yet
    /// (or the disk copy may be stale), so those buffers win.
    pub(crate) fn read_tile(&self, key: JobKey, offset: u64, dest: &mut [u8]) -> Result<()> {
        {
            let queue = self.shared.queue.lock();
            let job = queue
                .pending
                .get(&key)
                .or_else(|| queue.in_progress.as_deref().filter(|job| job.key == key));

            if let Some(job) = job {
                ensure!(
                    job.data.len() == dest.len(),
                    "queued tile is {} bytes, expected {}",
                    job.data.len(),
                    dest.len()
                );
                dest.copy_from_slice(&job.data);
                trace!(coord = %key.coord, "read tile from queue");
                return Ok(());
            }
        }

        self.shared.read.lock().read_tile(offset, dest)
    }

    /// Block until the queue is empty and no write is in progress.
    pub fn wait_until_idle(&self) {
        let mut queue = self.shared.queue.lock();
        while !queue.is_idle() && !queue.stop {
            self.shared.drained.wait(&mut queue);
        }
    }

    pub fn stats(&self) -> SwapStats {
        let (total, free_bytes, gap_count) = {
            let alloc = self.shared.alloc.lock();
            (alloc.total(), alloc.free_bytes(), alloc.gap_count())
        };
        SwapStats {
            total,
            free_bytes,
            gap_count,
            queue_depth: self.shared.queue.lock().depth(),
        }
    }

    /// Stop the writer thread, close handles and remove the scratch file.
    ///
    /// Idempotent. Queued writes that have not been drained are abandoned
    /// (warned): the swap is a cache, losing them at teardown is harmless.
    pub fn shutdown(&self) {
        let handle = self.writer.lock().take();
        let Some(handle) = handle else {
            return;
        };

        self.shared.queue.lock().stop = true;
        self.shared.work.notify_all();
        self.shared.space.notify_all();

        if handle.join().is_err() {
            warn!("swap writer thread panicked");
        }

        let depth = self.shared.queue.lock().depth();
        if depth != 0 {
            warn!(depth, "swap writer queue was not empty at shutdown");
        }

        self.shared.read.lock().close();

        // The scratch file is a reconstructible cache; leaving it behind
        // after the descriptors close would only litter the swap directory.
        match fs::remove_file(&self.shared.path) {
            Ok(()) => debug!(path = %self.shared.path.display(), "removed swap file"),
            Err(err) if err.kind() == ErrorKind::NotFound => {}
            Err(err) => warn!("could not remove swap file: {err}"),
        }
    }
}

impl Drop for SwapService {
    fn drop(&mut self) {
        self.shutdown();
    }
}

static GLOBAL: Mutex<Option<Arc<SwapService>>> = Mutex::new(None);

/// Create the process-global service, or return the existing one.
pub fn init(config: &crate::config::SwapConfig) -> Result<Arc<SwapService>> {
    let mut global = GLOBAL.lock();
    if let Some(service) = &*global {
        return Ok(Arc::clone(service));
    }

    let service = Arc::new(SwapService::new(config)?);
    *global = Some(Arc::clone(&service));
    Ok(service)
}

/// The current global service, if [`init`] has been called.
pub fn global() -> Option<Arc<SwapService>> {
    GLOBAL.lock().clone()
}

/// Tear down the global service. Backends still holding an `Arc` keep a
/// stopped service: their writes are dropped with a warning.
pub fn shutdown() {
    if let Some(service) = GLOBAL.lock().take() {
        service.shutdown();
    }
}
