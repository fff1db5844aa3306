//! # Swap Configuration
//!
//! Configuration consumed by the swap service from the embedding application:
//! where the scratch file lives and how deep the write-back queue may grow
//! before producers are throttled. Tuning constants shared by the allocator
//! and the writer live in [`constants`].

use std::path::{Path, PathBuf};
use std::process;

pub mod constants;

pub use constants::*;

/// Configuration for the process-wide swap service.
#[derive(Debug, Clone)]
pub struct SwapConfig {
    /// Directory the scratch file is created in.
    pub swap_dir: PathBuf,
    /// Write-back queue depth above which producers block (backpressure).
    pub queue_limit: usize,
}

impl Default for SwapConfig {
    fn default() -> Self {
        Self {
            swap_dir: std::env::temp_dir(),
            queue_limit: DEFAULT_WRITE_QUEUE_LIMIT,
        }
    }
}

impl SwapConfig {
    pub fn new<P: AsRef<Path>>(swap_dir: P) -> Self {
        Self {
            swap_dir: swap_dir.as_ref().to_path_buf(),
            ..Self::default()
        }
    }

    pub fn queue_limit(mut self, limit: usize) -> Self {
        self.queue_limit = limit;
        self
    }

    /// Path of the scratch file: `<swap_dir>/<pid>-shared.swap`.
    ///
    /// The file is keyed by process id so concurrent processes sharing a swap
    /// directory never collide; it is not meant to survive the process.
    pub fn swap_file_path(&self) -> PathBuf {
        self.swap_dir
            .join(format!("{}{}", process::id(), SWAP_FILE_SUFFIX))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn swap_file_path_is_keyed_by_pid() {
        let config = SwapConfig::new("/tmp/scratch");
        let path = config.swap_file_path();

        assert!(path.starts_with("/tmp/scratch"));
        let name = path.file_name().unwrap().to_str().unwrap();
        assert!(name.ends_with(SWAP_FILE_SUFFIX));
        assert!(name.starts_with(&process::id().to_string()));
    }

    #[test]
    fn default_queue_limit_matches_constant() {
        let config = SwapConfig::default();
        assert_eq!(config.queue_limit, DEFAULT_WRITE_QUEUE_LIMIT);
    }
}
