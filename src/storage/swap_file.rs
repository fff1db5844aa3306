//! # Swap File Access
//!
//! One half of the scratch file: a lazily opened handle plus a cached cursor
//! position. The service keeps two independent halves — the writer thread
//! owns one for writes and truncations, GET owns the other for reads — so
//! neither side disturbs the other's cursor.
//!
//! ## Sequential-Access Optimization
//!
//! Tile consumers tend to touch runs of consecutive offsets. Every positioned
//! operation compares the target offset against the cached cursor and only
//! issues a `seek` when they differ; sequential runs then cost one syscall
//! per tile instead of two.
//!
//! ## Lazy Open, Lazy Retry
//!
//! The file is created on first access, not at service construction. An open
//! failure leaves the half non-functional for that operation but the next
//! access tries again, so a transient problem (missing directory created
//! later, temporary EMFILE) does not permanently disable the swap.

use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::PathBuf;

use eyre::{bail, Result, WrapErr};
use tracing::debug;

/// A file handle with a cached cursor position.
#[derive(Debug)]
pub struct FileHalf {
    path: PathBuf,
    file: Option<File>,
    /// Cursor position of `file`, valid while `file` is `Some`.
    pos: u64,
}

impl FileHalf {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            file: None,
            pos: 0,
        }
    }

    pub fn is_open(&self) -> bool {
        self.file.is_some()
    }

    /// Drop the handle. The next access reopens the file.
    pub fn close(&mut self) {
        self.file = None;
        self.pos = 0;
    }

    fn ensure_open(&mut self) -> Result<()> {
        if self.file.is_some() {
            return Ok(());
        }

        debug!(path = %self.path.display(), "opening swap file");

        // Both halves open read+write so whichever touches the file first
        // creates it; the read half simply never writes through its handle.
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&self.path)
            .wrap_err_with(|| format!("could not open swap file '{}'", self.path.display()))?;

        self.pos = 0;
        self.file = Some(file);
        Ok(())
    }

    /// Read exactly `dest.len()` bytes at `offset`.
    ///
    /// A short read is an error: the swap never pads, a tile is either whole
    /// or failed.
    pub fn read_tile(&mut self, offset: u64, dest: &mut [u8]) -> Result<()> {
        self.ensure_open()?;
        let Self { path, file, pos } = self;
        let file = match file {
            Some(file) => file,
            None => bail!("swap file '{}' is not open", path.display()),
        };

        if *pos != offset {
            file.seek(SeekFrom::Start(offset))
                .wrap_err_with(|| format!("unable to seek to tile at {offset} in swap"))?;
            *pos = offset;
        }

        let mut done = 0;
        while done < dest.len() {
            match file.read(&mut dest[done..]) {
                Ok(0) => bail!(
                    "unable to read tile data from swap ({done}/{} bytes read)",
                    dest.len()
                ),
                Ok(n) => {
                    done += n;
                    *pos += n as u64;
                }
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => {
                    return Err(err).wrap_err_with(|| {
                        format!(
                            "unable to read tile data from swap ({done}/{} bytes read)",
                            dest.len()
                        )
                    });
                }
            }
        }

        Ok(())
    }

    /// Write all of `source` at `offset`, looping on partial writes.
    pub fn write_tile(&mut self, offset: u64, source: &[u8]) -> Result<()> {
        self.ensure_open()?;
        let Self { path, file, pos } = self;
        let file = match file {
            Some(file) => file,
            None => bail!("swap file '{}' is not open", path.display()),
        };

        if *pos != offset {
            file.seek(SeekFrom::Start(offset))
                .wrap_err_with(|| format!("unable to seek to tile at {offset} in swap"))?;
            *pos = offset;
        }

        let mut done = 0;
        while done < source.len() {
            match file.write(&source[done..]) {
                Ok(0) => bail!(
                    "unable to write tile data to swap ({done}/{} bytes written)",
                    source.len()
                ),
                Ok(n) => {
                    done += n;
                    *pos += n as u64;
                }
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => {
                    return Err(err).wrap_err_with(|| {
                        format!(
                            "unable to write tile data to swap ({done}/{} bytes written)",
                            source.len()
                        )
                    });
                }
            }
        }

        Ok(())
    }

    /// Set the file length. Extends with zeros or discards the tail; the
    /// cursor position is unaffected either way.
    pub fn truncate(&mut self, len: u64) -> Result<()> {
        self.ensure_open()?;
        let Self { path, file, .. } = self;
        let file = match file {
            Some(file) => file,
            None => bail!("swap file '{}' is not open", path.display()),
        };

        file.set_len(len)
            .wrap_err_with(|| format!("unable to resize swap file to {len} bytes"))?;
        Ok(())
    }
}
