//! Ref-counted per-request temp directory.
//!
//! A DOWNLOAD hands back three independent paths (info/mod/zip) that
//! share one underlying directory. `SharedTempDir` is the owning
//! handle; cloning it increments a counter and dropping the last clone
//! removes the directory from disk.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

#[derive(Debug)]
struct Inner {
    dir: TempDir,
}

/// A directory shared by the three DOWNLOAD readers. Removed from disk
/// when the last clone is dropped.
#[derive(Debug, Clone)]
pub struct SharedTempDir {
    inner: Arc<Inner>,
}

impl SharedTempDir {
    /// Creates a fresh temp directory under `base` (or the system
    /// default if `base` is `None`).
    pub fn new(base: Option<&Path>) -> std::io::Result<Self> {
        let dir = match base {
            Some(base) => tempfile::Builder::new().prefix("goproxy-").tempdir_in(base)?,
            None => tempfile::Builder::new().prefix("goproxy-").tempdir()?,
        };
        Ok(Self {
            inner: Arc::new(Inner { dir }),
        })
    }

    pub fn path(&self) -> &Path {
        self.inner.dir.path()
    }

    pub fn join(&self, file_name: &str) -> PathBuf {
        self.inner.dir.path().join(file_name)
    }

    /// Number of live handles to this directory (the reference count).
    pub fn handle_count(&self) -> usize {
        Arc::strong_count(&self.inner)
    }
}
