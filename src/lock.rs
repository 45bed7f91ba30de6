//! Advisory lock next to the persisted snapshot file.
//!
//! Cross-platform (fs2) advisory locks:
//! - Exclusive: persist / load-and-consume (the file is replaced or deleted).
//! - Shared: read-only access (CLI status/dump/query).
//!
//! Lock file path: <cache_file>.lock (left in place; only its lock state matters).
//! Lock is released on Drop.

use anyhow::{Context, Result};
use fs2::FileExt;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    Shared,
    Exclusive,
}

pub struct LockGuard {
    file: std::fs::File,
    path: PathBuf,
    mode: LockMode,
}

impl LockGuard {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn mode(&self) -> LockMode {
        self.mode
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        // unlock errors on drop are ignored
        let _ = self.file.unlock();
        log::trace!("released {:?} lock {}", self.mode, self.path.display());
    }
}

pub fn lock_file_path(cache_file: &Path) -> PathBuf {
    let mut name = cache_file.as_os_str().to_os_string();
    name.push(".lock");
    PathBuf::from(name)
}

fn open_lock_file(path: &Path) -> Result<std::fs::File> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create directory {}", parent.display()))?;
        }
    }
    OpenOptions::new()
        .create(true)
        .read(true)
        .write(true)
        .open(path)
        .with_context(|| format!("open lock file {}", path.display()))
}

/// Acquire the lock of `cache_file` in the requested mode. Blocks until acquired.
pub fn acquire_lock(cache_file: &Path, mode: LockMode) -> Result<LockGuard> {
    let path = lock_file_path(cache_file);
    let file = open_lock_file(&path)?;
    match mode {
        LockMode::Shared => file
            .lock_shared()
            .with_context(|| format!("lock_shared {}", path.display()))?,
        LockMode::Exclusive => file
            .lock_exclusive()
            .with_context(|| format!("lock_exclusive {}", path.display()))?,
    }
    log::debug!("acquired {:?} lock {}", mode, path.display());
    Ok(LockGuard { file, path, mode })
}

/// Like `acquire_lock`, but fails instead of waiting.
pub fn try_acquire_lock(cache_file: &Path, mode: LockMode) -> Result<LockGuard> {
    let path = lock_file_path(cache_file);
    let file = open_lock_file(&path)?;
    match mode {
        LockMode::Shared => file
            .try_lock_shared()
            .with_context(|| format!("try_lock_shared failed: {}", path.display()))?,
        LockMode::Exclusive => file
            .try_lock_exclusive()
            .with_context(|| format!("try_lock_exclusive failed: {}", path.display()))?,
    }
    Ok(LockGuard { file, path, mode })
}
