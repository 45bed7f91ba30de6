//! Lifecycle state of the controller.
//!
//! `Uninitialized → Ready → Rebuilding → Ready`, orthogonally `Ready → Updating → Ready`,
//! any state `→ Cleanup` (terminal). Rebuilds and updates may overlap (the expensive scan
//! holds no lock readers or updaters wait on), so the cell tracks them separately and
//! `current()` reports the dominant one.

use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheState {
    Uninitialized,
    Ready,
    Rebuilding,
    Updating,
    Cleanup,
}

impl fmt::Display for CacheState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CacheState::Uninitialized => "uninitialized",
            CacheState::Ready => "ready",
            CacheState::Rebuilding => "rebuilding",
            CacheState::Updating => "updating",
            CacheState::Cleanup => "cleanup",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Default)]
pub(crate) struct StateCell {
    initialized: AtomicBool,
    rebuilding: AtomicBool,
    updating: AtomicUsize,
    shut: AtomicBool,
}

impl StateCell {
    pub fn current(&self) -> CacheState {
        if self.shut.load(Ordering::Acquire) {
            CacheState::Cleanup
        } else if self.rebuilding.load(Ordering::Acquire) {
            CacheState::Rebuilding
        } else if self.updating.load(Ordering::Acquire) > 0 {
            CacheState::Updating
        } else if self.initialized.load(Ordering::Acquire) {
            CacheState::Ready
        } else {
            CacheState::Uninitialized
        }
    }

    pub fn mark_ready(&self) {
        self.initialized.store(true, Ordering::Release);
    }

    pub fn is_shut(&self) -> bool {
        self.shut.load(Ordering::Acquire)
    }

    /// Returns false if cleanup had already begun.
    pub fn begin_cleanup(&self) -> bool {
        !self.shut.swap(true, Ordering::AcqRel)
    }

    pub fn rebuilding(&self) -> Phase<'_> {
        self.rebuilding.store(true, Ordering::Release);
        Phase {
            cell: self,
            kind: PhaseKind::Rebuild,
        }
    }

    pub fn updating(&self) -> Phase<'_> {
        self.updating.fetch_add(1, Ordering::AcqRel);
        Phase {
            cell: self,
            kind: PhaseKind::Update,
        }
    }
}

enum PhaseKind {
    Rebuild,
    Update,
}

/// Resets the transient state on drop (also on early return).
pub(crate) struct Phase<'a> {
    cell: &'a StateCell,
    kind: PhaseKind,
}

impl Drop for Phase<'_> {
    fn drop(&mut self) {
        match self.kind {
            PhaseKind::Rebuild => self.cell.rebuilding.store(false, Ordering::Release),
            PhaseKind::Update => {
                self.cell.updating.fetch_sub(1, Ordering::AcqRel);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dominant_state() {
        let c = StateCell::default();
        assert_eq!(c.current(), CacheState::Uninitialized);
        c.mark_ready();
        assert_eq!(c.current(), CacheState::Ready);
        {
            let _u = c.updating();
            assert_eq!(c.current(), CacheState::Updating);
            let _r = c.rebuilding();
            assert_eq!(c.current(), CacheState::Rebuilding);
        }
        assert_eq!(c.current(), CacheState::Ready);
        assert!(c.begin_cleanup());
        assert!(!c.begin_cleanup());
        assert_eq!(c.current(), CacheState::Cleanup);
    }
}
