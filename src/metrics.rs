//! Lightweight global metrics for the content cache.
//!
//! Потокобезопасные атомарные счётчики для подсистем:
//! - Rebuild pipeline (runs, task outcomes)
//! - Incremental updates
//! - Controller (swaps)
//! - Persistence (persist/load)
//! - Datasource sessions

use std::sync::atomic::{AtomicU64, Ordering};

// ----- Rebuild -----
static REBUILDS_STARTED: AtomicU64 = AtomicU64::new(0);
static REBUILDS_SUCCEEDED: AtomicU64 = AtomicU64::new(0);
static REBUILDS_PARTIAL: AtomicU64 = AtomicU64::new(0);
static REBUILDS_FAILED: AtomicU64 = AtomicU64::new(0);
static REBUILD_TASKS_RUN: AtomicU64 = AtomicU64::new(0);
static REBUILD_TASK_ERRORS: AtomicU64 = AtomicU64::new(0);
static REBUILD_TASKS_SKIPPED: AtomicU64 = AtomicU64::new(0);

// ----- Incremental updates -----
static UPDATES_APPLIED: AtomicU64 = AtomicU64::new(0);
static UPDATES_REJECTED: AtomicU64 = AtomicU64::new(0);
static UPDATES_REPLAYED: AtomicU64 = AtomicU64::new(0);

// ----- Controller -----
static SNAPSHOT_SWAPS: AtomicU64 = AtomicU64::new(0);

// ----- Persistence -----
static PERSISTS_OK: AtomicU64 = AtomicU64::new(0);
static PERSISTS_FAILED: AtomicU64 = AtomicU64::new(0);
static PERSIST_BYTES: AtomicU64 = AtomicU64::new(0);
static LOADS_OK: AtomicU64 = AtomicU64::new(0);
static LOADS_FALLBACK: AtomicU64 = AtomicU64::new(0);

// ----- Datasource -----
static SESSIONS_OPENED: AtomicU64 = AtomicU64::new(0);
static SESSIONS_CLOSED: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct MetricsSnapshot {
    // Rebuild
    pub rebuilds_started: u64,
    pub rebuilds_succeeded: u64,
    pub rebuilds_partial: u64,
    pub rebuilds_failed: u64,
    pub rebuild_tasks_run: u64,
    pub rebuild_task_errors: u64,
    pub rebuild_tasks_skipped: u64,

    // Updates
    pub updates_applied: u64,
    pub updates_rejected: u64,
    pub updates_replayed: u64,

    // Controller
    pub snapshot_swaps: u64,

    // Persistence
    pub persists_ok: u64,
    pub persists_failed: u64,
    pub persist_bytes: u64,
    pub loads_ok: u64,
    pub loads_fallback: u64,

    // Datasource
    pub sessions_opened: u64,
    pub sessions_closed: u64,
}

impl MetricsSnapshot {
    pub fn task_error_ratio(&self) -> f64 {
        if self.rebuild_tasks_run == 0 {
            0.0
        } else {
            self.rebuild_task_errors as f64 / self.rebuild_tasks_run as f64
        }
    }

    pub fn open_sessions(&self) -> u64 {
        self.sessions_opened.saturating_sub(self.sessions_closed)
    }
}

// ----- Recorders (Rebuild) -----
pub fn record_rebuild_started() {
    REBUILDS_STARTED.fetch_add(1, Ordering::Relaxed);
}

pub fn record_rebuild_succeeded() {
    REBUILDS_SUCCEEDED.fetch_add(1, Ordering::Relaxed);
}

pub fn record_rebuild_partial() {
    REBUILDS_PARTIAL.fetch_add(1, Ordering::Relaxed);
}

pub fn record_rebuild_failed() {
    REBUILDS_FAILED.fetch_add(1, Ordering::Relaxed);
}

pub fn record_task_run(failed: bool) {
    REBUILD_TASKS_RUN.fetch_add(1, Ordering::Relaxed);
    if failed {
        REBUILD_TASK_ERRORS.fetch_add(1, Ordering::Relaxed);
    }
}

pub fn record_tasks_skipped(n: usize) {
    REBUILD_TASKS_SKIPPED.fetch_add(n as u64, Ordering::Relaxed);
}

// ----- Recorders (Updates) -----
pub fn record_update_applied() {
    UPDATES_APPLIED.fetch_add(1, Ordering::Relaxed);
}
pub fn record_update_rejected() {
    UPDATES_REJECTED.fetch_add(1, Ordering::Relaxed);
}
pub fn record_updates_replayed(n: usize) {
    UPDATES_REPLAYED.fetch_add(n as u64, Ordering::Relaxed);
}

// ----- Recorders (Controller) -----
pub fn record_snapshot_swap() {
    SNAPSHOT_SWAPS.fetch_add(1, Ordering::Relaxed);
}

// ----- Recorders (Persistence) -----
pub fn record_persist(bytes: u64) {
    PERSISTS_OK.fetch_add(1, Ordering::Relaxed);
    PERSIST_BYTES.fetch_add(bytes, Ordering::Relaxed);
}

pub fn record_persist_failed() {
    PERSISTS_FAILED.fetch_add(1, Ordering::Relaxed);
}

pub fn record_load_ok() {
    LOADS_OK.fetch_add(1, Ordering::Relaxed);
}

pub fn record_load_fallback() {
    LOADS_FALLBACK.fetch_add(1, Ordering::Relaxed);
}

// ----- Recorders (Datasource) -----
pub fn record_session_opened() {
    SESSIONS_OPENED.fetch_add(1, Ordering::Relaxed);
}
pub fn record_session_closed() {
    SESSIONS_CLOSED.fetch_add(1, Ordering::Relaxed);
}

// ----- Snapshot / Reset -----
pub fn snapshot() -> MetricsSnapshot {
    MetricsSnapshot {
        rebuilds_started: REBUILDS_STARTED.load(Ordering::Relaxed),
        rebuilds_succeeded: REBUILDS_SUCCEEDED.load(Ordering::Relaxed),
        rebuilds_partial: REBUILDS_PARTIAL.load(Ordering::Relaxed),
        rebuilds_failed: REBUILDS_FAILED.load(Ordering::Relaxed),
        rebuild_tasks_run: REBUILD_TASKS_RUN.load(Ordering::Relaxed),
        rebuild_task_errors: REBUILD_TASK_ERRORS.load(Ordering::Relaxed),
        rebuild_tasks_skipped: REBUILD_TASKS_SKIPPED.load(Ordering::Relaxed),

        updates_applied: UPDATES_APPLIED.load(Ordering::Relaxed),
        updates_rejected: UPDATES_REJECTED.load(Ordering::Relaxed),
        updates_replayed: UPDATES_REPLAYED.load(Ordering::Relaxed),

        snapshot_swaps: SNAPSHOT_SWAPS.load(Ordering::Relaxed),

        persists_ok: PERSISTS_OK.load(Ordering::Relaxed),
        persists_failed: PERSISTS_FAILED.load(Ordering::Relaxed),
        persist_bytes: PERSIST_BYTES.load(Ordering::Relaxed),
        loads_ok: LOADS_OK.load(Ordering::Relaxed),
        loads_fallback: LOADS_FALLBACK.load(Ordering::Relaxed),

        sessions_opened: SESSIONS_OPENED.load(Ordering::Relaxed),
        sessions_closed: SESSIONS_CLOSED.load(Ordering::Relaxed),
    }
}

pub fn reset() {
    REBUILDS_STARTED.store(0, Ordering::Relaxed);
    REBUILDS_SUCCEEDED.store(0, Ordering::Relaxed);
    REBUILDS_PARTIAL.store(0, Ordering::Relaxed);
    REBUILDS_FAILED.store(0, Ordering::Relaxed);
    REBUILD_TASKS_RUN.store(0, Ordering::Relaxed);
    REBUILD_TASK_ERRORS.store(0, Ordering::Relaxed);
    REBUILD_TASKS_SKIPPED.store(0, Ordering::Relaxed);

    UPDATES_APPLIED.store(0, Ordering::Relaxed);
    UPDATES_REJECTED.store(0, Ordering::Relaxed);
    UPDATES_REPLAYED.store(0, Ordering::Relaxed);

    SNAPSHOT_SWAPS.store(0, Ordering::Relaxed);

    PERSISTS_OK.store(0, Ordering::Relaxed);
    PERSISTS_FAILED.store(0, Ordering::Relaxed);
    PERSIST_BYTES.store(0, Ordering::Relaxed);
    LOADS_OK.store(0, Ordering::Relaxed);
    LOADS_FALLBACK.store(0, Ordering::Relaxed);

    SESSIONS_OPENED.store(0, Ordering::Relaxed);
    SESSIONS_CLOSED.store(0, Ordering::Relaxed);
}
