//! Content cache controller: owns the live snapshot, lifecycle, persistence and the
//! optional refresh timer. The only component the rest of the service talks to.
//!
//! Locking:
//! - `live: RwLock<Arc<Snapshot>>`. Readers clone the `Arc` under the read lock and never
//!   block on a rebuild. Only the rebuild swap and incremental updates take the write lock.
//! - Incremental updates mutate copy-on-write (`Arc::make_mut`), so handles already given
//!   to readers never change.
//! - Rebuilds are serialized by `rebuild_lock` and run without holding `live`.
//! - While a rebuild runs, applied updates are journaled and replayed onto the new
//!   snapshot right before the swap (lock order: `live`, then `journal`).
//!
//! Submodules:
//! - state:    lifecycle state cell
//! - schedule: periodic refresh timer

pub mod schedule;
pub mod state;

use log::{debug, error, info, warn};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use crate::config::CacheConfig;
use crate::datasource::Datasource;
use crate::error::{CacheError, CacheResult};
use crate::metrics;
use crate::persist;
use crate::pipeline::{run_full_rebuild, RebuildOutcome, RebuildReport, RebuildSettings};
use crate::snapshot::{Snapshot, WritableCache};
use crate::update::CacheUpdate;

use schedule::RefreshTimer;
pub use state::CacheState;
use state::StateCell;

pub struct ContentCacheController {
    config: CacheConfig,
    settings: RebuildSettings,
    datasource: Arc<dyn Datasource>,
    live: RwLock<Arc<Snapshot>>,
    rebuild_lock: Mutex<()>,
    journal: Mutex<Option<Vec<CacheUpdate>>>,
    state: StateCell,
    refresh: Mutex<Option<RefreshTimer>>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|p| p.into_inner())
}

impl ContentCacheController {
    /// Load the persisted snapshot (consuming the file) or rebuild from the datastore,
    /// then start the refresh timer if configured.
    ///
    /// A hard rebuild failure fails the start; task errors only leave a partial snapshot.
    pub fn start(config: CacheConfig, datasource: Arc<dyn Datasource>) -> CacheResult<Arc<Self>> {
        config.validate()?;
        let settings = RebuildSettings::from_config(&config)?;
        info!("starting content cache controller ({})", config);

        let loaded = match persist::load_and_consume(&config.cache_file) {
            Ok(Some(s)) => {
                metrics::record_load_ok();
                info!(
                    "loaded persisted cache snapshot from {} (fingerprint {:016x})",
                    config.cache_file.display(),
                    s.fingerprint()
                );
                Some(s)
            }
            Ok(None) => None,
            Err(e) => {
                metrics::record_load_fallback();
                warn!("persisted cache snapshot unusable, rebuilding: {:#}", e);
                None
            }
        };

        let ctl = Arc::new(Self {
            live: RwLock::new(Arc::new(Snapshot::new(settings.default_epsg))),
            config,
            settings,
            datasource,
            rebuild_lock: Mutex::new(()),
            journal: Mutex::new(None),
            state: StateCell::default(),
            refresh: Mutex::new(None),
        });

        match loaded {
            Some(s) => {
                ctl.swap(s);
                ctl.state.mark_ready();
            }
            None => match ctl.rebuild_from_datasource() {
                Ok(_) => {}
                Err(e) if e.is_aggregate() => {
                    warn!("initial cache rebuild incomplete, serving partial snapshot: {}", e)
                }
                Err(e) => return Err(e),
            },
        }

        if let Some(interval) = ctl.config.refresh_interval.filter(|d| !d.is_zero()) {
            let timer = RefreshTimer::start(interval, Arc::downgrade(&ctl))
                .map_err(|e| CacheError::configuration(format!("{:#}", e)))?;
            *lock(&ctl.refresh) = Some(timer);
        }
        Ok(ctl)
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Current readable snapshot. Never blocks on a rebuild in progress.
    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.live.read().unwrap_or_else(|p| p.into_inner()).clone()
    }

    pub fn state(&self) -> CacheState {
        self.state.current()
    }

    /// Run `f` against the live snapshot under the write lock.
    pub fn with_writable<F, R>(&self, f: F) -> CacheResult<R>
    where
        F: FnOnce(&mut dyn WritableCache) -> CacheResult<R>,
    {
        if self.state.is_shut() {
            return Err(CacheError::Shutdown);
        }
        let _phase = self.state.updating();
        let mut live = self.live.write().unwrap_or_else(|p| p.into_inner());
        let snap: &mut Snapshot = Arc::make_mut(&mut *live);
        f(snap)
    }

    /// Mirror one committed write onto the live snapshot.
    pub fn apply_update(&self, update: &CacheUpdate) -> CacheResult<()> {
        if self.state.is_shut() {
            return Err(CacheError::Shutdown);
        }
        if let Err(e) = update.validate() {
            metrics::record_update_rejected();
            return Err(e);
        }
        let _phase = self.state.updating();
        {
            let mut live = self.live.write().unwrap_or_else(|p| p.into_inner());
            let snap: &mut Snapshot = Arc::make_mut(&mut *live);
            if let Err(e) = update.apply(snap, &self.settings.axes) {
                metrics::record_update_rejected();
                return Err(e);
            }
            if let Some(pending) = lock(&self.journal).as_mut() {
                pending.push(update.clone());
            }
        }
        metrics::record_update_applied();
        debug!("cache update applied: {}", update);

        if self.config.persist_on_update {
            self.persist_quietly();
        }
        Ok(())
    }

    /// Full rebuild; swaps the new snapshot in unless a hard failure occurred.
    ///
    /// Task errors still swap the partial snapshot in and are returned as `AggregateRebuild`.
    pub fn rebuild_from_datasource(&self) -> CacheResult<RebuildReport> {
        let mut report = self.rebuild_with_report()?;
        match report.take_aggregate() {
            Some(e) => Err(e),
            None => Ok(report),
        }
    }

    /// Like `rebuild_from_datasource`, but task errors stay in the returned report.
    pub fn rebuild_with_report(&self) -> CacheResult<RebuildReport> {
        if self.state.is_shut() {
            return Err(CacheError::Shutdown);
        }
        let _serial = lock(&self.rebuild_lock);
        if self.state.is_shut() {
            return Err(CacheError::Shutdown);
        }
        let _phase = self.state.rebuilding();

        *lock(&self.journal) = Some(Vec::new());
        let outcome = run_full_rebuild(&self.settings, self.datasource.clone());
        let RebuildOutcome { mut snapshot, mut report } = match outcome {
            Ok(o) => o,
            Err(e) => {
                *lock(&self.journal) = None;
                return Err(e);
            }
        };

        {
            let mut live = self.live.write().unwrap_or_else(|p| p.into_inner());
            let pending = lock(&self.journal).take().unwrap_or_default();
            if !pending.is_empty() {
                for u in &pending {
                    if let Err(e) = u.apply(&mut snapshot, &self.settings.axes) {
                        warn!("replay of {} onto rebuilt snapshot failed: {}", u, e);
                    }
                }
                metrics::record_updates_replayed(pending.len());
                report.fingerprint = snapshot.fingerprint();
                debug!("replayed {} update(s) applied during the rebuild", pending.len());
            }
            *live = Arc::new(snapshot);
        }
        metrics::record_snapshot_swap();
        self.state.mark_ready();

        if self.config.persist_on_update {
            self.persist_quietly();
        }
        Ok(report)
    }

    /// Write the current snapshot to the configured file. Returns bytes written.
    pub fn persist(&self) -> CacheResult<u64> {
        if self.state.is_shut() {
            return Err(CacheError::Shutdown);
        }
        self.persist_current()
    }

    fn persist_current(&self) -> CacheResult<u64> {
        let snap = self.snapshot();
        match persist::write_snapshot_file(&self.config.cache_file, &snap, self.config.compress) {
            Ok(n) => {
                metrics::record_persist(n);
                Ok(n)
            }
            Err(e) => {
                metrics::record_persist_failed();
                Err(CacheError::Persistence(e))
            }
        }
    }

    fn persist_quietly(&self) {
        if let Err(e) = self.persist_current() {
            error!("cache persist failed: {}", e);
        }
    }

    pub fn is_refresh_running(&self) -> bool {
        lock(&self.refresh).as_ref().map_or(false, |t| t.is_running())
    }

    /// Stop the refresh timer; returns once no further refresh can start.
    pub fn stop_refresh(&self) {
        let timer = lock(&self.refresh).take();
        if let Some(mut t) = timer {
            debug!("stopping refresh timer ({:?})", t.interval());
            t.stop();
        }
    }

    /// Stop the timer, persist the snapshot, release the datastore. Idempotent.
    ///
    /// Persistence failures are logged, not returned.
    pub fn cleanup(&self) {
        if !self.state.begin_cleanup() {
            return;
        }
        info!("content cache cleanup");
        self.stop_refresh();
        // let a rebuild in flight finish and swap
        drop(lock(&self.rebuild_lock));
        self.persist_quietly();
        self.datasource.close();
    }

    fn swap(&self, snapshot: Snapshot) {
        *self.live.write().unwrap_or_else(|p| p.into_inner()) = Arc::new(snapshot);
        metrics::record_snapshot_swap();
    }
}

impl Drop for ContentCacheController {
    fn drop(&mut self) {
        if let Some(t) = lock(&self.refresh).as_mut() {
            t.cancel();
        }
    }
}
