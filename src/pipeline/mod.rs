//! Full rebuild of the content cache from the datastore.
//!
//! A rebuild allocates a brand-new staging snapshot and runs the family phases against it
//! in a fixed order:
//!
//!   offerings → procedures → observable properties → features of interest →
//!   related features → result templates → global → derived
//!
//! Every phase lists the top-level entities of its family (one session), fans per-entity
//! tasks out over the bounded pool (`fanout::fan_out`, one session per task) and waits on
//! the completion barrier. Tasks gather everything first and then commit into the staging
//! snapshot in one step, so a failed task leaves no trace.
//!
//! Hard failures (no session, listing failed) abort the rebuild with an error. Per-task
//! failures are collected in the `RebuildReport`; the caller decides what to do with them.
//!
//! Submodules:
//! - fanout:   generic bounded fan-out with error collection.
//! - one module per entity family.

pub mod fanout;

mod features;
mod globals;
mod observable_properties;
mod offerings;
mod procedures;
mod related_features;
mod result_templates;

use anyhow::{anyhow, Result};
use log::{debug, info, warn};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::config::CacheConfig;
use crate::datasource::{Datasource, DatasourceSession};
use crate::error::{CacheError, CacheResult, TaskError};
use crate::metrics;
use crate::model::SwitchedAxes;
use crate::snapshot::{Snapshot, WritableCache};

pub use fanout::{fan_out, FanOutOutcome};

/// Settings a rebuild needs, resolved from `CacheConfig`.
#[derive(Debug, Clone)]
pub struct RebuildSettings {
    pub pool_size: usize,
    pub default_epsg: i32,
    pub axes: SwitchedAxes,
    /// Deadline for each phase.
    pub phase_timeout: Option<Duration>,
}

impl RebuildSettings {
    pub fn from_config(cfg: &CacheConfig) -> CacheResult<Self> {
        Ok(Self {
            pool_size: cfg.effective_pool_size(),
            default_epsg: cfg.default_epsg,
            axes: cfg.switched_axes()?,
            phase_timeout: cfg.task_timeout,
        })
    }
}

impl Default for RebuildSettings {
    fn default() -> Self {
        Self {
            pool_size: 1,
            default_epsg: crate::config::DEFAULT_EPSG,
            axes: SwitchedAxes::default(),
            phase_timeout: None,
        }
    }
}

// ----- staging snapshot -----

/// Snapshot under construction, shared by the tasks of one rebuild.
///
/// Commits are tagged with the phase that produced them; once the staging snapshot moved
/// on to a later phase (or was sealed), late results of a timed-out phase are rejected.
pub struct Staging {
    snapshot: Mutex<Snapshot>,
    phase: AtomicUsize,
    sealed: AtomicBool,
}

impl Staging {
    pub fn new(default_epsg: i32) -> Arc<Self> {
        Arc::new(Self {
            snapshot: Mutex::new(Snapshot::new(default_epsg)),
            phase: AtomicUsize::new(0),
            sealed: AtomicBool::new(false),
        })
    }

    /// Apply `f` to the staging snapshot under its lock.
    pub fn commit<F>(&self, phase: usize, f: F) -> Result<()>
    where
        F: FnOnce(&mut Snapshot),
    {
        let mut guard = self.snapshot.lock().unwrap_or_else(|p| p.into_inner());
        if self.sealed.load(Ordering::Acquire) || self.phase.load(Ordering::Acquire) != phase {
            return Err(anyhow!("staging snapshot moved on, late result discarded"));
        }
        f(&mut guard);
        Ok(())
    }

    fn begin_phase(&self, phase: usize) {
        let _guard = self.snapshot.lock().unwrap_or_else(|p| p.into_inner());
        self.phase.store(phase, Ordering::Release);
    }

    pub fn seal(&self) {
        let _guard = self.snapshot.lock().unwrap_or_else(|p| p.into_inner());
        self.sealed.store(true, Ordering::Release);
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed.load(Ordering::Acquire)
    }

    /// Seal and take the built snapshot out.
    fn finish(&self, default_epsg: i32) -> Snapshot {
        let mut guard = self.snapshot.lock().unwrap_or_else(|p| p.into_inner());
        self.sealed.store(true, Ordering::Release);
        std::mem::replace(&mut *guard, Snapshot::new(default_epsg))
    }
}

/// Everything a phase needs. Cloned into task closures.
#[derive(Clone)]
pub(crate) struct PhaseContext {
    pub datasource: Arc<dyn Datasource>,
    pub staging: Arc<Staging>,
    pub settings: Arc<RebuildSettings>,
    pub phase: usize,
}

impl PhaseContext {
    /// Commit a task result into the staging snapshot.
    fn commit<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce(&mut Snapshot),
    {
        self.staging.commit(self.phase, f)
    }

    fn deadline(&self) -> Option<Instant> {
        self.settings.phase_timeout.map(|t| Instant::now() + t)
    }

    /// List top-level entities with a dedicated session. Errors here are hard failures.
    fn list<T, F>(&self, family: &str, f: F) -> CacheResult<T>
    where
        F: FnOnce(&dyn DatasourceSession) -> Result<T>,
    {
        let session = self
            .datasource
            .open_session()
            .map_err(|e| CacheError::DatasourceQuery(e.context(format!("open session for {} listing", family))))?;
        f(session.as_ref())
            .map_err(|e| CacheError::DatasourceQuery(e.context(format!("list {}", family))))
    }
}

/// Run `f` with a fresh session; the session is dropped when `f` returns.
pub(crate) fn with_session<T, F>(ds: &dyn Datasource, f: F) -> Result<T>
where
    F: FnOnce(&dyn DatasourceSession) -> Result<T>,
{
    let session = ds.open_session()?;
    f(session.as_ref())
}

// ----- reports -----

#[derive(Debug, Serialize)]
pub struct PhaseReport {
    pub family: &'static str,
    /// Top-level entities listed.
    pub total: usize,
    pub queued: usize,
    /// Entities without reachable children (counted as done, not submitted).
    pub skipped: usize,
    pub timed_out: bool,
    #[serde(serialize_with = "serialize_task_errors")]
    pub errors: Vec<TaskError>,
    #[serde(serialize_with = "serialize_duration_ms")]
    pub duration: Duration,
}

impl PhaseReport {
    fn new(family: &'static str) -> Self {
        Self {
            family,
            total: 0,
            queued: 0,
            skipped: 0,
            timed_out: false,
            errors: Vec::new(),
            duration: Duration::ZERO,
        }
    }

    fn absorb(&mut self, out: FanOutOutcome) {
        self.timed_out |= out.timed_out;
        self.errors.extend(out.errors);
    }
}

#[derive(Debug, Serialize)]
pub struct RebuildReport {
    pub phases: Vec<PhaseReport>,
    #[serde(serialize_with = "serialize_duration_ms")]
    pub duration: Duration,
    pub fingerprint: u64,
}

impl RebuildReport {
    pub fn error_count(&self) -> usize {
        self.phases.iter().map(|p| p.errors.len()).sum()
    }

    pub fn is_clean(&self) -> bool {
        self.error_count() == 0
    }

    /// Move all task errors out as an `AggregateRebuild`, or None if there were none.
    pub fn take_aggregate(&mut self) -> Option<CacheError> {
        if self.is_clean() {
            return None;
        }
        let mut phases = Vec::new();
        let mut errors = Vec::new();
        for p in &mut self.phases {
            if !p.errors.is_empty() {
                phases.push(p.family.to_string());
                errors.append(&mut p.errors);
            }
        }
        Some(CacheError::AggregateRebuild { phases, errors })
    }
}

fn serialize_duration_ms<S: serde::Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u64(d.as_millis() as u64)
}

fn serialize_task_errors<S: serde::Serializer>(errs: &[TaskError], s: S) -> Result<S::Ok, S::Error> {
    s.collect_seq(errs.iter().map(|e| e.to_string()))
}

/// Result of a rebuild that got past every phase (possibly with task errors).
pub struct RebuildOutcome {
    pub snapshot: Snapshot,
    pub report: RebuildReport,
}

type Phase = fn(&PhaseContext) -> CacheResult<PhaseReport>;

const PHASES: &[Phase] = &[
    offerings::run,
    procedures::run,
    observable_properties::run,
    features::run,
    related_features::run,
    result_templates::run,
    globals::run,
];

/// Populate a new snapshot from the datastore.
///
/// Returns `Err` only for hard failures; task errors are in the report.
pub fn run_full_rebuild(
    settings: &RebuildSettings,
    datasource: Arc<dyn Datasource>,
) -> CacheResult<RebuildOutcome> {
    let started = Instant::now();
    metrics::record_rebuild_started();
    info!(
        "content cache rebuild started (pool_size={}, phase_timeout={:?})",
        settings.pool_size, settings.phase_timeout
    );

    let staging = Staging::new(settings.default_epsg);
    let mut ctx = PhaseContext {
        datasource,
        staging: staging.clone(),
        settings: Arc::new(settings.clone()),
        phase: 0,
    };

    let mut phases = Vec::with_capacity(PHASES.len() + 1);
    for (n, phase) in PHASES.iter().enumerate() {
        ctx.phase = n;
        staging.begin_phase(n);
        let t0 = Instant::now();
        match phase(&ctx) {
            Ok(mut report) => {
                report.duration = t0.elapsed();
                debug!(
                    "phase {} done: total={} queued={} skipped={} errors={} in {:?}",
                    report.family,
                    report.total,
                    report.queued,
                    report.skipped,
                    report.errors.len(),
                    report.duration
                );
                phases.push(report);
            }
            Err(e) => {
                staging.seal();
                metrics::record_rebuild_failed();
                warn!("content cache rebuild aborted: {}", e);
                return Err(e);
            }
        }
    }

    let mut snapshot = staging.finish(settings.default_epsg);
    phases.push(derive_globals(&mut snapshot));

    let report = RebuildReport {
        phases,
        duration: started.elapsed(),
        fingerprint: snapshot.fingerprint(),
    };
    if report.is_clean() {
        metrics::record_rebuild_succeeded();
        info!(
            "content cache rebuild finished in {:?} (fingerprint {:016x})",
            report.duration, report.fingerprint
        );
    } else {
        metrics::record_rebuild_partial();
        warn!(
            "content cache rebuild finished in {:?} with {} task error(s)",
            report.duration,
            report.error_count()
        );
    }
    Ok(RebuildOutcome { snapshot, report })
}

/// Global envelope and time bounds folded from the per-offering values.
fn derive_globals(snapshot: &mut Snapshot) -> PhaseReport {
    let t0 = Instant::now();
    snapshot.recalculate_global_envelope();
    snapshot.recalculate_phenomenon_time();
    snapshot.recalculate_result_time();
    let mut report = PhaseReport::new("derived");
    report.duration = t0.elapsed();
    report
}
