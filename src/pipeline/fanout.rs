//! Bounded parallel fan-out with per-task error collection.
//!
//! - Work items go into a crossbeam queue; `pool_size` named worker threads pull from it.
//! - Every task reports to the completion channel exactly once: success, error, or panic.
//!   The orchestrator thread counts completions (the phase barrier).
//! - With a deadline, tasks that have not reported by then are recorded as timeouts,
//!   the queue is cancelled and the stragglers are left detached (the staging snapshot
//!   rejects their commits once the phase is over).

use crossbeam_channel::{unbounded, RecvTimeoutError};
use log::{debug, warn};
use std::collections::BTreeMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Instant;

use crate::error::{TaskError, TaskFailure};
use crate::metrics;

#[derive(Debug, Default)]
pub struct FanOutOutcome {
    pub completed: usize,
    pub errors: Vec<TaskError>,
    pub timed_out: bool,
}

type Completion = (String, Result<(), TaskFailure>);

/// Run `task(id, item)` for every `(id, item)` on at most `pool_size` threads and wait
/// for all of them (or for `deadline`).
pub fn fan_out<T, F>(
    family: &'static str,
    pool_size: usize,
    items: Vec<(String, T)>,
    deadline: Option<Instant>,
    task: F,
) -> FanOutOutcome
where
    T: Send + 'static,
    F: Fn(&str, T) -> anyhow::Result<()> + Send + Sync + 'static,
{
    let total = items.len();
    let mut out = FanOutOutcome::default();
    if total == 0 {
        return out;
    }

    // ids still waiting for a completion (ids are not required to be unique)
    let mut pending: BTreeMap<String, usize> = BTreeMap::new();
    let (work_tx, work_rx) = unbounded::<(String, T)>();
    for (id, item) in items {
        *pending.entry(id.clone()).or_default() += 1;
        let _ = work_tx.send((id, item));
    }
    drop(work_tx);

    let (done_tx, done_rx) = unbounded::<Completion>();
    let cancelled = Arc::new(AtomicBool::new(false));
    let task = Arc::new(task);
    let workers = pool_size.clamp(1, total);
    let mut handles = Vec::with_capacity(workers);

    for i in 0..workers {
        let rx = work_rx.clone();
        let tx = done_tx.clone();
        let task = task.clone();
        let cancelled = cancelled.clone();
        let spawned = thread::Builder::new()
            .name(format!("{}-cache-update-{}", family, i))
            .spawn(move || {
                while let Ok((id, item)) = rx.recv() {
                    if cancelled.load(Ordering::Acquire) {
                        break;
                    }
                    let res = run_one(task.as_ref(), &id, item);
                    if tx.send((id, res)).is_err() {
                        break;
                    }
                }
            });
        match spawned {
            Ok(h) => handles.push(h),
            Err(e) => warn!("{}: could not spawn worker {}: {}", family, i, e),
        }
    }
    drop(done_tx);

    if handles.is_empty() {
        // no threads at all: run inline so the phase still completes
        warn!("{}: running {} task(s) on the orchestrator thread", family, total);
        while let Ok((id, item)) = work_rx.try_recv() {
            let res = run_one(task.as_ref(), &id, item);
            record(&mut out, &mut pending, family, id, res);
        }
        return out;
    }
    drop(work_rx);

    while out.completed < total {
        let msg = match deadline {
            Some(d) => done_rx.recv_deadline(d),
            None => done_rx.recv().map_err(|_| RecvTimeoutError::Disconnected),
        };
        match msg {
            Ok((id, res)) => record(&mut out, &mut pending, family, id, res),
            Err(RecvTimeoutError::Timeout) => {
                out.timed_out = true;
                break;
            }
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    if out.completed < total {
        cancelled.store(true, Ordering::Release);
        for (id, n) in pending {
            for _ in 0..n {
                let failure = if out.timed_out {
                    TaskFailure::TimedOut
                } else {
                    TaskFailure::Panicked("worker exited before reporting".to_string())
                };
                metrics::record_task_run(true);
                out.errors.push(TaskError {
                    family: family.to_string(),
                    entity: id.clone(),
                    failure,
                });
            }
        }
        warn!(
            "{}: {} of {} task(s) did not complete{}",
            family,
            total - out.completed,
            total,
            if out.timed_out { " before the deadline" } else { "" }
        );
        // stragglers stay detached
        return out;
    }

    for h in handles {
        let _ = h.join();
    }
    debug!("{}: {} task(s) done, {} error(s)", family, out.completed, out.errors.len());
    out
}

fn run_one<T, F>(task: &F, id: &str, item: T) -> Result<(), TaskFailure>
where
    F: Fn(&str, T) -> anyhow::Result<()>,
{
    match catch_unwind(AssertUnwindSafe(|| task(id, item))) {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(TaskFailure::Query(e)),
        Err(payload) => {
            let msg = if let Some(s) = payload.downcast_ref::<&str>() {
                s.to_string()
            } else if let Some(s) = payload.downcast_ref::<String>() {
                s.clone()
            } else {
                "unknown panic payload".to_string()
            };
            Err(TaskFailure::Panicked(msg))
        }
    }
}

fn record(
    out: &mut FanOutOutcome,
    pending: &mut BTreeMap<String, usize>,
    family: &str,
    id: String,
    res: Result<(), TaskFailure>,
) {
    out.completed += 1;
    if let Some(n) = pending.get_mut(&id) {
        *n -= 1;
        if *n == 0 {
            pending.remove(&id);
        }
    }
    metrics::record_task_run(res.is_err());
    if let Err(failure) = res {
        warn!("{} '{}' failed: {}", family, id, failure);
        out.errors.push(TaskError {
            family: family.to_string(),
            entity: id,
            failure,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    fn items(n: usize) -> Vec<(String, usize)> {
        (0..n).map(|i| (format!("e{}", i), i)).collect()
    }

    #[test]
    fn all_tasks_run_once() {
        let hits = Arc::new(AtomicUsize::new(0));
        let h = hits.clone();
        let out = fan_out("test", 4, items(50), None, move |_, _| {
            h.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        assert_eq!(out.completed, 50);
        assert!(out.errors.is_empty());
        assert_eq!(hits.load(Ordering::SeqCst), 50);
    }

    #[test]
    fn errors_and_panics_are_isolated() {
        let out = fan_out("test", 3, items(10), None, |_, i| {
            if i == 3 {
                anyhow::bail!("boom");
            }
            if i == 7 {
                panic!("kaboom");
            }
            Ok(())
        });
        assert_eq!(out.completed, 10);
        assert_eq!(out.errors.len(), 2);
        let mut failed: Vec<&str> = out.errors.iter().map(|e| e.entity.as_str()).collect();
        failed.sort();
        assert_eq!(failed, vec!["e3", "e7"]);
    }

    #[test]
    fn deadline_records_timeouts() {
        let deadline = Instant::now() + Duration::from_millis(100);
        let out = fan_out("test", 2, items(2), Some(deadline), |_, i| {
            if i == 1 {
                thread::sleep(Duration::from_millis(1500));
            }
            Ok(())
        });
        assert!(out.timed_out);
        assert_eq!(out.completed, 1);
        assert_eq!(out.errors.len(), 1);
        assert!(out.errors[0].is_timeout());
        assert_eq!(out.errors[0].entity, "e1");
    }
}
