//! Observable property phase: members of composite phenomena.
//!
//! Plain properties have nothing to resolve; their offering/procedure relations are
//! written as inverses by the offering and procedure phases.

use super::{fan_out, PhaseContext, PhaseReport};
use crate::error::CacheResult;
use crate::metrics;
use crate::snapshot::WritableCache;

pub const FAMILY: &str = "observable_properties";

pub(super) fn run(ctx: &PhaseContext) -> CacheResult<PhaseReport> {
    let rows = ctx.list(FAMILY, |s| s.observable_properties())?;
    let mut report = PhaseReport::new(FAMILY);
    report.total = rows.len();

    let items: Vec<_> = rows
        .into_iter()
        .filter(|r| !r.components.is_empty())
        .map(|r| (r.identifier, r.components))
        .collect();
    report.queued = items.len();
    report.skipped = report.total - report.queued;
    metrics::record_tasks_skipped(report.skipped);

    let task_ctx = ctx.clone();
    let out = fan_out(FAMILY, ctx.settings.pool_size, items, ctx.deadline(), move |id, components| {
        task_ctx.commit(|snap| snap.set_observable_properties_for_composite_phenomenon(id, components))
    });
    report.absorb(out);
    Ok(report)
}
