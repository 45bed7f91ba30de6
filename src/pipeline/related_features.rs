//! Related feature phase: roles per related feature. Offering membership is written by
//! the offering phase.

use super::{fan_out, PhaseContext, PhaseReport};
use crate::error::CacheResult;
use crate::snapshot::WritableCache;

pub const FAMILY: &str = "related_features";

pub(super) fn run(ctx: &PhaseContext) -> CacheResult<PhaseReport> {
    let rows = ctx.list(FAMILY, |s| s.related_features())?;
    let mut report = PhaseReport::new(FAMILY);
    report.total = rows.len();
    report.queued = rows.len();

    let items = rows.into_iter().map(|r| (r.identifier, r.roles)).collect();
    let task_ctx = ctx.clone();
    let out = fan_out(FAMILY, ctx.settings.pool_size, items, ctx.deadline(), move |id, roles| {
        task_ctx.commit(|snap| snap.set_roles_for_related_feature(id, roles))
    });
    report.absorb(out);
    Ok(report)
}
