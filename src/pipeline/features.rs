//! Feature of interest phase: identifiers, parent (sampled) features and the procedures
//! that observed each feature.

use anyhow::Context;

use super::{fan_out, with_session, PhaseContext, PhaseReport};
use crate::error::CacheResult;
use crate::snapshot::WritableCache;

pub const FAMILY: &str = "features";

pub(super) fn run(ctx: &PhaseContext) -> CacheResult<PhaseReport> {
    let rows = ctx.list(FAMILY, |s| s.features())?;
    let mut report = PhaseReport::new(FAMILY);
    report.total = rows.len();
    report.queued = rows.len();

    let items = rows.into_iter().map(|r| (r.identifier.clone(), r)).collect();
    let task_ctx = ctx.clone();
    let out = fan_out(FAMILY, ctx.settings.pool_size, items, ctx.deadline(), move |id, _row| {
        let details = with_session(task_ctx.datasource.as_ref(), |s| {
            s.feature_details(id)
                .with_context(|| format!("related entities of feature {}", id))
        })?;
        task_ctx.commit(|snap| {
            snap.add_feature_of_interest(id);
            snap.set_parent_features(id, details.parents);
            snap.set_procedures_for_feature_of_interest(id, details.procedures);
        })
    });
    report.absorb(out);
    Ok(report)
}
