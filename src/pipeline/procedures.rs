//! Procedure phase: non-deleted procedures with their parents, observable properties and
//! observation identifiers. Offering relations come from the offering phase.

use anyhow::Context;

use super::{fan_out, with_session, PhaseContext, PhaseReport};
use crate::datasource::ProcedureRow;
use crate::error::CacheResult;
use crate::metrics;
use crate::snapshot::WritableCache;

pub const FAMILY: &str = "procedures";

pub(super) fn run(ctx: &PhaseContext) -> CacheResult<PhaseReport> {
    let rows = ctx.list(FAMILY, |s| s.procedures())?;
    let mut report = PhaseReport::new(FAMILY);
    report.total = rows.len();

    let items: Vec<(String, ProcedureRow)> = rows
        .into_iter()
        .filter(|r| !r.deleted)
        .map(|r| (r.identifier.clone(), r))
        .collect();
    report.queued = items.len();
    report.skipped = report.total - report.queued;
    metrics::record_tasks_skipped(report.skipped);

    let task_ctx = ctx.clone();
    let out = fan_out(FAMILY, ctx.settings.pool_size, items, ctx.deadline(), move |id, _row| {
        let details = with_session(task_ctx.datasource.as_ref(), |s| {
            s.procedure_details(id)
                .with_context(|| format!("related entities of procedure {}", id))
        })?;
        task_ctx.commit(|snap| {
            snap.add_procedure(id);
            snap.set_parent_procedures(id, details.parents);
            snap.set_observable_properties_for_procedure(id, details.observable_properties);
            for obs in &details.observation_identifiers {
                snap.add_observation_identifier(obs);
            }
            snap.set_observation_identifiers_for_procedure(id, details.observation_identifiers);
        })
    });
    report.absorb(out);
    Ok(report)
}
