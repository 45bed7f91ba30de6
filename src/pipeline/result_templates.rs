//! Result template phase: template identifiers with their offering, observable property
//! and features.

use super::{fan_out, PhaseContext, PhaseReport};
use crate::datasource::ResultTemplateRow;
use crate::error::CacheResult;
use crate::snapshot::{IdSet, WritableCache};

pub const FAMILY: &str = "result_templates";

pub(super) fn run(ctx: &PhaseContext) -> CacheResult<PhaseReport> {
    let rows = ctx.list(FAMILY, |s| s.result_templates())?;
    let mut report = PhaseReport::new(FAMILY);
    report.total = rows.len();
    report.queued = rows.len();

    let items = rows.into_iter().map(|r| (r.identifier.clone(), r)).collect();
    let task_ctx = ctx.clone();
    let out = fan_out(FAMILY, ctx.settings.pool_size, items, ctx.deadline(), move |id, row: ResultTemplateRow| {
        if row.offering.is_empty() || row.observable_property.is_empty() {
            anyhow::bail!("result template {} has no offering or observable property", id);
        }
        task_ctx.commit(|snap| {
            snap.add_result_template(id);
            // staging snapshot starts empty, so add == replace here
            snap.add_result_template_for_offering(&row.offering, id);
            snap.set_observable_properties_for_result_template(id, IdSet::from([row.observable_property]));
            snap.set_features_of_interest_for_result_template(id, row.features);
        })
    });
    report.absorb(out);
    Ok(report)
}
