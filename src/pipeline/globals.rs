//! Global phase: EPSG codes, observation types and schema-level sets.
//! A single task; a failure here is a task error like any other.

use anyhow::Context;

use super::{fan_out, with_session, PhaseContext, PhaseReport};
use crate::error::CacheResult;
use crate::snapshot::WritableCache;

pub const FAMILY: &str = "global";

pub(super) fn run(ctx: &PhaseContext) -> CacheResult<PhaseReport> {
    let mut report = PhaseReport::new(FAMILY);
    report.total = 1;
    report.queued = 1;

    let task_ctx = ctx.clone();
    let items = vec![(FAMILY.to_string(), ())];
    let out = fan_out(FAMILY, 1, items, ctx.deadline(), move |_, ()| {
        let info = with_session(task_ctx.datasource.as_ref(), |s| {
            s.global_info().context("global cache values")
        })?;
        let default_epsg = task_ctx.settings.default_epsg;
        task_ctx.commit(|snap| {
            let mut codes = info.epsg_codes;
            codes.insert(default_epsg);
            snap.set_default_epsg(default_epsg);
            snap.set_epsg_codes(codes);
            snap.set_observation_types(info.observation_types);
            snap.set_feature_of_interest_types(info.feature_of_interest_types);
            snap.set_procedure_description_formats(info.procedure_description_formats);
            snap.set_swe_types(info.swe_types);
        })
    });
    report.absorb(out);
    Ok(report)
}
