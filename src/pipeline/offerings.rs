//! Offering phase: per offering name, procedures, observable properties, observation types,
//! related features, features, envelope and time bounds.
//!
//! Offerings whose constellations are all deleted are skipped (counted, not submitted).

use anyhow::Context;

use super::{fan_out, with_session, PhaseContext, PhaseReport};
use crate::datasource::{OfferingDetails, OfferingRow, TimeBounds};
use crate::error::CacheResult;
use crate::metrics;
use crate::model::{Envelope, SwitchedAxes};
use crate::snapshot::{IdSet, WritableCache};

pub const FAMILY: &str = "offerings";

pub(super) fn run(ctx: &PhaseContext) -> CacheResult<PhaseReport> {
    let rows = ctx.list(FAMILY, |s| s.offerings())?;
    let mut report = PhaseReport::new(FAMILY);
    report.total = rows.len();

    let (active, inactive): (Vec<OfferingRow>, Vec<OfferingRow>) =
        rows.into_iter().partition(|r| r.has_active_constellations);
    report.skipped = inactive.len();
    report.queued = active.len();
    metrics::record_tasks_skipped(inactive.len());
    for r in &inactive {
        log::debug!("offering {} has only deleted constellations, skipped", r.identifier);
    }

    let items = active.into_iter().map(|r| (r.identifier.clone(), r)).collect();
    let task_ctx = ctx.clone();
    let out = fan_out(FAMILY, ctx.settings.pool_size, items, ctx.deadline(), move |id, row| {
        update_offering(&task_ctx, id, row)
    });
    report.absorb(out);
    Ok(report)
}

/// Everything derived for one offering before it is committed.
struct OfferingUpdate {
    name: String,
    procedures: IdSet,
    hidden_child_procedures: IdSet,
    observable_properties: IdSet,
    composite_phenomena: IdSet,
    observation_types: IdSet,
    allowed_observation_types: IdSet,
    related_features: IdSet,
    features: IdSet,
    envelope: Option<Envelope>,
    times: TimeBounds,
}

fn update_offering(ctx: &PhaseContext, id: &str, row: OfferingRow) -> anyhow::Result<()> {
    let axes = &ctx.settings.axes;
    let update = with_session(ctx.datasource.as_ref(), |s| {
        let details = s
            .offering_details(id)
            .with_context(|| format!("related entities of offering {}", id))?;
        let geometries = s
            .geometries_for_features(&details.features)
            .with_context(|| format!("envelope of offering {}", id))?;
        let times = s
            .time_bounds_for_offering(id)
            .with_context(|| format!("time bounds of offering {}", id))?;
        Ok(derive(row, details, envelope_of(&geometries, axes), times))
    })?;

    ctx.commit(|snap| {
        snap.set_name_for_offering(id, &update.name);
        snap.set_procedures_for_offering(id, update.procedures);
        snap.set_hidden_child_procedures_for_offering(id, update.hidden_child_procedures);
        snap.set_observable_properties_for_offering(id, update.observable_properties);
        snap.set_composite_phenomena_for_offering(id, update.composite_phenomena);
        snap.set_observation_types_for_offering(id, update.observation_types);
        snap.set_allowed_observation_types_for_offering(id, update.allowed_observation_types);
        snap.set_related_features_for_offering(id, update.related_features);
        snap.set_features_of_interest_for_offering(id, update.features);
        snap.set_envelope_for_offering(id, update.envelope);
        snap.set_phenomenon_time_for_offering(id, update.times.phenomenon);
        snap.set_result_time_for_offering(id, update.times.result);
    })
}

fn derive(row: OfferingRow, details: OfferingDetails, envelope: Option<Envelope>, times: TimeBounds) -> OfferingUpdate {
    let mut procedures = IdSet::new();
    let mut hidden = IdSet::new();
    let mut properties = IdSet::new();
    let mut types = IdSet::new();
    for c in details.constellations {
        if c.hidden_child {
            hidden.insert(c.procedure);
        } else {
            procedures.insert(c.procedure);
        }
        properties.insert(c.observable_property);
        if let Some(t) = c.observation_type {
            types.insert(t);
        }
    }
    // a procedure listed both ways is primary
    hidden.retain(|p| !procedures.contains(p));

    OfferingUpdate {
        name: row.name.unwrap_or_else(|| row.identifier.clone()),
        procedures,
        hidden_child_procedures: hidden,
        observable_properties: properties,
        composite_phenomena: details.composite_phenomena,
        observation_types: types,
        allowed_observation_types: details.allowed_observation_types,
        related_features: details.related_features,
        features: details.features,
        envelope,
        times,
    }
}

fn envelope_of(geometries: &[crate::model::Geometry], axes: &SwitchedAxes) -> Option<Envelope> {
    let envs: Vec<Envelope> = geometries.iter().filter_map(|g| g.envelope(axes)).collect();
    crate::model::union_all(envs.iter())
}
