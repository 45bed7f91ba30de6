//! DeleteObservation: forget the observation identifier.
//!
//! Per-offering time bounds cannot be shrunk without a datastore query; when the deleted
//! observation touches a bound the bound is kept and the next full rebuild corrects it.
//! Global bounds are folded again from the per-offering values.

use log::{debug, info};

use super::{require_id, validate_observation, DeleteObservationRequest};
use crate::error::CacheResult;
use crate::model::TimePeriod;
use crate::snapshot::WritableCache;

pub(super) fn validate(request: &DeleteObservationRequest) -> CacheResult<()> {
    validate_observation(&request.observation)?;
    for o in &request.offerings {
        require_id("offering", o)?;
    }
    Ok(())
}

pub(super) fn apply(cache: &mut dyn WritableCache, request: &DeleteObservationRequest) {
    let o = &request.observation;
    debug!(
        "cache update: delete observation {} of {}",
        o.identifier.as_deref().unwrap_or("-"),
        o.procedure
    );
    if let Some(id) = &o.identifier {
        cache.remove_observation_identifier(id);
        cache.remove_observation_identifier_for_procedure(&o.procedure, id);
    }

    let phenomenon = TimePeriod::from(o.phenomenon_time);
    for offering in &request.offerings {
        if let Some(bounds) = cache.phenomenon_time_for_offering(offering) {
            if bounds.start == phenomenon.start || bounds.end == phenomenon.end {
                info!(
                    "deleted observation touches the phenomenon time bounds of offering {}; kept until next rebuild",
                    offering
                );
            }
        }
    }

    cache.recalculate_phenomenon_time();
    cache.recalculate_result_time();
}
