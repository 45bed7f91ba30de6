//! InsertObservation: grow procedure, feature, offering and global state by each
//! inserted observation; envelopes and time bounds only ever expand.

use log::debug;

use super::{require_id, validate_observation, InsertObservationRequest, Observation};
use crate::error::{CacheError, CacheResult};
use crate::model::{SwitchedAxes, TimePeriod};
use crate::snapshot::WritableCache;

pub(super) fn validate(request: &InsertObservationRequest) -> CacheResult<()> {
    if request.offerings.is_empty() {
        return Err(CacheError::invalid_update("observation insertion names no offering"));
    }
    for o in &request.offerings {
        require_id("offering", o)?;
    }
    if request.observations.is_empty() {
        return Err(CacheError::invalid_update("observation insertion carries no observation"));
    }
    for o in &request.observations {
        validate_observation(o)?;
    }
    Ok(())
}

pub(super) fn apply(cache: &mut dyn WritableCache, request: &InsertObservationRequest, axes: &SwitchedAxes) {
    for observation in &request.observations {
        apply_observation(cache, observation, &request.offerings, axes);
    }
}

/// Mirror one observation inserted under `offerings`.
pub(super) fn apply_observation(
    cache: &mut dyn WritableCache,
    o: &Observation,
    offerings: &[String],
    axes: &SwitchedAxes,
) {
    debug!(
        "cache update: observation {} of {} at {}",
        o.identifier.as_deref().unwrap_or("-"),
        o.procedure,
        o.feature.identifier
    );
    let procedure = o.procedure.as_str();
    let property = o.observable_property.as_str();
    let feature = o.feature.identifier.as_str();
    let phenomenon = TimePeriod::from(o.phenomenon_time);
    let result = o.result_time.map(TimePeriod::instant);

    cache.add_procedure(procedure);
    cache.add_observable_property_for_procedure(procedure, property);
    cache.update_global_phenomenon_time(&phenomenon);
    if let Some(r) = &result {
        cache.update_global_result_time(r);
    }
    if let Some(t) = &o.observation_type {
        cache.add_observation_type(t);
    }
    if let Some(id) = &o.identifier {
        cache.add_observation_identifier(id);
        cache.add_observation_identifier_for_procedure(procedure, id);
    }

    cache.add_feature_of_interest(feature);
    cache.add_procedure_for_feature_of_interest(feature, procedure);
    if let Some(t) = &o.feature.feature_type {
        cache.add_feature_of_interest_type(t);
    }
    for parent in &o.feature.sampled_features {
        cache.add_parent_feature(feature, parent);
    }

    let envelope = o.feature.geometry.as_ref().and_then(|g| {
        cache.add_epsg_code(g.srid);
        g.envelope(axes)
    });
    if let Some(e) = &envelope {
        cache.update_global_envelope(e);
    }

    for offering in offerings {
        if cache.name_for_offering(offering).is_none() {
            cache.set_name_for_offering(offering, offering);
        }
        cache.add_procedure_for_offering(offering, procedure);
        cache.add_observable_property_for_offering(offering, property);
        cache.add_feature_of_interest_for_offering(offering, feature);
        if let Some(t) = &o.observation_type {
            cache.add_observation_type_for_offering(offering, t);
        }
        cache.update_phenomenon_time_for_offering(offering, &phenomenon);
        if let Some(r) = &result {
            cache.update_result_time_for_offering(offering, r);
        }
        if let Some(e) = &envelope {
            cache.update_envelope_for_offering(offering, e);
        }
    }
}
