//! DeleteSensor: drop the procedure and everything that only existed because of it.
//!
//! Offerings left without procedures lose all their per-offering data; features,
//! related features and observation identifiers no longer referenced are pruned; global
//! bounds are folded again from what remains.

use log::{debug, warn};

use super::{require_id, DeleteSensorRequest};
use crate::error::CacheResult;
use crate::snapshot::{IdSet, WritableCache};

pub(super) fn validate(request: &DeleteSensorRequest) -> CacheResult<()> {
    require_id("procedure", &request.procedure)
}

pub(super) fn apply(cache: &mut dyn WritableCache, request: &DeleteSensorRequest) {
    let procedure = request.procedure.as_str();
    if !cache.has_procedure(procedure) && cache.offerings_for_procedure(procedure).is_empty() {
        warn!("cache update: delete sensor {}: procedure not in cache", procedure);
    }
    debug!("cache update: delete sensor {}", procedure);

    // offerings_for_procedure leaves out hidden child memberships
    let mut offerings = cache.offerings_for_procedure(procedure);
    offerings.extend(
        cache
            .offerings()
            .into_iter()
            .filter(|o| cache.hidden_child_procedures_for_offering(o).contains(procedure)),
    );
    let observation_ids = cache.observation_identifiers_for_procedure(procedure);
    let features: IdSet = cache
        .features_of_interest()
        .into_iter()
        .filter(|f| cache.procedures_for_feature_of_interest(f).contains(procedure))
        .collect();

    cache.remove_procedure(procedure);

    for id in &observation_ids {
        cache.remove_observation_identifier(id);
    }

    let mut dropped_related = IdSet::new();
    for offering in &offerings {
        if !cache.all_procedures_for_offering(offering).is_empty() {
            continue;
        }
        debug!("offering {} has no procedures left, removing it", offering);
        dropped_related.extend(cache.related_features_for_offering(offering));
        for template in cache.result_templates_for_offering(offering) {
            cache.remove_result_template(&template);
        }
        cache.remove_offering(offering);
    }

    for related in dropped_related {
        if !cache.has_related_feature(&related) {
            cache.remove_roles_for_related_feature(&related);
        }
    }

    for feature in features {
        if cache.procedures_for_feature_of_interest(&feature).is_empty() {
            cache.remove_feature_of_interest(&feature);
        }
    }

    cache.recalculate_global_envelope();
    cache.recalculate_phenomenon_time();
    cache.recalculate_result_time();
}
