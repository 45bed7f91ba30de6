//! InsertResult: observations decoded from result values of a known template; the
//! offerings are the ones the template is registered under.

use log::debug;

use super::observation_insertion::apply_observation;
use super::{require_id, validate_observation, InsertResultRequest};
use crate::error::{CacheError, CacheResult};
use crate::model::SwitchedAxes;
use crate::snapshot::WritableCache;

pub(super) fn validate(request: &InsertResultRequest) -> CacheResult<()> {
    require_id("result template", &request.template_identifier)?;
    if request.observations.is_empty() {
        return Err(CacheError::invalid_update(format!(
            "result insertion for template {} carries no observation",
            request.template_identifier
        )));
    }
    for o in &request.observations {
        validate_observation(o)?;
    }
    Ok(())
}

pub(super) fn apply(cache: &mut dyn WritableCache, request: &InsertResultRequest, axes: &SwitchedAxes) -> CacheResult<()> {
    let template = request.template_identifier.as_str();
    if !cache.has_result_template(template) {
        return Err(CacheError::invalid_update(format!("unknown result template {}", template)));
    }
    let offerings: Vec<String> = cache
        .offerings()
        .into_iter()
        .filter(|o| cache.has_result_template_for_offering(template, o))
        .collect();
    if offerings.is_empty() {
        return Err(CacheError::invalid_update(format!(
            "result template {} is not registered under any offering",
            template
        )));
    }

    debug!(
        "cache update: {} result observation(s) for template {}",
        request.observations.len(),
        template
    );
    for o in &request.observations {
        apply_observation(cache, o, &offerings, axes);
        cache.add_feature_of_interest_for_result_template(template, &o.feature.identifier);
    }
    Ok(())
}
