//! InsertSensor: register the procedure with its offerings, observable properties,
//! allowed observation types and related features.

use log::debug;

use super::{require_id, require_ids, InsertSensorRequest, InsertSensorResponse};
use crate::error::{CacheError, CacheResult};
use crate::snapshot::WritableCache;

pub(super) fn validate(request: &InsertSensorRequest, response: &InsertSensorResponse) -> CacheResult<()> {
    require_id("assigned procedure", &response.assigned_procedure)?;
    require_id("assigned offering", &response.assigned_offering)?;
    require_ids("offering", request.offerings.iter().map(|o| &o.identifier))?;
    if require_ids("observable property", &request.observable_properties)? == 0 {
        return Err(CacheError::invalid_update(format!(
            "sensor {} declares no observable property",
            response.assigned_procedure
        )));
    }
    require_ids("parent procedure", &request.parent_procedures)?;
    require_ids("related feature", request.related_features.iter().map(|r| &r.identifier))?;
    Ok(())
}

pub(super) fn apply(cache: &mut dyn WritableCache, request: &InsertSensorRequest, response: &InsertSensorResponse) {
    let procedure = response.assigned_procedure.as_str();
    debug!("cache update: insert sensor {}", procedure);

    cache.add_procedure(procedure);
    for parent in &request.parent_procedures {
        cache.add_parent_procedure(procedure, parent);
    }

    // assigned offering first, then any further offerings of the description
    let mut offerings: Vec<(&str, Option<&str>)> = vec![(response.assigned_offering.as_str(), None)];
    for o in &request.offerings {
        if o.identifier == response.assigned_offering {
            offerings[0].1 = o.name.as_deref();
        } else {
            offerings.push((o.identifier.as_str(), o.name.as_deref()));
        }
    }

    for (offering, name) in offerings {
        cache.add_procedure_for_offering(offering, procedure);
        if cache.name_for_offering(offering).is_none() {
            cache.set_name_for_offering(offering, name.unwrap_or(offering));
        }
        cache.add_allowed_observation_types_for_offering(offering, &request.observation_types);
        for related in &request.related_features {
            cache.add_related_feature_for_offering(offering, &related.identifier);
            for role in &related.roles {
                cache.add_role_for_related_feature(&related.identifier, role);
            }
        }
        for property in &request.observable_properties {
            cache.add_observable_property_for_offering(offering, property);
        }
    }

    for property in &request.observable_properties {
        cache.add_observable_property_for_procedure(procedure, property);
    }
    for feature_type in &request.feature_of_interest_types {
        cache.add_feature_of_interest_type(feature_type);
    }
}
