//! InsertResultTemplate: register the accepted template with its offerings, observable
//! property and (optional) feature.

use log::debug;

use super::{require_id, InsertResultTemplateRequest, InsertResultTemplateResponse};
use crate::error::{CacheError, CacheResult};
use crate::snapshot::WritableCache;

pub(super) fn validate(request: &InsertResultTemplateRequest, response: &InsertResultTemplateResponse) -> CacheResult<()> {
    require_id("result template", &response.accepted_template)?;
    if request.offerings.is_empty() {
        return Err(CacheError::invalid_update(format!(
            "result template {} names no offering",
            response.accepted_template
        )));
    }
    for o in &request.offerings {
        require_id("offering", o)?;
    }
    let t = &request.observation_template;
    require_id("procedure", &t.procedure)?;
    require_id("observable property", &t.observable_property)?;
    if let Some(f) = &t.feature {
        require_id("feature of interest", &f.identifier)?;
    }
    Ok(())
}

pub(super) fn apply(
    cache: &mut dyn WritableCache,
    request: &InsertResultTemplateRequest,
    response: &InsertResultTemplateResponse,
) {
    let template = response.accepted_template.as_str();
    debug!("cache update: insert result template {}", template);

    cache.add_result_template(template);
    for offering in &request.offerings {
        cache.add_result_template_for_offering(offering, template);
    }
    let t = &request.observation_template;
    cache.add_observable_property_for_result_template(template, &t.observable_property);
    if let Some(f) = &t.feature {
        cache.add_feature_of_interest_for_result_template(template, &f.identifier);
    }
}
