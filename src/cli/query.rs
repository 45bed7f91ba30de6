use anyhow::{anyhow, Result};
use std::path::PathBuf;

use crate::persist;
use crate::snapshot::ReadableCache;

pub fn cmd_query(cache_file: PathBuf, offering: &str) -> Result<()> {
    let snap = persist::read_snapshot_file(&cache_file)?;
    if !snap.has_offering(offering) {
        return Err(anyhow!("offering '{}' not in {}", offering, cache_file.display()));
    }

    let out = serde_json::json!({
        "offering": offering,
        "name": snap.name_for_offering(offering),
        "procedures": snap.procedures_for_offering(offering),
        "hidden_child_procedures": snap.hidden_child_procedures_for_offering(offering),
        "observable_properties": snap.observable_properties_for_offering(offering),
        "observable_properties_with_composites": snap.observable_properties_for_offering_with_composites(offering),
        "composite_phenomena": snap.composite_phenomena_for_offering(offering),
        "observation_types": snap.observation_types_for_offering(offering),
        "allowed_observation_types": snap.allowed_observation_types_for_offering(offering),
        "features_of_interest": snap.features_of_interest_for_offering(offering),
        "related_features": snap.related_features_for_offering(offering),
        "result_templates": snap.result_templates_for_offering(offering),
        "envelope": snap.envelope_for_offering(offering),
        "phenomenon_time": snap.phenomenon_time_for_offering(offering),
        "result_time": snap.result_time_for_offering(offering),
    });
    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(())
}
