//! Incremental cache updaters.
//!
//! Each successful write operation is mirrored onto the live snapshot by one `CacheUpdate`.
//! `apply` validates the whole argument before the first mutation, so a rejected update
//! leaves the snapshot untouched. Updaters only grow relation sets (`add_*`); the deletion
//! updaters are the only ones that remove.
//!
//! Submodules:
//! - request:                   decoded request/response values
//! - sensor_insertion / sensor_deletion
//! - observation_insertion / observation_deletion
//! - result_template_insertion / result_insertion

pub mod request;

mod observation_deletion;
mod observation_insertion;
mod result_insertion;
mod result_template_insertion;
mod sensor_deletion;
mod sensor_insertion;

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{CacheError, CacheResult};
use crate::model::SwitchedAxes;
use crate::snapshot::WritableCache;

pub use request::*;

/// One write effect to mirror into the cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CacheUpdate {
    SensorInsertion {
        request: InsertSensorRequest,
        response: InsertSensorResponse,
    },
    SensorDeletion {
        request: DeleteSensorRequest,
    },
    ObservationInsertion {
        request: InsertObservationRequest,
    },
    ResultTemplateInsertion {
        request: InsertResultTemplateRequest,
        response: InsertResultTemplateResponse,
    },
    ResultInsertion {
        request: InsertResultRequest,
    },
    ObservationDeletion {
        request: DeleteObservationRequest,
    },
}

impl CacheUpdate {
    pub fn kind(&self) -> &'static str {
        match self {
            CacheUpdate::SensorInsertion { .. } => "sensor insertion",
            CacheUpdate::SensorDeletion { .. } => "sensor deletion",
            CacheUpdate::ObservationInsertion { .. } => "observation insertion",
            CacheUpdate::ResultTemplateInsertion { .. } => "result template insertion",
            CacheUpdate::ResultInsertion { .. } => "result insertion",
            CacheUpdate::ObservationDeletion { .. } => "observation deletion",
        }
    }

    /// Structural checks only; nothing is read from or written to the cache.
    pub fn validate(&self) -> CacheResult<()> {
        match self {
            CacheUpdate::SensorInsertion { request, response } => sensor_insertion::validate(request, response),
            CacheUpdate::SensorDeletion { request } => sensor_deletion::validate(request),
            CacheUpdate::ObservationInsertion { request } => observation_insertion::validate(request),
            CacheUpdate::ResultTemplateInsertion { request, response } => {
                result_template_insertion::validate(request, response)
            }
            CacheUpdate::ResultInsertion { request } => result_insertion::validate(request),
            CacheUpdate::ObservationDeletion { request } => observation_deletion::validate(request),
        }
    }

    /// Validate, then mutate `cache`.
    pub fn apply(&self, cache: &mut dyn WritableCache, axes: &SwitchedAxes) -> CacheResult<()> {
        self.validate()?;
        match self {
            CacheUpdate::SensorInsertion { request, response } => {
                sensor_insertion::apply(cache, request, response);
                Ok(())
            }
            CacheUpdate::SensorDeletion { request } => {
                sensor_deletion::apply(cache, request);
                Ok(())
            }
            CacheUpdate::ObservationInsertion { request } => {
                observation_insertion::apply(cache, request, axes);
                Ok(())
            }
            CacheUpdate::ResultTemplateInsertion { request, response } => {
                result_template_insertion::apply(cache, request, response);
                Ok(())
            }
            CacheUpdate::ResultInsertion { request } => result_insertion::apply(cache, request, axes),
            CacheUpdate::ObservationDeletion { request } => {
                observation_deletion::apply(cache, request);
                Ok(())
            }
        }
    }
}

impl fmt::Display for CacheUpdate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheUpdate::SensorInsertion { response, .. } => {
                write!(f, "{} ({})", self.kind(), response.assigned_procedure)
            }
            CacheUpdate::SensorDeletion { request } => write!(f, "{} ({})", self.kind(), request.procedure),
            CacheUpdate::ObservationInsertion { request } => {
                write!(f, "{} ({} observation(s))", self.kind(), request.observations.len())
            }
            CacheUpdate::ResultTemplateInsertion { response, .. } => {
                write!(f, "{} ({})", self.kind(), response.accepted_template)
            }
            CacheUpdate::ResultInsertion { request } => {
                write!(f, "{} ({})", self.kind(), request.template_identifier)
            }
            CacheUpdate::ObservationDeletion { request } => write!(
                f,
                "{} ({})",
                self.kind(),
                request.observation.identifier.as_deref().unwrap_or("-")
            ),
        }
    }
}

// ----- validation helpers -----

pub(crate) fn require_id(what: &str, id: &str) -> CacheResult<()> {
    if id.trim().is_empty() {
        return Err(CacheError::invalid_update(format!("{} identifier is empty", what)));
    }
    Ok(())
}

pub(crate) fn require_ids<'a, I>(what: &str, ids: I) -> CacheResult<usize>
where
    I: IntoIterator<Item = &'a String>,
{
    let mut n = 0;
    for id in ids {
        require_id(what, id)?;
        n += 1;
    }
    Ok(n)
}

pub(crate) fn validate_observation(o: &Observation) -> CacheResult<()> {
    if let Some(id) = &o.identifier {
        require_id("observation", id)?;
    }
    require_id("procedure", &o.procedure)?;
    require_id("observable property", &o.observable_property)?;
    require_id("feature of interest", &o.feature.identifier)?;
    require_ids("sampled feature", &o.feature.sampled_features)?;
    if let Some(g) = &o.feature.geometry {
        if g.coordinates.iter().any(|c| !c[0].is_finite() || !c[1].is_finite()) {
            return Err(CacheError::invalid_update(format!(
                "geometry of feature {} has non-finite coordinates",
                o.feature.identifier
            )));
        }
    }
    Ok(())
}
