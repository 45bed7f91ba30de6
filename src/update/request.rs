//! Decoded write requests/responses, as far as the cache needs them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{Geometry, Time};
use crate::snapshot::IdSet;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OfferingSpec {
    pub identifier: String,
    #[serde(default)]
    pub name: Option<String>,
}

impl OfferingSpec {
    pub fn new(identifier: &str) -> Self {
        Self {
            identifier: identifier.to_string(),
            name: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelatedFeatureSpec {
    pub identifier: String,
    #[serde(default)]
    pub roles: IdSet,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureSpec {
    pub identifier: String,
    #[serde(default)]
    pub feature_type: Option<String>,
    /// Native axis order of `geometry.srid`.
    #[serde(default)]
    pub geometry: Option<Geometry>,
    /// Sampled (parent) features.
    #[serde(default)]
    pub sampled_features: IdSet,
}

impl FeatureSpec {
    pub fn new(identifier: &str) -> Self {
        Self {
            identifier: identifier.to_string(),
            feature_type: None,
            geometry: None,
            sampled_features: IdSet::new(),
        }
    }

    pub fn with_geometry(mut self, geometry: Geometry) -> Self {
        self.geometry = Some(geometry);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    #[serde(default)]
    pub identifier: Option<String>,
    pub procedure: String,
    pub observable_property: String,
    #[serde(default)]
    pub observation_type: Option<String>,
    pub feature: FeatureSpec,
    pub phenomenon_time: Time,
    #[serde(default)]
    pub result_time: Option<DateTime<Utc>>,
}

// ----- InsertSensor -----

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InsertSensorRequest {
    pub observable_properties: Vec<String>,
    /// Offerings from the procedure description; the assigned offering is always added.
    pub offerings: Vec<OfferingSpec>,
    pub observation_types: IdSet,
    pub feature_of_interest_types: IdSet,
    pub related_features: Vec<RelatedFeatureSpec>,
    pub parent_procedures: IdSet,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InsertSensorResponse {
    pub assigned_procedure: String,
    pub assigned_offering: String,
}

// ----- DeleteSensor -----

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeleteSensorRequest {
    pub procedure: String,
}

// ----- InsertObservation -----

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InsertObservationRequest {
    pub offerings: Vec<String>,
    pub observations: Vec<Observation>,
}

// ----- InsertResultTemplate / InsertResult -----

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservationTemplate {
    pub procedure: String,
    pub observable_property: String,
    #[serde(default)]
    pub feature: Option<FeatureSpec>,
    #[serde(default)]
    pub observation_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InsertResultTemplateRequest {
    pub offerings: Vec<String>,
    pub observation_template: ObservationTemplate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InsertResultTemplateResponse {
    pub accepted_template: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InsertResultRequest {
    pub template_identifier: String,
    /// Observations decoded from the result values.
    pub observations: Vec<Observation>,
}

// ----- DeleteObservation -----

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeleteObservationRequest {
    pub offerings: Vec<String>,
    pub observation: Observation,
}
