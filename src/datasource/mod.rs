//! Boundary to the datastore query layer.
//!
//! The cache never talks to a database directly. Rebuild tasks open one `DatasourceSession`
//! each (scoped: dropped when the task returns) and ask it for:
//! - top-level entities of a family (`offerings()`, `procedures()`, ...),
//! - related entities of one entity (`offering_details()`, `procedure_details()`, ...),
//! - envelope inputs for a set of features (`geometries_for_features()`),
//! - time bounds of one offering (`time_bounds_for_offering()`).
//!
//! All calls are synchronous and fail with an error.
//!
//! Submodules:
//! - memory: fixture-backed in-memory datastore with fault injection.

pub mod memory;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::model::{Geometry, TimePeriod};
use crate::snapshot::IdSet;

/// Source of datastore sessions. Shared between the controller and all worker threads.
pub trait Datasource: Send + Sync {
    fn open_session(&self) -> Result<Box<dyn DatasourceSession>>;

    /// Release datastore resources. Called once on controller cleanup.
    fn close(&self) {}
}

/// One datastore connection. Never shared across threads.
pub trait DatasourceSession: Send {
    // ----- top-level listings -----
    fn offerings(&self) -> Result<Vec<OfferingRow>>;
    fn procedures(&self) -> Result<Vec<ProcedureRow>>;
    fn observable_properties(&self) -> Result<Vec<ObservablePropertyRow>>;
    fn features(&self) -> Result<Vec<FeatureRow>>;
    fn related_features(&self) -> Result<Vec<RelatedFeatureRow>>;
    fn result_templates(&self) -> Result<Vec<ResultTemplateRow>>;

    // ----- related entities -----
    fn offering_details(&self, offering: &str) -> Result<OfferingDetails>;
    fn procedure_details(&self, procedure: &str) -> Result<ProcedureDetails>;
    fn feature_details(&self, feature: &str) -> Result<FeatureDetails>;

    // ----- derived values -----
    fn geometries_for_features(&self, features: &IdSet) -> Result<Vec<Geometry>>;
    fn time_bounds_for_offering(&self, offering: &str) -> Result<TimeBounds>;

    fn global_info(&self) -> Result<GlobalInfo>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OfferingRow {
    pub identifier: String,
    pub name: Option<String>,
    /// False when every observation constellation of the offering is deleted.
    pub has_active_constellations: bool,
}

/// Procedure × observable property × offering, the unit observations are grouped by.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Constellation {
    pub procedure: String,
    pub observable_property: String,
    pub offering: String,
    #[serde(default)]
    pub observation_type: Option<String>,
    #[serde(default)]
    pub hidden_child: bool,
    #[serde(default)]
    pub deleted: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OfferingDetails {
    /// Non-deleted constellations only.
    pub constellations: Vec<Constellation>,
    pub allowed_observation_types: IdSet,
    pub composite_phenomena: IdSet,
    pub related_features: IdSet,
    pub features: IdSet,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcedureRow {
    pub identifier: String,
    pub deleted: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcedureDetails {
    pub parents: IdSet,
    pub observable_properties: IdSet,
    pub observation_identifiers: IdSet,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObservablePropertyRow {
    pub identifier: String,
    /// Members if this is a composite phenomenon.
    pub components: IdSet,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeatureRow {
    pub identifier: String,
    pub feature_type: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeatureDetails {
    pub parents: IdSet,
    pub procedures: IdSet,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelatedFeatureRow {
    pub identifier: String,
    pub roles: IdSet,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultTemplateRow {
    pub identifier: String,
    pub offering: String,
    pub observable_property: String,
    pub features: IdSet,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimeBounds {
    pub phenomenon: Option<TimePeriod>,
    pub result: Option<TimePeriod>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GlobalInfo {
    pub epsg_codes: BTreeSet<i32>,
    pub observation_types: IdSet,
    pub feature_of_interest_types: IdSet,
    pub procedure_description_formats: IdSet,
    pub swe_types: IdSet,
}
