//! Read contract of the content cache.
//!
//! Pure queries. Relation getters return owned copies, so a caller can never observe a
//! later mutation through a returned value. Unknown keys yield empty sets / `None`.

use chrono::{DateTime, Utc};
use std::collections::BTreeSet;

use super::hierarchy::{closure, closure_all};
use super::{lookup, IdSet, Snapshot};
use crate::model::{Envelope, TimePeriod};

pub trait ReadableCache {
    // ----- offerings -----
    fn offerings(&self) -> IdSet;
    fn has_offering(&self, offering: &str) -> bool;
    fn name_for_offering(&self, offering: &str) -> Option<String>;
    fn procedures_for_offering(&self, offering: &str) -> IdSet;
    fn hidden_child_procedures_for_offering(&self, offering: &str) -> IdSet;
    fn all_procedures_for_offering(&self, offering: &str) -> IdSet;
    /// Inverse of `offerings_for_observable_property`.
    fn observable_properties_for_offering(&self, offering: &str) -> IdSet;
    /// Direct observable properties plus the members of the offering's composite phenomena.
    fn observable_properties_for_offering_with_composites(&self, offering: &str) -> IdSet {
        let mut props = self.observable_properties_for_offering(offering);
        for c in self.composite_phenomena_for_offering(offering) {
            props.extend(self.observable_properties_for_composite_phenomenon(&c));
        }
        props
    }
    fn composite_phenomena_for_offering(&self, offering: &str) -> IdSet;
    fn observation_types_for_offering(&self, offering: &str) -> IdSet;
    fn allowed_observation_types_for_offering(&self, offering: &str) -> IdSet;
    fn related_features_for_offering(&self, offering: &str) -> IdSet;
    fn features_of_interest_for_offering(&self, offering: &str) -> IdSet;
    fn result_templates_for_offering(&self, offering: &str) -> IdSet;
    fn envelope_for_offering(&self, offering: &str) -> Option<Envelope>;
    fn has_envelope_for_offering(&self, offering: &str) -> bool {
        self.envelope_for_offering(offering).is_some()
    }
    fn phenomenon_time_for_offering(&self, offering: &str) -> Option<TimePeriod>;
    fn min_phenomenon_time_for_offering(&self, offering: &str) -> Option<DateTime<Utc>> {
        self.phenomenon_time_for_offering(offering).map(|p| p.start)
    }
    fn max_phenomenon_time_for_offering(&self, offering: &str) -> Option<DateTime<Utc>> {
        self.phenomenon_time_for_offering(offering).map(|p| p.end)
    }
    fn result_time_for_offering(&self, offering: &str) -> Option<TimePeriod>;
    fn min_result_time_for_offering(&self, offering: &str) -> Option<DateTime<Utc>> {
        self.result_time_for_offering(offering).map(|p| p.start)
    }
    fn max_result_time_for_offering(&self, offering: &str) -> Option<DateTime<Utc>> {
        self.result_time_for_offering(offering).map(|p| p.end)
    }

    // ----- procedures -----
    fn procedures(&self) -> IdSet;
    fn has_procedure(&self, procedure: &str) -> bool;
    fn offerings_for_procedure(&self, procedure: &str) -> IdSet;
    fn observable_properties_for_procedure(&self, procedure: &str) -> IdSet;
    fn parent_procedures(&self, procedure: &str, full_hierarchy: bool, include_self: bool) -> IdSet;
    fn child_procedures(&self, procedure: &str, full_hierarchy: bool, include_self: bool) -> IdSet;
    fn observation_identifiers_for_procedure(&self, procedure: &str) -> IdSet;
    fn procedures_for_feature_of_interest(&self, feature: &str) -> IdSet;

    // ----- observable properties -----
    fn observable_properties(&self) -> IdSet;
    fn has_observable_property(&self, property: &str) -> bool;
    fn offerings_for_observable_property(&self, property: &str) -> IdSet;
    fn procedures_for_observable_property(&self, property: &str) -> IdSet;
    fn observable_properties_for_composite_phenomenon(&self, composite: &str) -> IdSet;

    // ----- features -----
    fn features_of_interest(&self) -> IdSet;
    fn has_feature_of_interest(&self, feature: &str) -> bool;
    fn parent_features(&self, feature: &str, full_hierarchy: bool, include_self: bool) -> IdSet;
    fn child_features(&self, feature: &str, full_hierarchy: bool, include_self: bool) -> IdSet;
    fn feature_of_interest_types(&self) -> IdSet;
    fn related_features(&self) -> IdSet;
    fn has_related_feature(&self, feature: &str) -> bool;
    fn roles_for_related_feature(&self, feature: &str) -> IdSet;

    // ----- result templates -----
    fn result_templates(&self) -> IdSet;
    fn has_result_template(&self, template: &str) -> bool;
    fn has_result_template_for_offering(&self, template: &str, offering: &str) -> bool {
        self.result_templates_for_offering(offering).contains(template)
    }
    fn observable_properties_for_result_template(&self, template: &str) -> IdSet;
    fn features_of_interest_for_result_template(&self, template: &str) -> IdSet;

    // ----- global -----
    fn default_epsg(&self) -> i32;
    fn epsg_codes(&self) -> BTreeSet<i32>;
    fn has_epsg_code(&self, code: i32) -> bool;
    fn global_envelope(&self) -> Option<Envelope>;
    fn global_phenomenon_time(&self) -> Option<TimePeriod>;
    fn min_phenomenon_time(&self) -> Option<DateTime<Utc>> {
        self.global_phenomenon_time().map(|p| p.start)
    }
    fn max_phenomenon_time(&self) -> Option<DateTime<Utc>> {
        self.global_phenomenon_time().map(|p| p.end)
    }
    fn global_result_time(&self) -> Option<TimePeriod>;
    fn observation_identifiers(&self) -> IdSet;
    fn has_observation_identifier(&self, id: &str) -> bool;
    fn observation_types(&self) -> IdSet;
    fn procedure_description_formats(&self) -> IdSet;
    fn swe_types(&self) -> IdSet;
}

impl ReadableCache for Snapshot {
    fn offerings(&self) -> IdSet {
        self.procedures_for_offering
            .keys()
            .chain(self.hidden_child_procedures_for_offering.keys())
            .cloned()
            .collect()
    }

    fn has_offering(&self, offering: &str) -> bool {
        self.procedures_for_offering.contains_key(offering)
            || self.hidden_child_procedures_for_offering.contains_key(offering)
    }

    fn name_for_offering(&self, offering: &str) -> Option<String> {
        self.name_for_offering.get(offering).cloned()
    }

    fn procedures_for_offering(&self, offering: &str) -> IdSet {
        lookup(&self.procedures_for_offering, offering)
    }

    fn hidden_child_procedures_for_offering(&self, offering: &str) -> IdSet {
        lookup(&self.hidden_child_procedures_for_offering, offering)
    }

    fn all_procedures_for_offering(&self, offering: &str) -> IdSet {
        let mut all = self.procedures_for_offering(offering);
        all.extend(self.hidden_child_procedures_for_offering(offering));
        all
    }

    fn observable_properties_for_offering(&self, offering: &str) -> IdSet {
        lookup(&self.observable_properties_for_offering, offering)
    }

    fn composite_phenomena_for_offering(&self, offering: &str) -> IdSet {
        lookup(&self.composite_phenomena_for_offering, offering)
    }

    fn observation_types_for_offering(&self, offering: &str) -> IdSet {
        lookup(&self.observation_types_for_offering, offering)
    }

    fn allowed_observation_types_for_offering(&self, offering: &str) -> IdSet {
        lookup(&self.allowed_observation_types_for_offering, offering)
    }

    fn related_features_for_offering(&self, offering: &str) -> IdSet {
        lookup(&self.related_features_for_offering, offering)
    }

    fn features_of_interest_for_offering(&self, offering: &str) -> IdSet {
        lookup(&self.features_of_interest_for_offering, offering)
    }

    fn result_templates_for_offering(&self, offering: &str) -> IdSet {
        lookup(&self.result_templates_for_offering, offering)
    }

    fn envelope_for_offering(&self, offering: &str) -> Option<Envelope> {
        self.envelope_for_offering.get(offering).copied()
    }

    fn phenomenon_time_for_offering(&self, offering: &str) -> Option<TimePeriod> {
        self.phenomenon_time_for_offering.get(offering).copied()
    }

    fn result_time_for_offering(&self, offering: &str) -> Option<TimePeriod> {
        self.result_time_for_offering.get(offering).copied()
    }

    // ----- procedures -----

    fn procedures(&self) -> IdSet {
        self.procedures.clone()
    }

    fn has_procedure(&self, procedure: &str) -> bool {
        self.procedures.contains(procedure)
    }

    fn offerings_for_procedure(&self, procedure: &str) -> IdSet {
        lookup(&self.offerings_for_procedure, procedure)
    }

    fn observable_properties_for_procedure(&self, procedure: &str) -> IdSet {
        lookup(&self.observable_properties_for_procedure, procedure)
    }

    fn parent_procedures(&self, procedure: &str, full_hierarchy: bool, include_self: bool) -> IdSet {
        closure(&self.parent_procedures, procedure, full_hierarchy, include_self)
    }

    fn child_procedures(&self, procedure: &str, full_hierarchy: bool, include_self: bool) -> IdSet {
        closure(&self.child_procedures, procedure, full_hierarchy, include_self)
    }

    fn observation_identifiers_for_procedure(&self, procedure: &str) -> IdSet {
        lookup(&self.observation_identifiers_for_procedure, procedure)
    }

    fn procedures_for_feature_of_interest(&self, feature: &str) -> IdSet {
        lookup(&self.procedures_for_feature_of_interest, feature)
    }

    // ----- observable properties -----

    fn observable_properties(&self) -> IdSet {
        self.offerings_for_observable_property
            .keys()
            .chain(self.procedures_for_observable_property.keys())
            .cloned()
            .collect()
    }

    fn has_observable_property(&self, property: &str) -> bool {
        self.offerings_for_observable_property.contains_key(property)
            || self.procedures_for_observable_property.contains_key(property)
    }

    fn offerings_for_observable_property(&self, property: &str) -> IdSet {
        lookup(&self.offerings_for_observable_property, property)
    }

    fn procedures_for_observable_property(&self, property: &str) -> IdSet {
        lookup(&self.procedures_for_observable_property, property)
    }

    fn observable_properties_for_composite_phenomenon(&self, composite: &str) -> IdSet {
        lookup(&self.observable_properties_for_composite_phenomenon, composite)
    }

    // ----- features -----

    fn features_of_interest(&self) -> IdSet {
        self.features_of_interest.clone()
    }

    fn has_feature_of_interest(&self, feature: &str) -> bool {
        self.features_of_interest.contains(feature)
    }

    fn parent_features(&self, feature: &str, full_hierarchy: bool, include_self: bool) -> IdSet {
        closure(&self.parent_features, feature, full_hierarchy, include_self)
    }

    fn child_features(&self, feature: &str, full_hierarchy: bool, include_self: bool) -> IdSet {
        closure(&self.child_features, feature, full_hierarchy, include_self)
    }

    fn feature_of_interest_types(&self) -> IdSet {
        self.feature_of_interest_types.clone()
    }

    fn related_features(&self) -> IdSet {
        self.related_features_for_offering
            .values()
            .flatten()
            .cloned()
            .collect()
    }

    fn has_related_feature(&self, feature: &str) -> bool {
        self.related_features_for_offering
            .values()
            .any(|s| s.contains(feature))
    }

    fn roles_for_related_feature(&self, feature: &str) -> IdSet {
        lookup(&self.roles_for_related_feature, feature)
    }

    // ----- result templates -----

    fn result_templates(&self) -> IdSet {
        self.result_templates.clone()
    }

    fn has_result_template(&self, template: &str) -> bool {
        self.result_templates.contains(template)
    }

    fn observable_properties_for_result_template(&self, template: &str) -> IdSet {
        lookup(&self.observable_properties_for_result_template, template)
    }

    fn features_of_interest_for_result_template(&self, template: &str) -> IdSet {
        lookup(&self.features_of_interest_for_result_template, template)
    }

    // ----- global -----

    fn default_epsg(&self) -> i32 {
        self.default_epsg
    }

    fn epsg_codes(&self) -> BTreeSet<i32> {
        self.epsg_codes.clone()
    }

    fn has_epsg_code(&self, code: i32) -> bool {
        self.epsg_codes.contains(&code)
    }

    fn global_envelope(&self) -> Option<Envelope> {
        self.global_envelope
    }

    fn global_phenomenon_time(&self) -> Option<TimePeriod> {
        self.global_phenomenon_time
    }

    fn global_result_time(&self) -> Option<TimePeriod> {
        self.global_result_time
    }

    fn observation_identifiers(&self) -> IdSet {
        self.observation_identifiers.clone()
    }

    fn has_observation_identifier(&self, id: &str) -> bool {
        self.observation_identifiers.contains(id)
    }

    fn observation_types(&self) -> IdSet {
        self.observation_types.clone()
    }

    fn procedure_description_formats(&self) -> IdSet {
        self.procedure_description_formats.clone()
    }

    fn swe_types(&self) -> IdSet {
        self.swe_types.clone()
    }
}

impl Snapshot {
    /// Features of interest of the given procedures, including their child features.
    pub fn features_for_procedures(&self, procedures: &IdSet) -> IdSet {
        let direct: IdSet = self
            .procedures_for_feature_of_interest
            .iter()
            .filter(|(_, ps)| ps.iter().any(|p| procedures.contains(p)))
            .map(|(f, _)| f.clone())
            .collect();
        closure_all(&self.child_features, direct.iter(), true, true)
    }
}
