//! Write contract of the content cache.
//!
//! `set_*` replaces the full set for a key (full rebuild: stale data must disappear).
//! `add_*` only grows (incremental updaters: no global view to shrink safely).
//! `remove_*` is used by deletions only.
//!
//! Relations with a required inverse (offering↔procedure, offering↔observable property,
//! procedure↔observable property, parent↔child hierarchies) are always written in both
//! directions here, so callers cannot break symmetry.

use log::trace;

use super::read::ReadableCache;
use super::{
    insert, insert_symmetric, remove_everywhere, remove_key_symmetric, remove_symmetric,
    remove_value, replace, replace_symmetric, IdSet, Snapshot,
};
use crate::model::{fold_periods, union_all, Envelope, TimePeriod};

pub trait WritableCache: ReadableCache {
    // ----- offerings -----
    fn set_name_for_offering(&mut self, offering: &str, name: &str);
    fn remove_name_for_offering(&mut self, offering: &str);
    fn set_procedures_for_offering(&mut self, offering: &str, procedures: IdSet);
    fn add_procedure_for_offering(&mut self, offering: &str, procedure: &str);
    fn remove_procedure_for_offering(&mut self, offering: &str, procedure: &str);
    fn set_hidden_child_procedures_for_offering(&mut self, offering: &str, procedures: IdSet);
    fn add_hidden_child_procedure_for_offering(&mut self, offering: &str, procedure: &str);
    fn set_observable_properties_for_offering(&mut self, offering: &str, properties: IdSet);
    fn add_observable_property_for_offering(&mut self, offering: &str, property: &str);
    fn remove_observable_properties_for_offering(&mut self, offering: &str);
    fn set_composite_phenomena_for_offering(&mut self, offering: &str, composites: IdSet);
    fn add_composite_phenomenon_for_offering(&mut self, offering: &str, composite: &str);
    fn set_observable_properties_for_composite_phenomenon(&mut self, composite: &str, properties: IdSet);
    fn set_observation_types_for_offering(&mut self, offering: &str, types: IdSet);
    fn add_observation_type_for_offering(&mut self, offering: &str, observation_type: &str);
    fn remove_observation_types_for_offering(&mut self, offering: &str);
    fn set_allowed_observation_types_for_offering(&mut self, offering: &str, types: IdSet);
    fn add_allowed_observation_types_for_offering(&mut self, offering: &str, types: &IdSet);
    fn set_related_features_for_offering(&mut self, offering: &str, features: IdSet);
    fn add_related_feature_for_offering(&mut self, offering: &str, feature: &str);
    fn remove_related_features_for_offering(&mut self, offering: &str);
    fn set_features_of_interest_for_offering(&mut self, offering: &str, features: IdSet);
    fn add_feature_of_interest_for_offering(&mut self, offering: &str, feature: &str);
    fn remove_features_of_interest_for_offering(&mut self, offering: &str);
    fn set_result_templates_for_offering(&mut self, offering: &str, templates: IdSet);
    fn add_result_template_for_offering(&mut self, offering: &str, template: &str);
    fn set_envelope_for_offering(&mut self, offering: &str, envelope: Option<Envelope>);
    /// Expand (never shrink) the offering envelope.
    fn update_envelope_for_offering(&mut self, offering: &str, envelope: &Envelope);
    fn set_phenomenon_time_for_offering(&mut self, offering: &str, period: Option<TimePeriod>);
    fn update_phenomenon_time_for_offering(&mut self, offering: &str, period: &TimePeriod);
    fn set_result_time_for_offering(&mut self, offering: &str, period: Option<TimePeriod>);
    fn update_result_time_for_offering(&mut self, offering: &str, period: &TimePeriod);
    /// Drop every per-offering entry and all back-references to the offering.
    fn remove_offering(&mut self, offering: &str);

    // ----- procedures -----
    fn add_procedure(&mut self, procedure: &str);
    fn set_procedures(&mut self, procedures: IdSet);
    /// Drop the procedure and every relation it takes part in.
    fn remove_procedure(&mut self, procedure: &str);
    fn set_observable_properties_for_procedure(&mut self, procedure: &str, properties: IdSet);
    fn add_observable_property_for_procedure(&mut self, procedure: &str, property: &str);
    fn set_parent_procedures(&mut self, procedure: &str, parents: IdSet);
    fn add_parent_procedure(&mut self, procedure: &str, parent: &str);
    fn set_observation_identifiers_for_procedure(&mut self, procedure: &str, ids: IdSet);
    fn add_observation_identifier_for_procedure(&mut self, procedure: &str, id: &str);
    fn remove_observation_identifier_for_procedure(&mut self, procedure: &str, id: &str);

    // ----- features -----
    fn add_feature_of_interest(&mut self, feature: &str);
    fn set_features_of_interest(&mut self, features: IdSet);
    /// Drop the feature from every set and hierarchy it appears in.
    fn remove_feature_of_interest(&mut self, feature: &str);
    fn set_procedures_for_feature_of_interest(&mut self, feature: &str, procedures: IdSet);
    fn add_procedure_for_feature_of_interest(&mut self, feature: &str, procedure: &str);
    fn set_parent_features(&mut self, feature: &str, parents: IdSet);
    fn add_parent_feature(&mut self, feature: &str, parent: &str);
    fn add_feature_of_interest_type(&mut self, feature_type: &str);
    fn set_feature_of_interest_types(&mut self, types: IdSet);
    fn set_roles_for_related_feature(&mut self, feature: &str, roles: IdSet);
    fn add_role_for_related_feature(&mut self, feature: &str, role: &str);
    fn remove_roles_for_related_feature(&mut self, feature: &str);

    // ----- result templates -----
    fn add_result_template(&mut self, template: &str);
    fn set_result_templates(&mut self, templates: IdSet);
    fn remove_result_template(&mut self, template: &str);
    fn set_observable_properties_for_result_template(&mut self, template: &str, properties: IdSet);
    fn add_observable_property_for_result_template(&mut self, template: &str, property: &str);
    fn set_features_of_interest_for_result_template(&mut self, template: &str, features: IdSet);
    fn add_feature_of_interest_for_result_template(&mut self, template: &str, feature: &str);

    // ----- global -----
    fn set_default_epsg(&mut self, epsg: i32);
    fn add_epsg_code(&mut self, code: i32);
    fn set_epsg_codes(&mut self, codes: std::collections::BTreeSet<i32>);
    fn set_global_envelope(&mut self, envelope: Option<Envelope>);
    fn update_global_envelope(&mut self, envelope: &Envelope);
    fn set_global_phenomenon_time(&mut self, period: Option<TimePeriod>);
    fn update_global_phenomenon_time(&mut self, period: &TimePeriod);
    fn set_global_result_time(&mut self, period: Option<TimePeriod>);
    fn update_global_result_time(&mut self, period: &TimePeriod);
    /// Global envelope := union of all offering envelopes (None if there are none).
    fn recalculate_global_envelope(&mut self);
    fn recalculate_phenomenon_time(&mut self);
    fn recalculate_result_time(&mut self);
    fn add_observation_identifier(&mut self, id: &str);
    fn set_observation_identifiers(&mut self, ids: IdSet);
    fn remove_observation_identifier(&mut self, id: &str);
    fn add_observation_type(&mut self, observation_type: &str);
    fn set_observation_types(&mut self, types: IdSet);
    fn set_procedure_description_formats(&mut self, formats: IdSet);
    fn set_swe_types(&mut self, types: IdSet);
}

impl WritableCache for Snapshot {
    fn set_name_for_offering(&mut self, offering: &str, name: &str) {
        trace!("set name '{}' for offering {}", name, offering);
        self.name_for_offering.insert(offering.to_string(), name.to_string());
    }

    fn remove_name_for_offering(&mut self, offering: &str) {
        self.name_for_offering.remove(offering);
    }

    fn set_procedures_for_offering(&mut self, offering: &str, procedures: IdSet) {
        trace!("set procedures {:?} for offering {}", procedures, offering);
        replace_symmetric(
            &mut self.procedures_for_offering,
            &mut self.offerings_for_procedure,
            offering,
            procedures,
        );
    }

    fn add_procedure_for_offering(&mut self, offering: &str, procedure: &str) {
        trace!("add procedure {} to offering {}", procedure, offering);
        insert_symmetric(
            &mut self.procedures_for_offering,
            &mut self.offerings_for_procedure,
            offering,
            procedure,
        );
    }

    fn remove_procedure_for_offering(&mut self, offering: &str, procedure: &str) {
        trace!("remove procedure {} from offering {}", procedure, offering);
        remove_symmetric(
            &mut self.procedures_for_offering,
            &mut self.offerings_for_procedure,
            offering,
            procedure,
        );
    }

    fn set_hidden_child_procedures_for_offering(&mut self, offering: &str, procedures: IdSet) {
        replace(&mut self.hidden_child_procedures_for_offering, offering, procedures);
    }

    fn add_hidden_child_procedure_for_offering(&mut self, offering: &str, procedure: &str) {
        insert(&mut self.hidden_child_procedures_for_offering, offering, procedure);
    }

    fn set_observable_properties_for_offering(&mut self, offering: &str, properties: IdSet) {
        trace!("set observable properties {:?} for offering {}", properties, offering);
        replace_symmetric(
            &mut self.observable_properties_for_offering,
            &mut self.offerings_for_observable_property,
            offering,
            properties,
        );
    }

    fn add_observable_property_for_offering(&mut self, offering: &str, property: &str) {
        trace!("add observable property {} to offering {}", property, offering);
        insert_symmetric(
            &mut self.observable_properties_for_offering,
            &mut self.offerings_for_observable_property,
            offering,
            property,
        );
    }

    fn remove_observable_properties_for_offering(&mut self, offering: &str) {
        remove_key_symmetric(
            &mut self.observable_properties_for_offering,
            &mut self.offerings_for_observable_property,
            offering,
        );
    }

    fn set_composite_phenomena_for_offering(&mut self, offering: &str, composites: IdSet) {
        replace(&mut self.composite_phenomena_for_offering, offering, composites);
    }

    fn add_composite_phenomenon_for_offering(&mut self, offering: &str, composite: &str) {
        insert(&mut self.composite_phenomena_for_offering, offering, composite);
    }

    fn set_observable_properties_for_composite_phenomenon(&mut self, composite: &str, properties: IdSet) {
        replace(&mut self.observable_properties_for_composite_phenomenon, composite, properties);
    }

    fn set_observation_types_for_offering(&mut self, offering: &str, types: IdSet) {
        replace(&mut self.observation_types_for_offering, offering, types);
    }

    fn add_observation_type_for_offering(&mut self, offering: &str, observation_type: &str) {
        insert(&mut self.observation_types_for_offering, offering, observation_type);
    }

    fn remove_observation_types_for_offering(&mut self, offering: &str) {
        self.observation_types_for_offering.remove(offering);
        self.allowed_observation_types_for_offering.remove(offering);
    }

    fn set_allowed_observation_types_for_offering(&mut self, offering: &str, types: IdSet) {
        replace(&mut self.allowed_observation_types_for_offering, offering, types);
    }

    fn add_allowed_observation_types_for_offering(&mut self, offering: &str, types: &IdSet) {
        for t in types {
            insert(&mut self.allowed_observation_types_for_offering, offering, t);
        }
    }

    fn set_related_features_for_offering(&mut self, offering: &str, features: IdSet) {
        replace(&mut self.related_features_for_offering, offering, features);
    }

    fn add_related_feature_for_offering(&mut self, offering: &str, feature: &str) {
        insert(&mut self.related_features_for_offering, offering, feature);
    }

    fn remove_related_features_for_offering(&mut self, offering: &str) {
        self.related_features_for_offering.remove(offering);
    }

    fn set_features_of_interest_for_offering(&mut self, offering: &str, features: IdSet) {
        replace(&mut self.features_of_interest_for_offering, offering, features);
    }

    fn add_feature_of_interest_for_offering(&mut self, offering: &str, feature: &str) {
        insert(&mut self.features_of_interest_for_offering, offering, feature);
    }

    fn remove_features_of_interest_for_offering(&mut self, offering: &str) {
        self.features_of_interest_for_offering.remove(offering);
    }

    fn set_result_templates_for_offering(&mut self, offering: &str, templates: IdSet) {
        replace(&mut self.result_templates_for_offering, offering, templates);
    }

    fn add_result_template_for_offering(&mut self, offering: &str, template: &str) {
        insert(&mut self.result_templates_for_offering, offering, template);
    }

    fn set_envelope_for_offering(&mut self, offering: &str, envelope: Option<Envelope>) {
        trace!("set envelope {:?} for offering {}", envelope, offering);
        match envelope {
            Some(e) => {
                self.envelope_for_offering.insert(offering.to_string(), e);
            }
            None => {
                self.envelope_for_offering.remove(offering);
            }
        }
    }

    fn update_envelope_for_offering(&mut self, offering: &str, envelope: &Envelope) {
        trace!("expand envelope of offering {} by {}", offering, envelope);
        self.envelope_for_offering
            .entry(offering.to_string())
            .and_modify(|e| e.expand_to_include(envelope))
            .or_insert(*envelope);
    }

    fn set_phenomenon_time_for_offering(&mut self, offering: &str, period: Option<TimePeriod>) {
        set_period(&mut self.phenomenon_time_for_offering, offering, period);
    }

    fn update_phenomenon_time_for_offering(&mut self, offering: &str, period: &TimePeriod) {
        expand_period(&mut self.phenomenon_time_for_offering, offering, period);
    }

    fn set_result_time_for_offering(&mut self, offering: &str, period: Option<TimePeriod>) {
        set_period(&mut self.result_time_for_offering, offering, period);
    }

    fn update_result_time_for_offering(&mut self, offering: &str, period: &TimePeriod) {
        expand_period(&mut self.result_time_for_offering, offering, period);
    }

    fn remove_offering(&mut self, offering: &str) {
        trace!("remove offering {}", offering);
        remove_key_symmetric(
            &mut self.procedures_for_offering,
            &mut self.offerings_for_procedure,
            offering,
        );
        remove_key_symmetric(
            &mut self.observable_properties_for_offering,
            &mut self.offerings_for_observable_property,
            offering,
        );
        self.name_for_offering.remove(offering);
        self.hidden_child_procedures_for_offering.remove(offering);
        self.composite_phenomena_for_offering.remove(offering);
        self.observation_types_for_offering.remove(offering);
        self.allowed_observation_types_for_offering.remove(offering);
        self.related_features_for_offering.remove(offering);
        self.features_of_interest_for_offering.remove(offering);
        self.result_templates_for_offering.remove(offering);
        self.envelope_for_offering.remove(offering);
        self.phenomenon_time_for_offering.remove(offering);
        self.result_time_for_offering.remove(offering);
    }

    // ----- procedures -----

    fn add_procedure(&mut self, procedure: &str) {
        trace!("add procedure {}", procedure);
        self.procedures.insert(procedure.to_string());
    }

    fn set_procedures(&mut self, procedures: IdSet) {
        self.procedures = procedures;
    }

    fn remove_procedure(&mut self, procedure: &str) {
        trace!("remove procedure {}", procedure);
        self.procedures.remove(procedure);
        remove_key_symmetric(
            &mut self.offerings_for_procedure,
            &mut self.procedures_for_offering,
            procedure,
        );
        remove_key_symmetric(
            &mut self.observable_properties_for_procedure,
            &mut self.procedures_for_observable_property,
            procedure,
        );
        remove_key_symmetric(&mut self.parent_procedures, &mut self.child_procedures, procedure);
        remove_key_symmetric(&mut self.child_procedures, &mut self.parent_procedures, procedure);
        remove_everywhere(&mut self.hidden_child_procedures_for_offering, procedure);
        remove_everywhere(&mut self.procedures_for_feature_of_interest, procedure);
        self.observation_identifiers_for_procedure.remove(procedure);
    }

    fn set_observable_properties_for_procedure(&mut self, procedure: &str, properties: IdSet) {
        replace_symmetric(
            &mut self.observable_properties_for_procedure,
            &mut self.procedures_for_observable_property,
            procedure,
            properties,
        );
    }

    fn add_observable_property_for_procedure(&mut self, procedure: &str, property: &str) {
        trace!("add observable property {} to procedure {}", property, procedure);
        insert_symmetric(
            &mut self.observable_properties_for_procedure,
            &mut self.procedures_for_observable_property,
            procedure,
            property,
        );
    }

    fn set_parent_procedures(&mut self, procedure: &str, parents: IdSet) {
        replace_symmetric(&mut self.parent_procedures, &mut self.child_procedures, procedure, parents);
    }

    fn add_parent_procedure(&mut self, procedure: &str, parent: &str) {
        insert_symmetric(&mut self.parent_procedures, &mut self.child_procedures, procedure, parent);
    }

    fn set_observation_identifiers_for_procedure(&mut self, procedure: &str, ids: IdSet) {
        replace(&mut self.observation_identifiers_for_procedure, procedure, ids);
    }

    fn add_observation_identifier_for_procedure(&mut self, procedure: &str, id: &str) {
        insert(&mut self.observation_identifiers_for_procedure, procedure, id);
    }

    fn remove_observation_identifier_for_procedure(&mut self, procedure: &str, id: &str) {
        remove_value(&mut self.observation_identifiers_for_procedure, procedure, id);
    }

    // ----- features -----

    fn add_feature_of_interest(&mut self, feature: &str) {
        trace!("add feature of interest {}", feature);
        self.features_of_interest.insert(feature.to_string());
    }

    fn set_features_of_interest(&mut self, features: IdSet) {
        self.features_of_interest = features;
    }

    fn remove_feature_of_interest(&mut self, feature: &str) {
        trace!("remove feature of interest {}", feature);
        self.features_of_interest.remove(feature);
        self.procedures_for_feature_of_interest.remove(feature);
        remove_key_symmetric(&mut self.parent_features, &mut self.child_features, feature);
        remove_key_symmetric(&mut self.child_features, &mut self.parent_features, feature);
        remove_everywhere(&mut self.features_of_interest_for_offering, feature);
        remove_everywhere(&mut self.features_of_interest_for_result_template, feature);
    }

    fn set_procedures_for_feature_of_interest(&mut self, feature: &str, procedures: IdSet) {
        replace(&mut self.procedures_for_feature_of_interest, feature, procedures);
    }

    fn add_procedure_for_feature_of_interest(&mut self, feature: &str, procedure: &str) {
        insert(&mut self.procedures_for_feature_of_interest, feature, procedure);
    }

    fn set_parent_features(&mut self, feature: &str, parents: IdSet) {
        replace_symmetric(&mut self.parent_features, &mut self.child_features, feature, parents);
    }

    fn add_parent_feature(&mut self, feature: &str, parent: &str) {
        insert_symmetric(&mut self.parent_features, &mut self.child_features, feature, parent);
    }

    fn add_feature_of_interest_type(&mut self, feature_type: &str) {
        self.feature_of_interest_types.insert(feature_type.to_string());
    }

    fn set_feature_of_interest_types(&mut self, types: IdSet) {
        self.feature_of_interest_types = types;
    }

    fn set_roles_for_related_feature(&mut self, feature: &str, roles: IdSet) {
        replace(&mut self.roles_for_related_feature, feature, roles);
    }

    fn add_role_for_related_feature(&mut self, feature: &str, role: &str) {
        insert(&mut self.roles_for_related_feature, feature, role);
    }

    fn remove_roles_for_related_feature(&mut self, feature: &str) {
        self.roles_for_related_feature.remove(feature);
    }

    // ----- result templates -----

    fn add_result_template(&mut self, template: &str) {
        trace!("add result template {}", template);
        self.result_templates.insert(template.to_string());
    }

    fn set_result_templates(&mut self, templates: IdSet) {
        self.result_templates = templates;
    }

    fn remove_result_template(&mut self, template: &str) {
        self.result_templates.remove(template);
        self.observable_properties_for_result_template.remove(template);
        self.features_of_interest_for_result_template.remove(template);
        remove_everywhere(&mut self.result_templates_for_offering, template);
    }

    fn set_observable_properties_for_result_template(&mut self, template: &str, properties: IdSet) {
        replace(&mut self.observable_properties_for_result_template, template, properties);
    }

    fn add_observable_property_for_result_template(&mut self, template: &str, property: &str) {
        insert(&mut self.observable_properties_for_result_template, template, property);
    }

    fn set_features_of_interest_for_result_template(&mut self, template: &str, features: IdSet) {
        replace(&mut self.features_of_interest_for_result_template, template, features);
    }

    fn add_feature_of_interest_for_result_template(&mut self, template: &str, feature: &str) {
        insert(&mut self.features_of_interest_for_result_template, template, feature);
    }

    // ----- global -----

    fn set_default_epsg(&mut self, epsg: i32) {
        self.default_epsg = epsg;
    }

    fn add_epsg_code(&mut self, code: i32) {
        self.epsg_codes.insert(code);
    }

    fn set_epsg_codes(&mut self, codes: std::collections::BTreeSet<i32>) {
        self.epsg_codes = codes;
    }

    fn set_global_envelope(&mut self, envelope: Option<Envelope>) {
        self.global_envelope = envelope;
    }

    fn update_global_envelope(&mut self, envelope: &Envelope) {
        match self.global_envelope.as_mut() {
            Some(g) => g.expand_to_include(envelope),
            None => self.global_envelope = Some(*envelope),
        }
    }

    fn set_global_phenomenon_time(&mut self, period: Option<TimePeriod>) {
        self.global_phenomenon_time = period;
    }

    fn update_global_phenomenon_time(&mut self, period: &TimePeriod) {
        match self.global_phenomenon_time.as_mut() {
            Some(g) => g.expand_to_include(period),
            None => self.global_phenomenon_time = Some(*period),
        }
    }

    fn set_global_result_time(&mut self, period: Option<TimePeriod>) {
        self.global_result_time = period;
    }

    fn update_global_result_time(&mut self, period: &TimePeriod) {
        match self.global_result_time.as_mut() {
            Some(g) => g.expand_to_include(period),
            None => self.global_result_time = Some(*period),
        }
    }

    fn recalculate_global_envelope(&mut self) {
        self.global_envelope = union_all(self.envelope_for_offering.values());
        trace!("global envelope recalculated: {:?}", self.global_envelope);
    }

    fn recalculate_phenomenon_time(&mut self) {
        self.global_phenomenon_time = fold_periods(self.phenomenon_time_for_offering.values().copied());
    }

    fn recalculate_result_time(&mut self) {
        self.global_result_time = fold_periods(self.result_time_for_offering.values().copied());
    }

    fn add_observation_identifier(&mut self, id: &str) {
        self.observation_identifiers.insert(id.to_string());
    }

    fn set_observation_identifiers(&mut self, ids: IdSet) {
        self.observation_identifiers = ids;
    }

    fn remove_observation_identifier(&mut self, id: &str) {
        self.observation_identifiers.remove(id);
        remove_everywhere(&mut self.observation_identifiers_for_procedure, id);
    }

    fn add_observation_type(&mut self, observation_type: &str) {
        self.observation_types.insert(observation_type.to_string());
    }

    fn set_observation_types(&mut self, types: IdSet) {
        self.observation_types = types;
    }

    fn set_procedure_description_formats(&mut self, formats: IdSet) {
        self.procedure_description_formats = formats;
    }

    fn set_swe_types(&mut self, types: IdSet) {
        self.swe_types = types;
    }
}

fn set_period(
    map: &mut std::collections::BTreeMap<String, TimePeriod>,
    offering: &str,
    period: Option<TimePeriod>,
) {
    match period {
        Some(p) => {
            map.insert(offering.to_string(), p);
        }
        None => {
            map.remove(offering);
        }
    }
}

fn expand_period(
    map: &mut std::collections::BTreeMap<String, TimePeriod>,
    offering: &str,
    period: &TimePeriod,
) {
    map.entry(offering.to_string())
        .and_modify(|p| p.expand_to_include(period))
        .or_insert(*period);
}
