//! Cache snapshot: one complete, internally consistent value of the content cache.
//!
//! Submodules:
//! - read:      `ReadableCache`, the query contract handed to request handlers.
//! - write:     `WritableCache`, replace (`set_*`) vs additive (`add_*`) mutation contract
//!              used by the rebuild pipeline and the incremental updaters.
//! - hierarchy: cycle-safe transitive closure over parent/child relations.
//!
//! All collections are ordered (`BTreeMap`/`BTreeSet`) so two snapshots built from the same
//! datastore state compare equal and serialize to identical bytes.

pub mod hierarchy;
pub mod read;
pub mod write;

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::hash::Hasher;
use twox_hash::XxHash64;

use crate::config::DEFAULT_EPSG;
use crate::model::{Envelope, TimePeriod};

pub use read::ReadableCache;
pub use write::WritableCache;

pub type IdSet = BTreeSet<String>;
pub type Relation = BTreeMap<String, IdSet>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    default_epsg: i32,

    // ----- global -----
    global_envelope: Option<Envelope>,
    global_phenomenon_time: Option<TimePeriod>,
    global_result_time: Option<TimePeriod>,
    observation_identifiers: IdSet,
    procedures: IdSet,
    features_of_interest: IdSet,
    result_templates: IdSet,
    epsg_codes: BTreeSet<i32>,
    observation_types: IdSet,
    feature_of_interest_types: IdSet,
    procedure_description_formats: IdSet,
    swe_types: IdSet,

    // ----- offering -----
    name_for_offering: BTreeMap<String, String>,
    procedures_for_offering: Relation,
    hidden_child_procedures_for_offering: Relation,
    observable_properties_for_offering: Relation,
    composite_phenomena_for_offering: Relation,
    observation_types_for_offering: Relation,
    allowed_observation_types_for_offering: Relation,
    related_features_for_offering: Relation,
    features_of_interest_for_offering: Relation,
    result_templates_for_offering: Relation,
    envelope_for_offering: BTreeMap<String, Envelope>,
    phenomenon_time_for_offering: BTreeMap<String, TimePeriod>,
    result_time_for_offering: BTreeMap<String, TimePeriod>,

    // ----- procedure -----
    offerings_for_procedure: Relation,
    observable_properties_for_procedure: Relation,
    parent_procedures: Relation,
    child_procedures: Relation,
    observation_identifiers_for_procedure: Relation,

    // ----- observable property -----
    offerings_for_observable_property: Relation,
    procedures_for_observable_property: Relation,
    observable_properties_for_composite_phenomenon: Relation,

    // ----- feature of interest -----
    procedures_for_feature_of_interest: Relation,
    parent_features: Relation,
    child_features: Relation,

    // ----- related features / result templates -----
    roles_for_related_feature: Relation,
    observable_properties_for_result_template: Relation,
    features_of_interest_for_result_template: Relation,
}

impl Default for Snapshot {
    fn default() -> Self {
        Self::new(DEFAULT_EPSG)
    }
}

impl Snapshot {
    /// Empty snapshot with the given default spatial reference.
    pub fn new(default_epsg: i32) -> Self {
        Self {
            default_epsg,
            global_envelope: None,
            global_phenomenon_time: None,
            global_result_time: None,
            observation_identifiers: IdSet::new(),
            procedures: IdSet::new(),
            features_of_interest: IdSet::new(),
            result_templates: IdSet::new(),
            epsg_codes: BTreeSet::new(),
            observation_types: IdSet::new(),
            feature_of_interest_types: IdSet::new(),
            procedure_description_formats: IdSet::new(),
            swe_types: IdSet::new(),
            name_for_offering: BTreeMap::new(),
            procedures_for_offering: Relation::new(),
            hidden_child_procedures_for_offering: Relation::new(),
            observable_properties_for_offering: Relation::new(),
            composite_phenomena_for_offering: Relation::new(),
            observation_types_for_offering: Relation::new(),
            allowed_observation_types_for_offering: Relation::new(),
            related_features_for_offering: Relation::new(),
            features_of_interest_for_offering: Relation::new(),
            result_templates_for_offering: Relation::new(),
            envelope_for_offering: BTreeMap::new(),
            phenomenon_time_for_offering: BTreeMap::new(),
            result_time_for_offering: BTreeMap::new(),
            offerings_for_procedure: Relation::new(),
            observable_properties_for_procedure: Relation::new(),
            parent_procedures: Relation::new(),
            child_procedures: Relation::new(),
            observation_identifiers_for_procedure: Relation::new(),
            offerings_for_observable_property: Relation::new(),
            procedures_for_observable_property: Relation::new(),
            observable_properties_for_composite_phenomenon: Relation::new(),
            procedures_for_feature_of_interest: Relation::new(),
            parent_features: Relation::new(),
            child_features: Relation::new(),
            roles_for_related_feature: Relation::new(),
            observable_properties_for_result_template: Relation::new(),
            features_of_interest_for_result_template: Relation::new(),
        }
    }

    /// Canonical serialization (JSON of the ordered collections).
    pub fn to_canonical_bytes(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }

    /// xxhash64(seed=0) of the canonical serialization; equal snapshots have equal fingerprints.
    pub fn fingerprint(&self) -> u64 {
        let bytes = self.to_canonical_bytes().unwrap_or_default();
        let mut h = XxHash64::with_seed(0);
        h.write(&bytes);
        h.finish()
    }

    /// True when nothing but the default EPSG has been set.
    pub fn is_empty(&self) -> bool {
        *self == Snapshot::new(self.default_epsg)
    }

    /// Short summary for logs and the CLI.
    pub fn stats(&self) -> SnapshotStats {
        SnapshotStats {
            offerings: read::ReadableCache::offerings(self).len(),
            procedures: self.procedures.len(),
            observable_properties: read::ReadableCache::observable_properties(self).len(),
            features_of_interest: self.features_of_interest.len(),
            related_features: self.roles_for_related_feature.len(),
            result_templates: self.result_templates.len(),
            observation_identifiers: self.observation_identifiers.len(),
            fingerprint: self.fingerprint(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SnapshotStats {
    pub offerings: usize,
    pub procedures: usize,
    pub observable_properties: usize,
    pub features_of_interest: usize,
    pub related_features: usize,
    pub result_templates: usize,
    pub observation_identifiers: usize,
    pub fingerprint: u64,
}

// ----- relation helpers -----

fn lookup(rel: &Relation, key: &str) -> IdSet {
    rel.get(key).cloned().unwrap_or_default()
}

fn insert(rel: &mut Relation, key: &str, value: &str) {
    rel.entry(key.to_string()).or_default().insert(value.to_string());
}

/// Remove one value; an emptied key disappears.
fn remove_value(rel: &mut Relation, key: &str, value: &str) {
    if let Some(set) = rel.get_mut(key) {
        set.remove(value);
        if set.is_empty() {
            rel.remove(key);
        }
    }
}

/// Replace the set of `key`; an empty replacement removes the key.
fn replace(rel: &mut Relation, key: &str, values: IdSet) -> IdSet {
    let old = if values.is_empty() {
        rel.remove(key)
    } else {
        rel.insert(key.to_string(), values)
    };
    old.unwrap_or_default()
}

/// Replace `forward[key]` and keep `inverse` in step.
fn replace_symmetric(forward: &mut Relation, inverse: &mut Relation, key: &str, values: IdSet) {
    let added: Vec<String> = values.iter().cloned().collect();
    let old = replace(forward, key, values);
    for v in &old {
        remove_value(inverse, v, key);
    }
    for v in &added {
        insert(inverse, v, key);
    }
}

fn insert_symmetric(forward: &mut Relation, inverse: &mut Relation, key: &str, value: &str) {
    insert(forward, key, value);
    insert(inverse, value, key);
}

fn remove_symmetric(forward: &mut Relation, inverse: &mut Relation, key: &str, value: &str) {
    remove_value(forward, key, value);
    remove_value(inverse, value, key);
}

/// Drop `key` from `forward` and every back-reference to it from `inverse`.
fn remove_key_symmetric(forward: &mut Relation, inverse: &mut Relation, key: &str) {
    if let Some(old) = forward.remove(key) {
        for v in &old {
            remove_value(inverse, v, key);
        }
    }
}

/// Remove `value` from every set of the relation.
fn remove_everywhere(rel: &mut Relation, value: &str) {
    rel.retain(|_, set| {
        set.remove(value);
        !set.is_empty()
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replace_symmetric_drops_stale_inverse() {
        let mut fwd = Relation::new();
        let mut inv = Relation::new();
        replace_symmetric(&mut fwd, &mut inv, "o", ["a".to_string(), "b".to_string()].into());
        replace_symmetric(&mut fwd, &mut inv, "o", ["b".to_string(), "c".to_string()].into());
        assert!(!inv.contains_key("a"));
        assert_eq!(lookup(&inv, "c"), ["o".to_string()].into());
        replace_symmetric(&mut fwd, &mut inv, "o", IdSet::new());
        assert!(fwd.is_empty());
        assert!(inv.is_empty());
    }

    #[test]
    fn fingerprint_tracks_content() {
        let a = Snapshot::default();
        let mut b = Snapshot::default();
        assert_eq!(a.fingerprint(), b.fingerprint());
        assert!(b.is_empty());
        b.add_procedure("p");
        assert_ne!(a.fingerprint(), b.fingerprint());
        assert!(!b.is_empty());
    }
}
