//! In-memory datastore backed by a serde `Fixture`.
//!
//! Used by the integration tests and by the `sos-cache` CLI (fixture JSON file).
//! Fault injection (`Faults`) lets a test fail a single entity, fail a whole listing,
//! stall an entity or refuse new sessions. Session open/close counts are tracked so
//! tests can check that every task released its session.

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use super::{
    Constellation, Datasource, DatasourceSession, FeatureDetails, FeatureRow, GlobalInfo,
    ObservablePropertyRow, OfferingDetails, OfferingRow, ProcedureDetails, ProcedureRow,
    RelatedFeatureRow, ResultTemplateRow, TimeBounds,
};
use crate::metrics;
use crate::model::{fold_periods, Geometry, Time, TimePeriod};
use crate::snapshot::IdSet;

// ----- Fixture -----

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Fixture {
    pub offerings: Vec<FixtureOffering>,
    pub procedures: Vec<FixtureProcedure>,
    pub observable_properties: Vec<FixtureObservableProperty>,
    pub features: Vec<FixtureFeature>,
    pub constellations: Vec<Constellation>,
    pub observations: Vec<FixtureObservation>,
    pub related_features: Vec<FixtureRelatedFeature>,
    pub result_templates: Vec<FixtureResultTemplate>,
    pub epsg_codes: BTreeSet<i32>,
    pub swe_types: IdSet,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FixtureOffering {
    pub id: String,
    pub name: Option<String>,
    pub allowed_observation_types: IdSet,
    pub composite_phenomena: IdSet,
    pub related_features: IdSet,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FixtureProcedure {
    pub id: String,
    pub deleted: bool,
    pub parents: IdSet,
    pub description_format: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FixtureObservableProperty {
    pub id: String,
    pub components: IdSet,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FixtureFeature {
    pub id: String,
    pub feature_type: Option<String>,
    pub parents: IdSet,
    pub geometry: Option<Geometry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FixtureObservation {
    pub id: String,
    pub procedure: String,
    pub observable_property: String,
    pub offering: String,
    pub feature: String,
    pub phenomenon_time: Time,
    #[serde(default)]
    pub result_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub deleted: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FixtureRelatedFeature {
    pub id: String,
    pub roles: IdSet,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FixtureResultTemplate {
    pub id: String,
    pub offering: String,
    pub observable_property: String,
    pub features: IdSet,
}

impl Fixture {
    pub fn from_json_str(s: &str) -> Result<Self> {
        serde_json::from_str(s).context("parse fixture json")
    }

    pub fn from_json_file(path: &Path) -> Result<Self> {
        let s = std::fs::read_to_string(path)
            .with_context(|| format!("read fixture {}", path.display()))?;
        Self::from_json_str(&s).with_context(|| format!("fixture {}", path.display()))
    }

    fn procedure(&self, id: &str) -> Option<&FixtureProcedure> {
        self.procedures.iter().find(|p| p.id == id)
    }

    fn procedure_deleted(&self, id: &str) -> bool {
        self.procedure(id).map(|p| p.deleted).unwrap_or(false)
    }

    /// Constellations that still count: neither the constellation nor its procedure deleted.
    fn active_constellations<'a>(&'a self) -> impl Iterator<Item = &'a Constellation> + 'a {
        self.constellations
            .iter()
            .filter(move |c| !c.deleted && !self.procedure_deleted(&c.procedure))
    }

    fn active_observations<'a>(&'a self) -> impl Iterator<Item = &'a FixtureObservation> + 'a {
        self.observations
            .iter()
            .filter(move |o| !o.deleted && !self.procedure_deleted(&o.procedure))
    }
}

// ----- Faults -----

/// Injected failures. Family names: "offerings", "procedures", "observable_properties",
/// "features", "related_features", "result_templates", "global".
#[derive(Debug, Clone, Default)]
pub struct Faults {
    /// Any per-entity call for these identifiers fails.
    pub fail_entities: BTreeSet<String>,
    /// Top-level listing of these families fails.
    pub fail_listings: BTreeSet<String>,
    /// Per-entity calls for these identifiers sleep first.
    pub stall_entities: BTreeMap<String, Duration>,
    pub refuse_sessions: bool,
}

// ----- Datasource -----

struct Shared {
    fixture: RwLock<Arc<Fixture>>,
    faults: Mutex<Faults>,
    opened: AtomicU64,
    closed: AtomicU64,
    shut: AtomicBool,
}

#[derive(Clone)]
pub struct MemoryDatasource {
    shared: Arc<Shared>,
}

impl MemoryDatasource {
    pub fn new(fixture: Fixture) -> Self {
        Self {
            shared: Arc::new(Shared {
                fixture: RwLock::new(Arc::new(fixture)),
                faults: Mutex::new(Faults::default()),
                opened: AtomicU64::new(0),
                closed: AtomicU64::new(0),
                shut: AtomicBool::new(false),
            }),
        }
    }

    /// Replace the backing data; affects sessions opened afterwards.
    pub fn set_fixture(&self, fixture: Fixture) {
        if let Ok(mut g) = self.shared.fixture.write() {
            *g = Arc::new(fixture);
        }
    }

    /// Mutate the backing data in place.
    pub fn update_fixture<F: FnOnce(&mut Fixture)>(&self, f: F) {
        if let Ok(mut g) = self.shared.fixture.write() {
            f(Arc::make_mut(&mut *g));
        }
    }

    pub fn fixture(&self) -> Arc<Fixture> {
        match self.shared.fixture.read() {
            Ok(g) => g.clone(),
            Err(p) => p.into_inner().clone(),
        }
    }

    pub fn set_faults(&self, faults: Faults) {
        if let Ok(mut g) = self.shared.faults.lock() {
            *g = faults;
        }
    }

    pub fn clear_faults(&self) {
        self.set_faults(Faults::default());
    }

    pub fn fail_entity(&self, id: &str) {
        if let Ok(mut g) = self.shared.faults.lock() {
            g.fail_entities.insert(id.to_string());
        }
    }

    pub fn fail_listing(&self, family: &str) {
        if let Ok(mut g) = self.shared.faults.lock() {
            g.fail_listings.insert(family.to_string());
        }
    }

    pub fn stall_entity(&self, id: &str, pause: Duration) {
        if let Ok(mut g) = self.shared.faults.lock() {
            g.stall_entities.insert(id.to_string(), pause);
        }
    }

    pub fn sessions_opened(&self) -> u64 {
        self.shared.opened.load(Ordering::SeqCst)
    }

    pub fn sessions_closed(&self) -> u64 {
        self.shared.closed.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.shared.shut.load(Ordering::SeqCst)
    }

    fn faults(&self) -> Faults {
        match self.shared.faults.lock() {
            Ok(g) => g.clone(),
            Err(p) => p.into_inner().clone(),
        }
    }
}

impl Datasource for MemoryDatasource {
    fn open_session(&self) -> Result<Box<dyn DatasourceSession>> {
        if self.is_closed() {
            return Err(anyhow!("datasource is closed"));
        }
        let faults = self.faults();
        if faults.refuse_sessions {
            return Err(anyhow!("datasource refused a new session"));
        }
        self.shared.opened.fetch_add(1, Ordering::SeqCst);
        metrics::record_session_opened();
        Ok(Box::new(MemorySession {
            shared: self.shared.clone(),
            fixture: self.fixture(),
            faults,
        }))
    }

    fn close(&self) {
        self.shared.shut.store(true, Ordering::SeqCst);
        log::debug!(
            "memory datasource closed (sessions opened={}, closed={})",
            self.sessions_opened(),
            self.sessions_closed()
        );
    }
}

// ----- Session -----

struct MemorySession {
    shared: Arc<Shared>,
    fixture: Arc<Fixture>,
    faults: Faults,
}

impl Drop for MemorySession {
    fn drop(&mut self) {
        self.shared.closed.fetch_add(1, Ordering::SeqCst);
        metrics::record_session_closed();
    }
}

impl MemorySession {
    fn listing(&self, family: &str) -> Result<()> {
        if self.faults.fail_listings.contains(family) {
            return Err(anyhow!("injected failure listing {}", family));
        }
        Ok(())
    }

    fn entity(&self, id: &str) -> Result<()> {
        if let Some(pause) = self.faults.stall_entities.get(id) {
            std::thread::sleep(*pause);
        }
        if self.faults.fail_entities.contains(id) {
            return Err(anyhow!("injected failure for entity {}", id));
        }
        Ok(())
    }
}

impl DatasourceSession for MemorySession {
    fn offerings(&self) -> Result<Vec<OfferingRow>> {
        self.listing("offerings")?;
        let fx = &self.fixture;
        Ok(fx
            .offerings
            .iter()
            .map(|o| OfferingRow {
                identifier: o.id.clone(),
                name: o.name.clone(),
                has_active_constellations: fx.active_constellations().any(|c| c.offering == o.id),
            })
            .collect())
    }

    fn procedures(&self) -> Result<Vec<ProcedureRow>> {
        self.listing("procedures")?;
        Ok(self
            .fixture
            .procedures
            .iter()
            .map(|p| ProcedureRow {
                identifier: p.id.clone(),
                deleted: p.deleted,
            })
            .collect())
    }

    fn observable_properties(&self) -> Result<Vec<ObservablePropertyRow>> {
        self.listing("observable_properties")?;
        Ok(self
            .fixture
            .observable_properties
            .iter()
            .map(|p| ObservablePropertyRow {
                identifier: p.id.clone(),
                components: p.components.clone(),
            })
            .collect())
    }

    fn features(&self) -> Result<Vec<FeatureRow>> {
        self.listing("features")?;
        Ok(self
            .fixture
            .features
            .iter()
            .map(|f| FeatureRow {
                identifier: f.id.clone(),
                feature_type: f.feature_type.clone(),
            })
            .collect())
    }

    fn related_features(&self) -> Result<Vec<RelatedFeatureRow>> {
        self.listing("related_features")?;
        Ok(self
            .fixture
            .related_features
            .iter()
            .map(|r| RelatedFeatureRow {
                identifier: r.id.clone(),
                roles: r.roles.clone(),
            })
            .collect())
    }

    fn result_templates(&self) -> Result<Vec<ResultTemplateRow>> {
        self.listing("result_templates")?;
        Ok(self
            .fixture
            .result_templates
            .iter()
            .map(|t| ResultTemplateRow {
                identifier: t.id.clone(),
                offering: t.offering.clone(),
                observable_property: t.observable_property.clone(),
                features: t.features.clone(),
            })
            .collect())
    }

    fn offering_details(&self, offering: &str) -> Result<OfferingDetails> {
        self.entity(offering)?;
        let fx = &self.fixture;
        let o = fx
            .offerings
            .iter()
            .find(|o| o.id == offering)
            .ok_or_else(|| anyhow!("unknown offering {}", offering))?;
        Ok(OfferingDetails {
            constellations: fx
                .active_constellations()
                .filter(|c| c.offering == offering)
                .cloned()
                .collect(),
            allowed_observation_types: o.allowed_observation_types.clone(),
            composite_phenomena: o.composite_phenomena.clone(),
            related_features: o.related_features.clone(),
            features: fx
                .active_observations()
                .filter(|obs| obs.offering == offering)
                .map(|obs| obs.feature.clone())
                .collect(),
        })
    }

    fn procedure_details(&self, procedure: &str) -> Result<ProcedureDetails> {
        self.entity(procedure)?;
        let fx = &self.fixture;
        let p = fx
            .procedure(procedure)
            .ok_or_else(|| anyhow!("unknown procedure {}", procedure))?;
        Ok(ProcedureDetails {
            parents: p.parents.clone(),
            observable_properties: fx
                .active_constellations()
                .filter(|c| c.procedure == procedure)
                .map(|c| c.observable_property.clone())
                .collect(),
            observation_identifiers: fx
                .active_observations()
                .filter(|obs| obs.procedure == procedure)
                .map(|obs| obs.id.clone())
                .collect(),
        })
    }

    fn feature_details(&self, feature: &str) -> Result<FeatureDetails> {
        self.entity(feature)?;
        let fx = &self.fixture;
        let f = fx
            .features
            .iter()
            .find(|f| f.id == feature)
            .ok_or_else(|| anyhow!("unknown feature {}", feature))?;
        Ok(FeatureDetails {
            parents: f.parents.clone(),
            procedures: fx
                .active_observations()
                .filter(|obs| obs.feature == feature)
                .map(|obs| obs.procedure.clone())
                .collect(),
        })
    }

    fn geometries_for_features(&self, features: &IdSet) -> Result<Vec<Geometry>> {
        for id in features {
            self.entity(id)?;
        }
        Ok(self
            .fixture
            .features
            .iter()
            .filter(|f| features.contains(&f.id))
            .filter_map(|f| f.geometry.clone())
            .collect())
    }

    fn time_bounds_for_offering(&self, offering: &str) -> Result<TimeBounds> {
        self.entity(offering)?;
        let obs: Vec<&FixtureObservation> = self
            .fixture
            .active_observations()
            .filter(|o| o.offering == offering)
            .collect();
        Ok(TimeBounds {
            phenomenon: fold_periods(obs.iter().map(|o| TimePeriod::from(o.phenomenon_time))),
            result: fold_periods(obs.iter().filter_map(|o| o.result_time.map(TimePeriod::instant))),
        })
    }

    fn global_info(&self) -> Result<GlobalInfo> {
        self.listing("global")?;
        let fx = &self.fixture;
        let mut epsg_codes = fx.epsg_codes.clone();
        epsg_codes.extend(fx.features.iter().filter_map(|f| f.geometry.as_ref().map(|g| g.srid)));
        Ok(GlobalInfo {
            epsg_codes,
            observation_types: fx
                .active_constellations()
                .filter_map(|c| c.observation_type.clone())
                .collect(),
            feature_of_interest_types: fx
                .features
                .iter()
                .filter_map(|f| f.feature_type.clone())
                .collect(),
            procedure_description_formats: fx
                .procedures
                .iter()
                .filter(|p| !p.deleted)
                .filter_map(|p| p.description_format.clone())
                .collect(),
            swe_types: fx.swe_types.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture() -> Fixture {
        Fixture::from_json_str(
            r#"{
                "offerings": [{"id": "off-1"}, {"id": "off-2"}],
                "procedures": [{"id": "p1"}, {"id": "p2", "deleted": true}],
                "constellations": [
                    {"procedure": "p1", "observable_property": "temp", "offering": "off-1"},
                    {"procedure": "p2", "observable_property": "temp", "offering": "off-2"}
                ]
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn deleted_procedures_make_offering_inactive() {
        let ds = MemoryDatasource::new(fixture());
        let s = ds.open_session().unwrap();
        let rows = s.offerings().unwrap();
        assert!(rows[0].has_active_constellations);
        assert!(!rows[1].has_active_constellations);
    }

    #[test]
    fn sessions_are_counted_and_faults_apply() {
        let ds = MemoryDatasource::new(fixture());
        ds.fail_entity("off-1");
        {
            let s = ds.open_session().unwrap();
            assert!(s.offering_details("off-1").is_err());
            assert!(s.offering_details("off-2").is_ok());
        }
        assert_eq!(ds.sessions_opened(), 1);
        assert_eq!(ds.sessions_closed(), 1);
        ds.close();
        assert!(ds.open_session().is_err());
    }
}
