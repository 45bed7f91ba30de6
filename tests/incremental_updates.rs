use anyhow::Result;
use chrono::{DateTime, Utc};

use sos_content_cache::model::{Envelope, Geometry, SwitchedAxes, Time, TimePeriod};
use sos_content_cache::update::{
    CacheUpdate, DeleteObservationRequest, DeleteSensorRequest, FeatureSpec, InsertObservationRequest,
    InsertResultRequest, InsertResultTemplateRequest, InsertResultTemplateResponse, InsertSensorRequest,
    InsertSensorResponse, Observation, ObservationTemplate, OfferingSpec, RelatedFeatureSpec,
};
use sos_content_cache::{CacheError, IdSet, ReadableCache, Snapshot, WritableCache};

fn ts(s: &str) -> DateTime<Utc> {
    s.parse().expect("timestamp")
}

fn ids(v: &[&str]) -> IdSet {
    v.iter().map(|s| s.to_string()).collect()
}

fn insert_sensor(procedure: &str, offering: &str, properties: &[&str]) -> CacheUpdate {
    CacheUpdate::SensorInsertion {
        request: InsertSensorRequest {
            observable_properties: properties.iter().map(|s| s.to_string()).collect(),
            offerings: vec![OfferingSpec::new(offering)],
            observation_types: ids(&["OM_Measurement"]),
            ..Default::default()
        },
        response: InsertSensorResponse {
            assigned_procedure: procedure.to_string(),
            assigned_offering: offering.to_string(),
        },
    }
}

fn observation(id: &str, procedure: &str, property: &str, feature: &str, at: (f64, f64), time: &str) -> Observation {
    Observation {
        identifier: Some(id.to_string()),
        procedure: procedure.to_string(),
        observable_property: property.to_string(),
        observation_type: Some("OM_Measurement".to_string()),
        feature: FeatureSpec::new(feature).with_geometry(Geometry::point(at.0, at.1, 4326)),
        phenomenon_time: Time::instant(ts(time)),
        result_time: Some(ts(time)),
    }
}

fn insert_observation(offering: &str, o: Observation) -> CacheUpdate {
    CacheUpdate::ObservationInsertion {
        request: InsertObservationRequest {
            offerings: vec![offering.to_string()],
            observations: vec![o],
        },
    }
}

fn apply(snap: &mut Snapshot, u: &CacheUpdate) -> Result<()> {
    u.apply(snap, &SwitchedAxes::default())?;
    Ok(())
}

#[test]
fn insert_sensor_into_empty_cache() -> Result<()> {
    let mut snap = Snapshot::default();
    apply(&mut snap, &insert_sensor("proc-1", "off-1", &["temp"]))?;

    assert_eq!(snap.procedures_for_offering("off-1"), ids(&["proc-1"]));
    assert_eq!(snap.offerings_for_observable_property("temp"), ids(&["off-1"]));
    assert_eq!(snap.offerings_for_procedure("proc-1"), ids(&["off-1"]));
    assert_eq!(snap.procedures_for_observable_property("temp"), ids(&["proc-1"]));
    assert_eq!(snap.allowed_observation_types_for_offering("off-1"), ids(&["OM_Measurement"]));
    assert_eq!(snap.name_for_offering("off-1").as_deref(), Some("off-1"));
    assert!(snap.has_procedure("proc-1"));
    Ok(())
}

#[test]
fn insert_sensor_registers_parents_and_related_features() -> Result<()> {
    let mut snap = Snapshot::default();
    let update = CacheUpdate::SensorInsertion {
        request: InsertSensorRequest {
            observable_properties: vec!["temp".into()],
            offerings: vec![OfferingSpec {
                identifier: "off-1".into(),
                name: Some("Weather station 1".into()),
            }],
            related_features: vec![RelatedFeatureSpec {
                identifier: "lake".into(),
                roles: ids(&["samplingFeature"]),
            }],
            parent_procedures: ids(&["network"]),
            ..Default::default()
        },
        response: InsertSensorResponse {
            assigned_procedure: "proc-1".into(),
            assigned_offering: "off-1".into(),
        },
    };
    apply(&mut snap, &update)?;

    assert_eq!(snap.name_for_offering("off-1").as_deref(), Some("Weather station 1"));
    assert_eq!(snap.parent_procedures("proc-1", false, false), ids(&["network"]));
    assert_eq!(snap.child_procedures("network", false, false), ids(&["proc-1"]));
    assert_eq!(snap.related_features_for_offering("off-1"), ids(&["lake"]));
    assert_eq!(snap.roles_for_related_feature("lake"), ids(&["samplingFeature"]));
    assert!(snap.has_related_feature("lake"));
    Ok(())
}

#[test]
fn insert_observation_point_in_epsg4326() -> Result<()> {
    let mut snap = Snapshot::default();
    apply(&mut snap, &insert_sensor("proc-1", "off-1", &["temp"]))?;
    apply(
        &mut snap,
        &insert_observation(
            "off-1",
            observation("obs-1", "proc-1", "temp", "feat-1", (52.0, 7.5), "2024-05-01T12:00:00Z"),
        ),
    )?;

    assert!(snap.features_of_interest().contains("feat-1"));
    // 4326 stores latitude first; envelopes are easting/northing
    assert_eq!(snap.envelope_for_offering("off-1"), Some(Envelope::point(7.5, 52.0, 4326)));
    assert!(snap.observation_identifiers().contains("obs-1"));
    assert_eq!(snap.observation_identifiers_for_procedure("proc-1"), ids(&["obs-1"]));
    assert_eq!(snap.features_of_interest_for_offering("off-1"), ids(&["feat-1"]));
    assert_eq!(snap.procedures_for_feature_of_interest("feat-1"), ids(&["proc-1"]));
    assert!(snap.has_epsg_code(4326));
    assert_eq!(snap.min_phenomenon_time_for_offering("off-1"), Some(ts("2024-05-01T12:00:00Z")));
    assert_eq!(snap.max_result_time_for_offering("off-1"), Some(ts("2024-05-01T12:00:00Z")));
    assert_eq!(snap.global_envelope(), snap.envelope_for_offering("off-1"));
    Ok(())
}

#[test]
fn envelopes_and_times_only_grow() -> Result<()> {
    let mut snap = Snapshot::default();
    apply(&mut snap, &insert_sensor("proc-1", "off-1", &["temp"]))?;
    apply(
        &mut snap,
        &insert_observation(
            "off-1",
            observation("obs-1", "proc-1", "temp", "feat-1", (52.0, 7.5), "2024-05-01T12:00:00Z"),
        ),
    )?;
    let old = snap.global_envelope().expect("envelope after first observation");

    apply(
        &mut snap,
        &insert_observation(
            "off-1",
            observation("obs-2", "proc-1", "temp", "feat-2", (40.0, -3.5), "2023-01-01T00:00:00Z"),
        ),
    )?;
    let new = snap.global_envelope().expect("envelope after second observation");
    assert!(new.contains(&old));
    assert!(new.contains_point(-3.5, 40.0));
    assert_eq!(snap.min_phenomenon_time(), Some(ts("2023-01-01T00:00:00Z")));
    assert_eq!(snap.max_phenomenon_time(), Some(ts("2024-05-01T12:00:00Z")));
    Ok(())
}

#[test]
fn invalid_updates_leave_snapshot_untouched() -> Result<()> {
    let mut snap = Snapshot::default();
    apply(&mut snap, &insert_sensor("proc-1", "off-1", &["temp"]))?;
    let before = snap.clone();

    let empty_procedure = insert_sensor("", "off-2", &["temp"]);
    let err = empty_procedure.apply(&mut snap, &SwitchedAxes::default()).unwrap_err();
    assert!(matches!(err, CacheError::InvalidUpdate(_)));

    // second observation is broken: nothing of the first may be applied either
    let mut broken = observation("obs-2", "proc-1", "temp", "", (1.0, 1.0), "2024-01-01T00:00:00Z");
    broken.feature.identifier = String::new();
    let batch = CacheUpdate::ObservationInsertion {
        request: InsertObservationRequest {
            offerings: vec!["off-1".into()],
            observations: vec![
                observation("obs-1", "proc-1", "temp", "feat-1", (52.0, 7.5), "2024-05-01T12:00:00Z"),
                broken,
            ],
        },
    };
    assert!(batch.apply(&mut snap, &SwitchedAxes::default()).is_err());

    let unknown_template = CacheUpdate::ResultInsertion {
        request: InsertResultRequest {
            template_identifier: "tmpl-x".into(),
            observations: vec![observation("obs-3", "proc-1", "temp", "feat-1", (0.0, 0.0), "2024-01-01T00:00:00Z")],
        },
    };
    assert!(unknown_template.apply(&mut snap, &SwitchedAxes::default()).is_err());

    assert_eq!(snap, before);
    Ok(())
}

#[test]
fn delete_sensor_removes_orphaned_state() -> Result<()> {
    let mut snap = Snapshot::default();
    apply(&mut snap, &insert_sensor("proc-1", "off-1", &["temp"]))?;
    apply(&mut snap, &insert_sensor("proc-2", "off-2", &["wind"]))?;
    apply(
        &mut snap,
        &insert_observation(
            "off-1",
            observation("obs-1", "proc-1", "temp", "feat-1", (52.0, 7.5), "2024-05-01T12:00:00Z"),
        ),
    )?;
    apply(
        &mut snap,
        &insert_observation(
            "off-2",
            observation("obs-2", "proc-2", "wind", "feat-2", (10.0, 100.0), "2020-01-01T00:00:00Z"),
        ),
    )?;
    assert!(snap.global_envelope().expect("envelope").contains_point(100.0, 10.0));

    apply(
        &mut snap,
        &CacheUpdate::SensorDeletion {
            request: DeleteSensorRequest {
                procedure: "proc-2".into(),
            },
        },
    )?;

    assert!(!snap.has_procedure("proc-2"));
    assert_eq!(snap.offerings(), ids(&["off-1"]));
    assert!(!snap.has_offering("off-2"));
    assert!(snap.offerings_for_observable_property("wind").is_empty());
    assert!(!snap.has_feature_of_interest("feat-2"));
    assert!(snap.has_feature_of_interest("feat-1"));
    assert!(!snap.has_observation_identifier("obs-2"));
    assert!(snap.has_observation_identifier("obs-1"));
    // global bounds folded again from what is left
    assert_eq!(snap.global_envelope(), snap.envelope_for_offering("off-1"));
    assert_eq!(snap.min_phenomenon_time(), Some(ts("2024-05-01T12:00:00Z")));
    Ok(())
}

#[test]
fn delete_last_sensor_resets_global_bounds() -> Result<()> {
    let mut snap = Snapshot::default();
    apply(&mut snap, &insert_sensor("proc-1", "off-1", &["temp"]))?;
    apply(
        &mut snap,
        &insert_observation(
            "off-1",
            observation("obs-1", "proc-1", "temp", "feat-1", (52.0, 7.5), "2024-05-01T12:00:00Z"),
        ),
    )?;
    apply(
        &mut snap,
        &CacheUpdate::SensorDeletion {
            request: DeleteSensorRequest {
                procedure: "proc-1".into(),
            },
        },
    )?;
    assert!(snap.offerings().is_empty());
    assert_eq!(snap.global_envelope(), None);
    assert_eq!(snap.global_phenomenon_time(), None);
    assert_eq!(snap.global_result_time(), None);
    Ok(())
}

#[test]
fn delete_hidden_child_only_sensor_prunes_offering() -> Result<()> {
    let mut snap = Snapshot::default();
    apply(&mut snap, &insert_sensor("proc-1", "off-1", &["temp"]))?;
    apply(
        &mut snap,
        &insert_observation(
            "off-1",
            observation("obs-1", "proc-1", "temp", "feat-1", (52.0, 7.5), "2024-03-01T00:00:00Z"),
        ),
    )?;

    snap.add_procedure("child");
    snap.add_hidden_child_procedure_for_offering("off-h", "child");
    snap.set_name_for_offering("off-h", "Hidden only");
    snap.set_envelope_for_offering("off-h", Some(Envelope::point(20.0, 10.0, 4326)));
    snap.set_phenomenon_time_for_offering("off-h", Some(TimePeriod::instant(ts("2020-01-01T00:00:00Z"))));
    snap.recalculate_global_envelope();
    snap.recalculate_phenomenon_time();
    assert_eq!(snap.offerings(), ids(&["off-1", "off-h"]));

    apply(
        &mut snap,
        &CacheUpdate::SensorDeletion {
            request: DeleteSensorRequest {
                procedure: "child".to_string(),
            },
        },
    )?;

    assert_eq!(snap.offerings(), ids(&["off-1"]));
    assert!(snap.name_for_offering("off-h").is_none());
    assert!(snap.envelope_for_offering("off-h").is_none());
    assert!(snap.phenomenon_time_for_offering("off-h").is_none());
    assert_eq!(snap.global_envelope(), snap.envelope_for_offering("off-1"));
    assert_eq!(snap.global_phenomenon_time(), snap.phenomenon_time_for_offering("off-1"));
    Ok(())
}

#[test]
fn result_template_then_result() -> Result<()> {
    let mut snap = Snapshot::default();
    apply(&mut snap, &insert_sensor("proc-1", "off-1", &["temp"]))?;
    apply(
        &mut snap,
        &CacheUpdate::ResultTemplateInsertion {
            request: InsertResultTemplateRequest {
                offerings: vec!["off-1".into()],
                observation_template: ObservationTemplate {
                    procedure: "proc-1".into(),
                    observable_property: "temp".into(),
                    feature: Some(FeatureSpec::new("feat-1")),
                    observation_type: None,
                },
            },
            response: InsertResultTemplateResponse {
                accepted_template: "tmpl-1".into(),
            },
        },
    )?;
    assert!(snap.has_result_template("tmpl-1"));
    assert!(snap.has_result_template_for_offering("tmpl-1", "off-1"));
    assert_eq!(snap.observable_properties_for_result_template("tmpl-1"), ids(&["temp"]));

    apply(
        &mut snap,
        &CacheUpdate::ResultInsertion {
            request: InsertResultRequest {
                template_identifier: "tmpl-1".into(),
                observations: vec![observation(
                    "obs-9",
                    "proc-1",
                    "temp",
                    "feat-3",
                    (50.0, 8.0),
                    "2024-06-01T00:00:00Z",
                )],
            },
        },
    )?;
    assert!(snap.has_observation_identifier("obs-9"));
    assert_eq!(snap.features_of_interest_for_offering("off-1"), ids(&["feat-3"]));
    assert_eq!(snap.features_of_interest_for_result_template("tmpl-1"), ids(&["feat-1", "feat-3"]));
    assert_eq!(snap.envelope_for_offering("off-1"), Some(Envelope::point(8.0, 50.0, 4326)));
    Ok(())
}

#[test]
fn delete_observation_forgets_identifier() -> Result<()> {
    let mut snap = Snapshot::default();
    apply(&mut snap, &insert_sensor("proc-1", "off-1", &["temp"]))?;
    let obs = observation("obs-1", "proc-1", "temp", "feat-1", (52.0, 7.5), "2024-05-01T12:00:00Z");
    apply(&mut snap, &insert_observation("off-1", obs.clone()))?;

    apply(
        &mut snap,
        &CacheUpdate::ObservationDeletion {
            request: DeleteObservationRequest {
                offerings: vec!["off-1".into()],
                observation: obs,
            },
        },
    )?;
    assert!(!snap.has_observation_identifier("obs-1"));
    assert!(snap.observation_identifiers_for_procedure("proc-1").is_empty());
    // per-offering bounds stay until the next rebuild
    assert!(snap.phenomenon_time_for_offering("off-1").is_some());
    assert_eq!(snap.global_phenomenon_time(), snap.phenomenon_time_for_offering("off-1"));
    Ok(())
}

/// Random mix of updates: relations must stay symmetric in both directions.
#[test]
fn random_updates_keep_relations_symmetric() -> Result<()> {
    let mut rng = oorandom::Rand32::new(0x5eed_cafe);
    let mut snap = Snapshot::default();
    let mut obs_id = 0u32;

    for _ in 0..400 {
        let p = format!("proc-{}", rng.rand_range(0..8));
        let o = format!("off-{}", rng.rand_range(0..5));
        let prop = format!("prop-{}", rng.rand_range(0..6));
        let u = match rng.rand_range(0..10) {
            0..=3 => insert_sensor(&p, &o, &[prop.as_str()]),
            4..=8 => {
                obs_id += 1;
                let f = format!("feat-{}", rng.rand_range(0..10));
                let lat = rng.rand_float() as f64 * 180.0 - 90.0;
                let lon = rng.rand_float() as f64 * 360.0 - 180.0;
                insert_observation(
                    &o,
                    observation(&format!("obs-{}", obs_id), &p, &prop, &f, (lat, lon), "2024-01-01T00:00:00Z"),
                )
            }
            _ => CacheUpdate::SensorDeletion {
                request: DeleteSensorRequest { procedure: p.clone() },
            },
        };
        apply(&mut snap, &u)?;
    }

    for o in snap.offerings() {
        for p in snap.procedures_for_offering(&o) {
            assert!(snap.offerings_for_procedure(&p).contains(&o), "{} -> {}", o, p);
        }
        for prop in snap.observable_properties_for_offering(&o) {
            assert!(snap.offerings_for_observable_property(&prop).contains(&o), "{} -> {}", o, prop);
        }
        if let (Some(e), Some(g)) = (snap.envelope_for_offering(&o), snap.global_envelope()) {
            assert!(g.contains(&e));
        }
    }
    for p in snap.procedures() {
        for o in snap.offerings_for_procedure(&p) {
            assert!(snap.procedures_for_offering(&o).contains(&p), "{} -> {}", p, o);
        }
        for prop in snap.observable_properties_for_procedure(&p) {
            assert!(snap.procedures_for_observable_property(&prop).contains(&p), "{} -> {}", p, prop);
        }
    }
    for prop in snap.observable_properties() {
        for o in snap.offerings_for_observable_property(&prop) {
            assert!(snap.observable_properties_for_offering(&o).contains(&prop));
        }
        for p in snap.procedures_for_observable_property(&prop) {
            assert!(snap.observable_properties_for_procedure(&p).contains(&prop));
        }
    }
    Ok(())
}
