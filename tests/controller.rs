use std::collections::BTreeSet;
use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use anyhow::Result;
use chrono::{TimeZone, Utc};

use sos_content_cache::datasource::memory::{
    Fixture, FixtureFeature, FixtureObservableProperty, FixtureObservation, FixtureOffering, FixtureProcedure,
    MemoryDatasource,
};
use sos_content_cache::datasource::{Constellation, Datasource};
use sos_content_cache::model::{Geometry, Time};
use sos_content_cache::persist::{load_and_consume, write_snapshot_file};
use sos_content_cache::update::{CacheUpdate, InsertSensorRequest, InsertSensorResponse};
use sos_content_cache::{
    CacheBuilder, CacheConfig, CacheError, CacheState, ContentCacheController, ReadableCache, Snapshot,
    WritableCache,
};

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

fn unique_root(prefix: &str) -> PathBuf {
    let pid = std::process::id();
    let t = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    let id = NEXT_ID.fetch_add(1, Ordering::Relaxed);
    std::env::temp_dir().join(format!("sos-cache-ctl-{prefix}-{pid}-{t}-{id}"))
}

fn fixture(n: usize) -> Fixture {
    let mut fx = Fixture::default();
    for i in 0..n {
        let off = format!("off-{}", i);
        let proc_id = format!("proc-{}", i);
        let feat = format!("feat-{}", i);
        fx.offerings.push(FixtureOffering {
            id: off.clone(),
            ..Default::default()
        });
        fx.procedures.push(FixtureProcedure {
            id: proc_id.clone(),
            ..Default::default()
        });
        fx.features.push(FixtureFeature {
            id: feat.clone(),
            geometry: Some(Geometry::point(48.0, 11.0 + i as f64, 4326)),
            ..Default::default()
        });
        fx.constellations.push(Constellation {
            procedure: proc_id.clone(),
            observable_property: "temp".into(),
            offering: off.clone(),
            observation_type: None,
            hidden_child: false,
            deleted: false,
        });
        fx.observations.push(FixtureObservation {
            id: format!("obs-{}", i),
            procedure: proc_id,
            observable_property: "temp".into(),
            offering: off,
            feature: feat,
            phenomenon_time: Time::instant(Utc.with_ymd_and_hms(2024, 2, 1, i as u32, 0, 0).unwrap()),
            result_time: None,
            deleted: false,
        });
    }
    fx.observable_properties.push(FixtureObservableProperty {
        id: "temp".into(),
        ..Default::default()
    });
    fx
}

fn config(root: &PathBuf) -> CacheConfig {
    CacheConfig::default()
        .with_cache_file(root.join("cache.tmp"))
        .with_pool_size(3)
}

fn start(root: &PathBuf, mem: &MemoryDatasource) -> Result<Arc<ContentCacheController>> {
    let ds: Arc<dyn Datasource> = Arc::new(mem.clone());
    Ok(ContentCacheController::start(config(root), ds)?)
}

fn insert_sensor(procedure: &str, offering: &str) -> CacheUpdate {
    CacheUpdate::SensorInsertion {
        request: InsertSensorRequest {
            observable_properties: vec!["temp".into()],
            ..Default::default()
        },
        response: InsertSensorResponse {
            assigned_procedure: procedure.to_string(),
            assigned_offering: offering.to_string(),
        },
    }
}

fn wait_until<F: Fn() -> bool>(timeout: Duration, f: F) -> bool {
    let until = Instant::now() + timeout;
    while Instant::now() < until {
        if f() {
            return true;
        }
        thread::sleep(Duration::from_millis(10));
    }
    f()
}

#[test]
fn start_without_file_rebuilds() -> Result<()> {
    let root = unique_root("fresh");
    let mem = MemoryDatasource::new(fixture(4));
    let ctl = start(&root, &mem)?;

    assert_eq!(ctl.state(), CacheState::Ready);
    let snap = ctl.snapshot();
    assert_eq!(snap.offerings().len(), 4);
    assert_eq!(snap.offerings_for_observable_property("temp").len(), 4);
    assert!(!ctl.is_refresh_running());

    ctl.cleanup();
    let _ = fs::remove_dir_all(&root);
    Ok(())
}

#[test]
fn start_loads_persisted_snapshot_once() -> Result<()> {
    let root = unique_root("load");
    fs::create_dir_all(&root)?;
    let file = root.join("cache.tmp");

    let mut persisted = Snapshot::default();
    insert_sensor("proc-persisted", "off-persisted").apply(&mut persisted, &Default::default())?;
    write_snapshot_file(&file, &persisted, true)?;

    // the datastore knows something else entirely
    let mem = MemoryDatasource::new(fixture(2));
    let ctl = start(&root, &mem)?;
    assert_eq!(*ctl.snapshot(), persisted);
    assert!(!file.exists());
    assert_eq!(mem.sessions_opened(), 0);

    drop(ctl);
    let again = start(&root, &mem)?;
    assert!(again.snapshot().has_offering("off-1"));
    assert!(!again.snapshot().has_offering("off-persisted"));

    let _ = fs::remove_dir_all(&root);
    Ok(())
}

#[test]
fn corrupt_file_falls_back_to_rebuild() -> Result<()> {
    let root = unique_root("corrupt");
    fs::create_dir_all(&root)?;
    let file = root.join("cache.tmp");
    fs::write(&file, b"SOSCACHE\x07\x00\x00\x00garbage")?;

    let mem = MemoryDatasource::new(fixture(3));
    let ctl = start(&root, &mem)?;
    assert_eq!(ctl.snapshot().offerings().len(), 3);
    assert!(!file.exists());

    let _ = fs::remove_dir_all(&root);
    Ok(())
}

#[test]
fn invalid_configuration_is_rejected() -> Result<()> {
    let root = unique_root("badcfg");
    let mem = MemoryDatasource::new(fixture(1));
    let ds: Arc<dyn Datasource> = Arc::new(mem.clone());
    let cfg = config(&root).with_switch_axis_epsg("4001-x");
    match ContentCacheController::start(cfg, ds) {
        Err(CacheError::Configuration(msg)) => assert!(msg.contains("SWITCH_AXIS")),
        Err(e) => panic!("unexpected error {}", e),
        Ok(_) => panic!("bad axis list must be rejected"),
    }
    assert_eq!(mem.sessions_opened(), 0);
    Ok(())
}

#[test]
fn updates_are_copy_on_write() -> Result<()> {
    let root = unique_root("cow");
    let mem = MemoryDatasource::new(fixture(2));
    let ctl = start(&root, &mem)?;

    let before = ctl.snapshot();
    ctl.apply_update(&insert_sensor("proc-new", "off-new"))?;
    let after = ctl.snapshot();

    assert!(!before.has_offering("off-new"));
    assert!(after.has_offering("off-new"));
    assert_eq!(after.procedures_for_offering("off-new").len(), 1);

    let bad = insert_sensor("", "off-x");
    assert!(matches!(ctl.apply_update(&bad), Err(CacheError::InvalidUpdate(_))));
    assert!(Arc::ptr_eq(&after, &ctl.snapshot()) || *after == *ctl.snapshot());

    ctl.with_writable(|cache| {
        cache.add_feature_of_interest_type("SF_SamplingCurve");
        Ok(())
    })?;
    assert!(!after.feature_of_interest_types().contains("SF_SamplingCurve"));
    assert!(ctl.snapshot().feature_of_interest_types().contains("SF_SamplingCurve"));

    ctl.cleanup();
    let _ = fs::remove_dir_all(&root);
    Ok(())
}

#[test]
fn partial_rebuild_swaps_and_reports() -> Result<()> {
    let root = unique_root("partial");
    let mem = MemoryDatasource::new(fixture(3));
    let ctl = start(&root, &mem)?;

    mem.update_fixture(|fx| *fx = fixture(6));
    mem.fail_entity("off-4");
    let err = ctl.rebuild_from_datasource().unwrap_err();
    assert!(err.is_aggregate());
    assert_eq!(err.task_errors().len(), 1);
    assert_eq!(err.task_errors()[0].entity, "off-4");

    let snap = ctl.snapshot();
    assert_eq!(snap.offerings().len(), 5);
    assert!(snap.has_offering("off-5"));
    assert!(!snap.has_offering("off-4"));

    ctl.cleanup();
    let _ = fs::remove_dir_all(&root);
    Ok(())
}

#[test]
fn hard_failure_keeps_the_live_snapshot() -> Result<()> {
    let root = unique_root("hard");
    let mem = MemoryDatasource::new(fixture(3));
    let ctl = start(&root, &mem)?;
    let before = ctl.snapshot();

    mem.update_fixture(|fx| *fx = fixture(5));
    mem.fail_listing("features");
    match ctl.rebuild_from_datasource() {
        Err(CacheError::DatasourceQuery(_)) => {}
        other => panic!("expected a datasource error, got {:?}", other.map(|r| r.fingerprint)),
    }
    assert!(Arc::ptr_eq(&before, &ctl.snapshot()));
    assert_eq!(ctl.state(), CacheState::Ready);

    ctl.cleanup();
    let _ = fs::remove_dir_all(&root);
    Ok(())
}

#[test]
fn readers_see_old_or_new_snapshot_only() -> Result<()> {
    let root = unique_root("isolation");
    let mem = MemoryDatasource::new(fixture(3));
    let ctl = start(&root, &mem)?;
    let old = ctl.snapshot().fingerprint();

    mem.update_fixture(|fx| *fx = fixture(8));
    mem.stall_entity("off-5", Duration::from_millis(200));

    let stop = Arc::new(AtomicBool::new(false));
    let mut readers = Vec::new();
    for _ in 0..4 {
        let ctl = ctl.clone();
        let stop = stop.clone();
        readers.push(thread::spawn(move || {
            let mut seen = BTreeSet::new();
            while !stop.load(Ordering::Acquire) {
                let snap = ctl.snapshot();
                seen.insert(snap.fingerprint());
            }
            seen
        }));
    }

    ctl.rebuild_from_datasource()?;
    let new = ctl.snapshot().fingerprint();
    thread::sleep(Duration::from_millis(20));
    stop.store(true, Ordering::Release);

    assert_ne!(old, new);
    for r in readers {
        let seen = r.join().expect("reader thread");
        for fp in seen {
            assert!(fp == old || fp == new, "reader saw an intermediate snapshot {:016x}", fp);
        }
    }

    ctl.cleanup();
    let _ = fs::remove_dir_all(&root);
    Ok(())
}

#[test]
fn updates_during_rebuild_survive_the_swap() -> Result<()> {
    let root = unique_root("journal");
    let mem = MemoryDatasource::new(fixture(3));
    let ctl = start(&root, &mem)?;

    mem.stall_entity("off-0", Duration::from_millis(400));
    let rebuilding = {
        let ctl = ctl.clone();
        thread::spawn(move || ctl.rebuild_from_datasource().map(|_| ()))
    };
    assert!(wait_until(Duration::from_secs(5), || ctl.state() == CacheState::Rebuilding));
    ctl.apply_update(&insert_sensor("proc-live", "off-live"))?;
    assert!(ctl.snapshot().has_offering("off-live"));

    rebuilding.join().expect("rebuild thread")?;
    let snap = ctl.snapshot();
    assert!(snap.has_offering("off-live"));
    assert!(snap.has_offering("off-0"));
    assert_eq!(snap.offerings_for_procedure("proc-live").len(), 1);

    ctl.cleanup();
    let _ = fs::remove_dir_all(&root);
    Ok(())
}

#[test]
fn refresh_timer_rebuilds_and_stops() -> Result<()> {
    let root = unique_root("refresh");
    let mem = MemoryDatasource::new(fixture(2));
    let ds: Arc<dyn Datasource> = Arc::new(mem.clone());
    let ctl = CacheBuilder::new()
        .config(config(&root))
        .refresh_interval(Some(Duration::from_millis(50)))
        .datasource(ds)
        .start()?;
    assert!(ctl.is_refresh_running());

    mem.update_fixture(|fx| *fx = fixture(4));
    assert!(wait_until(Duration::from_secs(10), || ctl.snapshot().offerings().len() == 4));

    ctl.stop_refresh();
    assert!(!ctl.is_refresh_running());

    // no rebuild after stop_refresh returned
    mem.update_fixture(|fx| *fx = fixture(6));
    thread::sleep(Duration::from_millis(200));
    assert_eq!(ctl.snapshot().offerings().len(), 4);

    ctl.cleanup();
    let _ = fs::remove_dir_all(&root);
    Ok(())
}

#[test]
fn cleanup_persists_and_shuts_down() -> Result<()> {
    let root = unique_root("cleanup");
    let mem = MemoryDatasource::new(fixture(3));
    let ds: Arc<dyn Datasource> = Arc::new(mem.clone());
    let ctl = ContentCacheController::start(
        config(&root).with_refresh_interval(Some(Duration::from_secs(3600))),
        ds,
    )?;
    ctl.apply_update(&insert_sensor("proc-extra", "off-extra"))?;
    let last = ctl.snapshot();

    ctl.cleanup();
    assert_eq!(ctl.state(), CacheState::Cleanup);
    assert!(!ctl.is_refresh_running());
    assert!(mem.is_closed());
    assert!(root.join("cache.tmp").exists());

    assert!(matches!(ctl.apply_update(&insert_sensor("p", "o")), Err(CacheError::Shutdown)));
    assert!(matches!(ctl.rebuild_from_datasource(), Err(CacheError::Shutdown)));
    assert!(matches!(ctl.persist(), Err(CacheError::Shutdown)));
    // reads keep working
    assert!(ctl.snapshot().has_offering("off-extra"));
    // second cleanup is a no-op
    ctl.cleanup();

    let restored = load_and_consume(&root.join("cache.tmp"))?.expect("persisted on cleanup");
    assert_eq!(restored, *last);

    let _ = fs::remove_dir_all(&root);
    Ok(())
}

#[test]
fn persist_on_update_writes_after_each_change() -> Result<()> {
    let root = unique_root("persist-on-update");
    let mem = MemoryDatasource::new(fixture(1));
    let ds: Arc<dyn Datasource> = Arc::new(mem.clone());
    let ctl = ContentCacheController::start(config(&root).with_persist_on_update(true), ds)?;
    let file = root.join("cache.tmp");
    assert!(file.exists());

    ctl.apply_update(&insert_sensor("proc-9", "off-9"))?;
    let on_disk = sos_content_cache::persist::read_snapshot_file(&file)?;
    assert!(on_disk.has_offering("off-9"));
    assert_eq!(on_disk, *ctl.snapshot());

    ctl.cleanup();
    let _ = fs::remove_dir_all(&root);
    Ok(())
}
