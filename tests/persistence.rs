use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::Result;
use chrono::{TimeZone, Utc};

use sos_content_cache::model::{Geometry, SwitchedAxes, Time};
use sos_content_cache::persist::{
    inspect, load_and_consume, read_snapshot_file, write_snapshot_file, CODEC_NONE, CODEC_ZSTD, HEADER_LEN,
};
use sos_content_cache::update::{
    CacheUpdate, FeatureSpec, InsertObservationRequest, InsertSensorRequest, InsertSensorResponse, Observation,
};
use sos_content_cache::{ReadableCache, Snapshot};

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

fn unique_root(prefix: &str) -> PathBuf {
    let pid = std::process::id();
    let t = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    let id = NEXT_ID.fetch_add(1, Ordering::Relaxed);
    std::env::temp_dir().join(format!("sos-cache-persist-{prefix}-{pid}-{t}-{id}"))
}

/// A few offerings with envelopes, times and identifiers.
fn sample_snapshot() -> Result<Snapshot> {
    let mut snap = Snapshot::default();
    let axes = SwitchedAxes::default();
    for i in 0..5 {
        let off = format!("off-{}", i);
        let proc_id = format!("proc-{}", i);
        CacheUpdate::SensorInsertion {
            request: InsertSensorRequest {
                observable_properties: vec!["temp".into(), format!("prop-{}", i)],
                ..Default::default()
            },
            response: InsertSensorResponse {
                assigned_procedure: proc_id.clone(),
                assigned_offering: off.clone(),
            },
        }
        .apply(&mut snap, &axes)?;
        let at = Utc.with_ymd_and_hms(2024, 3, 1 + i, 6, 0, 0).unwrap();
        CacheUpdate::ObservationInsertion {
            request: InsertObservationRequest {
                offerings: vec![off],
                observations: vec![Observation {
                    identifier: Some(format!("obs-{}", i)),
                    procedure: proc_id,
                    observable_property: "temp".into(),
                    observation_type: None,
                    feature: FeatureSpec::new(&format!("feat-{}", i))
                        .with_geometry(Geometry::point(51.0 + i as f64, 7.0 - i as f64, 4326)),
                    phenomenon_time: Time::instant(at),
                    result_time: Some(at),
                }],
            },
        }
        .apply(&mut snap, &axes)?;
    }
    Ok(snap)
}

#[test]
fn persist_then_load_consumes_the_file() -> Result<()> {
    let root = unique_root("roundtrip");
    fs::create_dir_all(&root)?;
    let file = root.join("cache.tmp");
    let snap = sample_snapshot()?;

    for compress in [false, true] {
        let written = write_snapshot_file(&file, &snap, compress)?;
        assert_eq!(written, fs::metadata(&file)?.len());

        let h = inspect(&file)?;
        assert_eq!(h.version, 1);
        assert_eq!(h.codec, if compress { CODEC_ZSTD } else { CODEC_NONE });
        assert_eq!(h.payload_len + HEADER_LEN as u64, written);

        // non-consuming read
        assert_eq!(read_snapshot_file(&file)?, snap);
        assert!(file.exists());

        let loaded = load_and_consume(&file)?.expect("snapshot present");
        assert_eq!(loaded, snap);
        assert_eq!(loaded.fingerprint(), snap.fingerprint());
        assert!(!file.exists());
    }

    let _ = fs::remove_dir_all(&root);
    Ok(())
}

#[test]
fn missing_file_loads_nothing() -> Result<()> {
    let root = unique_root("missing");
    fs::create_dir_all(&root)?;
    assert!(load_and_consume(&root.join("absent.tmp"))?.is_none());
    let _ = fs::remove_dir_all(&root);
    Ok(())
}

#[test]
fn corrupt_files_fail_and_are_still_consumed() -> Result<()> {
    let root = unique_root("corrupt");
    fs::create_dir_all(&root)?;
    let file = root.join("cache.tmp");
    let snap = sample_snapshot()?;

    // flipped payload byte: checksum mismatch
    write_snapshot_file(&file, &snap, false)?;
    let mut bytes = fs::read(&file)?;
    let mid = HEADER_LEN + (bytes.len() - HEADER_LEN) / 2;
    bytes[mid] ^= 0x5a;
    fs::write(&file, &bytes)?;
    let err = load_and_consume(&file).unwrap_err();
    assert!(format!("{:#}", err).contains("checksum"));
    assert!(!file.exists());

    // truncated payload
    write_snapshot_file(&file, &snap, true)?;
    let bytes = fs::read(&file)?;
    fs::write(&file, &bytes[..bytes.len() - 7])?;
    assert!(load_and_consume(&file).is_err());
    assert!(!file.exists());

    // legacy / foreign file without header
    fs::write(&file, br#"{"procedures": []}"#)?;
    assert!(load_and_consume(&file).is_err());
    assert!(!file.exists());

    // valid header and checksum, but not a snapshot
    let payload = br#"{"hello": "world"}"#;
    let mut forged = Vec::new();
    forged.extend_from_slice(b"SOSCACHE");
    forged.extend_from_slice(&1u32.to_le_bytes());
    forged.extend_from_slice(&[CODEC_NONE, 0, 0, 0]);
    forged.extend_from_slice(&(payload.len() as u64).to_le_bytes());
    forged.extend_from_slice(&crc32c::crc32c(payload).to_le_bytes());
    forged.extend_from_slice(payload);
    fs::write(&file, &forged)?;
    assert_eq!(inspect(&file)?.payload_len, payload.len() as u64);
    assert!(load_and_consume(&file).is_err());
    assert!(!file.exists());

    let _ = fs::remove_dir_all(&root);
    Ok(())
}

#[test]
fn persisted_snapshot_keeps_every_relation() -> Result<()> {
    let root = unique_root("relations");
    fs::create_dir_all(&root)?;
    let file = root.join("cache.tmp");
    let snap = sample_snapshot()?;
    write_snapshot_file(&file, &snap, true)?;
    let back = read_snapshot_file(&file)?;

    assert_eq!(back.offerings(), snap.offerings());
    assert_eq!(back.offerings_for_observable_property("temp").len(), 5);
    assert_eq!(back.envelope_for_offering("off-3"), snap.envelope_for_offering("off-3"));
    assert_eq!(back.global_phenomenon_time(), snap.global_phenomenon_time());
    assert_eq!(back.observation_identifiers(), snap.observation_identifiers());
    assert_eq!(back.epsg_codes(), snap.epsg_codes());

    let _ = fs::remove_dir_all(&root);
    Ok(())
}
