use anyhow::{anyhow, Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::config::CacheConfig;
use crate::datasource::memory::{Fixture, MemoryDatasource};
use crate::datasource::Datasource;
use crate::metrics;
use crate::persist::{self, HEADER_LEN};
use crate::pipeline::{run_full_rebuild, RebuildSettings};

pub fn cmd_rebuild(
    fixture: PathBuf,
    cache_file: PathBuf,
    pool_size: Option<i64>,
    timeout_ms: Option<u64>,
    compress: bool,
    json: bool,
) -> Result<()> {
    let mut cfg = CacheConfig::from_env().with_cache_file(cache_file.clone());
    if let Some(n) = pool_size {
        cfg = cfg.with_pool_size(n);
    }
    if let Some(ms) = timeout_ms {
        cfg = cfg.with_task_timeout(Some(Duration::from_millis(ms)));
    }
    if compress {
        cfg = cfg.with_compress(true);
    }
    cfg.validate()?;
    let settings = RebuildSettings::from_config(&cfg)?;
    metrics::reset();

    let fx = Fixture::from_json_file(&fixture)?;
    let memory = MemoryDatasource::new(fx);
    let ds: Arc<dyn Datasource> = Arc::new(memory.clone());

    let outcome = run_full_rebuild(&settings, ds).context("rebuild from fixture")?;
    let written = persist::write_snapshot_file(&cache_file, &outcome.snapshot, cfg.compress)?;
    let stats = outcome.snapshot.stats();

    if json {
        let out = serde_json::json!({
            "cache_file": cache_file.display().to_string(),
            "bytes": written,
            "stats": stats,
            "report": outcome.report,
            "sessions": { "opened": memory.sessions_opened(), "closed": memory.sessions_closed() },
            "metrics": metrics::snapshot(),
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else {
        println!("Rebuilt cache from {} in {:?}", fixture.display(), outcome.report.duration);
        for p in &outcome.report.phases {
            println!(
                "  {:<22} total={:<5} queued={:<5} skipped={:<5} errors={}{}",
                p.family,
                p.total,
                p.queued,
                p.skipped,
                p.errors.len(),
                if p.timed_out { " (timed out)" } else { "" }
            );
            for e in &p.errors {
                println!("    ! {}", e);
            }
        }
        println!("  offerings            = {}", stats.offerings);
        println!("  procedures           = {}", stats.procedures);
        println!("  observable props     = {}", stats.observable_properties);
        println!("  features of interest = {}", stats.features_of_interest);
        println!("  result templates     = {}", stats.result_templates);
        println!("  fingerprint          = {:016x}", stats.fingerprint);
        let m = metrics::snapshot();
        println!(
            "  tasks                = run {}, failed {}, skipped {} (error ratio {:.3})",
            m.rebuild_tasks_run,
            m.rebuild_task_errors,
            m.rebuild_tasks_skipped,
            m.task_error_ratio()
        );
        println!("  open sessions        = {}", m.open_sessions());
        println!("Persisted {} bytes to {}", written, cache_file.display());
    }

    if outcome.report.is_clean() {
        Ok(())
    } else {
        Err(anyhow!(
            "rebuild finished with {} task error(s); partial snapshot persisted",
            outcome.report.error_count()
        ))
    }
}

pub fn cmd_status(cache_file: PathBuf, json: bool) -> Result<()> {
    let h = persist::inspect(&cache_file)?;
    let file_len = std::fs::metadata(&cache_file)
        .with_context(|| format!("stat {}", cache_file.display()))?
        .len();
    let consistent = file_len == HEADER_LEN as u64 + h.payload_len;

    if json {
        let out = serde_json::json!({
            "cache_file": cache_file.display().to_string(),
            "version": h.version,
            "codec": h.codec_name(),
            "payload_len": h.payload_len,
            "checksum": format!("{:08x}", h.checksum),
            "file_len": file_len,
            "length_consistent": consistent,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else {
        println!("Snapshot at {}", cache_file.display());
        println!("  version     = {}", h.version);
        println!("  codec       = {}", h.codec_name());
        println!("  payload_len = {} bytes", h.payload_len);
        println!("  crc32c      = {:08x}", h.checksum);
        println!("  file_len    = {} bytes{}", file_len, if consistent { "" } else { " (TRUNCATED?)" });
    }
    Ok(())
}

pub fn cmd_dump(cache_file: PathBuf) -> Result<()> {
    let snap = persist::read_snapshot_file(&cache_file)?;
    println!("{}", serde_json::to_string_pretty(&snap)?);
    Ok(())
}
