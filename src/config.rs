//! Centralized configuration and builder for the content cache.
//!
//! - `CacheConfig::from_env()` reads the `SOS_CACHE_*` variables.
//! - Fluent `with_*` setters override single fields.
//! - `CacheBuilder` collects the settings plus the datasource and starts a controller.
//!
//! Env variables:
//! - SOS_CACHE_FILE              persisted snapshot path (default "cache.tmp")
//! - SOS_CACHE_POOL_SIZE         rebuild worker threads (default: available parallelism)
//! - SOS_CACHE_DEFAULT_EPSG      default spatial reference (default 4326)
//! - SOS_CACHE_SWITCH_AXIS_EPSG  northing-first EPSG ranges, "a-b;c;..."
//! - SOS_CACHE_REFRESH_SECS      periodic rebuild interval (0/absent = disabled)
//! - SOS_CACHE_TASK_TIMEOUT_MS   deadline for one rebuild phase (absent = wait forever)
//! - SOS_CACHE_PERSIST_ON_UPDATE persist after each update/rebuild ("1|true|on|yes")
//! - SOS_CACHE_COMPRESS          zstd-compress the persisted payload

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::controller::ContentCacheController;
use crate::datasource::Datasource;
use crate::error::{CacheError, CacheResult};
use crate::model::{SwitchedAxes, DEFAULT_SWITCHED_EPSG};

pub const DEFAULT_CACHE_FILE: &str = "cache.tmp";
pub const DEFAULT_EPSG: i32 = 4326;

/// Top-level configuration of the content cache.
#[derive(Clone, Debug)]
pub struct CacheConfig {
    /// Where the snapshot is persisted on cleanup and loaded from on start.
    pub cache_file: PathBuf,

    /// Worker threads per rebuild phase. Values below 1 are clamped to 1 at use.
    pub pool_size: i64,

    pub default_epsg: i32,

    /// Raw "a-b;c" list; parsed by `switched_axes()`.
    pub switch_axis_epsg: String,

    /// Periodic rebuild interval; None disables the refresh timer.
    pub refresh_interval: Option<Duration>,

    /// Deadline for one rebuild phase. None = a stalled datastore call stalls the phase.
    pub task_timeout: Option<Duration>,

    pub persist_on_update: bool,

    /// zstd for the persisted payload.
    pub compress: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            cache_file: PathBuf::from(DEFAULT_CACHE_FILE),
            pool_size: default_pool_size(),
            default_epsg: DEFAULT_EPSG,
            switch_axis_epsg: DEFAULT_SWITCHED_EPSG.to_string(),
            refresh_interval: None,
            task_timeout: None,
            persist_on_update: false,
            compress: false,
        }
    }
}

fn default_pool_size() -> i64 {
    std::thread::available_parallelism()
        .map(|n| n.get() as i64)
        .unwrap_or(1)
}

fn env_flag(v: &str) -> bool {
    let s = v.trim().to_ascii_lowercase();
    s == "1" || s == "true" || s == "on" || s == "yes"
}

impl CacheConfig {
    /// Load configuration from environment variables. Unparsable numbers keep the default.
    pub fn from_env() -> Self {
        let mut cfg = Self::default();

        if let Ok(v) = std::env::var("SOS_CACHE_FILE") {
            let s = v.trim();
            if !s.is_empty() {
                cfg.cache_file = PathBuf::from(s);
            }
        }

        if let Ok(v) = std::env::var("SOS_CACHE_POOL_SIZE") {
            if let Ok(n) = v.trim().parse::<i64>() {
                cfg.pool_size = n;
            }
        }

        if let Ok(v) = std::env::var("SOS_CACHE_DEFAULT_EPSG") {
            if let Ok(n) = v.trim().parse::<i32>() {
                cfg.default_epsg = n;
            }
        }

        if let Ok(v) = std::env::var("SOS_CACHE_SWITCH_AXIS_EPSG") {
            cfg.switch_axis_epsg = v.trim().to_string();
        }

        if let Ok(v) = std::env::var("SOS_CACHE_REFRESH_SECS") {
            if let Ok(n) = v.trim().parse::<u64>() {
                cfg.refresh_interval = if n == 0 { None } else { Some(Duration::from_secs(n)) };
            }
        }

        if let Ok(v) = std::env::var("SOS_CACHE_TASK_TIMEOUT_MS") {
            if let Ok(n) = v.trim().parse::<u64>() {
                cfg.task_timeout = if n == 0 { None } else { Some(Duration::from_millis(n)) };
            }
        }

        if let Ok(v) = std::env::var("SOS_CACHE_PERSIST_ON_UPDATE") {
            cfg.persist_on_update = env_flag(&v);
        }

        if let Ok(v) = std::env::var("SOS_CACHE_COMPRESS") {
            cfg.compress = env_flag(&v);
        }

        cfg
    }

    pub fn with_cache_file<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.cache_file = path.into();
        self
    }

    pub fn with_pool_size(mut self, n: i64) -> Self {
        self.pool_size = n;
        self
    }

    pub fn with_default_epsg(mut self, epsg: i32) -> Self {
        self.default_epsg = epsg;
        self
    }

    pub fn with_switch_axis_epsg<S: Into<String>>(mut self, ranges: S) -> Self {
        self.switch_axis_epsg = ranges.into();
        self
    }

    pub fn with_refresh_interval(mut self, every: Option<Duration>) -> Self {
        self.refresh_interval = every;
        self
    }

    pub fn with_task_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.task_timeout = timeout;
        self
    }

    pub fn with_persist_on_update(mut self, on: bool) -> Self {
        self.persist_on_update = on;
        self
    }

    pub fn with_compress(mut self, on: bool) -> Self {
        self.compress = on;
        self
    }

    pub fn build(self) -> Self {
        self
    }

    /// Effective pool size; non-positive settings fall back to 1.
    pub fn effective_pool_size(&self) -> usize {
        if self.pool_size < 1 {
            log::warn!(
                "configured rebuild pool size {} is not positive, using 1",
                self.pool_size
            );
            1
        } else {
            self.pool_size as usize
        }
    }

    pub fn switched_axes(&self) -> CacheResult<SwitchedAxes> {
        SwitchedAxes::parse(&self.switch_axis_epsg)
            .map_err(|e| CacheError::configuration(format!("SOS_CACHE_SWITCH_AXIS_EPSG: {:#}", e)))
    }

    /// Reject settings that cannot work. A non-positive pool size is not an error (clamped).
    pub fn validate(&self) -> CacheResult<()> {
        if self.cache_file.as_os_str().is_empty() {
            return Err(CacheError::configuration("cache file path is empty"));
        }
        if self.cache_file.is_dir() {
            return Err(CacheError::configuration(format!(
                "cache file {} is a directory",
                self.cache_file.display()
            )));
        }
        if self.default_epsg <= 0 {
            return Err(CacheError::configuration(format!(
                "default EPSG code must be positive, got {}",
                self.default_epsg
            )));
        }
        if matches!(self.refresh_interval, Some(d) if d.is_zero()) {
            return Err(CacheError::configuration("refresh interval must not be zero"));
        }
        if matches!(self.task_timeout, Some(d) if d.is_zero()) {
            return Err(CacheError::configuration("task timeout must not be zero"));
        }
        self.switched_axes().map(|_| ())
    }
}

impl fmt::Display for CacheConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "CacheConfig {{ \
             cache_file: {}, \
             pool_size: {}, \
             default_epsg: {}, \
             refresh_interval: {}, \
             task_timeout: {}, \
             persist_on_update: {}, \
             compress: {} \
             }}",
            self.cache_file.display(),
            self.pool_size,
            self.default_epsg,
            self.refresh_interval
                .map(|d| format!("{:?}", d))
                .unwrap_or_else(|| "disabled".to_string()),
            self.task_timeout
                .map(|d| format!("{}ms", d.as_millis()))
                .unwrap_or_else(|| "none".to_string()),
            self.persist_on_update,
            self.compress,
        )
    }
}

/// Builder that wires a configuration and a datasource into a running controller.
pub struct CacheBuilder {
    cfg: CacheConfig,
    datasource: Option<Arc<dyn Datasource>>,
}

impl CacheBuilder {
    pub fn new() -> Self {
        Self {
            cfg: CacheConfig::default(),
            datasource: None,
        }
    }

    pub fn from_env() -> Self {
        Self {
            cfg: CacheConfig::from_env(),
            datasource: None,
        }
    }

    pub fn config(mut self, cfg: CacheConfig) -> Self {
        self.cfg = cfg;
        self
    }

    pub fn datasource(mut self, ds: Arc<dyn Datasource>) -> Self {
        self.datasource = Some(ds);
        self
    }

    pub fn cache_file<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.cfg = self.cfg.with_cache_file(path);
        self
    }

    pub fn pool_size(mut self, n: i64) -> Self {
        self.cfg = self.cfg.with_pool_size(n);
        self
    }

    pub fn refresh_interval(mut self, every: Option<Duration>) -> Self {
        self.cfg = self.cfg.with_refresh_interval(every);
        self
    }

    pub fn task_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.cfg = self.cfg.with_task_timeout(timeout);
        self
    }

    pub fn build_config(self) -> CacheConfig {
        self.cfg
    }

    /// Start the controller (load persisted snapshot or rebuild).
    pub fn start(self) -> CacheResult<Arc<ContentCacheController>> {
        let ds = self
            .datasource
            .ok_or_else(|| CacheError::configuration("no datasource configured"))?;
        ContentCacheController::start(self.cfg, ds)
    }
}

impl Default for CacheBuilder {
    fn default() -> Self {
        Self::new()
    }
}
