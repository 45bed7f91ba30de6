//! In-memory content cache of sensor observation metadata.
//!
//! Readers take the current `Snapshot` from the `ContentCacheController`; writes are
//! mirrored by incremental `CacheUpdate`s; full rebuilds repopulate a fresh snapshot from
//! a `Datasource` on a bounded worker pool and swap it in.

// Базовые модули
pub mod config;
pub mod error;
pub mod metrics;
pub mod model;

// Снапшот кэша: read/write контракты (папка с mod.rs)
pub mod snapshot;

// Хранилище (внешний коллабор) + in-memory реализация для тестов/CLI
pub mod datasource;

// Полная пересборка: фазы по семействам сущностей + fan-out
pub mod pipeline;

// Инкрементальные обновления
pub mod update;

// Персист снапшота и lock-файл
pub mod lock;
pub mod persist;

// Контроллер: live-снапшот, lifecycle, refresh timer
pub mod controller;

pub mod cli;

// Удобные реэкспорты
pub use config::{CacheBuilder, CacheConfig};
pub use controller::{CacheState, ContentCacheController};
pub use datasource::{Datasource, DatasourceSession};
pub use error::{CacheError, CacheResult, TaskError, TaskFailure};
pub use model::{Envelope, Geometry, SwitchedAxes, Time, TimePeriod};
pub use pipeline::{run_full_rebuild, PhaseReport, RebuildReport, RebuildSettings};
pub use snapshot::{IdSet, ReadableCache, Snapshot, WritableCache};
pub use update::CacheUpdate;
