//! Value types shared by the snapshot, the updaters and the datastore boundary.

pub mod envelope;
pub mod time;

pub use envelope::{union_all, Envelope, Geometry, SwitchedAxes, DEFAULT_SWITCHED_EPSG};
pub use time::{fold_periods, Time, TimePeriod};
