//! Phenomenon/result time values.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Time of an observation as delivered by the request decoders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Time {
    Instant { at: DateTime<Utc> },
    Period { start: DateTime<Utc>, end: DateTime<Utc> },
}

impl Time {
    pub fn instant(at: DateTime<Utc>) -> Self {
        Time::Instant { at }
    }

    pub fn period(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Time::Period { start, end }
    }
}

/// Closed time interval; an instant is a degenerate period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimePeriod {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimePeriod {
    pub fn new(a: DateTime<Utc>, b: DateTime<Utc>) -> Self {
        if a <= b {
            Self { start: a, end: b }
        } else {
            Self { start: b, end: a }
        }
    }

    pub fn instant(at: DateTime<Utc>) -> Self {
        Self { start: at, end: at }
    }

    pub fn expand_to_include(&mut self, other: &TimePeriod) {
        if other.start < self.start {
            self.start = other.start;
        }
        if other.end > self.end {
            self.end = other.end;
        }
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.start <= at && at <= self.end
    }
}

impl From<Time> for TimePeriod {
    fn from(t: Time) -> Self {
        match t {
            Time::Instant { at } => TimePeriod::instant(at),
            Time::Period { start, end } => TimePeriod::new(start, end),
        }
    }
}

impl fmt::Display for TimePeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.start.to_rfc3339(), self.end.to_rfc3339())
    }
}

/// Min/max fold over a sequence of periods.
pub fn fold_periods<I>(periods: I) -> Option<TimePeriod>
where
    I: IntoIterator<Item = TimePeriod>,
{
    periods.into_iter().fold(None, |acc, p| match acc {
        Some(mut a) => {
            a.expand_to_include(&p);
            Some(a)
        }
        None => Some(p),
    })
}
