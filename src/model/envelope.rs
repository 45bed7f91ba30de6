//! Spatial envelopes, geometries and axis-order handling.
//!
//! Internal convention: every `Envelope` stores easting/x first and northing/y second.
//! Geometries arrive in the native axis order of their SRID; for the codes listed in
//! `SwitchedAxes` (northing first, e.g. EPSG:4326) the coordinates are swapped before
//! an envelope is built from them.

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Default EPSG ranges with northing-first axis order.
pub const DEFAULT_SWITCHED_EPSG: &str = "2044-2045;2081-2083;2085-2086;2093;2096-2098;2105-2132;\
2169-2170;2176-2180;2193;2200;2206-2212;2319;2320-2462;2523-2549;2551-2735;2738-2758;2935-2941;\
2953;3006-3030;3034-3035;3058-3059;3068;3114-3118;3126-3138;3300-3301;3328-3335;3346;3350-3352;\
3366;3416;4001-4999;20004-20032;20064-20092;21413-21423;21473-21483;21896-21899;22171;\
22181-22187;22191-22197;25884;27205-27232;27391-27398;27492;28402-28432;28462-28492;\
30161-30179;30800;31251-31259;31275-31279;31281-31290;31466-31700";

/// Bounding box tagged with a spatial reference code.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
    pub srid: i32,
}

impl Envelope {
    /// Build an envelope; corners are normalized so that min <= max on both axes.
    pub fn new(x1: f64, y1: f64, x2: f64, y2: f64, srid: i32) -> Self {
        Self {
            min_x: x1.min(x2),
            min_y: y1.min(y2),
            max_x: x1.max(x2),
            max_y: y1.max(y2),
            srid,
        }
    }

    /// Degenerate envelope of a single point (x = easting, y = northing).
    pub fn point(x: f64, y: f64, srid: i32) -> Self {
        Self::new(x, y, x, y, srid)
    }

    pub fn is_finite(&self) -> bool {
        self.min_x.is_finite() && self.min_y.is_finite() && self.max_x.is_finite() && self.max_y.is_finite()
    }

    /// Grow this envelope so it covers `other`. The SRID of `self` is kept.
    pub fn expand_to_include(&mut self, other: &Envelope) {
        if self.srid != other.srid {
            log::debug!(
                "expanding envelope in EPSG:{} with envelope in EPSG:{} (no reprojection)",
                self.srid,
                other.srid
            );
        }
        self.min_x = self.min_x.min(other.min_x);
        self.min_y = self.min_y.min(other.min_y);
        self.max_x = self.max_x.max(other.max_x);
        self.max_y = self.max_y.max(other.max_y);
    }

    pub fn union(&self, other: &Envelope) -> Envelope {
        let mut e = *self;
        e.expand_to_include(other);
        e
    }

    pub fn contains(&self, other: &Envelope) -> bool {
        self.min_x <= other.min_x
            && self.min_y <= other.min_y
            && self.max_x >= other.max_x
            && self.max_y >= other.max_y
    }

    pub fn contains_point(&self, x: f64, y: f64) -> bool {
        self.min_x <= x && x <= self.max_x && self.min_y <= y && y <= self.max_y
    }
}

impl fmt::Display for Envelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "EPSG:{} [{} {}, {} {}]",
            self.srid, self.min_x, self.min_y, self.max_x, self.max_y
        )
    }
}

/// Union of an arbitrary number of envelopes. `None` when the iterator is empty.
pub fn union_all<'a, I>(envelopes: I) -> Option<Envelope>
where
    I: IntoIterator<Item = &'a Envelope>,
{
    let mut acc: Option<Envelope> = None;
    for e in envelopes {
        match acc.as_mut() {
            Some(a) => a.expand_to_include(e),
            None => acc = Some(*e),
        }
    }
    acc
}

/// Set of EPSG codes whose native axis order is northing first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwitchedAxes {
    ranges: Vec<(i32, i32)>,
}

impl Default for SwitchedAxes {
    fn default() -> Self {
        // the constant is known-good
        Self::parse(DEFAULT_SWITCHED_EPSG).unwrap_or(Self { ranges: Vec::new() })
    }
}

impl SwitchedAxes {
    pub fn none() -> Self {
        Self { ranges: Vec::new() }
    }

    /// Parse `"a-b;c;d-e"`. Whitespace and empty entries are ignored.
    pub fn parse(s: &str) -> Result<Self> {
        let mut ranges = Vec::new();
        for entry in s.split(';') {
            let entry = entry.trim();
            if entry.is_empty() {
                continue;
            }
            let (lo, hi) = match entry.split_once('-') {
                Some((a, b)) => (parse_code(a, entry)?, parse_code(b, entry)?),
                None => {
                    let c = parse_code(entry, entry)?;
                    (c, c)
                }
            };
            if lo > hi {
                return Err(anyhow!("invalid EPSG range '{}': lower bound above upper bound", entry));
            }
            ranges.push((lo, hi));
        }
        ranges.sort_unstable();
        Ok(Self { ranges })
    }

    pub fn requires_switch(&self, srid: i32) -> bool {
        self.ranges.iter().any(|&(lo, hi)| lo <= srid && srid <= hi)
    }

    pub fn ranges(&self) -> &[(i32, i32)] {
        &self.ranges
    }
}

fn parse_code(s: &str, entry: &str) -> Result<i32> {
    s.trim()
        .parse::<i32>()
        .map_err(|_| anyhow!("invalid EPSG code in entry '{}'", entry))
}

/// Feature geometry as delivered by request decoders or the datastore:
/// SRID plus coordinates in the SRID's native axis order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Geometry {
    pub srid: i32,
    pub coordinates: Vec<[f64; 2]>,
}

impl Geometry {
    pub fn point(a: f64, b: f64, srid: i32) -> Self {
        Self {
            srid,
            coordinates: vec![[a, b]],
        }
    }

    /// Envelope in easting/northing order; `None` for an empty geometry.
    pub fn envelope(&self, axes: &SwitchedAxes) -> Option<Envelope> {
        let switch = axes.requires_switch(self.srid);
        let mut acc: Option<Envelope> = None;
        for c in &self.coordinates {
            let (x, y) = if switch { (c[1], c[0]) } else { (c[0], c[1]) };
            let p = Envelope::point(x, y, self.srid);
            match acc.as_mut() {
                Some(a) => a.expand_to_include(&p),
                None => acc = Some(p),
            }
        }
        acc
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_ranges_cover_wgs84() {
        let axes = SwitchedAxes::default();
        assert!(axes.requires_switch(4326));
        assert!(axes.requires_switch(31466));
        assert!(!axes.requires_switch(3857));
        assert!(!axes.requires_switch(900913));
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!(SwitchedAxes::parse("12-x").is_err());
        assert!(SwitchedAxes::parse("20-10").is_err());
        let a = SwitchedAxes::parse(" 1-3 ; ;7").unwrap();
        assert_eq!(a.ranges(), &[(1, 3), (7, 7)]);
    }

    #[test]
    fn geometry_envelope_switches_northing_first() {
        let axes = SwitchedAxes::default();
        let g = Geometry::point(52.0, 7.5, 4326);
        assert_eq!(g.envelope(&axes), Some(Envelope::point(7.5, 52.0, 4326)));

        let g = Geometry::point(400000.0, 5700000.0, 25832);
        assert_eq!(g.envelope(&axes), Some(Envelope::point(400000.0, 5700000.0, 25832)));
    }

    #[test]
    fn union_contains_both() {
        let a = Envelope::new(0.0, 0.0, 1.0, 1.0, 4326);
        let b = Envelope::point(5.0, -2.0, 4326);
        let u = a.union(&b);
        assert!(u.contains(&a));
        assert!(u.contains(&b));
        assert_eq!(union_all([a, b].iter()), Some(u));
        assert_eq!(union_all(std::iter::empty()), None);
    }
}
