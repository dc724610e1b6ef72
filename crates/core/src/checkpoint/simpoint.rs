use std::collections::BTreeMap;
use std::path::Path;

use crate::{SimResult, SimulationError};

pub const SIMPOINTS_FILE: &str = "simpoints0";
pub const WEIGHTS_FILE: &str = "weights0";

/// Instructions executed before the first interval is measured.
pub const WARMUP_INSTRUCTIONS: u64 = 100_000;

/// A representative interval: `location` is counted in intervals, not instructions.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimPoint {
    pub location: u64,
    pub weight: f64,
    pub id: u64,
}

impl SimPoint {
    /// Instruction count at which this point's checkpoint must be taken, or `None` if
    /// it lies beyond the representable range.
    pub fn trigger(&self, interval: u64) -> Option<u64> {
        self.location
            .checked_mul(interval)?
            .checked_add(WARMUP_INSTRUCTIONS)
    }
}

/// SimPoints ordered by location, drained earliest first.
#[derive(Debug, Clone, Default)]
pub struct SimPointManifest {
    points: BTreeMap<u64, SimPoint>,
}

impl SimPointManifest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_points(points: impl IntoIterator<Item = SimPoint>) -> Self {
        let mut manifest = Self::new();
        for point in points {
            manifest.insert(point);
        }
        manifest
    }

    /// A later point at an already known location replaces the earlier one.
    pub fn insert(&mut self, point: SimPoint) {
        if let Some(old) = self.points.insert(point.location, point) {
            tracing::warn!(
                "Simpoint {} replaces simpoint {} at location {}",
                point.id,
                old.id,
                point.location
            );
        }
    }

    /// Reads `simpoints0` and `weights0` from `dir`.
    pub fn load(dir: &Path) -> SimResult<Self> {
        let read = |name: &str| {
            let path = dir.join(name);
            std::fs::read_to_string(&path).map_err(|source| SimulationError::Io { path, source })
        };
        let simpoints = read(SIMPOINTS_FILE)?;
        let weights = read(WEIGHTS_FILE)?;
        Self::parse(&simpoints, &weights)
    }

    /// Parses the two parallel files: `location id` per line in one, `weight id` per line
    /// in the other. Ids must agree line by line.
    pub fn parse(simpoints: &str, weights: &str) -> SimResult<Self> {
        let mut manifest = Self::new();
        let mut weight_lines = non_blank(weights);

        for (line_no, line) in non_blank(simpoints) {
            let (location, id) = parse_pair::<u64>(line, SIMPOINTS_FILE, line_no)?;

            let Some((weight_line_no, weight_line)) = weight_lines.next() else {
                return Err(SimulationError::Manifest(format!(
                    "{} ends before simpoint {} ({}:{})",
                    WEIGHTS_FILE, id, SIMPOINTS_FILE, line_no
                )));
            };
            let (weight, weight_id) = parse_pair::<f64>(weight_line, WEIGHTS_FILE, weight_line_no)?;

            if weight_id != id {
                return Err(SimulationError::Manifest(format!(
                    "weight id {} ({}:{}) does not match simpoint id {} ({}:{})",
                    weight_id, WEIGHTS_FILE, weight_line_no, id, SIMPOINTS_FILE, line_no
                )));
            }

            tracing::info!("Simpoint {}: @ {}, weight: {}", id, location, weight);
            manifest.insert(SimPoint {
                location,
                weight,
                id,
            });
        }

        Ok(manifest)
    }

    pub fn earliest(&self) -> Option<&SimPoint> {
        self.points.values().next()
    }

    pub fn pop_earliest(&mut self) -> Option<SimPoint> {
        self.points.pop_first().map(|(_, point)| point)
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &SimPoint> {
        self.points.values()
    }

    /// `(point, instruction count)` for every pending point, in trigger order.
    pub fn trigger_points(&self, interval: u64) -> Vec<(SimPoint, Option<u64>)> {
        self.iter().map(|p| (*p, p.trigger(interval))).collect()
    }
}

fn non_blank(text: &str) -> impl Iterator<Item = (usize, &str)> {
    text.lines()
        .enumerate()
        .map(|(i, line)| (i + 1, line.trim()))
        .filter(|(_, line)| !line.is_empty())
}

fn parse_pair<T: std::str::FromStr>(line: &str, file: &str, line_no: usize) -> SimResult<(T, u64)> {
    let malformed = || {
        SimulationError::Manifest(format!("{}:{}: malformed line {:?}", file, line_no, line))
    };
    let mut fields = line.split_whitespace();
    let value = fields
        .next()
        .and_then(|f| f.parse::<T>().ok())
        .ok_or_else(malformed)?;
    let id = fields
        .next()
        .and_then(|f| f.parse::<u64>().ok())
        .ok_or_else(malformed)?;
    if fields.next().is_some() {
        return Err(malformed());
    }
    Ok((value, id))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_orders_by_location() {
        let simpoints = "9 1\n5 0\n";
        let weights = "0.8 1\n0.2 0\n";
        let mut manifest = SimPointManifest::parse(simpoints, weights).unwrap();

        assert_eq!(manifest.len(), 2);
        let first = manifest.pop_earliest().unwrap();
        assert_eq!((first.location, first.id), (5, 0));
        assert_eq!(first.weight, 0.2);
        let second = manifest.pop_earliest().unwrap();
        assert_eq!((second.location, second.id), (9, 1));
        assert!(manifest.is_empty());
        assert!(manifest.pop_earliest().is_none());
    }

    #[test]
    fn test_mismatched_ids_rejected() {
        let err = SimPointManifest::parse("5 0\n9 1\n", "0.2 0\n0.8 7\n").unwrap_err();
        assert!(matches!(err, SimulationError::Manifest(_)));
        assert!(err.to_string().contains("does not match"));
    }

    #[test]
    fn test_missing_weight_rejected() {
        let err = SimPointManifest::parse("5 0\n9 1\n", "0.2 0\n").unwrap_err();
        assert!(err.to_string().contains("ends before simpoint 1"));
    }

    #[test]
    fn test_malformed_line_rejected() {
        let err = SimPointManifest::parse("five 0\n", "0.2 0\n").unwrap_err();
        assert!(err.to_string().contains("simpoints0:1"));

        let err = SimPointManifest::parse("5 0 3\n", "0.2 0\n").unwrap_err();
        assert!(err.to_string().contains("malformed"));
    }

    #[test]
    fn test_blank_lines_skipped() {
        let manifest = SimPointManifest::parse("\n5 0\n\n", "0.2 0\n\n").unwrap();
        assert_eq!(manifest.len(), 1);
    }

    #[test]
    fn test_duplicate_location_keeps_later() {
        let manifest = SimPointManifest::parse("5 0\n5 1\n", "0.2 0\n0.8 1\n").unwrap();
        assert_eq!(manifest.len(), 1);
        assert_eq!(manifest.earliest().unwrap().id, 1);
    }

    #[test]
    fn test_trigger_points() {
        let manifest = SimPointManifest::from_points([
            SimPoint {
                location: 9,
                weight: 0.8,
                id: 1,
            },
            SimPoint {
                location: 5,
                weight: 0.2,
                id: 0,
            },
        ]);
        let triggers: Vec<_> = manifest
            .trigger_points(1000)
            .into_iter()
            .map(|(_, at)| at)
            .collect();
        assert_eq!(triggers, vec![Some(105_000), Some(109_000)]);
    }

    #[test]
    fn test_trigger_overflow() {
        let point = SimPoint {
            location: u64::MAX,
            weight: 1.0,
            id: 0,
        };
        assert_eq!(point.trigger(2), None);
    }

    #[test]
    fn test_load_missing_file() {
        let dir = std::env::temp_dir().join("cptsim-no-such-simpoint-dir");
        let err = SimPointManifest::load(&dir).unwrap_err();
        assert!(matches!(err, SimulationError::Io { .. }));
    }
}
