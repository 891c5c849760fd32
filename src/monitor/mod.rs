//! Change detection for streaming monitors
//!
//! A snapshot is the last extracted record of a streaming job. Each poll cycle
//! diffs the new record against it field by field:
//!
//! - keys are compared over the union of both snapshots
//! - a key present on only one side counts as changed
//! - values are compared with exact JSON equality
//!
//! `fraction = changed / |union|`, and `0.0` when both snapshots are empty.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeSet;

/// Outcome of diffing two snapshots
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeReport {
    /// Changed fields over the key union
    pub fraction: f64,
    /// Names of changed fields, sorted
    pub changed_fields: Vec<String>,
    /// Size of the key union
    pub total_fields: usize,
}

impl ChangeReport {
    /// Whether the change fraction reaches `threshold`
    pub fn exceeds(&self, threshold: f64) -> bool {
        self.total_fields > 0 && self.fraction >= threshold
    }
}

/// Field-level snapshot diffing
#[derive(Debug, Clone, Copy, Default)]
pub struct ChangeDetector;

impl ChangeDetector {
    /// Fraction of fields that differ between two snapshots
    pub fn diff(prev: &Value, curr: &Value) -> f64 {
        Self::report(prev, curr).fraction
    }

    /// Full diff report between two snapshots
    pub fn report(prev: &Value, curr: &Value) -> ChangeReport {
        let prev = as_fields(prev);
        let curr = as_fields(curr);

        let keys: BTreeSet<&String> = prev.keys().chain(curr.keys()).collect();
        let changed_fields: Vec<String> = keys
            .iter()
            .filter(|k| prev.get(k.as_str()) != curr.get(k.as_str()))
            .map(|k| (*k).clone())
            .collect();

        let total_fields = keys.len();
        let fraction = if total_fields == 0 {
            0.0
        } else {
            changed_fields.len() as f64 / total_fields as f64
        };

        ChangeReport {
            fraction,
            changed_fields,
            total_fields,
        }
    }
}

/// View a snapshot as a field map; scalars become a single `value` field
fn as_fields(value: &Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map.clone(),
        Value::Null => Map::new(),
        other => {
            let mut map = Map::new();
            map.insert(String::from("value"), other.clone());
            map
        }
    }
}

/// Last observed record of a streaming job
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StreamSnapshot {
    record: Value,
    cycle: u32,
}

impl StreamSnapshot {
    /// Empty snapshot; the first diff marks every field as changed
    pub fn empty() -> Self {
        Self {
            record: Value::Object(Map::new()),
            cycle: 0,
        }
    }

    /// Diff `record` against this snapshot, then replace it
    pub fn observe(&mut self, record: Value) -> ChangeReport {
        let report = ChangeDetector::report(&self.record, &record);
        self.record = record;
        self.cycle += 1;
        report
    }

    pub fn record(&self) -> &Value {
        &self.record
    }

    /// Number of observations so far
    pub fn cycle(&self) -> u32 {
        self.cycle
    }
}
