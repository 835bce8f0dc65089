use crate::config::TrialConfig;
use crate::error::TrialResult;
use crate::monitor::PairKey;
use crate::scenario::ScenarioSpec;
use crate::trial::TrialOutcome;
use csv::Writer;
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use tracing::info;

// Per-pair minimum separation over one trial, +infinity for pairs never
// observed together
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MinDistances(BTreeMap<PairKey, f64>);

impl MinDistances {
    pub fn new(inner: BTreeMap<PairKey, f64>) -> Self {
        Self(inner)
    }

    pub fn get(&self, key: PairKey) -> Option<f64> {
        self.0.get(&key).copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (PairKey, f64)> + '_ {
        self.0.iter().map(|(k, v)| (*k, *v))
    }

    pub fn values(&self) -> impl Iterator<Item = f64> + '_ {
        self.0.values().copied()
    }

    pub fn overall(&self) -> f64 {
        self.values().fold(f64::INFINITY, f64::min)
    }

    pub fn collisions(&self) -> Vec<PairKey> {
        self.iter().filter(|(_, d)| *d == 0.0).map(|(k, _)| k).collect()
    }
}

impl Serialize for MinDistances {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (key, d) in &self.0 {
            map.serialize_entry(&key.to_string(), &json_number(*d))?;
        }
        map.end()
    }
}

#[derive(Debug, Serialize)]
struct Communication {
    mode: &'static str,
    param: serde_json::Value,
}

fn json_number(value: f64) -> serde_json::Value {
    if value.is_finite() { serde_json::json!(value) } else { serde_json::json!("inf") }
}

// Writes min_distances.json, communication.json and scenario.json
// into dir, creating it if needed
pub fn save_trial(dir: impl AsRef<Path>, scenario: &ScenarioSpec, config: &TrialConfig, outcome: &TrialOutcome) -> TrialResult<PathBuf> {
    let dir = dir.as_ref();
    fs::create_dir_all(dir)?;

    fs::write(dir.join("min_distances.json"), serde_json::to_string_pretty(&outcome.min_distances)?)?;

    let communication = Communication {
        mode: config.fault.tag(),
        param: config.fault.params().first().map_or(serde_json::Value::Null, |p| json_number(*p)),
    };
    fs::write(dir.join("communication.json"), serde_json::to_string_pretty(&communication)?)?;
    fs::write(dir.join("scenario.json"), serde_json::to_string_pretty(scenario)?)?;

    info!("Trial results saved to: {}", dir.display());
    Ok(dir.to_path_buf())
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SweepRow {
    pub scenario: String,
    pub mode: String,
    pub param: f64,
    pub dist: f64,
    pub diff: f64,
}

pub struct SweepLogger {
    writer: Writer<File>,
}

impl SweepLogger {
    pub fn new(path: impl AsRef<Path>) -> TrialResult<Self> {
        let writer = Writer::from_path(path)?;
        Ok(Self { writer })
    }

    pub fn log(&mut self, row: &SweepRow) -> TrialResult<()> {
        self.writer.serialize(row)?;
        self.writer.flush()?;
        Ok(())
    }

    pub fn log_batch(&mut self, rows: &[SweepRow]) -> TrialResult<()> {
        for row in rows {
            self.writer.serialize(row)?;
        }
        self.writer.flush()?;
        Ok(())
    }
}
