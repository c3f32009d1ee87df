//! Reference performance profiles keyed by (ISL, OSL, CONC).

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::BenchError;

const BUILTIN_BASELINES: &str = include_str!("baselines.json");

/// Reference metrics for one (ISL, OSL, CONC) triple.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Baseline {
    /// Median end-to-end request latency in milliseconds
    pub median_e2el_ms: f64,
    /// Median tokens per second per concurrent user
    pub median_intvty: f64,
    /// Total token throughput per accelerator
    pub tput_per_gpu: f64,
}

/// ISL → OSL → CONC → baseline, all keys in decimal string form.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BaselineTable {
    entries: BTreeMap<String, BTreeMap<String, BTreeMap<String, Baseline>>>,
}

impl BaselineTable {
    /// Table compiled into the binary.
    pub fn builtin() -> Result<Self, BenchError> {
        Ok(serde_json::from_str(BUILTIN_BASELINES)?)
    }

    pub fn from_json_file(path: &Path) -> Result<Self, BenchError> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            BenchError::Config(format!("cannot read baseline file {}: {e}", path.display()))
        })?;
        serde_json::from_str(&raw).map_err(|e| {
            BenchError::Config(format!("invalid baseline file {}: {e}", path.display()))
        })
    }

    /// File table when a path is given, built-in table otherwise.
    pub fn load(path: Option<&Path>) -> Result<Self, BenchError> {
        match path {
            Some(path) => Self::from_json_file(path),
            None => Self::builtin(),
        }
    }

    pub fn lookup(&self, input_len: u32, output_len: u32, concurrency: u32) -> Option<&Baseline> {
        self.entries
            .get(&input_len.to_string())?
            .get(&output_len.to_string())?
            .get(&concurrency.to_string())
    }

    pub fn insert(&mut self, input_len: u32, output_len: u32, concurrency: u32, baseline: Baseline) {
        self.entries
            .entry(input_len.to_string())
            .or_default()
            .entry(output_len.to_string())
            .or_default()
            .insert(concurrency.to_string(), baseline);
    }

    pub fn len(&self) -> usize {
        self.entries
            .values()
            .flat_map(|by_osl| by_osl.values())
            .map(|by_conc| by_conc.len())
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
