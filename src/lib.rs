//! # gptoss-bench
//!
//! Benchmark run coordinator for a locally served model. A single run checks
//! server health, gates on GPQA accuracy, drives a throughput/latency load test,
//! normalizes the results against reference baselines, and optionally submits
//! them to a leaderboard. A sweep repeats the single run over a fixed list of
//! concurrency levels.

pub mod accuracy;
pub mod baseline;
pub mod config;
pub mod error;
pub mod health;
pub mod http;
pub mod load;
pub mod logging;
pub mod normalize;
pub mod pipeline;
pub mod process;
pub mod publish;
pub mod stages;
pub mod sweep;

#[cfg(test)]
pub(crate) mod test_support;

pub use baseline::{Baseline, BaselineTable};
pub use config::BenchConfig;
pub use error::BenchError;
pub use pipeline::{Pipeline, RunReport, Services};
pub use sweep::{SweepCoordinator, SweepSummary};

use serde::Serialize;

/// Steps of a single-configuration run, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Health,
    Accuracy,
    AccuracyGate,
    Load,
    Normalize,
    Publish,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Stage::Health => write!(f, "health"),
            Stage::Accuracy => write!(f, "accuracy"),
            Stage::AccuracyGate => write!(f, "accuracy_gate"),
            Stage::Load => write!(f, "load"),
            Stage::Normalize => write!(f, "normalize"),
            Stage::Publish => write!(f, "publish"),
        }
    }
}

/// What a run executes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mode {
    /// Health, accuracy, and the gate
    Accuracy,
    /// Accuracy plus load test and normalization
    Performance,
    /// Performance plus leaderboard submission
    Submit { team: String },
}

impl Mode {
    pub fn includes_load(&self) -> bool {
        !matches!(self, Mode::Accuracy)
    }

    pub fn team(&self) -> Option<&str> {
        match self {
            Mode::Submit { team } => Some(team.as_str()),
            _ => None,
        }
    }

    /// Command-line arguments selecting this mode.
    pub fn to_args(&self) -> Vec<String> {
        match self {
            Mode::Accuracy => vec!["acc".to_string()],
            Mode::Performance => vec!["perf".to_string()],
            Mode::Submit { team } => vec!["submit".to_string(), team.clone()],
        }
    }
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Mode::Accuracy => write!(f, "acc"),
            Mode::Performance => write!(f, "perf"),
            Mode::Submit { team } => write!(f, "submit({})", team),
        }
    }
}
