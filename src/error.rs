use std::path::PathBuf;

use thiserror::Error;

use crate::Stage;

#[derive(Error, Debug)]
pub enum BenchError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Server at {url} not healthy after {attempts} attempts")]
    Unhealthy { url: String, attempts: u32 },

    #[error("Accuracy evaluator failed (exit code {exit_code:?}): {command}\n{output_tail}")]
    AccuracyExecution {
        command: String,
        exit_code: Option<i32>,
        output_tail: String,
    },

    #[error("No gpqa_metric found in evaluator output: {command}\n{output_tail}")]
    AccuracyParse { command: String, output_tail: String },

    #[error(
        "Accuracy gate failed: gpqa_metric {metric:.4} < min accepted {min_accepted:.4} \
         (baseline {baseline:.4} - tolerance {tolerance:.4})"
    )]
    AccuracyRejected {
        metric: f64,
        min_accepted: f64,
        baseline: f64,
        tolerance: f64,
    },

    #[error("Load generator failed (exit code {exit_code:?}): {command}")]
    LoadExecution {
        command: String,
        exit_code: Option<i32>,
    },

    #[error("Normalization error for {}: {reason}", .path.display())]
    Normalization { path: PathBuf, reason: String },

    #[error("Publish error: {0}")]
    Publish(String),

    #[error("Failed to launch {command}: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl BenchError {
    /// Pipeline stage the error belongs to, if any.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            BenchError::Unhealthy { .. } => Some(Stage::Health),
            BenchError::AccuracyExecution { .. } | BenchError::AccuracyParse { .. } => {
                Some(Stage::Accuracy)
            }
            BenchError::AccuracyRejected { .. } => Some(Stage::AccuracyGate),
            BenchError::LoadExecution { .. } => Some(Stage::Load),
            BenchError::Normalization { .. } => Some(Stage::Normalize),
            BenchError::Publish(_) => Some(Stage::Publish),
            BenchError::Config(_)
            | BenchError::Spawn { .. }
            | BenchError::Io(_)
            | BenchError::Serialization(_) => None,
        }
    }
}

/// Last `max_lines` lines of captured output, for error context.
pub(crate) fn tail(output: &str, max_lines: usize) -> String {
    let lines: Vec<&str> = output.lines().collect();
    let start = lines.len().saturating_sub(max_lines);
    lines[start..].join("\n")
}
