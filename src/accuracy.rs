//! GPQA accuracy stage and the validation gate in front of the load test.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::{BenchConfig, GateConfig};
use crate::error::{tail, BenchError};
use crate::process::{CommandLine, CommandRunner};

const METRIC_KEY: &str = "gpqa_metric";
const OUTPUT_TAIL_LINES: usize = 40;
/// Gate thresholds are compared at this many decimal places.
const GATE_SCALE: f64 = 1e9;

/// Correctness score in [0, 1] reported by the evaluator.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AccuracyMetric {
    pub gpqa_metric: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GateStatus {
    Passed,
    Failed,
}

/// Result of comparing a score against `baseline - tolerance`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GateVerdict {
    pub status: GateStatus,
    pub metric: f64,
    pub baseline: f64,
    pub tolerance: f64,
    pub min_accepted: f64,
}

impl GateVerdict {
    pub fn passed(&self) -> bool {
        self.status == GateStatus::Passed
    }

    pub fn into_result(self) -> Result<Self, BenchError> {
        match self.status {
            GateStatus::Passed => Ok(self),
            GateStatus::Failed => Err(BenchError::AccuracyRejected {
                metric: self.metric,
                min_accepted: self.min_accepted,
                baseline: self.baseline,
                tolerance: self.tolerance,
            }),
        }
    }
}

/// Absolute tolerance band: fails only when `metric < baseline - tolerance`.
///
/// The threshold is snapped to [`GATE_SCALE`] so a score written exactly as
/// `baseline - tolerance` (0.35 for 0.40/0.05) lands on the boundary and passes.
pub fn validate(metric: f64, gate: &GateConfig) -> GateVerdict {
    let min_accepted = ((gate.baseline_metric - gate.tolerance) * GATE_SCALE).round() / GATE_SCALE;
    let status = if metric < min_accepted {
        GateStatus::Failed
    } else {
        GateStatus::Passed
    };
    GateVerdict {
        status,
        metric,
        baseline: gate.baseline_metric,
        tolerance: gate.tolerance,
        min_accepted,
    }
}

pub fn evaluator_command(config: &BenchConfig) -> Result<CommandLine, BenchError> {
    Ok(CommandLine::from_parts(&config.tools.eval_command)?
        .flag("--base-url", config.run.base_url())
        .flag("--model", &config.run.model))
}

/// Last `gpqa_metric` value in the output.
///
/// Accepts both `gpqa_metric: 0.61` and `'gpqa_metric': 0.61`.
pub fn parse_metric(output: &str) -> Option<f64> {
    let mut found = None;
    for line in output.lines() {
        let mut rest = line;
        while let Some(pos) = rest.find(METRIC_KEY) {
            rest = &rest[pos + METRIC_KEY.len()..];
            let value = rest.trim_start_matches(|c: char| {
                c == '\'' || c == '"' || c == ':' || c == '=' || c.is_whitespace()
            });
            let end = value
                .find(|c: char| !(c.is_ascii_digit() || matches!(c, '.' | '-' | '+' | 'e' | 'E')))
                .unwrap_or(value.len());
            if let Ok(v) = value[..end].parse::<f64>() {
                found = Some(v);
            }
        }
    }
    found
}

/// Run the evaluator against the server and return its score.
pub fn run_accuracy(
    config: &BenchConfig,
    runner: &dyn CommandRunner,
) -> Result<AccuracyMetric, BenchError> {
    let command = evaluator_command(config)?;
    info!(command = %command, "Running GPQA accuracy evaluation");

    let output = runner.run(&command)?;
    let combined = output.combined();
    if !output.success() {
        return Err(BenchError::AccuracyExecution {
            command: command.to_string(),
            exit_code: output.exit_code,
            output_tail: tail(&combined, OUTPUT_TAIL_LINES),
        });
    }

    match parse_metric(&combined) {
        Some(v) if v.is_finite() && (0.0..=1.0).contains(&v) => {
            info!(gpqa_metric = v, "Accuracy evaluation complete");
            Ok(AccuracyMetric { gpqa_metric: v })
        }
        other => {
            warn!(parsed = ?other, "Evaluator output has no usable gpqa_metric");
            Err(BenchError::AccuracyParse {
                command: command.to_string(),
                output_tail: tail(&combined, OUTPUT_TAIL_LINES),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::CommandOutput;
    use crate::test_support::{bench_config, ScriptedCommands};

    #[test]
    fn test_gate_boundary_is_inclusive() {
        let gate = GateConfig::default();
        let at_boundary = 0.53;
        assert!(validate(at_boundary, &gate).passed());

        for eps in [1e-12, 1e-6, 0.01] {
            assert!(!validate(at_boundary - eps, &gate).passed(), "eps {eps}");
        }
    }

    #[test]
    fn test_gate_boundary_survives_decimal_subtraction() {
        let cases = [
            (0.40, 0.05, 0.35),
            (0.34, 0.05, 0.29),
            (0.39, 0.04, 0.35),
            (0.58, 0.05, 0.53),
            (0.70, 0.10, 0.60),
            (0.90, 0.01, 0.89),
        ];
        for (baseline_metric, tolerance, boundary) in cases {
            let gate = GateConfig { baseline_metric, tolerance };
            let verdict = validate(boundary, &gate);
            assert!(verdict.passed(), "{boundary} with {baseline_metric}/{tolerance}");
            assert_eq!(verdict.min_accepted, boundary);
            assert!(!validate(boundary - 1e-6, &gate).passed());
        }
    }

    #[test]
    fn test_gate_rejects_low_score() {
        let verdict = validate(0.50, &GateConfig::default());
        assert_eq!(verdict.status, GateStatus::Failed);
        assert!((verdict.min_accepted - 0.53).abs() < 1e-9);

        let err = verdict.into_result().unwrap_err();
        assert!(matches!(err, BenchError::AccuracyRejected { metric, .. } if metric == 0.50));
        assert!(err.to_string().contains("0.5300"));
    }

    #[test]
    fn test_parse_metric_formats() {
        assert_eq!(parse_metric("gpqa_metric: 0.6123"), Some(0.6123));
        assert_eq!(parse_metric("  'gpqa_metric': 0.5"), Some(0.5));
        assert_eq!(
            parse_metric("gpqa_metric: 0.6123\nMetrics for parsing:\n  'gpqa_metric': 0.61234567"),
            Some(0.61234567)
        );
        assert_eq!(parse_metric("{'metric': 0.7}"), None);
        assert_eq!(parse_metric("gpqa_metric: n/a"), None);
        assert_eq!(parse_metric(""), None);
    }

    #[test]
    fn test_evaluator_command() {
        let config = bench_config();
        let cmd = evaluator_command(&config).unwrap();
        assert_eq!(cmd.value_of("--base-url"), Some("http://0.0.0.0:8888"));
        assert_eq!(cmd.value_of("--model"), Some("openai/gpt-oss-120b"));
    }

    #[test]
    fn test_run_accuracy_success() {
        let runner = ScriptedCommands::new().with_eval(CommandOutput {
            exit_code: Some(0),
            stdout: "Accuracy Metrics\ngpqa_metric: 0.6021\n".into(),
            stderr: "warnings".into(),
        });
        let metric = run_accuracy(&bench_config(), &runner).unwrap();
        assert_eq!(metric.gpqa_metric, 0.6021);
    }

    #[test]
    fn test_run_accuracy_nonzero_exit() {
        let runner = ScriptedCommands::new().with_eval(CommandOutput {
            exit_code: Some(1),
            stdout: String::new(),
            stderr: "ERROR: Python module 'gpt_oss' is not installed.".into(),
        });
        let err = run_accuracy(&bench_config(), &runner).unwrap_err();
        match err {
            BenchError::AccuracyExecution { exit_code, output_tail, .. } => {
                assert_eq!(exit_code, Some(1));
                assert!(output_tail.contains("gpt_oss"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_unparseable_output_is_error_not_zero() {
        let runner = ScriptedCommands::new().with_eval(CommandOutput {
            exit_code: Some(0),
            stdout: "evaluation finished".into(),
            stderr: String::new(),
        });
        assert!(matches!(
            run_accuracy(&bench_config(), &runner),
            Err(BenchError::AccuracyParse { .. })
        ));
    }

    #[test]
    fn test_out_of_range_metric_rejected() {
        let runner = ScriptedCommands::new().with_eval(CommandOutput {
            exit_code: Some(0),
            stdout: "gpqa_metric: 61.2".into(),
            stderr: String::new(),
        });
        assert!(matches!(
            run_accuracy(&bench_config(), &runner),
            Err(BenchError::AccuracyParse { .. })
        ));
    }
}
