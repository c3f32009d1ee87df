//! Canonical result record: allow-listed load metrics, derived per-accelerator
//! figures, baseline comparison, and the accuracy verdict.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::accuracy::{validate, AccuracyMetric, GateStatus};
use crate::baseline::{Baseline, BaselineTable};
use crate::config::BenchConfig;
use crate::error::BenchError;

/// Accelerators in the deployment topology.
pub const ACCELERATOR_COUNT: u32 = 8;

/// Fields kept from the load generator's document. Anything else is dropped.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawLoadMetrics {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub num_prompts: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_concurrency: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_input_tokens: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_output_tokens: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_throughput: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_throughput: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_token_throughput: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mean_ttft_ms: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub median_ttft_ms: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub std_ttft_ms: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub p99_ttft_ms: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mean_tpot_ms: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub median_tpot_ms: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub std_tpot_ms: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub p99_tpot_ms: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mean_itl_ms: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub median_itl_ms: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub std_itl_ms: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub p99_itl_ms: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mean_e2el_ms: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub median_e2el_ms: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub std_e2el_ms: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub p99_e2el_ms: Option<f64>,
}

/// Parameters the result was produced with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkArgs {
    pub model: String,
    pub tensor_parallel: u32,
    pub isl: u32,
    pub osl: u32,
    pub concurrency: u32,
    pub num_prompts: u32,
    pub random_range_ratio: f64,
    pub max_model_len: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccuracyBaselines {
    pub gpqa_metric: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccuracyValidation {
    pub status: GateStatus,
    pub baselines: AccuracyBaselines,
    pub tolerance: f64,
    pub min_accepted: f64,
}

/// The record written to the result file and published to the leaderboard.
///
/// Baseline and ratios serialize as `null` when no baseline matches, so a
/// missing reference never reads as a zero ratio.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalResult {
    #[serde(flatten)]
    pub metrics: RawLoadMetrics,
    pub benchmark_args: BenchmarkArgs,
    pub tput_per_gpu: f64,
    pub interactivity: f64,
    pub baseline_nv1126: Option<Baseline>,
    /// Higher is better
    pub tput_ratio_vs_baseline: Option<f64>,
    /// Lower is better
    pub e2el_ratio_vs_baseline: Option<f64>,
    /// Higher is better
    pub intvty_ratio_vs_baseline: Option<f64>,
    pub accuracy: AccuracyMetric,
    pub accuracy_validation: AccuracyValidation,
}

impl CanonicalResult {
    pub fn median_e2el_ms(&self) -> f64 {
        self.metrics.median_e2el_ms.unwrap_or(0.0)
    }
}

/// `1000 / median TPOT`, or 0 when TPOT is missing or not positive.
pub fn interactivity(median_tpot_ms: Option<f64>) -> f64 {
    match median_tpot_ms {
        Some(tpot) if tpot > 0.0 => 1000.0 / tpot,
        _ => 0.0,
    }
}

fn ratio(mine: f64, baseline: f64) -> f64 {
    if baseline == 0.0 {
        0.0
    } else {
        mine / baseline
    }
}

/// Build the canonical record. Pure: equal inputs give equal records.
pub fn normalize(
    raw: &RawLoadMetrics,
    accuracy: AccuracyMetric,
    config: &BenchConfig,
    baselines: &BaselineTable,
) -> CanonicalResult {
    let run = &config.run;
    let tput_per_gpu = raw.total_token_throughput.unwrap_or(0.0) / f64::from(ACCELERATOR_COUNT);
    let interactivity = interactivity(raw.median_tpot_ms);
    let median_e2el = raw.median_e2el_ms.unwrap_or(0.0);

    let baseline = baselines
        .lookup(run.input_len, run.output_len, run.concurrency)
        .copied();
    let tput_ratio = baseline.map(|b| ratio(tput_per_gpu, b.tput_per_gpu));
    let e2el_ratio = baseline.map(|b| ratio(median_e2el, b.median_e2el_ms));
    let intvty_ratio = baseline.map(|b| ratio(interactivity, b.median_intvty));

    let verdict = validate(accuracy.gpqa_metric, &config.gate);

    CanonicalResult {
        metrics: raw.clone(),
        benchmark_args: BenchmarkArgs {
            model: run.model.clone(),
            tensor_parallel: run.tensor_parallel,
            isl: run.input_len,
            osl: run.output_len,
            concurrency: run.concurrency,
            num_prompts: run.num_prompts,
            random_range_ratio: run.random_range_ratio,
            max_model_len: run.max_model_len,
        },
        tput_per_gpu,
        interactivity,
        baseline_nv1126: baseline,
        tput_ratio_vs_baseline: tput_ratio,
        e2el_ratio_vs_baseline: e2el_ratio,
        intvty_ratio_vs_baseline: intvty_ratio,
        accuracy,
        accuracy_validation: AccuracyValidation {
            status: verdict.status,
            baselines: AccuracyBaselines {
                gpqa_metric: verdict.baseline,
            },
            tolerance: verdict.tolerance,
            min_accepted: verdict.min_accepted,
        },
    }
}

pub fn read_raw_metrics(path: &Path) -> Result<RawLoadMetrics, BenchError> {
    let raw = std::fs::read_to_string(path).map_err(|e| BenchError::Normalization {
        path: path.to_path_buf(),
        reason: format!("result file not readable: {e}"),
    })?;
    serde_json::from_str(&raw).map_err(|e| BenchError::Normalization {
        path: path.to_path_buf(),
        reason: format!("result file is not a metrics document: {e}"),
    })
}

/// Serialized form written to disk.
pub fn render(result: &CanonicalResult) -> Result<String, BenchError> {
    let mut text = serde_json::to_string_pretty(result)?;
    text.push('\n');
    Ok(text)
}

/// Read the load generator's document at `path`, normalize it, and overwrite it.
pub fn normalize_file(
    path: &Path,
    accuracy: AccuracyMetric,
    config: &BenchConfig,
    baselines: &BaselineTable,
) -> Result<CanonicalResult, BenchError> {
    let raw = read_raw_metrics(path)?;
    let result = normalize(&raw, accuracy, config, baselines);
    write_result(path, &result)?;
    Ok(result)
}

/// Overwrite `path` with the canonical record.
pub fn write_result(path: &Path, result: &CanonicalResult) -> Result<(), BenchError> {
    std::fs::write(path, render(result)?).map_err(|e| BenchError::Normalization {
        path: path.to_path_buf(),
        reason: format!("cannot write result file: {e}"),
    })?;
    info!(
        path = %path.display(),
        tput_per_gpu = result.tput_per_gpu,
        interactivity = result.interactivity,
        baseline = result.baseline_nv1126.is_some(),
        "Result normalized"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{bench_config, sample_load_document};

    fn raw_with(total_token_throughput: f64, median_tpot_ms: f64, median_e2el_ms: f64) -> RawLoadMetrics {
        RawLoadMetrics {
            total_token_throughput: Some(total_token_throughput),
            median_tpot_ms: Some(median_tpot_ms),
            median_e2el_ms: Some(median_e2el_ms),
            ..RawLoadMetrics::default()
        }
    }

    fn accuracy() -> AccuracyMetric {
        AccuracyMetric { gpqa_metric: 0.61 }
    }

    #[test]
    fn test_reference_scenario_ratio_is_exactly_one() {
        let config = bench_config();
        let table = BaselineTable::builtin().unwrap();
        let raw = raw_with(690.565 * 8.0, 1000.0 / 364.58, 2646.0);

        let result = normalize(&raw, accuracy(), &config, &table);

        assert_eq!(result.tput_per_gpu, 690.565);
        assert_eq!(result.tput_ratio_vs_baseline, Some(1.0));
        assert_eq!(result.e2el_ratio_vs_baseline, Some(1.0));
        let intvty = result.intvty_ratio_vs_baseline.unwrap();
        assert!((intvty - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_unmatched_triple_serializes_nulls() {
        let mut config = bench_config();
        config.run.concurrency = 12;
        let table = BaselineTable::builtin().unwrap();

        let result = normalize(&raw_with(1000.0, 5.0, 3000.0), accuracy(), &config, &table);
        let json: serde_json::Value = serde_json::to_value(&result).unwrap();

        for key in [
            "baseline_nv1126",
            "tput_ratio_vs_baseline",
            "e2el_ratio_vs_baseline",
            "intvty_ratio_vs_baseline",
        ] {
            assert!(json.get(key).unwrap().is_null(), "{key} should be null");
        }
    }

    #[test]
    fn test_unlisted_sweep_level_has_null_ratios() {
        let mut config = bench_config();
        config.run = config.run.for_sweep_level(1024, 1024, 64);
        let table = BaselineTable::builtin().unwrap();

        let result = normalize(&raw_with(5000.0, 8.0, 6000.0), accuracy(), &config, &table);

        assert!(result.baseline_nv1126.is_none());
        assert!(result.tput_ratio_vs_baseline.is_none());
        assert!(result.e2el_ratio_vs_baseline.is_none());
        assert!(result.intvty_ratio_vs_baseline.is_none());
        assert_eq!(result.tput_per_gpu, 625.0);
    }

    #[test]
    fn test_zero_denominator_gives_zero_ratio() {
        let config = bench_config();
        let mut table = BaselineTable::default();
        table.insert(
            1024,
            1024,
            8,
            Baseline {
                median_e2el_ms: 0.0,
                median_intvty: 0.0,
                tput_per_gpu: 0.0,
            },
        );

        let result = normalize(&raw_with(800.0, 4.0, 2000.0), accuracy(), &config, &table);

        assert!(result.baseline_nv1126.is_some());
        assert_eq!(result.tput_ratio_vs_baseline, Some(0.0));
        assert_eq!(result.e2el_ratio_vs_baseline, Some(0.0));
        assert_eq!(result.intvty_ratio_vs_baseline, Some(0.0));
    }

    #[test]
    fn test_interactivity_guard() {
        assert_eq!(interactivity(Some(4.0)), 250.0);
        assert_eq!(interactivity(Some(0.0)), 0.0);
        assert_eq!(interactivity(Some(-1.0)), 0.0);
        assert_eq!(interactivity(None), 0.0);
    }

    #[test]
    fn test_allow_list_drops_generator_internals() {
        let raw: RawLoadMetrics = serde_json::from_value(sample_load_document()).unwrap();
        let result = normalize(&raw, accuracy(), &bench_config(), &BaselineTable::default());
        let json = serde_json::to_value(&result).unwrap();

        assert!(json.get("median_ttft_ms").is_some());
        assert!(json.get("itls").is_none());
        assert!(json.get("generated_texts").is_none());
        assert!(json.get("date").is_none());
        assert_eq!(json["accuracy"]["gpqa_metric"], 0.61);
        assert_eq!(json["accuracy_validation"]["status"], "passed");
        assert_eq!(json["accuracy_validation"]["baselines"]["gpqa_metric"], 0.58);
        assert_eq!(json["benchmark_args"]["concurrency"], 8);
    }

    #[test]
    fn test_normalize_file_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("result.json");
        std::fs::write(&path, sample_load_document().to_string()).unwrap();
        let config = bench_config();
        let table = BaselineTable::builtin().unwrap();

        let raw = read_raw_metrics(&path).unwrap();
        let first = render(&normalize(&raw, accuracy(), &config, &table)).unwrap();
        let second = render(&normalize(&raw, accuracy(), &config, &table)).unwrap();
        assert_eq!(first, second);

        normalize_file(&path, accuracy(), &config, &table).unwrap();
        let written_once = std::fs::read_to_string(&path).unwrap();
        assert_eq!(written_once, first);

        // Re-normalizing a canonical file reproduces it byte for byte.
        normalize_file(&path, accuracy(), &config, &table).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), written_once);
    }

    #[test]
    fn test_missing_result_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = normalize_file(
            &dir.path().join("absent.json"),
            accuracy(),
            &bench_config(),
            &BaselineTable::default(),
        )
        .unwrap_err();
        assert!(matches!(err, BenchError::Normalization { .. }));
        assert!(err.to_string().contains("absent.json"));
    }
}
