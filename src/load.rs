//! Throughput/latency load test driven through the external load generator.

use std::path::PathBuf;

use tracing::info;

use crate::config::BenchConfig;
use crate::error::BenchError;
use crate::process::{CommandLine, CommandRunner};

/// Latency families tracked at each percentile.
pub const PERCENTILE_METRICS: &str = "ttft,tpot,itl,e2el";
pub const METRIC_PERCENTILES: &str = "99";

/// Full load-generator invocation for one configuration.
///
/// Requests are fired as fast as `--max-concurrency` allows and EOS is ignored, so
/// every request produces exactly `output_len` tokens.
pub fn load_command(config: &BenchConfig) -> Result<CommandLine, BenchError> {
    let run = &config.run;
    let mut command = CommandLine::from_parts(&config.tools.load_command)?
        .flag("--backend", "vllm")
        .flag("--base-url", run.base_url())
        .flag("--model", &run.model)
        .flag("--dataset-name", "random")
        .flag("--random-input-len", run.input_len)
        .flag("--random-output-len", run.output_len)
        .flag("--random-range-ratio", run.random_range_ratio)
        .flag("--num-prompts", run.num_prompts)
        .flag("--max-concurrency", run.concurrency)
        .flag("--request-rate", "inf")
        .arg("--ignore-eos")
        .flag("--percentile-metrics", PERCENTILE_METRICS)
        .flag("--metric-percentiles", METRIC_PERCENTILES)
        .arg("--save-result")
        .flag("--result-dir", config.tools.result_dir.display())
        .flag("--result-filename", format!("{}.json", run.result_filename));
    command.capture = false;
    Ok(command)
}

/// Run the load test and return the path of the document it was told to write.
pub fn run_load(config: &BenchConfig, runner: &dyn CommandRunner) -> Result<PathBuf, BenchError> {
    std::fs::create_dir_all(&config.tools.result_dir)?;
    let command = load_command(config)?;
    let path = config.result_path();
    info!(
        concurrency = config.run.concurrency,
        num_prompts = config.run.num_prompts,
        result = %path.display(),
        "Running load test"
    );

    let output = runner.run(&command)?;
    if !output.success() {
        return Err(BenchError::LoadExecution {
            command: command.to_string(),
            exit_code: output.exit_code,
        });
    }

    Ok(path)
}
