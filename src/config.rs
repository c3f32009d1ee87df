use std::fmt::Display;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::BenchError;

/// Leaderboard used when `LB_URL_OVERRIDE` is unset.
pub const DEFAULT_LEADERBOARD_URL: &str = "http://localhost:7860";

/// Parameters of one single-configuration run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    /// Model id served by the inference server
    pub model: String,
    /// Port the server listens on
    pub port: u16,
    /// Tensor-parallel degree of the deployment
    pub tensor_parallel: u32,
    /// Max concurrent in-flight requests during the load test
    pub concurrency: u32,
    /// Synthetic prompt length in tokens
    pub input_len: u32,
    /// Generated tokens per request
    pub output_len: u32,
    /// Max sequence length the server was started with
    pub max_model_len: u32,
    /// Range ratio of the random-length prompt distribution
    pub random_range_ratio: f64,
    /// Number of prompts issued by the load generator
    pub num_prompts: u32,
    /// Result file name, without the `.json` extension
    pub result_filename: String,
    /// Leaderboard base URL replacing the default
    pub leaderboard_url_override: Option<String>,
}

impl RunConfig {
    /// Base URL of the server under test.
    pub fn base_url(&self) -> String {
        format!("http://0.0.0.0:{}", self.port)
    }

    pub fn leaderboard_url(&self) -> &str {
        self.leaderboard_url_override
            .as_deref()
            .unwrap_or(DEFAULT_LEADERBOARD_URL)
    }

    /// Derive the configuration of one sweep level.
    ///
    /// The prompt count is always re-derived as `10 × concurrency` and the result
    /// name encodes the full shape, so no two levels share a result file.
    pub fn for_sweep_level(&self, input_len: u32, output_len: u32, concurrency: u32) -> RunConfig {
        RunConfig {
            concurrency,
            input_len,
            output_len,
            num_prompts: default_prompt_count(concurrency),
            result_filename: format!(
                "{}_isl{}_osl{}_conc{}",
                self.result_filename, input_len, output_len, concurrency
            ),
            ..self.clone()
        }
    }

    pub fn validate(&self) -> Result<(), BenchError> {
        if self.model.trim().is_empty() {
            return Err(BenchError::Config("MODEL must not be empty".into()));
        }
        if self.result_filename.trim().is_empty() {
            return Err(BenchError::Config("RESULT_FILENAME must not be empty".into()));
        }
        let counts = [
            ("PORT", u32::from(self.port)),
            ("TP", self.tensor_parallel),
            ("CONC", self.concurrency),
            ("ISL", self.input_len),
            ("OSL", self.output_len),
            ("MAX_MODEL_LEN", self.max_model_len),
            ("NUM_PROMPTS", self.num_prompts),
        ];
        for (name, value) in counts {
            if value == 0 {
                return Err(BenchError::Config(format!("{name} must be positive")));
            }
        }
        if !(self.random_range_ratio.is_finite() && self.random_range_ratio > 0.0) {
            return Err(BenchError::Config(format!(
                "RANDOM_RANGE_RATIO must be positive, got {}",
                self.random_range_ratio
            )));
        }
        Ok(())
    }
}

/// Prompt count used when `NUM_PROMPTS` is unset.
pub fn default_prompt_count(concurrency: u32) -> u32 {
    concurrency.saturating_mul(10)
}

/// Accuracy gate thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GateConfig {
    /// Reference GPQA score
    pub baseline_metric: f64,
    /// Absolute tolerance below the baseline
    pub tolerance: f64,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            baseline_metric: 0.58,
            tolerance: 0.05,
        }
    }
}

/// External tools, output location, and probe budget.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolConfig {
    pub result_dir: PathBuf,
    /// Evaluator command line; `--base-url` and `--model` are appended
    pub eval_command: Vec<String>,
    /// Load generator command line; benchmark flags are appended
    pub load_command: Vec<String>,
    pub health_max_attempts: u32,
    pub health_delay_secs: u64,
    pub http_timeout_secs: u64,
    pub baseline_file: Option<PathBuf>,
    pub team_name: Option<String>,
}

impl ToolConfig {
    pub fn health_delay(&self) -> Duration {
        Duration::from_secs(self.health_delay_secs)
    }
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            result_dir: PathBuf::from("results"),
            eval_command: split_command("python3 accuracy_test_gpqa.py"),
            load_command: split_command("vllm bench serve"),
            health_max_attempts: 10,
            health_delay_secs: 3,
            http_timeout_secs: 10,
            baseline_file: None,
            team_name: None,
        }
    }
}

/// Complete, immutable configuration of a process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchConfig {
    pub run: RunConfig,
    pub gate: GateConfig,
    pub tools: ToolConfig,
}

impl BenchConfig {
    /// Read the process environment once.
    pub fn from_env() -> Result<Self, BenchError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from an arbitrary variable source. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, BenchError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let model = get("MODEL")
            .ok_or_else(|| BenchError::Config("MODEL environment variable is required".into()))?;
        let concurrency: u32 = parse_var(&get, "CONC", 8)?;

        let run = RunConfig {
            model,
            port: parse_var(&get, "PORT", 8888)?,
            tensor_parallel: parse_var(&get, "TP", 8)?,
            concurrency,
            input_len: parse_var(&get, "ISL", 1024)?,
            output_len: parse_var(&get, "OSL", 1024)?,
            max_model_len: parse_var(&get, "MAX_MODEL_LEN", 16384)?,
            random_range_ratio: parse_var(&get, "RANDOM_RANGE_RATIO", 1.0)?,
            num_prompts: parse_var(&get, "NUM_PROMPTS", default_prompt_count(concurrency))?,
            result_filename: get("RESULT_FILENAME").unwrap_or_else(|| "result".to_string()),
            leaderboard_url_override: get("LB_URL_OVERRIDE"),
        };
        run.validate()?;

        let defaults = GateConfig::default();
        let gate = GateConfig {
            baseline_metric: parse_var(&get, "GPQA_BASELINE_METRIC", defaults.baseline_metric)?,
            tolerance: parse_var(&get, "GPQA_TOL", defaults.tolerance)?,
        };
        if !(gate.tolerance.is_finite() && gate.tolerance >= 0.0) {
            return Err(BenchError::Config(format!(
                "GPQA_TOL must be non-negative, got {}",
                gate.tolerance
            )));
        }

        let defaults = ToolConfig::default();
        let tools = ToolConfig {
            result_dir: get("RESULT_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.result_dir),
            eval_command: get("GPQA_EVAL_CMD")
                .map(|c| split_command(&c))
                .unwrap_or(defaults.eval_command),
            load_command: get("BENCH_SERVING_CMD")
                .map(|c| split_command(&c))
                .unwrap_or(defaults.load_command),
            health_max_attempts: parse_var(
                &get,
                "HEALTH_MAX_ATTEMPTS",
                defaults.health_max_attempts,
            )?,
            health_delay_secs: parse_var(&get, "HEALTH_DELAY_S", defaults.health_delay_secs)?,
            http_timeout_secs: parse_var(&get, "HTTP_TIMEOUT_S", defaults.http_timeout_secs)?,
            baseline_file: get("BASELINE_FILE").map(PathBuf::from),
            team_name: get("TEAM_NAME_ENV"),
        };
        if tools.health_max_attempts == 0 {
            return Err(BenchError::Config("HEALTH_MAX_ATTEMPTS must be positive".into()));
        }

        Ok(Self { run, gate, tools })
    }

    /// Variables that rebuild this exact configuration through [`BenchConfig::from_lookup`].
    pub fn to_env_vars(&self) -> Vec<(String, String)> {
        let run = &self.run;
        let tools = &self.tools;
        let mut vars = vec![
            ("MODEL", run.model.clone()),
            ("PORT", run.port.to_string()),
            ("TP", run.tensor_parallel.to_string()),
            ("CONC", run.concurrency.to_string()),
            ("ISL", run.input_len.to_string()),
            ("OSL", run.output_len.to_string()),
            ("MAX_MODEL_LEN", run.max_model_len.to_string()),
            ("RANDOM_RANGE_RATIO", run.random_range_ratio.to_string()),
            ("NUM_PROMPTS", run.num_prompts.to_string()),
            ("RESULT_FILENAME", run.result_filename.clone()),
            ("GPQA_BASELINE_METRIC", self.gate.baseline_metric.to_string()),
            ("GPQA_TOL", self.gate.tolerance.to_string()),
            ("RESULT_DIR", tools.result_dir.display().to_string()),
            ("GPQA_EVAL_CMD", tools.eval_command.join(" ")),
            ("BENCH_SERVING_CMD", tools.load_command.join(" ")),
            ("HEALTH_MAX_ATTEMPTS", tools.health_max_attempts.to_string()),
            ("HEALTH_DELAY_S", tools.health_delay_secs.to_string()),
            ("HTTP_TIMEOUT_S", tools.http_timeout_secs.to_string()),
        ];
        if let Some(url) = &run.leaderboard_url_override {
            vars.push(("LB_URL_OVERRIDE", url.clone()));
        }
        if let Some(path) = &tools.baseline_file {
            vars.push(("BASELINE_FILE", path.display().to_string()));
        }
        if let Some(team) = &tools.team_name {
            vars.push(("TEAM_NAME_ENV", team.clone()));
        }
        vars.into_iter().map(|(k, v)| (k.to_string(), v)).collect()
    }

    /// Path the load generator writes and the normalizer rewrites.
    pub fn result_path(&self) -> PathBuf {
        self.tools
            .result_dir
            .join(format!("{}.json", self.run.result_filename))
    }
}

fn parse_var<T, G>(get: &G, name: &str, default: T) -> Result<T, BenchError>
where
    T: FromStr,
    T::Err: Display,
    G: Fn(&str) -> Option<String>,
{
    match get(name) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| BenchError::Config(format!("{name}={raw:?} is invalid: {e}"))),
        None => Ok(default),
    }
}

fn split_command(line: &str) -> Vec<String> {
    line.split_whitespace().map(str::to_string).collect()
}
