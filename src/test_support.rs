//! Scripted fakes for the HTTP, process, and sleep seams.

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use serde_json::{json, Value};

use crate::config::BenchConfig;
use crate::error::BenchError;
use crate::health::Pause;
use crate::http::{HttpReply, HttpTransport};
use crate::process::{CommandLine, CommandOutput, CommandRunner};

pub fn bench_config() -> BenchConfig {
    bench_config_in(Path::new("results"))
}

pub fn bench_config_in(result_dir: &Path) -> BenchConfig {
    let vars: HashMap<&str, String> = [
        ("MODEL", "openai/gpt-oss-120b".to_string()),
        ("RESULT_DIR", result_dir.display().to_string()),
        ("GPQA_EVAL_CMD", "python3 accuracy_test_gpqa.py".to_string()),
        ("BENCH_SERVING_CMD", "vllm bench serve".to_string()),
        ("HEALTH_MAX_ATTEMPTS", "3".to_string()),
        ("HEALTH_DELAY_S", "0".to_string()),
    ]
    .into_iter()
    .collect();
    BenchConfig::from_lookup(|name| vars.get(name).cloned()).unwrap()
}

/// Shape of a vLLM `bench serve` result document, including fields the
/// normalizer must drop.
pub fn sample_load_document() -> Value {
    json!({
        "date": "20261019-101500",
        "backend": "vllm",
        "model_id": "openai/gpt-oss-120b",
        "tokenizer_id": "openai/gpt-oss-120b",
        "num_prompts": 80,
        "max_concurrency": 8,
        "request_rate": "inf",
        "duration": 29.87,
        "completed": 80,
        "total_input_tokens": 81920,
        "total_output_tokens": 81920,
        "request_throughput": 2.678,
        "output_throughput": 2742.5,
        "total_token_throughput": 5485.1,
        "mean_ttft_ms": 81.2,
        "median_ttft_ms": 77.4,
        "std_ttft_ms": 12.9,
        "p99_ttft_ms": 140.3,
        "mean_tpot_ms": 2.79,
        "median_tpot_ms": 2.75,
        "std_tpot_ms": 0.11,
        "p99_tpot_ms": 3.02,
        "mean_itl_ms": 2.78,
        "median_itl_ms": 2.70,
        "std_itl_ms": 0.9,
        "p99_itl_ms": 5.4,
        "mean_e2el_ms": 2935.0,
        "median_e2el_ms": 2901.5,
        "std_e2el_ms": 88.0,
        "p99_e2el_ms": 3180.2,
        "input_lens": [1024, 1024],
        "output_lens": [1024, 1024],
        "ttfts": [0.08, 0.07],
        "itls": [[0.002, 0.003]],
        "generated_texts": ["...", "..."],
        "errors": ["", ""]
    })
}

/// Replays scripted GET statuses (the last one repeats) and one POST reply.
pub struct ScriptedHttp {
    gets: Mutex<VecDeque<Result<u16, String>>>,
    last_get: Mutex<Result<u16, String>>,
    get_urls: Mutex<Vec<String>>,
    post_reply: Result<(u16, String), String>,
    posts: Mutex<Vec<(String, Value)>>,
}

impl ScriptedHttp {
    pub fn with_gets(gets: Vec<Result<u16, String>>) -> Self {
        Self {
            gets: Mutex::new(gets.into()),
            last_get: Mutex::new(Err("no scripted response".to_string())),
            get_urls: Mutex::new(Vec::new()),
            post_reply: Ok((200, String::new())),
            posts: Mutex::new(Vec::new()),
        }
    }

    pub fn with_post(reply: Result<(u16, String), String>) -> Self {
        Self::with_gets(Vec::new()).and_post(reply)
    }

    pub fn and_post(mut self, reply: Result<(u16, String), String>) -> Self {
        self.post_reply = reply;
        self
    }

    pub fn get_urls(&self) -> Vec<String> {
        self.get_urls.lock().unwrap().clone()
    }

    pub fn posts(&self) -> Vec<(String, Value)> {
        self.posts.lock().unwrap().clone()
    }
}

impl HttpTransport for ScriptedHttp {
    fn get(&self, url: &str) -> Result<HttpReply, String> {
        self.get_urls.lock().unwrap().push(url.to_string());
        let mut last = self.last_get.lock().unwrap();
        if let Some(next) = self.gets.lock().unwrap().pop_front() {
            *last = next;
        }
        last.clone().map(|status| HttpReply {
            status,
            body: String::new(),
        })
    }

    fn post_json(&self, url: &str, body: &Value) -> Result<HttpReply, String> {
        self.posts
            .lock()
            .unwrap()
            .push((url.to_string(), body.clone()));
        self.post_reply
            .clone()
            .map(|(status, body)| HttpReply { status, body })
    }
}

#[derive(Default)]
pub struct RecordingPause {
    pauses: Mutex<Vec<Duration>>,
}

impl RecordingPause {
    pub fn pauses(&self) -> Vec<Duration> {
        self.pauses.lock().unwrap().clone()
    }
}

impl Pause for RecordingPause {
    fn pause(&self, duration: Duration) {
        self.pauses.lock().unwrap().push(duration);
    }
}

/// Fake evaluator and load generator.
///
/// A successful load invocation writes [`sample_load_document`] where the
/// command's `--result-dir`/`--result-filename` point.
pub struct ScriptedCommands {
    eval: CommandOutput,
    load: CommandOutput,
    write_document: bool,
    calls: Mutex<Vec<CommandLine>>,
}

impl ScriptedCommands {
    pub fn new() -> Self {
        Self {
            eval: CommandOutput {
                exit_code: Some(0),
                stdout: "Metrics for parsing:\n  'gpqa_metric': 0.61\n".to_string(),
                stderr: String::new(),
            },
            load: CommandOutput {
                exit_code: Some(0),
                ..CommandOutput::default()
            },
            write_document: true,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_eval(mut self, output: CommandOutput) -> Self {
        self.eval = output;
        self
    }

    pub fn with_load_exit(mut self, output: CommandOutput) -> Self {
        self.load = output;
        self
    }

    pub fn without_load_document(mut self) -> Self {
        self.write_document = false;
        self
    }

    pub fn eval_calls(&self) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| !is_load(c))
            .count()
    }

    pub fn load_calls(&self) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| is_load(c)).count()
    }
}

fn is_load(command: &CommandLine) -> bool {
    command.value_of("--random-input-len").is_some()
}

impl CommandRunner for ScriptedCommands {
    fn run(&self, command: &CommandLine) -> Result<CommandOutput, BenchError> {
        self.calls.lock().unwrap().push(command.clone());
        if !is_load(command) {
            return Ok(self.eval.clone());
        }
        if self.load.success() && self.write_document {
            let dir = PathBuf::from(command.value_of("--result-dir").unwrap_or("."));
            let file = command.value_of("--result-filename").unwrap_or("result.json");
            std::fs::write(dir.join(file), sample_load_document().to_string())?;
        }
        Ok(self.load.clone())
    }
}
