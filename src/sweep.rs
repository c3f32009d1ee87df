//! Multi-concurrency sweep over the single-run pipeline.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{error, info, warn};

use crate::baseline::BaselineTable;
use crate::config::BenchConfig;
use crate::health::Pause;
use crate::pipeline::{Pipeline, Services};
use crate::process::{CommandLine, CommandRunner};
use crate::Mode;

/// Concurrency levels of every sweep, in execution order.
pub const SWEEP_CONCURRENCIES: [u32; 6] = [4, 8, 16, 32, 64, 256];

/// Settling time between two levels.
pub const COOLDOWN: Duration = Duration::from_secs(2);

/// Runs one configured pipeline and reports its exit code (0 = success).
pub trait IsolatedRun {
    fn run_isolated(&self, config: &BenchConfig, mode: &Mode) -> i32;
}

/// Runs the pipeline in the current process.
pub struct InProcessRun<'a> {
    baselines: &'a BaselineTable,
    services: Services<'a>,
}

impl<'a> InProcessRun<'a> {
    pub fn new(baselines: &'a BaselineTable, services: Services<'a>) -> Self {
        Self {
            baselines,
            services,
        }
    }
}

impl<'a> IsolatedRun for InProcessRun<'a> {
    fn run_isolated(&self, config: &BenchConfig, mode: &Mode) -> i32 {
        match Pipeline::new(config, self.baselines, self.services).run(mode) {
            Ok(report) => {
                info!(concurrency = config.run.concurrency, "{}", report.render());
                0
            }
            Err(e) => {
                error!(stage = ?e.stage(), "{e}");
                1
            }
        }
    }
}

/// Re-launches `program` with the level's configuration exported as environment
/// variables, so a crash or leak at one level cannot affect the next.
pub struct SubprocessRun<'a> {
    program: PathBuf,
    commands: &'a dyn CommandRunner,
}

impl<'a> SubprocessRun<'a> {
    pub fn new(program: PathBuf, commands: &'a dyn CommandRunner) -> Self {
        Self { program, commands }
    }

    pub fn command(&self, config: &BenchConfig, mode: &Mode) -> CommandLine {
        CommandLine {
            program: self.program.display().to_string(),
            args: mode.to_args(),
            envs: config.to_env_vars(),
            capture: false,
        }
    }
}

impl<'a> IsolatedRun for SubprocessRun<'a> {
    fn run_isolated(&self, config: &BenchConfig, mode: &Mode) -> i32 {
        let command = self.command(config, mode);
        match self.commands.run(&command) {
            Ok(output) => output.exit_code.unwrap_or(-1),
            Err(e) => {
                error!("{e}");
                -1
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LevelVerdict {
    Passed,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LevelResult {
    pub concurrency: u32,
    pub verdict: LevelVerdict,
    pub exit_code: i32,
    pub duration: Duration,
}

/// Per-level outcomes and totals of one sweep.
#[derive(Debug, Clone, Serialize)]
pub struct SweepSummary {
    pub input_len: u32,
    pub output_len: u32,
    pub mode: String,
    pub output_dir: PathBuf,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub levels: Vec<LevelResult>,
    pub log: Vec<String>,
}

impl SweepSummary {
    pub fn new(input_len: u32, output_len: u32, mode: &Mode, output_dir: PathBuf) -> Self {
        Self {
            input_len,
            output_len,
            mode: mode.to_string(),
            output_dir,
            started_at: Utc::now(),
            finished_at: None,
            levels: Vec::new(),
            log: Vec::new(),
        }
    }

    pub fn record(&mut self, concurrency: u32, exit_code: i32, duration: Duration) {
        let verdict = if exit_code == 0 {
            LevelVerdict::Passed
        } else {
            LevelVerdict::Failed
        };
        let verdict_label = match verdict {
            LevelVerdict::Passed => "PASSED",
            LevelVerdict::Failed => "FAILED",
        };
        self.log.push(format!(
            "CONC={:<4} {:<6} ({:.1}s)",
            concurrency,
            verdict_label,
            duration.as_secs_f64()
        ));
        self.levels.push(LevelResult {
            concurrency,
            verdict,
            exit_code,
            duration,
        });
    }

    pub fn passed(&self) -> usize {
        self.levels
            .iter()
            .filter(|l| l.verdict == LevelVerdict::Passed)
            .count()
    }

    pub fn failed(&self) -> usize {
        self.levels.len() - self.passed()
    }

    pub fn total(&self) -> usize {
        self.levels.len()
    }

    pub fn all_passed(&self) -> bool {
        self.failed() == 0
    }

    pub fn finalize(&mut self) {
        self.finished_at = Some(Utc::now());
    }

    pub fn file_name(&self) -> String {
        format!(
            "sweep_summary_isl{}_osl{}.log",
            self.input_len, self.output_len
        )
    }

    pub fn render(&self) -> String {
        let mut out = format!(
            "Sweep summary: ISL={} OSL={} mode={}\nStarted: {}\n",
            self.input_len,
            self.output_len,
            self.mode,
            self.started_at.to_rfc3339()
        );
        for line in &self.log {
            out.push_str(line);
            out.push('\n');
        }
        out.push_str(&format!(
            "Total: {}  Passed: {}  Failed: {}\n",
            self.total(),
            self.passed(),
            self.failed()
        ));
        if let Some(finished) = self.finished_at {
            out.push_str(&format!("Finished: {}\n", finished.to_rfc3339()));
        }
        out.push_str(&format!("Results in: {}\n", self.output_dir.display()));
        out
    }
}

pub struct SweepCoordinator<'a> {
    config: &'a BenchConfig,
    runner: &'a dyn IsolatedRun,
    pause: &'a dyn Pause,
    levels: Vec<u32>,
    cooldown: Duration,
}

impl<'a> SweepCoordinator<'a> {
    pub fn new(config: &'a BenchConfig, runner: &'a dyn IsolatedRun, pause: &'a dyn Pause) -> Self {
        Self {
            config,
            runner,
            pause,
            levels: SWEEP_CONCURRENCIES.to_vec(),
            cooldown: COOLDOWN,
        }
    }

    /// Run every level regardless of earlier failures.
    pub fn run_sweep(&self, input_len: u32, output_len: u32, mode: &Mode) -> SweepSummary {
        let output_dir = self.config.tools.result_dir.clone();
        let mut summary = SweepSummary::new(input_len, output_len, mode, output_dir);
        info!(
            isl = input_len,
            osl = output_len,
            levels = ?self.levels,
            "Starting concurrency sweep"
        );

        for (idx, &concurrency) in self.levels.iter().enumerate() {
            let level = BenchConfig {
                run: self.config.run.for_sweep_level(input_len, output_len, concurrency),
                ..self.config.clone()
            };
            info!(
                concurrency,
                num_prompts = level.run.num_prompts,
                result = %level.run.result_filename,
                "Running sweep level"
            );

            let start = Instant::now();
            let exit_code = self.runner.run_isolated(&level, mode);
            let elapsed = start.elapsed();
            summary.record(concurrency, exit_code, elapsed);

            if exit_code == 0 {
                info!(concurrency, elapsed_s = elapsed.as_secs_f64(), "Sweep level passed");
            } else {
                warn!(concurrency, exit_code, "Sweep level failed");
            }

            if idx + 1 < self.levels.len() {
                self.pause.pause(self.cooldown);
            }
        }

        summary.finalize();
        self.persist(&summary);
        summary
    }

    fn persist(&self, summary: &SweepSummary) {
        let path = summary.output_dir.join(summary.file_name());
        let written = std::fs::create_dir_all(&summary.output_dir)
            .and_then(|_| std::fs::write(&path, summary.render()));
        match written {
            Ok(()) => info!(path = %path.display(), "Sweep summary written"),
            Err(e) => warn!(path = %path.display(), error = %e, "Could not write sweep summary"),
        }
    }
}
