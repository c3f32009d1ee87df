//! Single-configuration run: Health → Accuracy → Gate → Load → Normalize → Publish.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use tracing::{error, info};

use crate::accuracy::{run_accuracy, validate, AccuracyMetric, GateVerdict};
use crate::baseline::BaselineTable;
use crate::config::BenchConfig;
use crate::error::BenchError;
use crate::health::{Health, HealthProber, Pause};
use crate::http::HttpTransport;
use crate::load::run_load;
use crate::normalize::{normalize, read_raw_metrics, write_result, CanonicalResult};
use crate::process::CommandRunner;
use crate::publish::{LeaderboardPublisher, Submission};
use crate::stages::{StageLog, StageRecord};
use crate::{Mode, Stage};

/// Side-effecting capabilities a run needs.
#[derive(Clone, Copy)]
pub struct Services<'a> {
    pub http: &'a dyn HttpTransport,
    pub commands: &'a dyn CommandRunner,
    pub pause: &'a dyn Pause,
}

/// Outcome of a successful run.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub mode: Mode,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub accuracy: AccuracyMetric,
    pub verdict: GateVerdict,
    pub result_path: Option<PathBuf>,
    pub result: Option<CanonicalResult>,
    pub submission: Option<Submission>,
    pub stages: Vec<StageRecord>,
}

impl RunReport {
    /// Human-readable summary printed at the end of a run.
    pub fn render(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!("Run ({}) finished at {}\n", self.mode, self.finished_at.to_rfc3339()));
        out.push_str(&format!(
            "  gpqa_metric: {:.4} (min accepted {:.4})\n",
            self.accuracy.gpqa_metric, self.verdict.min_accepted
        ));
        if let Some(result) = &self.result {
            out.push_str(&format!(
                "  tput_per_gpu: {:.3}  interactivity: {:.3}  median_e2el_ms: {:.1}\n",
                result.tput_per_gpu,
                result.interactivity,
                result.median_e2el_ms()
            ));
            match result.tput_ratio_vs_baseline {
                Some(ratio) => out.push_str(&format!("  throughput vs baseline: {:.3}x\n", ratio)),
                None => out.push_str("  throughput vs baseline: no baseline\n"),
            }
        }
        if let Some(path) = &self.result_path {
            out.push_str(&format!("  result file: {}\n", path.display()));
        }
        if let Some(submission) = &self.submission {
            out.push_str(&format!(
                "  submitted to {} (HTTP {})\n",
                submission.endpoint, submission.status
            ));
        }
        for record in &self.stages {
            out.push_str(&format!(
                "  stage {:<14} {:>9.1}s\n",
                record.stage.to_string(),
                record.elapsed.as_secs_f64()
            ));
        }
        out
    }
}

pub struct Pipeline<'a> {
    config: &'a BenchConfig,
    baselines: &'a BaselineTable,
    services: Services<'a>,
}

impl<'a> Pipeline<'a> {
    pub fn new(config: &'a BenchConfig, baselines: &'a BaselineTable, services: Services<'a>) -> Self {
        Self {
            config,
            baselines,
            services,
        }
    }

    /// Execute every stage `mode` includes, stopping at the first failure.
    ///
    /// A failed submission leaves the written result file in place.
    pub fn run(&self, mode: &Mode) -> Result<RunReport, BenchError> {
        let config = self.config;
        let started_at = Utc::now();
        let stages = StageLog::default();
        info!(
            mode = %mode,
            model = %config.run.model,
            isl = config.run.input_len,
            osl = config.run.output_len,
            concurrency = config.run.concurrency,
            "Starting benchmark run"
        );

        stages.time(Stage::Health, || self.check_health())?;

        let accuracy = stages.time(Stage::Accuracy, || {
            run_accuracy(config, self.services.commands)
        })?;
        let verdict = stages.time(Stage::AccuracyGate, || {
            validate(accuracy.gpqa_metric, &config.gate).into_result()
        })?;
        info!(
            gpqa_metric = accuracy.gpqa_metric,
            min_accepted = verdict.min_accepted,
            "Accuracy gate passed"
        );

        let mut report = RunReport {
            mode: mode.clone(),
            started_at,
            finished_at: started_at,
            accuracy,
            verdict,
            result_path: None,
            result: None,
            submission: None,
            stages: Vec::new(),
        };

        if mode.includes_load() {
            let path = stages.time(Stage::Load, || run_load(config, self.services.commands))?;
            let result = stages.time(Stage::Normalize, || {
                let raw = read_raw_metrics(&path)?;
                let result = normalize(&raw, accuracy, config, self.baselines);
                write_result(&path, &result)?;
                Ok(result)
            })?;

            if let Some(team) = mode.team() {
                let publisher = LeaderboardPublisher::new(self.services.http);
                let submission = stages
                    .time(Stage::Publish, || {
                        publisher.publish(&result, team, config.run.leaderboard_url())
                    })
                    .map_err(|e| {
                        error!(result = %path.display(), "Submission failed; local result kept");
                        e
                    })?;
                report.submission = Some(submission);
            }

            report.result_path = Some(path);
            report.result = Some(result);
        }

        report.finished_at = Utc::now();
        report.stages = stages.records();
        Ok(report)
    }

    fn check_health(&self) -> Result<(), BenchError> {
        let base_url = self.config.run.base_url();
        let prober = HealthProber::new(self.services.http, self.services.pause);
        match prober.probe(
            &base_url,
            self.config.tools.health_max_attempts,
            self.config.tools.health_delay(),
        ) {
            Health::Ready { .. } => Ok(()),
            Health::Unhealthy { attempts } => Err(BenchError::Unhealthy {
                url: format!("{base_url}/health"),
                attempts,
            }),
        }
    }
}
