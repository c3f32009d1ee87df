//! Per-stage timing for a single run.

use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{info, warn};

use crate::error::BenchError;
use crate::Stage;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Ok,
    Failed(String),
    /// Guard dropped without an explicit finish
    Abandoned,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StageRecord {
    pub stage: Stage,
    pub elapsed: Duration,
    pub status: StageStatus,
}

/// Completed stages of one run.
#[derive(Debug, Default)]
pub struct StageLog {
    records: Mutex<Vec<StageRecord>>,
}

impl StageLog {
    pub fn start(&self, stage: Stage) -> StageTimer<'_> {
        info!(stage = %stage, "Stage started");
        StageTimer {
            stage,
            start: Instant::now(),
            log: self,
            finished: false,
        }
    }

    /// Run `f` as `stage`, recording its duration and outcome.
    pub fn time<T>(
        &self,
        stage: Stage,
        f: impl FnOnce() -> Result<T, BenchError>,
    ) -> Result<T, BenchError> {
        let timer = self.start(stage);
        let result = f();
        match &result {
            Ok(_) => timer.finish_ok(),
            Err(e) => timer.finish_err(e),
        }
        result
    }

    pub fn records(&self) -> Vec<StageRecord> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn push(&self, record: StageRecord) {
        match &record.status {
            StageStatus::Ok => info!(
                stage = %record.stage,
                elapsed_ms = record.elapsed.as_millis() as u64,
                "Stage finished"
            ),
            StageStatus::Failed(reason) => warn!(
                stage = %record.stage,
                elapsed_ms = record.elapsed.as_millis() as u64,
                %reason,
                "Stage failed"
            ),
            StageStatus::Abandoned => warn!(stage = %record.stage, "Stage abandoned"),
        }
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(record);
    }
}

/// RAII guard that records the stage when finished or dropped.
pub struct StageTimer<'a> {
    stage: Stage,
    start: Instant,
    log: &'a StageLog,
    finished: bool,
}

impl<'a> StageTimer<'a> {
    pub fn finish_ok(mut self) {
        self.finish(StageStatus::Ok);
    }

    pub fn finish_err(mut self, error: &BenchError) {
        self.finish(StageStatus::Failed(error.to_string()));
    }

    fn finish(&mut self, status: StageStatus) {
        self.finished = true;
        self.log.push(StageRecord {
            stage: self.stage,
            elapsed: self.start.elapsed(),
            status,
        });
    }
}

impl<'a> Drop for StageTimer<'a> {
    fn drop(&mut self) {
        if !self.finished {
            self.finish(StageStatus::Abandoned);
        }
    }
}
