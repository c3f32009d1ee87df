//! Leaderboard submission.

use serde_json::{json, Value};
use tracing::{info, warn};

use crate::error::BenchError;
use crate::http::HttpTransport;
use crate::normalize::CanonicalResult;

/// Positional payload: team, concurrency, latency, throughput, baseline latency,
/// baseline throughput, latency ratio, throughput ratio, interactivity, baseline
/// interactivity, interactivity ratio, accuracy.
pub fn leaderboard_payload(result: &CanonicalResult, team_name: &str) -> Value {
    let baseline = result.baseline_nv1126.as_ref();
    json!({
        "data": [
            team_name,
            result.benchmark_args.concurrency,
            result.median_e2el_ms(),
            result.tput_per_gpu,
            baseline.map(|b| b.median_e2el_ms),
            baseline.map(|b| b.tput_per_gpu),
            result.e2el_ratio_vs_baseline,
            result.tput_ratio_vs_baseline,
            result.interactivity,
            baseline.map(|b| b.median_intvty),
            result.intvty_ratio_vs_baseline,
            result.accuracy.gpqa_metric,
        ]
    })
}

/// Accepted submission.
#[derive(Debug, Clone, PartialEq)]
pub struct Submission {
    pub endpoint: String,
    pub status: u16,
    /// Response body, when the leaderboard answered with JSON
    pub acknowledgement: Option<Value>,
}

pub struct LeaderboardPublisher<'a> {
    http: &'a dyn HttpTransport,
}

impl<'a> LeaderboardPublisher<'a> {
    pub fn new(http: &'a dyn HttpTransport) -> Self {
        Self { http }
    }

    /// POST the payload to `{base_url}/submit`. Non-2xx statuses are errors.
    pub fn publish(
        &self,
        result: &CanonicalResult,
        team_name: &str,
        base_url: &str,
    ) -> Result<Submission, BenchError> {
        let endpoint = format!("{}/submit", base_url.trim_end_matches('/'));
        let payload = leaderboard_payload(result, team_name);
        info!(%endpoint, team = team_name, "Submitting to leaderboard");

        let reply = self.http.post_json(&endpoint, &payload).map_err(|e| {
            BenchError::Publish(format!("Failed to reach leaderboard {endpoint}: {e}"))
        })?;

        if !reply.is_success() {
            warn!(%endpoint, status = reply.status, "Leaderboard rejected submission");
            return Err(BenchError::Publish(format!(
                "Leaderboard {} returned {}: {}",
                endpoint, reply.status, reply.body
            )));
        }

        info!(status = reply.status, "Leaderboard accepted submission");
        Ok(Submission {
            endpoint,
            status: reply.status,
            acknowledgement: serde_json::from_str(&reply.body).ok(),
        })
    }
}
