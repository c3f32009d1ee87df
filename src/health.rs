//! Readiness polling of the server under test.

use std::time::Duration;

use tracing::{debug, info, warn};

use crate::http::HttpTransport;

/// Blocking wait between attempts.
pub trait Pause {
    fn pause(&self, duration: Duration);
}

/// Sleeps the current thread.
pub struct ThreadPause;

impl Pause for ThreadPause {
    fn pause(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Outcome of a probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Health {
    Ready { attempts: u32 },
    Unhealthy { attempts: u32 },
}

/// Polls `{base_url}/health` with a fixed delay between attempts.
pub struct HealthProber<'a> {
    http: &'a dyn HttpTransport,
    pause: &'a dyn Pause,
}

impl<'a> HealthProber<'a> {
    pub fn new(http: &'a dyn HttpTransport, pause: &'a dyn Pause) -> Self {
        Self { http, pause }
    }

    /// Returns as soon as one attempt sees HTTP 200. No wait follows the last attempt.
    pub fn probe(&self, base_url: &str, max_attempts: u32, delay: Duration) -> Health {
        let url = format!("{}/health", base_url.trim_end_matches('/'));
        info!(%url, max_attempts, "Checking server health");

        for attempt in 1..=max_attempts {
            match self.http.get(&url) {
                Ok(reply) if reply.status == 200 => {
                    info!(attempt, "Server is healthy");
                    return Health::Ready { attempts: attempt };
                }
                Ok(reply) => debug!(attempt, status = reply.status, "Server not ready"),
                Err(e) => debug!(attempt, error = %e, "Health check transport failure"),
            }
            if attempt < max_attempts {
                self.pause.pause(delay);
            }
        }

        warn!(%url, max_attempts, "Server never became healthy");
        Health::Unhealthy {
            attempts: max_attempts,
        }
    }
}
