//! Blocking HTTP access to the server under test and the leaderboard.

use std::time::Duration;

use serde_json::Value;

/// Status and body of an HTTP response.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpReply {
    pub status: u16,
    pub body: String,
}

impl HttpReply {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Minimal HTTP surface the coordinator needs.
///
/// `Err` is a transport failure (no response at all); any received status is `Ok`.
pub trait HttpTransport {
    fn get(&self, url: &str) -> Result<HttpReply, String>;
    fn post_json(&self, url: &str, body: &Value) -> Result<HttpReply, String>;
}

/// reqwest-backed transport.
pub struct ReqwestTransport {
    client: reqwest::blocking::Client,
}

impl ReqwestTransport {
    pub fn new(timeout: Duration) -> Result<Self, String> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| format!("HTTP client not initialized: {e}"))?;
        Ok(Self { client })
    }
}

impl HttpTransport for ReqwestTransport {
    fn get(&self, url: &str) -> Result<HttpReply, String> {
        let resp = self.client.get(url).send().map_err(|e| e.to_string())?;
        let status = resp.status().as_u16();
        Ok(HttpReply {
            status,
            body: resp.text().unwrap_or_default(),
        })
    }

    fn post_json(&self, url: &str, body: &Value) -> Result<HttpReply, String> {
        let resp = self
            .client
            .post(url)
            .json(body)
            .send()
            .map_err(|e| e.to_string())?;
        let status = resp.status().as_u16();
        Ok(HttpReply {
            status,
            body: resp.text().unwrap_or_default(),
        })
    }
}
