// # HTTP Timer Service
//
// This crate provides a TimerService implementation for Chronos-style timer
// services, which fire an HTTP callback once a timer's interval elapses.
//
// ## Responsibilities
//
// - One HTTP request per call; no retries, no caching, no background tasks
// - Full error propagation: the caller (TimerCoordinator) decides what a
//   failure means
//
// ## API Reference
//
// - Create: POST `/timers`, timer id returned in the `Location` header
// - Update: PUT `/timers/:timer_id`
// - Delete: DELETE `/timers/:timer_id`
//
// ```json
// {
//   "timing": { "interval": 300, "repeat-for": 300 },
//   "callback": {
//     "http": { "uri": "http://registrar:9888/timers", "opaque": "sip:alice@example.com" }
//   },
//   "statistics": {
//     "tag-info": [
//       { "type": "REG", "count": 1 },
//       { "type": "BIND", "count": 2 },
//       { "type": "SUB", "count": 0 }
//     ]
//   }
// }
// ```

use async_trait::async_trait;
use regstore_core::config::TimerServiceConfig;
use regstore_core::traits::{TimerRequest, TimerService};
use regstore_core::{Error, Result};
use serde_json::{Value, json};
use std::time::Duration;

/// Cloneable handle to a Chronos-style timer service
#[derive(Clone)]
pub struct HttpTimerService {
    /// Base URL without trailing slash
    base_url: String,

    /// URI the timer service calls back on expiry
    callback_uri: String,

    /// HTTP client for API requests
    client: reqwest::Client,

    timeout: Duration,
}

impl std::fmt::Debug for HttpTimerService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpTimerService")
            .field("base_url", &self.base_url)
            .field("callback_uri", &self.callback_uri)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl HttpTimerService {
    /// Create a new HTTP timer service client
    ///
    /// # Parameters
    ///
    /// - `base_url`: Base URL of the timer service (e.g. "http://127.0.0.1:7253")
    /// - `callback_uri`: URI the timer service calls when a timer pops
    /// - `timeout`: Per-request HTTP timeout
    pub fn new(
        base_url: impl Into<String>,
        callback_uri: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        if base_url.is_empty() {
            return Err(Error::config("Timer service URL cannot be empty"));
        }

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            base_url,
            callback_uri: callback_uri.into(),
            client,
            timeout,
        })
    }

    /// Create a client from configuration
    pub fn from_config(config: &TimerServiceConfig) -> Result<Self> {
        config.validate()?;
        match config {
            TimerServiceConfig::Http {
                base_url,
                callback_uri,
                timeout_ms,
            } => Self::new(
                base_url.clone(),
                callback_uri.clone(),
                Duration::from_millis(*timeout_ms),
            ),
        }
    }

    fn timers_url(&self) -> String {
        format!("{}/timers", self.base_url)
    }

    fn timer_url(&self, timer_id: &str) -> String {
        format!("{}/timers/{}", self.base_url, timer_id)
    }

    /// Build the request body for `request` as of `now` (epoch seconds)
    fn timer_body(&self, request: &TimerRequest, now: i64) -> Value {
        let interval = (request.deliver_at - now).max(0);
        json!({
            "timing": {
                "interval": interval,
                "repeat-for": interval,
            },
            "callback": {
                "http": {
                    "uri": self.callback_uri,
                    "opaque": request.aor_key,
                }
            },
            "statistics": {
                "tag-info": [
                    { "type": "REG", "count": request.tags.reg },
                    { "type": "BIND", "count": request.tags.bind },
                    { "type": "SUB", "count": request.tags.sub },
                ]
            }
        })
    }

    /// Send a request and map any non-2xx status to an error
    async fn send(&self, op: &str, builder: reqwest::RequestBuilder) -> Result<reqwest::Response> {
        let response = builder
            .send()
            .await
            .map_err(|e| Error::timer_service(format!("{} request failed: {}", op, e)))?;

        if response.status().is_success() {
            return Ok(response);
        }

        let status = response.status();
        let error_text = response
            .text()
            .await
            .unwrap_or_else(|_| "Unable to read error response".to_string());

        Err(status_error(op, status.as_u16(), &error_text))
    }
}

/// Describe a non-success status from the timer service
fn status_error(op: &str, status: u16, body: &str) -> Error {
    match status {
        400 => Error::timer_service(format!("{} rejected as malformed: {}", op, body)),
        404 => Error::timer_service(format!("{} failed: timer not found", op)),
        429 => Error::timer_service(format!(
            "{} failed: rate limit exceeded. Status: {}",
            op, status
        )),
        500..=599 => Error::timer_service(format!(
            "{} failed: server error (transient): {} - {}",
            op, status, body
        )),
        _ => Error::timer_service(format!("{} failed: {} - {}", op, status, body)),
    }
}

/// Extract the timer id from a `Location` header value
///
/// Accepts absolute URLs and paths, e.g. `http://host/timers/abc` or
/// `/timers/abc?x=1`.
fn timer_id_from_location(location: &str) -> Option<String> {
    let path = location.split(['?', '#']).next().unwrap_or_default();
    path.trim_end_matches('/')
        .rsplit('/')
        .next()
        .filter(|id| !id.is_empty() && *id != "timers")
        .map(str::to_string)
}

fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

#[async_trait]
impl TimerService for HttpTimerService {
    /// Create a timer
    ///
    /// ```http
    /// POST /timers
    /// ```
    async fn create(&self, request: &TimerRequest) -> Result<String> {
        let body = self.timer_body(request, now());
        tracing::debug!("Creating timer for {}: {}", request.aor_key, body);

        let response = self
            .send("create", self.client.post(self.timers_url()).json(&body))
            .await?;

        let location = response
            .headers()
            .get(reqwest::header::LOCATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| Error::timer_service("create response has no Location header"))?;

        let timer_id = timer_id_from_location(location).ok_or_else(|| {
            Error::timer_service(format!("create response has unusable Location: {}", location))
        })?;

        tracing::debug!("Timer service created timer {}", timer_id);
        Ok(timer_id)
    }

    /// Reschedule a timer
    ///
    /// ```http
    /// PUT /timers/:timer_id
    /// ```
    async fn update(&self, timer_id: &str, request: &TimerRequest) -> Result<()> {
        let body = self.timer_body(request, now());
        tracing::debug!("Updating timer {} for {}: {}", timer_id, request.aor_key, body);

        self.send("update", self.client.put(self.timer_url(timer_id)).json(&body))
            .await?;
        Ok(())
    }

    /// Delete a timer
    ///
    /// ```http
    /// DELETE /timers/:timer_id
    /// ```
    async fn delete(&self, timer_id: &str) -> Result<()> {
        tracing::debug!("Deleting timer {}", timer_id);

        self.send("delete", self.client.delete(self.timer_url(timer_id)))
            .await?;
        Ok(())
    }

    fn service_name(&self) -> &'static str {
        "http"
    }
}
