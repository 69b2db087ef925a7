use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use serde_json::Value;

use super::ProtocolHandler;
use crate::ast::Reference;
use crate::config::{HTTP_MAX_RETRIES, HTTP_RETRY_BASE_DELAY_MS, HTTP_TIMEOUT_SECS};
use crate::context::ProcessingContext;
use crate::error::{ProcessError, Result};

/// User agent string identifying the engine.
const USER_AGENT: &str = concat!("promptdoc-engine/", env!("CARGO_PKG_VERSION"));

/// Resolves `http:` and `https:` references.
///
/// JSON responses (by content type) are parsed; everything else is returned
/// as text. Transient failures are retried with exponential backoff; the
/// per-request timeout is the only cancellation mechanism.
#[derive(Debug, Clone)]
pub struct HttpProtocolHandler {
    client: Client,
    max_retries: u32,
    base_delay: Duration,
}

impl HttpProtocolHandler {
    /// Create a handler with a configured client.
    ///
    /// # Errors
    ///
    /// Returns `ProcessError::Http` if the client cannot be built.
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(HTTP_TIMEOUT_SECS))
            .user_agent(USER_AGENT)
            .build()?;
        Ok(Self::with_client(client))
    }

    pub fn with_client(client: Client) -> Self {
        Self {
            client,
            max_retries: HTTP_MAX_RETRIES,
            base_delay: Duration::from_millis(HTTP_RETRY_BASE_DELAY_MS),
        }
    }

    pub fn with_retry(mut self, max_retries: u32, base_delay: Duration) -> Self {
        self.max_retries = max_retries.max(1);
        self.base_delay = base_delay;
        self
    }

    /// Delay before retry number `attempt` (1-based), doubling each time.
    fn backoff_delay(&self, attempt: u32) -> Duration {
        let factor = 1u32
            .checked_shl(attempt.saturating_sub(1))
            .unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor)
    }

    async fn fetch(&self, url: &str) -> Result<Value> {
        let mut last_error: Option<String> = None;

        for attempt in 0..self.max_retries {
            if attempt > 0 {
                let delay = self.backoff_delay(attempt);
                tracing::debug!(attempt, delay_ms = delay.as_millis() as u64, "Retrying after delay");
                tokio::time::sleep(delay).await;
            }

            match self.client.get(url).send().await {
                Ok(response) => {
                    let status = response.status();
                    if status.is_server_error() {
                        tracing::warn!(
                            status = %status,
                            attempt = attempt + 1,
                            max_retries = self.max_retries,
                            "Server error, will retry"
                        );
                        last_error = Some(format!("Server error: {status}"));
                        continue;
                    }

                    // 4xx will not succeed on retry
                    let response = response.error_for_status()?;
                    let is_json = response
                        .headers()
                        .get(CONTENT_TYPE)
                        .and_then(|v| v.to_str().ok())
                        .is_some_and(|ct| ct.contains("json"));
                    let body = response.text().await?;
                    return if is_json {
                        Ok(serde_json::from_str(&body)?)
                    } else {
                        Ok(Value::String(body))
                    };
                }
                Err(e) if e.is_connect() || e.is_timeout() => {
                    tracing::warn!(
                        error = %e,
                        attempt = attempt + 1,
                        max_retries = self.max_retries,
                        "Connection error, will retry"
                    );
                    last_error = Some(e.to_string());
                }
                Err(e) => return Err(ProcessError::Http(e)),
            }
        }

        Err(ProcessError::RetriesExhausted {
            attempts: self.max_retries,
            message: last_error.unwrap_or_else(|| "Unknown error".to_string()),
        })
    }
}

#[async_trait]
impl ProtocolHandler for HttpProtocolHandler {
    fn name(&self) -> &str {
        "http"
    }

    fn can_handle(&self, protocol: &str) -> bool {
        matches!(protocol, "http" | "https")
    }

    async fn handle(&self, reference: &Reference, _context: &ProcessingContext) -> Result<Value> {
        let url = format!("{}://{}", reference.protocol, reference.path);
        tracing::debug!(url = %url, "Fetching remote reference");
        self.fetch(&url).await
    }
}
