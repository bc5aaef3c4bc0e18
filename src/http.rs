//! JSON-over-HTTP with retry and backoff, shared by the embedding and
//! completion backends.
//!
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors → retry
//! - Backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5)

use std::time::Duration;

use tracing::{debug, warn};

pub(crate) fn build_client(timeout_secs: u64) -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
}

/// POST `body` to `url` and parse the JSON response.
///
/// `service` names the backend in error messages (`"Ollama"`, `"OpenAI"`).
/// Errors are returned as display strings; callers wrap them in their own
/// error type.
pub(crate) async fn post_json(
    client: &reqwest::Client,
    url: &str,
    bearer: Option<&str>,
    body: &serde_json::Value,
    max_retries: u32,
    service: &str,
) -> Result<serde_json::Value, String> {
    let mut last_err = None;

    for attempt in 0..=max_retries {
        if attempt > 0 {
            let delay = Duration::from_secs(1 << (attempt - 1).min(5));
            debug!(service, attempt, delay_secs = delay.as_secs(), "retrying request");
            tokio::time::sleep(delay).await;
        }

        let mut request = client
            .post(url)
            .header("Content-Type", "application/json")
            .json(body);
        if let Some(token) = bearer {
            request = request.header("Authorization", format!("Bearer {}", token));
        }

        match request.send().await {
            Ok(response) => {
                let status = response.status();

                if status.is_success() {
                    return response
                        .json::<serde_json::Value>()
                        .await
                        .map_err(|e| format!("{} returned invalid JSON: {}", service, e));
                }

                let body_text = response.text().await.unwrap_or_default();
                if status.as_u16() == 429 || status.is_server_error() {
                    warn!(service, %status, attempt, "transient API error");
                    last_err = Some(format!("{} API error {}: {}", service, status, body_text));
                    continue;
                }

                return Err(format!("{} API error {}: {}", service, status, body_text));
            }
            Err(e) => {
                warn!(service, attempt, error = %e, "connection error");
                last_err = Some(format!(
                    "{} connection error (is it reachable at {}?): {}",
                    service, url, e
                ));
                continue;
            }
        }
    }

    Err(last_err.unwrap_or_else(|| format!("{} request failed after retries", service)))
}
