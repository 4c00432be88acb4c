//! Retrying JSON POST shared by the embedding and chat clients.
//!
//! # Retry Strategy
//!
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors → retry
//! - Backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5)
//!
//! Every failure surfaces as [`Error::ExternalCallFailure`] so callers can
//! tell an unavailable collaborator apart from a local fault.

use std::time::Duration;

use anyhow::Result;
use visa_assist_core::Error;

/// Delay before retry number `attempt` (1-based).
pub fn backoff_delay(attempt: u32) -> Duration {
    Duration::from_secs(1 << attempt.saturating_sub(1).min(5))
}

/// POST `body` as JSON, retrying transient failures, and parse the JSON reply.
///
/// `build` is called once per attempt and must return a fresh request.
pub async fn post_json_with_retry<F>(
    service: &str,
    max_retries: u32,
    build: F,
    body: &serde_json::Value,
) -> Result<serde_json::Value>
where
    F: Fn() -> reqwest::RequestBuilder,
{
    let failure = |attempts: u32, message: String| Error::ExternalCallFailure {
        service: service.to_string(),
        attempts,
        message,
    };

    let mut last_err = String::from("no attempt made");

    for attempt in 0..=max_retries {
        if attempt > 0 {
            let delay = backoff_delay(attempt);
            tracing::debug!(service, attempt, delay_secs = delay.as_secs(), "retrying");
            tokio::time::sleep(delay).await;
        }

        let resp = build()
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await;

        match resp {
            Ok(response) => {
                let status = response.status();

                if status.is_success() {
                    return response
                        .json::<serde_json::Value>()
                        .await
                        .map_err(|e| failure(attempt + 1, format!("invalid JSON reply: {}", e)).into());
                }

                let body_text = response.text().await.unwrap_or_default();

                // Rate limited or server error
                if status.as_u16() == 429 || status.is_server_error() {
                    last_err = format!("{} API error {}: {}", service, status, body_text);
                    tracing::warn!(service, %status, attempt, "transient API error");
                    continue;
                }

                return Err(failure(
                    attempt + 1,
                    format!("{} API error {}: {}", service, status, body_text),
                )
                .into());
            }
            Err(e) => {
                last_err = format!("{} connection error: {}", service, e);
                tracing::warn!(service, attempt, error = %e, "request failed");
                continue;
            }
        }
    }

    Err(failure(max_retries + 1, last_err).into())
}
