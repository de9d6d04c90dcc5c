//! Provider API clients.
//!
//! Direct HTTP via reqwest against the third-party services the hub
//! fronts. One module per provider:
//! - telnyx: SMS send + webhook payload types
//! - twilio: call-status webhook types + TwiML acknowledgement
//! - signwell: document lifecycle webhook types
//! - resend: transactional email send
//! - stripe: checkout setup sessions + payment method listing
//! - crm: conversation / call-transcript sync source

pub mod crm;
pub mod resend;
pub mod signwell;
pub mod stripe;
pub mod telnyx;
pub mod twilio;

use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("HTTP: {0}")]
    Http(#[from] reqwest::Error),
    #[error("{0} is not configured")]
    NotConfigured(&'static str),
    #[error("API error {status}: {message}")]
    Api { status: u16, message: String },
    #[error("Unexpected response shape: {0}")]
    BadResponse(String),
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 250,
            max_backoff_ms: 2_000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RetryDecision {
    Retryable,
    NonRetryable,
}

fn retry_decision_for_status(status: reqwest::StatusCode) -> RetryDecision {
    if status == reqwest::StatusCode::TOO_MANY_REQUESTS
        || status == reqwest::StatusCode::REQUEST_TIMEOUT
        || status.is_server_error()
    {
        RetryDecision::Retryable
    } else {
        RetryDecision::NonRetryable
    }
}

fn retry_delay(
    attempt: u32,
    policy: &RetryPolicy,
    retry_after: Option<&reqwest::header::HeaderValue>,
) -> Duration {
    if let Some(value) = retry_after.and_then(|v| v.to_str().ok()) {
        if let Ok(secs) = value.parse::<u64>() {
            return Duration::from_secs(secs.min(30));
        }
    }

    let exponent = 2u64.saturating_pow(attempt.saturating_sub(1));
    let base = policy
        .initial_backoff_ms
        .saturating_mul(exponent)
        .min(policy.max_backoff_ms);
    let jitter = (std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.subsec_nanos() as u64)
        .unwrap_or(0))
        % 150;
    Duration::from_millis(base.saturating_add(jitter))
}

/// Send a request, retrying on 408/429/5xx and transport errors.
pub async fn send_with_retry(
    request: reqwest::RequestBuilder,
    policy: &RetryPolicy,
) -> Result<reqwest::Response, ProviderError> {
    let attempts = policy.max_attempts.max(1);
    for attempt in 1..=attempts {
        let Some(cloned) = request.try_clone() else {
            return request.send().await.map_err(ProviderError::Http);
        };

        match cloned.send().await {
            Ok(response) => {
                let status = response.status();
                let decision = retry_decision_for_status(status);
                if decision == RetryDecision::Retryable && attempt < attempts {
                    let delay = retry_delay(
                        attempt,
                        policy,
                        response.headers().get(reqwest::header::RETRY_AFTER),
                    );
                    log::warn!(
                        "provider retry {}/{} after status {} (sleep {:?})",
                        attempt,
                        attempts,
                        status,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    continue;
                }
                return Ok(response);
            }
            Err(err) => {
                let retryable_transport = err.is_timeout() || err.is_connect();
                if retryable_transport && attempt < attempts {
                    let delay = retry_delay(attempt, policy, None);
                    log::warn!(
                        "provider retry {}/{} after transport error: {} (sleep {:?})",
                        attempt,
                        attempts,
                        err,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    continue;
                }
                return Err(ProviderError::Http(err));
            }
        }
    }

    Err(ProviderError::BadResponse(
        "request exhausted retries".to_string(),
    ))
}

/// Turn a non-2xx response into `ProviderError::Api` with its body text.
pub async fn error_for_response(response: reqwest::Response) -> ProviderError {
    let status = response.status().as_u16();
    let message = response.text().await.unwrap_or_default();
    ProviderError::Api { status, message }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_decision() {
        assert_eq!(
            retry_decision_for_status(reqwest::StatusCode::TOO_MANY_REQUESTS),
            RetryDecision::Retryable
        );
        assert_eq!(
            retry_decision_for_status(reqwest::StatusCode::BAD_GATEWAY),
            RetryDecision::Retryable
        );
        assert_eq!(
            retry_decision_for_status(reqwest::StatusCode::BAD_REQUEST),
            RetryDecision::NonRetryable
        );
        assert_eq!(
            retry_decision_for_status(reqwest::StatusCode::UNAUTHORIZED),
            RetryDecision::NonRetryable
        );
    }

    #[test]
    fn test_retry_delay_honors_retry_after() {
        let policy = RetryPolicy::default();
        let header = reqwest::header::HeaderValue::from_static("3");
        assert_eq!(retry_delay(1, &policy, Some(&header)), Duration::from_secs(3));

        // Retry-After is capped so a hostile header can't stall the loop
        let header = reqwest::header::HeaderValue::from_static("9999");
        assert_eq!(retry_delay(1, &policy, Some(&header)), Duration::from_secs(30));
    }

    #[test]
    fn test_retry_delay_backs_off() {
        let policy = RetryPolicy {
            max_attempts: 3,
            initial_backoff_ms: 100,
            max_backoff_ms: 1_000,
        };
        let first = retry_delay(1, &policy, None);
        let third = retry_delay(3, &policy, None);
        assert!(first < Duration::from_millis(300));
        assert!(third >= Duration::from_millis(400));
        assert!(third <= Duration::from_millis(1_150));
    }
}
