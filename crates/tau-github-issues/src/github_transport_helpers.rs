//! Retry policy and error-text helpers shared by the REST clients.

use std::time::Duration;

const MAX_RETRY_DELAY_MS: u64 = 30_000;

pub fn parse_retry_after(headers: &reqwest::header::HeaderMap) -> Option<Duration> {
    let raw = headers.get("retry-after")?.to_str().ok()?;
    let trimmed = raw.trim();
    if let Ok(seconds) = trimmed.parse::<u64>() {
        return Some(Duration::from_secs(seconds));
    }
    // Discord reports fractional seconds.
    let seconds = trimmed.parse::<f64>().ok()?;
    if !seconds.is_finite() || seconds < 0.0 {
        return None;
    }
    Some(Duration::from_millis((seconds * 1_000.0).ceil() as u64))
}

/// Honors `retry-after` when present, otherwise backs off exponentially from the base delay.
pub fn retry_delay(base_delay_ms: u64, attempt: usize, retry_after: Option<Duration>) -> Duration {
    if let Some(delay) = retry_after {
        return delay.max(Duration::from_millis(base_delay_ms));
    }
    let exponent = attempt.saturating_sub(1).min(10) as u32;
    let scaled = base_delay_ms.saturating_mul(2_u64.saturating_pow(exponent));
    Duration::from_millis(scaled.min(MAX_RETRY_DELAY_MS))
}

pub fn is_retryable_transport_error(error: &reqwest::Error) -> bool {
    error.is_timeout() || error.is_connect() || error.is_request()
}

pub fn is_retryable_github_status(status: u16) -> bool {
    status == 429 || status >= 500
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Which failures a request may be re-sent after.
pub enum RetryPolicy {
    /// Reads and PATCH/PUT/DELETE: repeating the request converges on the same state.
    Idempotent,
    /// Resource creation: a 5xx or timeout may follow a successful create, so only rate
    /// limits and connection failures, where the server never took the request, are retried.
    CreateOnce,
}

impl RetryPolicy {
    pub fn retries_status(self, status: u16) -> bool {
        match self {
            Self::Idempotent => is_retryable_github_status(status),
            Self::CreateOnce => status == 429,
        }
    }

    pub fn retries_transport_error(self, error: &reqwest::Error) -> bool {
        match self {
            Self::Idempotent => is_retryable_transport_error(error),
            Self::CreateOnce => error.is_connect(),
        }
    }
}

pub fn truncate_for_error(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut truncated = text.chars().take(max_chars).collect::<String>();
    truncated.push_str("...");
    truncated
}
