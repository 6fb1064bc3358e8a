use anyhow::Context;
use giternity_core::error::ListingError;
use reqwest::StatusCode;
use reqwest::header::HeaderMap;
use reqwest::{RequestBuilder, Response};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{debug, warn};

const MAX_ATTEMPTS: u32 = 3;
const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(1);
const MAX_RETRY_DELAY: Duration = Duration::from_secs(60);

/// Sends the request built by `build`, retrying throttled responses.
///
/// Statuses in `allowed` are returned to the caller like successes. A
/// throttled response that outlives the retries becomes
/// [`ListingError::RateLimited`].
pub(crate) async fn send_with_retry<F>(
    mut build: F,
    allowed: &[StatusCode],
) -> Result<Response, ListingError>
where
    F: FnMut() -> anyhow::Result<RequestBuilder>,
{
    for attempt in 1..=MAX_ATTEMPTS {
        let response = build()?.send().await.context("send request")?;
        let status = response.status();
        if status.is_success() || allowed.contains(&status) {
            return Ok(response);
        }
        if !is_throttled(status, response.headers()) {
            let err = response
                .error_for_status()
                .err()
                .map(anyhow::Error::from)
                .unwrap_or_else(|| anyhow::anyhow!("unexpected status {status}"));
            return Err(ListingError::Other(err));
        }
        if attempt == MAX_ATTEMPTS {
            warn!(status = %status, attempts = attempt, "remote api still throttling");
            return Err(ListingError::RateLimited);
        }
        let delay = retry_delay_from_headers(response.headers())
            .unwrap_or(DEFAULT_RETRY_DELAY)
            .min(MAX_RETRY_DELAY);
        let _ = response.bytes().await;
        debug!(status = %status, attempt, delay_secs = delay.as_secs(), "retrying request");
        tokio::time::sleep(delay).await;
    }
    Err(ListingError::RateLimited)
}

fn is_throttled(status: StatusCode, headers: &HeaderMap) -> bool {
    match status {
        StatusCode::TOO_MANY_REQUESTS | StatusCode::SERVICE_UNAVAILABLE => true,
        StatusCode::FORBIDDEN => ratelimit_exhausted(headers),
        _ => false,
    }
}

fn ratelimit_exhausted(headers: &HeaderMap) -> bool {
    headers
        .get("x-ratelimit-remaining")
        .and_then(|value| value.to_str().ok())
        .map(|value| value.trim() == "0")
        .unwrap_or(false)
}

fn retry_delay_from_headers(headers: &HeaderMap) -> Option<Duration> {
    if let Some(delay) = retry_after_seconds(headers) {
        return Some(Duration::from_secs(delay));
    }
    ratelimit_reset_seconds(headers).map(Duration::from_secs)
}

fn retry_after_seconds(headers: &HeaderMap) -> Option<u64> {
    headers
        .get("retry-after")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<u64>().ok())
}

fn ratelimit_reset_seconds(headers: &HeaderMap) -> Option<u64> {
    let reset = headers
        .get("x-ratelimit-reset")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<u64>().ok())?;
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();
    if reset <= now { None } else { Some(reset - now) }
}
