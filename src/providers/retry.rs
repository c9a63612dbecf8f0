//! Retry with exponential backoff for provider HTTP calls
//!
//! Used by the request/response clients (chat, transcription, speech).
//! The streaming TTS relay has its own retry rules in `voice::relay`.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::{RequestBuilder, Response};

/// Retry policy for provider HTTP calls
///
/// Controls how many times a failed request is retried and how
/// long to wait between attempts using exponential backoff.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of retry attempts
    pub max_retries: u32,
    /// Base delay between retries (doubles each attempt)
    pub base_delay: Duration,
    /// Maximum delay cap
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
        }
    }
}

impl RetryPolicy {
    /// Policy with the given retry count and default delays
    #[must_use]
    pub fn with_max_retries(max_retries: u32) -> Self {
        Self {
            max_retries,
            ..Self::default()
        }
    }

    /// Wait before the retry following failed `attempt` (zero-based)
    ///
    /// A provider `Retry-After` is taken as given; otherwise `base_delay`
    /// doubles per attempt plus up to a quarter of jitter. Either way the
    /// wait never exceeds `max_delay`.
    #[must_use]
    pub fn backoff(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
        let wait = retry_after.unwrap_or_else(|| {
            let doubled = self
                .base_delay
                .saturating_mul(1u32.checked_shl(attempt).unwrap_or(u32::MAX));
            doubled.saturating_add(quarter_jitter(doubled))
        });

        wait.min(self.max_delay)
    }
}

/// Between zero and a quarter of `span`, seeded from the clock
fn quarter_jitter(span: Duration) -> Duration {
    let seed = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.subsec_nanos() % 1000);

    span / 4 * seed / 1000
}

/// Whether an HTTP status is worth retrying: rate limits, timeouts and
/// server errors
#[must_use]
pub fn is_recoverable(status: u16) -> bool {
    matches!(status, 408 | 409 | 429) || (500..600).contains(&status)
}

/// Read a `Retry-After` header given in whole seconds
#[must_use]
pub fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    let secs = headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()?;

    Some(Duration::from_secs(secs))
}

/// Send a request, retrying transient failures according to `policy`
///
/// `build` is called once per attempt because request bodies (multipart
/// forms in particular) cannot be replayed. Non-recoverable statuses are
/// returned to the caller untouched.
///
/// # Errors
///
/// Returns the transport error of the last attempt
pub async fn send_with_retry<F>(
    policy: &RetryPolicy,
    provider: &'static str,
    mut build: F,
) -> Result<Response, reqwest::Error>
where
    F: FnMut() -> RequestBuilder,
{
    let mut attempt = 0;
    loop {
        match build().send().await {
            Ok(response)
                if attempt < policy.max_retries && is_recoverable(response.status().as_u16()) =>
            {
                let delay = policy.backoff(attempt, parse_retry_after(response.headers()));
                tracing::warn!(
                    provider,
                    status = %response.status(),
                    attempt = attempt + 1,
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    "provider request failed, retrying"
                );
                tokio::time::sleep(delay).await;
            }
            Ok(response) => return Ok(response),
            Err(e) if attempt < policy.max_retries && (e.is_timeout() || e.is_connect()) => {
                let delay = policy.backoff(attempt, None);
                tracing::warn!(
                    provider,
                    error = %e,
                    attempt = attempt + 1,
                    "provider unreachable, retrying"
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
        attempt += 1;
    }
}
