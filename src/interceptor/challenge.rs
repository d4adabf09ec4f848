//! Retrying bot-mitigation challenge pages.
//!
//! Some fronting proxies answer the first requests from a new client with a
//! challenge page (typically a 503 with recognizable markers) and serve the
//! real response only after a pause. [`ChallengeRetryInterceptor`] detects such
//! pages, waits, and proceeds again.

use crate::{headers::Headers, Chain, Interceptor, Response, Result};
use async_trait::async_trait;
use std::time::{Duration, SystemTime};

const DEFAULT_STATUS_CODES: &[u16] = &[403, 429, 503];

const DEFAULT_HEADER_MARKERS: &[&str] = &["cf-mitigated", "cf-chl-bypass"];

const DEFAULT_BODY_MARKERS: &[&str] = &[
    "Just a moment...",
    "Checking your browser",
    "cf-browser-verification",
    "challenge-platform",
    "DDoS protection by",
];

/// Waits and retries when a response looks like a challenge page.
///
/// A response is a challenge when its status is one of the configured codes
/// and it carries one of the header markers or its body contains one of the
/// body markers. After at most `max_retries` extra attempts, whatever came
/// back last is returned.
///
/// # Examples
///
/// ```
/// use callwire::{ChallengeRetryInterceptor, Client};
/// use std::time::Duration;
///
/// # fn example() -> Result<(), callwire::Error> {
/// let challenge = ChallengeRetryInterceptor::new(3, Duration::from_secs(5))
///     .body_marker("Please wait while we verify")
///     .honor_retry_after(Duration::from_secs(30));
///
/// let client = Client::builder().interceptor(challenge).build()?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct ChallengeRetryInterceptor {
    max_retries: usize,
    delay: Duration,
    status_codes: Vec<u16>,
    header_markers: Vec<String>,
    body_markers: Vec<String>,
    retry_after_cap: Option<Duration>,
}

impl ChallengeRetryInterceptor {
    pub fn new(max_retries: usize, delay: Duration) -> Self {
        Self {
            max_retries,
            delay,
            status_codes: DEFAULT_STATUS_CODES.to_vec(),
            header_markers: DEFAULT_HEADER_MARKERS.iter().map(|m| m.to_string()).collect(),
            body_markers: DEFAULT_BODY_MARKERS.iter().map(|m| m.to_string()).collect(),
            retry_after_cap: None,
        }
    }

    /// Replaces the status codes that may indicate a challenge.
    pub fn status_codes(mut self, codes: impl IntoIterator<Item = u16>) -> Self {
        self.status_codes = codes.into_iter().collect();
        self
    }

    /// Adds a header whose presence marks a challenge.
    pub fn header_marker(mut self, name: impl Into<String>) -> Self {
        self.header_markers.push(name.into());
        self
    }

    /// Adds a body fragment that marks a challenge.
    pub fn body_marker(mut self, marker: impl Into<String>) -> Self {
        self.body_markers.push(marker.into());
        self
    }

    /// Waits for the challenge's `Retry-After` (capped at `max_wait`) instead
    /// of the fixed delay when the header is present.
    pub fn honor_retry_after(mut self, max_wait: Duration) -> Self {
        self.retry_after_cap = Some(max_wait);
        self
    }

    /// Returns `true` if `response` looks like a challenge page.
    pub fn is_challenge(&self, response: &Response) -> bool {
        if !self.status_codes.contains(&response.code()) {
            return false;
        }
        if self
            .header_markers
            .iter()
            .any(|name| response.headers().contains(name))
        {
            return true;
        }
        let body = response.body().unwrap_or_default();
        self.body_markers.iter().any(|marker| body.contains(marker.as_str()))
    }

    fn delay_for(&self, response: &Response) -> Duration {
        match self.retry_after_cap {
            Some(cap) => parse_retry_after(response.headers())
                .map_or(self.delay, |retry_after| retry_after.min(cap)),
            None => self.delay,
        }
    }
}

#[async_trait]
impl Interceptor for ChallengeRetryInterceptor {
    async fn intercept(&self, chain: Chain) -> Result<Response> {
        let mut response = chain.proceed(chain.request().clone()).await?;
        let mut retries = 0;

        while retries < self.max_retries && self.is_challenge(&response) {
            retries += 1;
            let delay = self.delay_for(&response);
            tracing::info!(
                status = response.code(),
                attempt = retries,
                delay_ms = delay.as_millis() as u64,
                url = %chain.request().url(),
                "Challenge page detected - waiting before retry"
            );
            tokio::time::sleep(delay).await;
            response = chain.proceed(chain.request().clone()).await?;
        }

        if self.is_challenge(&response) {
            tracing::warn!(
                status = response.code(),
                attempts = retries + 1,
                "Challenge still present after retries"
            );
        }
        Ok(response)
    }
}

/// Parses the Retry-After header.
///
/// Supports both delay-seconds (integer) and HTTP-date formats.
fn parse_retry_after(headers: &Headers) -> Option<Duration> {
    let header = headers.get("retry-after")?.trim();

    if let Ok(seconds) = header.parse::<u64>() {
        return Some(Duration::from_secs(seconds));
    }

    let date_time = httpdate::parse_http_date(header).ok()?;
    date_time.duration_since(SystemTime::now()).ok()
}
