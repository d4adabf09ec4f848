use crate::{Chain, Interceptor, Response, Result};
use async_trait::async_trait;
use std::time::Instant;

/// How much of each exchange [`LoggingInterceptor`] records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum LogLevel {
    /// Method, URL, status and timing.
    #[default]
    Basic,
    /// Also request and response headers.
    Headers,
    /// Also request and response bodies.
    Body,
}

/// Emits `tracing` events for each request and its outcome.
///
/// Values of sensitive headers (`Authorization`, `Cookie`, ... ) are replaced
/// with `██` before they are logged.
///
/// # Examples
///
/// ```
/// use callwire::{Client, LogLevel, LoggingInterceptor};
///
/// # fn example() -> Result<(), callwire::Error> {
/// let client = Client::builder()
///     .interceptor(LoggingInterceptor::new(LogLevel::Headers).redact_header("X-Api-Key"))
///     .build()?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct LoggingInterceptor {
    level: LogLevel,
    redacted: Vec<String>,
}

impl Default for LoggingInterceptor {
    fn default() -> Self {
        Self::new(LogLevel::Basic)
    }
}

impl LoggingInterceptor {
    pub fn new(level: LogLevel) -> Self {
        Self {
            level,
            redacted: vec![
                "authorization".to_string(),
                "proxy-authorization".to_string(),
                "cookie".to_string(),
                "set-cookie".to_string(),
            ],
        }
    }

    /// Hides the value of `name` in logged headers.
    pub fn redact_header(mut self, name: impl Into<String>) -> Self {
        self.redacted.push(name.into());
        self
    }

    fn render_headers<'a>(&self, headers: impl Iterator<Item = (&'a str, &'a str)>) -> String {
        headers
            .map(|(name, value)| {
                let value = if self.redacted.iter().any(|r| r.eq_ignore_ascii_case(name)) {
                    "██"
                } else {
                    value
                };
                format!("{}: {}", name, value)
            })
            .collect::<Vec<_>>()
            .join(", ")
    }
}

#[async_trait]
impl Interceptor for LoggingInterceptor {
    async fn intercept(&self, chain: Chain) -> Result<Response> {
        let request = chain.request().clone();
        let method = request.method();
        let url = request.url().clone();

        tracing::info!(
            method = %method,
            url = %url,
            tag = request.tag().unwrap_or_default(),
            "--> Sending request"
        );
        if self.level >= LogLevel::Headers {
            tracing::debug!(
                headers = %self.render_headers(request.headers().iter()),
                "--> Request headers"
            );
        }
        if self.level >= LogLevel::Body {
            if let Some(body) = request.body() {
                tracing::debug!(
                    bytes = body.len(),
                    body = %String::from_utf8_lossy(body.as_bytes()),
                    "--> Request body"
                );
            }
        }

        let started = Instant::now();
        let result = chain.proceed(request).await;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        match &result {
            Ok(response) => {
                tracing::info!(
                    method = %method,
                    url = %url,
                    status = response.code(),
                    elapsed_ms = elapsed_ms,
                    "<-- Received response"
                );
                if self.level >= LogLevel::Headers {
                    tracing::debug!(
                        headers = %self.render_headers(response.headers().iter()),
                        "<-- Response headers"
                    );
                }
                if self.level >= LogLevel::Body {
                    tracing::debug!(
                        body = response.body().unwrap_or_default(),
                        "<-- Response body"
                    );
                }
            }
            Err(e) => {
                tracing::warn!(
                    method = %method,
                    url = %url,
                    kind = %e.kind(),
                    error = %e,
                    elapsed_ms = elapsed_ms,
                    "<-- Request failed"
                );
            }
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sensitive_headers_are_redacted() {
        let interceptor = LoggingInterceptor::new(LogLevel::Headers).redact_header("X-Api-Key");
        let rendered = interceptor.render_headers(
            [
                ("Authorization", "Bearer secret"),
                ("x-api-key", "k"),
                ("Accept", "*/*"),
            ]
            .into_iter(),
        );
        assert_eq!(rendered, "Authorization: ██, x-api-key: ██, Accept: */*");
    }
}
