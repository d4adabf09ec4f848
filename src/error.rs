//! Error types for HTTP calls.
//!
//! Every failure that leaves the pipeline is an [`Error`] carrying one
//! [`ErrorKind`] from a closed set, the underlying cause (if any) and the
//! method/URL of the request that produced it. Low-level transport errors are
//! classified by [`crate::mapper`] before they get here, so callers never see a
//! raw `reqwest::Error` or `std::io::Error`.

use crate::request::Method;
use std::error::Error as StdError;
use std::fmt;

/// A boxed, thread-safe error used as the cause of an [`Error`].
pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// The closed set of failure categories.
///
/// # Examples
///
/// ```
/// use callwire::{Error, ErrorKind};
///
/// let err = Error::new(ErrorKind::ConnectionRefused, "connection refused");
/// assert!(err.is_transport());
/// assert!(!Error::canceled().is_transport());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ErrorKind {
    /// The remote host actively refused the connection.
    ConnectionRefused,
    /// Establishing the connection took longer than the connect timeout.
    ConnectionTimeout,
    /// The connection was established but the response did not arrive in time.
    ReadTimeout,
    /// The TLS handshake failed (bad certificate, protocol mismatch, ...).
    SslHandshakeFailed,
    /// DNS resolution failed or the host/network is unreachable.
    NetworkUnavailable,
    /// The peer violated the HTTP protocol (bad framing, redirect loop, ...).
    HttpProtocol,
    /// The response body could not be read or decoded.
    ResponseParsing,
    /// The request or client configuration is invalid.
    RequestBuild,
    /// Any other I/O failure.
    Io,
    /// The operation was interrupted, e.g. the dispatcher was shut down.
    Interrupted,
    /// The connection pool has no capacity left for the route.
    PoolExhausted,
    /// The call was already executed or enqueued.
    AlreadyExecuted,
    /// The call was canceled.
    Canceled,
    /// The failure could not be classified.
    Unknown,
}

impl ErrorKind {
    /// Returns a short, stable name for the kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::ConnectionRefused => "connection refused",
            ErrorKind::ConnectionTimeout => "connection timeout",
            ErrorKind::ReadTimeout => "read timeout",
            ErrorKind::SslHandshakeFailed => "ssl handshake failed",
            ErrorKind::NetworkUnavailable => "network unavailable",
            ErrorKind::HttpProtocol => "http protocol error",
            ErrorKind::ResponseParsing => "response parsing error",
            ErrorKind::RequestBuild => "request build error",
            ErrorKind::Io => "io error",
            ErrorKind::Interrupted => "interrupted",
            ErrorKind::PoolExhausted => "pool exhausted",
            ErrorKind::AlreadyExecuted => "already executed",
            ErrorKind::Canceled => "canceled",
            ErrorKind::Unknown => "unknown error",
        }
    }

    /// Returns `true` for failures raised by the transport while talking to
    /// the remote host.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            ErrorKind::ConnectionRefused
                | ErrorKind::ConnectionTimeout
                | ErrorKind::ReadTimeout
                | ErrorKind::SslHandshakeFailed
                | ErrorKind::NetworkUnavailable
                | ErrorKind::HttpProtocol
                | ErrorKind::Io
                | ErrorKind::Unknown
        )
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The error type for every fallible operation in this crate.
///
/// # Examples
///
/// ```no_run
/// use callwire::{Client, ErrorKind};
///
/// # fn example() -> Result<(), callwire::Error> {
/// let client = Client::builder().build()?;
/// let request = client.get("http://localhost:1/").build()?;
///
/// match request.new_call().execute() {
///     Ok(response) => println!("status {}", response.code()),
///     Err(e) if e.kind() == ErrorKind::ConnectionRefused => {
///         eprintln!("nobody listening at {}", e.url().unwrap_or("?"));
///     }
///     Err(e) => eprintln!("call failed: {}", e),
/// }
/// # Ok(())
/// # }
/// ```
#[derive(thiserror::Error, Debug)]
#[error("{kind}: {message}{}", location(.method, .url))]
pub struct Error {
    kind: ErrorKind,
    message: String,
    method: Option<Method>,
    url: Option<String>,
    #[source]
    source: Option<BoxError>,
}

fn location(method: &Option<Method>, url: &Option<String>) -> String {
    match (method, url) {
        (Some(method), Some(url)) => format!(" ({} {})", method, url),
        (None, Some(url)) => format!(" ({})", url),
        _ => String::new(),
    }
}

impl Error {
    /// Creates an error of the given kind with a message and no cause.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            method: None,
            url: None,
            source: None,
        }
    }

    /// Attaches the method and URL of the request that failed.
    pub fn with_request(mut self, method: Method, url: impl Into<String>) -> Self {
        self.method = Some(method);
        self.url = Some(url.into());
        self
    }

    /// Attaches the underlying cause.
    pub fn with_source(mut self, source: impl Into<BoxError>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub(crate) fn request_build(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::RequestBuild, message)
    }

    /// The error raised when a call is canceled.
    pub fn canceled() -> Self {
        Self::new(ErrorKind::Canceled, "call was canceled")
    }

    pub(crate) fn already_executed() -> Self {
        Self::new(ErrorKind::AlreadyExecuted, "call has already been executed")
    }

    /// The classified failure category.
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// The human readable message.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// The method of the failed request, if known.
    pub fn method(&self) -> Option<Method> {
        self.method
    }

    /// The URL of the failed request, if known.
    pub fn url(&self) -> Option<&str> {
        self.url.as_deref()
    }

    /// Returns `true` if this is a transport failure (see
    /// [`ErrorKind::is_transport`]).
    pub fn is_transport(&self) -> bool {
        self.kind.is_transport()
    }

    /// Returns `true` if the call was canceled.
    pub fn is_canceled(&self) -> bool {
        self.kind == ErrorKind::Canceled
    }

    /// Returns `true` if retrying the same request may succeed.
    ///
    /// Connection problems and timeouts are retryable. Configuration,
    /// parsing, state and cancellation errors are not.
    pub fn is_retryable(&self) -> bool {
        match self.kind {
            ErrorKind::ConnectionRefused
            | ErrorKind::ConnectionTimeout
            | ErrorKind::ReadTimeout
            | ErrorKind::NetworkUnavailable
            | ErrorKind::Io
            | ErrorKind::Unknown => true,
            ErrorKind::SslHandshakeFailed
            | ErrorKind::HttpProtocol
            | ErrorKind::ResponseParsing
            | ErrorKind::RequestBuild
            | ErrorKind::Interrupted
            | ErrorKind::PoolExhausted
            | ErrorKind::AlreadyExecuted
            | ErrorKind::Canceled => false,
        }
    }
}

/// A specialized `Result` type for HTTP calls.
///
/// This is a convenience alias for `Result<T, Error>`.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn display_includes_request_location() {
        let err = Error::new(ErrorKind::ReadTimeout, "no response within 5s")
            .with_request(Method::Get, "https://example.test/data");
        assert_eq!(
            err.to_string(),
            "read timeout: no response within 5s (GET https://example.test/data)"
        );
    }

    #[test]
    fn source_is_preserved() {
        let cause = io::Error::new(io::ErrorKind::BrokenPipe, "pipe closed");
        let err = Error::new(ErrorKind::Io, "write failed").with_source(cause);
        let source = err.source().map(|s| s.to_string());
        assert_eq!(source.as_deref(), Some("pipe closed"));
    }

    #[test]
    fn cancellation_is_distinct_from_io() {
        let canceled = Error::canceled();
        assert!(canceled.is_canceled());
        assert!(!canceled.is_transport());
        assert!(!canceled.is_retryable());

        let io = Error::new(ErrorKind::Io, "reset");
        assert!(!io.is_canceled());
        assert!(io.is_retryable());
    }
}
