//! Immutable response model.
//!
//! A [`Response`] is produced once per completed exchange and never changes.
//! Responses served from the cache are snapshots and may be handed to any
//! number of readers.

use crate::{headers::Headers, request::Request, Error, ErrorKind, Result};
use serde::de::DeserializeOwned;
use std::fmt;
use std::time::Duration;

/// The outcome of an HTTP exchange.
///
/// The `successful` flag is fixed when the response is built and is not
/// derived from the status code alone, so a response can model a domain-level
/// success or failure independently. [`Response::is_ok`] combines both.
///
/// # Examples
///
/// ```no_run
/// use callwire::Client;
/// use serde::Deserialize;
///
/// #[derive(Deserialize)]
/// struct User {
///     id: u64,
///     name: String,
/// }
///
/// # fn example() -> Result<(), callwire::Error> {
/// let client = Client::builder().build()?;
/// let response = client
///     .get("https://api.example.com/users/123")
///     .build()?
///     .new_call()
///     .execute()?;
///
/// if response.is_ok() {
///     let user: User = response.json()?;
///     println!("{} took {}ms", user.name, response.elapsed_ms());
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Response {
    code: u16,
    message: String,
    headers: Headers,
    body: Option<String>,
    elapsed_ms: u64,
    request: Request,
    successful: bool,
}

impl Response {
    /// Starts a builder for a response the caller considers successful.
    pub fn success(request: Request) -> ResponseBuilder {
        ResponseBuilder::new(request, true)
    }

    /// Starts a builder for a response the caller considers failed.
    pub fn failure(request: Request) -> ResponseBuilder {
        ResponseBuilder::new(request, false)
    }

    /// The numeric status code, `0` if none was set.
    pub fn code(&self) -> u16 {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Returns a header value, ignoring the case of `name`.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)
    }

    /// The body text, `None` if the body was empty.
    pub fn body(&self) -> Option<&str> {
        self.body.as_deref()
    }

    /// Time from sending the request to receiving the full body.
    pub fn elapsed_ms(&self) -> u64 {
        self.elapsed_ms
    }

    pub fn elapsed(&self) -> Duration {
        Duration::from_millis(self.elapsed_ms)
    }

    /// The request this response answers.
    pub fn request(&self) -> &Request {
        &self.request
    }

    pub fn is_successful(&self) -> bool {
        self.successful
    }

    /// Returns `true` if the response is successful and carries a 2xx code.
    pub fn is_ok(&self) -> bool {
        self.successful && (200..300).contains(&self.code)
    }

    /// Deserializes the body as JSON.
    ///
    /// # Errors
    ///
    /// Returns an [`ErrorKind::ResponseParsing`] error if the body is absent or
    /// does not match `T`.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        let body = self.body.as_deref().unwrap_or_default();
        serde_json::from_str(body).map_err(|e| {
            tracing::error!(
                error = %e,
                raw_response = %body,
                "Failed to deserialize response"
            );
            Error::new(
                ErrorKind::ResponseParsing,
                format!("failed to deserialize response (status {}): {}", self.code, e),
            )
            .with_request(self.request.method(), self.request.url().as_str())
            .with_source(e)
        })
    }

    /// Captures everything except the owning request.
    pub(crate) fn snapshot(&self) -> Snapshot {
        Snapshot {
            code: self.code,
            message: self.message.clone(),
            headers: self.headers.clone(),
            body: self.body.clone(),
            elapsed_ms: self.elapsed_ms,
            successful: self.successful,
        }
    }
}

/// A response detached from its request, as kept by the cache.
#[derive(Clone)]
pub(crate) struct Snapshot {
    code: u16,
    message: String,
    headers: Headers,
    body: Option<String>,
    elapsed_ms: u64,
    successful: bool,
}

impl Snapshot {
    pub(crate) fn bind(&self, request: Request) -> Response {
        Response {
            code: self.code,
            message: self.message.clone(),
            headers: self.headers.clone(),
            body: self.body.clone(),
            elapsed_ms: self.elapsed_ms,
            request,
            successful: self.successful,
        }
    }
}

impl fmt::Debug for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Response")
            .field("code", &self.code)
            .field("message", &self.message)
            .field("headers", &self.headers)
            .field("body", &self.body)
            .field("elapsed_ms", &self.elapsed_ms)
            .field("successful", &self.successful)
            .field("url", &self.request.url().as_str())
            .finish()
    }
}

/// Builder for [`Response`], created by [`Response::success`] or
/// [`Response::failure`].
#[must_use]
pub struct ResponseBuilder {
    request: Request,
    successful: bool,
    code: u16,
    message: String,
    headers: Headers,
    body: Option<String>,
    elapsed_ms: u64,
}

impl ResponseBuilder {
    fn new(request: Request, successful: bool) -> Self {
        Self {
            request,
            successful,
            code: 0,
            message: String::new(),
            headers: Headers::new(),
            body: None,
            elapsed_ms: 0,
        }
    }

    pub fn code(mut self, code: u16) -> Self {
        self.code = code;
        self
    }

    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn headers(mut self, headers: Headers) -> Self {
        self.headers = headers;
        self
    }

    /// Sets the body; an empty string is stored as no body.
    pub fn body(mut self, body: impl Into<String>) -> Self {
        let body = body.into();
        self.body = if body.is_empty() { None } else { Some(body) };
        self
    }

    pub fn elapsed_ms(mut self, elapsed_ms: u64) -> Self {
        self.elapsed_ms = elapsed_ms;
        self
    }

    pub fn build(self) -> Response {
        Response {
            code: self.code,
            message: self.message,
            headers: self.headers,
            body: self.body,
            elapsed_ms: self.elapsed_ms,
            request: self.request,
            successful: self.successful,
        }
    }
}
