//! Immutable request model and its builder.
//!
//! A [`Request`] is created by a [`RequestBuilder`] obtained from a
//! [`Client`], and never changes afterwards. To derive a modified request, call
//! [`Request::to_builder`], adjust the copy and build it again; the original is
//! left untouched.

use crate::{call::Call, client::Client, headers::Headers, Error, Result};
use serde::Serialize;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use url::Url;

/// The fixed set of HTTP verbs a request may use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Method {
    #[default]
    Get,
    Head,
    Post,
    Put,
    Delete,
    Patch,
    Options,
    Trace,
    Connect,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Head => "HEAD",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
            Method::Patch => "PATCH",
            Method::Options => "OPTIONS",
            Method::Trace => "TRACE",
            Method::Connect => "CONNECT",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Method {
    type Err = Error;

    /// Parses a verb, ignoring case.
    fn from_str(s: &str) -> Result<Self> {
        let method = match s.trim().to_ascii_uppercase().as_str() {
            "GET" => Method::Get,
            "HEAD" => Method::Head,
            "POST" => Method::Post,
            "PUT" => Method::Put,
            "DELETE" => Method::Delete,
            "PATCH" => Method::Patch,
            "OPTIONS" => Method::Options,
            "TRACE" => Method::Trace,
            "CONNECT" => Method::Connect,
            other => {
                return Err(Error::request_build(format!(
                    "unsupported HTTP method `{}`",
                    other
                )))
            }
        };
        Ok(method)
    }
}

impl From<Method> for http::Method {
    fn from(method: Method) -> Self {
        match method {
            Method::Get => http::Method::GET,
            Method::Head => http::Method::HEAD,
            Method::Post => http::Method::POST,
            Method::Put => http::Method::PUT,
            Method::Delete => http::Method::DELETE,
            Method::Patch => http::Method::PATCH,
            Method::Options => http::Method::OPTIONS,
            Method::Trace => http::Method::TRACE,
            Method::Connect => http::Method::CONNECT,
        }
    }
}

/// A request payload.
#[derive(Clone, PartialEq, Eq)]
pub enum Body {
    /// A UTF-8 text payload.
    Text(String),
    /// An opaque binary payload, shared between copies of the request.
    Bytes(Arc<[u8]>),
}

impl Body {
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Body::Text(text) => text.as_bytes(),
            Body::Bytes(bytes) => bytes,
        }
    }

    pub fn len(&self) -> usize {
        self.as_bytes().len()
    }

    pub fn is_empty(&self) -> bool {
        self.as_bytes().is_empty()
    }
}

impl fmt::Debug for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Body::Text(text) => f.debug_tuple("Text").field(text).finish(),
            Body::Bytes(bytes) => write!(f, "Bytes({} bytes)", bytes.len()),
        }
    }
}

impl From<String> for Body {
    fn from(text: String) -> Self {
        Body::Text(text)
    }
}

impl From<&str> for Body {
    fn from(text: &str) -> Self {
        Body::Text(text.to_owned())
    }
}

impl From<Vec<u8>> for Body {
    fn from(bytes: Vec<u8>) -> Self {
        Body::Bytes(bytes.into())
    }
}

impl From<&[u8]> for Body {
    fn from(bytes: &[u8]) -> Self {
        Body::Bytes(bytes.into())
    }
}

/// An immutable HTTP request bound to the [`Client`] that built it.
///
/// # Examples
///
/// ```no_run
/// use callwire::Client;
///
/// # fn example() -> Result<(), callwire::Error> {
/// let client = Client::builder().build()?;
/// let original = client
///     .get("https://api.example.com/items")
///     .header("Accept", "application/json")
///     .tag("list-items")
///     .build()?;
///
/// let with_auth = original
///     .to_builder()
///     .header("Authorization", "Bearer secret")
///     .build()?;
///
/// assert!(original.header("Authorization").is_none());
/// assert_eq!(with_auth.header("accept"), Some("application/json"));
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Request {
    method: Method,
    url: Url,
    headers: Headers,
    body: Option<Body>,
    tag: Option<String>,
    client: Client,
}

impl Request {
    pub fn method(&self) -> Method {
        self.method
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Returns a header value, ignoring the case of `name`.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)
    }

    pub fn body(&self) -> Option<&Body> {
        self.body.as_ref()
    }

    /// The caller-defined correlation tag.
    pub fn tag(&self) -> Option<&str> {
        self.tag.as_deref()
    }

    /// The client whose configuration this request was built with.
    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Returns `true` if responses to this request may be served from a cache.
    pub fn is_cacheable(&self) -> bool {
        self.method == Method::Get
    }

    /// Returns a builder seeded with every field of this request.
    pub fn to_builder(&self) -> RequestBuilder {
        RequestBuilder {
            client: self.client.clone(),
            method: self.method.as_str().to_owned(),
            url: Some(self.url.to_string()),
            headers: self.headers.clone(),
            body: self.body.clone(),
            tag: self.tag.clone(),
            error: None,
        }
    }

    /// Creates the single [`Call`] that will execute this request.
    pub fn new_call(self) -> Call {
        Call::new(self)
    }
}

impl fmt::Debug for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Request")
            .field("method", &self.method)
            .field("url", &self.url.as_str())
            .field("headers", &self.headers)
            .field("body", &self.body)
            .field("tag", &self.tag)
            .finish()
    }
}

/// Builder for [`Request`].
///
/// Obtained from [`Client::new_request`], [`Client::get`] and friends, or
/// [`Request::to_builder`]. Errors are deferred to [`RequestBuilder::build`].
#[must_use]
pub struct RequestBuilder {
    client: Client,
    method: String,
    url: Option<String>,
    headers: Headers,
    body: Option<Body>,
    tag: Option<String>,
    error: Option<Error>,
}

impl RequestBuilder {
    pub(crate) fn new(client: Client) -> Self {
        Self {
            client,
            method: Method::Get.as_str().to_owned(),
            url: None,
            headers: Headers::new(),
            body: None,
            tag: None,
            error: None,
        }
    }

    /// Sets the HTTP method. Case is ignored; unknown verbs fail at `build()`.
    pub fn method(mut self, method: impl AsRef<str>) -> Self {
        self.method = method.as_ref().to_ascii_uppercase();
        self
    }

    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Adds a header. Headers with an empty name are dropped.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Adds a header whose value may be absent; `None` becomes an empty value.
    pub fn header_opt<V: Into<String>>(self, name: impl Into<String>, value: Option<V>) -> Self {
        let value = value.map(Into::into).unwrap_or_default();
        self.header(name, value)
    }

    pub fn headers<N, V>(mut self, headers: impl IntoIterator<Item = (N, V)>) -> Self
    where
        N: Into<String>,
        V: Into<String>,
    {
        self.headers.extend(headers);
        self
    }

    pub fn body(mut self, body: impl Into<Body>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Serializes `value` as the JSON body and sets `Content-Type`.
    pub fn json<T: Serialize + ?Sized>(mut self, value: &T) -> Self {
        match serde_json::to_string(value) {
            Ok(json) => {
                self.headers.insert("Content-Type", "application/json");
                self.body = Some(Body::Text(json));
            }
            Err(e) => {
                self.error = Some(
                    Error::request_build(format!("failed to serialize request body: {}", e))
                        .with_source(e),
                );
            }
        }
        self
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }

    /// Builds the request.
    ///
    /// # Errors
    ///
    /// Returns a [`crate::ErrorKind::RequestBuild`] error if the URL is unset,
    /// malformed or not `http(s)`, if the method is unknown, or if the JSON
    /// body failed to serialize.
    pub fn build(self) -> Result<Request> {
        if let Some(error) = self.error {
            return Err(error);
        }

        let raw_url = self
            .url
            .ok_or_else(|| Error::request_build("request URL is required"))?;
        let url = Url::parse(&raw_url).map_err(|e| {
            Error::request_build(format!("invalid URL `{}`: {}", raw_url, e)).with_source(e)
        })?;
        if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
            return Err(Error::request_build(format!(
                "URL `{}` must be an absolute http(s) URL",
                raw_url
            )));
        }

        let method: Method = self.method.parse()?;

        let mut headers = self.client.config().default_headers.clone();
        for (name, value) in self.headers.iter() {
            headers.insert(name, value);
        }

        Ok(Request {
            method,
            url,
            headers,
            body: self.body,
            tag: self.tag,
            client: self.client,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;

    fn client() -> Client {
        Client::builder()
            .default_header("User-Agent", "callwire-test")
            .build()
            .unwrap()
    }

    #[test]
    fn method_defaults_to_get_and_is_upper_cased() {
        let client = client();
        let request = client.new_request().url("http://example.test/").build().unwrap();
        assert_eq!(request.method(), Method::Get);

        let request = client
            .new_request()
            .method("patch")
            .url("http://example.test/")
            .build()
            .unwrap();
        assert_eq!(request.method(), Method::Patch);
    }

    #[test]
    fn missing_or_bad_url_fails_at_build() {
        let client = client();
        let err = client.new_request().build().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::RequestBuild);

        let err = client.new_request().url("not a url").build().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::RequestBuild);

        let err = client.new_request().url("ftp://example.test/").build().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::RequestBuild);
    }

    #[test]
    fn unknown_method_fails_at_build() {
        let err = client()
            .new_request()
            .method("FETCH")
            .url("http://example.test/")
            .build()
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::RequestBuild);
    }

    #[test]
    fn header_rules() {
        let request = client()
            .get("http://example.test/")
            .header("", "dropped")
            .header_opt("X-Empty", None::<String>)
            .header("user-agent", "override")
            .build()
            .unwrap();

        assert_eq!(request.headers().len(), 2);
        assert_eq!(request.header("X-Empty"), Some(""));
        assert_eq!(request.header("User-Agent"), Some("override"));
    }

    #[test]
    fn derived_builder_never_touches_the_original() {
        let original = client()
            .post("http://example.test/items")
            .header("X-Id", "1")
            .body("payload")
            .tag("first")
            .build()
            .unwrap();

        let derived = original
            .to_builder()
            .method("PUT")
            .header("X-Id", "2")
            .body("other")
            .tag("second")
            .build()
            .unwrap();

        assert_eq!(original.method(), Method::Post);
        assert_eq!(original.header("X-Id"), Some("1"));
        assert_eq!(original.body(), Some(&Body::from("payload")));
        assert_eq!(original.tag(), Some("first"));

        assert_eq!(derived.method(), Method::Put);
        assert_eq!(derived.header("X-Id"), Some("2"));
        assert_eq!(derived.body(), Some(&Body::from("other")));
        assert_eq!(derived.url(), original.url());
    }

    #[test]
    fn json_body_sets_content_type() {
        #[derive(Serialize)]
        struct Item {
            id: u32,
        }

        let request = client()
            .post("http://example.test/items")
            .json(&Item { id: 7 })
            .build()
            .unwrap();

        assert_eq!(request.header("content-type"), Some("application/json"));
        assert_eq!(request.body(), Some(&Body::from(r#"{"id":7}"#)));
    }
}
