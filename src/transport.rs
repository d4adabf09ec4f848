//! The seam between the pipeline and the host HTTP client.
//!
//! The pipeline never speaks HTTP itself. A [`Connector`] opens a
//! [`Connection`] for a [`Route`], the connection pool keeps it around for
//! reuse, and the terminal step of the chain hands it each request to
//! exchange. [`ReqwestConnector`] is the default implementation, backed by
//! `reqwest`; tests plug in in-memory connectors.

use crate::client::ClientConfig;
use crate::{headers::Headers, mapper, pool::Route, request::Body, Error, Request, Result};
use async_trait::async_trait;
use http::{HeaderName, HeaderValue};
use std::time::Instant;

/// What the host transport hands back for one exchange.
#[derive(Debug, Clone, Default)]
pub struct TransportResponse {
    pub code: u16,
    pub message: String,
    pub headers: Headers,
    pub body: String,
}

/// A reusable transport handle for one route.
#[async_trait]
pub trait Connection: Send {
    /// Sends `request` and reads the complete response.
    ///
    /// Failures must already be classified (see [`mapper::map_error`]).
    async fn exchange(&mut self, request: &Request) -> Result<TransportResponse>;

    /// Whether the handle may be returned to the pool after use.
    fn is_healthy(&self) -> bool {
        true
    }

    /// Releases any resources held by the handle.
    fn close(&mut self) {}
}

/// Opens new [`Connection`]s.
pub trait Connector: Send + Sync {
    fn connect(&self, route: &Route) -> Result<Box<dyn Connection>>;
}

/// Opens one `reqwest` client per route, configured from the [`ClientConfig`].
#[derive(Debug, Clone)]
pub struct ReqwestConnector {
    config: ClientConfig,
    proxy: Option<reqwest::Proxy>,
}

impl ReqwestConnector {
    /// # Errors
    ///
    /// Returns a [`crate::ErrorKind::RequestBuild`] error if the proxy URL is
    /// invalid.
    pub fn new(config: ClientConfig) -> Result<Self> {
        let proxy = match &config.proxy {
            Some(url) => Some(reqwest::Proxy::all(url.as_str()).map_err(|e| {
                Error::request_build(format!("invalid proxy `{}`: {}", url, e)).with_source(e)
            })?),
            None => None,
        };
        Ok(Self { config, proxy })
    }
}

impl Connector for ReqwestConnector {
    fn connect(&self, route: &Route) -> Result<Box<dyn Connection>> {
        let redirect = if self.config.follow_redirects {
            reqwest::redirect::Policy::default()
        } else {
            reqwest::redirect::Policy::none()
        };

        let mut builder = reqwest::Client::builder()
            .redirect(redirect)
            .pool_max_idle_per_host(1);
        if let Some(timeout) = self.config.connect_timeout {
            builder = builder.connect_timeout(timeout);
        }
        if let Some(timeout) = self.config.read_timeout {
            builder = builder.read_timeout(timeout);
        }
        if let Some(proxy) = &self.proxy {
            builder = builder.proxy(proxy.clone());
        }

        let client = builder.build().map_err(|e| {
            Error::request_build(format!("failed to build HTTP client for {}: {}", route, e))
                .with_source(e)
        })?;

        tracing::debug!(route = %route, "Opened transport handle");

        Ok(Box::new(ReqwestConnection {
            client,
            healthy: true,
        }))
    }
}

struct ReqwestConnection {
    client: reqwest::Client,
    healthy: bool,
}

impl ReqwestConnection {
    fn build(&self, request: &Request) -> Result<reqwest::Request> {
        let mut builder = self
            .client
            .request(request.method().into(), request.url().clone());

        for (name, value) in request.headers().iter() {
            let name = HeaderName::try_from(name)
                .map_err(|e| Error::request_build(format!("invalid header name: {}", e)))?;
            let value = HeaderValue::try_from(value)
                .map_err(|e| Error::request_build(format!("invalid header value: {}", e)))?;
            builder = builder.header(name, value);
        }

        match request.body() {
            Some(Body::Text(text)) => builder = builder.body(text.clone()),
            Some(Body::Bytes(bytes)) => builder = builder.body(bytes.to_vec()),
            None => {}
        }

        builder
            .build()
            .map_err(|e| mapper::map_error(e, request.method(), request.url().as_str()))
    }
}

#[async_trait]
impl Connection for ReqwestConnection {
    async fn exchange(&mut self, request: &Request) -> Result<TransportResponse> {
        let outgoing = self.build(request)?;
        let started = Instant::now();

        let response = match self.client.execute(outgoing).await {
            Ok(response) => response,
            Err(e) => {
                let err = mapper::map_error(e, request.method(), request.url().as_str());
                if err.is_transport() {
                    self.healthy = false;
                }
                return Err(err);
            }
        };

        let status = response.status();
        let mut headers = Headers::new();
        for (name, value) in response.headers() {
            headers.append(
                name.as_str(),
                String::from_utf8_lossy(value.as_bytes()).into_owned(),
            );
        }

        let body = response.text().await.map_err(|e| {
            self.healthy = false;
            mapper::map_error(e, request.method(), request.url().as_str())
        })?;

        tracing::debug!(
            status = status.as_u16(),
            latency_ms = started.elapsed().as_millis() as u64,
            "Transport exchange complete"
        );

        Ok(TransportResponse {
            code: status.as_u16(),
            message: status.canonical_reason().unwrap_or_default().to_owned(),
            headers,
            body,
        })
    }

    fn is_healthy(&self) -> bool {
        self.healthy
    }
}
