//! Client configuration.
//!
//! The [`Client`] type is the main entry point: it builds requests and owns
//! everything their calls share (interceptors, connection pool, response
//! cache and dispatcher). Use [`ClientBuilder`] to configure and create
//! clients.

use crate::dispatcher::Dispatcher;
use crate::headers::Headers;
use crate::pool::{ConnectionPool, PoolConfig};
use crate::transport::{Connector, ReqwestConnector};
use crate::{Error, Interceptor, RequestBuilder, ResponseCache, Result};
use http::{HeaderName, HeaderValue};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

/// Transport settings shared by every request of a [`Client`].
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub connect_timeout: Option<Duration>,
    pub read_timeout: Option<Duration>,
    pub follow_redirects: bool,
    /// Proxy URL applied to every scheme.
    pub proxy: Option<String>,
    /// Headers every request starts with. Per-request headers override them.
    pub default_headers: Headers,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Some(Duration::from_secs(10)),
            read_timeout: Some(Duration::from_secs(30)),
            follow_redirects: true,
            proxy: None,
            default_headers: Headers::new(),
        }
    }
}

/// An HTTP client runtime.
///
/// The client is cheap to clone and designed to be reused: clones share one
/// connection pool, cache and dispatcher.
///
/// # Examples
///
/// ```no_run
/// use callwire::{Client, LoggingInterceptor, RetryInterceptor};
/// use std::time::Duration;
///
/// # fn example() -> Result<(), callwire::Error> {
/// let client = Client::builder()
///     .connect_timeout(Duration::from_secs(5))
///     .default_header("User-Agent", "my-app/1.0")
///     .interceptor(LoggingInterceptor::default())
///     .interceptor(RetryInterceptor::new(3, Duration::from_millis(200)))
///     .build()?;
///
/// let response = client.get("https://api.example.com/users/123").build()?.new_call().execute()?;
/// println!("{}", response.body().unwrap_or_default());
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    config: ClientConfig,
    interceptors: Arc<[Arc<dyn Interceptor>]>,
    pool: ConnectionPool,
    cache: Option<Arc<ResponseCache>>,
    dispatcher: OnceLock<Arc<Dispatcher>>,
}

impl Client {
    /// Creates a new `ClientBuilder` for configuring a client.
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    /// Starts a request bound to this client.
    pub fn new_request(&self) -> RequestBuilder {
        RequestBuilder::new(self.clone())
    }

    /// Starts a GET request to `url`.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use callwire::Client;
    /// use serde::Deserialize;
    ///
    /// #[derive(Deserialize)]
    /// struct User { name: String }
    ///
    /// # fn example() -> Result<(), callwire::Error> {
    /// let client = Client::builder().build()?;
    ///
    /// let response = client.get("https://api.example.com/users/123").build()?.new_call().execute()?;
    /// let user: User = response.json()?;
    /// println!("User: {}", user.name);
    /// # Ok(())
    /// # }
    /// ```
    pub fn get(&self, url: impl Into<String>) -> RequestBuilder {
        self.new_request().method("GET").url(url)
    }

    /// Starts a POST request to `url`. Attach a body with
    /// [`RequestBuilder::json`] or [`RequestBuilder::body`].
    pub fn post(&self, url: impl Into<String>) -> RequestBuilder {
        self.new_request().method("POST").url(url)
    }

    pub fn put(&self, url: impl Into<String>) -> RequestBuilder {
        self.new_request().method("PUT").url(url)
    }

    pub fn delete(&self, url: impl Into<String>) -> RequestBuilder {
        self.new_request().method("DELETE").url(url)
    }

    pub fn patch(&self, url: impl Into<String>) -> RequestBuilder {
        self.new_request().method("PATCH").url(url)
    }

    pub fn head(&self, url: impl Into<String>) -> RequestBuilder {
        self.new_request().method("HEAD").url(url)
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    /// The interceptors, in registration order.
    pub fn interceptors(&self) -> &Arc<[Arc<dyn Interceptor>]> {
        &self.inner.interceptors
    }

    pub fn pool(&self) -> &ConnectionPool {
        &self.inner.pool
    }

    /// The client-level cache consulted by the network step, if configured.
    pub fn cache(&self) -> Option<&Arc<ResponseCache>> {
        self.inner.cache.as_ref()
    }

    /// The dispatcher calls run on.
    ///
    /// Falls back to [`Dispatcher::global`] when none was injected.
    pub fn dispatcher(&self) -> Result<Arc<Dispatcher>> {
        if let Some(dispatcher) = self.inner.dispatcher.get() {
            return Ok(Arc::clone(dispatcher));
        }
        let global = Dispatcher::global()?;
        Ok(Arc::clone(self.inner.dispatcher.get_or_init(|| global)))
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("config", &self.inner.config)
            .field("interceptors", &self.inner.interceptors.len())
            .field("pool", &self.inner.pool)
            .field("cache", &self.inner.cache)
            .finish()
    }
}

/// Builder for configuring and creating a [`Client`].
///
/// Every setting is validated by [`ClientBuilder::build`].
///
/// # Examples
///
/// ```
/// use callwire::{pool::PoolConfig, ClientBuilder, ResponseCache};
/// use std::sync::Arc;
/// use std::time::Duration;
///
/// # fn example() -> Result<(), callwire::Error> {
/// let client = ClientBuilder::new()
///     .read_timeout(Duration::from_secs(15))
///     .follow_redirects(false)
///     .pool_config(PoolConfig::builder().max_per_route(2).build())
///     .response_cache(Arc::new(ResponseCache::new(Duration::from_secs(60))))
///     .build()?;
/// # Ok(())
/// # }
/// ```
#[must_use]
pub struct ClientBuilder {
    config: ClientConfig,
    interceptors: Vec<Arc<dyn Interceptor>>,
    pool_config: PoolConfig,
    cache: Option<Arc<ResponseCache>>,
    dispatcher: Option<Arc<Dispatcher>>,
    connector: Option<Arc<dyn Connector>>,
    error: Option<Error>,
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ClientBuilder {
    /// Creates a new `ClientBuilder` with default settings.
    pub fn new() -> Self {
        Self {
            config: ClientConfig::default(),
            interceptors: Vec::new(),
            pool_config: PoolConfig::default(),
            cache: None,
            dispatcher: None,
            connector: None,
            error: None,
        }
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = Some(timeout);
        self
    }

    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.config.read_timeout = Some(timeout);
        self
    }

    pub fn follow_redirects(mut self, follow: bool) -> Self {
        self.config.follow_redirects = follow;
        self
    }

    /// Routes every request through the proxy at `url`.
    pub fn proxy(mut self, url: impl Into<String>) -> Self {
        self.config.proxy = Some(url.into());
        self
    }

    /// Adds a default header that will be included in all requests.
    ///
    /// An invalid header name or value makes [`ClientBuilder::build`] fail.
    pub fn default_header(mut self, name: impl AsRef<str>, value: impl AsRef<str>) -> Self {
        let name = name.as_ref();
        let value = value.as_ref();
        if let Err(e) = HeaderName::try_from(name) {
            self.error
                .get_or_insert(Error::request_build(format!("Invalid header name: {}", e)));
            return self;
        }
        if let Err(e) = HeaderValue::try_from(value) {
            self.error
                .get_or_insert(Error::request_build(format!("Invalid header value: {}", e)));
            return self;
        }
        self.config.default_headers.insert(name, value);
        self
    }

    /// Appends an interceptor. Interceptors run in the order they are added.
    pub fn interceptor(mut self, interceptor: impl Interceptor + 'static) -> Self {
        self.interceptors.push(Arc::new(interceptor));
        self
    }

    /// Appends an interceptor that is already shared.
    pub fn interceptor_arc(mut self, interceptor: Arc<dyn Interceptor>) -> Self {
        self.interceptors.push(interceptor);
        self
    }

    pub fn pool_config(mut self, config: PoolConfig) -> Self {
        self.pool_config = config;
        self
    }

    /// Sets the cache consulted by the network step for GET requests.
    pub fn response_cache(mut self, cache: Arc<ResponseCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Runs calls on `dispatcher` instead of the process-wide one.
    pub fn dispatcher(mut self, dispatcher: Arc<Dispatcher>) -> Self {
        self.dispatcher = Some(dispatcher);
        self
    }

    /// Replaces the `reqwest`-backed transport.
    pub fn connector(mut self, connector: Arc<dyn Connector>) -> Self {
        self.connector = Some(connector);
        self
    }

    /// Builds the configured `Client`.
    ///
    /// # Errors
    ///
    /// Returns a [`crate::ErrorKind::RequestBuild`] error for an invalid
    /// default header, proxy URL or pool configuration.
    pub fn build(self) -> Result<Client> {
        if let Some(error) = self.error {
            return Err(error);
        }
        self.pool_config.validate()?;

        let connector: Arc<dyn Connector> = match self.connector {
            Some(connector) => connector,
            None => Arc::new(ReqwestConnector::new(self.config.clone())?),
        };
        let pool = ConnectionPool::new(self.pool_config, connector)?;

        let dispatcher = OnceLock::new();
        if let Some(injected) = self.dispatcher {
            let _ = dispatcher.set(injected);
        }

        tracing::debug!(
            interceptors = self.interceptors.len(),
            cache = self.cache.is_some(),
            "Client built"
        );

        Ok(Client {
            inner: Arc::new(ClientInner {
                config: self.config,
                interceptors: self.interceptors.into(),
                pool,
                cache: self.cache,
                dispatcher,
            }),
        })
    }
}
