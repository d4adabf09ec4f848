//! The interceptor pipeline.
//!
//! A [`Chain`] is an immutable cursor over the client's interceptor list.
//! Calling [`Chain::proceed`] never mutates the cursor; it hands the next
//! interceptor a fresh cursor one position further along, so interceptors that
//! proceed more than once (retries) or from several tasks never disturb each
//! other. Past the last interceptor, `proceed` performs the network exchange.
//!
//! The resulting order is an onion: the first registered interceptor sees the
//! request first and the response last.

use crate::pool::Route;
use crate::{Request, Response, Result};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Instant;

/// A request/response transformer in the pipeline.
///
/// Implementations normally call [`Chain::proceed`] exactly once. Not calling
/// it short-circuits everything behind the interceptor (including the network);
/// calling it several times repeats everything behind it. Both are allowed and
/// used by the cache, retry and challenge interceptors.
///
/// # Examples
///
/// ```
/// use async_trait::async_trait;
/// use callwire::{Chain, Interceptor, Response, Result};
///
/// struct RequireOk;
///
/// #[async_trait]
/// impl Interceptor for RequireOk {
///     async fn intercept(&self, chain: Chain) -> Result<Response> {
///         let request = chain.request().clone();
///         let response = chain.proceed(request).await?;
///         if !response.is_ok() {
///             tracing::warn!(code = response.code(), "Unexpected status");
///         }
///         Ok(response)
///     }
/// }
/// ```
#[async_trait]
pub trait Interceptor: Send + Sync {
    async fn intercept(&self, chain: Chain) -> Result<Response>;
}

/// Cursor passed through the interceptor pipeline.
#[derive(Clone)]
pub struct Chain {
    interceptors: Arc<[Arc<dyn Interceptor>]>,
    index: usize,
    request: Request,
}

impl Chain {
    /// Creates a cursor at the start of `interceptors`.
    pub fn new(interceptors: Arc<[Arc<dyn Interceptor>]>, request: Request) -> Self {
        Self {
            interceptors,
            index: 0,
            request,
        }
    }

    /// The request as it arrived at this position.
    pub fn request(&self) -> &Request {
        &self.request
    }

    /// Position of the next interceptor this cursor will invoke.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Passes `request` to the next interceptor, or to the network when none
    /// are left.
    pub async fn proceed(&self, request: Request) -> Result<Response> {
        match self.interceptors.get(self.index) {
            Some(interceptor) => {
                let next = Chain {
                    interceptors: Arc::clone(&self.interceptors),
                    index: self.index + 1,
                    request,
                };
                interceptor.intercept(next).await
            }
            None => network_exchange(request).await,
        }
    }
}

impl std::fmt::Debug for Chain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Chain")
            .field("index", &self.index)
            .field("len", &self.interceptors.len())
            .field("request", &self.request)
            .finish()
    }
}

/// The terminal step: consult the client-level cache, then exchange the
/// request over a pooled connection.
pub(crate) async fn network_exchange(request: Request) -> Result<Response> {
    let client = request.client().clone();

    let cache = client.cache().filter(|_| request.is_cacheable());
    if let Some(hit) = cache.and_then(|cache| cache.get(&request)) {
        return Ok(hit);
    }

    let route = Route::from_url(request.url())?;
    let mut conn = client.pool().acquire(&route)?;

    tracing::debug!(
        method = %request.method(),
        url = %request.url(),
        route = %route,
        reused = conn.is_reused(),
        "Executing HTTP request"
    );

    let started = Instant::now();
    let raw = conn.connection().exchange(&request).await?;
    drop(conn);

    let response = Response::success(request)
        .code(raw.code)
        .message(raw.message)
        .headers(raw.headers)
        .body(raw.body)
        .elapsed_ms(started.elapsed().as_millis() as u64)
        .build();

    if response.is_ok() {
        if let Some(cache) = cache {
            cache.put(response.request(), &response);
        }
    }

    Ok(response)
}
