use crate::{Chain, Interceptor, Response, ResponseCache, Result};
use async_trait::async_trait;
use std::sync::Arc;

/// Serves repeated GET requests from a [`ResponseCache`].
///
/// A fresh hit short-circuits the rest of the chain. On a miss the request
/// proceeds and a response passing [`Response::is_ok`] is stored.
#[derive(Debug, Clone)]
pub struct CacheInterceptor {
    cache: Arc<ResponseCache>,
}

impl CacheInterceptor {
    pub fn new(cache: Arc<ResponseCache>) -> Self {
        Self { cache }
    }

    pub fn cache(&self) -> &Arc<ResponseCache> {
        &self.cache
    }
}

#[async_trait]
impl Interceptor for CacheInterceptor {
    async fn intercept(&self, chain: Chain) -> Result<Response> {
        let request = chain.request().clone();
        if !request.is_cacheable() {
            return chain.proceed(request).await;
        }

        if let Some(hit) = self.cache.get(&request) {
            return Ok(hit);
        }

        let response = chain.proceed(request.clone()).await?;
        if response.is_ok() {
            self.cache.put(&request, &response);
        }
        Ok(response)
    }
}
