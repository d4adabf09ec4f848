use crate::{Chain, Interceptor, Response, Result};
use async_trait::async_trait;

/// Adds one header to every request passing through.
///
/// The request is rebuilt from a copy, so every other field is preserved and
/// the incoming request is not modified. An existing header with the same name
/// is replaced.
#[derive(Debug, Clone)]
pub struct HeaderInterceptor {
    name: String,
    value: String,
}

impl HeaderInterceptor {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

#[async_trait]
impl Interceptor for HeaderInterceptor {
    async fn intercept(&self, chain: Chain) -> Result<Response> {
        let request = chain
            .request()
            .to_builder()
            .header(self.name.as_str(), self.value.as_str())
            .build()?;
        chain.proceed(request).await
    }
}
