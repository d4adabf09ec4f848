//! Built-in interceptors.
//!
//! Each one implements [`crate::Interceptor`]; the order in which they are
//! registered on the [`crate::ClientBuilder`] is the order they run in.

mod cache;
mod challenge;
mod header;
mod logging;
pub mod retry;

pub use cache::CacheInterceptor;
pub use challenge::ChallengeRetryInterceptor;
pub use header::HeaderInterceptor;
pub use logging::{LogLevel, LoggingInterceptor};
pub use retry::RetryInterceptor;
