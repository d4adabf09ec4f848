//! # Callwire - an HTTP client runtime
//!
//! Callwire executes HTTP requests through a composable interceptor pipeline on
//! top of `reqwest`. It provides immutable requests and responses, single-use
//! calls that run synchronously or on a worker pool, per-route connection
//! reuse, response caching, retries, and a closed taxonomy of transport errors.
//!
//! ## Quick Start
//!
//! ```no_run
//! use callwire::{callback, Client, LoggingInterceptor, RetryInterceptor};
//! use serde::Deserialize;
//! use std::time::Duration;
//!
//! #[derive(Deserialize)]
//! struct User {
//!     id: u64,
//!     name: String,
//! }
//!
//! fn main() -> Result<(), callwire::Error> {
//!     let client = Client::builder()
//!         .read_timeout(Duration::from_secs(30))
//!         .interceptor(LoggingInterceptor::default())
//!         .interceptor(RetryInterceptor::new(3, Duration::from_millis(100)))
//!         .build()?;
//!
//!     // Blocking execution
//!     let response = client
//!         .get("https://api.example.com/users/123")
//!         .build()?
//!         .new_call()
//!         .execute()?;
//!     let user: User = response.json()?;
//!     println!("User {}: {} ({}ms)", user.id, user.name, response.elapsed_ms());
//!
//!     // Asynchronous execution with a callback
//!     let call = client
//!         .post("https://api.example.com/users")
//!         .json(&serde_json::json!({ "name": "Alice" }))
//!         .build()?
//!         .new_call();
//!     call.enqueue(callback::from_fn(|result| match result {
//!         Ok(response) => println!("Created: {}", response.code()),
//!         Err(e) => eprintln!("Failed: {}", e),
//!     }))?;
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - **Immutable requests** - Derive modified copies with `to_builder()`; the original never changes
//! - **Interceptor pipeline** - Onion-ordered logging, retry, caching, header injection and challenge handling
//! - **Single-use calls** - `execute()`, `execute_async()` or `enqueue()`, each at most once, with cancellation
//! - **Connection reuse** - Per-route pool with capacity limits and keep-alive eviction
//! - **Response caching** - TTL cache for GET requests
//! - **Classified errors** - Transport failures mapped to an [`ErrorKind`]
//! - **Automatic logging** - Structured logging with `tracing`
//!
//! ## Error Handling
//!
//! Every failure is an [`Error`] with a classified [`ErrorKind`]:
//!
//! ```no_run
//! use callwire::{Client, ErrorKind};
//!
//! # fn example() -> Result<(), callwire::Error> {
//! # let client = Client::builder().build()?;
//! let call = client.get("https://api.example.com/endpoint").build()?.new_call();
//! match call.execute() {
//!     Ok(response) if response.is_ok() => println!("Success: {:?}", response.body()),
//!     Ok(response) => eprintln!("HTTP {}: {:?}", response.code(), response.body()),
//!     Err(e) if e.kind() == ErrorKind::NetworkUnavailable => eprintln!("Offline: {}", e),
//!     Err(e) if e.is_retryable() => eprintln!("Transient failure: {}", e),
//!     Err(e) => eprintln!("Other error: {}", e),
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Retry Strategies
//!
//! ```no_run
//! use callwire::{Client, RetryInterceptor, RetryStrategy, retry::{OrPredicate, RetryOnConnectionError, RetryOnTimeout}};
//! use std::time::Duration;
//!
//! # fn example() -> Result<(), callwire::Error> {
//! let retry = RetryInterceptor::with_strategy(RetryStrategy::ExponentialBackoff {
//!     initial_delay: Duration::from_millis(100),
//!     max_delay: Duration::from_secs(30),
//!     max_retries: 5,
//!     jitter: true,
//! })
//! .predicate(OrPredicate::new(vec![
//!     Box::new(RetryOnConnectionError),
//!     Box::new(RetryOnTimeout),
//! ]));
//!
//! let client = Client::builder().interceptor(retry).build()?;
//! # Ok(())
//! # }
//! ```

mod cache;
mod call;
pub mod callback;
mod chain;
mod client;
mod dispatcher;
mod error;
mod headers;
pub mod interceptor;
pub mod mapper;
pub mod pool;
mod request;
mod response;
pub mod transport;

pub use cache::ResponseCache;
pub use call::Call;
pub use callback::Callback;
pub use chain::{Chain, Interceptor};
pub use client::{Client, ClientBuilder, ClientConfig};
pub use dispatcher::{Dispatcher, DispatcherConfig};
pub use error::{BoxError, Error, ErrorKind, Result};
pub use headers::Headers;
pub use interceptor::retry::{self, RetryPredicate, RetryStrategy};
pub use interceptor::{
    CacheInterceptor, ChallengeRetryInterceptor, HeaderInterceptor, LogLevel, LoggingInterceptor,
    RetryInterceptor,
};
pub use request::{Body, Method, Request, RequestBuilder};
pub use response::{Response, ResponseBuilder};
