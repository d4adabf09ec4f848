//! TTL-keyed cache for idempotent reads.
//!
//! Entries are keyed by `(method, url, body)` and expire `ttl` after they were
//! stored. Lookups remove expired entries as a side effect, so
//! [`ResponseCache::cleanup`] is only needed to reclaim memory for keys that
//! are never read again.

use crate::response::Snapshot;
use crate::{Method, Request, Response};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    method: Method,
    url: String,
    body: Option<Vec<u8>>,
}

impl CacheKey {
    fn of(request: &Request) -> Self {
        Self {
            method: request.method(),
            url: request.url().to_string(),
            body: request.body().map(|b| b.as_bytes().to_vec()),
        }
    }
}

struct CacheEntry {
    snapshot: Snapshot,
    expires_at: Instant,
}

/// A thread-safe response cache.
///
/// # Examples
///
/// ```
/// use callwire::{Client, Response, ResponseCache};
/// use std::time::Duration;
///
/// # fn example() -> Result<(), callwire::Error> {
/// let cache = ResponseCache::new(Duration::from_secs(60));
/// let client = Client::builder().build()?;
/// let request = client.get("https://example.test/data").build()?;
///
/// let response = Response::success(request.clone()).code(200).body("hello").build();
/// cache.put(&request, &response);
///
/// let hit = cache.get(&request).expect("fresh entry");
/// assert_eq!(hit.body(), Some("hello"));
/// # Ok(())
/// # }
/// # example().unwrap();
/// ```
pub struct ResponseCache {
    ttl: Duration,
    entries: Mutex<HashMap<CacheKey, CacheEntry>>,
}

impl ResponseCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<CacheKey, CacheEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns the cached response for `request` if it has not expired.
    ///
    /// The returned response is owned by `request`.
    pub fn get(&self, request: &Request) -> Option<Response> {
        let key = CacheKey::of(request);
        let mut entries = self.lock();
        let entry = entries.get(&key)?;
        if Instant::now() <= entry.expires_at {
            tracing::debug!(url = %request.url(), "Response cache hit");
            return Some(entry.snapshot.bind(request.clone()));
        }
        entries.remove(&key);
        tracing::debug!(url = %request.url(), "Response cache entry expired");
        None
    }

    /// Stores `response` for `request`, replacing any previous entry.
    pub fn put(&self, request: &Request, response: &Response) {
        let entry = CacheEntry {
            snapshot: response.snapshot(),
            expires_at: Instant::now() + self.ttl,
        };
        self.lock().insert(CacheKey::of(request), entry);
    }

    /// Removes every expired entry and returns how many were removed.
    pub fn cleanup(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.lock();
        let before = entries.len();
        entries.retain(|_, entry| now <= entry.expires_at);
        before - entries.len()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

impl fmt::Debug for ResponseCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResponseCache")
            .field("ttl", &self.ttl)
            .field("len", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Client;

    fn client() -> Client {
        Client::builder().build().unwrap()
    }

    fn ok(request: &Request, body: &str) -> Response {
        Response::success(request.clone())
            .code(200)
            .body(body)
            .build()
    }

    #[test]
    fn round_trip_then_expiry() {
        let cache = ResponseCache::new(Duration::from_millis(50));
        let request = client().get("https://example.test/data").build().unwrap();

        cache.put(&request, &ok(&request, "payload"));
        let hit = cache.get(&request).unwrap();
        assert_eq!(hit.code(), 200);
        assert_eq!(hit.body(), Some("payload"));

        std::thread::sleep(Duration::from_millis(100));
        assert!(cache.get(&request).is_none());
        // the expired lookup removed the entry
        assert!(cache.is_empty());
    }

    #[test]
    fn key_includes_method_url_and_body() {
        let cache = ResponseCache::new(Duration::from_secs(60));
        let client = client();
        let get = client.get("https://example.test/data").build().unwrap();
        cache.put(&get, &ok(&get, "a"));

        let other_url = client.get("https://example.test/other").build().unwrap();
        let with_body = client
            .get("https://example.test/data")
            .body("q=1")
            .build()
            .unwrap();
        let post = client.post("https://example.test/data").build().unwrap();

        assert!(cache.get(&other_url).is_none());
        assert!(cache.get(&with_body).is_none());
        assert!(cache.get(&post).is_none());
        assert!(cache.get(&get).is_some());
    }

    #[test]
    fn put_replaces_and_cleanup_sweeps() {
        let cache = ResponseCache::new(Duration::from_millis(30));
        let client = client();
        let first = client.get("https://example.test/1").build().unwrap();
        let second = client.get("https://example.test/2").build().unwrap();

        cache.put(&first, &ok(&first, "old"));
        cache.put(&first, &ok(&first, "new"));
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get(&first).unwrap().body(), Some("new"));

        cache.put(&second, &ok(&second, "x"));
        std::thread::sleep(Duration::from_millis(60));
        assert_eq!(cache.cleanup(), 2);
        assert!(cache.is_empty());
    }

    #[test]
    fn hits_are_owned_by_the_querying_request() {
        let cache = ResponseCache::new(Duration::from_secs(60));
        let client = client();
        let first = client.get("https://example.test/data").tag("a").build().unwrap();
        cache.put(&first, &ok(&first, "payload"));

        let second = client.get("https://example.test/data").tag("b").build().unwrap();
        let hit = cache.get(&second).unwrap();
        assert_eq!(hit.request().tag(), Some("b"));
    }
}
