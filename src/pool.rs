//! Per-route connection reuse with capacity limits and keep-alive eviction.
//!
//! Every transport handle belongs to a [`Route`]. The pool counts live handles
//! (idle plus leased) per route and in total, and refuses to open a handle that
//! would exceed either limit. Capacity checks and the bookkeeping that follows
//! them happen under one lock, so concurrent callers can never jointly
//! overshoot a limit.
//!
//! Idle handles carry an expiry. Expired handles are drained from the front of
//! a route's queue whenever that route is acquired from or released to.

use crate::transport::{Connection, Connector};
use crate::{Error, ErrorKind, Result};
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use url::Url;

/// The `(scheme, host, port)` triple that identifies a reuse key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Route {
    scheme: String,
    host: String,
    port: u16,
}

impl Route {
    pub fn new(scheme: impl Into<String>, host: impl Into<String>, port: u16) -> Self {
        Self {
            scheme: scheme.into().to_ascii_lowercase(),
            host: host.into().to_ascii_lowercase(),
            port,
        }
    }

    /// Derives the route for a URL, filling in the scheme's default port.
    pub fn from_url(url: &Url) -> Result<Self> {
        let host = url
            .host_str()
            .ok_or_else(|| Error::request_build(format!("URL `{}` has no host", url)))?;
        let port = url
            .port_or_known_default()
            .ok_or_else(|| Error::request_build(format!("URL `{}` has no port", url)))?;
        Ok(Self::new(url.scheme(), host, port))
    }

    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}:{}", self.scheme, self.host, self.port)
    }
}

/// Capacity and keep-alive settings for a [`ConnectionPool`].
///
/// # Examples
///
/// ```
/// use callwire::pool::PoolConfig;
/// use std::time::Duration;
///
/// let config = PoolConfig::builder()
///     .max_per_route(2)
///     .max_total(16)
///     .keep_alive(Duration::from_secs(30))
///     .build();
/// assert_eq!(config.max_idle_per_route, 2);
/// ```
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Maximum live handles (idle + leased) for one route.
    pub max_per_route: usize,

    /// Maximum live handles across all routes.
    pub max_total: usize,

    /// Maximum idle handles kept for one route. Defaults to `max_per_route`.
    pub max_idle_per_route: usize,

    /// How long an idle handle stays reusable after release.
    pub keep_alive: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_per_route: 5,
            max_total: 64,
            max_idle_per_route: 5,
            keep_alive: Duration::from_secs(300),
        }
    }
}

impl PoolConfig {
    pub fn builder() -> PoolConfigBuilder {
        PoolConfigBuilder::default()
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.max_per_route == 0 || self.max_total == 0 {
            return Err(Error::request_build(
                "connection pool capacities must be at least 1",
            ));
        }
        Ok(())
    }
}

/// Builder for [`PoolConfig`].
#[derive(Default)]
pub struct PoolConfigBuilder {
    max_per_route: Option<usize>,
    max_total: Option<usize>,
    max_idle_per_route: Option<usize>,
    keep_alive: Option<Duration>,
}

impl PoolConfigBuilder {
    pub fn max_per_route(mut self, max: usize) -> Self {
        self.max_per_route = Some(max);
        self
    }

    pub fn max_total(mut self, max: usize) -> Self {
        self.max_total = Some(max);
        self
    }

    pub fn max_idle_per_route(mut self, max: usize) -> Self {
        self.max_idle_per_route = Some(max);
        self
    }

    pub fn keep_alive(mut self, keep_alive: Duration) -> Self {
        self.keep_alive = Some(keep_alive);
        self
    }

    pub fn build(self) -> PoolConfig {
        let default = PoolConfig::default();
        let max_per_route = self.max_per_route.unwrap_or(default.max_per_route);
        PoolConfig {
            max_per_route,
            max_total: self.max_total.unwrap_or(default.max_total),
            max_idle_per_route: self.max_idle_per_route.unwrap_or(max_per_route),
            keep_alive: self.keep_alive.unwrap_or(default.keep_alive),
        }
    }
}

struct IdleConnection {
    conn: Box<dyn Connection>,
    expires_at: Instant,
}

#[derive(Default)]
struct RouteQueue {
    idle: VecDeque<IdleConnection>,
    live: usize,
}

#[derive(Default)]
struct PoolState {
    routes: HashMap<Route, RouteQueue>,
    total_live: usize,
    generation: u64,
}

impl PoolState {
    /// Removes expired handles from the front of the route's queue and
    /// returns them for closing.
    fn evict_expired(&mut self, route: &Route, now: Instant) -> Vec<Box<dyn Connection>> {
        let Some(queue) = self.routes.get_mut(route) else {
            return Vec::new();
        };
        let mut expired = Vec::new();
        while queue.idle.front().is_some_and(|idle| idle.expires_at < now) {
            if let Some(idle) = queue.idle.pop_front() {
                expired.push(idle.conn);
            }
        }
        queue.live -= expired.len();
        self.total_live -= expired.len();
        expired
    }

    fn forget(&mut self, route: &Route) {
        if let Some(queue) = self.routes.get_mut(route) {
            queue.live = queue.live.saturating_sub(1);
            self.total_live = self.total_live.saturating_sub(1);
        }
        self.prune(route);
    }

    fn prune(&mut self, route: &Route) {
        if self
            .routes
            .get(route)
            .is_some_and(|q| q.live == 0 && q.idle.is_empty())
        {
            self.routes.remove(route);
        }
    }
}

enum Lease {
    Reused(Box<dyn Connection>),
    Reserved,
    Exhausted { route_live: usize, total_live: usize },
}

impl PoolState {
    /// Takes an idle handle or reserves capacity for a new one. Unhealthy idle
    /// handles found on the way are pushed to `discarded`.
    fn lease(
        &mut self,
        route: &Route,
        config: &PoolConfig,
        discarded: &mut Vec<Box<dyn Connection>>,
    ) -> Lease {
        let queue = self.routes.entry(route.clone()).or_default();
        while let Some(idle) = queue.idle.pop_back() {
            if idle.conn.is_healthy() {
                return Lease::Reused(idle.conn);
            }
            discarded.push(idle.conn);
            queue.live -= 1;
            self.total_live -= 1;
        }
        let route_live = queue.live;

        if route_live < config.max_per_route && self.total_live >= config.max_total {
            if let Some(conn) = self.reclaim_idle(route) {
                discarded.push(conn);
            }
        }

        if route_live >= config.max_per_route || self.total_live >= config.max_total {
            let exhausted = Lease::Exhausted {
                route_live,
                total_live: self.total_live,
            };
            self.prune(route);
            return exhausted;
        }

        if let Some(queue) = self.routes.get_mut(route) {
            queue.live += 1;
        }
        self.total_live += 1;
        Lease::Reserved
    }

    /// Removes the idle handle closest to expiry on a route other than
    /// `except`, freeing one unit of total capacity.
    fn reclaim_idle(&mut self, except: &Route) -> Option<Box<dyn Connection>> {
        let victim = self
            .routes
            .iter()
            .filter(|(route, _)| *route != except)
            .filter_map(|(route, queue)| queue.idle.front().map(|idle| (route, idle.expires_at)))
            .min_by_key(|(_, expires_at)| *expires_at)
            .map(|(route, _)| route.clone())?;

        let queue = self.routes.get_mut(&victim)?;
        let idle = queue.idle.pop_front()?;
        queue.live -= 1;
        self.total_live -= 1;
        self.prune(&victim);
        tracing::debug!(route = %victim, "Reclaimed idle connection for another route");
        Some(idle.conn)
    }
}

fn close_all(conns: Vec<Box<dyn Connection>>) {
    for mut conn in conns {
        conn.close();
    }
}

struct Shared {
    config: PoolConfig,
    connector: Arc<dyn Connector>,
    state: Mutex<PoolState>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, PoolState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn release(&self, route: &Route, conn: Box<dyn Connection>, generation: u64) {
        let now = Instant::now();
        let to_close = {
            let mut state = self.lock();
            if state.generation != generation {
                vec![conn]
            } else {
                let mut to_close = state.evict_expired(route, now);
                let idle = state.routes.get(route).map_or(0, |q| q.idle.len());
                if !conn.is_healthy() || idle >= self.config.max_idle_per_route {
                    tracing::debug!(
                        route = %route,
                        healthy = conn.is_healthy(),
                        "Discarding released connection"
                    );
                    to_close.push(conn);
                    state.forget(route);
                } else {
                    state
                        .routes
                        .entry(route.clone())
                        .or_default()
                        .idle
                        .push_back(IdleConnection {
                            conn,
                            expires_at: now + self.config.keep_alive,
                        });
                }
                to_close
            }
        };
        close_all(to_close);
    }
}

/// A shared, thread-safe pool of transport handles.
///
/// Cloning the pool is cheap; clones share the same state.
#[derive(Clone)]
pub struct ConnectionPool {
    shared: Arc<Shared>,
}

impl ConnectionPool {
    /// # Errors
    ///
    /// Returns a [`ErrorKind::RequestBuild`] error if a capacity is zero.
    pub fn new(config: PoolConfig, connector: Arc<dyn Connector>) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            shared: Arc::new(Shared {
                config,
                connector,
                state: Mutex::new(PoolState::default()),
            }),
        })
    }

    pub fn config(&self) -> &PoolConfig {
        &self.shared.config
    }

    /// Leases a handle for `route`, reusing an idle one when possible.
    ///
    /// # Errors
    ///
    /// Returns an [`ErrorKind::PoolExhausted`] error if opening a new handle
    /// would exceed the per-route or total capacity, or whatever error the
    /// connector raises while opening one.
    pub fn acquire(&self, route: &Route) -> Result<PooledConnection> {
        let mut discarded = Vec::new();
        let (lease, generation) = {
            let mut state = self.shared.lock();
            discarded.extend(state.evict_expired(route, Instant::now()));
            let lease = state.lease(route, &self.shared.config, &mut discarded);
            (lease, state.generation)
        };
        close_all(discarded);

        let conn = match lease {
            Lease::Reused(conn) => {
                tracing::debug!(route = %route, "Reusing pooled connection");
                return Ok(self.lent(route, conn, generation, true));
            }
            Lease::Exhausted {
                route_live,
                total_live,
            } => {
                tracing::warn!(
                    route = %route,
                    route_live = route_live,
                    total_live = total_live,
                    "Connection pool exhausted"
                );
                return Err(Error::new(
                    ErrorKind::PoolExhausted,
                    format!(
                        "no capacity for {} ({} of {} on route, {} of {} total)",
                        route,
                        route_live,
                        self.shared.config.max_per_route,
                        total_live,
                        self.shared.config.max_total
                    ),
                ));
            }
            Lease::Reserved => self.shared.connector.connect(route),
        };

        match conn {
            Ok(conn) => Ok(self.lent(route, conn, generation, false)),
            Err(e) => {
                let mut state = self.shared.lock();
                if state.generation == generation {
                    state.forget(route);
                }
                Err(e)
            }
        }
    }

    fn lent(
        &self,
        route: &Route,
        conn: Box<dyn Connection>,
        generation: u64,
        reused: bool,
    ) -> PooledConnection {
        PooledConnection {
            conn: Some(conn),
            route: route.clone(),
            generation,
            reused,
            shared: Arc::clone(&self.shared),
        }
    }

    /// Returns a leased handle to the pool. Equivalent to dropping it.
    pub fn release(&self, conn: PooledConnection) {
        drop(conn);
    }

    /// Closes every idle handle and resets all counters. Handles leased before
    /// the shutdown are closed when they come back.
    pub fn shutdown(&self) {
        let routes = {
            let mut state = self.shared.lock();
            state.generation += 1;
            state.total_live = 0;
            std::mem::take(&mut state.routes)
        };
        let mut closed = 0;
        for (_, queue) in routes {
            for mut idle in queue.idle {
                idle.conn.close();
                closed += 1;
            }
        }
        tracing::debug!(closed = closed, "Connection pool shut down");
    }

    /// Live handles (idle + leased) for `route`.
    pub fn live_count(&self, route: &Route) -> usize {
        self.shared.lock().routes.get(route).map_or(0, |q| q.live)
    }

    /// Idle handles waiting for reuse on `route`.
    pub fn idle_count(&self, route: &Route) -> usize {
        self.shared
            .lock()
            .routes
            .get(route)
            .map_or(0, |q| q.idle.len())
    }

    /// Live handles across all routes.
    pub fn total_live(&self) -> usize {
        self.shared.lock().total_live
    }
}

impl fmt::Debug for ConnectionPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionPool")
            .field("config", &self.shared.config)
            .field("total_live", &self.total_live())
            .finish()
    }
}

/// A handle leased from a [`ConnectionPool`]. Returned to the pool on drop.
pub struct PooledConnection {
    conn: Option<Box<dyn Connection>>,
    route: Route,
    generation: u64,
    reused: bool,
    shared: Arc<Shared>,
}

impl PooledConnection {
    pub fn route(&self) -> &Route {
        &self.route
    }

    /// Returns `true` if this handle was taken from the idle queue.
    pub fn is_reused(&self) -> bool {
        self.reused
    }

    pub fn connection(&mut self) -> &mut dyn Connection {
        // `conn` is only taken in `drop`
        match self.conn.as_mut() {
            Some(conn) => conn.as_mut(),
            None => unreachable!("pooled connection used after release"),
        }
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            self.shared.release(&self.route, conn, self.generation);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::TransportResponse;
    use crate::Request;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    #[derive(Default)]
    struct Counters {
        opened: AtomicUsize,
        closed: AtomicUsize,
    }

    struct FakeConnector {
        counters: Arc<Counters>,
    }

    struct FakeConnection {
        counters: Arc<Counters>,
        healthy: Arc<AtomicBool>,
    }

    #[async_trait]
    impl Connection for FakeConnection {
        async fn exchange(&mut self, _request: &Request) -> Result<TransportResponse> {
            Ok(TransportResponse::default())
        }

        fn is_healthy(&self) -> bool {
            self.healthy.load(Ordering::SeqCst)
        }

        fn close(&mut self) {
            self.counters.closed.fetch_add(1, Ordering::SeqCst);
        }
    }

    impl Connector for FakeConnector {
        fn connect(&self, _route: &Route) -> Result<Box<dyn Connection>> {
            self.counters.opened.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(FakeConnection {
                counters: Arc::clone(&self.counters),
                healthy: Arc::new(AtomicBool::new(true)),
            }))
        }
    }

    fn pool(config: PoolConfig) -> (ConnectionPool, Arc<Counters>) {
        let counters = Arc::new(Counters::default());
        let connector = Arc::new(FakeConnector {
            counters: Arc::clone(&counters),
        });
        (ConnectionPool::new(config, connector).unwrap(), counters)
    }

    fn route(host: &str) -> Route {
        Route::new("http", host, 80)
    }

    #[test]
    fn route_from_url_uses_default_port() {
        let url = Url::parse("https://Example.test/path").unwrap();
        let route = Route::from_url(&url).unwrap();
        assert_eq!(route, Route::new("https", "example.test", 443));
        assert_eq!(route.to_string(), "https://example.test:443");
    }

    #[test]
    fn released_connections_are_reused() {
        let (pool, counters) = pool(PoolConfig::default());
        let a = route("a.test");

        let conn = pool.acquire(&a).unwrap();
        assert!(!conn.is_reused());
        pool.release(conn);
        assert_eq!(pool.idle_count(&a), 1);

        let conn = pool.acquire(&a).unwrap();
        assert!(conn.is_reused());
        assert_eq!(counters.opened.load(Ordering::SeqCst), 1);
        drop(conn);
        assert_eq!(pool.live_count(&a), 1);
    }

    #[test]
    fn per_route_capacity_is_enforced() {
        let (pool, _) = pool(PoolConfig::builder().max_per_route(2).build());
        let a = route("a.test");

        let first = pool.acquire(&a).unwrap();
        let second = pool.acquire(&a).unwrap();
        let err = pool.acquire(&a).err().unwrap();
        assert_eq!(err.kind(), ErrorKind::PoolExhausted);
        assert_eq!(pool.live_count(&a), 2);

        // other routes are unaffected
        let other = pool.acquire(&route("b.test")).unwrap();
        drop((first, second, other));
        assert_eq!(pool.live_count(&a), 2);
        assert_eq!(pool.total_live(), 3);
    }

    #[test]
    fn total_capacity_is_enforced() {
        let (pool, _) = pool(PoolConfig::builder().max_per_route(2).max_total(3).build());

        let _a1 = pool.acquire(&route("a.test")).unwrap();
        let _a2 = pool.acquire(&route("a.test")).unwrap();
        let _b1 = pool.acquire(&route("b.test")).unwrap();
        let err = pool.acquire(&route("c.test")).err().unwrap();
        assert_eq!(err.kind(), ErrorKind::PoolExhausted);
        assert_eq!(pool.total_live(), 3);
    }

    #[test]
    fn idle_handles_on_other_routes_yield_to_new_routes() {
        let (pool, counters) = pool(PoolConfig::builder().max_total(2).build());
        let (a, b, c) = (route("a.test"), route("b.test"), route("c.test"));

        drop(pool.acquire(&a).unwrap());
        drop(pool.acquire(&b).unwrap());
        assert_eq!(pool.total_live(), 2);

        let conn = pool.acquire(&c).unwrap();
        assert!(!conn.is_reused());
        assert_eq!(pool.total_live(), 2);
        // the oldest idle handle (a.test) made room
        assert_eq!(pool.live_count(&a), 0);
        assert_eq!(pool.idle_count(&b), 1);
        assert_eq!(counters.closed.load(Ordering::SeqCst), 1);

        // leased handles are never reclaimed
        let _b = pool.acquire(&b).unwrap();
        let err = pool.acquire(&a).err().unwrap();
        assert_eq!(err.kind(), ErrorKind::PoolExhausted);
        drop(conn);
    }

    #[test]
    fn full_idle_queue_discards_extra_handles() {
        let (pool, counters) = pool(
            PoolConfig::builder()
                .max_per_route(3)
                .max_idle_per_route(2)
                .build(),
        );
        let a = route("a.test");

        let held: Vec<_> = (0..3).map(|_| pool.acquire(&a).unwrap()).collect();
        drop(held);

        assert_eq!(pool.idle_count(&a), 2);
        assert_eq!(pool.live_count(&a), 2);
        assert_eq!(counters.closed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn unhealthy_handles_are_discarded() {
        let (pool, counters) = pool(PoolConfig::default());
        let a = route("a.test");

        let healthy = Arc::new(AtomicBool::new(false));
        let mut conn = pool.acquire(&a).unwrap();
        // swap in a connection whose health probe fails
        conn.conn = Some(Box::new(FakeConnection {
            counters: Arc::clone(&counters),
            healthy,
        }));
        drop(conn);

        assert_eq!(pool.idle_count(&a), 0);
        assert_eq!(pool.live_count(&a), 0);
        assert_eq!(counters.closed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn expired_handles_are_evicted_on_access() {
        let (pool, counters) = pool(
            PoolConfig::builder()
                .keep_alive(Duration::from_millis(20))
                .build(),
        );
        let a = route("a.test");

        drop(pool.acquire(&a).unwrap());
        std::thread::sleep(Duration::from_millis(60));

        let conn = pool.acquire(&a).unwrap();
        assert!(!conn.is_reused());
        assert_eq!(counters.closed.load(Ordering::SeqCst), 1);
        assert_eq!(counters.opened.load(Ordering::SeqCst), 2);
        assert_eq!(pool.live_count(&a), 1);
    }

    #[test]
    fn shutdown_closes_everything() {
        let (pool, counters) = pool(PoolConfig::default());
        let a = route("a.test");

        let leased = pool.acquire(&a).unwrap();
        drop(pool.acquire(&route("b.test")).unwrap());

        pool.shutdown();
        assert_eq!(pool.total_live(), 0);
        assert_eq!(counters.closed.load(Ordering::SeqCst), 1);

        // leased before shutdown: closed on return, counters untouched
        drop(leased);
        assert_eq!(counters.closed.load(Ordering::SeqCst), 2);
        assert_eq!(pool.total_live(), 0);
        assert_eq!(pool.idle_count(&a), 0);
    }

    #[test]
    fn concurrent_acquire_never_exceeds_capacity() {
        let (pool, _) = pool(PoolConfig::builder().max_per_route(3).max_total(3).build());
        let a = route("a.test");
        let held = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let workers: Vec<_> = (0..8)
            .map(|_| {
                let pool = pool.clone();
                let a = a.clone();
                let held = Arc::clone(&held);
                let peak = Arc::clone(&peak);
                std::thread::spawn(move || {
                    for _ in 0..200 {
                        if let Ok(conn) = pool.acquire(&a) {
                            let now = held.fetch_add(1, Ordering::SeqCst) + 1;
                            peak.fetch_max(now, Ordering::SeqCst);
                            assert!(pool.live_count(&a) <= 3);
                            held.fetch_sub(1, Ordering::SeqCst);
                            drop(conn);
                        }
                    }
                })
            })
            .collect();

        for worker in workers {
            worker.join().unwrap();
        }

        assert!(peak.load(Ordering::SeqCst) <= 3);
        assert!(pool.live_count(&a) <= 3);
        assert!(pool.total_live() <= 3);
    }
}
