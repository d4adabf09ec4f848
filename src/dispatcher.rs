//! Bounded worker pool that runs asynchronous calls.
//!
//! A [`Dispatcher`] owns a multi-threaded `tokio` runtime sized to the
//! machine's available parallelism. Clients use the process-wide instance
//! returned by [`Dispatcher::global`] unless one is injected with
//! [`crate::ClientBuilder::dispatcher`].
//!
//! Shutdown happens at most once: stop accepting work, wait for in-flight tasks
//! up to the grace period, then cancel whatever is still running. Dropping a
//! dispatcher performs the same sequence.

use crate::{Error, ErrorKind, Result};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tokio::runtime::{Handle, Runtime};
use tokio::task::JoinHandle;

static GLOBAL: Mutex<Option<Arc<Dispatcher>>> = Mutex::new(None);

/// Settings for a [`Dispatcher`].
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Number of worker threads.
    pub worker_threads: usize,

    /// How long [`Dispatcher::shutdown`] waits for in-flight work.
    pub grace_period: Duration,

    /// Prefix for worker thread names.
    pub thread_name: String,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        let parallelism = std::thread::available_parallelism().map_or(2, |n| n.get());
        Self {
            worker_threads: parallelism.clamp(2, 16),
            grace_period: Duration::from_secs(5),
            thread_name: "callwire-worker".to_string(),
        }
    }
}

impl DispatcherConfig {
    pub fn worker_threads(mut self, worker_threads: usize) -> Self {
        self.worker_threads = worker_threads.max(1);
        self
    }

    pub fn grace_period(mut self, grace_period: Duration) -> Self {
        self.grace_period = grace_period;
        self
    }

    pub fn thread_name(mut self, thread_name: impl Into<String>) -> Self {
        self.thread_name = thread_name.into();
        self
    }
}

/// Counts tasks that have been spawned and not yet finished or dropped.
#[derive(Default)]
struct InFlight {
    count: Mutex<usize>,
    idle: Condvar,
}

impl InFlight {
    fn lock(&self) -> MutexGuard<'_, usize> {
        self.count.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn enter(self: &Arc<Self>) -> InFlightGuard {
        *self.lock() += 1;
        InFlightGuard(Arc::clone(self))
    }

    /// Waits until nothing is in flight or `timeout` passes. Returns the
    /// number of tasks still running.
    fn wait_idle(&self, timeout: Duration) -> usize {
        let guard = self.lock();
        let (guard, _) = self
            .idle
            .wait_timeout_while(guard, timeout, |count| *count > 0)
            .unwrap_or_else(PoisonError::into_inner);
        *guard
    }
}

struct InFlightGuard(Arc<InFlight>);

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        let mut count = self.0.lock();
        *count -= 1;
        if *count == 0 {
            self.0.idle.notify_all();
        }
    }
}

/// The execution substrate for asynchronous calls.
pub struct Dispatcher {
    runtime: Mutex<Option<Runtime>>,
    handle: Handle,
    accepting: AtomicBool,
    shut_down: AtomicBool,
    in_flight: Arc<InFlight>,
    grace_period: Duration,
}

impl Dispatcher {
    /// Creates a dispatcher with its own worker threads.
    ///
    /// # Errors
    ///
    /// Returns an [`ErrorKind::Io`] error if the runtime cannot be started.
    pub fn new(config: DispatcherConfig) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(config.worker_threads)
            .thread_name(config.thread_name.clone())
            .enable_all()
            .build()
            .map_err(|e| {
                Error::new(ErrorKind::Io, format!("failed to start dispatcher: {}", e))
                    .with_source(e)
            })?;

        tracing::debug!(
            worker_threads = config.worker_threads,
            grace_period_ms = config.grace_period.as_millis() as u64,
            "Dispatcher started"
        );

        Ok(Self {
            handle: runtime.handle().clone(),
            runtime: Mutex::new(Some(runtime)),
            accepting: AtomicBool::new(true),
            shut_down: AtomicBool::new(false),
            in_flight: Arc::new(InFlight::default()),
            grace_period: config.grace_period,
        })
    }

    /// Returns the process-wide dispatcher, creating it on first use.
    ///
    /// Creation happens once; concurrent first callers wait for it. After
    /// [`Dispatcher::shutdown`] the same (stopped) instance keeps being
    /// returned.
    pub fn global() -> Result<Arc<Dispatcher>> {
        let mut global = GLOBAL.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(dispatcher) = global.as_ref() {
            return Ok(Arc::clone(dispatcher));
        }
        let dispatcher = Arc::new(Dispatcher::new(DispatcherConfig::default())?);
        *global = Some(Arc::clone(&dispatcher));
        Ok(dispatcher)
    }

    /// Returns `true` until shutdown begins.
    pub fn is_accepting(&self) -> bool {
        self.accepting.load(Ordering::SeqCst)
    }

    /// Number of spawned tasks that have not finished.
    pub fn in_flight(&self) -> usize {
        *self.in_flight.lock()
    }

    fn ensure_accepting(&self) -> Result<()> {
        if self.is_accepting() {
            Ok(())
        } else {
            Err(Error::new(
                ErrorKind::Interrupted,
                "dispatcher is shut down and accepts no new work",
            ))
        }
    }

    /// Runs `future` on a worker thread.
    ///
    /// # Errors
    ///
    /// Returns an [`ErrorKind::Interrupted`] error once shutdown has begun.
    pub fn spawn<F>(&self, future: F) -> Result<JoinHandle<F::Output>>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        self.ensure_accepting()?;
        let guard = self.in_flight.enter();
        Ok(self.handle.spawn(async move {
            let _guard = guard;
            future.await
        }))
    }

    /// Drives `future` to completion on the calling thread.
    ///
    /// Must not be called from inside an async context; use the future
    /// directly there.
    ///
    /// # Errors
    ///
    /// Returns an [`ErrorKind::Interrupted`] error once shutdown has begun.
    pub fn block_on<F: Future>(&self, future: F) -> Result<F::Output> {
        self.ensure_accepting()?;
        let _guard = self.in_flight.enter();
        Ok(self.handle.block_on(future))
    }

    /// Stops the dispatcher. Only the first call has any effect.
    ///
    /// Blocks for at most the grace period while in-flight work finishes,
    /// then cancels the rest.
    pub fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::SeqCst) {
            return;
        }
        self.accepting.store(false, Ordering::SeqCst);

        let started = Instant::now();
        let remaining = self.in_flight.wait_idle(self.grace_period);

        let runtime = self
            .runtime
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(runtime) = runtime {
            runtime.shutdown_background();
        }

        if remaining > 0 {
            tracing::warn!(
                canceled = remaining,
                waited_ms = started.elapsed().as_millis() as u64,
                "Dispatcher shut down with tasks still running"
            );
        } else {
            tracing::debug!(
                waited_ms = started.elapsed().as_millis() as u64,
                "Dispatcher shut down"
            );
        }
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("accepting", &self.is_accepting())
            .field("in_flight", &self.in_flight())
            .field("grace_period", &self.grace_period)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::mpsc;

    fn dispatcher(grace: Duration) -> Dispatcher {
        Dispatcher::new(
            DispatcherConfig::default()
                .worker_threads(2)
                .grace_period(grace),
        )
        .unwrap()
    }

    #[test]
    fn spawned_work_runs_on_workers() {
        let dispatcher = dispatcher(Duration::from_secs(1));
        let (tx, rx) = mpsc::channel();
        dispatcher
            .spawn(async move {
                let name = std::thread::current().name().map(str::to_owned);
                tx.send(name).unwrap();
            })
            .unwrap();

        let name = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(name.as_deref(), Some("callwire-worker"));
    }

    #[test]
    fn block_on_returns_the_output() {
        let dispatcher = dispatcher(Duration::from_secs(1));
        let value = dispatcher.block_on(async { 21 * 2 }).unwrap();
        assert_eq!(value, 42);
    }

    #[test]
    fn shutdown_waits_for_in_flight_work() {
        let dispatcher = dispatcher(Duration::from_secs(5));
        let done = Arc::new(AtomicUsize::new(0));
        let finished = Arc::clone(&done);
        dispatcher
            .spawn(async move {
                tokio::time::sleep(Duration::from_millis(50)).await;
                finished.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();

        dispatcher.shutdown();
        assert_eq!(done.load(Ordering::SeqCst), 1);
        assert_eq!(dispatcher.in_flight(), 0);
    }

    #[test]
    fn shutdown_cancels_stragglers_after_grace() {
        let dispatcher = dispatcher(Duration::from_millis(50));
        dispatcher
            .spawn(async {
                tokio::time::sleep(Duration::from_secs(60)).await;
            })
            .unwrap();

        let started = Instant::now();
        dispatcher.shutdown();
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[test]
    fn shutdown_is_idempotent_and_rejects_new_work() {
        let dispatcher = dispatcher(Duration::from_millis(10));
        dispatcher.shutdown();
        dispatcher.shutdown();

        assert!(!dispatcher.is_accepting());
        let err = dispatcher.spawn(async {}).err().unwrap();
        assert_eq!(err.kind(), ErrorKind::Interrupted);
        let err = dispatcher.block_on(async {}).err().unwrap();
        assert_eq!(err.kind(), ErrorKind::Interrupted);
    }

    #[test]
    fn global_is_created_once() {
        let a = Dispatcher::global().unwrap();
        let b = Dispatcher::global().unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }
}
