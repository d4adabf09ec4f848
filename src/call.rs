//! Single-use execution of a [`Request`].
//!
//! A [`Call`] moves through `created → executing → {completed, failed,
//! canceled}` exactly once. Whichever of [`Call::execute`],
//! [`Call::execute_async`] or [`Call::enqueue`] is invoked first wins; every
//! later invocation fails with [`ErrorKind::AlreadyExecuted`].

use crate::chain::{network_exchange, Chain};
use crate::{Callback, Error, ErrorKind, Request, Response, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::task::AbortHandle;

#[derive(Default)]
struct CallState {
    executed: AtomicBool,
    canceled: AtomicBool,
    task: Mutex<Option<AbortHandle>>,
}

impl CallState {
    fn is_canceled(&self) -> bool {
        self.canceled.load(Ordering::SeqCst)
    }
}

/// One execution of one request.
///
/// Cloning a `Call` yields another handle to the same execution, which is how
/// a call is canceled from a different thread or task.
///
/// # Examples
///
/// ```no_run
/// use callwire::Client;
///
/// # fn example() -> Result<(), callwire::Error> {
/// let client = Client::builder().build()?;
/// let call = client.get("https://api.example.com/users/1").build()?.new_call();
///
/// let response = call.execute()?;
/// println!("{} in {}ms", response.code(), response.elapsed_ms());
///
/// // A call runs at most once.
/// assert!(call.execute().is_err());
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Call {
    request: Request,
    state: Arc<CallState>,
}

impl Call {
    pub(crate) fn new(request: Request) -> Self {
        Self {
            request,
            state: Arc::new(CallState::default()),
        }
    }

    pub fn request(&self) -> &Request {
        &self.request
    }

    pub fn is_executed(&self) -> bool {
        self.state.executed.load(Ordering::SeqCst)
    }

    pub fn is_canceled(&self) -> bool {
        self.state.is_canceled()
    }

    fn begin(&self) -> Result<()> {
        if self.state.executed.swap(true, Ordering::SeqCst) {
            return Err(Error::already_executed()
                .with_request(self.request.method(), self.request.url().as_str()));
        }
        Ok(())
    }

    /// Runs the call on the current thread and returns its response.
    ///
    /// The work is driven by the client's dispatcher. This blocks, so it must
    /// not be called from inside an async context; use
    /// [`Call::execute_async`] there.
    ///
    /// # Errors
    ///
    /// Fails with [`ErrorKind::AlreadyExecuted`] on a second invocation, with
    /// [`ErrorKind::Canceled`] if the call was canceled, and otherwise with
    /// whatever the pipeline produced.
    pub fn execute(&self) -> Result<Response> {
        self.begin()?;
        let dispatcher = self.request.client().dispatcher()?;
        dispatcher.block_on(run(self.request.clone(), Arc::clone(&self.state)))?
    }

    /// Runs the call on the caller's runtime.
    pub async fn execute_async(&self) -> Result<Response> {
        self.begin()?;
        run(self.request.clone(), Arc::clone(&self.state)).await
    }

    /// Runs the call on the client's dispatcher and reports the outcome to
    /// `callback`.
    ///
    /// Once this returns `Ok`, exactly one of the callback's methods is
    /// invoked, even if the call is canceled, the execution panics or the
    /// dispatcher shuts down first. In the last case the failure is
    /// [`ErrorKind::Interrupted`].
    ///
    /// # Errors
    ///
    /// Fails with [`ErrorKind::AlreadyExecuted`] on a second invocation and
    /// with [`ErrorKind::Interrupted`] if the dispatcher no longer accepts
    /// work. The callback is not invoked in either case.
    pub fn enqueue(&self, callback: impl Callback) -> Result<()> {
        self.begin()?;
        let dispatcher = self.request.client().dispatcher()?;

        let state = Arc::clone(&self.state);
        let task = dispatcher.spawn(run(self.request.clone(), Arc::clone(&state)))?;
        let abort = task.abort_handle();
        {
            let mut slot = state.task.lock().unwrap_or_else(PoisonError::into_inner);
            if state.is_canceled() {
                abort.abort();
            }
            *slot = Some(abort.clone());
        }

        let method = self.request.method();
        let url = self.request.url().to_string();
        let delivery = Delivery {
            callback: Some(callback),
            method,
            url: url.clone(),
        };
        let delivered = dispatcher.spawn(async move {
            let outcome = match task.await {
                Ok(result) => result,
                Err(e) if e.is_cancelled() => Err(Error::canceled().with_request(method, url)),
                Err(e) => {
                    tracing::error!(
                        method = %method,
                        url = %url,
                        error = %e,
                        "Call task panicked"
                    );
                    Err(Error::new(ErrorKind::Unknown, "call task panicked")
                        .with_request(method, url)
                        .with_source(e))
                }
            };
            state.task.lock().unwrap_or_else(PoisonError::into_inner).take();
            delivery.deliver(outcome);
        });

        // The run is already dispatched, so a rejected delivery task still
        // reports through the callback (its `Delivery` was dropped with it).
        if delivered.is_err() {
            abort.abort();
        }
        Ok(())
    }

    /// Cancels the call.
    ///
    /// May be called at any time and from any thread. An enqueued call that is
    /// still running is aborted; a call that has not started fails with
    /// [`ErrorKind::Canceled`] when it does. A response that completes at the
    /// same moment may still be delivered.
    pub fn cancel(&self) {
        if self.state.canceled.swap(true, Ordering::SeqCst) {
            return;
        }
        let task = self
            .state
            .task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(task) = task {
            task.abort();
        }
        tracing::debug!(
            method = %self.request.method(),
            url = %self.request.url(),
            "Call canceled"
        );
    }
}

/// Owns an enqueued call's callback until the outcome is delivered.
///
/// Dropped undelivered (the dispatcher shut down and discarded the task), it
/// reports [`ErrorKind::Interrupted`].
struct Delivery<C: Callback> {
    callback: Option<C>,
    method: crate::Method,
    url: String,
}

impl<C: Callback> Delivery<C> {
    fn deliver(mut self, outcome: Result<Response>) {
        if let Some(callback) = self.callback.take() {
            match outcome {
                Ok(response) => callback.on_success(response),
                Err(error) => callback.on_failure(error),
            }
        }
    }
}

impl<C: Callback> Drop for Delivery<C> {
    fn drop(&mut self) {
        if let Some(callback) = self.callback.take() {
            tracing::warn!(
                method = %self.method,
                url = %self.url,
                "Dispatcher discarded call before completion"
            );
            callback.on_failure(
                Error::new(ErrorKind::Interrupted, "dispatcher shut down before the call completed")
                    .with_request(self.method, std::mem::take(&mut self.url)),
            );
        }
    }
}

impl std::fmt::Debug for Call {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Call")
            .field("request", &self.request)
            .field("executed", &self.is_executed())
            .field("canceled", &self.is_canceled())
            .finish()
    }
}

async fn run(request: Request, state: Arc<CallState>) -> Result<Response> {
    let method = request.method();
    let url = request.url().to_string();

    if state.is_canceled() {
        return Err(Error::canceled().with_request(method, url));
    }

    let interceptors = Arc::clone(request.client().interceptors());
    let response = if interceptors.is_empty() {
        network_exchange(request).await?
    } else {
        let chain = Chain::new(interceptors, request.clone());
        chain.proceed(request).await?
    };

    if state.is_canceled() {
        return Err(Error::canceled().with_request(method, url));
    }
    Ok(response)
}
