//! Completion callbacks for [`crate::Call::enqueue`].

use crate::{Error, Response, Result};

/// Receives the outcome of an enqueued call.
///
/// Exactly one of the two methods is invoked, exactly once, on a dispatcher
/// worker thread.
pub trait Callback: Send + 'static {
    fn on_success(self, response: Response);

    fn on_failure(self, error: Error);
}

/// A [`Callback`] built from a closure. See [`from_fn`].
pub struct FnCallback<F> {
    f: F,
}

/// Adapts a closure taking the call's `Result` into a [`Callback`].
///
/// # Examples
///
/// ```no_run
/// use callwire::{callback, Client};
///
/// # fn example() -> Result<(), callwire::Error> {
/// let client = Client::builder().build()?;
/// let call = client.get("https://api.example.com/status").build()?.new_call();
///
/// call.enqueue(callback::from_fn(|result| match result {
///     Ok(response) => println!("status {}", response.code()),
///     Err(e) => eprintln!("failed: {}", e),
/// }))?;
/// # Ok(())
/// # }
/// ```
pub fn from_fn<F>(f: F) -> FnCallback<F>
where
    F: FnOnce(Result<Response>) + Send + 'static,
{
    FnCallback { f }
}

impl<F> Callback for FnCallback<F>
where
    F: FnOnce(Result<Response>) + Send + 'static,
{
    fn on_success(self, response: Response) {
        (self.f)(Ok(response))
    }

    fn on_failure(self, error: Error) {
        (self.f)(Err(error))
    }
}

impl<F> std::fmt::Debug for FnCallback<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnCallback").finish_non_exhaustive()
    }
}
