//! Blocking and callback front-ends over the async operations.

use std::future::Future;
use std::io;

/// Drive `future` to completion on a private current-thread runtime.
///
/// Panics if called from inside an async context, like any nested
/// `block_on`; use the async form there.
pub(crate) fn block_on<F: Future>(future: F) -> io::Result<F::Output> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    Ok(runtime.block_on(future))
}

/// Run `future` in the background and hand its result to `on_complete`.
///
/// Uses the ambient tokio runtime when there is one, otherwise a dedicated
/// worker thread. The caller may drop all interest in the result; the
/// operation still runs to the end.
pub(crate) fn run_detached<T, E, Fut, F>(future: Fut, on_complete: F)
where
    T: Send + 'static,
    E: From<io::Error> + Send + 'static,
    Fut: Future<Output = Result<T, E>> + Send + 'static,
    F: FnOnce(Result<T, E>) + Send + 'static,
{
    match tokio::runtime::Handle::try_current() {
        Ok(handle) => {
            handle.spawn(async move { on_complete(future.await) });
        }
        Err(_) => {
            std::thread::spawn(move || match block_on(future) {
                Ok(result) => on_complete(result),
                Err(e) => on_complete(Err(e.into())),
            });
        }
    }
}
