/*!
 * @file helper.rs
 * @brief Client-side helpers for driving blocking calls from a test
 */

use std::future::Future;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;

/// A handle to a client call running on a background task. Call `.join()`
/// (or just `.await` it) to block until the call finishes and recover its
/// result; dropping it detaches the task instead of cancelling it.
pub struct Going<T> {
    handle: JoinHandle<T>,
}

impl<T: Send + 'static> Going<T> {
    pub async fn join(self) -> T {
        self.handle
            .await
            .expect("background client call panicked")
    }
}

impl<T: Send + 'static> Future for Going<T> {
    type Output = T;

    fn poll(
        mut self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Self::Output> {
        use std::pin::Pin;
        match Pin::new(&mut self.handle).poll(cx) {
            std::task::Poll::Ready(result) => {
                std::task::Poll::Ready(result.expect("background client call panicked"))
            }
            std::task::Poll::Pending => std::task::Poll::Pending,
        }
    }
}

/// Schedules `future` on a background task and returns a [`Going`] handle to
/// its eventual result. The test thread is now free to drive replies while
/// the client call it started runs concurrently; call `.join()` (or just
/// `.await` the handle) once the conversation is done to recover the result.
pub fn go<F>(future: F) -> Going<F::Output>
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    Going {
        handle: tokio::spawn(future),
    }
}

/// A scoped variant of [`go`]: the background task is joined when this guard
/// drops, so the enclosing block cannot finish until the client call it
/// started has actually completed. Call `.join()` explicitly to recover the
/// result before the guard would otherwise drop.
pub struct ScopedGoing<T: Send + 'static> {
    going: Option<Going<T>>,
}

impl<T: Send + 'static> ScopedGoing<T> {
    pub async fn join(mut self) -> T {
        self.going
            .take()
            .expect("join called after the result was already taken")
            .join()
            .await
    }
}

impl<T: Send + 'static> Drop for ScopedGoing<T> {
    fn drop(&mut self) {
        if let Some(going) = self.going.take() {
            tokio::task::block_in_place(|| {
                tokio::runtime::Handle::current().block_on(going.join());
            });
        }
    }
}

/// Same as [`go`], but returns a [`ScopedGoing`] guard that joins the
/// background task on drop, ensuring the call is always awaited by the time
/// the enclosing block exits even if the caller never explicitly joins it.
pub fn going<F>(future: F) -> ScopedGoing<F::Output>
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    ScopedGoing {
        going: Some(go(future)),
    }
}

/// Polls `predicate` every 50ms until it returns `true` or `timeout` elapses.
/// Panics with `description` on timeout, mirroring a test assertion failure.
pub async fn wait_until<F, Fut>(description: &str, timeout: Duration, mut predicate: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = Instant::now() + timeout;
    loop {
        if predicate().await {
            return;
        }
        if Instant::now() >= deadline {
            panic!("timed out waiting for: {description}");
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}
