use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::error::{Result, SdkError};

/// Completion of an asynchronous store operation.
///
/// Resolves exactly once. Await it, or hand it a callback with
/// [`Ticket::on_complete`]. Dropping the ticket does not cancel the operation.
#[must_use = "a ticket does nothing unless awaited or given a callback"]
pub struct Ticket<T> {
    rx: oneshot::Receiver<Result<T>>,
    runtime: Handle,
}

/// Sending half of a [`Ticket`]. Consumed by the single completion.
pub(crate) struct Completer<T> {
    tx: oneshot::Sender<Result<T>>,
}

impl<T> Completer<T> {
    pub(crate) fn complete(self, result: Result<T>) {
        // The caller may have dropped the ticket; the outcome is then discarded.
        let _ = self.tx.send(result);
    }
}

impl<T> Ticket<T> {
    pub(crate) fn channel(runtime: Handle) -> (Completer<T>, Ticket<T>) {
        let (tx, rx) = oneshot::channel();
        (Completer { tx }, Ticket { rx, runtime })
    }

    /// A ticket that is already resolved. Still delivered asynchronously.
    pub(crate) fn ready(runtime: Handle, result: Result<T>) -> Ticket<T> {
        let (completer, ticket) = Self::channel(runtime);
        completer.complete(result);
        ticket
    }

    /// Run `callback` with the outcome on a runtime worker.
    pub fn on_complete<F>(self, callback: F) -> JoinHandle<()>
    where
        T: Send + 'static,
        F: FnOnce(Result<T>) + Send + 'static,
    {
        let runtime = self.runtime.clone();
        runtime.spawn(async move { callback(self.await) })
    }
}

impl<T> Future for Ticket<T> {
    type Output = Result<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|received| received.unwrap_or(Err(SdkError::Abandoned)))
    }
}
