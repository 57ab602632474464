//! Request handles and their lifecycle.
//!
//! # Design
//! A `RequestHandle` is a cheap clone of shared state guarded by one mutex:
//! the lifecycle state, the completion callback and the cancellation token
//! of the in-flight exchange. Every transition happens under that lock, and the
//! callback is taken out of it on the transition into a terminal state, so
//! it can fire at most once no matter how completion and `cancel()` race.
//!
//! ```text
//! Created --start--> Running --exchange done--> Finished
//!    |                  |
//!    +-----cancel-------+----------------------> Cancelled
//! ```
//!
//! Callbacks never run on the caller's thread or under the lock; they are
//! queued to the owning client's callback thread.
//!
//! The token is shared with the transport, so `cancel()`, a timeout or the
//! client shutting down all tell the blocking exchange to stop.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::dispatch::Dispatcher;
use crate::error::RequestError;
use crate::http::{HttpResponse, PreparedRequest};
use crate::transport::Transport;

/// What a request ends with: a successful response or an error.
pub type Outcome = Result<HttpResponse, RequestError>;

/// Completion callback. Receives the handle it was registered on.
pub type Callback = Box<dyn FnOnce(&RequestHandle, Outcome) + Send + 'static>;

/// Opaque per-request identifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RequestId(Uuid);

impl RequestId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Lifecycle state of a request.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RequestState {
    Created,
    Running,
    /// Completed with a response or an error.
    Finished,
    /// Aborted by the caller. Not reported as finished.
    Cancelled,
}

impl RequestState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RequestState::Finished | RequestState::Cancelled)
    }
}

/// Lifecycle control of an outstanding request.
pub trait RequestLifecycle {
    /// Begin the exchange. No-op unless the request is `Created`.
    fn start(&self);
    /// Abort the request. No-op once it is `Finished` or `Cancelled`.
    fn cancel(&self);
    fn running(&self) -> bool;
    fn finished(&self) -> bool;
}

/// Everything needed to begin the exchange, consumed by `start()`.
pub(crate) struct Launch {
    pub(crate) request: Result<PreparedRequest, RequestError>,
    pub(crate) timeout: Duration,
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) runtime: tokio::runtime::Handle,
}

struct Slot {
    state: RequestState,
    callback: Option<Callback>,
    launch: Option<Launch>,
    cancel: Option<CancellationToken>,
}

struct Inner {
    id: RequestId,
    timeout: Duration,
    slot: Mutex<Slot>,
    dispatcher: Dispatcher,
}

/// Handle to one request built by `HttpClient`.
#[derive(Clone)]
pub struct RequestHandle {
    inner: Arc<Inner>,
}

impl RequestHandle {
    pub(crate) fn new(launch: Launch, callback: Callback, dispatcher: Dispatcher) -> Self {
        Self {
            inner: Arc::new(Inner {
                id: RequestId::new(),
                timeout: launch.timeout,
                slot: Mutex::new(Slot {
                    state: RequestState::Created,
                    callback: Some(callback),
                    launch: Some(launch),
                    cancel: None,
                }),
                dispatcher,
            }),
        }
    }

    pub fn id(&self) -> RequestId {
        self.inner.id
    }

    /// Timeout snapshot taken when the request was constructed.
    pub fn timeout(&self) -> Duration {
        self.inner.timeout
    }

    pub fn state(&self) -> RequestState {
        self.inner.slot.lock().state
    }

    pub fn is_cancelled(&self) -> bool {
        self.state() == RequestState::Cancelled
    }

    /// Begin the exchange on the client's runtime and return immediately.
    ///
    /// A request whose construction failed (bad URL, unencodable params)
    /// finishes right away with that error.
    pub fn start(&self) {
        let mut slot = self.inner.slot.lock();
        if slot.state != RequestState::Created {
            return;
        }
        let Some(launch) = slot.launch.take() else {
            return;
        };
        slot.state = RequestState::Running;

        let Launch {
            request,
            timeout,
            transport,
            runtime,
        } = launch;

        let request = match request {
            Ok(request) => request,
            Err(err) => {
                drop(slot);
                tracing::debug!(
                    target: "courier_core::handle",
                    "Request {} failed before dispatch: {}",
                    self.inner.id,
                    err
                );
                self.complete(Err(err));
                return;
            }
        };

        let cancel = CancellationToken::new();
        slot.cancel = Some(cancel.clone());
        drop(slot);

        tracing::debug!(
            target: "courier_core::handle",
            "Starting request {}: {} {}",
            self.inner.id,
            request.method,
            request.url
        );

        let mut guard = CompleteOnDrop {
            handle: Some(self.clone()),
            cancel: cancel.clone(),
        };
        runtime.spawn(async move {
            let exchange_cancel = cancel.clone();
            let exchange = tokio::task::spawn_blocking(move || {
                transport.execute(&request, timeout, &exchange_cancel)
            });
            tokio::select! {
                result = tokio::time::timeout(timeout, exchange) => {
                    let outcome = match result {
                        Err(_) => {
                            cancel.cancel();
                            Err(RequestError::Timeout)
                        }
                        Ok(Err(join_err)) => Err(RequestError::Transport(format!(
                            "transport task failed: {join_err}"
                        ))),
                        Ok(Ok(Ok(response))) if response.is_success() => Ok(response),
                        Ok(Ok(Ok(response))) => Err(RequestError::Server {
                            status: response.status,
                            body: response.body,
                        }),
                        Ok(Ok(Err(err))) => Err(err),
                    };
                    if let Some(handle) = guard.handle.take() {
                        handle.complete(outcome);
                    }
                }
                _ = cancel.cancelled() => {
                    // cancel() has already delivered the outcome.
                    guard.handle.take();
                }
            }
        });
    }

    /// Abort the request and deliver `RequestError::Cancelled`.
    ///
    /// Before `start()` no network activity ever happens. While running, the
    /// transport is told to stop and whatever it returns is discarded.
    pub fn cancel(&self) {
        let mut slot = self.inner.slot.lock();
        if slot.state.is_terminal() {
            return;
        }
        let was = slot.state;
        slot.state = RequestState::Cancelled;
        slot.launch = None;
        if let Some(cancel) = slot.cancel.take() {
            cancel.cancel();
        }
        let callback = slot.callback.take();
        drop(slot);

        tracing::debug!(
            target: "courier_core::handle",
            "Cancelled request {} ({:?})",
            self.inner.id,
            was
        );
        self.deliver(callback, Err(RequestError::Cancelled));
    }

    pub fn running(&self) -> bool {
        self.state() == RequestState::Running
    }

    pub fn finished(&self) -> bool {
        self.state() == RequestState::Finished
    }

    /// Move a running request to `Finished`. Late outcomes are dropped.
    fn complete(&self, outcome: Outcome) {
        let mut slot = self.inner.slot.lock();
        if slot.state != RequestState::Running {
            tracing::debug!(
                target: "courier_core::handle",
                "Discarding late outcome for request {} ({:?})",
                self.inner.id,
                slot.state
            );
            return;
        }
        slot.state = RequestState::Finished;
        slot.cancel = None;
        let callback = slot.callback.take();
        drop(slot);

        match &outcome {
            Ok(response) => tracing::debug!(
                target: "courier_core::handle",
                "Request {} finished with HTTP {}",
                self.inner.id,
                response.status
            ),
            Err(err) => tracing::debug!(
                target: "courier_core::handle",
                "Request {} failed: {}",
                self.inner.id,
                err
            ),
        }
        self.deliver(callback, outcome);
    }

    fn deliver(&self, callback: Option<Callback>, outcome: Outcome) {
        let Some(callback) = callback else {
            return;
        };
        let handle = self.clone();
        if !self.inner.dispatcher.dispatch(move || callback(&handle, outcome)) {
            tracing::warn!(
                target: "courier_core::handle",
                "Callback thread is gone; dropping outcome of request {}",
                self.inner.id
            );
        }
    }
}

impl RequestLifecycle for RequestHandle {
    fn start(&self) {
        RequestHandle::start(self)
    }

    fn cancel(&self) {
        RequestHandle::cancel(self)
    }

    fn running(&self) -> bool {
        RequestHandle::running(self)
    }

    fn finished(&self) -> bool {
        RequestHandle::finished(self)
    }
}

impl fmt::Debug for RequestHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestHandle")
            .field("id", &self.inner.id)
            .field("state", &self.state())
            .field("timeout", &self.inner.timeout)
            .finish()
    }
}

/// Finishes the request with a transport error if the task is dropped
/// before it produced an outcome, e.g. when the client's runtime shuts down.
/// The exchange is told to stop as well.
struct CompleteOnDrop {
    handle: Option<RequestHandle>,
    cancel: CancellationToken,
}

impl Drop for CompleteOnDrop {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            self.cancel.cancel();
            handle.complete(Err(RequestError::Transport(
                "client runtime shut down".to_string(),
            )));
        }
    }
}

/// Receiving side of a request built with `HttpClient::request_pending`.
///
/// Resolves once, with the same outcome a callback would have received.
#[derive(Debug)]
pub struct Completion {
    rx: oneshot::Receiver<Outcome>,
}

impl Completion {
    pub(crate) fn channel() -> (Callback, Self) {
        let (tx, rx) = oneshot::channel();
        let callback: Callback = Box::new(move |_, outcome| {
            let _ = tx.send(outcome);
        });
        (callback, Self { rx })
    }

    /// Wait for the outcome.
    ///
    /// A handle dropped without ever being started or cancelled resolves as
    /// `Cancelled`.
    pub async fn wait(self) -> Outcome {
        self.rx.await.unwrap_or(Err(RequestError::Cancelled))
    }

    /// Blocking variant of `wait`. Must not be called from async code.
    pub fn wait_blocking(self) -> Outcome {
        self.rx.blocking_recv().unwrap_or(Err(RequestError::Cancelled))
    }

    /// Take the outcome if it has already arrived.
    pub fn try_take(&mut self) -> Option<Outcome> {
        self.rx.try_recv().ok()
    }
}
