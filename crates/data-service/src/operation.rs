//! Operation handle: one outbound call and its subscribers
//!
//! The call is issued the moment the handle is built. It settles exactly once
//! with one of three outcomes, and each outcome is delivered to its own
//! subscriber channel followed by the completion channel:
//!
//! - Success → `next` subscribers, then `complete(false)`
//! - Failure → `error` subscribers, then `complete(false)`
//! - Cancelled → `cancel` subscribers, then `complete(true)`
//!
//! Phases:
//! - Pending: subscriptions are queued
//! - Settled: the outcome is fixed and the queue has been handed to the
//!   settling task; any later subscription, including one made from inside a
//!   callback or while the queue is still being delivered, replays the stored
//!   outcome synchronously
//!
//! The state lock is never held while a callback runs.

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use reqwest::Method;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::cancel::CancelToken;
use crate::decode::{Decoder, Response};
use crate::error::{Error, Result};
use crate::metrics;
use crate::transport::{Exchange, Request, Transport};

type NextFn = Box<dyn FnOnce(&Response) + Send>;
type ErrorFn = Box<dyn FnOnce(&Error) + Send>;
type CancelFn = Box<dyn FnOnce() + Send>;
type CompleteFn = Box<dyn FnOnce(bool) + Send>;

/// Terminal outcome of an operation. Immutable once set.
#[derive(Clone)]
enum Outcome {
    Success(Arc<Response>),
    Failure(Arc<Error>),
    Cancelled,
}

impl Outcome {
    fn status(&self) -> Status {
        match self {
            Outcome::Success(_) => Status::Succeeded,
            Outcome::Failure(_) => Status::Failed,
            Outcome::Cancelled => Status::Cancelled,
        }
    }
}

/// Externally visible lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Pending,
    Succeeded,
    Failed,
    Cancelled,
}

impl Status {
    /// Status label for logging and metrics.
    pub fn label(&self) -> &'static str {
        match self {
            Status::Pending => "pending",
            Status::Succeeded => "succeeded",
            Status::Failed => "failed",
            Status::Cancelled => "cancelled",
        }
    }
}

enum Phase {
    Pending,
    Settled(Outcome),
}

/// A bundle of callbacks, at most one per category.
///
/// ```ignore
/// let subscription = operation.subscribe(
///     Observer::new()
///         .on_next(|resp| println!("{}", resp.status))
///         .on_complete(|cancelled| println!("done, cancelled={cancelled}")),
/// );
/// ```
#[derive(Default)]
pub struct Observer {
    next: Option<NextFn>,
    error: Option<ErrorFn>,
    cancel: Option<CancelFn>,
    complete: Option<CompleteFn>,
}

impl Observer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_next(mut self, f: impl FnOnce(&Response) + Send + 'static) -> Self {
        self.next = Some(Box::new(f));
        self
    }

    pub fn on_error(mut self, f: impl FnOnce(&Error) + Send + 'static) -> Self {
        self.error = Some(Box::new(f));
        self
    }

    pub fn on_cancel(mut self, f: impl FnOnce() + Send + 'static) -> Self {
        self.cancel = Some(Box::new(f));
        self
    }

    pub fn on_complete(mut self, f: impl FnOnce(bool) + Send + 'static) -> Self {
        self.complete = Some(Box::new(f));
        self
    }
}

/// Ordered subscriber lists, tagged with the owning subscription id.
#[derive(Default)]
struct Subscribers {
    next: Vec<(u64, NextFn)>,
    error: Vec<(u64, ErrorFn)>,
    cancel: Vec<(u64, CancelFn)>,
    complete: Vec<(u64, CompleteFn)>,
}

impl Subscribers {
    fn push(&mut self, id: u64, observer: Observer) {
        if let Some(f) = observer.next {
            self.next.push((id, f));
        }
        if let Some(f) = observer.error {
            self.error.push((id, f));
        }
        if let Some(f) = observer.cancel {
            self.cancel.push((id, f));
        }
        if let Some(f) = observer.complete {
            self.complete.push((id, f));
        }
    }

    fn remove(&mut self, id: u64) {
        self.next.retain(|(owner, _)| *owner != id);
        self.error.retain(|(owner, _)| *owner != id);
        self.cancel.retain(|(owner, _)| *owner != id);
        self.complete.retain(|(owner, _)| *owner != id);
    }

    fn is_empty(&self) -> bool {
        self.next.is_empty()
            && self.error.is_empty()
            && self.cancel.is_empty()
            && self.complete.is_empty()
    }

    fn from_observer(id: u64, observer: Observer) -> Self {
        let mut subscribers = Self::default();
        subscribers.push(id, observer);
        subscribers
    }

    /// Invoke the terminal category matching `outcome`, then completion.
    /// Callbacks for categories that did not occur are dropped unfired.
    fn deliver(self, outcome: &Outcome) {
        match outcome {
            Outcome::Success(response) => {
                for (_, f) in self.next {
                    f(response);
                }
            }
            Outcome::Failure(error) => {
                for (_, f) in self.error {
                    f(error);
                }
            }
            Outcome::Cancelled => {
                for (_, f) in self.cancel {
                    f();
                }
            }
        }
        let cancelled = matches!(outcome, Outcome::Cancelled);
        for (_, f) in self.complete {
            f(cancelled);
        }
    }
}

struct State {
    phase: Phase,
    subscribers: Subscribers,
}

struct Shared {
    token: CancelToken,
    method: Method,
    url: String,
    state: Mutex<State>,
    next_subscription: AtomicU64,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, State> {
        // Callbacks never run under the lock, so poisoning cannot leave the state torn.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn subscribe(&self, id: u64, observer: Observer) {
        let outcome = {
            let mut state = self.lock();
            let settled = match &state.phase {
                Phase::Settled(outcome) => Some(outcome.clone()),
                Phase::Pending => None,
            };
            match settled {
                Some(outcome) => outcome,
                None => {
                    state.subscribers.push(id, observer);
                    return;
                }
            }
        };
        Subscribers::from_observer(id, observer).deliver(&outcome);
    }

    /// Fix the outcome and notify every queued subscriber exactly once.
    ///
    /// The queue is taken in the same critical section that fixes the outcome,
    /// so nothing can be queued after it and missed.
    fn settle(&self, outcome: Outcome) {
        let queued = {
            let mut state = self.lock();
            if !matches!(state.phase, Phase::Pending) {
                warn!(operation_id = %self.token.id(), "operation already settled, ignoring outcome");
                return;
            }
            state.phase = Phase::Settled(outcome.clone());
            std::mem::take(&mut state.subscribers)
        };
        queued.deliver(&outcome);
    }

    fn status(&self) -> Status {
        match &self.lock().phase {
            Phase::Pending => Status::Pending,
            Phase::Settled(outcome) => outcome.status(),
        }
    }
}

/// Handle to one in-flight (or settled) call. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct Operation {
    shared: Arc<Shared>,
}

impl Operation {
    /// Build the handle and issue the call immediately on the tokio runtime.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(
        request: Request,
        token: CancelToken,
        transport: Arc<dyn Transport>,
        decoder: Arc<dyn Decoder>,
    ) -> Self {
        let method = request.method.clone();
        let url = request.url.clone();
        let call_token = token.clone();
        Self::launch(method, url, token, async move {
            execute(&call_token, request, transport.as_ref(), decoder.as_ref()).await
        })
    }

    /// Build a handle that settles with `error` without touching the network.
    ///
    /// Used when a request cannot be prepared; the failure is still reported
    /// asynchronously through the error channel.
    pub fn reject(method: Method, url: String, token: CancelToken, error: Error) -> Self {
        Self::launch(method, url, token, async move { Err(error) })
    }

    fn launch<F>(method: Method, url: String, token: CancelToken, call: F) -> Self
    where
        F: Future<Output = Result<Response>> + Send + 'static,
    {
        let shared = Arc::new(Shared {
            token,
            method,
            url,
            state: Mutex::new(State {
                phase: Phase::Pending,
                subscribers: Subscribers::default(),
            }),
            next_subscription: AtomicU64::new(0),
        });
        debug!(
            operation_id = %shared.token.id(),
            method = %shared.method,
            url = %shared.url,
            "operation started"
        );

        let task_shared = shared.clone();
        tokio::spawn(async move {
            let started = Instant::now();
            let result = call.await;
            let outcome = classify(result, &task_shared.token);
            let status = outcome.status();
            match &outcome {
                Outcome::Success(response) => info!(
                    operation_id = %task_shared.token.id(),
                    method = %task_shared.method,
                    url = %task_shared.url,
                    status = response.status,
                    outcome = status.label(),
                    "operation settled"
                ),
                Outcome::Failure(error) => warn!(
                    operation_id = %task_shared.token.id(),
                    method = %task_shared.method,
                    url = %task_shared.url,
                    error = %error,
                    outcome = status.label(),
                    "operation settled"
                ),
                Outcome::Cancelled => info!(
                    operation_id = %task_shared.token.id(),
                    method = %task_shared.method,
                    url = %task_shared.url,
                    outcome = status.label(),
                    "operation settled"
                ),
            }
            metrics::record_settlement(
                task_shared.method.as_str(),
                status.label(),
                started.elapsed().as_secs_f64(),
            );
            task_shared.settle(outcome);
        });

        Self { shared }
    }

    /// Identity of this operation (its cancellation token id).
    pub fn id(&self) -> Uuid {
        self.shared.token.id()
    }

    pub fn token(&self) -> &CancelToken {
        &self.shared.token
    }

    pub fn method(&self) -> &Method {
        &self.shared.method
    }

    pub fn url(&self) -> &str {
        &self.shared.url
    }

    pub fn status(&self) -> Status {
        self.shared.status()
    }

    pub fn is_settled(&self) -> bool {
        self.status() != Status::Pending
    }

    /// Request cancellation. Idempotent; settlement still happens asynchronously.
    pub fn cancel(&self) {
        if !self.shared.token.is_cancelled() {
            debug!(operation_id = %self.id(), "cancellation requested");
        }
        self.shared.token.cancel();
    }

    /// Register an observer. Settled operations replay synchronously.
    pub fn subscribe(&self, observer: Observer) -> Subscription {
        let id = self.shared.next_subscription.fetch_add(1, Ordering::Relaxed);
        self.shared.subscribe(id, observer);
        Subscription {
            id,
            shared: self.shared.clone(),
        }
    }

    pub fn on_next(&self, f: impl FnOnce(&Response) + Send + 'static) -> &Self {
        self.subscribe(Observer::new().on_next(f));
        self
    }

    pub fn on_error(&self, f: impl FnOnce(&Error) + Send + 'static) -> &Self {
        self.subscribe(Observer::new().on_error(f));
        self
    }

    pub fn on_cancel(&self, f: impl FnOnce() + Send + 'static) -> &Self {
        self.subscribe(Observer::new().on_cancel(f));
        self
    }

    /// Completion fires once after the terminal category; the flag is true when cancelled.
    pub fn on_complete(&self, f: impl FnOnce(bool) + Send + 'static) -> &Self {
        self.subscribe(Observer::new().on_complete(f));
        self
    }
}

impl fmt::Debug for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Operation")
            .field("id", &self.id())
            .field("method", self.method())
            .field("url", &self.url())
            .field("status", &self.status())
            .finish()
    }
}

/// Capability to withdraw an observer's callbacks before the operation settles.
///
/// Once the outcome is fixed the queued callbacks belong to the settling task,
/// so unsubscribing after that point has no effect.
pub struct Subscription {
    id: u64,
    shared: Arc<Shared>,
}

impl Subscription {
    pub fn unsubscribe(self) {
        self.shared.lock().subscribers.remove(self.id);
    }
}

/// Run the call, racing each suspension point against the token.
async fn execute(
    token: &CancelToken,
    request: Request,
    transport: &dyn Transport,
    decoder: &dyn Decoder,
) -> Result<Response> {
    let exchange = tokio::select! {
        biased;
        _ = token.cancelled() => return Err(Error::Interrupted),
        result = transport.send(request) => result?,
    };
    if token.is_cancelled() {
        return Err(Error::Interrupted);
    }

    let Exchange {
        status,
        headers,
        body,
    } = exchange;
    let bytes = tokio::select! {
        biased;
        _ = token.cancelled() => return Err(Error::Interrupted),
        result = body => result?,
    };
    let data = decoder.decode(status, &headers, bytes)?;
    Ok(Response {
        status,
        headers,
        data,
    })
}

/// A failure counts as cancellation when it is the interruption marker or
/// when the token was triggered before the failure surfaced.
fn classify(result: Result<Response>, token: &CancelToken) -> Outcome {
    match result {
        Ok(response) => Outcome::Success(Arc::new(response)),
        Err(e) if e.is_interruption() || token.is_cancelled() => Outcome::Cancelled,
        Err(e) => Outcome::Failure(Arc::new(e)),
    }
}
