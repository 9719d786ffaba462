//! Test doubles for driving operations deterministically

use std::sync::{Arc, Mutex};

use bytes::Bytes;
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderValue};
use tokio::sync::{mpsc, oneshot};

use crate::error::{Error, Result};
use crate::operation::Operation;
use crate::transport::{BoxFuture, Exchange, Request, Transport};

/// Transport whose calls are answered by the test through `CallQueue`.
#[derive(Clone)]
pub struct ManualTransport {
    tx: mpsc::UnboundedSender<PendingCall>,
}

/// Receiving side of `ManualTransport`: one `PendingCall` per `send`.
pub struct CallQueue {
    rx: mpsc::UnboundedReceiver<PendingCall>,
}

/// A call waiting for the test to answer it. Dropping it fails the call.
pub struct PendingCall {
    pub request: Request,
    reply: oneshot::Sender<Result<Exchange>>,
}

impl ManualTransport {
    pub fn new() -> (Self, CallQueue) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, CallQueue { rx })
    }
}

impl Transport for ManualTransport {
    fn send(&self, request: Request) -> BoxFuture<'static, Result<Exchange>> {
        let (reply, rx) = oneshot::channel();
        let queued = self.tx.send(PendingCall { request, reply }).is_ok();
        Box::pin(async move {
            if !queued {
                return Err(Error::Transport("call queue closed".into()));
            }
            rx.await
                .unwrap_or_else(|_| Err(Error::Transport("call dropped by test".into())))
        })
    }
}

impl CallQueue {
    pub async fn next(&mut self) -> PendingCall {
        self.rx.recv().await.expect("transport dropped")
    }
}

impl PendingCall {
    pub fn reply(self, exchange: Exchange) {
        let _ = self.reply.send(Ok(exchange));
    }

    pub fn fail(self, message: &str) {
        let _ = self.reply.send(Err(Error::Transport(message.to_string())));
    }

    /// Answer with headers only; the body resolves when the returned sender fires.
    pub fn reply_with_pending_body(self, status: u16) -> oneshot::Sender<Bytes> {
        let (gate, body) = oneshot::channel::<Bytes>();
        let _ = self.reply.send(Ok(Exchange {
            status,
            headers: HeaderMap::new(),
            body: Box::pin(async move {
                body.await
                    .map_err(|_| Error::Transport("body stream closed".into()))
            }),
        }));
        gate
    }
}

/// Transport that answers every call immediately and records what it was sent.
#[derive(Clone)]
pub struct StaticTransport {
    reply: Arc<dyn Fn(&Request) -> Result<Exchange> + Send + Sync>,
    seen: Arc<Mutex<Vec<Request>>>,
}

impl StaticTransport {
    pub fn new(reply: impl Fn(&Request) -> Result<Exchange> + Send + Sync + 'static) -> Self {
        Self {
            reply: Arc::new(reply),
            seen: Arc::default(),
        }
    }

    pub fn requests(&self) -> Vec<Request> {
        self.seen.lock().unwrap().clone()
    }
}

impl Transport for StaticTransport {
    fn send(&self, request: Request) -> BoxFuture<'static, Result<Exchange>> {
        let result = (self.reply)(&request);
        self.seen.lock().unwrap().push(request);
        Box::pin(async move { result })
    }
}

pub fn json_exchange(status: u16, body: &str) -> Exchange {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    Exchange::ready(status, headers, Bytes::copy_from_slice(body.as_bytes()))
}

/// Ordered record of callback invocations shared between callbacks.
#[derive(Clone, Default)]
pub struct EventLog(Arc<Mutex<Vec<String>>>);

impl EventLog {
    pub fn push(&self, event: impl Into<String>) {
        self.0.lock().unwrap().push(event.into());
    }

    pub fn events(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }
}

/// Wait for completion and return its `cancelled` flag.
pub async fn settled(op: &Operation) -> bool {
    let (tx, rx) = oneshot::channel();
    op.on_complete(move |cancelled| {
        let _ = tx.send(cancelled);
    });
    rx.await.expect("completion callback dropped without firing")
}
