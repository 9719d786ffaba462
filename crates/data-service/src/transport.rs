//! Transport seam for issuing a single call
//!
//! An operation talks to the network only through `Transport`, which keeps
//! the lifecycle machinery independent of the HTTP client. A call has two
//! suspension points: `send` resolves once status and headers are available,
//! and `Exchange::body` resolves once the full body has been read.
//!
//! Uses `Pin<Box<dyn Future>>` return types for dyn-compatibility (`Arc<dyn Transport>`).

use std::fmt;
use std::future::Future;
use std::pin::Pin;

use bytes::Bytes;
use reqwest::Method;
use reqwest::header::HeaderMap;
use tracing::debug;

use crate::error::{Error, Result};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A fully resolved outbound request.
#[derive(Debug, Clone)]
pub struct Request {
    pub method: Method,
    pub url: String,
    pub headers: HeaderMap,
    pub body: Option<Bytes>,
}

/// Status line and headers of a response whose body has not been read yet.
pub struct Exchange {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: BoxFuture<'static, Result<Bytes>>,
}

impl Exchange {
    /// Build an exchange whose body is already in memory.
    pub fn ready(status: u16, headers: HeaderMap, body: Bytes) -> Self {
        Self {
            status,
            headers,
            body: Box::pin(async move { Ok(body) }),
        }
    }
}

impl fmt::Debug for Exchange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Exchange")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .finish_non_exhaustive()
    }
}

/// Issues requests on behalf of operations.
pub trait Transport: Send + Sync {
    fn send(&self, request: Request) -> BoxFuture<'static, Result<Exchange>>;
}

/// `Transport` backed by a shared `reqwest::Client`.
#[derive(Debug, Clone, Default)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

impl Transport for HttpTransport {
    fn send(&self, request: Request) -> BoxFuture<'static, Result<Exchange>> {
        let mut builder = self
            .client
            .request(request.method, &request.url)
            .headers(request.headers);
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        Box::pin(async move {
            let response = builder.send().await?;
            let status = response.status().as_u16();
            let headers = response.headers().clone();
            debug!(status, "response headers received");
            Ok(Exchange {
                status,
                headers,
                body: Box::pin(async move {
                    response
                        .bytes()
                        .await
                        .map_err(|e| Error::Transport(format!("reading response body: {e}")))
                }),
            })
        })
    }
}
