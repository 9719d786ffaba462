//! Operation pool: factory and registry for in-flight operations
//!
//! The pool owns the request defaults (base URL, headers, timeout), builds
//! every operation, and tracks it under its token id together with its
//! timeout trigger. An entry lives exactly as long as its operation is
//! unsettled: the operation's completion callback disarms the trigger and
//! removes the entry.
//!
//! Entry lifecycle:
//! 1. `create` builds the operation (call already issued) and arms the trigger
//! 2. Entry inserted into the tracking map
//! 3. Completion callback registered; an operation that settled in the meantime
//!    replays completion synchronously, so the entry is still removed
//! 4. Settlement (success, error, timeout or `abort_all`) → trigger disarmed,
//!    entry removed

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, RwLock, Weak};
use std::time::Duration;

use bytes::Bytes;
use reqwest::Method;
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderValue};
use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::cancel::CancelToken;
use crate::config::PoolConfig;
use crate::decode::{ContentDecoder, Decoder};
use crate::error::{Error, Result};
use crate::metrics;
use crate::operation::Operation;
use crate::timeout::TimeoutGuard;
use crate::transport::{HttpTransport, Request, Transport};

/// Defaults applied to every operation created after they are set.
#[derive(Debug, Clone)]
pub struct Defaults {
    pub base_url: String,
    pub headers: HeaderMap,
    pub timeout: Duration,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            headers: HeaderMap::new(),
            timeout: Duration::from_secs(30),
        }
    }
}

/// Request body with an explicit wire treatment.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    /// Sent unchanged; no content-type is added.
    Raw(Bytes),
    /// Serialized as JSON; `content-type: application/json` is added unless the caller set one.
    Json(serde_json::Value),
}

impl RequestBody {
    /// Capture any serializable value as a structured body.
    pub fn json<T: Serialize + ?Sized>(value: &T) -> Result<Self> {
        serde_json::to_value(value)
            .map(RequestBody::Json)
            .map_err(|e| Error::Config(format!("body is not serializable: {e}")))
    }

    fn into_bytes(self, headers: &mut HeaderMap) -> Result<Bytes> {
        match self {
            RequestBody::Raw(bytes) => Ok(bytes),
            RequestBody::Json(value) => {
                let bytes = serde_json::to_vec(&value)
                    .map_err(|e| Error::Config(format!("serializing body: {e}")))?;
                if !headers.contains_key(CONTENT_TYPE) {
                    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
                }
                Ok(Bytes::from(bytes))
            }
        }
    }
}

impl From<Bytes> for RequestBody {
    fn from(bytes: Bytes) -> Self {
        RequestBody::Raw(bytes)
    }
}

impl From<Vec<u8>> for RequestBody {
    fn from(bytes: Vec<u8>) -> Self {
        RequestBody::Raw(Bytes::from(bytes))
    }
}

impl From<serde_json::Value> for RequestBody {
    fn from(value: serde_json::Value) -> Self {
        RequestBody::Json(value)
    }
}

/// Tracking entry: the operation and its timeout trigger, stored under one key.
struct Tracked {
    operation: Operation,
    timeout: TimeoutGuard,
}

struct Inner {
    transport: Arc<dyn Transport>,
    decoder: Arc<dyn Decoder>,
    defaults: RwLock<Defaults>,
    tracked: Mutex<HashMap<Uuid, Tracked>>,
}

impl Inner {
    fn tracked(&self) -> MutexGuard<'_, HashMap<Uuid, Tracked>> {
        self.tracked.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn untrack(&self, id: Uuid) {
        let (removed, remaining) = {
            let mut tracked = self.tracked();
            let removed = tracked.remove(&id);
            // Gauge writes stay ordered with map updates.
            if removed.is_some() {
                metrics::record_in_flight(tracked.len());
            }
            (removed, tracked.len())
        };
        if let Some(entry) = removed {
            entry.timeout.disarm();
            debug!(operation_id = %id, in_flight = remaining, "operation untracked");
        }
    }
}

/// Factory and registry for operations. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct Pool {
    inner: Arc<Inner>,
}

impl Pool {
    /// Create a pool that issues calls through `transport`.
    pub fn new(transport: Arc<dyn Transport>, defaults: Defaults) -> Self {
        Self::with_decoder(transport, Arc::new(ContentDecoder), defaults)
    }

    pub fn with_decoder(
        transport: Arc<dyn Transport>,
        decoder: Arc<dyn Decoder>,
        defaults: Defaults,
    ) -> Self {
        info!(
            base_url = %defaults.base_url,
            headers = defaults.headers.len(),
            timeout_ms = defaults.timeout.as_millis() as u64,
            "pool initialized"
        );
        Self {
            inner: Arc::new(Inner {
                transport,
                decoder,
                defaults: RwLock::new(defaults),
                tracked: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Create a pool backed by a `reqwest::Client`.
    pub fn with_client(client: reqwest::Client, defaults: Defaults) -> Self {
        Self::new(Arc::new(HttpTransport::new(client)), defaults)
    }

    pub fn from_config(config: &PoolConfig) -> Self {
        Self::with_client(reqwest::Client::new(), config.defaults())
    }

    /// Replace the defaults. Operations already created keep the values they were built with.
    pub fn initialize(&self, base_url: impl Into<String>, headers: HeaderMap, timeout: Duration) {
        let defaults = Defaults {
            base_url: base_url.into(),
            headers,
            timeout,
        };
        info!(
            base_url = %defaults.base_url,
            headers = defaults.headers.len(),
            timeout_ms = defaults.timeout.as_millis() as u64,
            "pool defaults replaced"
        );
        *self
            .inner
            .defaults
            .write()
            .unwrap_or_else(|e| e.into_inner()) = defaults;
    }

    /// Snapshot of the current defaults.
    pub fn defaults(&self) -> Defaults {
        self.inner
            .defaults
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn get(&self, route: &str, headers: Option<HeaderMap>) -> Operation {
        self.create(Method::GET, route, headers, None)
    }

    pub fn post(
        &self,
        route: &str,
        body: impl Into<RequestBody>,
        headers: Option<HeaderMap>,
    ) -> Operation {
        self.create(Method::POST, route, headers, Some(body.into()))
    }

    pub fn put(
        &self,
        route: &str,
        body: impl Into<RequestBody>,
        headers: Option<HeaderMap>,
    ) -> Operation {
        self.create(Method::PUT, route, headers, Some(body.into()))
    }

    pub fn delete(&self, route: &str, headers: Option<HeaderMap>) -> Operation {
        self.create(Method::DELETE, route, headers, None)
    }

    /// Build, issue and track one operation.
    ///
    /// Never fails synchronously: a request that cannot be prepared settles
    /// through the operation's error channel.
    pub fn create(
        &self,
        method: Method,
        route: &str,
        headers: Option<HeaderMap>,
        body: Option<RequestBody>,
    ) -> Operation {
        let defaults = self.defaults();
        let url = format!("{}{}", defaults.base_url, route);
        let token = CancelToken::new();

        let operation = match prepare(method.clone(), url.clone(), defaults.headers, headers, body) {
            Ok(request) => Operation::start(
                request,
                token,
                self.inner.transport.clone(),
                self.inner.decoder.clone(),
            ),
            Err(e) => {
                warn!(method = %method, url = %url, error = %e, "request could not be prepared");
                Operation::reject(method, url, token, e)
            }
        };

        let id = operation.id();
        let timeout = TimeoutGuard::arm(operation.clone(), defaults.timeout);
        {
            let mut tracked = self.inner.tracked();
            tracked.insert(
                id,
                Tracked {
                    operation: operation.clone(),
                    timeout,
                },
            );
            metrics::record_in_flight(tracked.len());
        }

        let registry: Weak<Inner> = Arc::downgrade(&self.inner);
        operation.on_complete(move |_| {
            if let Some(inner) = registry.upgrade() {
                inner.untrack(id);
            }
        });
        operation
    }

    /// Cancel every tracked operation. Returns how many were signalled.
    ///
    /// Works on a snapshot: cancelled operations remove themselves as they
    /// settle, independently of this loop.
    pub fn abort_all(&self) -> usize {
        let snapshot: Vec<Operation> = self
            .inner
            .tracked()
            .values()
            .map(|entry| entry.operation.clone())
            .collect();
        info!(operations = snapshot.len(), "aborting all in-flight operations");
        for operation in &snapshot {
            operation.cancel();
        }
        snapshot.len()
    }

    /// Number of operations currently tracked.
    pub fn in_flight(&self) -> usize {
        self.inner.tracked().len()
    }

    /// Whether the operation with this id is still tracked.
    pub fn is_tracked(&self, id: Uuid) -> bool {
        self.inner.tracked().contains_key(&id)
    }
}

/// Merge headers (per-call values replace defaults with the same name) and encode the body.
fn prepare(
    method: Method,
    url: String,
    defaults: HeaderMap,
    overrides: Option<HeaderMap>,
    body: Option<RequestBody>,
) -> Result<Request> {
    let mut headers = merge_headers(defaults, overrides);
    let body = body.map(|b| b.into_bytes(&mut headers)).transpose()?;
    Ok(Request {
        method,
        url,
        headers,
        body,
    })
}

fn merge_headers(defaults: HeaderMap, overrides: Option<HeaderMap>) -> HeaderMap {
    let mut merged = defaults;
    if let Some(overrides) = overrides {
        for name in overrides.keys() {
            merged.remove(name);
        }
        for (name, value) in &overrides {
            merged.append(name.clone(), value.clone());
        }
    }
    merged
}
