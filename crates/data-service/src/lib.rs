//! Client-side request lifecycle manager
//!
//! Wraps each outbound HTTP call in an `Operation` handle with event-style
//! subscriptions (next, error, cancel, complete), and keeps a `Pool` of
//! in-flight operations with timeout eviction and bulk cancellation.
//!
//! Operation lifecycle:
//! 1. Caller invokes `Pool::get/post/put/delete` → defaults merged, call issued
//! 2. Pool arms a timeout trigger and tracks the operation under its token id
//! 3. Operation settles once: success, error, or cancellation (caller or timeout)
//! 4. Subscribers receive the matching terminal event, then completion
//! 5. Completion disarms the trigger and drops the pool's tracking entry
//!
//! Subscribers registered after settlement get the stored outcome replayed
//! synchronously.

pub mod cancel;
pub mod config;
pub mod decode;
pub mod error;
pub mod metrics;
pub mod operation;
pub mod pool;
pub mod timeout;
pub mod transport;

#[cfg(test)]
mod testing;

pub use cancel::CancelToken;
pub use config::{HeaderEntry, PoolConfig};
pub use decode::{ContentDecoder, Decoder, Payload, Response};
pub use error::{Error, Result};
pub use operation::{Observer, Operation, Status, Subscription};
pub use pool::{Defaults, Pool, RequestBody};
pub use timeout::TimeoutGuard;
pub use transport::{Exchange, HttpTransport, Request, Transport};
