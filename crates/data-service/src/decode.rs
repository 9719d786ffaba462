//! Response body decoding by declared content type
//!
//! Selection policy:
//! 1. No body (204/205/304 or zero bytes) → `Payload::Empty`
//! 2. content-type mentions `json` → parsed JSON value
//! 3. content-type mentions `text` → UTF-8 text
//! 4. anything else, including a missing content-type → opaque bytes

use bytes::Bytes;
use reqwest::header::{CONTENT_TYPE, HeaderMap};
use serde::de::DeserializeOwned;

use crate::error::{Error, Result};

/// Decoded response body.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Empty,
    Json(serde_json::Value),
    Text(String),
    Binary(Bytes),
}

impl Payload {
    pub fn is_empty(&self) -> bool {
        matches!(self, Payload::Empty)
    }

    pub fn as_json(&self) -> Option<&serde_json::Value> {
        match self {
            Payload::Json(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Payload::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&Bytes> {
        match self {
            Payload::Binary(b) => Some(b),
            _ => None,
        }
    }
}

/// A settled, decoded response as delivered to `next` subscribers.
#[derive(Debug, Clone)]
pub struct Response {
    pub status: u16,
    pub headers: HeaderMap,
    pub data: Payload,
}

impl Response {
    /// Deserialize a JSON payload into a caller type.
    ///
    /// Returns `Error::Decode` when the payload is not JSON or does not match `T`.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        match &self.data {
            Payload::Json(v) => serde_json::from_value(v.clone())
                .map_err(|e| Error::Decode(format!("response does not match target type: {e}"))),
            other => Err(Error::Decode(format!(
                "expected a JSON payload, got {}",
                payload_kind(other)
            ))),
        }
    }
}

fn payload_kind(payload: &Payload) -> &'static str {
    match payload {
        Payload::Empty => "an empty body",
        Payload::Json(_) => "JSON",
        Payload::Text(_) => "text",
        Payload::Binary(_) => "binary data",
    }
}

/// Turns a raw body into a `Payload`.
pub trait Decoder: Send + Sync {
    fn decode(&self, status: u16, headers: &HeaderMap, body: Bytes) -> Result<Payload>;
}

/// Default decoder keyed on the `content-type` header.
#[derive(Debug, Clone, Copy, Default)]
pub struct ContentDecoder;

impl Decoder for ContentDecoder {
    fn decode(&self, status: u16, headers: &HeaderMap, body: Bytes) -> Result<Payload> {
        if matches!(status, 204 | 205 | 304) || body.is_empty() {
            return Ok(Payload::Empty);
        }

        let content_type = headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_ascii_lowercase();

        if content_type.contains("json") {
            serde_json::from_slice(&body)
                .map(Payload::Json)
                .map_err(|e| Error::Decode(format!("invalid JSON body: {e}")))
        } else if content_type.contains("text") {
            String::from_utf8(body.to_vec())
                .map(Payload::Text)
                .map_err(|e| Error::Decode(format!("invalid UTF-8 text body: {e}")))
        } else {
            Ok(Payload::Binary(body))
        }
    }
}
