//! Call invoker: one authenticated round trip per remote method.
//!
//! [`Client`] owns the protocol side of a call (encode the request, decode
//! the envelope, classify failures) and delegates the wire to an
//! [`ApiCaller`]. The HTTP implementation lives in `courier-transport`; tests
//! use the scripted caller from [`testing`](crate::testing).

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, info};

use crate::codec::{Body, Encoding, ResponseEnvelope, ToFields, pretty_json};
use crate::error::{ProtocolError, Result, TransportResult};
use crate::method::Method;

// =============================================================================
// ApiCaller trait
// =============================================================================

/// Transport-specific request mechanism.
///
/// Implementations POST `body` to the endpoint for `method` and return the
/// full response body. Any HTTP status is acceptable as long as the body
/// can carry a response envelope; everything else is a [`TransportError`].
///
/// `timeout` bounds this one request and replaces the caller's default; a
/// long poll passes its own so the server may hold it open.
///
/// [`TransportError`]: crate::TransportError
#[async_trait]
pub trait ApiCaller: Send + Sync {
    /// Issues one request and reads the whole response body.
    async fn post(
        &self,
        method: &str,
        body: &Body,
        timeout: Option<Duration>,
    ) -> TransportResult<Vec<u8>>;
}

// =============================================================================
// Client
// =============================================================================

/// Cheaply cloneable handle for calling remote methods.
///
/// Clones share the underlying caller (and its connection pool) but no other
/// state, so they can be used from handlers and from other tasks while the
/// update loop runs.
#[derive(Clone)]
pub struct Client {
    caller: Arc<dyn ApiCaller>,
    encoding: Encoding,
    debug: bool,
}

impl Client {
    /// Creates a client over `caller`.
    pub fn new(caller: Arc<dyn ApiCaller>) -> Self {
        Self {
            caller,
            encoding: Encoding::default(),
            debug: false,
        }
    }

    /// Sets the body encoding.
    pub fn with_encoding(mut self, encoding: Encoding) -> Self {
        self.encoding = encoding;
        self
    }

    /// Enables logging of every response body.
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Returns whether debug logging is enabled.
    pub fn debug(&self) -> bool {
        self.debug
    }

    /// Returns the body encoding in use.
    pub fn encoding(&self) -> Encoding {
        self.encoding
    }

    /// Calls `method` and returns the raw `result` fragment.
    pub async fn call_raw<R>(&self, method: &str, request: &R) -> Result<Value>
    where
        R: ToFields + ?Sized,
    {
        self.round_trip(method, request, None).await
    }

    /// Like [`call_raw`](Self::call_raw), bounding the request by `timeout`
    /// instead of the transport default.
    pub async fn call_raw_with_timeout<R>(
        &self,
        method: &str,
        request: &R,
        timeout: Duration,
    ) -> Result<Value>
    where
        R: ToFields + ?Sized,
    {
        self.round_trip(method, request, Some(timeout)).await
    }

    async fn round_trip<R>(&self, method: &str, request: &R, timeout: Option<Duration>) -> Result<Value>
    where
        R: ToFields + ?Sized,
    {
        let body = request.to_fields()?.into_body(self.encoding);
        debug!(method = %method, content_type = body.content_type(), ?timeout, "Calling remote method");

        let bytes = self.caller.post(method, &body, timeout).await?;
        if self.debug {
            info!(method = %method, "{}\n{}", method, pretty_json(&bytes));
        }

        ResponseEnvelope::decode(method, &bytes)?.into_result(method, || body.echo())
    }

    /// Calls `method` and decodes the `result` fragment into `T`.
    ///
    /// Use `serde::de::IgnoredAny` when the result is not needed.
    pub async fn call<T, R>(&self, method: &str, request: &R) -> Result<T>
    where
        T: DeserializeOwned,
        R: ToFields + ?Sized,
    {
        let value = self.call_raw(method, request).await?;
        serde_json::from_value(value).map_err(|source| {
            ProtocolError::Result {
                method: method.to_string(),
                source,
            }
            .into()
        })
    }

    /// Calls a typed method.
    pub async fn send<M: Method>(&self, method: &M) -> Result<M::Response> {
        self.call(M::NAME, method).await
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("encoding", &self.encoding)
            .field("debug", &self.debug)
            .finish()
    }
}
