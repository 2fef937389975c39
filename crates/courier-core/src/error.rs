//! Unified error types for Courier.
//!
//! Every failure that can end [`Session::start`] is one of the variants of
//! [`Error`]. The split mirrors where a call can go wrong:
//!
//! | Variant | Raised when |
//! |---------|-------------|
//! | [`Error::Transport`] | the remote host could not be reached or the body could not be read |
//! | [`Error::Protocol`] | JSON at any envelope layer could not be decoded |
//! | [`Error::Api`] | the remote API answered with `ok: false` |
//! | [`Error::Configuration`] | a handler registration or session setting is invalid |
//! | [`Error::InvalidState`] | a lifecycle operation was used out of order |
//! | [`Error::Handler`] | a registered handler returned its own failure |
//!
//! [`Session::start`]: https://docs.rs/courier-runtime

use std::fmt;

use thiserror::Error;

use crate::update::UpdateKind;

/// Boxed error returned by user handlers.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

// =============================================================================
// Transport Errors
// =============================================================================

/// Errors raised while reaching the remote host.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    /// The connection could not be established.
    #[error("connection to {url} failed: {reason}")]
    ConnectionFailed {
        /// Endpoint with the token redacted.
        url: String,
        /// Reason for failure.
        reason: String,
    },

    /// The request did not complete in time.
    #[error("request to {url} timed out")]
    Timeout {
        /// Endpoint with the token redacted.
        url: String,
    },

    /// The server answered with a non-success status and no API envelope.
    #[error("HTTP {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body, truncated.
        body: String,
    },

    /// The request or response body could not be streamed.
    #[error("I/O error: {0}")]
    Io(String),
}

impl From<std::io::Error> for TransportError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

// =============================================================================
// Protocol Errors
// =============================================================================

/// Errors raised while decoding or encoding JSON at any envelope layer.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The outer response envelope is not valid JSON.
    #[error("malformed response envelope for `{method}`: {source}")]
    Envelope {
        /// Remote method the response belongs to.
        method: String,
        #[source]
        source: serde_json::Error,
    },

    /// The `result` fragment could not be decoded into the requested type.
    #[error("cannot decode result of `{method}`: {source}")]
    Result {
        /// Remote method the result belongs to.
        method: String,
        #[source]
        source: serde_json::Error,
    },

    /// An update fragment could not be decoded into the handler's payload type.
    #[error("cannot decode `{kind}` payload of update {update_id}: {source}")]
    Payload {
        /// Kind whose fragment failed to decode.
        kind: UpdateKind,
        /// Delivery identifier of the update.
        update_id: i64,
        #[source]
        source: serde_json::Error,
    },

    /// An update envelope has no integer `update_id`.
    #[error("update envelope has no integer update_id: {0}")]
    MissingUpdateId(String),

    /// An outbound value could not be turned into request fields.
    #[error("cannot encode request: {0}")]
    Encode(String),

    /// Generic JSON failure.
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

// =============================================================================
// API Errors
// =============================================================================

/// The remote API explicitly rejected a call with `ok: false`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    /// Remote method name, e.g. `sendMessage`.
    pub method: String,
    /// Numeric `error_code` reported by the remote API.
    pub code: i64,
    /// Human-readable `description` reported by the remote API.
    pub description: String,
    /// Pretty-printed echo of the outgoing request.
    pub request: String,
    /// Seconds the remote API asked us to wait, when it throttled the call.
    pub retry_after: Option<u64>,
    /// New chat identifier when a group was migrated to a supergroup.
    pub migrate_to_chat_id: Option<i64>,
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}) ({}: {})",
            self.description,
            self.code,
            self.method,
            self.request.trim_end()
        )
    }
}

impl std::error::Error for ApiError {}

// =============================================================================
// Top-level Error
// =============================================================================

/// Lifecycle state of a session, reported by [`Error::InvalidState`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// `start` has not been called, or the previous run ended with an error.
    NotStarted,
    /// The update loop is running.
    Running,
    /// The loop observed a stop request and exited. Terminal.
    Stopped,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotStarted => write!(f, "NotStarted"),
            Self::Running => write!(f, "Running"),
            Self::Stopped => write!(f, "Stopped"),
        }
    }
}

/// Any failure surfaced by Courier.
#[derive(Debug, Error)]
pub enum Error {
    /// Network-level failure.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Malformed or undecodable JSON.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// The remote API answered `ok: false`.
    #[error(transparent)]
    Api(#[from] ApiError),

    /// Invalid registration or session setting, raised eagerly.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A lifecycle operation was invoked from the wrong state.
    #[error("session is {0}, expected NotStarted")]
    InvalidState(SessionState),

    /// A handler returned an error.
    #[error("handler for `{kind}` failed: {source}")]
    Handler {
        /// Kind of the handler that failed.
        kind: UpdateKind,
        #[source]
        source: BoxError,
    },
}

impl Error {
    /// Creates a configuration error.
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Returns the API error if the remote rejected the call.
    pub fn as_api(&self) -> Option<&ApiError> {
        match self {
            Self::Api(e) => Some(e),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Protocol(ProtocolError::Json(err))
    }
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for Courier operations.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Result type for transport operations.
pub type TransportResult<T> = std::result::Result<T, TransportError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_error_display_echoes_request() {
        let err = ApiError {
            method: "sendMessage".into(),
            code: 400,
            description: "Bad Request: chat not found".into(),
            request: "{\n  \"chat_id\": 1\n}\n".into(),
            retry_after: None,
            migrate_to_chat_id: None,
        };
        assert_eq!(
            err.to_string(),
            "Bad Request: chat not found (400) (sendMessage: {\n  \"chat_id\": 1\n})"
        );
    }

    #[test]
    fn test_as_api() {
        let err = Error::configuration("nope");
        assert!(err.as_api().is_none());
        assert_eq!(err.to_string(), "configuration error: nope");
    }
}
