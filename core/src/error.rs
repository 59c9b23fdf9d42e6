//! Error types for the request controller.
//!
//! # Design
//! Network failures are never returned as `Err`: they surface through
//! events and `ErrorCode`. `RequestError` is reserved for programmer errors
//! (sending on a busy or disposed controller) and for decoding a response
//! the caller asked to be parsed. `TransportError` is what a transport
//! raises from any of its methods; the controller catches it at the
//! boundary and converts it into the unified error path.

use std::fmt;

/// Classification of the most recent request failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ErrorCode {
    #[default]
    NoError,
    /// The transport failed inside `open` or `send`.
    Exception,
    Timeout,
    /// The request was aborted by the caller or by a timeout.
    Abort,
    /// The request completed with a non-success status.
    HttpError,
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            ErrorCode::NoError => "No Error",
            ErrorCode::Exception => "An exception occurred",
            ErrorCode::Timeout => "Request timed out",
            ErrorCode::Abort => "Request was aborted",
            ErrorCode::HttpError => "Http response at 400 or 500 level",
        };
        f.write_str(msg)
    }
}

/// Errors returned by public `RequestController` and `Registry` methods.
#[derive(Debug, thiserror::Error)]
pub enum RequestError {
    /// `send` was called while another request still owns the transport.
    #[error("controller is active with another request={active}; new request={requested}")]
    Busy { active: String, requested: String },

    /// `send` was called after `dispose`.
    #[error("controller has been disposed")]
    Disposed,

    /// The response body could not be deserialized into the expected type.
    #[error("deserialization failed: {0}")]
    Deserialization(#[from] serde_json::Error),

    /// A configuration document could not be parsed.
    #[error("invalid configuration: {0}")]
    Config(String),
}

/// Errors raised by a `Transport` implementation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("invalid url: {0}")]
    InvalidUrl(String),

    #[error("invalid method: {0}")]
    InvalidMethod(String),

    #[error("invalid header {name}: {reason}")]
    InvalidHeader { name: String, reason: String },

    /// The call is not legal at the handle's current readiness.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// The transport does not implement an optional capability.
    #[error("unsupported: {0}")]
    Unsupported(&'static str),

    #[error("transport failure: {0}")]
    Failed(String),
}
