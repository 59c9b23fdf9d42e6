//! The transport handle the controller drives.
//!
//! # Design
//! A `Transport` is the opaque object performing one HTTP exchange. Every
//! method takes `&self`: implementations use interior mutability because a
//! transport may call back into the controller (through the readiness
//! callback) while one of its own methods is still on the stack. Any method
//! may fail; the controller treats an `Err` the way a browser client treats
//! a thrown exception.
//!
//! Optional features are discovered through `capabilities()`, probed once
//! per request and cached by the controller. The default implementations of
//! the optional setters report `TransportError::Unsupported`.

use std::rc::Rc;
use std::time::Duration;

use crate::error::TransportError;
use crate::http::{Body, ProgressInfo, ReadyState, ResponsePayload, ResponseType};

/// Callback invoked by a transport whenever its readiness changes.
pub type Notify = Rc<dyn Fn()>;

/// Callback invoked by a transport for each progress report.
pub type ProgressCallback = Rc<dyn Fn(ProgressInfo)>;

/// Optional features a transport exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TransportCapabilities {
    /// Supports `set_native_timeout` with a timeout callback.
    pub native_timeout: bool,
    /// Honors `set_response_type` and returns typed payloads from `response`.
    pub typed_response: bool,
    pub with_credentials: bool,
    pub progress: bool,
}

/// Quirks a transport factory declares for the handles it creates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TransportOptions {
    /// Completed local requests may report a benign status of 2 that must
    /// be ignored; the real failure is raised from `open`/`send`.
    pub local_request_error: bool,
}

/// A transport-level timeout registration.
#[derive(Clone)]
pub struct NativeTimeout {
    pub after: Duration,
    pub on_timeout: Notify,
}

/// One HTTP exchange.
pub trait Transport {
    fn open(&self, method: &str, url: &str) -> Result<(), TransportError>;

    fn set_request_header(&self, name: &str, value: &str) -> Result<(), TransportError>;

    fn send(&self, body: Option<&Body>) -> Result<(), TransportError>;

    fn abort(&self) -> Result<(), TransportError>;

    fn ready_state(&self) -> ReadyState;

    fn status(&self) -> Result<u16, TransportError>;

    fn status_text(&self) -> Result<String, TransportError>;

    fn response_text(&self) -> Result<String, TransportError>;

    /// Install or detach (`None`) the readiness callback.
    fn set_ready_state_callback(&self, callback: Option<Notify>) -> Result<(), TransportError>;

    fn response_header(&self, name: &str) -> Result<Option<String>, TransportError>;

    fn all_response_headers(&self) -> Result<String, TransportError>;

    fn capabilities(&self) -> TransportCapabilities {
        TransportCapabilities::default()
    }

    fn response(&self) -> Result<ResponsePayload, TransportError> {
        self.response_text().map(ResponsePayload::Text)
    }

    /// Markup of the response when it is a document, if any.
    fn response_xml(&self) -> Result<Option<String>, TransportError> {
        Ok(None)
    }

    fn set_response_type(&self, _response_type: ResponseType) -> Result<(), TransportError> {
        Err(TransportError::Unsupported("response type"))
    }

    fn set_with_credentials(&self, _with_credentials: bool) -> Result<(), TransportError> {
        Err(TransportError::Unsupported("credentials"))
    }

    /// Arm or clear (`None`) the transport's own timeout.
    fn set_native_timeout(&self, _timeout: Option<NativeTimeout>) -> Result<(), TransportError> {
        Err(TransportError::Unsupported("native timeout"))
    }

    fn set_progress_callback(
        &self,
        _callback: Option<ProgressCallback>,
    ) -> Result<(), TransportError> {
        Err(TransportError::Unsupported("progress"))
    }
}

/// Creates a fresh transport for every request cycle.
pub trait TransportFactory {
    fn create(&self) -> Rc<dyn Transport>;

    fn options(&self) -> TransportOptions {
        TransportOptions::default()
    }
}
