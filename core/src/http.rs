//! Plain-data HTTP types shared by the controller and its transports.
//!
//! # Design
//! These types describe what crosses the controller/transport boundary:
//! request bodies, the transport's coarse readiness level, the desired
//! response decoding and the decoded payload. They carry no behavior so a
//! host can implement `Transport` over any I/O stack.

use serde::{Deserialize, Serialize};

/// Methods that carry a form payload and receive a default content type.
pub const FORM_METHODS: [&str; 2] = ["POST", "PUT"];

/// Content type attached to form-bearing requests that do not declare one.
pub const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded;charset=utf-8";

/// Name of the content-type request header.
pub const CONTENT_TYPE_HEADER: &str = "Content-Type";

/// A request payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Body {
    Text(String),
    Bytes(Vec<u8>),
    /// Multipart form fields. The transport chooses the boundary and
    /// content type, so no form default is injected for this variant.
    Multipart(Vec<(String, String)>),
}

impl Body {
    pub fn is_multipart(&self) -> bool {
        matches!(self, Body::Multipart(_))
    }
}

impl From<&str> for Body {
    fn from(text: &str) -> Self {
        Body::Text(text.to_string())
    }
}

impl From<String> for Body {
    fn from(text: String) -> Self {
        Body::Text(text)
    }
}

impl From<Vec<u8>> for Body {
    fn from(bytes: Vec<u8>) -> Self {
        Body::Bytes(bytes)
    }
}

/// Coarse progress of a transport handle.
///
/// Ordered, so `ready >= ReadyState::Sent` reads as "headers are in".
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum ReadyState {
    #[default]
    Uninitialized = 0,
    Opened = 1,
    /// Request sent and response headers received.
    Sent = 2,
    Receiving = 3,
    Complete = 4,
}

/// Desired decoding of the response payload.
///
/// Advisory: a transport without typed-response support yields text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseType {
    #[default]
    Default,
    Text,
    Document,
    Blob,
    ArrayBuffer,
}

/// A decoded response payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponsePayload {
    Text(String),
    Binary(Vec<u8>),
    /// Markup of a document response, unparsed.
    Document(String),
}

impl ResponsePayload {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            ResponsePayload::Text(text) | ResponsePayload::Document(text) => Some(text),
            ResponsePayload::Binary(_) => None,
        }
    }
}

/// Which direction a progress report describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressDirection {
    Upload,
    Download,
}

/// A single progress report from a transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressInfo {
    pub direction: ProgressDirection,
    pub loaded: u64,
    pub total: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ready_state_ordering_follows_progress() {
        assert!(ReadyState::Uninitialized < ReadyState::Opened);
        assert!(ReadyState::Sent < ReadyState::Receiving);
        assert!(ReadyState::Receiving < ReadyState::Complete);
    }

    #[test]
    fn only_multipart_bodies_are_multipart() {
        assert!(!Body::from("a=1").is_multipart());
        assert!(!Body::from(vec![1u8, 2]).is_multipart());
        assert!(Body::Multipart(vec![("a".into(), "1".into())]).is_multipart());
    }

    #[test]
    fn response_type_deserializes_from_snake_case() {
        let ty: ResponseType = serde_json::from_str(r#""array_buffer""#).unwrap();
        assert_eq!(ty, ResponseType::ArrayBuffer);
        assert_eq!(ResponseType::default(), ResponseType::Default);
    }

    #[test]
    fn binary_payload_has_no_text_view() {
        assert_eq!(ResponsePayload::Text("x".into()).as_text(), Some("x"));
        assert_eq!(ResponsePayload::Binary(vec![0]).as_text(), None);
    }
}
