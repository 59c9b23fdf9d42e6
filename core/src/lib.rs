//! Single-request HTTP lifecycle controller.
//!
//! # Overview
//! Drives one HTTP request at a time through an opaque, callback-driven
//! `Transport` and turns its readiness notifications into a deterministic
//! event sequence (host-does-IO pattern). The host supplies the transport
//! factory and the timer facility; this crate never touches the network.
//!
//! # Design
//! - `RequestController` owns zero or one transport and guarantees that
//!   each request cycle ends in exactly one outcome followed by `READY`,
//!   whatever order or re-entrancy the transport's callbacks arrive in.
//! - Network failures are reported through events and `ErrorCode`, never as
//!   `Err`; `RequestError` is kept for programmer errors.
//! - `Registry` tracks fire-and-forget controllers and sweeps them at
//!   teardown.
//! - Everything is single-threaded (`Rc`/`Cell`); re-entrancy is handled by
//!   scoped flags, not locks.

pub mod config;
pub mod controller;
pub mod error;
pub mod event;
pub mod headers;
pub mod http;
pub mod platform;
pub mod registry;
pub mod status;
pub mod timer;
pub mod transport;

pub use config::ControllerConfig;
pub use controller::RequestController;
pub use error::{ErrorCode, RequestError, TransportError};
pub use event::{Event, EventType, ListenerKey};
pub use headers::HeaderSet;
pub use http::{
    Body, ProgressDirection, ProgressInfo, ReadyState, ResponsePayload, ResponseType,
    FORM_CONTENT_TYPE,
};
pub use platform::{EntryPointGuard, Platform};
pub use registry::{Registry, SendRequest};
pub use status::is_success_status;
pub use timer::{TimerFacility, TimerId};
pub use transport::{
    NativeTimeout, Notify, ProgressCallback, Transport, TransportCapabilities, TransportFactory,
    TransportOptions,
};
