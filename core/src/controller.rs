//! Single-request lifecycle controller.
//!
//! # Design
//! A `RequestController` owns at most one `Transport` at a time and turns
//! the transport's readiness callbacks into an ordered, single-fire event
//! sequence:
//!
//! ```text
//! READY_STATE_CHANGE*  ->  COMPLETE + (SUCCESS | ERROR | ABORT)  ->  READY
//! ```
//!
//! Transports are allowed to call back synchronously from inside `open`,
//! `send` and `abort`. The controller marks each of those calls with a
//! scoped re-entry flag so that a notification arriving while one is set is
//! handled as a continuation of the controller's own call rather than as a
//! new asynchronous entry. A terminal notification that arrives from inside
//! `send` is deferred through the timer facility so observers never see the
//! outcome before `send` returns.
//!
//! Every request cycle gets a number. Callbacks handed to the transport and
//! the timer facility capture that number together with a weak reference
//! to the controller, and are ignored once the cycle's transport has been
//! released or the controller is gone.
//!
//! State lives in `Cell`/`RefCell` fields and no borrow is ever held across
//! a call into the transport or a listener, since either may re-enter.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};
use std::time::Duration;

use serde::de::DeserializeOwned;
use tracing::{debug, error, warn};

use crate::config::ControllerConfig;
use crate::error::{ErrorCode, RequestError, TransportError};
use crate::event::{Event, EventType, ListenerKey, Listeners};
use crate::headers::HeaderSet;
use crate::http::{
    Body, ProgressDirection, ProgressInfo, ReadyState, ResponsePayload, ResponseType,
    CONTENT_TYPE_HEADER, FORM_CONTENT_TYPE, FORM_METHODS,
};
use crate::platform::Platform;
use crate::status::is_success_status;
use crate::timer::TimerId;
use crate::transport::{
    NativeTimeout, Notify, ProgressCallback, Transport, TransportCapabilities, TransportOptions,
};

/// The timeout mechanism armed for the current request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TimeoutMechanism {
    Native,
    Timer(TimerId),
}

/// Sets a flag for the lifetime of the guard and restores its previous
/// value on drop.
struct Reentry<'a> {
    flag: &'a Cell<bool>,
    previous: bool,
}

impl<'a> Reentry<'a> {
    fn enter(flag: &'a Cell<bool>) -> Self {
        let previous = flag.replace(true);
        Self { flag, previous }
    }
}

impl Drop for Reentry<'_> {
    fn drop(&mut self) {
        self.flag.set(self.previous);
    }
}

struct Inner {
    platform: Platform,
    headers: RefCell<HeaderSet>,
    listeners: RefCell<Listeners>,
    transport: RefCell<Option<Rc<dyn Transport>>>,
    capabilities: Cell<TransportCapabilities>,
    options: Cell<TransportOptions>,
    cycle: Cell<u64>,
    last_uri: RefCell<String>,
    last_method: RefCell<String>,
    last_error: RefCell<String>,
    last_error_code: Cell<ErrorCode>,
    active: Cell<bool>,
    error_dispatched: Cell<bool>,
    in_open: Cell<bool>,
    in_send: Cell<bool>,
    in_abort: Cell<bool>,
    disposed: Cell<bool>,
    timeout_interval: Cell<Duration>,
    timeout: Cell<Option<TimeoutMechanism>>,
    response_type: Cell<ResponseType>,
    with_credentials: Cell<bool>,
    progress_events: Cell<bool>,
}

/// Issues one HTTP request at a time through a `Transport`.
///
/// Cloning yields another handle to the same controller.
#[derive(Clone)]
pub struct RequestController {
    inner: Rc<Inner>,
}

impl RequestController {
    pub fn new(platform: Platform) -> Self {
        Self {
            inner: Rc::new(Inner {
                platform,
                headers: RefCell::new(HeaderSet::new()),
                listeners: RefCell::new(Listeners::default()),
                transport: RefCell::new(None),
                capabilities: Cell::new(TransportCapabilities::default()),
                options: Cell::new(TransportOptions::default()),
                cycle: Cell::new(0),
                last_uri: RefCell::new(String::new()),
                last_method: RefCell::new(String::new()),
                last_error: RefCell::new(String::new()),
                last_error_code: Cell::new(ErrorCode::NoError),
                active: Cell::new(false),
                error_dispatched: Cell::new(false),
                in_open: Cell::new(false),
                in_send: Cell::new(false),
                in_abort: Cell::new(false),
                disposed: Cell::new(false),
                timeout_interval: Cell::new(Duration::ZERO),
                timeout: Cell::new(None),
                response_type: Cell::new(ResponseType::Default),
                with_credentials: Cell::new(false),
                progress_events: Cell::new(false),
            }),
        }
    }

    fn from_inner(inner: Rc<Inner>) -> Self {
        Self { inner }
    }

    /// Whether both handles refer to the same controller.
    pub fn ptr_eq(&self, other: &RequestController) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    // -----------------------------------------------------------------------
    // Listeners
    // -----------------------------------------------------------------------

    pub fn listen(&self, kind: EventType, listener: impl Fn(&Event) + 'static) -> ListenerKey {
        self.inner
            .listeners
            .borrow_mut()
            .add(kind, false, Rc::new(listener))
    }

    /// Like `listen`, but the listener is removed before its first call.
    pub fn listen_once(
        &self,
        kind: EventType,
        listener: impl Fn(&Event) + 'static,
    ) -> ListenerKey {
        self.inner
            .listeners
            .borrow_mut()
            .add(kind, true, Rc::new(listener))
    }

    pub fn unlisten(&self, key: ListenerKey) -> bool {
        self.inner.listeners.borrow_mut().remove(key)
    }

    pub fn listener_count(&self, kind: EventType) -> usize {
        self.inner.listeners.borrow().count(kind)
    }

    fn dispatch(&self, kind: EventType) {
        self.dispatch_event(kind, None);
    }

    fn dispatch_event(&self, kind: EventType, progress: Option<ProgressInfo>) {
        let listeners = self.inner.listeners.borrow_mut().snapshot(kind);
        if listeners.is_empty() {
            return;
        }
        let event = Event {
            kind,
            target: self.clone(),
            progress,
        };
        for listener in listeners {
            if self.inner.disposed.get() || listener.is_removed() {
                continue;
            }
            listener.call(&event);
        }
    }

    // -----------------------------------------------------------------------
    // Settings
    // -----------------------------------------------------------------------

    /// Headers applied to every request; per-call overrides win.
    pub fn headers(&self) -> HeaderSet {
        self.inner.headers.borrow().clone()
    }

    pub fn set_header(&self, name: impl Into<String>, value: impl Into<String>) {
        self.inner.headers.borrow_mut().set(name, value);
    }

    pub fn remove_header(&self, name: &str) -> Option<String> {
        self.inner.headers.borrow_mut().remove(name)
    }

    /// A zero interval disables the timeout.
    pub fn set_timeout_interval(&self, interval: Duration) {
        self.inner.timeout_interval.set(interval);
    }

    pub fn timeout_interval(&self) -> Duration {
        self.inner.timeout_interval.get()
    }

    pub fn set_response_type(&self, response_type: ResponseType) {
        self.inner.response_type.set(response_type);
    }

    pub fn response_type(&self) -> ResponseType {
        self.inner.response_type.get()
    }

    pub fn set_with_credentials(&self, with_credentials: bool) {
        self.inner.with_credentials.set(with_credentials);
    }

    pub fn with_credentials(&self) -> bool {
        self.inner.with_credentials.get()
    }

    /// Enable `PROGRESS` and `DOWNLOAD_PROGRESS`/`UPLOAD_PROGRESS` events.
    /// Takes effect from the next `send`.
    pub fn set_progress_events_enabled(&self, enabled: bool) {
        self.inner.progress_events.set(enabled);
    }

    pub fn progress_events_enabled(&self) -> bool {
        self.inner.progress_events.get()
    }

    pub fn apply_config(&self, config: &ControllerConfig) {
        self.set_timeout_interval(config.timeout());
        self.set_with_credentials(config.with_credentials);
        self.set_response_type(config.response_type);
        self.set_progress_events_enabled(config.progress_events);
        self.inner.headers.borrow_mut().merge(&config.header_set());
    }

    // -----------------------------------------------------------------------
    // Request lifecycle
    // -----------------------------------------------------------------------

    /// Start a request.
    ///
    /// `method` defaults to `GET` and is uppercased. `headers` are merged
    /// over the base headers. Transport failures are not returned; they are
    /// reported through `COMPLETE`/`ERROR` with `ErrorCode::Exception`.
    ///
    /// # Errors
    ///
    /// `RequestError::Busy` if a request is still in flight and
    /// `RequestError::Disposed` after `dispose`. Neither changes any state.
    pub fn send(
        &self,
        url: &str,
        method: Option<&str>,
        body: Option<Body>,
        headers: Option<&HeaderSet>,
    ) -> Result<(), RequestError> {
        let inner = &self.inner;
        if inner.disposed.get() {
            return Err(RequestError::Disposed);
        }
        if inner.transport.borrow().is_some() {
            return Err(RequestError::Busy {
                active: inner.last_uri.borrow().clone(),
                requested: url.to_string(),
            });
        }

        let method = method.unwrap_or("GET").to_ascii_uppercase();
        *inner.last_uri.borrow_mut() = url.to_string();
        *inner.last_method.borrow_mut() = method.clone();
        inner.last_error.borrow_mut().clear();
        inner.last_error_code.set(ErrorCode::NoError);
        inner.error_dispatched.set(false);
        inner.active.set(true);
        let cycle = inner.cycle.get() + 1;
        inner.cycle.set(cycle);

        let transport = inner.platform.transports.create();
        inner.capabilities.set(transport.capabilities());
        inner.options.set(inner.platform.transports.options());
        *inner.transport.borrow_mut() = Some(Rc::clone(&transport));
        debug!("{}", self.format_msg("Opening request"));

        if let Err(e) = transport.set_ready_state_callback(Some(self.notifier(cycle))) {
            self.fail(cycle, ErrorCode::Exception, e);
            return Ok(());
        }

        let opened = {
            let _open = Reentry::enter(&inner.in_open);
            transport.open(&method, url)
        };
        if let Err(e) = opened {
            self.fail(cycle, ErrorCode::Exception, e);
            return Ok(());
        }
        if !self.owns(cycle) {
            // A listener tore the request down while it was being opened.
            return Ok(());
        }

        let mut effective = self.headers();
        if let Some(overrides) = headers {
            effective.merge(overrides);
        }
        let is_multipart = body.as_ref().is_some_and(Body::is_multipart);
        if FORM_METHODS.contains(&method.as_str())
            && !effective.contains(CONTENT_TYPE_HEADER)
            && !is_multipart
        {
            effective.set(CONTENT_TYPE_HEADER, FORM_CONTENT_TYPE);
        }
        for (name, value) in effective.iter() {
            if let Err(e) = transport.set_request_header(name, value) {
                self.fail(cycle, ErrorCode::Exception, e);
                return Ok(());
            }
        }

        self.configure_transport(&transport, cycle);
        self.arm_timeout(&transport, cycle);

        debug!("{}", self.format_msg("Sending request"));
        let sent = {
            let _send = Reentry::enter(&inner.in_send);
            transport.send(body.as_ref())
        };
        if let Err(e) = sent {
            self.fail(cycle, ErrorCode::Exception, e);
        }
        Ok(())
    }

    /// Apply the response type, credentials flag and progress callback the
    /// transport supports. These are advisory, so failures are only logged.
    fn configure_transport(&self, transport: &Rc<dyn Transport>, cycle: u64) {
        let inner = &self.inner;
        let capabilities = inner.capabilities.get();

        let response_type = inner.response_type.get();
        if response_type != ResponseType::Default && capabilities.typed_response {
            if let Err(e) = transport.set_response_type(response_type) {
                debug!("{}", self.format_msg(&format!("Response type rejected: {e}")));
            }
        }
        if capabilities.with_credentials {
            if let Err(e) = transport.set_with_credentials(inner.with_credentials.get()) {
                debug!("{}", self.format_msg(&format!("Credentials flag rejected: {e}")));
            }
        }
        if inner.progress_events.get() && capabilities.progress {
            if let Err(e) = transport.set_progress_callback(Some(self.progress_notifier(cycle))) {
                debug!("{}", self.format_msg(&format!("Progress callback rejected: {e}")));
            }
        }
    }

    /// Arm at most one timeout mechanism, preferring the transport's own.
    fn arm_timeout(&self, transport: &Rc<dyn Transport>, cycle: u64) {
        let inner = &self.inner;
        self.clear_timeout(transport);
        let interval = inner.timeout_interval.get();
        if interval.is_zero() {
            return;
        }

        if inner.capabilities.get().native_timeout {
            let native = NativeTimeout {
                after: interval,
                on_timeout: self.timeout_notifier(cycle),
            };
            match transport.set_native_timeout(Some(native)) {
                Ok(()) => {
                    inner.timeout.set(Some(TimeoutMechanism::Native));
                    return;
                }
                Err(e) => debug!("{}", self.format_msg(&format!("Native timeout rejected: {e}"))),
            }
        }

        let weak = Rc::downgrade(&self.inner);
        let id = inner.platform.timers.schedule(
            interval,
            Box::new(move || {
                if let Some(inner) = weak.upgrade() {
                    RequestController::from_inner(inner).on_timeout(cycle);
                }
            }),
        );
        inner.timeout.set(Some(TimeoutMechanism::Timer(id)));
    }

    fn clear_timeout(&self, transport: &Rc<dyn Transport>) {
        let inner = &self.inner;
        match inner.timeout.take() {
            Some(TimeoutMechanism::Native) => {
                if let Err(e) = transport.set_native_timeout(None) {
                    debug!("{}", self.format_msg(&format!("Problem clearing native timeout: {e}")));
                }
            }
            Some(TimeoutMechanism::Timer(id)) => inner.platform.timers.cancel(id),
            None => {}
        }
    }

    fn notifier(&self, cycle: u64) -> Notify {
        let weak = Rc::downgrade(&self.inner);
        Rc::new(move || {
            if let Some(inner) = weak.upgrade() {
                RequestController::from_inner(inner).on_ready_state_change(cycle);
            }
        })
    }

    fn timeout_notifier(&self, cycle: u64) -> Notify {
        let weak = Rc::downgrade(&self.inner);
        Rc::new(move || {
            if let Some(inner) = weak.upgrade() {
                RequestController::from_inner(inner).on_timeout(cycle);
            }
        })
    }

    fn progress_notifier(&self, cycle: u64) -> ProgressCallback {
        let weak: Weak<Inner> = Rc::downgrade(&self.inner);
        Rc::new(move |info| {
            if let Some(inner) = weak.upgrade() {
                RequestController::from_inner(inner).on_progress(cycle, info);
            }
        })
    }

    /// Whether `cycle` is the current cycle and still holds its transport.
    fn owns(&self, cycle: u64) -> bool {
        self.inner.cycle.get() == cycle && self.inner.transport.borrow().is_some()
    }

    fn transport(&self) -> Option<Rc<dyn Transport>> {
        self.inner.transport.borrow().clone()
    }

    fn on_ready_state_change(&self, cycle: u64) {
        let inner = &self.inner;
        if inner.disposed.get() {
            return;
        }
        if inner.cycle.get() != cycle {
            debug!("Ignoring notification from a released transport");
            return;
        }

        let reentrant = inner.in_open.get() || inner.in_send.get() || inner.in_abort.get();
        let guard = inner.platform.entry_point.clone();
        match guard {
            Some(guard) if !reentrant => {
                guard.enter(&mut || self.handle_ready_state_change(cycle));
            }
            _ => self.handle_ready_state_change(cycle),
        }
    }

    fn handle_ready_state_change(&self, cycle: u64) {
        let inner = &self.inner;
        if !inner.active.get() {
            return;
        }
        let Some(transport) = self.transport() else {
            return;
        };
        let ready = transport.ready_state();

        if inner.options.get().local_request_error
            && ready == ReadyState::Complete
            && transport.status().ok() == Some(2)
        {
            // The failure is reported by the error raised from open/send.
            debug!("{}", self.format_msg("Local request error detected and ignored"));
            return;
        }

        if inner.in_send.get() && ready == ReadyState::Complete {
            // Completed from inside send (cached response): observers must
            // still see the outcome after send returns.
            let weak = Rc::downgrade(&self.inner);
            inner.platform.timers.schedule(
                Duration::ZERO,
                Box::new(move || {
                    if let Some(inner) = weak.upgrade() {
                        RequestController::from_inner(inner).on_ready_state_change(cycle);
                    }
                }),
            );
            return;
        }

        self.dispatch(EventType::ReadyStateChange);

        if !self.owns(cycle) || !inner.active.get() || !self.is_complete() {
            return;
        }
        inner.active.set(false);
        if self.is_success() {
            debug!("{}", self.format_msg("Request complete"));
            self.dispatch(EventType::Complete);
            self.dispatch(EventType::Success);
        } else {
            inner.last_error_code.set(ErrorCode::HttpError);
            *inner.last_error.borrow_mut() = format!("{} [{}]", self.status_text(), self.status());
            debug!("{}", self.format_msg("Request failed"));
            self.dispatch_errors();
        }
        self.clean_up_transport(false);
    }

    fn on_timeout(&self, cycle: u64) {
        let inner = &self.inner;
        if inner.disposed.get() || !self.owns(cycle) {
            return;
        }
        if matches!(inner.timeout.get(), Some(TimeoutMechanism::Timer(_))) {
            inner.timeout.set(None);
        }
        let millis = inner.timeout_interval.get().as_millis();
        *inner.last_error.borrow_mut() = format!("Timed out after {millis}ms, aborting");
        inner.last_error_code.set(ErrorCode::Timeout);
        debug!("{}", self.format_msg(&inner.last_error.borrow()));
        self.dispatch(EventType::Timeout);
        self.abort_with(ErrorCode::Timeout);
    }

    fn on_progress(&self, cycle: u64, info: ProgressInfo) {
        if self.inner.disposed.get() || !self.owns(cycle) {
            return;
        }
        let directed = match info.direction {
            ProgressDirection::Download => EventType::DownloadProgress,
            ProgressDirection::Upload => EventType::UploadProgress,
        };
        self.dispatch_event(EventType::Progress, Some(info));
        self.dispatch_event(directed, Some(info));
    }

    /// Route a transport failure into the unified error path.
    fn fail(&self, cycle: u64, code: ErrorCode, err: TransportError) {
        if !self.owns(cycle) {
            debug!("{}", self.format_msg(&format!("Ignoring failure after teardown: {err}")));
            return;
        }
        let inner = &self.inner;
        warn!("{}", self.format_msg(&format!("{code}: {err}")));
        inner.active.set(false);
        if let Some(transport) = self.transport() {
            let _abort = Reentry::enter(&inner.in_abort);
            if let Err(e) = transport.abort() {
                debug!("{}", self.format_msg(&format!("Problem aborting after failure: {e}")));
            }
        }
        *inner.last_error.borrow_mut() = err.to_string();
        inner.last_error_code.set(code);
        self.dispatch_errors();
        self.clean_up_transport(false);
    }

    /// Dispatch `COMPLETE` then `ERROR`, at most once per request cycle.
    fn dispatch_errors(&self) {
        if self.inner.error_dispatched.replace(true) {
            return;
        }
        self.dispatch(EventType::Complete);
        self.dispatch(EventType::Error);
    }

    /// Abort the active request with `ErrorCode::Abort`.
    pub fn abort(&self) {
        self.abort_with(ErrorCode::Abort);
    }

    /// Abort the active request, recording `code` as the failure.
    ///
    /// Dispatches `COMPLETE`, `ABORT` and then `READY`. Does nothing when no
    /// request is active.
    pub fn abort_with(&self, code: ErrorCode) {
        let inner = &self.inner;
        let Some(transport) = self.transport() else {
            return;
        };
        if !inner.active.get() {
            return;
        }
        inner.active.set(false);
        {
            let _abort = Reentry::enter(&inner.in_abort);
            if let Err(e) = transport.abort() {
                debug!("{}", self.format_msg(&format!("Problem aborting transport: {e}")));
            }
        }
        inner.last_error_code.set(code);
        debug!("{}", self.format_msg("Aborting"));
        self.dispatch(EventType::Complete);
        self.dispatch(EventType::Abort);
        self.clean_up_transport(false);
    }

    /// Tear the controller down silently.
    ///
    /// An active request is aborted without dispatching any event, all
    /// listeners are removed and later `send` calls fail.
    pub fn dispose(&self) {
        let inner = &self.inner;
        if inner.disposed.replace(true) {
            return;
        }
        if let Some(transport) = self.transport() {
            if inner.active.replace(false) {
                let _abort = Reentry::enter(&inner.in_abort);
                if let Err(e) = transport.abort() {
                    debug!("{}", self.format_msg(&format!("Problem aborting on dispose: {e}")));
                }
            }
            self.clean_up_transport(true);
        }
        inner.listeners.borrow_mut().clear();
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.get()
    }

    /// Release the transport and its timers, then dispatch `READY` unless
    /// disposing.
    fn clean_up_transport(&self, from_dispose: bool) {
        let inner = &self.inner;
        let taken = inner.transport.borrow_mut().take();
        let Some(transport) = taken else {
            return;
        };
        self.clear_timeout(&transport);
        if let Err(e) = transport.set_ready_state_callback(None) {
            error!("Problem encountered resetting ready state callback: {e}");
        }
        if inner.capabilities.get().progress && inner.progress_events.get() {
            if let Err(e) = transport.set_progress_callback(None) {
                error!("Problem encountered resetting progress callback: {e}");
            }
        }
        inner.capabilities.set(TransportCapabilities::default());
        drop(transport);

        if !from_dispose {
            self.dispatch(EventType::Ready);
        }
    }

    // -----------------------------------------------------------------------
    // Status
    // -----------------------------------------------------------------------

    /// Whether a transport is held, i.e. a request is in flight or its
    /// outcome is being dispatched.
    pub fn is_active(&self) -> bool {
        self.inner.transport.borrow().is_some()
    }

    pub fn is_complete(&self) -> bool {
        self.ready_state() == ReadyState::Complete
    }

    pub fn is_success(&self) -> bool {
        is_success_status(self.status(), &self.inner.last_uri.borrow())
    }

    pub fn ready_state(&self) -> ReadyState {
        self.transport()
            .map(|transport| transport.ready_state())
            .unwrap_or_default()
    }

    /// HTTP status once headers are in, otherwise -1.
    pub fn status(&self) -> i32 {
        let Some(transport) = self.transport() else {
            return -1;
        };
        if transport.ready_state() <= ReadyState::Sent {
            return -1;
        }
        match transport.status() {
            Ok(status) => i32::from(status),
            Err(e) => {
                debug!("Can not get status: {e}");
                -1
            }
        }
    }

    pub fn status_text(&self) -> String {
        let Some(transport) = self.transport() else {
            return String::new();
        };
        if transport.ready_state() <= ReadyState::Sent {
            return String::new();
        }
        transport.status_text().unwrap_or_else(|e| {
            debug!("Can not get status text: {e}");
            String::new()
        })
    }

    pub fn last_uri(&self) -> String {
        self.inner.last_uri.borrow().clone()
    }

    pub fn last_method(&self) -> String {
        self.inner.last_method.borrow().clone()
    }

    pub fn last_error_code(&self) -> ErrorCode {
        self.inner.last_error_code.get()
    }

    pub fn last_error(&self) -> String {
        self.inner.last_error.borrow().clone()
    }

    // -----------------------------------------------------------------------
    // Response accessors
    // -----------------------------------------------------------------------

    pub fn response_text(&self) -> String {
        let Some(transport) = self.transport() else {
            return String::new();
        };
        transport.response_text().unwrap_or_else(|e| {
            debug!("Can not get response text: {e}");
            String::new()
        })
    }

    pub fn response_xml(&self) -> Option<String> {
        let transport = self.transport()?;
        transport.response_xml().unwrap_or_else(|e| {
            debug!("Can not get response document: {e}");
            None
        })
    }

    /// The payload decoded per the response type, or text when the
    /// transport cannot produce typed payloads.
    pub fn response(&self) -> Option<ResponsePayload> {
        let transport = self.transport()?;
        if !self.inner.capabilities.get().typed_response {
            return Some(ResponsePayload::Text(self.response_text()));
        }
        match transport.response() {
            Ok(payload) => Some(payload),
            Err(e) => {
                debug!("Can not get response: {e}");
                None
            }
        }
    }

    /// Parse the response text as JSON after stripping `prefix` if it leads
    /// the body. `Ok(None)` when no request is held.
    pub fn response_json(
        &self,
        prefix: Option<&str>,
    ) -> Result<Option<serde_json::Value>, RequestError> {
        self.response_json_as(prefix)
    }

    pub fn response_json_as<T: DeserializeOwned>(
        &self,
        prefix: Option<&str>,
    ) -> Result<Option<T>, RequestError> {
        if self.transport().is_none() {
            return Ok(None);
        }
        let text = self.response_text();
        let body = match prefix {
            Some(prefix) => text.strip_prefix(prefix).unwrap_or(text.as_str()),
            None => text.as_str(),
        };
        Ok(Some(serde_json::from_str(body)?))
    }

    /// A response header, available once the request is complete.
    pub fn response_header(&self, name: &str) -> Option<String> {
        let transport = self.transport()?;
        if !self.is_complete() {
            return None;
        }
        transport.response_header(name).unwrap_or_else(|e| {
            debug!("Can not get response header {name}: {e}");
            None
        })
    }

    /// A response header read while the response is still streaming.
    pub fn streaming_response_header(&self, name: &str) -> Option<String> {
        self.transport()?.response_header(name).ok().flatten()
    }

    /// The raw CRLF-separated response header block.
    pub fn all_response_headers(&self) -> String {
        let Some(transport) = self.transport() else {
            return String::new();
        };
        if transport.ready_state() < ReadyState::Sent {
            return String::new();
        }
        transport.all_response_headers().unwrap_or_else(|e| {
            debug!("Can not get response headers: {e}");
            String::new()
        })
    }

    /// Response headers by name, repeated names joined with `", "`.
    pub fn response_headers(&self) -> HeaderSet {
        HeaderSet::parse_block(&self.all_response_headers())
    }

    fn format_msg(&self, msg: &str) -> String {
        format!(
            "{msg} [{} {} {}]",
            self.inner.last_method.borrow(),
            self.inner.last_uri.borrow(),
            self.status()
        )
    }
}

impl fmt::Debug for RequestController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestController")
            .field("last_method", &self.inner.last_method.borrow())
            .field("last_uri", &self.inner.last_uri.borrow())
            .field("active", &self.inner.active.get())
            .field("disposed", &self.inner.disposed.get())
            .finish_non_exhaustive()
    }
}
