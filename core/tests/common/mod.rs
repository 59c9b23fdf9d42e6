//! Scripted collaborators for driving a `RequestController` in tests.
//!
//! # Design
//! `FakeTransport` only moves when the test tells it to (or when its
//! `Script` says to call back synchronously from `open`/`send`/`abort`),
//! and `ManualTimers` runs callbacks on a virtual clock, so every ordering
//! the controller has to cope with can be reproduced deterministically.

#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::Duration;

use reqcycle_core::{
    Body, EventType, NativeTimeout, Notify, Platform, ProgressCallback, ProgressInfo, ReadyState,
    RequestController, ResponsePayload, ResponseType, TimerFacility, TimerId, Transport,
    TransportCapabilities, TransportError, TransportFactory, TransportOptions,
};

pub const ALL_EVENTS: [EventType; 10] = [
    EventType::ReadyStateChange,
    EventType::Complete,
    EventType::Success,
    EventType::Error,
    EventType::Abort,
    EventType::Timeout,
    EventType::Ready,
    EventType::Progress,
    EventType::DownloadProgress,
    EventType::UploadProgress,
];

/// How a `FakeTransport` misbehaves.
#[derive(Debug, Clone, Default)]
pub struct Script {
    pub open_error: Option<TransportError>,
    pub send_error: Option<TransportError>,
    /// Header name whose `set_request_header` fails.
    pub rejected_header: Option<String>,
    pub notify_on_open: bool,
    /// Complete synchronously from inside `send` with this status.
    pub complete_on_send: Option<u16>,
    /// Report `Complete` synchronously from inside `abort`.
    pub notify_on_abort: bool,
    /// Detaching the readiness callback fails and leaves it installed.
    pub detach_error: bool,
    pub capabilities: TransportCapabilities,
}

pub struct FakeTransport {
    script: Script,
    ready: Cell<ReadyState>,
    status: Cell<u16>,
    status_text: RefCell<String>,
    body: RefCell<String>,
    response_headers: RefCell<Vec<(String, String)>>,
    callback: RefCell<Option<Notify>>,
    progress: RefCell<Option<ProgressCallback>>,
    native_timeout: RefCell<Option<NativeTimeout>>,
    calls: RefCell<Vec<String>>,
    request_headers: RefCell<Vec<(String, String)>>,
    response_type: Cell<Option<ResponseType>>,
    with_credentials: Cell<Option<bool>>,
}

impl FakeTransport {
    fn new(script: Script) -> Self {
        Self {
            script,
            ready: Cell::new(ReadyState::Uninitialized),
            status: Cell::new(0),
            status_text: RefCell::new(String::new()),
            body: RefCell::new(String::new()),
            response_headers: RefCell::new(Vec::new()),
            callback: RefCell::new(None),
            progress: RefCell::new(None),
            native_timeout: RefCell::new(None),
            calls: RefCell::new(Vec::new()),
            request_headers: RefCell::new(Vec::new()),
            response_type: Cell::new(None),
            with_credentials: Cell::new(None),
        }
    }

    fn notify(&self) {
        let callback = self.callback.borrow().clone();
        if let Some(callback) = callback {
            callback();
        }
    }

    /// Move to `ready` and notify.
    pub fn advance(&self, ready: ReadyState) {
        self.ready.set(ready);
        self.notify();
    }

    pub fn set_response(&self, status: u16, status_text: &str, body: &str, headers: &[(&str, &str)]) {
        self.status.set(status);
        *self.status_text.borrow_mut() = status_text.to_string();
        *self.body.borrow_mut() = body.to_string();
        *self.response_headers.borrow_mut() = headers
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
    }

    /// Walk through `Sent`, `Receiving` and `Complete`, notifying each time.
    pub fn respond(&self, status: u16, status_text: &str, body: &str, headers: &[(&str, &str)]) {
        self.set_response(status, status_text, body, headers);
        self.advance(ReadyState::Sent);
        self.advance(ReadyState::Receiving);
        self.advance(ReadyState::Complete);
    }

    /// Jump straight to `Complete` with `status`.
    pub fn complete(&self, status: u16) {
        self.status.set(status);
        self.advance(ReadyState::Complete);
    }

    pub fn fire_native_timeout(&self) {
        let armed = self.native_timeout.borrow().clone();
        if let Some(timeout) = armed {
            (timeout.on_timeout)();
        }
    }

    pub fn report_progress(&self, info: ProgressInfo) {
        let callback = self.progress.borrow().clone();
        if let Some(callback) = callback {
            callback(info);
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.borrow().clone()
    }

    pub fn request_headers(&self) -> Vec<(String, String)> {
        self.request_headers.borrow().clone()
    }

    pub fn has_callback(&self) -> bool {
        self.callback.borrow().is_some()
    }

    pub fn native_timeout(&self) -> Option<Duration> {
        self.native_timeout.borrow().as_ref().map(|t| t.after)
    }

    pub fn applied_response_type(&self) -> Option<ResponseType> {
        self.response_type.get()
    }

    pub fn applied_with_credentials(&self) -> Option<bool> {
        self.with_credentials.get()
    }

    fn record(&self, call: String) {
        self.calls.borrow_mut().push(call);
    }
}

impl Transport for FakeTransport {
    fn open(&self, method: &str, url: &str) -> Result<(), TransportError> {
        self.record(format!("open {method} {url}"));
        if let Some(err) = self.script.open_error.clone() {
            return Err(err);
        }
        self.ready.set(ReadyState::Opened);
        if self.script.notify_on_open {
            self.notify();
        }
        Ok(())
    }

    fn set_request_header(&self, name: &str, value: &str) -> Result<(), TransportError> {
        if self.script.rejected_header.as_deref() == Some(name) {
            return Err(TransportError::InvalidHeader {
                name: name.to_string(),
                reason: "rejected".into(),
            });
        }
        self.request_headers
            .borrow_mut()
            .push((name.to_string(), value.to_string()));
        Ok(())
    }

    fn send(&self, body: Option<&Body>) -> Result<(), TransportError> {
        let body = match body {
            Some(Body::Text(text)) => text.clone(),
            Some(Body::Bytes(bytes)) => format!("{} bytes", bytes.len()),
            Some(Body::Multipart(fields)) => format!("{} fields", fields.len()),
            None => String::new(),
        };
        self.record(format!("send {body}"));
        if let Some(err) = self.script.send_error.clone() {
            return Err(err);
        }
        if let Some(status) = self.script.complete_on_send {
            self.complete(status);
        }
        Ok(())
    }

    fn abort(&self) -> Result<(), TransportError> {
        self.record("abort".to_string());
        let in_flight = matches!(
            self.ready.get(),
            ReadyState::Opened | ReadyState::Sent | ReadyState::Receiving
        );
        if self.script.notify_on_abort && in_flight {
            self.status.set(0);
            self.advance(ReadyState::Complete);
        }
        self.ready.set(ReadyState::Uninitialized);
        Ok(())
    }

    fn ready_state(&self) -> ReadyState {
        self.ready.get()
    }

    fn status(&self) -> Result<u16, TransportError> {
        if self.ready.get() < ReadyState::Sent {
            return Err(TransportError::InvalidState("status before headers".into()));
        }
        Ok(self.status.get())
    }

    fn status_text(&self) -> Result<String, TransportError> {
        Ok(self.status_text.borrow().clone())
    }

    fn response_text(&self) -> Result<String, TransportError> {
        if self.ready.get() < ReadyState::Receiving {
            return Err(TransportError::InvalidState("body before loading".into()));
        }
        Ok(self.body.borrow().clone())
    }

    fn set_ready_state_callback(&self, callback: Option<Notify>) -> Result<(), TransportError> {
        if callback.is_none() && self.script.detach_error {
            return Err(TransportError::Failed("handler is read-only".into()));
        }
        *self.callback.borrow_mut() = callback;
        Ok(())
    }

    fn response_header(&self, name: &str) -> Result<Option<String>, TransportError> {
        Ok(self
            .response_headers
            .borrow()
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.clone()))
    }

    fn all_response_headers(&self) -> Result<String, TransportError> {
        Ok(self
            .response_headers
            .borrow()
            .iter()
            .map(|(k, v)| format!("{k}: {v}\r\n"))
            .collect())
    }

    fn capabilities(&self) -> TransportCapabilities {
        self.script.capabilities
    }

    fn response(&self) -> Result<ResponsePayload, TransportError> {
        let text = self.response_text()?;
        Ok(match self.response_type.get() {
            Some(ResponseType::ArrayBuffer | ResponseType::Blob) => {
                ResponsePayload::Binary(text.into_bytes())
            }
            Some(ResponseType::Document) => ResponsePayload::Document(text),
            _ => ResponsePayload::Text(text),
        })
    }

    fn set_response_type(&self, response_type: ResponseType) -> Result<(), TransportError> {
        self.response_type.set(Some(response_type));
        Ok(())
    }

    fn set_with_credentials(&self, with_credentials: bool) -> Result<(), TransportError> {
        self.with_credentials.set(Some(with_credentials));
        Ok(())
    }

    fn set_native_timeout(&self, timeout: Option<NativeTimeout>) -> Result<(), TransportError> {
        if !self.script.capabilities.native_timeout {
            return Err(TransportError::Unsupported("native timeout"));
        }
        *self.native_timeout.borrow_mut() = timeout;
        Ok(())
    }

    fn set_progress_callback(
        &self,
        callback: Option<ProgressCallback>,
    ) -> Result<(), TransportError> {
        *self.progress.borrow_mut() = callback;
        Ok(())
    }
}

/// Hands out `FakeTransport`s built from the current script.
#[derive(Default)]
pub struct FakeFactory {
    script: RefCell<Script>,
    options: Cell<TransportOptions>,
    created: RefCell<Vec<Rc<FakeTransport>>>,
}

impl FakeFactory {
    pub fn with_script(script: Script) -> Self {
        let factory = Self::default();
        *factory.script.borrow_mut() = script;
        factory
    }

    pub fn set_script(&self, script: Script) {
        *self.script.borrow_mut() = script;
    }

    pub fn set_options(&self, options: TransportOptions) {
        self.options.set(options);
    }

    pub fn last(&self) -> Rc<FakeTransport> {
        Rc::clone(self.created.borrow().last().expect("no transport created"))
    }

    pub fn nth(&self, index: usize) -> Rc<FakeTransport> {
        Rc::clone(&self.created.borrow()[index])
    }

    pub fn count(&self) -> usize {
        self.created.borrow().len()
    }
}

impl TransportFactory for FakeFactory {
    fn create(&self) -> Rc<dyn Transport> {
        let transport = Rc::new(FakeTransport::new(self.script.borrow().clone()));
        self.created.borrow_mut().push(Rc::clone(&transport));
        transport
    }

    fn options(&self) -> TransportOptions {
        self.options.get()
    }
}

type Scheduled = (Duration, u64, Box<dyn FnOnce()>);

/// Timer facility on a virtual clock advanced by the test.
#[derive(Default)]
pub struct ManualTimers {
    now: Cell<Duration>,
    next: Cell<u64>,
    queue: RefCell<Vec<Scheduled>>,
}

impl ManualTimers {
    pub fn pending(&self) -> usize {
        self.queue.borrow().len()
    }

    /// Run every callback due within `by`, in due order.
    pub fn advance(&self, by: Duration) {
        let target = self.now.get() + by;
        loop {
            let next = {
                let mut queue = self.queue.borrow_mut();
                let earliest = queue
                    .iter()
                    .enumerate()
                    .filter(|(_, (due, _, _))| *due <= target)
                    .min_by_key(|(_, (due, id, _))| (*due, *id))
                    .map(|(index, _)| index);
                earliest.map(|index| queue.remove(index))
            };
            let Some((due, _, callback)) = next else {
                break;
            };
            self.now.set(due);
            callback();
        }
        self.now.set(target);
    }

    pub fn advance_ms(&self, millis: u64) {
        self.advance(Duration::from_millis(millis));
    }

    /// Run zero-delay callbacks.
    pub fn run_ready(&self) {
        self.advance(Duration::ZERO);
    }
}

impl TimerFacility for ManualTimers {
    fn schedule(&self, delay: Duration, callback: Box<dyn FnOnce()>) -> TimerId {
        let id = self.next.get() + 1;
        self.next.set(id);
        self.queue
            .borrow_mut()
            .push((self.now.get() + delay, id, callback));
        TimerId(id)
    }

    fn cancel(&self, id: TimerId) {
        self.queue.borrow_mut().retain(|(_, queued, _)| *queued != id.0);
    }
}

pub struct Harness {
    pub controller: RequestController,
    pub factory: Rc<FakeFactory>,
    pub timers: Rc<ManualTimers>,
    pub events: Rc<RefCell<Vec<EventType>>>,
}

impl Harness {
    pub fn new(script: Script) -> Self {
        let factory = Rc::new(FakeFactory::with_script(script));
        let timers = Rc::new(ManualTimers::default());
        let controller = RequestController::new(platform(&factory, &timers));
        let events = record(&controller);
        Self {
            controller,
            factory,
            timers,
            events,
        }
    }

    pub fn transport(&self) -> Rc<FakeTransport> {
        self.factory.last()
    }

    pub fn events(&self) -> Vec<EventType> {
        self.events.borrow().clone()
    }

    pub fn clear_events(&self) {
        self.events.borrow_mut().clear();
    }

    pub fn send(&self, url: &str) {
        self.controller.send(url, None, None, None).unwrap();
    }
}

pub fn platform(factory: &Rc<FakeFactory>, timers: &Rc<ManualTimers>) -> Platform {
    let transports: Rc<dyn TransportFactory> = factory.clone();
    let timers: Rc<dyn TimerFacility> = timers.clone();
    Platform::new(transports, timers)
}

/// Record every event the controller dispatches.
pub fn record(controller: &RequestController) -> Rc<RefCell<Vec<EventType>>> {
    let events = Rc::new(RefCell::new(Vec::new()));
    for kind in ALL_EVENTS {
        let sink = Rc::clone(&events);
        controller.listen(kind, move |event| sink.borrow_mut().push(event.kind));
    }
    events
}
