//! A `Transport` backed by a blocking ureq exchange.
//!
//! # Design
//! The controller is single-threaded, so the handle lives on a tokio
//! `LocalSet`. `send` spawns a local task that moves the exchange onto the
//! blocking pool with `spawn_blocking`, then replays the readiness steps
//! (`Sent`, `Receiving`, `Complete`) back on the local thread once the
//! response is fully read. The task only keeps a `Weak` to the handle:
//! when the controller lets go of the transport the handle drops and the
//! task is aborted.
//!
//! `open` and `abort` notify synchronously, the way a browser transport
//! does. A connection-level failure completes the exchange with status 0,
//! leaving the decision to the controller's status check.

use std::cell::RefCell;
use std::future::Future;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::rc::{Rc, Weak};

use reqcycle_core::{
    Body, NativeTimeout, Notify, ProgressCallback, ProgressDirection, ProgressInfo, ReadyState,
    ResponsePayload, ResponseType, Transport, TransportCapabilities, TransportError,
    TransportFactory,
};
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use ureq::http::{self, HeaderName, HeaderValue, Method};
use ureq::Agent;
use url::Url;
use uuid::Uuid;

use crate::config::HostConfig;

// ---- Factory ----

/// Hands out one `UreqTransport` per request cycle, sharing a single agent
/// and its connection pool.
pub struct UreqTransportFactory {
    agent: Agent,
    config: Rc<HostConfig>,
}

impl UreqTransportFactory {
    pub fn new(config: HostConfig) -> Self {
        let agent = Agent::config_builder()
            .http_status_as_error(false)
            .build()
            .new_agent();
        Self {
            agent,
            config: Rc::new(config),
        }
    }
}

impl Default for UreqTransportFactory {
    fn default() -> Self {
        Self::new(HostConfig::default())
    }
}

impl TransportFactory for UreqTransportFactory {
    fn create(&self) -> Rc<dyn Transport> {
        let agent = self.agent.clone();
        let config = Rc::clone(&self.config);
        Rc::new_cyclic(|this| UreqTransport {
            agent,
            config,
            this: this.clone(),
            state: RefCell::default(),
            callback: RefCell::default(),
            progress: RefCell::default(),
            native_timeout: RefCell::default(),
            task: RefCell::default(),
        })
    }
}

// ---- Handle ----

pub struct UreqTransport {
    agent: Agent,
    config: Rc<HostConfig>,
    this: Weak<UreqTransport>,
    state: RefCell<State>,
    callback: RefCell<Option<Notify>>,
    progress: RefCell<Option<ProgressCallback>>,
    native_timeout: RefCell<Option<NativeTimeout>>,
    task: RefCell<Option<JoinHandle<()>>>,
}

#[derive(Default)]
struct State {
    ready: ReadyState,
    sent: bool,
    method: String,
    url: String,
    request_headers: Vec<(String, String)>,
    response_type: ResponseType,
    response: Option<Exchanged>,
}

/// What came back from the server.
struct Exchanged {
    status: u16,
    status_text: String,
    headers: Vec<(String, String)>,
    body: Vec<u8>,
}

impl Exchanged {
    fn network_error() -> Self {
        Self {
            status: 0,
            status_text: String::new(),
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    fn header(&self, name: &str) -> Option<String> {
        let values: Vec<&str> = self
            .headers
            .iter()
            .filter(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
            .collect();
        (!values.is_empty()).then(|| values.join(", "))
    }

    fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Everything the blocking pool needs to run one exchange.
struct Exchange {
    method: String,
    url: String,
    headers: Vec<(String, String)>,
    body: Vec<u8>,
}

impl UreqTransport {
    fn notify(&self) {
        let callback = self.callback.borrow().clone();
        if let Some(callback) = callback {
            callback();
        }
    }

    fn report(&self, info: ProgressInfo) {
        let callback = self.progress.borrow().clone();
        if let Some(callback) = callback {
            callback(info);
        }
    }

    /// Move to `ready` and notify, unless the exchange was abandoned.
    fn advance(&self, ready: ReadyState) -> bool {
        {
            let mut state = self.state.borrow_mut();
            if !state.sent {
                return false;
            }
            state.ready = ready;
        }
        self.notify();
        true
    }

    fn deliver(&self, uploaded: u64, exchanged: Exchanged) {
        self.task.borrow_mut().take();
        let downloaded = exchanged.body.len() as u64;
        debug!(status = exchanged.status, bytes = downloaded, "Exchange finished");
        self.state.borrow_mut().response = Some(exchanged);

        if uploaded > 0 {
            self.report(ProgressInfo {
                direction: ProgressDirection::Upload,
                loaded: uploaded,
                total: Some(uploaded),
            });
        }
        for ready in [ReadyState::Sent, ReadyState::Receiving, ReadyState::Complete] {
            if !self.advance(ready) {
                return;
            }
            if ready == ReadyState::Receiving {
                self.report(ProgressInfo {
                    direction: ProgressDirection::Download,
                    loaded: downloaded,
                    total: Some(downloaded),
                });
            }
        }
    }

    fn fire_timeout(&self) {
        self.task.borrow_mut().take();
        let armed = self.native_timeout.borrow().clone();
        if let Some(armed) = armed {
            debug!(after_ms = armed.after.as_millis() as u64, "Native timeout fired");
            (armed.on_timeout)();
        }
    }

    fn stop_task(&self) {
        let task = self.task.borrow_mut().take();
        if let Some(task) = task {
            task.abort();
        }
    }

    fn with_response<T>(&self, read: impl FnOnce(&Exchanged) -> T) -> Option<T> {
        self.state.borrow().response.as_ref().map(read)
    }
}

impl Drop for UreqTransport {
    fn drop(&mut self) {
        if let Some(task) = self.task.get_mut().take() {
            task.abort();
        }
    }
}

impl Transport for UreqTransport {
    fn open(&self, method: &str, url: &str) -> Result<(), TransportError> {
        let parsed = Url::parse(url).map_err(|e| TransportError::InvalidUrl(format!("{url}: {e}")))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(TransportError::InvalidUrl(format!(
                "{url}: unsupported scheme {}",
                parsed.scheme()
            )));
        }
        Method::from_bytes(method.as_bytes())
            .map_err(|_| TransportError::InvalidMethod(method.to_string()))?;

        self.stop_task();
        *self.state.borrow_mut() = State {
            ready: ReadyState::Opened,
            method: method.to_string(),
            url: url.to_string(),
            ..State::default()
        };
        self.notify();
        Ok(())
    }

    fn set_request_header(&self, name: &str, value: &str) -> Result<(), TransportError> {
        let mut state = self.state.borrow_mut();
        if state.ready != ReadyState::Opened || state.sent {
            return Err(TransportError::InvalidState(
                "headers can only be set on an opened exchange".to_string(),
            ));
        }
        HeaderName::from_bytes(name.as_bytes()).map_err(|e| TransportError::InvalidHeader {
            name: name.to_string(),
            reason: e.to_string(),
        })?;
        HeaderValue::from_str(value).map_err(|e| TransportError::InvalidHeader {
            name: name.to_string(),
            reason: e.to_string(),
        })?;
        state
            .request_headers
            .push((name.to_string(), value.to_string()));
        Ok(())
    }

    fn send(&self, body: Option<&Body>) -> Result<(), TransportError> {
        let exchange = {
            let mut state = self.state.borrow_mut();
            if state.ready != ReadyState::Opened || state.sent {
                return Err(TransportError::InvalidState(
                    "send needs an opened exchange".to_string(),
                ));
            }
            let (payload, content_type) = encode_body(body);
            let mut headers = state.request_headers.clone();
            let has = |headers: &[(String, String)], name: &str| {
                headers.iter().any(|(key, _)| key.eq_ignore_ascii_case(name))
            };
            if let Some(content_type) = content_type {
                if !has(&headers, "Content-Type") {
                    headers.push(("Content-Type".to_string(), content_type));
                }
            }
            if !has(&headers, "User-Agent") {
                headers.push(("User-Agent".to_string(), self.config.user_agent.clone()));
            }
            Exchange {
                method: state.method.clone(),
                url: state.url.clone(),
                headers,
                body: payload,
            }
        };

        debug!(method = %exchange.method, url = %exchange.url, "Starting exchange");
        let uploaded = exchange.body.len() as u64;
        let agent = self.agent.clone();
        let limit = self.config.max_response_bytes;
        let timeout = self.native_timeout.borrow().as_ref().map(|armed| armed.after);
        let this = self.this.clone();

        let task = spawn_on_local_set(async move {
            let blocking = tokio::task::spawn_blocking(move || execute(&agent, exchange, limit));
            let joined = match timeout {
                Some(after) => match tokio::time::timeout(after, blocking).await {
                    Ok(joined) => joined,
                    Err(_) => {
                        if let Some(this) = this.upgrade() {
                            this.fire_timeout();
                        }
                        return;
                    }
                },
                None => blocking.await,
            };
            let Some(this) = this.upgrade() else {
                return;
            };
            let exchanged = match joined {
                Ok(Ok(exchanged)) => exchanged,
                Ok(Err(reason)) => {
                    warn!(error = %reason, "Exchange failed");
                    Exchanged::network_error()
                }
                Err(e) => {
                    warn!(error = %e, "Exchange task did not finish");
                    Exchanged::network_error()
                }
            };
            this.deliver(uploaded, exchanged);
        })?;
        self.state.borrow_mut().sent = true;
        *self.task.borrow_mut() = Some(task);
        Ok(())
    }

    fn abort(&self) -> Result<(), TransportError> {
        self.stop_task();
        let in_flight = {
            let state = self.state.borrow();
            state.sent && state.ready < ReadyState::Complete
        };
        if in_flight {
            {
                let mut state = self.state.borrow_mut();
                state.ready = ReadyState::Complete;
                state.response = Some(Exchanged::network_error());
            }
            self.notify();
        }
        let mut state = self.state.borrow_mut();
        state.ready = ReadyState::Uninitialized;
        state.sent = false;
        state.response = None;
        Ok(())
    }

    fn ready_state(&self) -> ReadyState {
        self.state.borrow().ready
    }

    fn status(&self) -> Result<u16, TransportError> {
        Ok(self.with_response(|r| r.status).unwrap_or(0))
    }

    fn status_text(&self) -> Result<String, TransportError> {
        Ok(self
            .with_response(|r| r.status_text.clone())
            .unwrap_or_default())
    }

    fn response_text(&self) -> Result<String, TransportError> {
        if self.ready_state() < ReadyState::Receiving {
            return Ok(String::new());
        }
        Ok(self.with_response(Exchanged::text).unwrap_or_default())
    }

    fn set_ready_state_callback(&self, callback: Option<Notify>) -> Result<(), TransportError> {
        *self.callback.borrow_mut() = callback;
        Ok(())
    }

    fn response_header(&self, name: &str) -> Result<Option<String>, TransportError> {
        if self.ready_state() < ReadyState::Sent {
            return Ok(None);
        }
        Ok(self.with_response(|r| r.header(name)).flatten())
    }

    fn all_response_headers(&self) -> Result<String, TransportError> {
        if self.ready_state() < ReadyState::Sent {
            return Ok(String::new());
        }
        Ok(self
            .with_response(|r| {
                r.headers
                    .iter()
                    .map(|(name, value)| format!("{name}: {value}\r\n"))
                    .collect()
            })
            .unwrap_or_default())
    }

    fn capabilities(&self) -> TransportCapabilities {
        TransportCapabilities {
            native_timeout: true,
            typed_response: true,
            with_credentials: false,
            progress: true,
        }
    }

    fn response(&self) -> Result<ResponsePayload, TransportError> {
        let response_type = self.state.borrow().response_type;
        let text = self.response_text()?;
        Ok(match response_type {
            ResponseType::Default | ResponseType::Text => ResponsePayload::Text(text),
            ResponseType::Document => ResponsePayload::Document(text),
            ResponseType::Blob | ResponseType::ArrayBuffer => {
                if self.ready_state() < ReadyState::Complete {
                    ResponsePayload::Binary(Vec::new())
                } else {
                    ResponsePayload::Binary(
                        self.with_response(|r| r.body.clone()).unwrap_or_default(),
                    )
                }
            }
        })
    }

    fn response_xml(&self) -> Result<Option<String>, TransportError> {
        let state = self.state.borrow();
        if state.ready != ReadyState::Complete
            || !matches!(state.response_type, ResponseType::Default | ResponseType::Document)
        {
            return Ok(None);
        }
        Ok(state.response.as_ref().and_then(|r| {
            let markup = r
                .header("Content-Type")
                .is_some_and(|content_type| content_type.contains("xml"));
            markup.then(|| r.text())
        }))
    }

    fn set_response_type(&self, response_type: ResponseType) -> Result<(), TransportError> {
        let mut state = self.state.borrow_mut();
        if state.ready > ReadyState::Opened {
            return Err(TransportError::InvalidState(
                "response type is fixed once the exchange is sent".to_string(),
            ));
        }
        state.response_type = response_type;
        Ok(())
    }

    fn set_native_timeout(&self, timeout: Option<NativeTimeout>) -> Result<(), TransportError> {
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

/// `spawn_local` that reports a missing `LocalSet` instead of panicking.
fn spawn_on_local_set<F>(future: F) -> Result<JoinHandle<()>, TransportError>
where
    F: Future<Output = ()> + 'static,
{
    catch_unwind(AssertUnwindSafe(|| tokio::task::spawn_local(future))).map_err(|_| {
        TransportError::Failed("send must run inside a tokio LocalSet".to_string())
    })
}

// ---- Blocking side ----

/// Serialize a body, returning the bytes and the content type it implies.
fn encode_body(body: Option<&Body>) -> (Vec<u8>, Option<String>) {
    match body {
        None => (Vec::new(), None),
        Some(Body::Text(text)) => (text.as_bytes().to_vec(), None),
        Some(Body::Bytes(bytes)) => (bytes.clone(), None),
        Some(Body::Multipart(fields)) => {
            let boundary = format!("reqcycle-{}", Uuid::new_v4().simple());
            let mut encoded = String::new();
            for (name, value) in fields {
                encoded.push_str(&format!(
                    "--{boundary}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
                ));
            }
            encoded.push_str(&format!("--{boundary}--\r\n"));
            (
                encoded.into_bytes(),
                Some(format!("multipart/form-data; boundary={boundary}")),
            )
        }
    }
}

fn execute(agent: &Agent, exchange: Exchange, limit: u64) -> Result<Exchanged, String> {
    let mut builder = http::Request::builder()
        .method(exchange.method.as_str())
        .uri(exchange.url.as_str());
    for (name, value) in &exchange.headers {
        builder = builder.header(name.as_str(), value.as_str());
    }

    let sent = if exchange.body.is_empty() {
        let request = builder.body(()).map_err(|e| e.to_string())?;
        agent.run(request)
    } else {
        let request = builder
            .body(exchange.body.as_slice())
            .map_err(|e| e.to_string())?;
        agent.run(request)
    };
    let mut response = sent.map_err(|e| e.to_string())?;

    let status = response.status();
    let headers = response
        .headers()
        .iter()
        .map(|(name, value)| {
            (
                name.as_str().to_string(),
                String::from_utf8_lossy(value.as_bytes()).into_owned(),
            )
        })
        .collect();
    let body = response
        .body_mut()
        .with_config()
        .limit(limit)
        .read_to_vec()
        .map_err(|e| e.to_string())?;

    Ok(Exchanged {
        status: status.as_u16(),
        status_text: status.canonical_reason().unwrap_or_default().to_string(),
        headers,
        body,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn multipart_bodies_carry_their_boundary() {
        let body = Body::Multipart(vec![
            ("name".to_string(), "ada".to_string()),
            ("lang".to_string(), "rust".to_string()),
        ]);
        let (bytes, content_type) = encode_body(Some(&body));
        let content_type = content_type.unwrap();
        let boundary = content_type
            .strip_prefix("multipart/form-data; boundary=")
            .unwrap();
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.starts_with(&format!("--{boundary}\r\n")));
        assert!(text.contains("name=\"lang\"\r\n\r\nrust\r\n"));
        assert!(text.ends_with(&format!("--{boundary}--\r\n")));
    }

    #[test]
    fn plain_bodies_imply_no_content_type() {
        let (bytes, content_type) = encode_body(Some(&Body::Text("a=1".into())));
        assert_eq!(bytes, b"a=1");
        assert_eq!(content_type, None);
        assert_eq!(encode_body(None), (Vec::new(), None));
    }

    #[test]
    fn open_validates_url_and_method() {
        let transport = UreqTransportFactory::default().create();
        assert!(matches!(
            transport.open("GET", "not a url"),
            Err(TransportError::InvalidUrl(_))
        ));
        assert!(matches!(
            transport.open("GET", "ftp://example.test/file"),
            Err(TransportError::InvalidUrl(_))
        ));
        assert!(matches!(
            transport.open("BAD METHOD", "http://example.test/"),
            Err(TransportError::InvalidMethod(_))
        ));
        transport.open("GET", "http://example.test/").unwrap();
        assert_eq!(transport.ready_state(), ReadyState::Opened);
    }

    #[test]
    fn open_notifies_synchronously() {
        let transport = UreqTransportFactory::default().create();
        let hits = Rc::new(std::cell::Cell::new(0));
        let sink = Rc::clone(&hits);
        transport
            .set_ready_state_callback(Some(Rc::new(move || sink.set(sink.get() + 1))))
            .unwrap();
        transport.open("GET", "http://example.test/").unwrap();
        assert_eq!(hits.get(), 1);
    }

    #[test]
    fn headers_are_validated_and_need_an_open_exchange() {
        let transport = UreqTransportFactory::default().create();
        assert!(matches!(
            transport.set_request_header("X-A", "1"),
            Err(TransportError::InvalidState(_))
        ));
        transport.open("GET", "http://example.test/").unwrap();
        assert!(matches!(
            transport.set_request_header("bad name", "1"),
            Err(TransportError::InvalidHeader { .. })
        ));
        assert!(matches!(
            transport.set_request_header("X-A", "line\nbreak"),
            Err(TransportError::InvalidHeader { .. })
        ));
        transport.set_request_header("X-A", "1").unwrap();
    }

    #[test]
    fn send_without_a_runtime_fails() {
        let transport = UreqTransportFactory::default().create();
        transport.open("GET", "http://example.test/").unwrap();
        assert!(matches!(
            transport.send(None),
            Err(TransportError::Failed(_))
        ));
    }

    #[tokio::test]
    async fn send_outside_a_local_set_fails_and_stays_opened() {
        let transport = UreqTransportFactory::default().create();
        transport.open("GET", "http://example.test/").unwrap();
        assert!(matches!(
            transport.send(None),
            Err(TransportError::Failed(_))
        ));
        assert_eq!(transport.ready_state(), ReadyState::Opened);
        transport.abort().unwrap();
        assert_eq!(transport.ready_state(), ReadyState::Uninitialized);
    }

    #[test]
    fn abort_before_send_is_silent() {
        let transport = UreqTransportFactory::default().create();
        transport.open("GET", "http://example.test/").unwrap();
        let hits = Rc::new(std::cell::Cell::new(0));
        let sink = Rc::clone(&hits);
        transport
            .set_ready_state_callback(Some(Rc::new(move || sink.set(sink.get() + 1))))
            .unwrap();
        transport.abort().unwrap();
        assert_eq!(hits.get(), 0);
        assert_eq!(transport.ready_state(), ReadyState::Uninitialized);
    }
}
