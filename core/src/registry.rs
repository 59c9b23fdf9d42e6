//! Fire-and-forget requests.
//!
//! # Design
//! A `Registry` is created once by the host at startup and owns every
//! controller it creates for an ad-hoc request. Each controller disposes
//! itself and leaves the registry on its `READY` event. `cleanup_all` (or
//! dropping the last registry handle) disposes whatever is still
//! outstanding, for teardown paths where requests will never complete.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use std::time::Duration;

use tracing::debug;

use crate::controller::RequestController;
use crate::error::RequestError;
use crate::event::{Event, EventType};
use crate::headers::HeaderSet;
use crate::http::Body;
use crate::platform::{EntryPointGuard, Platform};

/// An ad-hoc request for `Registry::send`.
pub struct SendRequest {
    url: String,
    method: Option<String>,
    body: Option<Body>,
    headers: Option<HeaderSet>,
    timeout: Option<Duration>,
    with_credentials: bool,
    on_complete: Option<Rc<dyn Fn(&Event)>>,
}

impl SendRequest {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method: None,
            body: None,
            headers: None,
            timeout: None,
            with_credentials: false,
            on_complete: None,
        }
    }

    pub fn method(mut self, method: impl Into<String>) -> Self {
        self.method = Some(method.into());
        self
    }

    pub fn body(mut self, body: impl Into<Body>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn headers(mut self, headers: HeaderSet) -> Self {
        self.headers = Some(headers);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_credentials(mut self, with_credentials: bool) -> Self {
        self.with_credentials = with_credentials;
        self
    }

    /// Called on the request's `COMPLETE` event.
    pub fn on_complete(mut self, callback: impl Fn(&Event) + 'static) -> Self {
        self.on_complete = Some(Rc::new(callback));
        self
    }
}

impl fmt::Debug for SendRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SendRequest")
            .field("url", &self.url)
            .field("method", &self.method)
            .field("timeout", &self.timeout)
            .field("with_credentials", &self.with_credentials)
            .finish_non_exhaustive()
    }
}

struct RegistryInner {
    platform: RefCell<Platform>,
    instances: RefCell<Vec<RequestController>>,
}

impl RegistryInner {
    fn untrack(&self, controller: &RequestController) {
        self.instances
            .borrow_mut()
            .retain(|tracked| !tracked.ptr_eq(controller));
    }

    fn dispose_all(&self) {
        let instances = std::mem::take(&mut *self.instances.borrow_mut());
        if !instances.is_empty() {
            debug!(count = instances.len(), "Disposing outstanding requests");
        }
        for controller in instances.into_iter().rev() {
            controller.dispose();
        }
    }
}

impl Drop for RegistryInner {
    fn drop(&mut self) {
        self.dispose_all();
    }
}

/// Tracks fire-and-forget controllers.
#[derive(Clone)]
pub struct Registry {
    inner: Rc<RegistryInner>,
}

impl Registry {
    pub fn new(platform: Platform) -> Self {
        Self {
            inner: Rc::new(RegistryInner {
                platform: RefCell::new(platform),
                instances: RefCell::new(Vec::new()),
            }),
        }
    }

    /// Install `guard` around asynchronous entries of every controller
    /// created from now on.
    pub fn protect_entry_points(&self, guard: Rc<dyn EntryPointGuard>) {
        self.inner.platform.borrow_mut().entry_point = Some(guard);
    }

    /// Create a tracked controller and start `request` on it.
    ///
    /// The controller disposes itself after its `READY` event. The returned
    /// handle may be used to abort the request or inspect its outcome from
    /// the completion callback.
    pub fn send(&self, request: SendRequest) -> Result<RequestController, RequestError> {
        let controller = RequestController::new(self.inner.platform.borrow().clone());
        self.inner.instances.borrow_mut().push(controller.clone());

        if let Some(callback) = request.on_complete {
            controller.listen(EventType::Complete, move |event| callback(event));
        }
        let registry = Rc::downgrade(&self.inner);
        controller.listen_once(EventType::Ready, move |event| {
            event.target.dispose();
            if let Some(registry) = registry.upgrade() {
                registry.untrack(&event.target);
            }
        });
        if let Some(timeout) = request.timeout {
            controller.set_timeout_interval(timeout);
        }
        if request.with_credentials {
            controller.set_with_credentials(true);
        }

        let sent = controller.send(
            &request.url,
            request.method.as_deref(),
            request.body,
            request.headers.as_ref(),
        );
        if let Err(e) = sent {
            self.inner.untrack(&controller);
            controller.dispose();
            return Err(e);
        }
        Ok(controller)
    }

    /// Number of controllers that have not reached `READY` yet.
    pub fn outstanding(&self) -> usize {
        self.inner.instances.borrow().len()
    }

    /// Dispose every outstanding controller without dispatching events.
    pub fn cleanup_all(&self) {
        self.inner.dispose_all();
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("outstanding", &self.outstanding())
            .finish_non_exhaustive()
    }
}
