//! Collaborators a controller is constructed with.
//!
//! # Design
//! A `Platform` is cheap to clone (all fields are `Rc`) so a `Registry` can
//! hand the same collaborators to every controller it creates. The
//! entry-point guard is the hook a host uses to instrument genuine
//! asynchronous entries (for example to catch and report panics); it is
//! never applied to notifications that re-enter synchronously from the
//! controller's own calls into the transport.

use std::fmt;
use std::rc::Rc;

use crate::timer::TimerFacility;
use crate::transport::TransportFactory;

/// Wraps every asynchronous readiness notification before it is handled.
pub trait EntryPointGuard {
    fn enter(&self, entry: &mut dyn FnMut());
}

#[derive(Clone)]
pub struct Platform {
    pub(crate) transports: Rc<dyn TransportFactory>,
    pub(crate) timers: Rc<dyn TimerFacility>,
    pub(crate) entry_point: Option<Rc<dyn EntryPointGuard>>,
}

impl Platform {
    pub fn new(transports: Rc<dyn TransportFactory>, timers: Rc<dyn TimerFacility>) -> Self {
        Self {
            transports,
            timers,
            entry_point: None,
        }
    }

    pub fn with_entry_point(mut self, guard: Rc<dyn EntryPointGuard>) -> Self {
        self.entry_point = Some(guard);
        self
    }
}

impl fmt::Debug for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Platform")
            .field("entry_point", &self.entry_point.is_some())
            .finish_non_exhaustive()
    }
}
