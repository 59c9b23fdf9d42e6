//! `TimerFacility` on a tokio `LocalSet`.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;
use std::time::Duration;

use reqcycle_core::{TimerFacility, TimerId};
use tokio::task::AbortHandle;

/// Runs each callback in its own local task after a `tokio::time::sleep`.
///
/// Must be used from inside a `tokio::task::LocalSet`; callbacks are not
/// `Send` and run on the set's thread.
///
/// # Panics
///
/// `schedule` panics when called outside a `LocalSet`, since the
/// `TimerFacility` contract has no way to report the failure.
#[derive(Default)]
pub struct TokioTimers {
    next: Cell<u64>,
    pending: Rc<RefCell<HashMap<TimerId, AbortHandle>>>,
}

impl TokioTimers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Callbacks scheduled and neither fired nor cancelled.
    pub fn pending(&self) -> usize {
        self.pending.borrow().len()
    }
}

impl TimerFacility for TokioTimers {
    fn schedule(&self, delay: Duration, callback: Box<dyn FnOnce()>) -> TimerId {
        let id = TimerId(self.next.get() + 1);
        self.next.set(id.0);

        let pending = Rc::clone(&self.pending);
        let task = tokio::task::spawn_local(async move {
            tokio::time::sleep(delay).await;
            pending.borrow_mut().remove(&id);
            callback();
        });
        self.pending.borrow_mut().insert(id, task.abort_handle());
        id
    }

    fn cancel(&self, id: TimerId) {
        let handle = self.pending.borrow_mut().remove(&id);
        if let Some(handle) = handle {
            handle.abort();
        }
    }
}
