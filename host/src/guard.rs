//! Entry-point guard that keeps panics out of the event loop.

use std::cell::Cell;
use std::panic::{catch_unwind, AssertUnwindSafe};

use reqcycle_core::EntryPointGuard;
use tracing::error;

/// Catches a panic raised while handling an asynchronous notification and
/// logs it instead of unwinding into the runtime.
#[derive(Debug, Default)]
pub struct CatchUnwindGuard {
    caught: Cell<usize>,
}

impl CatchUnwindGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Panics caught so far.
    pub fn caught(&self) -> usize {
        self.caught.get()
    }
}

impl EntryPointGuard for CatchUnwindGuard {
    fn enter(&self, entry: &mut dyn FnMut()) {
        if let Err(panic) = catch_unwind(AssertUnwindSafe(|| entry())) {
            self.caught.set(self.caught.get() + 1);
            let message = panic
                .downcast_ref::<&str>()
                .map(|msg| msg.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "non-string panic payload".to_string());
            error!(panic = %message, "Panic while handling request notification");
        }
    }
}
