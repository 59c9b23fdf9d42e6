//! Single-shot delayed callbacks.

use std::time::Duration;

/// Identifies a scheduled callback so it can be cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerId(pub u64);

/// Schedules and cancels delayed callbacks on the controller's thread.
///
/// Callbacks must run later, never from inside `schedule`, even for a zero
/// delay. Cancelling an id that already fired or was never issued is a
/// no-op.
pub trait TimerFacility {
    fn schedule(&self, delay: Duration, callback: Box<dyn FnOnce()>) -> TimerId;

    fn cancel(&self, id: TimerId);
}
