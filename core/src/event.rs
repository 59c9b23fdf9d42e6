//! Lifecycle events and listener bookkeeping.
//!
//! # Design
//! Dispatch snapshots the matching listeners before invoking any of them,
//! so a listener may freely listen, unlisten, send or dispose on the
//! controller it was called for. Each entry carries a `removed` flag that
//! `remove` and `clear` set; dispatch checks it before every call, so a
//! listener removed mid-dispatch is skipped. One-shot listeners are taken
//! out at snapshot time and therefore fire at most once even if the
//! dispatch re-enters.

use std::cell::Cell;
use std::fmt;
use std::rc::Rc;

use crate::controller::RequestController;
use crate::http::ProgressInfo;

/// Events a `RequestController` emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventType {
    ReadyStateChange,
    Complete,
    Success,
    Error,
    Abort,
    Timeout,
    /// The controller released its transport and may be reused.
    Ready,
    Progress,
    DownloadProgress,
    UploadProgress,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::ReadyStateChange => "readystatechange",
            EventType::Complete => "complete",
            EventType::Success => "success",
            EventType::Error => "error",
            EventType::Abort => "abort",
            EventType::Timeout => "timeout",
            EventType::Ready => "ready",
            EventType::Progress => "progress",
            EventType::DownloadProgress => "downloadprogress",
            EventType::UploadProgress => "uploadprogress",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A dispatched event.
pub struct Event {
    pub kind: EventType,
    pub target: RequestController,
    /// Set for the progress family of events.
    pub progress: Option<ProgressInfo>,
}

impl fmt::Debug for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Event")
            .field("kind", &self.kind)
            .field("progress", &self.progress)
            .finish_non_exhaustive()
    }
}

/// Handle returned by `listen`, used to `unlisten`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerKey(u64);

pub(crate) type Listener = Rc<dyn Fn(&Event)>;

struct Entry {
    key: ListenerKey,
    kind: EventType,
    once: bool,
    removed: Rc<Cell<bool>>,
    callback: Listener,
}

/// A listener taken for one dispatch.
pub(crate) struct Pending {
    removed: Rc<Cell<bool>>,
    callback: Listener,
}

impl Pending {
    /// Whether the listener was removed after the snapshot was taken.
    pub(crate) fn is_removed(&self) -> bool {
        self.removed.get()
    }

    pub(crate) fn call(&self, event: &Event) {
        (self.callback)(event);
    }
}

#[derive(Default)]
pub(crate) struct Listeners {
    next: u64,
    entries: Vec<Entry>,
}

impl Listeners {
    pub(crate) fn add(&mut self, kind: EventType, once: bool, callback: Listener) -> ListenerKey {
        self.next += 1;
        let key = ListenerKey(self.next);
        self.entries.push(Entry {
            key,
            kind,
            once,
            removed: Rc::new(Cell::new(false)),
            callback,
        });
        key
    }

    pub(crate) fn remove(&mut self, key: ListenerKey) -> bool {
        let Some(index) = self.entries.iter().position(|entry| entry.key == key) else {
            return false;
        };
        self.entries.remove(index).removed.set(true);
        true
    }

    pub(crate) fn clear(&mut self) {
        for entry in self.entries.drain(..) {
            entry.removed.set(true);
        }
    }

    pub(crate) fn count(&self, kind: EventType) -> usize {
        self.entries.iter().filter(|entry| entry.kind == kind).count()
    }

    /// Listeners for `kind` in registration order; one-shot entries are
    /// removed.
    pub(crate) fn snapshot(&mut self, kind: EventType) -> Vec<Pending> {
        let matching = self
            .entries
            .iter()
            .filter(|entry| entry.kind == kind)
            .map(|entry| Pending {
                removed: Rc::clone(&entry.removed),
                callback: Rc::clone(&entry.callback),
            })
            .collect();
        self.entries.retain(|entry| !(entry.once && entry.kind == kind));
        matching
    }
}
