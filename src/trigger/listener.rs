use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::Receiver;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::dispatcher::TriggerShared;

/// Unique identifier for a trigger listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ListenerId(Uuid);

impl ListenerId {
    /// Create a new random listener id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ListenerId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// A registered wake-up channel on a [`Trigger`](super::Trigger).
///
/// Release it with [`TriggerListener::release`] once done; dropping the
/// listener releases it as well.
#[derive(Debug)]
pub struct TriggerListener {
    id: ListenerId,
    rx: Receiver<()>,
    trigger: Arc<TriggerShared>,
    released: AtomicBool,
}

impl TriggerListener {
    pub(crate) fn new(id: ListenerId, rx: Receiver<()>, trigger: Arc<TriggerShared>) -> Self {
        Self {
            id,
            rx,
            trigger,
            released: AtomicBool::new(false),
        }
    }

    /// The listener id.
    #[must_use]
    pub const fn id(&self) -> ListenerId {
        self.id
    }

    /// The buffer capacity of the wake-up channel.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.rx.capacity().unwrap_or(0)
    }

    /// Block until a wake-up arrives. Returns false once the channel is closed.
    #[must_use]
    pub fn recv(&self) -> bool {
        self.rx.recv().is_ok()
    }

    /// Block until a wake-up arrives or `timeout` elapses.
    #[must_use]
    pub fn recv_timeout(&self, timeout: Duration) -> bool {
        self.rx.recv_timeout(timeout).is_ok()
    }

    /// Consume a queued wake-up without blocking.
    #[must_use]
    pub fn try_recv(&self) -> bool {
        self.rx.try_recv().is_ok()
    }

    /// The raw receiver, for use with `crossbeam_channel::select!`.
    #[must_use]
    pub const fn receiver(&self) -> &Receiver<()> {
        &self.rx
    }

    /// Stop receiving and close the channel. Safe to call more than once.
    pub fn release(&self) {
        if self.released.swap(true, Ordering::AcqRel) {
            return;
        }
        self.trigger.release(self.id);
    }
}

impl Drop for TriggerListener {
    fn drop(&mut self) {
        self.release();
    }
}
