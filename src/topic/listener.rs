use std::sync::{Arc, Mutex, PoisonError};

use crossbeam_channel::{bounded, Receiver, Sender};

use crate::event::Event;

use super::subscription::SubscriptionId;

#[derive(Debug)]
struct Endpoints {
    events: Sender<Arc<Event>>,
    // Never sent on; dropping it wakes every broadcast waiting on `closed`.
    _closed: Sender<()>,
}

/// Dispatcher-side half of one subscription.
///
/// Closing drops the senders exactly once. The reader drains whatever is
/// buffered and then observes disconnection; later closes are no-ops.
#[derive(Debug)]
pub(crate) struct Listener {
    id: SubscriptionId,
    capacity: usize,
    endpoints: Mutex<Option<Endpoints>>,
    closed: Receiver<()>,
}

impl Listener {
    pub(crate) fn new(capacity: usize) -> (Self, Receiver<Arc<Event>>) {
        let (events_tx, events_rx) = bounded::<Arc<Event>>(capacity);
        let (closed_tx, closed_rx) = bounded::<()>(0);

        let listener = Self {
            id: SubscriptionId::new(),
            capacity,
            endpoints: Mutex::new(Some(Endpoints {
                events: events_tx,
                _closed: closed_tx,
            })),
            closed: closed_rx,
        };
        (listener, events_rx)
    }

    pub(crate) const fn id(&self) -> SubscriptionId {
        self.id
    }

    pub(crate) const fn capacity(&self) -> usize {
        self.capacity
    }

    /// A sender for an in-flight broadcast, or `None` once closed.
    pub(crate) fn sender(&self) -> Option<Sender<Arc<Event>>> {
        let guard = self.endpoints.lock().unwrap_or_else(PoisonError::into_inner);
        guard.as_ref().map(|e| e.events.clone())
    }

    /// Becomes ready (disconnected) when the listener is closed.
    pub(crate) fn closed_signal(&self) -> Receiver<()> {
        self.closed.clone()
    }

    /// Close the channel. Returns true only for the call that actually closed it.
    pub(crate) fn close(&self) -> bool {
        let taken = self.endpoints.lock().unwrap_or_else(PoisonError::into_inner).take();
        taken.is_some()
    }
}
