use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{BusResult, DispatchError};
use crate::event::Event;

/// Unique identifier for a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubscriptionId(Uuid);

impl SubscriptionId {
    /// Create a new random subscription id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wrap an existing UUID.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl Default for SubscriptionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Receive handle for one topic subscription.
///
/// Events arrive in publish order for this subscription. Once the topic side
/// closes the listener, buffered events are still delivered before `recv`
/// reports [`DispatchError::Closed`]. Dropping the handle without unsubscribing
/// is tolerated: the dispatcher prunes the listener on its next broadcast.
#[derive(Debug)]
pub struct Subscription {
    id: SubscriptionId,
    topic: String,
    rx: Receiver<Arc<Event>>,
}

impl Subscription {
    pub(crate) fn new(id: SubscriptionId, topic: String, rx: Receiver<Arc<Event>>) -> Self {
        Self { id, topic, rx }
    }

    /// The subscription id, used to unsubscribe.
    #[must_use]
    pub const fn id(&self) -> SubscriptionId {
        self.id
    }

    /// The topic this subscription listens on.
    #[must_use]
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// The buffer capacity of the underlying channel.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.rx.capacity().unwrap_or(0)
    }

    /// Receive the next event (blocking).
    pub fn recv(&self) -> BusResult<Arc<Event>> {
        self.rx.recv().map_err(|_| self.closed())
    }

    /// Receive the next event with a timeout.
    pub fn recv_timeout(&self, timeout: Duration) -> BusResult<Arc<Event>> {
        self.rx.recv_timeout(timeout).map_err(|err| match err {
            RecvTimeoutError::Timeout => DispatchError::DeadlineExceeded {
                timeout_ms: timeout.as_millis().min(u128::from(u64::MAX)) as u64,
            }
            .into(),
            RecvTimeoutError::Disconnected => self.closed(),
        })
    }

    /// Take a buffered event without blocking.
    #[must_use]
    pub fn try_recv(&self) -> Option<Arc<Event>> {
        self.rx.try_recv().ok()
    }

    /// Blocking iterator that ends when the subscription is closed.
    pub fn iter(&self) -> impl Iterator<Item = Arc<Event>> + '_ {
        self.rx.iter()
    }

    /// The raw receiver, for use with `crossbeam_channel::select!`.
    #[must_use]
    pub const fn receiver(&self) -> &Receiver<Arc<Event>> {
        &self.rx
    }

    fn closed(&self) -> crate::error::BusError {
        DispatchError::Closed {
            topic: self.topic.clone(),
        }
        .into()
    }
}
