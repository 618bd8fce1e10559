//! Topic dispatcher: blocking, cancellable fan-out to every listener.
//!
//! A broadcast snapshots the listener set under the read guard, releases it,
//! then waits on one `Select` holding a send operation and a close signal per
//! listener plus the context's done channel. Whichever operation is ready is
//! completed and both operations of that listener are retired, until every
//! listener has either accepted the event or been closed, or the context fires.

use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crossbeam_channel::{Receiver, Select, Sender};
use tracing::{debug, trace, warn};

use crate::context::Context;
use crate::error::{BusResult, DispatchError};
use crate::event::Event;

use super::listener::Listener;
use super::subscription::{Subscription, SubscriptionId};

/// Outcome of a successful broadcast.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Delivery {
    /// Listeners that accepted the event into their buffer.
    pub delivered: usize,
    /// Listeners closed by an unsubscribe while the broadcast waited on them.
    pub skipped: usize,
    /// Listeners whose reader was gone; they are pruned from the topic.
    pub disconnected: usize,
}

struct Target {
    id: SubscriptionId,
    events: Sender<Arc<Event>>,
    closed: Receiver<()>,
}

#[derive(Clone, Copy)]
enum Op {
    Deliver(usize),
    Closed(usize),
}

/// Dispatcher owning the listener set of one topic.
#[derive(Debug)]
pub struct Topic {
    name: String,
    listeners: RwLock<HashMap<SubscriptionId, Arc<Listener>>>,
}

impl Topic {
    pub(crate) fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        debug!(topic = %name, "topic created");
        Self {
            name,
            listeners: RwLock::new(HashMap::new()),
        }
    }

    /// The topic name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of currently registered listeners.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.read().len()
    }

    /// Register a new listener with a buffer of `capacity` events.
    pub fn subscribe(&self, capacity: usize) -> Subscription {
        let (listener, rx) = Listener::new(capacity);
        let id = listener.id();
        trace!(topic = %self.name, subscription = %id, capacity = listener.capacity(), "subscribed");
        self.write().insert(id, Arc::new(listener));
        Subscription::new(id, self.name.clone(), rx)
    }

    /// Remove and close one listener. Returns false if it was not registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let removed = self.write().remove(&id);
        match removed {
            Some(listener) => {
                listener.close();
                trace!(topic = %self.name, subscription = %id, "unsubscribed");
                true
            }
            None => false,
        }
    }

    /// Detach the whole listener generation and close each listener.
    ///
    /// New subscribers attach to a fresh, empty set. Returns the number of
    /// listeners closed.
    pub fn close_all(&self) -> usize {
        let detached: Vec<Arc<Listener>> = {
            let mut guard = self.write();
            guard.drain().map(|(_, l)| l).collect()
        };

        let closed = detached.iter().filter(|l| l.close()).count();
        debug!(topic = %self.name, closed, "topic closed");
        closed
    }

    /// Deliver `event` to every listener registered at call time.
    ///
    /// Returns once each listener has accepted the event into its buffer (or
    /// was closed meanwhile). If `ctx` fires first the call fails with
    /// [`DispatchError::Cancelled`] or [`DispatchError::DeadlineExceeded`];
    /// listeners that already accepted the event keep it.
    pub fn broadcast(&self, ctx: &Context, event: &Arc<Event>) -> BusResult<Delivery> {
        if let Some(err) = ctx.err() {
            return Err(err.into());
        }

        let targets = self.snapshot();
        if targets.is_empty() {
            return Ok(Delivery::default());
        }

        let (delivery, gone) = guarded(&self.name, || fan_out(ctx, event, &targets))?;

        if !gone.is_empty() {
            self.prune(&gone);
        }

        trace!(
            topic = %self.name,
            delivered = delivery.delivered,
            skipped = delivery.skipped,
            disconnected = delivery.disconnected,
            "broadcast complete"
        );
        Ok(delivery)
    }

    fn snapshot(&self) -> Vec<Target> {
        let guard = self.read();
        guard
            .values()
            .filter_map(|l| {
                l.sender().map(|events| Target {
                    id: l.id(),
                    events,
                    closed: l.closed_signal(),
                })
            })
            .collect()
    }

    fn prune(&self, ids: &[SubscriptionId]) {
        let mut guard = self.write();
        for id in ids {
            if let Some(listener) = guard.remove(id) {
                listener.close();
            }
        }
        debug!(topic = %self.name, pruned = ids.len(), "pruned listeners with dropped readers");
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<SubscriptionId, Arc<Listener>>> {
        self.listeners.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<SubscriptionId, Arc<Listener>>> {
        self.listeners.write().unwrap_or_else(PoisonError::into_inner)
    }
}

fn fan_out(
    ctx: &Context,
    event: &Arc<Event>,
    targets: &[Target],
) -> Result<(Delivery, Vec<SubscriptionId>), DispatchError> {
    let mut sel = Select::new();
    let mut ops: HashMap<usize, Op> = HashMap::with_capacity(targets.len() * 2);
    let mut slots: Vec<(usize, usize)> = Vec::with_capacity(targets.len());

    for (i, target) in targets.iter().enumerate() {
        let send = sel.send(&target.events);
        let closed = sel.recv(&target.closed);
        ops.insert(send, Op::Deliver(i));
        ops.insert(closed, Op::Closed(i));
        slots.push((send, closed));
    }

    let cancel = ctx.done_receiver().map(|done| (sel.recv(done), done));

    let mut delivery = Delivery::default();
    let mut gone = Vec::new();
    let mut remaining = targets.len();

    while remaining > 0 {
        let oper = match ctx.deadline() {
            Some(deadline) => match sel.select_deadline(deadline) {
                Ok(oper) => oper,
                Err(_) => return Err(ctx.deadline_error()),
            },
            None => sel.select(),
        };
        let index = oper.index();

        if let Some((cancel_index, done)) = cancel {
            if index == cancel_index {
                let _ = oper.recv(done);
                return Err(DispatchError::Cancelled);
            }
        }

        let slot = match ops.get(&index) {
            Some(Op::Deliver(i)) => {
                let target = &targets[*i];
                match oper.send(&target.events, Arc::clone(event)) {
                    Ok(()) => delivery.delivered += 1,
                    Err(_) => {
                        delivery.disconnected += 1;
                        gone.push(target.id);
                    }
                }
                *i
            }
            Some(Op::Closed(i)) => {
                let _ = oper.recv(&targets[*i].closed);
                delivery.skipped += 1;
                *i
            }
            None => unreachable!("select returned an operation that was never registered"),
        };

        let (send, closed) = slots[slot];
        sel.remove(send);
        sel.remove(closed);
        remaining -= 1;
    }

    Ok((delivery, gone))
}

/// Run a fan-out step, turning a panic inside it into `DeliveryFailed`.
fn guarded<T>(topic: &str, f: impl FnOnce() -> Result<T, DispatchError>) -> Result<T, DispatchError> {
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(result) => result,
        Err(payload) => {
            let reason = panic_message(payload.as_ref());
            warn!(topic, %reason, "broadcast aborted");
            Err(DispatchError::DeliveryFailed {
                topic: topic.to_string(),
                reason,
            })
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "panic during fan-out".to_string()
    }
}
