//! Trigger dispatcher: payload-free, coalescing wake-ups.
//!
//! `push` only bumps an atomic counter and signals a condition variable. A
//! dedicated worker thread per trigger is the sole sender on listener
//! channels: each time it wakes with pending pushes it swaps the counter to
//! zero and makes exactly one non-blocking send attempt per listener. Pushes
//! that land during a pass are merged into the next single pass.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, Sender, TrySendError};
use tracing::{debug, trace, warn};

use crate::error::{BusError, BusResult};

use super::listener::{ListenerId, TriggerListener};

/// Default buffer capacity of trigger listener channels.
pub const DEFAULT_TRIGGER_CAPACITY: usize = 1;

#[derive(Debug)]
pub(crate) struct TriggerShared {
    name: String,
    capacity: usize,
    pending: AtomicU64,
    closed: AtomicBool,
    passes: AtomicU64,
    wake_lock: Mutex<()>,
    wake: Condvar,
    listeners: RwLock<HashMap<ListenerId, Sender<()>>>,
}

impl TriggerShared {
    pub(crate) fn release(&self, id: ListenerId) -> bool {
        // Dropping the sender closes the listener channel.
        self.write_listeners().remove(&id).is_some()
    }

    fn signal(&self) {
        // Taking the lock orders this notify after the worker's pending check.
        drop(self.wake_lock.lock().unwrap_or_else(PoisonError::into_inner));
        self.wake.notify_one();
    }

    fn read_listeners(&self) -> RwLockReadGuard<'_, HashMap<ListenerId, Sender<()>>> {
        self.listeners.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_listeners(&self) -> RwLockWriteGuard<'_, HashMap<ListenerId, Sender<()>>> {
        self.listeners.write().unwrap_or_else(PoisonError::into_inner)
    }
}

/// A named, payload-free wake-up channel.
///
/// Delivery is best effort: a listener whose buffer is full when a pass runs
/// misses that pass. Listeners are guaranteed at least one wake-up after the
/// last push, not one per push; give them more capacity to absorb bursts.
#[derive(Debug)]
pub struct Trigger {
    shared: Arc<TriggerShared>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Trigger {
    /// Create an anonymous trigger with the default listener capacity.
    pub fn new() -> BusResult<Self> {
        Self::with_options("trigger", DEFAULT_TRIGGER_CAPACITY)
    }

    /// Create a trigger whose listeners get `capacity` slots by default.
    pub fn with_capacity(capacity: usize) -> BusResult<Self> {
        Self::with_options("trigger", capacity)
    }

    /// Create a named trigger and start its worker thread.
    pub fn with_options(name: impl Into<String>, capacity: usize) -> BusResult<Self> {
        let shared = Arc::new(TriggerShared {
            name: name.into(),
            capacity,
            pending: AtomicU64::new(0),
            closed: AtomicBool::new(false),
            passes: AtomicU64::new(0),
            wake_lock: Mutex::new(()),
            wake: Condvar::new(),
            listeners: RwLock::new(HashMap::new()),
        });

        let thread_shared = Arc::clone(&shared);
        let worker = thread::Builder::new()
            .name("kyrobus-trigger".to_string())
            .spawn(move || drain_loop(&thread_shared))
            .map_err(|e| BusError::internal(format!("failed to spawn trigger worker: {e}")))?;

        debug!(trigger = %shared.name, capacity, "trigger created");
        Ok(Self {
            shared,
            worker: Mutex::new(Some(worker)),
        })
    }

    /// The trigger name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// Default capacity of listeners returned by [`Trigger::listen`].
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.shared.capacity
    }

    /// Register a listener with the trigger's default capacity.
    #[must_use]
    pub fn listen(&self) -> TriggerListener {
        self.listen_with_capacity(self.shared.capacity)
    }

    /// Register a listener with `capacity` slots.
    ///
    /// On a closed trigger the returned listener is already disconnected.
    #[must_use]
    pub fn listen_with_capacity(&self, capacity: usize) -> TriggerListener {
        let (tx, rx) = bounded::<()>(capacity);
        let id = ListenerId::new();
        {
            let mut guard = self.shared.write_listeners();
            // Checked under the write guard so teardown cannot miss this listener.
            if !self.shared.closed.load(Ordering::Acquire) {
                guard.insert(id, tx);
            }
        }
        TriggerListener::new(id, rx, Arc::clone(&self.shared))
    }

    /// Wake every listener. Never blocks and never fails.
    pub fn push(&self) {
        if self.shared.closed.load(Ordering::Acquire) {
            return;
        }
        self.shared.pending.fetch_add(1, Ordering::AcqRel);
        self.shared.signal();
    }

    /// Close every listener and stop the worker. Idempotent.
    ///
    /// Every caller returns only after the worker has closed all listeners.
    pub fn close(&self) -> BusResult<()> {
        if !self.shared.closed.swap(true, Ordering::AcqRel) {
            self.shared.signal();
        }

        // Held across the join so concurrent closers wait for teardown too.
        let mut worker = self
            .worker
            .lock()
            .map_err(|_| BusError::internal("trigger worker lock poisoned"))?;
        if let Some(handle) = worker.take() {
            handle
                .join()
                .map_err(|_| BusError::internal(format!("trigger '{}' worker panicked", self.shared.name)))?;
        }
        Ok(())
    }

    /// Returns true once the trigger has been closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::Acquire)
    }

    /// Number of registered listeners.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.shared.read_listeners().len()
    }

    /// Number of drain passes the worker has completed.
    #[must_use]
    pub fn drain_passes(&self) -> u64 {
        self.shared.passes.load(Ordering::Acquire)
    }
}

impl Drop for Trigger {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!(trigger = %self.shared.name, error = %e, "trigger close on drop failed");
        }
    }
}

fn drain_loop(shared: &TriggerShared) {
    loop {
        {
            let mut guard = shared.wake_lock.lock().unwrap_or_else(PoisonError::into_inner);
            while shared.pending.load(Ordering::Acquire) == 0 && !shared.closed.load(Ordering::Acquire) {
                guard = shared.wake.wait(guard).unwrap_or_else(PoisonError::into_inner);
            }
        }

        if shared.closed.load(Ordering::Acquire) {
            let closed = {
                let mut guard = shared.write_listeners();
                let n = guard.len();
                guard.clear();
                n
            };
            debug!(trigger = %shared.name, closed, "trigger closed");
            return;
        }

        let coalesced = shared.pending.swap(0, Ordering::AcqRel);
        drain_pass(shared, coalesced);
        shared.passes.fetch_add(1, Ordering::AcqRel);
    }
}

fn drain_pass(shared: &TriggerShared, coalesced: u64) {
    let targets: Vec<(ListenerId, Sender<()>)> = shared
        .read_listeners()
        .iter()
        .map(|(id, tx)| (*id, tx.clone()))
        .collect();

    let mut woken = 0usize;
    let mut gone = Vec::new();
    for (id, tx) in &targets {
        match tx.try_send(()) {
            Ok(()) => woken += 1,
            Err(TrySendError::Full(())) => {}
            Err(TrySendError::Disconnected(())) => gone.push(*id),
        }
    }

    if !gone.is_empty() {
        let mut guard = shared.write_listeners();
        for id in &gone {
            guard.remove(id);
        }
    }

    trace!(
        trigger = %shared.name,
        coalesced,
        listeners = targets.len(),
        woken,
        pruned = gone.len(),
        "drain pass"
    );
}
