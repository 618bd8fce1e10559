//! Cancellation tokens for blocking dispatch.
//!
//! A [`Context`] is either never-firing ([`Context::background`]), cancelled on
//! demand through a [`CancelHandle`], bounded by a deadline, or both. Dispatch
//! waits on the token's done channel alongside its channel sends, so firing a
//! context aborts only the in-flight call that carries it.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, Receiver, Sender, TryRecvError};

use crate::error::DispatchError;

/// Cloneable cancellation token.
///
/// The done channel never carries a value; it becomes ready when every sender
/// held by the matching [`CancelHandle`] is dropped.
#[derive(Debug, Clone, Default)]
pub struct Context {
    done: Option<Receiver<()>>,
    deadline: Option<Instant>,
    budget: Option<Duration>,
}

/// Fires the [`Context`] it was created with.
///
/// Cancelling is idempotent. Dropping the last clone of a handle also cancels,
/// which ties a context to the scope that owns its handle.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    tx: Arc<Mutex<Option<Sender<()>>>>,
}

impl CancelHandle {
    /// Fire the associated context.
    pub fn cancel(&self) {
        let mut guard = self.tx.lock().unwrap_or_else(PoisonError::into_inner);
        guard.take();
    }

    /// Returns true once `cancel` has been called.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.tx.lock().unwrap_or_else(PoisonError::into_inner).is_none()
    }
}

impl Context {
    /// A context that never fires.
    #[must_use]
    pub fn background() -> Self {
        Self::default()
    }

    /// A context fired explicitly through the returned handle.
    ///
    /// Dropping every clone of the handle also cancels it, so the handle must
    /// be kept alive for as long as the context should stay live. Discarding
    /// it, as in `let (ctx, _) = Context::with_cancel()`, yields a context
    /// that is already cancelled.
    #[must_use]
    pub fn with_cancel() -> (Self, CancelHandle) {
        let (tx, rx) = bounded::<()>(0);
        let ctx = Self {
            done: Some(rx),
            deadline: None,
            budget: None,
        };
        let handle = CancelHandle {
            tx: Arc::new(Mutex::new(Some(tx))),
        };
        (ctx, handle)
    }

    /// A context that expires `timeout` from now.
    #[must_use]
    pub fn with_timeout(timeout: Duration) -> Self {
        Self::background().child_with_timeout(timeout)
    }

    /// A context that expires at `deadline`.
    #[must_use]
    pub fn with_deadline(deadline: Instant) -> Self {
        Self::background().child_with_deadline(deadline)
    }

    /// Derive a context that also expires `timeout` from now.
    ///
    /// The child inherits the parent's cancellation; the earlier deadline wins.
    #[must_use]
    pub fn child_with_timeout(&self, timeout: Duration) -> Self {
        let deadline = Instant::now().checked_add(timeout);
        match deadline {
            Some(deadline) => self.child_with_deadline(deadline),
            None => self.clone(),
        }
    }

    /// Derive a context that also expires at `deadline`.
    #[must_use]
    pub fn child_with_deadline(&self, deadline: Instant) -> Self {
        let deadline = match self.deadline {
            Some(existing) if existing <= deadline => existing,
            _ => deadline,
        };
        Self {
            done: self.done.clone(),
            deadline: Some(deadline),
            budget: Some(deadline.saturating_duration_since(Instant::now())),
        }
    }

    /// The instant this context expires, if any.
    #[must_use]
    pub const fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Returns true if the context was cancelled or its deadline passed.
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.err().is_some()
    }

    /// The error a dispatch carrying this context would fail with right now.
    #[must_use]
    pub fn err(&self) -> Option<DispatchError> {
        if let Some(done) = &self.done {
            if matches!(done.try_recv(), Err(TryRecvError::Disconnected)) {
                return Some(DispatchError::Cancelled);
            }
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Some(self.deadline_error()),
            _ => None,
        }
    }

    pub(crate) fn done_receiver(&self) -> Option<&Receiver<()>> {
        self.done.as_ref()
    }

    pub(crate) fn deadline_error(&self) -> DispatchError {
        let budget = self.budget.unwrap_or_default();
        DispatchError::DeadlineExceeded {
            timeout_ms: budget.as_millis().min(u128::from(u64::MAX)) as u64,
        }
    }
}
