//! Coalescing, payload-free triggers.

/// Trigger state and the background drain loop.
pub mod dispatcher;
/// Listener handle.
pub mod listener;

pub use dispatcher::{Trigger, DEFAULT_TRIGGER_CAPACITY};
pub use listener::{ListenerId, TriggerListener};
