//! # KyroBus - In-process event bus and triggers
//!
//! KyroBus offers two publish/subscribe mechanisms for threads within one
//! process:
//!
//! - **Topics** multicast an [`Event`] to every current subscriber of a name.
//!   A publish blocks until every subscriber buffer accepted the event, or the
//!   caller's [`Context`] is cancelled or times out.
//! - **Triggers** wake every listener with a payload-free signal. Pushing costs
//!   an atomic increment; a background worker per trigger performs a
//!   best-effort fan-out and merges bursts of pushes into single passes.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use kyrobus::{Context, Hub};
//! use serde_json::json;
//!
//! let hub = Hub::new();
//! let sub = hub.subscribe("orders");
//!
//! std::thread::spawn(move || {
//!     for ev in sub.iter() {
//!         let id: u64 = ev.arg_as(0)?;
//!         // handle order...
//!     }
//! });
//!
//! hub.emit(&Context::background(), "orders", vec![json!(42)])?;
//!
//! let trigger = hub.trigger("cache-invalidated")?;
//! let listener = trigger.listen();
//! trigger.push();
//! assert!(listener.recv());
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod context;
pub mod error;
pub mod event;
pub mod hub;
pub mod topic;
pub mod trigger;

// Re-export primary types at crate root for convenience
pub use config::{HubConfig, DEFAULT_SUBSCRIPTION_CAPACITY};
pub use context::{CancelHandle, Context};
pub use error::{BusError, BusResult, DispatchError, EventError};
pub use event::{EncodedArg, Event};
pub use hub::Hub;
pub use topic::{Delivery, Subscription, SubscriptionId, Topic};
pub use trigger::{ListenerId, Trigger, TriggerListener, DEFAULT_TRIGGER_CAPACITY};
