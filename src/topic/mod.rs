//! Topic-addressed event broadcast.
//!
//! A [`Topic`] owns the listeners of one topic name and delivers each published
//! [`Event`](crate::Event) to all of them as a single blocking operation.

/// Fan-out dispatcher.
pub mod dispatcher;
mod listener;
/// Subscriber receive handle.
pub mod subscription;

pub use dispatcher::{Delivery, Topic};
pub use subscription::{Subscription, SubscriptionId};
