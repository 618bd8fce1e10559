//! Hub: registry and entry points for topics and triggers.
//!
//! Names map to lazily created dispatchers. Lookups take the shared guard;
//! creation takes the exclusive guard and re-checks, so concurrent first
//! subscribers of a name always end up on the same dispatcher.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use serde_json::Value;
use tracing::debug;

use crate::config::HubConfig;
use crate::context::Context;
use crate::error::{BusError, BusResult, DispatchError};
use crate::event::Event;
use crate::topic::{Delivery, Subscription, Topic};
use crate::trigger::Trigger;

static GLOBAL: OnceLock<Hub> = OnceLock::new();

#[derive(Debug, Default)]
struct Registry {
    topics: HashMap<String, Arc<Topic>>,
    triggers: HashMap<String, Arc<Trigger>>,
}

/// Registry of topics and triggers.
///
/// A topic name stays registered once subscribed: closing the whole topic
/// detaches its listeners but later subscribers reuse the same dispatcher,
/// and publishing to it with no listeners succeeds without delivering.
/// Only names that were never subscribed report
/// [`DispatchError::NoSuchTopic`].
#[derive(Debug, Default)]
pub struct Hub {
    config: HubConfig,
    registry: RwLock<Registry>,
}

impl Hub {
    /// Create an empty hub with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty hub with `config`.
    #[must_use]
    pub fn with_config(config: HubConfig) -> Self {
        Self {
            config,
            registry: RwLock::new(Registry::default()),
        }
    }

    /// The process-wide hub, created on first use and never torn down.
    pub fn global() -> &'static Self {
        GLOBAL.get_or_init(Self::new)
    }

    /// The settings this hub was built with.
    #[must_use]
    pub const fn config(&self) -> &HubConfig {
        &self.config
    }

    /// Look up a topic without creating it.
    #[must_use]
    pub fn topic(&self, name: &str) -> Option<Arc<Topic>> {
        self.read().topics.get(name).cloned()
    }

    fn topic_or_create(&self, name: &str) -> Arc<Topic> {
        if let Some(topic) = self.topic(name) {
            return topic;
        }

        let mut guard = self.write();
        Arc::clone(
            guard
                .topics
                .entry(name.to_string())
                .or_insert_with(|| Arc::new(Topic::new(name))),
        )
    }

    /// Subscribe to `topic` with the hub's default capacity.
    pub fn subscribe(&self, topic: &str) -> Subscription {
        self.subscribe_with_capacity(topic, self.config.default_capacity)
    }

    /// Subscribe to `topic` with a buffer of `capacity` events.
    pub fn subscribe_with_capacity(&self, topic: &str, capacity: usize) -> Subscription {
        self.topic_or_create(topic).subscribe(capacity)
    }

    /// Remove `subscription` from `topic`, closing its channel.
    ///
    /// With `None`, every listener of the topic is closed. Unknown topics and
    /// subscriptions are ignored.
    pub fn unsubscribe(&self, topic: &str, subscription: Option<&Subscription>) {
        let Some(t) = self.topic(topic) else {
            return;
        };
        match subscription {
            Some(sub) => {
                t.unsubscribe(sub.id());
            }
            None => {
                t.close_all();
            }
        }
    }

    /// Publish `args` on `topic`, blocking until every subscriber accepted the
    /// event or `ctx` fires.
    pub fn emit(
        &self,
        ctx: &Context,
        topic: &str,
        args: impl IntoIterator<Item = Value>,
    ) -> BusResult<Delivery> {
        let Some(t) = self.topic(topic) else {
            return Err(no_such_topic(topic));
        };
        let event = Arc::new(Event::new(topic, args).with_context(ctx.clone()));
        t.broadcast(ctx, &event)
    }

    /// [`Hub::emit`] bounded by `timeout` instead of a caller context.
    pub fn emit_timeout(
        &self,
        timeout: Duration,
        topic: &str,
        args: impl IntoIterator<Item = Value>,
    ) -> BusResult<Delivery> {
        self.emit(&Context::with_timeout(timeout), topic, args)
    }

    /// Publish a prebuilt event on its own topic without copying it.
    pub fn emit_event(&self, ctx: &Context, event: impl Into<Arc<Event>>) -> BusResult<Delivery> {
        let event = event.into();
        let Some(t) = self.topic(event.topic()) else {
            return Err(no_such_topic(event.topic()));
        };
        t.broadcast(ctx, &event)
    }

    /// [`Hub::emit_event`] bounded by `timeout`.
    pub fn emit_event_timeout(
        &self,
        timeout: Duration,
        event: impl Into<Arc<Event>>,
    ) -> BusResult<Delivery> {
        self.emit_event(&Context::with_timeout(timeout), event)
    }

    /// Get the trigger registered under `name`, creating it if needed.
    ///
    /// A trigger that was closed is replaced by a fresh one.
    pub fn trigger(&self, name: &str) -> BusResult<Arc<Trigger>> {
        if let Some(trigger) = self.read().triggers.get(name) {
            if !trigger.is_closed() {
                return Ok(Arc::clone(trigger));
            }
        }

        let mut guard = self.write();
        if let Some(trigger) = guard.triggers.get(name) {
            if !trigger.is_closed() {
                return Ok(Arc::clone(trigger));
            }
        }

        let trigger = Arc::new(Trigger::with_options(name, self.config.trigger_capacity)?);
        guard.triggers.insert(name.to_string(), Arc::clone(&trigger));
        Ok(trigger)
    }

    /// Push the trigger registered under `name`; a no-op if there is none.
    pub fn push(&self, name: &str) {
        let trigger = self.read().triggers.get(name).cloned();
        if let Some(trigger) = trigger {
            trigger.push();
        }
    }

    /// Number of registered topic names.
    #[must_use]
    pub fn topic_count(&self) -> usize {
        self.read().topics.len()
    }

    /// Number of registered trigger names.
    #[must_use]
    pub fn trigger_count(&self) -> usize {
        self.read().triggers.len()
    }

    /// Close every topic and trigger and forget all names.
    ///
    /// Every trigger is closed even if one fails; the first failure is returned.
    pub fn close(&self) -> BusResult<()> {
        let registry = std::mem::take(&mut *self.write());

        for topic in registry.topics.values() {
            topic.close_all();
        }

        let mut first_err: Option<BusError> = None;
        for trigger in registry.triggers.values() {
            if let Err(e) = trigger.close() {
                first_err.get_or_insert(e);
            }
        }

        debug!(
            topics = registry.topics.len(),
            triggers = registry.triggers.len(),
            "hub closed"
        );
        first_err.map_or(Ok(()), Err)
    }

    fn read(&self) -> RwLockReadGuard<'_, Registry> {
        self.registry.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Registry> {
        self.registry.write().unwrap_or_else(PoisonError::into_inner)
    }
}

fn no_such_topic(topic: &str) -> BusError {
    DispatchError::NoSuchTopic {
        topic: topic.to_string(),
    }
    .into()
}

#[cfg(test)]
mod tests {
    use std::thread;

    use serde_json::json;

    use super::*;

    #[test]
    fn test_emit_delivers_to_subscriber() {
        let hub = Hub::new();
        let sub = hub.subscribe("t1");

        let delivery = hub.emit(&Context::background(), "t1", vec![json!("hello")]).unwrap();
        assert_eq!(delivery.delivered, 1);

        let ev = sub.recv().unwrap();
        assert_eq!(ev.topic(), "t1");
        assert_eq!(ev.args(), &[json!("hello")]);
    }

    #[test]
    fn test_emit_unknown_topic() {
        let hub = Hub::new();
        let err = hub.emit(&Context::background(), "missing", Vec::new()).unwrap_err();
        assert!(err.is_no_such_topic());
        assert_eq!(hub.topic_count(), 0);
    }

    #[test]
    fn test_closed_topic_stays_known() {
        let hub = Hub::new();
        let sub = hub.subscribe("t");
        hub.unsubscribe("t", None);
        assert!(sub.recv().is_err());

        let delivery = hub.emit(&Context::background(), "t", vec![json!(1)]).unwrap();
        assert_eq!(delivery, Delivery::default());

        let again = hub.subscribe("t");
        hub.emit(&Context::background(), "t", vec![json!(2)]).unwrap();
        assert_eq!(again.recv().unwrap().args(), &[json!(2)]);
    }

    #[test]
    fn test_unsubscribe_single() {
        let hub = Hub::new();
        let a = hub.subscribe("t");
        let b = hub.subscribe("t");

        hub.unsubscribe("t", Some(&a));
        hub.unsubscribe("t", Some(&a));
        hub.unsubscribe("other", Some(&a));

        hub.emit(&Context::background(), "t", vec![json!("x")]).unwrap();
        assert!(a.recv().is_err());
        assert!(b.try_recv().is_some());
    }

    #[test]
    fn test_concurrent_first_subscribers_share_topic() {
        let hub = Arc::new(Hub::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let hub = Arc::clone(&hub);
                thread::spawn(move || hub.subscribe("shared"))
            })
            .collect();
        let subs: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert_eq!(hub.topic_count(), 1);
        assert_eq!(hub.topic("shared").unwrap().listener_count(), subs.len());
    }

    #[test]
    fn test_config_capacity_applies() {
        let hub = Hub::with_config(HubConfig {
            default_capacity: 3,
            trigger_capacity: 2,
        });
        assert_eq!(hub.subscribe("t").capacity(), 3);
        assert_eq!(hub.trigger("wake").unwrap().listen().capacity(), 2);
    }

    #[test]
    fn test_trigger_is_shared_by_name() {
        let hub = Hub::new();
        let a = hub.trigger("wake").unwrap();
        let b = hub.trigger("wake").unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(hub.trigger_count(), 1);
    }

    #[test]
    fn test_closed_trigger_is_replaced() {
        let hub = Hub::new();
        let old = hub.trigger("wake").unwrap();
        old.close().unwrap();

        let fresh = hub.trigger("wake").unwrap();
        assert!(!Arc::ptr_eq(&old, &fresh));
        assert!(!fresh.is_closed());
    }

    #[test]
    fn test_push_unknown_trigger_is_noop() {
        let hub = Hub::new();
        hub.push("nobody");
        assert_eq!(hub.trigger_count(), 0);
    }

    #[test]
    fn test_close_tears_down_everything() {
        let hub = Hub::new();
        let sub = hub.subscribe("t");
        let listener = hub.trigger("wake").unwrap().listen();

        hub.close().unwrap();

        assert!(sub.recv().is_err());
        assert!(!listener.recv());
        assert_eq!(hub.topic_count(), 0);
        assert_eq!(hub.trigger_count(), 0);
        assert!(hub.emit(&Context::background(), "t", Vec::new()).unwrap_err().is_no_such_topic());
    }

    #[test]
    fn test_trigger_name_may_contain_any_bytes() {
        let hub = Hub::new();
        let trig = hub.trigger("cache\0reload").unwrap();
        let listener = trig.listen();

        hub.push("cache\0reload");
        assert!(listener.recv_timeout(Duration::from_secs(1)));
        assert_eq!(hub.trigger_count(), 1);
    }

    #[test]
    fn test_global_is_singleton() {
        assert!(std::ptr::eq(Hub::global(), Hub::global()));
    }
}
