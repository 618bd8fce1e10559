//! Event records published to topics.
//!
//! An [`Event`] is immutable once built. Subscribers share one `Arc<Event>` per
//! publish; the only mutable part is the cache of encoded arguments, which is
//! internally synchronized so each `(index, key)` pair is encoded at most once.

use std::collections::HashMap;
use std::fmt::Display;
use std::sync::{Arc, Mutex, OnceLock, PoisonError};

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;

use crate::context::Context;
use crate::error::{BusResult, EventError};

/// Result of encoding one argument, shared between readers.
pub type EncodedArg = Result<Arc<[u8]>, EventError>;

type EncodedSlot = Arc<OnceLock<EncodedArg>>;

/// An event published on a topic.
#[derive(Debug)]
pub struct Event {
    topic: String,
    args: Vec<Value>,
    context: Context,
    created_at: DateTime<Utc>,
    encoded: Mutex<HashMap<(usize, String), EncodedSlot>>,
}

impl Event {
    /// Build an event for `topic` carrying `args`.
    #[must_use]
    pub fn new(topic: impl Into<String>, args: impl IntoIterator<Item = Value>) -> Self {
        Self {
            topic: topic.into(),
            args: args.into_iter().collect(),
            context: Context::background(),
            created_at: Utc::now(),
            encoded: Mutex::new(HashMap::new()),
        }
    }

    /// Attach the origin context subscribers can inspect.
    #[must_use]
    pub fn with_context(mut self, context: Context) -> Self {
        self.context = context;
        self
    }

    /// The topic this event was published on.
    #[must_use]
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// All arguments, in publish order.
    #[must_use]
    pub fn args(&self) -> &[Value] {
        &self.args
    }

    /// The origin context attached by the publisher.
    #[must_use]
    pub const fn context(&self) -> &Context {
        &self.context
    }

    /// When the event was built.
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// The argument at `index`, or `None` when out of range.
    #[must_use]
    pub fn arg(&self, index: usize) -> Option<&Value> {
        self.args.get(index)
    }

    /// Convert the argument at `index` into `T`.
    ///
    /// String arguments that do not deserialize as `T` directly are parsed as
    /// JSON text, so `"42"` converts to an integer.
    pub fn arg_as<T: DeserializeOwned>(&self, index: usize) -> BusResult<T> {
        let value = self.arg(index).ok_or(EventError::InvalidArgIndex {
            index,
            len: self.args.len(),
        })?;

        match T::deserialize(value) {
            Ok(v) => Ok(v),
            Err(direct) => {
                if let Value::String(text) = value {
                    if let Ok(v) = serde_json::from_str::<T>(text.trim()) {
                        return Ok(v);
                    }
                }
                Err(EventError::ArgConversion {
                    index,
                    message: direct.to_string(),
                }
                .into())
            }
        }
    }

    /// Encode the argument at `index` with `encoder`, caching under `key`.
    ///
    /// The encoder runs at most once per `(index, key)` for the lifetime of the
    /// event, even when several subscribers ask concurrently. Encoder failures
    /// are cached too and returned verbatim on repeat.
    pub fn encoded_arg<F, E>(&self, index: usize, key: &str, encoder: F) -> EncodedArg
    where
        F: FnOnce(&Value) -> Result<Vec<u8>, E>,
        E: Display,
    {
        let Some(value) = self.arg(index) else {
            return Err(EventError::InvalidArgIndex {
                index,
                len: self.args.len(),
            });
        };

        let slot = {
            let mut cache = self.encoded.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(cache.entry((index, key.to_string())).or_default())
        };

        slot.get_or_init(|| {
            encoder(value).map(Arc::from).map_err(|e| EventError::Encoding {
                index,
                key: key.to_string(),
                message: e.to_string(),
            })
        })
        .clone()
    }

    /// Shorthand for [`Event::encoded_arg`] with `serde_json` under the `"json"` key.
    pub fn json_arg(&self, index: usize) -> EncodedArg {
        self.encoded_arg(index, "json", |v| serde_json::to_vec(v))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    use serde_json::json;

    use super::*;
    use crate::error::BusError;

    #[test]
    fn test_event_fields() {
        let ev = Event::new("test-topic", vec![json!(1), json!(2), json!(3)]);
        assert_eq!(ev.topic(), "test-topic");
        assert_eq!(ev.args().len(), 3);
        assert!(!ev.context().is_done());
    }

    #[test]
    fn test_arg_out_of_bounds() {
        let ev = Event::new("t", vec![json!("only one")]);
        assert!(ev.arg(5).is_none());

        let empty = Event::new("t", Vec::new());
        assert!(empty.arg(0).is_none());
    }

    #[test]
    fn test_arg_as_converts() {
        let ev = Event::new("t", vec![json!("42"), json!("hello"), json!({"count": 3})]);

        let n: i64 = ev.arg_as(0).unwrap();
        assert_eq!(n, 42);

        let s: String = ev.arg_as(1).unwrap();
        assert_eq!(s, "hello");

        let m: HashMap<String, u32> = ev.arg_as(2).unwrap();
        assert_eq!(m["count"], 3);
    }

    #[test]
    fn test_arg_as_errors() {
        let ev = Event::new("t", vec![json!("not a number")]);

        let err = ev.arg_as::<u32>(0).unwrap_err();
        assert!(matches!(err, BusError::Event(EventError::ArgConversion { index: 0, .. })));

        let err = ev.arg_as::<u32>(3).unwrap_err();
        assert_eq!(err, BusError::Event(EventError::InvalidArgIndex { index: 3, len: 1 }));
    }

    #[test]
    fn test_json_arg() {
        let ev = Event::new("t", vec![json!("first"), json!("second")]);
        assert_eq!(&*ev.json_arg(0).unwrap(), br#""first""#);
        assert_eq!(&*ev.json_arg(1).unwrap(), br#""second""#);
    }

    #[test]
    fn test_encoded_arg_caches_per_key() {
        let ev = Event::new("t", vec![json!({"count": 42})]);
        let calls = AtomicUsize::new(0);
        let encoder = |v: &Value| {
            calls.fetch_add(1, Ordering::SeqCst);
            serde_json::to_vec(v)
        };

        let first = ev.encoded_arg(0, "json", encoder).unwrap();
        let second = ev.encoded_arg(0, "json", encoder).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(first, second);

        let custom = ev
            .encoded_arg(0, "custom", |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok::<_, serde_json::Error>(b"custom".to_vec())
            })
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(&*custom, b"custom");
    }

    #[test]
    fn test_encoded_arg_invalid_index() {
        let ev = Event::new("t", vec![json!("only one")]);
        let err = ev.json_arg(5).unwrap_err();
        assert_eq!(err, EventError::InvalidArgIndex { index: 5, len: 1 });
    }

    #[test]
    fn test_encoded_arg_caches_errors() {
        let ev = Event::new("t", vec![json!("test")]);
        let calls = AtomicUsize::new(0);
        let failing = |_: &Value| {
            calls.fetch_add(1, Ordering::SeqCst);
            Err::<Vec<u8>, _>("encoder error")
        };

        let err1 = ev.encoded_arg(0, "failing", failing).unwrap_err();
        let err2 = ev.encoded_arg(0, "failing", failing).unwrap_err();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(err1, err2);
        assert!(matches!(err1, EventError::Encoding { ref message, .. } if message == "encoder error"));
    }

    #[test]
    fn test_encoded_arg_concurrent_readers_encode_once() {
        let ev = Arc::new(Event::new("t", vec![json!([1, 2, 3])]));
        let calls = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let ev = Arc::clone(&ev);
                let calls = Arc::clone(&calls);
                thread::spawn(move || {
                    ev.encoded_arg(0, "json", |v| {
                        calls.fetch_add(1, Ordering::SeqCst);
                        thread::sleep(std::time::Duration::from_millis(5));
                        serde_json::to_vec(v)
                    })
                    .unwrap()
                })
            })
            .collect();

        for h in handles {
            assert_eq!(&*h.join().unwrap(), b"[1,2,3]");
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
