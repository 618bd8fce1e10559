//! Hub configuration.

use serde::{Deserialize, Serialize};

use crate::trigger::DEFAULT_TRIGGER_CAPACITY;

/// Default buffer capacity of topic subscriptions.
pub const DEFAULT_SUBSCRIPTION_CAPACITY: usize = 1;

/// Per-hub settings.
///
/// A capacity of zero is allowed and makes the channel a rendezvous: a
/// publish then waits until the subscriber is actively receiving.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HubConfig {
    /// Buffer capacity for `Hub::subscribe`.
    pub default_capacity: usize,
    /// Default listener capacity for triggers created by the hub.
    pub trigger_capacity: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            default_capacity: DEFAULT_SUBSCRIPTION_CAPACITY,
            trigger_capacity: DEFAULT_TRIGGER_CAPACITY,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = HubConfig::default();
        assert_eq!(cfg.default_capacity, 1);
        assert_eq!(cfg.trigger_capacity, 1);
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let cfg: HubConfig = serde_json::from_str(r#"{"default_capacity": 16}"#).unwrap();
        assert_eq!(cfg.default_capacity, 16);
        assert_eq!(cfg.trigger_capacity, DEFAULT_TRIGGER_CAPACITY);
    }
}
