//! Live configuration store with change subscriptions.
//!
//! Holds sectioned key/value configuration supplied by the operator and
//! fans out change events to subscribers over a broadcast channel. The
//! connection reactor subscribes to the transaction-option section only;
//! other components read values directly.
//!
//! # Design Notes
//!
//! - Reads are lock-free through the concurrent table; writes touch a
//!   single shard and then broadcast
//! - Subscriptions are section-scoped: a subscriber never sees events
//!   for sections it did not ask for
//! - `reset_subscriptions` replaces the broadcast sender wholesale,
//!   closing every live subscription; subscribers are expected to
//!   re-subscribe (the reactor does so after a fixed delay)

use std::sync::Mutex;

use dashmap::DashMap;
use tokio::sync::broadcast;
use tracing::warn;

use loam_constants::CONFIG_BROADCAST_BUFFER_SIZE;

/// Section carrying backend connection settings (cluster file path,
/// directory prefix).
pub const SECTION_BACKEND: &str = "backend";

/// Section carrying transaction tuning-option overrides. The reactor's
/// change subscription is scoped to this section.
pub const SECTION_TX_OPTIONS: &str = "backend_tx_options";

/// Section carrying document-layer settings (safety limits, feature
/// flags).
pub const SECTION_LOAM: &str = "loam";

/// A configuration change observed by a subscriber.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigEvent {
    /// A key was set or overwritten.
    Set {
        /// Section the key lives in.
        section: String,
        /// The changed key.
        key: String,
        /// The new textual value.
        value: String,
    },
    /// A key was deleted.
    Deleted {
        /// Section the key lived in.
        section: String,
        /// The deleted key.
        key: String,
    },
}

impl ConfigEvent {
    /// Section this event belongs to.
    pub fn section(&self) -> &str {
        match self {
            ConfigEvent::Set { section, .. } => section,
            ConfigEvent::Deleted { section, .. } => section,
        }
    }
}

/// Sectioned key/value configuration with change notifications.
#[derive(Debug)]
pub struct ConfigStore {
    entries: DashMap<(String, String), String>,
    // Replaced wholesale by reset_subscriptions; the lock is held only
    // long enough to clone or swap the sender, never across an await.
    sender: Mutex<broadcast::Sender<ConfigEvent>>,
}

impl ConfigStore {
    /// Create an empty store.
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CONFIG_BROADCAST_BUFFER_SIZE);
        Self {
            entries: DashMap::new(),
            sender: Mutex::new(sender),
        }
    }

    /// Look up a raw textual value.
    pub fn get(&self, section: &str, key: &str) -> Option<String> {
        self.entries.get(&(section.to_string(), key.to_string())).map(|entry| entry.value().clone())
    }

    /// Look up an integer value.
    ///
    /// A present but unparseable value is logged and treated as unset.
    pub fn get_int(&self, section: &str, key: &str) -> Option<i64> {
        let raw = self.get(section, key)?;
        match raw.trim().parse::<i64>() {
            Ok(v) => Some(v),
            Err(_) => {
                warn!(section, key, value = %raw, "ignoring non-integer config value");
                None
            }
        }
    }

    /// Look up a boolean value (`true`/`false`, case-insensitive).
    ///
    /// A present but unparseable value is logged and treated as unset.
    pub fn get_bool(&self, section: &str, key: &str) -> Option<bool> {
        let raw = self.get(section, key)?;
        match raw.trim().to_ascii_lowercase().as_str() {
            "true" => Some(true),
            "false" => Some(false),
            _ => {
                warn!(section, key, value = %raw, "ignoring non-boolean config value");
                None
            }
        }
    }

    /// All key/value pairs currently set in a section.
    pub fn section(&self, section: &str) -> Vec<(String, String)> {
        self.entries
            .iter()
            .filter(|entry| entry.key().0 == section)
            .map(|entry| (entry.key().1.clone(), entry.value().clone()))
            .collect()
    }

    /// Set a key, overwriting any previous value, and notify
    /// subscribers of the section.
    pub fn set(&self, section: &str, key: &str, value: &str) {
        self.entries.insert((section.to_string(), key.to_string()), value.to_string());
        self.publish(ConfigEvent::Set {
            section: section.to_string(),
            key: key.to_string(),
            value: value.to_string(),
        });
    }

    /// Delete a key and notify subscribers of the section. Deleting an
    /// absent key is a no-op and publishes nothing.
    pub fn delete(&self, section: &str, key: &str) {
        let removed = self.entries.remove(&(section.to_string(), key.to_string()));
        if removed.is_some() {
            self.publish(ConfigEvent::Deleted {
                section: section.to_string(),
                key: key.to_string(),
            });
        }
    }

    /// Subscribe to change events scoped to one section.
    pub fn subscribe(&self, section: &str) -> ConfigSubscription {
        let rx = self.sender.lock().expect("config sender lock poisoned").subscribe();
        ConfigSubscription {
            section: section.to_string(),
            rx,
        }
    }

    /// Drop every live subscription by replacing the broadcast sender.
    ///
    /// Used when configuration is reloaded wholesale: subscribers
    /// observe a closed channel and must re-subscribe to keep receiving
    /// events. Values already in the store are unaffected.
    pub fn reset_subscriptions(&self) {
        let (sender, _) = broadcast::channel(CONFIG_BROADCAST_BUFFER_SIZE);
        *self.sender.lock().expect("config sender lock poisoned") = sender;
    }

    fn publish(&self, event: ConfigEvent) {
        // A send error only means there are no live subscribers.
        let _ = self.sender.lock().expect("config sender lock poisoned").send(event);
    }
}

impl Default for ConfigStore {
    fn default() -> Self {
        Self::new()
    }
}

/// A section-scoped subscription to configuration changes.
#[derive(Debug)]
pub struct ConfigSubscription {
    section: String,
    rx: broadcast::Receiver<ConfigEvent>,
}

impl ConfigSubscription {
    /// Receive the next event for the subscribed section, skipping
    /// events for other sections.
    ///
    /// # Errors
    ///
    /// Returns [`broadcast::error::RecvError::Closed`] when the store's
    /// sender was replaced (see [`ConfigStore::reset_subscriptions`]),
    /// or `Lagged` when this subscriber fell too far behind. Either way
    /// the subscription is no longer trustworthy and the caller should
    /// re-subscribe.
    pub async fn recv(&mut self) -> Result<ConfigEvent, broadcast::error::RecvError> {
        loop {
            let event = self.rx.recv().await?;
            if event.section() == self.section {
                return Ok(event);
            }
        }
    }
}

/// Whether the optional secondary admin listener is enabled.
///
/// The listener itself lives outside this layer; only the flag plumbing
/// belongs here. Defaults to off.
pub fn admin_listener_enabled(config: &ConfigStore) -> bool {
    config.get_bool(SECTION_LOAM, "enable_admin_listener").unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_returns_what_set_stored() {
        let config = ConfigStore::new();
        config.set(SECTION_BACKEND, "cluster_file", "/tmp/kv.cluster");
        assert_eq!(config.get(SECTION_BACKEND, "cluster_file").as_deref(), Some("/tmp/kv.cluster"));
        assert_eq!(config.get(SECTION_BACKEND, "missing"), None);
    }

    #[test]
    fn get_int_ignores_garbage() {
        let config = ConfigStore::new();
        config.set(SECTION_LOAM, "max_document_size", "not-a-number");
        assert_eq!(config.get_int(SECTION_LOAM, "max_document_size"), None);

        config.set(SECTION_LOAM, "max_document_size", "123456");
        assert_eq!(config.get_int(SECTION_LOAM, "max_document_size"), Some(123_456));
    }

    #[test]
    fn section_lists_only_its_own_keys() {
        let config = ConfigStore::new();
        config.set(SECTION_TX_OPTIONS, "timeout", "5000");
        config.set(SECTION_TX_OPTIONS, "retry_limit", "20");
        config.set(SECTION_BACKEND, "cluster_file", "/x");

        let mut keys: Vec<String> = config.section(SECTION_TX_OPTIONS).into_iter().map(|(k, _)| k).collect();
        keys.sort();
        assert_eq!(keys, vec!["retry_limit".to_string(), "timeout".to_string()]);
    }

    #[tokio::test]
    async fn subscription_is_section_scoped() {
        let config = ConfigStore::new();
        let mut sub = config.subscribe(SECTION_TX_OPTIONS);

        config.set(SECTION_BACKEND, "cluster_file", "/x");
        config.set(SECTION_TX_OPTIONS, "timeout", "5000");

        let event = sub.recv().await.expect("subscription live");
        assert_eq!(event, ConfigEvent::Set {
            section: SECTION_TX_OPTIONS.to_string(),
            key: "timeout".to_string(),
            value: "5000".to_string(),
        });
    }

    #[tokio::test]
    async fn delete_of_absent_key_publishes_nothing() {
        let config = ConfigStore::new();
        let mut sub = config.subscribe(SECTION_TX_OPTIONS);

        config.delete(SECTION_TX_OPTIONS, "timeout");
        config.set(SECTION_TX_OPTIONS, "retry_limit", "5");

        // The first event observed is the set, not a spurious delete.
        let event = sub.recv().await.expect("subscription live");
        assert!(matches!(event, ConfigEvent::Set { ref key, .. } if key == "retry_limit"));
    }

    #[tokio::test]
    async fn reset_subscriptions_closes_live_receivers() {
        let config = ConfigStore::new();
        let mut sub = config.subscribe(SECTION_TX_OPTIONS);

        config.reset_subscriptions();
        let err = sub.recv().await.expect_err("subscription should be closed");
        assert!(matches!(err, broadcast::error::RecvError::Closed));

        // A fresh subscription against the replaced sender works.
        let mut sub = config.subscribe(SECTION_TX_OPTIONS);
        config.set(SECTION_TX_OPTIONS, "timeout", "1000");
        assert!(sub.recv().await.is_ok());
    }

    #[test]
    fn admin_listener_flag_defaults_off() {
        let config = ConfigStore::new();
        assert!(!admin_listener_enabled(&config));
        config.set(SECTION_LOAM, "enable_admin_listener", "true");
        assert!(admin_listener_enabled(&config));
    }
}
