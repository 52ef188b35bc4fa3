//! The connection reactor: single owner of the process-wide backend
//! connection.
//!
//! At startup the reactor resolves the cluster file, opens the
//! connection, applies the tuning-option catalogue, publishes the
//! resulting shared state, and initializes the database cache. From
//! then on it reacts to configuration changes in the tuning-option
//! section: a changed value is applied live to the existing connection;
//! a deleted key forces a full reconnect (the prior default cannot be
//! reconstructed generically, so the connection is rebuilt from scratch
//! with defaults plus the remaining live configuration). A lost
//! subscription is re-armed after a fixed short delay.
//!
//! # Architecture
//!
//! ```text
//! ConfigStore (backend_tx_options section)
//!          |
//!          v
//!   reactor task ──(publish)──> ArcSwap<SharedConnection> <──(load)── readers
//!          |
//!          └──(init)──> DatabaseCache <──(store/fetch)── consumers
//! ```
//!
//! Readers never block: the published slot is swapped atomically on
//! reconnect, and holders of a superseded handle release it in their
//! own time. The reactor processes one event at a time, so no two
//! reconnects or option applications ever run concurrently.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::OnceLock;
use std::time::Duration;

use anyhow::Context;
use arc_swap::ArcSwapOption;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::error;
use tracing::info;
use tracing::warn;

use loam_constants::MAX_ATTACHMENT_SIZE;
use loam_constants::MAX_BINARY_CHUNK_SIZE;
use loam_constants::MAX_DOCUMENT_ID_LENGTH;
use loam_constants::MAX_DOCUMENT_SIZE;
use loam_constants::RESUBSCRIBE_DELAY_MS;

use crate::backend::Backend;
use crate::backend::Connection;
use crate::cluster_file::find_cluster_file;
use crate::config::ConfigEvent;
use crate::config::ConfigStore;
use crate::config::ConfigSubscription;
use crate::config::SECTION_BACKEND;
use crate::config::SECTION_LOAM;
use crate::config::SECTION_TX_OPTIONS;
use crate::db_cache::DatabaseCache;
use crate::options;
use crate::options::OptionValue;

/// Configured safety limits checked against their compiled ceilings at
/// startup. A violation is an operator warning, never a startup
/// failure.
const SAFETY_LIMITS: &[(&str, u64)] = &[
    ("max_document_size", MAX_DOCUMENT_SIZE),
    ("max_attachment_size", MAX_ATTACHMENT_SIZE),
    ("max_document_id_length", MAX_DOCUMENT_ID_LENGTH),
    ("binary_chunk_size", MAX_BINARY_CHUNK_SIZE),
];

// First reactor started in the process owns the free-function
// accessors. Later reactors (tests) stay instance-scoped.
static PROCESS_SHARED: OnceLock<Arc<ArcSwapOption<SharedConnection>>> = OnceLock::new();
static PROCESS_CACHE: OnceLock<Arc<DatabaseCache>> = OnceLock::new();

/// The published, read-mostly connection state.
///
/// Replaced wholesale on reconnect, never mutated in place. Readers may
/// hold the loaded `Arc` as their own memoized copy; the pointee is
/// immutable.
#[derive(Debug)]
pub struct SharedConnection {
    /// The live backend connection.
    pub connection: Arc<dyn Connection>,
    /// Identity of the connected cluster.
    pub cluster_id: String,
    /// Key-space prefix all of this deployment's data lives under.
    pub directory_prefix: Option<String>,
    /// The retry limit currently applied to backend transactions.
    pub retry_limit: Option<i64>,
}

/// Handle to a running connection reactor.
pub struct Reactor {
    cache: Arc<DatabaseCache>,
    shared: Arc<ArcSwapOption<SharedConnection>>,
    cancel: CancellationToken,
}

impl Reactor {
    /// Start the reactor: resolve the cluster file (when the backend
    /// needs one), open and tune the connection, publish shared state,
    /// initialize the database cache, verify configured safety limits,
    /// and spawn the event loop. Must be called from within a tokio
    /// runtime.
    ///
    /// # Errors
    ///
    /// Fails when no cluster file is resolvable or the backend cannot
    /// connect. There is no degraded mode without a connection.
    pub fn start(backend: Arc<dyn Backend>, config: Arc<ConfigStore>) -> anyhow::Result<Reactor> {
        let shared = Arc::new(ArcSwapOption::empty());
        let cancel = CancellationToken::new();
        let mut task = ReactorTask {
            backend,
            config: config.clone(),
            shared: shared.clone(),
            applied: HashMap::new(),
            cancel: cancel.clone(),
        };
        task.open().context("opening initial backend connection")?;

        let cache = Arc::new(DatabaseCache::new());
        let _ = PROCESS_SHARED.set(shared.clone());
        let _ = PROCESS_CACHE.set(cache.clone());

        check_safety_limits(&config);

        // Subscribe before spawning so no change between startup and
        // the first poll of the loop is missed.
        let subscription = config.subscribe(SECTION_TX_OPTIONS);
        tokio::spawn(task.run(subscription));

        Ok(Reactor { cache, shared, cancel })
    }

    /// The database cache initialized by this reactor.
    pub fn cache(&self) -> Arc<DatabaseCache> {
        self.cache.clone()
    }

    /// The currently published shared state.
    pub fn shared(&self) -> Arc<SharedConnection> {
        self.shared.load_full().expect("reactor started but no connection published")
    }

    /// The currently published connection handle.
    pub fn connection(&self) -> Arc<dyn Connection> {
        self.shared().connection.clone()
    }

    /// Stop the event loop. Readers keep whatever handle they already
    /// loaded; the published state stays in place.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }
}

/// The currently published process-wide shared state.
///
/// # Panics
///
/// Panics when called before any reactor has started in this process.
/// That is a usage error, not a runtime condition.
pub fn shared() -> Arc<SharedConnection> {
    PROCESS_SHARED
        .get()
        .and_then(|slot| slot.load_full())
        .expect("backend connection layer not started: no reactor has published a connection")
}

/// The process-wide backend connection handle.
///
/// # Panics
///
/// Panics when called before any reactor has started in this process.
pub fn connection() -> Arc<dyn Connection> {
    shared().connection.clone()
}

/// Identity of the connected cluster.
///
/// # Panics
///
/// Panics when called before any reactor has started in this process.
pub fn cluster_id() -> String {
    shared().cluster_id.clone()
}

/// Key-space prefix all of this deployment's data lives under.
///
/// # Panics
///
/// Panics when called before any reactor has started in this process.
pub fn directory_prefix() -> Option<String> {
    shared().directory_prefix.clone()
}

/// The retry limit currently applied to backend transactions.
///
/// # Panics
///
/// Panics when called before any reactor has started in this process.
pub fn retry_limit() -> Option<i64> {
    shared().retry_limit
}

/// The process-wide database cache.
///
/// # Panics
///
/// Panics when called before any reactor has started in this process.
pub fn database_cache() -> Arc<DatabaseCache> {
    PROCESS_CACHE
        .get()
        .cloned()
        .expect("backend connection layer not started: no reactor has initialized the cache")
}

struct ReactorTask {
    backend: Arc<dyn Backend>,
    config: Arc<ConfigStore>,
    shared: Arc<ArcSwapOption<SharedConnection>>,
    applied: HashMap<&'static str, OptionValue>,
    cancel: CancellationToken,
}

impl ReactorTask {
    async fn run(mut self, mut subscription: ConfigSubscription) {
        info!("connection reactor started");
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    info!("connection reactor stopped");
                    return;
                }
                event = subscription.recv() => match event {
                    Ok(ConfigEvent::Set { key, value, .. }) => self.apply_live(&key, &value),
                    Ok(ConfigEvent::Deleted { key, .. }) => self.reopen_for_deleted(&key),
                    Err(err) => {
                        warn!(
                            %err,
                            delay_ms = RESUBSCRIBE_DELAY_MS,
                            "configuration subscription lost; re-arming after delay"
                        );
                        sleep(Duration::from_millis(RESUBSCRIBE_DELAY_MS)).await;
                        subscription = self.config.subscribe(SECTION_TX_OPTIONS);
                        info!("configuration subscription re-armed");
                    }
                }
            }
        }
    }

    /// Apply one changed option to the existing connection, without
    /// reconnecting. Validation failures and backend rejections are
    /// absorbed inside the option layer.
    fn apply_live(&mut self, key: &str, value: &str) {
        let Some(opt) = options::lookup(key) else {
            warn!(option = key, "change for unknown transaction option ignored");
            return;
        };
        let Some(current) = self.shared.load_full() else {
            return;
        };
        if let Some(applied) = options::apply_raw(current.connection.as_ref(), opt, value) {
            self.applied.insert(opt.name, applied);
            // retry_limit is part of the published state; republish so
            // readers see the new value.
            if opt.name == "retry_limit" {
                self.publish(current.connection.clone());
            }
        }
    }

    /// A deleted tuning option cannot be rolled back to its prior value
    /// generically, so discard the handle and open a fresh connection
    /// with defaults plus the remaining live configuration.
    fn reopen_for_deleted(&mut self, key: &str) {
        info!(option = key, "transaction option deleted; reopening backend connection");
        if let Err(err) = self.open() {
            // Keep serving with the previous handle rather than leaving
            // the process without a connection.
            error!(%err, "failed to reopen backend connection; previous handle stays published");
        }
    }

    /// Resolve (freshly; candidate locations are never cached), open,
    /// tune, and publish a connection. Used at startup and on every
    /// full reconnect.
    fn open(&mut self) -> anyhow::Result<()> {
        let cluster_file = if self.backend.needs_cluster_file() {
            Some(find_cluster_file(&self.config)?)
        } else {
            None
        };
        let previous = self.shared.load_full().map(|shared| shared.connection.id());
        let (connection, applied) =
            options::open_connection(self.backend.as_ref(), cluster_file.as_deref(), &self.config)?;
        self.applied = applied;
        self.publish(connection.clone());
        match previous {
            Some(old_id) => info!(
                old_connection = %old_id,
                new_connection = %connection.id(),
                "backend connection replaced"
            ),
            None => info!(
                connection = %connection.id(),
                cluster = %connection.cluster_id(),
                "backend connection established"
            ),
        }
        Ok(())
    }

    fn publish(&self, connection: Arc<dyn Connection>) {
        let retry_limit = match self.applied.get("retry_limit") {
            Some(OptionValue::Int(limit)) => Some(*limit),
            _ => None,
        };
        self.shared.store(Some(Arc::new(SharedConnection {
            cluster_id: connection.cluster_id(),
            directory_prefix: self.config.get(SECTION_BACKEND, "directory_prefix"),
            retry_limit,
            connection,
        })));
    }
}

/// Warn for every configured safety limit above its compiled ceiling.
/// The backend cannot honor such a value; startup proceeds regardless.
fn check_safety_limits(config: &ConfigStore) {
    for (key, ceiling) in SAFETY_LIMITS {
        let Some(configured) = config.get_int(SECTION_LOAM, key) else {
            continue;
        };
        if configured.is_negative() || configured as u64 > *ceiling {
            warn!(
                limit = *key,
                configured,
                ceiling = *ceiling,
                "configured safety limit exceeds its compiled ceiling and will not be honored"
            );
        }
    }
}
