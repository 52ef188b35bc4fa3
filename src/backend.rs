//! The opaque backend seam.
//!
//! The connection layer treats the transactional key-value backend as
//! an opaque, shareable handle with a small set of tunable options. The
//! real client library plugs in behind [`Backend`]; tests and embedded
//! deployments inject [`MemoryBackend`], which skips cluster-file
//! resolution entirely.
//!
//! A [`Connection`] is never mutated in place. When the reactor decides
//! a full reconnect is required it opens a brand-new connection and
//! publishes it wholesale; holders of the old handle release it in
//! their own time.

use std::collections::HashSet;
use std::fmt;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;

use uuid::Uuid;

use crate::error::BackendError;
use crate::options::OptionValue;

/// A live, shareable connection to the backend cluster.
///
/// Implementations must be safe to share across arbitrarily many
/// concurrent users; the connection layer only ever calls
/// [`set_option`](Connection::set_option) from the single-owner
/// reactor.
pub trait Connection: Send + Sync + fmt::Debug {
    /// Identity of this physical connection. A reconnect yields a new
    /// id; readers can compare ids to detect that a handle they hold
    /// has been superseded.
    fn id(&self) -> Uuid;

    /// Identity of the cluster this connection is attached to.
    fn cluster_id(&self) -> String;

    /// Apply one transaction tuning option.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::OptionRejected`] when the backend does
    /// not support the option. The caller logs and absorbs this;
    /// connection opening never fails because a knob could not be set.
    fn set_option(&self, name: &'static str, value: &OptionValue) -> Result<(), BackendError>;
}

/// Factory for backend connections.
pub trait Backend: Send + Sync {
    /// Whether connecting requires a resolved cluster file. The
    /// in-memory backend returns false, which makes the reactor skip
    /// cluster-file resolution.
    fn needs_cluster_file(&self) -> bool {
        true
    }

    /// Open a new connection.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::Connect`] when the cluster cannot be
    /// reached or the cluster file is required but absent.
    fn connect(&self, cluster_file: Option<&Path>) -> Result<Arc<dyn Connection>, BackendError>;
}

/// In-memory backend for tests and embedded use.
///
/// Every [`connect`](Backend::connect) call yields a fresh
/// [`MemoryConnection`] with a distinct id, so reconnects are
/// observable; the backend keeps a log of every connection it handed
/// out. Options named via [`rejecting`](MemoryBackend::rejecting) are
/// refused by the resulting connections, which exercises the
/// absorb-and-log path for unsupported options.
#[derive(Debug, Clone)]
pub struct MemoryBackend {
    cluster_id: String,
    rejected: HashSet<&'static str>,
    require_cluster_file: bool,
    opened: Arc<Mutex<Vec<Arc<MemoryConnection>>>>,
}

impl MemoryBackend {
    /// Backend with the default cluster identity, no rejected options.
    pub fn new() -> Self {
        Self {
            cluster_id: "memory".to_string(),
            rejected: HashSet::new(),
            require_cluster_file: false,
            opened: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Mark an option as unsupported by this backend's connections.
    pub fn rejecting(mut self, option: &'static str) -> Self {
        self.rejected.insert(option);
        self
    }

    /// Make this backend demand a cluster file like a real client
    /// library would, driving the locator end-to-end.
    pub fn requiring_cluster_file(mut self) -> Self {
        self.require_cluster_file = true;
        self
    }

    /// Every connection this backend has opened, oldest first.
    pub fn connections(&self) -> Vec<Arc<MemoryConnection>> {
        self.opened.lock().expect("connection log lock poisoned").clone()
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl Backend for MemoryBackend {
    fn needs_cluster_file(&self) -> bool {
        self.require_cluster_file
    }

    fn connect(&self, cluster_file: Option<&Path>) -> Result<Arc<dyn Connection>, BackendError> {
        if self.require_cluster_file && cluster_file.is_none() {
            return Err(BackendError::Connect {
                reason: "no cluster file provided".to_string(),
            });
        }
        let conn = Arc::new(MemoryConnection {
            id: Uuid::new_v4(),
            cluster_id: self.cluster_id.clone(),
            cluster_file: cluster_file.map(Path::to_path_buf),
            rejected: self.rejected.clone(),
            applied: Mutex::new(Vec::new()),
        });
        self.opened.lock().expect("connection log lock poisoned").push(conn.clone());
        Ok(conn)
    }
}

/// Connection produced by [`MemoryBackend`]. Records every applied
/// option so tests can assert on what actually reached the backend.
#[derive(Debug)]
pub struct MemoryConnection {
    id: Uuid,
    cluster_id: String,
    cluster_file: Option<PathBuf>,
    rejected: HashSet<&'static str>,
    applied: Mutex<Vec<(&'static str, OptionValue)>>,
}

impl MemoryConnection {
    /// Options applied to this connection, in application order.
    pub fn applied_options(&self) -> Vec<(&'static str, OptionValue)> {
        self.applied.lock().expect("applied options lock poisoned").clone()
    }

    /// The cluster file this connection was opened from, if any.
    pub fn cluster_file(&self) -> Option<PathBuf> {
        self.cluster_file.clone()
    }
}

impl Connection for MemoryConnection {
    fn id(&self) -> Uuid {
        self.id
    }

    fn cluster_id(&self) -> String {
        self.cluster_id.clone()
    }

    fn set_option(&self, name: &'static str, value: &OptionValue) -> Result<(), BackendError> {
        if self.rejected.contains(name) {
            return Err(BackendError::OptionRejected {
                name,
                reason: "unsupported by this backend".to_string(),
            });
        }
        self.applied.lock().expect("applied options lock poisoned").push((name, value.clone()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn each_connect_yields_a_distinct_connection() {
        let backend = MemoryBackend::new();
        let a = backend.connect(None).expect("connect");
        let b = backend.connect(None).expect("connect");
        assert_ne!(a.id(), b.id());
        assert_eq!(a.cluster_id(), b.cluster_id());
        assert_eq!(backend.connections().len(), 2);
    }

    #[test]
    fn rejected_options_surface_as_option_rejected() {
        let backend = MemoryBackend::new().rejecting("machine_id");
        let conn = backend.connect(None).expect("connect");

        let err = conn
            .set_option("machine_id", &OptionValue::Str("abc".to_string()))
            .expect_err("option should be rejected");
        assert!(matches!(err, BackendError::OptionRejected { name: "machine_id", .. }));

        conn.set_option("timeout", &OptionValue::Int(500)).expect("timeout accepted");
    }

    #[test]
    fn requiring_cluster_file_fails_without_one() {
        let backend = MemoryBackend::new().requiring_cluster_file();
        assert!(backend.needs_cluster_file());
        assert!(backend.connect(None).is_err());
    }
}
