//! Connection and handle-caching layer between Loam's document store
//! and its transactional key-value backend.
//!
//! This crate owns three things:
//!
//! 1. A concurrent cache of per-database descriptors
//!    ([`db_cache::DatabaseCache`]), keyed by database name and kept
//!    consistent under racing writers by an optimistic
//!    version-comparison protocol instead of locks.
//! 2. Discovery and validation of the backend cluster file
//!    ([`cluster_file`]) across custom overrides and platform-specific
//!    default locations.
//! 3. A long-lived reactor ([`reactor::Reactor`]) that holds the single
//!    process-wide backend connection, translates live configuration
//!    into transaction tuning options, re-applies them when
//!    configuration changes at runtime, and re-arms its own
//!    configuration subscription after a failure.
//!
//! The backend itself stays opaque behind the [`backend::Backend`] and
//! [`backend::Connection`] traits; [`backend::MemoryBackend`] provides
//! the injectable in-memory implementation used by tests and embedded
//! deployments.

pub mod backend;
pub mod cluster_file;
pub mod config;
pub mod db_cache;
pub mod error;
pub mod options;
pub mod reactor;

pub use backend::Backend;
pub use backend::Connection;
pub use backend::MemoryBackend;
pub use backend::MemoryConnection;
pub use cluster_file::Candidate;
pub use cluster_file::CandidateKind;
pub use cluster_file::find_cluster_file;
pub use config::ConfigEvent;
pub use config::ConfigStore;
pub use db_cache::CachedDatabase;
pub use db_cache::DatabaseCache;
pub use db_cache::DatabaseState;
pub use error::BackendError;
pub use error::ClusterFileError;
pub use error::OptionValueError;
pub use options::OptionValue;
pub use options::TRANSACTION_OPTIONS;
pub use reactor::Reactor;
pub use reactor::SharedConnection;
