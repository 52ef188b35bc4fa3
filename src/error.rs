//! Error types for the backend connection layer.
//!
//! Fatal startup conditions (no resolvable cluster file, an unreadable
//! custom override, a failed connect) get typed variants here. Degraded
//! outcomes such as a badly typed tuning option or an option the
//! backend rejects are logged and absorbed where they occur and never
//! propagate. Cache races are reported as booleans, not errors.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while resolving the backend cluster file.
///
/// All variants are fatal: there is no safe degraded mode for an
/// unresolved backend connection.
#[derive(Debug, Error)]
pub enum ClusterFileError {
    /// The file exists but is neither read-write nor read-only
    /// accessible. Never falls through to later candidates: an
    /// inaccessible file that exists is an operator problem, not
    /// something to silently skip.
    #[error("cluster file {path:?} exists but is not accessible")]
    Permissions {
        /// The inaccessible candidate path.
        path: PathBuf,
    },

    /// An explicitly configured override could not be read.
    #[error("cannot read cluster file {path:?}")]
    Unreadable {
        /// The custom candidate path that failed.
        path: PathBuf,
        /// The underlying filesystem error.
        #[source]
        source: io::Error,
    },

    /// Every candidate location was exhausted without success.
    #[error("cluster file missing: no candidate location could be resolved")]
    Missing,
}

/// Errors reported by a backend implementation.
#[derive(Debug, Error)]
pub enum BackendError {
    /// The backend could not establish a connection.
    #[error("failed to connect to backend cluster: {reason}")]
    Connect {
        /// Human-readable description of the failure.
        reason: String,
    },

    /// The backend refused a transaction option, e.g. because it is
    /// unsupported in the connected cluster version. Callers catch and
    /// log this; it never fails a connection open.
    #[error("backend rejected option {name}: {reason}")]
    OptionRejected {
        /// Name of the rejected option.
        name: &'static str,
        /// Human-readable description of the rejection.
        reason: String,
    },
}

/// Validation failures for tuning-option values.
///
/// Always recoverable: the offending option is logged and left
/// unapplied, and the connection proceeds without it.
#[derive(Debug, Error)]
pub enum OptionValueError {
    /// An integer-typed option received a value that does not parse.
    #[error("option {name} expects an integer, got {value:?}")]
    NotAnInteger {
        /// Name of the option.
        name: &'static str,
        /// The offending textual value.
        value: String,
    },

    /// A string-typed option received a value at or above the backend's
    /// 16-byte limit.
    #[error("option {name} value {value:?} is {len} bytes; backend limit is {limit}")]
    ValueTooLong {
        /// Name of the option.
        name: &'static str,
        /// The offending textual value.
        value: String,
        /// Encoded length of the offending value.
        len: usize,
        /// The backend's exclusive byte limit.
        limit: usize,
    },
}
