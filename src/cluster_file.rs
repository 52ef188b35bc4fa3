//! Backend cluster-file resolution.
//!
//! Builds an ordered list of candidate locations (custom overrides
//! first, configuration before environment, then platform defaults)
//! and evaluates them strictly in order, stopping at the first usable
//! file.
//!
//! The policy is two-axis (candidate kind × error kind): custom
//! overrides are trusted and therefore strict, so any read error is
//! fatal and never silently skipped, while defaults degrade gracefully on
//! absence but stay strict on genuine permission denial at a file that
//! exists. A read-only file is usable, with the caveat that coordinator
//! changes to the live cluster will not be observable.
//!
//! Candidates are rebuilt on every resolution attempt (startup and each
//! reconnect); the list is never cached, because operators may edit
//! these files between attempts.

use std::fs::File;
use std::fs::OpenOptions;
use std::io;
use std::path::Path;
use std::path::PathBuf;

use tracing::info;
use tracing::warn;

use crate::config::ConfigStore;
use crate::config::SECTION_BACKEND;
use crate::error::ClusterFileError;

/// Environment variable overriding the cluster file location. Checked
/// after the configuration override and before platform defaults.
pub const CLUSTER_FILE_ENV: &str = "LOAM_CLUSTER_FILE";

/// Kind of a candidate location, driving its error policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandidateKind {
    /// Explicitly configured by the operator; trusted, strict.
    Custom,
    /// Platform default; advisory, lenient on absence.
    Default,
}

/// One place to look for the cluster file.
#[derive(Debug, Clone)]
pub struct Candidate {
    /// Kind of this candidate.
    pub kind: CandidateKind,
    /// Location to probe; `None` for an unset custom override, which
    /// is skipped.
    pub path: Option<PathBuf>,
}

impl Candidate {
    /// A custom override pointing at a path.
    pub fn custom(path: impl Into<PathBuf>) -> Self {
        Self {
            kind: CandidateKind::Custom,
            path: Some(path.into()),
        }
    }

    /// An unset custom override (config key or env var absent).
    pub fn unset_custom() -> Self {
        Self {
            kind: CandidateKind::Custom,
            path: None,
        }
    }

    /// A platform default location.
    pub fn default_location(path: impl Into<PathBuf>) -> Self {
        Self {
            kind: CandidateKind::Default,
            path: Some(path.into()),
        }
    }
}

/// Resolve the cluster file from configuration, environment, and
/// platform defaults.
///
/// # Errors
///
/// Fatal per the two-axis policy: an existing-but-inaccessible file, an
/// unreadable custom override, or an exhausted candidate list.
pub fn find_cluster_file(config: &ConfigStore) -> Result<PathBuf, ClusterFileError> {
    resolve(candidates(config))
}

/// Evaluate an explicit candidate list strictly in order, stopping at
/// the first success. Exposed so deployments with unusual layouts (and
/// tests) can supply their own candidates.
pub fn resolve(candidates: Vec<Candidate>) -> Result<PathBuf, ClusterFileError> {
    for candidate in candidates {
        let Some(path) = candidate.path else {
            continue;
        };
        match probe(&path) {
            Ok(Access::ReadWrite) => {
                info!(path = %path.display(), "cluster file resolved");
                return Ok(path);
            }
            Ok(Access::ReadOnly) => {
                warn!(
                    path = %path.display(),
                    "cluster file is read-only; coordinator changes to the live cluster will not be observable"
                );
                return Ok(path);
            }
            Err(err) if err.kind() == io::ErrorKind::PermissionDenied => {
                // The file exists but we hold no access at all. This is
                // an operator misconfiguration regardless of candidate
                // kind; later candidates are not consulted.
                return Err(ClusterFileError::Permissions { path });
            }
            Err(err) => match candidate.kind {
                CandidateKind::Custom => {
                    return Err(ClusterFileError::Unreadable { path, source: err });
                }
                CandidateKind::Default if err.kind() == io::ErrorKind::NotFound => {
                    info!(path = %path.display(), "no cluster file at default location");
                }
                CandidateKind::Default => {
                    warn!(path = %path.display(), %err, "skipping unreadable default cluster file location");
                }
            },
        }
    }
    Err(ClusterFileError::Missing)
}

/// Build the candidate list: configuration override, environment
/// override, then platform defaults, in that order.
fn candidates(config: &ConfigStore) -> Vec<Candidate> {
    let mut list = Vec::with_capacity(3);
    list.push(match config.get(SECTION_BACKEND, "cluster_file") {
        Some(path) => Candidate::custom(path),
        None => Candidate::unset_custom(),
    });
    list.push(match std::env::var_os(CLUSTER_FILE_ENV) {
        Some(path) => Candidate::custom(PathBuf::from(path)),
        None => Candidate::unset_custom(),
    });
    for path in default_locations() {
        list.push(Candidate::default_location(path));
    }
    list
}

fn default_locations() -> Vec<PathBuf> {
    if cfg!(target_os = "macos") {
        vec![PathBuf::from("/usr/local/etc/loam/kv.cluster")]
    } else if cfg!(windows) {
        vec![PathBuf::from(r"C:\ProgramData\loam\kv.cluster")]
    } else {
        vec![PathBuf::from("/etc/loam/kv.cluster")]
    }
}

enum Access {
    ReadWrite,
    ReadOnly,
}

/// Probe the access level we hold on a path. A missing file surfaces as
/// `NotFound` from the first open, since the write flag does not imply
/// create.
fn probe(path: &Path) -> io::Result<Access> {
    match OpenOptions::new().read(true).write(true).open(path) {
        Ok(_) => Ok(Access::ReadWrite),
        Err(err) if err.kind() == io::ErrorKind::PermissionDenied => match File::open(path) {
            Ok(_) => Ok(Access::ReadOnly),
            Err(err) => Err(err),
        },
        Err(err) => Err(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unset_custom_overrides_are_skipped() {
        let missing = PathBuf::from("/nonexistent/loam/kv.cluster");
        let result = resolve(vec![
            Candidate::unset_custom(),
            Candidate::unset_custom(),
            Candidate::default_location(missing),
        ]);
        assert!(matches!(result, Err(ClusterFileError::Missing)));
    }

    #[test]
    fn custom_not_found_is_fatal() {
        let dir = tempfile::tempdir().expect("tempdir");
        let readable = dir.path().join("kv.cluster");
        std::fs::write(&readable, "loam:abc123@127.0.0.1:4500").expect("write");

        // The readable default after it must not rescue the broken
        // custom override.
        let result = resolve(vec![
            Candidate::custom("/nonexistent/custom/kv.cluster"),
            Candidate::default_location(readable),
        ]);
        assert!(matches!(result, Err(ClusterFileError::Unreadable { .. })));
    }

    #[test]
    fn empty_candidate_list_reports_missing() {
        assert!(matches!(resolve(Vec::new()), Err(ClusterFileError::Missing)));
    }
}
