//! Concurrent, name-keyed cache of database descriptors.
//!
//! Safe for many simultaneous readers and occasional racing writers
//! without a mutual-exclusion lock: every comparison is a single atomic
//! check-and-act against the shard that owns the key, so there is no
//! read-then-write window. Same-key races are resolved by comparing
//! metadata versions at write time: a writer whose snapshot is older
//! than the stored entry always loses, deterministically, regardless of
//! wall-clock arrival order.
//!
//! A failed conditional update or removal is a normal outcome of losing
//! a race and is reported as a boolean, never an error.

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

/// A caller-side snapshot of an open database handle.
///
/// Carries the per-call fields (in-flight transaction reference, user
/// context, interactivity flag) that are stripped before the snapshot
/// is cached; they belong to one call site, not to the database.
#[derive(Debug, Clone)]
pub struct DatabaseState {
    /// Database name; the cache key.
    pub name: String,
    /// Database identity, immutable for the database's lifetime. A
    /// database recreated under the same name gets a new uuid.
    pub uuid: Uuid,
    /// Version token of the global metadata state this snapshot was
    /// built against. Monotonically comparable.
    pub md_version: u64,
    /// Cacheable descriptor metadata (layer prefixes, security mode,
    /// revision limits); opaque to this layer.
    pub metadata: Value,
    /// User context of the call that built this snapshot. Stripped.
    pub user_ctx: Option<Value>,
    /// In-flight transaction this snapshot was taken inside, if any.
    /// Stripped.
    pub tx: Option<Uuid>,
    /// Whether the snapshot was built for an interactive request.
    /// Stripped.
    pub interactive: bool,
}

impl DatabaseState {
    /// The cacheable projection of this snapshot, with per-call fields
    /// stripped.
    pub fn sanitized(&self) -> CachedDatabase {
        CachedDatabase {
            name: self.name.clone(),
            uuid: self.uuid,
            md_version: self.md_version,
            metadata: self.metadata.clone(),
        }
    }
}

/// A cached, sanitized database descriptor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedDatabase {
    /// Database name; the cache key.
    pub name: String,
    /// Database identity at snapshot time.
    pub uuid: Uuid,
    /// Metadata version the snapshot was built against.
    pub md_version: u64,
    /// Sanitized descriptor metadata.
    pub metadata: Value,
}

impl CachedDatabase {
    /// Whether `candidate` is allowed to replace or evict this entry:
    /// same database incarnation, and the stored version is not newer.
    /// Equal versions pass, so an idempotent republish wins.
    fn superseded_by(&self, candidate: &DatabaseState) -> bool {
        self.uuid == candidate.uuid && self.md_version <= candidate.md_version
    }
}

/// Concurrent mapping from database name to its cached descriptor.
///
/// At most one entry per name. An entry's version only ever moves
/// forward (or stays, on an equal-version republish), enforced by the
/// conditional operations, not by locking.
#[derive(Debug, Default)]
pub struct DatabaseCache {
    entries: DashMap<String, CachedDatabase>,
}

impl DatabaseCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    /// Fetch the cached descriptor for `name`.
    ///
    /// With `expected_uuid`, an entry belonging to a different
    /// incarnation of the database is reported as a miss: the caller
    /// must never be served a descriptor from a previous database that
    /// happened to share the name. A miss never says why.
    pub fn fetch(&self, name: &str, expected_uuid: Option<&Uuid>) -> Option<CachedDatabase> {
        let entry = self.entries.get(name)?;
        if let Some(uuid) = expected_uuid {
            if entry.uuid != *uuid {
                return None;
            }
        }
        Some(entry.value().clone())
    }

    /// Cache a freshly opened or refreshed snapshot.
    ///
    /// Inserts unconditionally when nothing is cached under the name;
    /// otherwise behaves like [`maybe_update`](Self::maybe_update), so
    /// a racing writer that already published a newer view is never
    /// overwritten. Always succeeds from the caller's perspective.
    pub fn store(&self, state: &DatabaseState) {
        match self.entries.entry(state.name.clone()) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().superseded_by(state) {
                    occupied.insert(state.sanitized());
                }
            }
            Entry::Vacant(vacant) => {
                vacant.insert(state.sanitized());
            }
        }
    }

    /// Publish a possibly-stale snapshot, if it is still current.
    ///
    /// Replaces the stored entry iff one exists with the same name and
    /// uuid and its version is not newer than the candidate's. Equal
    /// versions succeed (idempotent republish). Returns whether the
    /// replacement happened; `false` means another writer already
    /// published an equal-or-newer view, or nothing was cached.
    pub fn maybe_update(&self, state: &DatabaseState) -> bool {
        match self.entries.entry(state.name.clone()) {
            Entry::Occupied(mut occupied) if occupied.get().superseded_by(state) => {
                occupied.insert(state.sanitized());
                true
            }
            _ => false,
        }
    }

    /// Evict the entry for a database known (at the candidate's
    /// version) to be deleted or recreated, refusing to evict a fresher
    /// entry that superseded the caller's knowledge.
    ///
    /// Returns whether the entry was removed.
    pub fn maybe_remove(&self, state: &DatabaseState) -> bool {
        self.entries.remove_if(&state.name, |_, cached| cached.superseded_by(state)).is_some()
    }

    /// Unconditionally drop the entry for `name`. Used when a database
    /// is definitively destroyed.
    pub fn remove(&self, name: &str) {
        self.entries.remove(name);
    }

    /// Number of cached descriptors.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
