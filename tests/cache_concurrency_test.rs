//! Concurrency tests for the database descriptor cache.
//!
//! The cache must stay consistent under true parallelism: racing
//! writers on the same key are ordered by the version-comparison
//! protocol, never by arrival time.

use std::sync::Arc;
use std::sync::Barrier;
use std::thread;

use serde_json::json;
use uuid::Uuid;

use loam::db_cache::DatabaseCache;
use loam::db_cache::DatabaseState;

fn state(name: &str, uuid: Uuid, md_version: u64, marker: &str) -> DatabaseState {
    DatabaseState {
        name: name.to_string(),
        uuid,
        md_version,
        metadata: json!({ "marker": marker }),
        user_ctx: None,
        tx: None,
        interactive: false,
    }
}

/// Writer A stores version 10 while writer B concurrently attempts to
/// publish version 9. Whatever the interleaving, B loses and the cache
/// ends at version 10 with A's payload.
#[test]
fn concurrent_publish_race_keeps_the_newer_version() {
    let uuid = Uuid::new_v4();

    for _ in 0..200 {
        let cache = Arc::new(DatabaseCache::new());
        let barrier = Arc::new(Barrier::new(2));

        let a = {
            let cache = cache.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                barrier.wait();
                cache.store(&state("db1", uuid, 10, "p1"));
            })
        };
        let b = {
            let cache = cache.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                barrier.wait();
                cache.maybe_update(&state("db1", uuid, 9, "p2"))
            })
        };

        a.join().expect("writer A");
        let b_won = b.join().expect("writer B");
        assert!(!b_won, "the stale writer must lose the race");

        let cached = cache.fetch("db1", None).expect("entry cached");
        assert_eq!(cached.md_version, 10);
        assert_eq!(cached.metadata, json!({ "marker": "p1" }));
    }
}

/// Many parallel writers racing over the same key converge on the
/// maximum version regardless of scheduling.
#[test]
fn parallel_writers_converge_on_the_maximum_version() {
    let uuid = Uuid::new_v4();
    let cache = Arc::new(DatabaseCache::new());
    cache.store(&state("db1", uuid, 0, "seed"));

    let writers = 8;
    let barrier = Arc::new(Barrier::new(writers));
    let handles: Vec<_> = (0..writers)
        .map(|writer| {
            let cache = cache.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                barrier.wait();
                // Each writer walks its own version ladder; the ladders
                // interleave arbitrarily across threads.
                for step in 0..50u64 {
                    let version = step * writers as u64 + writer as u64;
                    cache.maybe_update(&state("db1", uuid, version, "w"));
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().expect("writer thread");
    }

    let max_version = 49 * writers as u64 + (writers as u64 - 1);
    let cached = cache.fetch("db1", None).expect("entry cached");
    assert_eq!(cached.md_version, max_version);
}

/// Operations on different keys never interfere with each other.
#[test]
fn unrelated_keys_do_not_contend() {
    let cache = Arc::new(DatabaseCache::new());
    let handles: Vec<_> = (0..8)
        .map(|key| {
            let cache = cache.clone();
            thread::spawn(move || {
                let uuid = Uuid::new_v4();
                let name = format!("db{key}");
                for version in 0..100u64 {
                    cache.store(&state(&name, uuid, version, "x"));
                }
                (name, uuid)
            })
        })
        .collect();

    for handle in handles {
        let (name, uuid) = handle.join().expect("writer thread");
        let cached = cache.fetch(&name, Some(&uuid)).expect("entry cached");
        assert_eq!(cached.md_version, 99);
    }
    assert_eq!(cache.len(), 8);
}

/// A recreated database (same name, new uuid) is never served from the
/// previous incarnation's entry, even while writers race.
#[test]
fn uuid_isolation_holds_under_concurrent_stores() {
    let cache = Arc::new(DatabaseCache::new());
    let old_incarnation = Uuid::new_v4();
    let new_incarnation = Uuid::new_v4();

    cache.store(&state("db1", old_incarnation, 50, "old"));

    let reader = {
        let cache = cache.clone();
        thread::spawn(move || {
            for _ in 0..1000 {
                if let Some(cached) = cache.fetch("db1", Some(&new_incarnation)) {
                    assert_eq!(cached.uuid, new_incarnation, "served a stale incarnation");
                }
            }
        })
    };
    let writer = {
        let cache = cache.clone();
        thread::spawn(move || {
            for version in 0..1000u64 {
                cache.store(&state("db1", old_incarnation, version, "old"));
            }
        })
    };

    reader.join().expect("reader thread");
    writer.join().expect("writer thread");
}
