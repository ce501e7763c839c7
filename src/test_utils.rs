//! Shared test utilities for rageblock.
//!
//! This module provides common setup functions used across test modules.

#![cfg(test)]

use crate::clock::Clock;
use crate::store::SqliteStore;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use tempfile::{tempdir, TempDir};

/// 2023-11-14T22:13:20Z, a fixed "now" for deterministic tests.
pub const TEST_NOW: i64 = 1_700_000_000_000;

/// Create a temporary on-disk store with migrations applied.
///
/// Returns a tuple of (SqliteStore, TempDir). The TempDir must be kept alive
/// for the duration of the test to prevent the database file from being deleted.
pub fn setup_test_store() -> (SqliteStore, TempDir) {
    let dir = tempdir().expect("Failed to create temp directory for test DB");
    let db_path = dir.path().join("test.db");
    let store = SqliteStore::open(&db_path).expect("Failed to open test store");
    (store, dir)
}

/// Clock that only moves when told to.
#[derive(Debug, Clone)]
pub struct ManualClock(Arc<AtomicI64>);

impl ManualClock {
    pub fn new(now: i64) -> Self {
        Self(Arc::new(AtomicI64::new(now)))
    }

    pub fn advance_ms(&self, ms: i64) {
        self.0.fetch_add(ms, Ordering::SeqCst);
    }

    pub fn set(&self, now: i64) {
        self.0.store(now, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> i64 {
        self.0.load(Ordering::SeqCst)
    }
}
