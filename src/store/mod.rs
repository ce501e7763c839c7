//! Flat key-value storage shared by every part of the blocker.
//!
//! Values are JSON, keyed by the names in [`crate::constants`]. Individual
//! operations are serialized by the backend; there are no cross-key
//! transactions beyond a single [`KeyValueStore::set_many`] call.

pub mod memory;
pub mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use crate::error::{AppError, AppResult};
use log::warn;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::sync::{Arc, Mutex, MutexGuard};

/// One key's transition, delivered to subscribers after a write.
#[derive(Debug, Clone, PartialEq)]
pub struct StorageChange {
    pub key: String,
    pub old_value: Option<Value>,
    pub new_value: Option<Value>,
}

pub type ChangeListener = Arc<dyn Fn(&[StorageChange]) + Send + Sync>;

pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> AppResult<Option<Value>>;

    /// Write several keys in one operation, then notify subscribers.
    fn set_many(&self, entries: Vec<(String, Value)>) -> AppResult<()>;

    fn remove(&self, key: &str) -> AppResult<()>;

    fn clear(&self) -> AppResult<()>;

    fn subscribe(&self, listener: ChangeListener);
}

/// Read `key`, falling back to `default` when it is absent or null.
pub fn get_or<T, S>(store: &S, key: &str, default: T) -> AppResult<T>
where
    T: DeserializeOwned,
    S: KeyValueStore + ?Sized,
{
    match store.get(key)? {
        None | Some(Value::Null) => Ok(default),
        Some(value) => Ok(serde_json::from_value(value)?),
    }
}

/// Serialize and write a single key.
pub fn set<T, S>(store: &S, key: &str, value: &T) -> AppResult<()>
where
    T: Serialize + ?Sized,
    S: KeyValueStore + ?Sized,
{
    store.set_many(vec![(key.to_string(), serde_json::to_value(value)?)])
}

/// Subscriber registry shared by the store backends.
#[derive(Default)]
pub(crate) struct Listeners {
    inner: Mutex<Vec<ChangeListener>>,
}

impl Listeners {
    fn lock(&self) -> MutexGuard<'_, Vec<ChangeListener>> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                warn!("Store listener mutex was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    pub(crate) fn add(&self, listener: ChangeListener) {
        self.lock().push(listener);
    }

    /// Invoke every listener. Listeners run outside the registry lock so a
    /// listener may itself write to the store.
    pub(crate) fn notify(&self, changes: &[StorageChange]) {
        if changes.is_empty() {
            return;
        }
        let listeners: Vec<ChangeListener> = self.lock().iter().map(Arc::clone).collect();
        for listener in listeners {
            listener(changes);
        }
    }
}

pub(crate) fn lock_or_poisoned<T>(mutex: &Mutex<T>) -> AppResult<MutexGuard<'_, T>> {
    mutex.lock().map_err(|_| AppError::LockPoisoned)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_get_or_uses_default_when_absent() {
        let store = MemoryStore::new();
        let sites: Vec<String> = get_or(&store, "blockedSites", vec!["a.com".into()]).unwrap();
        assert_eq!(sites, vec!["a.com".to_string()]);
    }

    #[test]
    fn test_get_or_uses_default_for_null() {
        let store = MemoryStore::new();
        store
            .set_many(vec![("lastReflection".into(), Value::Null)])
            .unwrap();
        let last: i64 = get_or(&store, "lastReflection", 0).unwrap();
        assert_eq!(last, 0);
    }

    #[test]
    fn test_get_or_reports_type_mismatch() {
        let store = MemoryStore::new();
        store
            .set_many(vec![("lastReflection".into(), json!("yesterday"))])
            .unwrap();
        let result: AppResult<i64> = get_or(&store, "lastReflection", 0);
        assert!(matches!(result, Err(AppError::Serialization(_))));
    }

    #[test]
    fn test_set_then_get_through_trait_object() {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        set(store.as_ref(), "allowedSites", &["propublica.org"]).unwrap();
        let allowed: Vec<String> = get_or(store.as_ref(), "allowedSites", Vec::new()).unwrap();
        assert_eq!(allowed, vec!["propublica.org".to_string()]);
    }
}
