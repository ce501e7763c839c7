use super::{lock_or_poisoned, ChangeListener, KeyValueStore, Listeners, StorageChange};
use crate::error::AppResult;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Mutex;

/// In-process store with the same semantics as the on-disk one.
#[derive(Default)]
pub struct MemoryStore {
    data: Mutex<HashMap<String, Value>>,
    listeners: Listeners,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> AppResult<Option<Value>> {
        Ok(lock_or_poisoned(&self.data)?.get(key).cloned())
    }

    fn set_many(&self, entries: Vec<(String, Value)>) -> AppResult<()> {
        let changes: Vec<StorageChange> = {
            let mut data = lock_or_poisoned(&self.data)?;
            entries
                .into_iter()
                .map(|(key, value)| {
                    let old_value = data.insert(key.clone(), value.clone());
                    StorageChange {
                        key,
                        old_value,
                        new_value: Some(value),
                    }
                })
                .collect()
        };
        self.listeners.notify(&changes);
        Ok(())
    }

    fn remove(&self, key: &str) -> AppResult<()> {
        let old_value = lock_or_poisoned(&self.data)?.remove(key);
        if old_value.is_some() {
            self.listeners.notify(&[StorageChange {
                key: key.to_string(),
                old_value,
                new_value: None,
            }]);
        }
        Ok(())
    }

    fn clear(&self) -> AppResult<()> {
        let changes: Vec<StorageChange> = lock_or_poisoned(&self.data)?
            .drain()
            .map(|(key, old_value)| StorageChange {
                key,
                old_value: Some(old_value),
                new_value: None,
            })
            .collect();
        self.listeners.notify(&changes);
        Ok(())
    }

    fn subscribe(&self, listener: ChangeListener) {
        self.listeners.add(listener);
    }
}
