use crate::constants::{KEY_ALLOWED_SITES, KEY_BLOCKED_SITES, KEY_TEMP_UNBLOCKS};
use crate::error::AppResult;
use crate::models::TempUnblocks;
use crate::sites::default_blocked_sites;
use crate::store::{self, KeyValueStore, StorageChange};
use log::{debug, warn};
use serde::de::DeserializeOwned;
use serde_json::Value;

/// In-memory mirror of the keys the request path reads on every navigation.
///
/// Kept fresh by feeding it storage change notifications through
/// [`SiteCache::apply_changes`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiteCache {
    pub blocked_sites: Vec<String>,
    pub allowed_sites: Vec<String>,
    pub temp_unblocks: TempUnblocks,
}

impl Default for SiteCache {
    fn default() -> Self {
        Self {
            blocked_sites: default_blocked_sites(),
            allowed_sites: Vec::new(),
            temp_unblocks: TempUnblocks::new(),
        }
    }
}

/// Decode a changed value; a removed key falls back to `default`.
fn decode_or<T: DeserializeOwned>(key: &str, value: Option<&Value>, default: T) -> Option<T> {
    match value {
        None | Some(Value::Null) => Some(default),
        Some(value) => match serde_json::from_value(value.clone()) {
            Ok(decoded) => Some(decoded),
            Err(e) => {
                warn!("Ignoring malformed {key} update: {e}");
                None
            }
        },
    }
}

impl SiteCache {
    pub fn load<S: KeyValueStore + ?Sized>(store: &S) -> AppResult<Self> {
        Ok(Self {
            blocked_sites: store::get_or(store, KEY_BLOCKED_SITES, default_blocked_sites())?,
            allowed_sites: store::get_or(store, KEY_ALLOWED_SITES, Vec::new())?,
            temp_unblocks: store::get_or(store, KEY_TEMP_UNBLOCKS, TempUnblocks::new())?,
        })
    }

    /// Re-read everything from `store`. On failure the cache is unchanged.
    pub fn refresh<S: KeyValueStore + ?Sized>(&mut self, store: &S) -> AppResult<()> {
        *self = Self::load(store)?;
        Ok(())
    }

    /// Apply a batch of change notifications (last writer wins).
    pub fn apply_changes(&mut self, changes: &[StorageChange]) {
        for change in changes {
            let value = change.new_value.as_ref();
            match change.key.as_str() {
                KEY_BLOCKED_SITES => {
                    if let Some(sites) = decode_or(KEY_BLOCKED_SITES, value, default_blocked_sites()) {
                        self.blocked_sites = sites;
                    }
                }
                KEY_ALLOWED_SITES => {
                    if let Some(sites) = decode_or(KEY_ALLOWED_SITES, value, Vec::new()) {
                        self.allowed_sites = sites;
                    }
                }
                KEY_TEMP_UNBLOCKS => {
                    if let Some(map) = decode_or(KEY_TEMP_UNBLOCKS, value, TempUnblocks::new()) {
                        self.temp_unblocks = map;
                    }
                }
                other => debug!("Cache ignores change to {other}"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use serde_json::json;

    fn change(key: &str, new_value: Option<Value>) -> StorageChange {
        StorageChange {
            key: key.to_string(),
            old_value: None,
            new_value,
        }
    }

    #[test]
    fn test_load_empty_store_uses_defaults() {
        let cache = SiteCache::load(&MemoryStore::new()).unwrap();
        assert_eq!(cache, SiteCache::default());
    }

    #[test]
    fn test_apply_changes_updates_lists() {
        let mut cache = SiteCache::default();
        cache.apply_changes(&[
            change(KEY_BLOCKED_SITES, Some(json!(["cnn.com"]))),
            change(KEY_ALLOWED_SITES, Some(json!(["propublica.org"]))),
            change(KEY_TEMP_UNBLOCKS, Some(json!({"cnn.com": 99}))),
        ]);

        assert_eq!(cache.blocked_sites, vec!["cnn.com".to_string()]);
        assert_eq!(cache.allowed_sites, vec!["propublica.org".to_string()]);
        assert_eq!(cache.temp_unblocks.expiry("cnn.com"), Some(99));
    }

    #[test]
    fn test_apply_changes_removed_key_falls_back_to_default() {
        let mut cache = SiteCache::default();
        cache.apply_changes(&[change(KEY_TEMP_UNBLOCKS, Some(json!({"cnn.com": 99})))]);
        cache.apply_changes(&[change(KEY_TEMP_UNBLOCKS, None)]);
        assert!(cache.temp_unblocks.is_empty());
    }

    #[test]
    fn test_apply_changes_keeps_state_on_malformed_value() {
        let mut cache = SiteCache::default();
        cache.apply_changes(&[change(KEY_BLOCKED_SITES, Some(json!("not a list")))]);
        assert_eq!(cache.blocked_sites, default_blocked_sites());
    }

    #[test]
    fn test_apply_changes_ignores_unrelated_keys() {
        let mut cache = SiteCache::default();
        cache.apply_changes(&[change("bypassHistory", Some(json!([])))]);
        assert_eq!(cache, SiteCache::default());
    }

    #[test]
    fn test_refresh_reads_latest() {
        let store = MemoryStore::new();
        let mut cache = SiteCache::default();
        store::set(&store, KEY_BLOCKED_SITES, &["x.com"]).unwrap();

        cache.refresh(&store).unwrap();

        assert_eq!(cache.blocked_sites, vec!["x.com".to_string()]);
    }
}
