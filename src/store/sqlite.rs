use super::{ChangeListener, KeyValueStore, Listeners, StorageChange};
use crate::db::{migrations, Database};
use crate::error::AppResult;
use log::{debug, warn};
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

/// Key-value store persisted in the `kv` table of a SQLite database.
pub struct SqliteStore {
    db: Arc<Mutex<Database>>,
    listeners: Listeners,
}

impl SqliteStore {
    /// Open (or create) the database at `path` and apply migrations.
    pub fn open(path: &Path) -> AppResult<Self> {
        let db = Database::open(path)?;
        migrations::run(db.connection())?;
        Ok(Self::new(Arc::new(Mutex::new(db))))
    }

    /// Wrap an already-migrated database.
    pub fn new(db: Arc<Mutex<Database>>) -> Self {
        Self {
            db,
            listeners: Listeners::default(),
        }
    }

    fn lock_db(&self) -> MutexGuard<'_, Database> {
        match self.db.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                warn!("SqliteStore: database mutex was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }
}

fn read_value(conn: &Connection, key: &str) -> AppResult<Option<Value>> {
    let raw: Option<String> = conn
        .query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| {
            row.get(0)
        })
        .optional()?;

    match raw {
        Some(text) => Ok(Some(serde_json::from_str(&text)?)),
        None => Ok(None),
    }
}

impl KeyValueStore for SqliteStore {
    fn get(&self, key: &str) -> AppResult<Option<Value>> {
        let db = self.lock_db();
        read_value(db.connection(), key)
    }

    fn set_many(&self, entries: Vec<(String, Value)>) -> AppResult<()> {
        let changes = {
            let db = self.lock_db();
            let tx = db.connection().unchecked_transaction()?;
            let mut changes = Vec::with_capacity(entries.len());

            for (key, value) in entries {
                let old_value = read_value(&tx, &key)?;
                tx.execute(
                    "INSERT INTO kv (key, value) VALUES (?1, ?2)
                     ON CONFLICT(key) DO UPDATE SET value = excluded.value",
                    params![key, serde_json::to_string(&value)?],
                )?;
                changes.push(StorageChange {
                    key,
                    old_value,
                    new_value: Some(value),
                });
            }

            tx.commit()?;
            changes
        };

        debug!("Stored {} key(s)", changes.len());
        self.listeners.notify(&changes);
        Ok(())
    }

    fn remove(&self, key: &str) -> AppResult<()> {
        let old_value = {
            let db = self.lock_db();
            let conn = db.connection();
            let old_value = read_value(conn, key)?;
            conn.execute("DELETE FROM kv WHERE key = ?1", params![key])?;
            old_value
        };

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
        let changes = {
            let db = self.lock_db();
            let conn = db.connection();
            let tx = conn.unchecked_transaction()?;

            let existing: Vec<(String, String)> = {
                let mut stmt = tx.prepare("SELECT key, value FROM kv")?;
                let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
                rows.collect::<rusqlite::Result<_>>()?
            };
            tx.execute("DELETE FROM kv", [])?;
            tx.commit()?;

            existing
                .into_iter()
                .map(|(key, text)| -> AppResult<StorageChange> {
                    Ok(StorageChange {
                        key,
                        old_value: Some(serde_json::from_str(&text)?),
                        new_value: None,
                    })
                })
                .collect::<AppResult<Vec<_>>>()?
        };

        self.listeners.notify(&changes);
        Ok(())
    }

    fn subscribe(&self, listener: ChangeListener) {
        self.listeners.add(listener);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::get_or;
    use crate::test_utils::setup_test_store;
    use serde_json::json;

    #[test]
    fn test_open_seeds_default_lists() {
        let (store, _dir) = setup_test_store();
        let blocked: Vec<String> = get_or(&store, "blockedSites", Vec::new()).unwrap();
        assert!(blocked.contains(&"reddit.com".to_string()));
        let allowed: Vec<String> = get_or(&store, "allowedSites", vec!["x".into()]).unwrap();
        assert!(allowed.is_empty());
    }

    #[test]
    fn test_set_many_overwrites_and_notifies() {
        let (store, _dir) = setup_test_store();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        store.subscribe(Arc::new(move |changes: &[StorageChange]| {
            sink.lock().unwrap().extend_from_slice(changes);
        }));

        store
            .set_many(vec![
                ("tempUnblocks".into(), json!({"reddit.com": 10})),
                ("blockedSites".into(), json!(["cnn.com"])),
            ])
            .unwrap();

        assert_eq!(
            store.get("tempUnblocks").unwrap(),
            Some(json!({"reddit.com": 10}))
        );
        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].old_value, None);
        assert!(seen[1].old_value.is_some());
    }

    #[test]
    fn test_values_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.db");
        {
            let store = SqliteStore::open(&path).unwrap();
            store
                .set_many(vec![("lastReflection".into(), json!(1234))])
                .unwrap();
        }

        let store = SqliteStore::open(&path).unwrap();
        let last: i64 = get_or(&store, "lastReflection", 0).unwrap();
        assert_eq!(last, 1234);
    }

    #[test]
    fn test_remove_and_clear() {
        let (store, _dir) = setup_test_store();
        store.remove("allowedSites").unwrap();
        assert!(store.get("allowedSites").unwrap().is_none());

        store.clear().unwrap();
        assert!(store.get("blockedSites").unwrap().is_none());
    }
}
