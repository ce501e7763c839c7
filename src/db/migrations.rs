use super::schema::SCHEMA;
use crate::constants::{DEFAULT_BLOCKED_SITES, KEY_ALLOWED_SITES, KEY_BLOCKED_SITES};
use rusqlite::{params, Connection, Result};

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(SCHEMA)?;
    seed_default_lists(conn)?;
    Ok(())
}

/// First-install defaults. Existing values are never overwritten, so an
/// update or restart keeps the user's lists.
fn seed_default_lists(conn: &Connection) -> Result<()> {
    let blocked = serde_json::to_string(DEFAULT_BLOCKED_SITES)
        .map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))?;

    conn.execute(
        "INSERT OR IGNORE INTO kv (key, value) VALUES (?1, ?2)",
        params![KEY_BLOCKED_SITES, blocked],
    )?;
    conn.execute(
        "INSERT OR IGNORE INTO kv (key, value) VALUES (?1, ?2)",
        params![KEY_ALLOWED_SITES, "[]"],
    )?;

    Ok(())
}
