use rusqlite::{params, Connection};

use crate::db::DatabaseError;

/// Get a stored value by key. Returns None if not set.
pub fn get_value(conn: &Connection, key: &str) -> Result<Option<String>, DatabaseError> {
    let mut stmt = conn.prepare("SELECT value FROM kv_store WHERE key = ?1")?;
    match stmt.query_row([key], |row| row.get::<_, String>(0)) {
        Ok(val) => Ok(Some(val)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(DatabaseError::from(e)),
    }
}

/// Set a value (upsert).
pub fn set_value(conn: &Connection, key: &str, value: &str) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO kv_store (key, value, updated_at)
         VALUES (?1, ?2, datetime('now'))
         ON CONFLICT(key) DO UPDATE SET value = ?2, updated_at = datetime('now')",
        params![key, value],
    )?;
    Ok(())
}

/// Write several values in one transaction so readers never observe
/// a half-saved state.
pub fn set_values(conn: &mut Connection, entries: &[(&str, &str)]) -> Result<(), DatabaseError> {
    let tx = conn.transaction()?;
    for (key, value) in entries {
        tx.execute(
            "INSERT INTO kv_store (key, value, updated_at)
             VALUES (?1, ?2, datetime('now'))
             ON CONFLICT(key) DO UPDATE SET value = ?2, updated_at = datetime('now')",
            params![key, value],
        )?;
    }
    tx.commit()?;
    Ok(())
}
