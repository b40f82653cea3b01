//! Symbol tables: `{id, value TEXT UNIQUE}` deduplication of repeated values

use crate::schema::quote_ident;
use crate::value::sniff_json;
use crate::{Error, Result};
use rusqlite::{Connection, OptionalExtension as _};
use serde_json::Value;

/// Id of `text` in `table`, inserting it if absent.
///
/// Select first; on a miss, insert-or-ignore then select again, so equal
/// texts always resolve to the same id.
pub fn get_or_insert_symbol(conn: &Connection, table: &str, text: &str) -> Result<i64> {
    let select = format!("SELECT id FROM {} WHERE value = ?1", quote_ident(table));

    if let Some(id) = find_symbol(conn, &select, text)? {
        return Ok(id);
    }

    conn.prepare_cached(&format!(
        "INSERT OR IGNORE INTO {} (value) VALUES (?1)",
        quote_ident(table)
    ))?
    .execute([text])?;

    find_symbol(conn, &select, text)?.ok_or_else(|| Error::SymbolUnresolved {
        table: table.to_string(),
    })
}

fn find_symbol(conn: &Connection, select: &str, text: &str) -> Result<Option<i64>> {
    let id = conn
        .prepare_cached(select)?
        .query_row([text], |row| row.get(0))
        .optional()?;
    Ok(id)
}

/// Stored value for symbol `id`, re-parsed when it looks like JSON
pub fn resolve_symbol(conn: &Connection, table: &str, id: i64) -> Result<Option<Value>> {
    let text: Option<String> = conn
        .prepare_cached(&format!(
            "SELECT value FROM {} WHERE id = ?1",
            quote_ident(table)
        ))?
        .query_row([id], |row| row.get(0))
        .optional()?;
    Ok(text.map(sniff_json))
}
