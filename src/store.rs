//! Opening and creating the SQLite store

use crate::Result;
use rusqlite::{Connection, OpenFlags};
use std::path::Path;
use tracing::info;

/// Replace any database at `path` with a fresh one built from `ddl`
pub fn create_database(path: impl AsRef<Path>, ddl: &str) -> Result<Connection> {
    let path = path.as_ref();
    match std::fs::remove_file(path) {
        Ok(()) => info!(path = %path.display(), "removed existing database"),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
        Err(err) => return Err(err.into()),
    }

    let conn = Connection::open(path)?;
    conn.execute_batch(ddl)?;
    Ok(conn)
}

/// Open an existing database; it is never created implicitly
pub fn open_database(path: impl AsRef<Path>, read_only: bool) -> Result<Connection> {
    let mode = if read_only {
        OpenFlags::SQLITE_OPEN_READ_ONLY
    } else {
        OpenFlags::SQLITE_OPEN_READ_WRITE
    };
    let conn = Connection::open_with_flags(
        path,
        mode | OpenFlags::SQLITE_OPEN_URI | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )?;
    Ok(conn)
}
