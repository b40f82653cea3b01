//! # Kiln - JSON <-> SQLite object-relational mapping
//!
//! Fires newline-delimited JSON into a normalized SQLite schema and
//! reconstructs the same JSON from it.
//!
//! ## Modules
//!
//! - **analyze**: Infer a relational schema from a sample of records
//! - **schema**: Schema model, table ordering and DDL text round-tripping
//! - **load**: Decompose records into parent/child and symbol rows
//! - **dump**: Rebuild nested records from rows
//!
//! ## Column conventions
//!
//! - `<field>_id REFERENCES <field>(id)` holds a nested object
//! - `<field>_symbol REFERENCES <field>_symbol(id)` holds a deduplicated value
//! - every other column is a direct field; arrays and objects are stored as
//!   canonical JSON text
//!
//! ## Quick Start
//!
//! ```rust
//! use kiln::{analyze_records, Dumper, LoadOptions, Loader, AnalyzeOptions};
//! use rusqlite::Connection;
//! use serde_json::json;
//!
//! # fn main() -> kiln::Result<()> {
//! let record = json!({"name": "Alice", "age": 30, "meta": {"city": "Wonderland"}});
//! let records = vec![record.as_object().unwrap().clone()];
//!
//! let analysis = analyze_records(&records, &AnalyzeOptions::default())?;
//! let conn = Connection::open_in_memory()?;
//! conn.execute_batch(&analysis.ddl())?;
//!
//! let loader = Loader::new(&analysis.schema, LoadOptions::default());
//! loader.insert_record(&conn, &records[0])?;
//!
//! let dumped = Dumper::new(&conn, &analysis.schema).records()?;
//! assert_eq!(dumped, records);
//! # Ok(())
//! # }
//! ```

use std::fs::File;
use std::io::{BufReader, Write};
use std::path::Path;
use tracing::info;

pub mod analyze;
pub mod dump;
pub mod error;
pub mod input;
pub mod load;
pub mod schema;
pub mod store;
pub mod symbol;
pub mod types;
pub mod value;

pub use analyze::{analyze_reader, analyze_records, Analysis, AnalyzeOptions};
pub use dump::Dumper;
pub use error::{Error, Result};
pub use load::{LoadOptions, LoadReport, Loader};
pub use schema::{parse_ddl, render_ddl, resolve_table_order};
pub use store::{create_database, open_database};
pub use types::{ColumnRole, DatabaseSchema, FieldType, IndexDef, TableSchema};

/// Infer a schema from the head of the file at `input`
pub fn analyze_path(input: impl AsRef<Path>, options: &AnalyzeOptions) -> Result<Analysis> {
    let reader = BufReader::new(File::open(input)?);
    let analysis = analyze_reader(reader, options)?;
    info!(
        sampled = analysis.sampled,
        tables = analysis.schema.tables.len(),
        symbols = analysis.symbol_fields.len(),
        "schema inferred"
    );
    Ok(analysis)
}

/// Load every record of `input` into the existing database at `db`
pub fn load_path(
    input: impl AsRef<Path>,
    db: impl AsRef<Path>,
    schema: &DatabaseSchema,
    options: LoadOptions,
) -> Result<LoadReport> {
    let mut conn = open_database(db, false)?;
    let reader = BufReader::new(File::open(input)?);
    Loader::new(schema, options).load(&mut conn, reader)
}

/// Write every record of the database at `db` to `out`, one per line
pub fn dump_path<W: Write>(db: impl AsRef<Path>, schema: &DatabaseSchema, out: W) -> Result<usize> {
    let conn = open_database(db, true)?;
    Dumper::new(&conn, schema).dump(out)
}

/// Result of a full import
#[derive(Debug, Clone)]
pub struct Import {
    pub analysis: Analysis,
    pub report: LoadReport,
}

/// Analyze `input`, create a fresh database at `db` and load every record
pub fn import(input: impl AsRef<Path>, db: impl AsRef<Path>, options: &AnalyzeOptions) -> Result<Import> {
    let analysis = analyze_path(input.as_ref(), options)?;
    import_analyzed(input, db, analysis)
}

/// Create a fresh database at `db` from `analysis` and load every record of
/// `input` into it.
///
/// The database is loaded through the schema parsed back from the emitted
/// DDL, the same text a later `dump` will read.
pub fn import_analyzed(input: impl AsRef<Path>, db: impl AsRef<Path>, analysis: Analysis) -> Result<Import> {
    let ddl = analysis.ddl();
    let mut conn = create_database(db, &ddl)?;
    let schema = parse_ddl(&ddl);
    let reader = BufReader::new(File::open(input)?);
    let report = Loader::new(&schema, LoadOptions::default()).load(&mut conn, reader)?;

    Ok(Import { analysis, report })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_basic_round_trip() {
        let input = json!({
            "name": "Alice",
            "age": 30,
            "meta": {"city": "Wonderland", "geo": {"lat": 1.5}}
        });
        let records = vec![input.as_object().unwrap().clone()];

        let analysis = analyze_records(&records, &AnalyzeOptions::default()).unwrap();
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        conn.execute_batch(&analysis.ddl()).unwrap();

        let loader = Loader::new(&analysis.schema, LoadOptions::default());
        loader.insert_record(&conn, &records[0]).unwrap();

        let dumped = Dumper::new(&conn, &analysis.schema).records().unwrap();
        assert_eq!(dumped, records);
    }
}
