//! Write path: decompose JSON records into rows
//!
//! Each record becomes one `main` row. Nested objects are inserted first and
//! linked by id, symbol columns resolve through their symbol table, and every
//! other column stores the value directly.

use crate::input::{JsonLines, Line};
use crate::schema::quote_ident;
use crate::symbol::get_or_insert_symbol;
use crate::types::{ColumnRole, DatabaseSchema, TableSchema};
use crate::value::{symbol_text, to_sql_value};
use crate::Result;
use rusqlite::types::Value as SqlValue;
use rusqlite::{params_from_iter, Connection, OptionalExtension as _};
use serde_json::{Map, Value};
use std::io::BufRead;
use tracing::{info, warn};

/// Configuration for the write path
#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    /// Reuse an identical existing child row instead of inserting a copy.
    ///
    /// The lookup scans the child table once per nested object, so loads
    /// grow quadratically with the number of child rows.
    pub reuse_child_rows: bool,
}

/// Outcome of loading one input stream
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadReport {
    /// Records written to the main table
    pub inserted: usize,

    /// Lines that were not a JSON object
    pub malformed: usize,

    /// Records whose insert failed and was rolled back
    pub failed: usize,

    /// Records that left no row because the table has no data columns
    pub empty: usize,
}

/// Inserts JSON records into the tables of a schema
pub struct Loader<'a> {
    schema: &'a DatabaseSchema,
    options: LoadOptions,
}

impl<'a> Loader<'a> {
    pub fn new(schema: &'a DatabaseSchema, options: LoadOptions) -> Self {
        Loader { schema, options }
    }

    /// Load every line of `reader` inside a single transaction.
    ///
    /// Blank lines are skipped. Lines that fail to decode or parse and
    /// records that fail to insert are logged and skipped; each record runs
    /// under its own savepoint so a failure leaves no partial rows behind.
    /// The transaction is committed once at the end.
    pub fn load<R: BufRead>(&self, conn: &mut Connection, reader: R) -> Result<LoadReport> {
        let main = self.schema.main_table()?;
        let mut report = LoadReport::default();
        let mut tx = conn.transaction()?;

        for item in JsonLines::new(reader) {
            let (line, record) = match item? {
                (line, Line::Object(record)) => (line, record),
                (line, Line::NotObject) => {
                    warn!(line, "skip JSON line: not an object");
                    report.malformed += 1;
                    continue;
                }
                (line, Line::Invalid(err)) => {
                    warn!(line, error = %err, "skip JSON line");
                    report.malformed += 1;
                    continue;
                }
            };

            let savepoint = tx.savepoint()?;
            match self.insert_row(&savepoint, main, &record) {
                Ok(id) => {
                    savepoint.commit()?;
                    if id.is_some() {
                        report.inserted += 1;
                    } else {
                        report.empty += 1;
                    }
                }
                Err(err) => {
                    // Dropping the savepoint rolls it back
                    warn!(line, error = %err, "load row failed, skipped");
                    report.failed += 1;
                }
            }
        }

        tx.commit()?;
        info!(
            inserted = report.inserted,
            malformed = report.malformed,
            failed = report.failed,
            empty = report.empty,
            "load finished"
        );
        Ok(report)
    }

    /// Insert `record` as a new `main` row; returns its id
    pub fn insert_record(&self, conn: &Connection, record: &Map<String, Value>) -> Result<Option<i64>> {
        self.insert_row(conn, self.schema.main_table()?, record)
    }

    /// Insert `obj` into `table`, recursing into nested objects first.
    ///
    /// Returns `None` when the table has no columns besides `id`.
    fn insert_row(&self, conn: &Connection, table: &TableSchema, obj: &Map<String, Value>) -> Result<Option<i64>> {
        let row = self.row_values(conn, table, obj)?;
        if row.is_empty() {
            return Ok(None);
        }
        self.insert_row_values(conn, table, &row).map(Some)
    }

    /// Id of a child row equal to `obj`, inserting one if needed
    fn child_row(&self, conn: &Connection, table: &TableSchema, obj: &Map<String, Value>) -> Result<Option<i64>> {
        if !self.options.reuse_child_rows {
            return self.insert_row(conn, table, obj);
        }

        let row = self.row_values(conn, table, obj)?;
        if row.is_empty() {
            return Ok(None);
        }

        let conditions: Vec<String> = row
            .iter()
            .enumerate()
            .map(|(i, (c, _))| format!("{} IS ?{}", quote_ident(c), i + 1))
            .collect();
        let sql = format!(
            "SELECT id FROM {} WHERE {} LIMIT 1",
            quote_ident(&table.name),
            conditions.join(" AND ")
        );
        let existing: Option<i64> = conn
            .prepare_cached(&sql)?
            .query_row(params_from_iter(row.iter().map(|(_, v)| v)), |r| r.get(0))
            .optional()?;

        match existing {
            Some(id) => Ok(Some(id)),
            None => self.insert_row_values(conn, table, &row).map(Some),
        }
    }

    fn insert_row_values(&self, conn: &Connection, table: &TableSchema, row: &[(&str, SqlValue)]) -> Result<i64> {
        let columns: Vec<String> = row.iter().map(|(c, _)| quote_ident(c).into_owned()).collect();
        let placeholders: Vec<String> = (1..=row.len()).map(|i| format!("?{}", i)).collect();
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            quote_ident(&table.name),
            columns.join(", "),
            placeholders.join(", ")
        );

        conn.prepare_cached(&sql)?
            .execute(params_from_iter(row.iter().map(|(_, v)| v)))?;
        Ok(conn.last_insert_rowid())
    }

    /// Column values for one row of `table`, in column order, without `id`
    fn row_values<'t>(
        &self,
        conn: &Connection,
        table: &'t TableSchema,
        obj: &Map<String, Value>,
    ) -> Result<Vec<(&'t str, SqlValue)>> {
        let mut row = Vec::with_capacity(table.fields.len());

        for column in table.fields.keys() {
            let value = match table.column_role(column) {
                ColumnRole::Id => continue,
                ColumnRole::Symbol { base, table: symbols } => {
                    match obj.get(base).and_then(symbol_text) {
                        Some(text) => SqlValue::Integer(get_or_insert_symbol(conn, symbols, &text)?),
                        None => SqlValue::Null,
                    }
                }
                ColumnRole::Nested { base, table: child } => match obj.get(base) {
                    Some(Value::Object(nested)) => {
                        let child = self.schema.require_table(child)?;
                        self.child_row(conn, child, nested)?
                            .map_or(SqlValue::Null, SqlValue::Integer)
                    }
                    _ => SqlValue::Null,
                },
                ColumnRole::Direct => obj.get(column.as_str()).map_or(SqlValue::Null, to_sql_value),
            };
            row.push((column.as_str(), value));
        }

        Ok(row)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::parse_ddl;
    use serde_json::json;
    use std::io::Cursor;

    const DDL: &str = "\
CREATE TABLE main (
  age INTEGER,
  id INTEGER PRIMARY KEY,
  kind_symbol INTEGER REFERENCES kind_symbol(id),
  meta_id INTEGER REFERENCES meta(id),
  tags JSON
);

CREATE TABLE meta (
  city TEXT,
  id INTEGER PRIMARY KEY
);

CREATE TABLE kind_symbol (
  id INTEGER PRIMARY KEY,
  value TEXT UNIQUE
);
";

    fn setup() -> (Connection, DatabaseSchema) {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(DDL).unwrap();
        (conn, parse_ddl(DDL))
    }

    fn count(conn: &Connection, table: &str) -> i64 {
        conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |r| r.get(0))
            .unwrap()
    }

    #[test]
    fn test_load_counts_and_skips() {
        let (mut conn, schema) = setup();
        let input = r#"{"age": 30, "kind": "a", "meta": {"city": "Paris"}, "tags": [1]}

not json
{"age": 31, "kind": "a", "meta": {"city": "Paris"}}
[1, 2]
{"age": 32}
"#;
        let options = LoadOptions {
            reuse_child_rows: true,
        };
        let report = Loader::new(&schema, options)
            .load(&mut conn, Cursor::new(input))
            .unwrap();

        assert_eq!(
            report,
            LoadReport {
                inserted: 3,
                malformed: 2,
                failed: 0,
                empty: 0,
            }
        );
        assert_eq!(count(&conn, "main"), 3);
        assert_eq!(count(&conn, "kind_symbol"), 1);
        // Identical child objects share one row
        assert_eq!(count(&conn, "meta"), 1);
    }

    #[test]
    fn test_child_rows_are_not_reused_by_default() {
        let (mut conn, schema) = setup();
        let input = "{\"meta\": {\"city\": \"Paris\"}}\n{\"meta\": {\"city\": \"Paris\"}}\n";
        Loader::new(&schema, LoadOptions::default())
            .load(&mut conn, Cursor::new(input))
            .unwrap();
        assert_eq!(count(&conn, "meta"), 2);
    }

    #[test]
    fn test_undecodable_line_keeps_earlier_records() {
        let (mut conn, schema) = setup();
        let input: &[u8] = b"{\"age\": 1}\n\xff\xfe garbage\n{\"age\": 2}\n";
        let report = Loader::new(&schema, LoadOptions::default())
            .load(&mut conn, Cursor::new(input))
            .unwrap();

        assert_eq!(report.inserted, 2);
        assert_eq!(report.malformed, 1);
        let ages: Vec<i64> = conn
            .prepare("SELECT age FROM main ORDER BY id")
            .unwrap()
            .query_map([], |r| r.get(0))
            .unwrap()
            .collect::<rusqlite::Result<_>>()
            .unwrap();
        assert_eq!(ages, vec![1, 2]);
    }

    #[test]
    fn test_absent_fields_store_null() {
        let (conn, schema) = setup();
        let loader = Loader::new(&schema, LoadOptions::default());
        let record = json!({"tags": [], "kind": null});
        let id = loader
            .insert_record(&conn, record.as_object().unwrap())
            .unwrap()
            .unwrap();

        let (kind, meta, tags, age): (Option<i64>, Option<i64>, Option<String>, Option<i64>) = conn
            .query_row(
                "SELECT kind_symbol, meta_id, tags, age FROM main WHERE id = ?1",
                [id],
                |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?)),
            )
            .unwrap();
        assert_eq!(kind, None);
        assert_eq!(meta, None);
        assert_eq!(tags.as_deref(), Some("[]"));
        assert_eq!(age, None);
    }

    #[test]
    fn test_symbol_ids_are_shared() {
        let (conn, schema) = setup();
        let loader = Loader::new(&schema, LoadOptions::default());
        for kind in ["x", "y", "x"] {
            loader
                .insert_record(&conn, json!({"kind": kind}).as_object().unwrap())
                .unwrap();
        }

        let ids: Vec<i64> = conn
            .prepare("SELECT kind_symbol FROM main ORDER BY id")
            .unwrap()
            .query_map([], |r| r.get(0))
            .unwrap()
            .collect::<rusqlite::Result<_>>()
            .unwrap();
        assert_eq!(ids[0], ids[2]);
        assert_ne!(ids[0], ids[1]);
    }

    #[test]
    fn test_failed_record_is_rolled_back() {
        // The store lacks the `zone` child table the schema names
        let store_ddl = "\
CREATE TABLE main (id INTEGER PRIMARY KEY, kind_symbol INTEGER, zone_id INTEGER);
CREATE TABLE kind_symbol (id INTEGER PRIMARY KEY, value TEXT UNIQUE);
";
        let mut conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(store_ddl).unwrap();
        let schema = parse_ddl(
            "CREATE TABLE main (
  id INTEGER PRIMARY KEY,
  kind_symbol INTEGER REFERENCES kind_symbol(id),
  zone_id INTEGER REFERENCES zone(id)
);
CREATE TABLE kind_symbol (
  id INTEGER PRIMARY KEY,
  value TEXT UNIQUE
);
CREATE TABLE zone (
  id INTEGER PRIMARY KEY,
  x TEXT
);
",
        );
        let input = "{\"kind\": \"k\", \"zone\": {\"x\": \"boo\"}}\n{\"kind\": \"k2\"}\n";
        let report = Loader::new(&schema, LoadOptions::default())
            .load(&mut conn, Cursor::new(input))
            .unwrap();

        assert_eq!(report.inserted, 1);
        assert_eq!(report.failed, 1);
        assert_eq!(count(&conn, "main"), 1);
        // The symbol written before the failure was rolled back too
        assert_eq!(count(&conn, "kind_symbol"), 1);
        let kept: String = conn
            .query_row("SELECT value FROM kind_symbol", [], |r| r.get(0))
            .unwrap();
        assert_eq!(kept, "k2");
    }

    #[test]
    fn test_empty_table_writes_no_row() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE main (id INTEGER PRIMARY KEY);").unwrap();
        let schema = parse_ddl("CREATE TABLE main (\n  id INTEGER PRIMARY KEY\n);\n");
        let id = Loader::new(&schema, LoadOptions::default())
            .insert_record(&conn, json!({"a": 1}).as_object().unwrap())
            .unwrap();
        assert_eq!(id, None);
    }

    #[test]
    fn test_missing_main_table_is_fatal() {
        let mut conn = Connection::open_in_memory().unwrap();
        let schema = parse_ddl("");
        let result = Loader::new(&schema, LoadOptions::default()).load(&mut conn, Cursor::new("{}"));
        assert!(matches!(result, Err(crate::Error::MissingTable(_))));
    }
}
