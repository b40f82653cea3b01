//! Read path: rebuild nested JSON records from rows
//!
//! Every `main` row becomes one JSON object. Symbol and nested-object
//! columns are resolved recursively; a reference that cannot be resolved is
//! left out of the object rather than written as `null`.

use crate::schema::quote_ident;
use crate::symbol::resolve_symbol;
use crate::types::{ColumnRole, DatabaseSchema, TableSchema};
use crate::value::{as_row_id, from_sql_value};
use crate::Result;
use rusqlite::types::Value as SqlValue;
use rusqlite::Connection;
use serde_json::{Map, Value};
use std::io::Write;
use tracing::{debug, info};

/// Reconstructs JSON records from the tables of a schema
pub struct Dumper<'a> {
    conn: &'a Connection,
    schema: &'a DatabaseSchema,
}

impl<'a> Dumper<'a> {
    pub fn new(conn: &'a Connection, schema: &'a DatabaseSchema) -> Self {
        Dumper { conn, schema }
    }

    /// Write every `main` row to `out` as one JSON object per line.
    ///
    /// Returns the number of records written.
    pub fn dump<W: Write>(&self, mut out: W) -> Result<usize> {
        let count = self.for_each_record(|record| {
            serde_json::to_writer(&mut out, &record)?;
            out.write_all(b"\n")?;
            Ok(())
        })?;
        out.flush()?;
        info!(records = count, "dump finished");
        Ok(count)
    }

    /// Collect every reconstructed `main` record
    pub fn records(&self) -> Result<Vec<Map<String, Value>>> {
        let mut records = Vec::new();
        self.for_each_record(|record| {
            records.push(record);
            Ok(())
        })?;
        Ok(records)
    }

    /// Visit each `main` row in primary-key scan order
    pub fn for_each_record<F>(&self, mut visit: F) -> Result<usize>
    where
        F: FnMut(Map<String, Value>) -> Result<()>,
    {
        let table = self.schema.main_table()?;
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT * FROM {}", quote_ident(&table.name)))?;
        let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();

        let mut rows = stmt.query([])?;
        let mut count = 0;
        while let Some(row) = rows.next()? {
            let values = (0..columns.len())
                .map(|i| row.get::<_, SqlValue>(i))
                .collect::<rusqlite::Result<Vec<_>>>()?;
            visit(self.reconstruct_row(table, &columns, values))?;
            count += 1;
        }

        Ok(count)
    }

    /// Rebuild the row `id` of `table`; `None` if no such row exists
    pub fn reconstruct(&self, table: &TableSchema, id: i64) -> Result<Option<Map<String, Value>>> {
        let mut stmt = self.conn.prepare_cached(&format!(
            "SELECT * FROM {} WHERE id = ?1",
            quote_ident(&table.name)
        ))?;
        let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();

        let mut rows = stmt.query([id])?;
        let Some(row) = rows.next()? else {
            return Ok(None);
        };
        let values = (0..columns.len())
            .map(|i| row.get::<_, SqlValue>(i))
            .collect::<rusqlite::Result<Vec<_>>>()?;
        drop(rows);
        drop(stmt);

        Ok(Some(self.reconstruct_row(table, &columns, values)))
    }

    fn reconstruct_row(&self, table: &TableSchema, columns: &[String], values: Vec<SqlValue>) -> Map<String, Value> {
        let mut obj = Map::new();

        for (column, value) in columns.iter().zip(values) {
            if value == SqlValue::Null {
                continue;
            }

            match table.column_role(column) {
                ColumnRole::Id => {}
                ColumnRole::Symbol { base, table: symbols } => {
                    if let Some(resolved) = self.resolve_symbol(symbols, &value) {
                        obj.insert(base.to_string(), resolved);
                    }
                }
                ColumnRole::Nested { base, table: child } => {
                    if let Some(nested) = self.resolve_nested(child, &value) {
                        obj.insert(base.to_string(), Value::Object(nested));
                    }
                }
                ColumnRole::Direct => {
                    obj.insert(column.clone(), from_sql_value(value, table.field_type(column)));
                }
            }
        }

        obj
    }

    fn resolve_symbol(&self, table: &str, value: &SqlValue) -> Option<Value> {
        let id = as_row_id(value)?;
        match resolve_symbol(self.conn, table, id) {
            Ok(Some(resolved)) => Some(resolved),
            Ok(None) => {
                debug!(table, id, "symbol id not found, field omitted");
                None
            }
            Err(err) => {
                debug!(table, id, error = %err, "symbol lookup failed, field omitted");
                None
            }
        }
    }

    fn resolve_nested(&self, table: &str, value: &SqlValue) -> Option<Map<String, Value>> {
        let id = as_row_id(value).filter(|id| *id != 0)?;
        let Some(child) = self.schema.table(table) else {
            debug!(table, "nested table not in schema, field omitted");
            return None;
        };
        match self.reconstruct(child, id) {
            Ok(Some(nested)) if !nested.is_empty() => Some(nested),
            Ok(_) => None,
            Err(err) => {
                debug!(table, id, error = %err, "nested row lookup failed, field omitted");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::parse_ddl;
    use serde_json::json;

    const DDL: &str = "\
CREATE TABLE main (
  flag BOOLEAN,
  id INTEGER PRIMARY KEY,
  ids JSON,
  kind_symbol INTEGER REFERENCES kind_symbol(id),
  meta_id INTEGER REFERENCES meta(id),
  note TEXT,
  score REAL
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

    fn setup(rows: &str) -> (Connection, DatabaseSchema) {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(DDL).unwrap();
        conn.execute_batch(rows).unwrap();
        (conn, parse_ddl(DDL))
    }

    #[test]
    fn test_reconstructs_nested_and_symbols() {
        let (conn, schema) = setup(
            "INSERT INTO meta (id, city) VALUES (1, 'Paris');
             INSERT INTO kind_symbol (id, value) VALUES (1, 'alpha'), (2, '[1,2]');
             INSERT INTO main (flag, ids, kind_symbol, meta_id, note, score)
               VALUES (1, '[1,2,3]', 1, 1, 'hi', 5.5);
             INSERT INTO main (flag, ids, kind_symbol, note) VALUES (0, '[]', 2, '{broken');",
        );
        let records = Dumper::new(&conn, &schema).records().unwrap();

        assert_eq!(
            Value::Object(records[0].clone()),
            json!({
                "flag": true,
                "ids": [1, 2, 3],
                "kind": "alpha",
                "meta": {"city": "Paris"},
                "note": "hi",
                "score": 5.5
            })
        );
        assert_eq!(
            Value::Object(records[1].clone()),
            json!({"flag": false, "ids": [], "kind": [1, 2], "note": "{broken"})
        );
    }

    #[test]
    fn test_unresolvable_references_are_omitted() {
        let (conn, schema) = setup(
            "INSERT INTO main (kind_symbol, meta_id, note) VALUES (42, 7, 'x');
             INSERT INTO main (meta_id, note) VALUES (0, 'y');",
        );
        let records = Dumper::new(&conn, &schema).records().unwrap();
        assert_eq!(Value::Object(records[0].clone()), json!({"note": "x"}));
        assert_eq!(Value::Object(records[1].clone()), json!({"note": "y"}));
    }

    #[test]
    fn test_empty_nested_row_is_omitted() {
        let (conn, schema) = setup(
            "INSERT INTO meta (id, city) VALUES (1, NULL);
             INSERT INTO main (meta_id, note) VALUES (1, 'z');",
        );
        let records = Dumper::new(&conn, &schema).records().unwrap();
        assert_eq!(Value::Object(records[0].clone()), json!({"note": "z"}));
    }

    #[test]
    fn test_dump_writes_one_line_per_record() {
        let (conn, schema) = setup(
            "INSERT INTO main (note) VALUES ('<a&b>');
             INSERT INTO main (score) VALUES (1.25);",
        );
        let mut out = Vec::new();
        let count = Dumper::new(&conn, &schema).dump(&mut out).unwrap();
        assert_eq!(count, 2);

        let text = String::from_utf8(out).unwrap();
        assert_eq!(text, "{\"note\":\"<a&b>\"}\n{\"score\":1.25}\n");
    }

    #[test]
    fn test_reconstruct_missing_row() {
        let (conn, schema) = setup("");
        let meta = schema.table("meta").unwrap();
        assert_eq!(Dumper::new(&conn, &schema).reconstruct(meta, 5).unwrap(), None);
    }
}
