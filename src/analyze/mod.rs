//! Schema inference from a sample of newline-delimited JSON records
//!
//! Starting at the `main` table, every field of every sampled record is
//! classified. Nested objects become child tables named after the field and
//! linked through `<field>_id`; arrays become `JSON` columns; strings become
//! `TEXT`. String and array fields whose distinct values number fewer than a
//! fifth of the sample are redirected through a `<field>_symbol` table.

mod builder;

use crate::schema::ddl::index_name;
use crate::types::{
    ColumnRole, DatabaseSchema, IndexDef, TableSchema, ID_COLUMN, MAIN_TABLE, SYMBOL_VALUE_COLUMN,
};
use crate::input::{JsonLines, Line};
use crate::{Error, Result};
use builder::{TableBuilder, ValueKind};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::io::BufRead;
use tracing::{debug, warn};

/// Configuration for schema inference
#[derive(Debug, Clone)]
pub struct AnalyzeOptions {
    /// Number of records to sample from the head of the input
    pub sample_size: usize,

    /// Emit `CREATE INDEX` statements at all
    pub generate_indexes: bool,

    /// Index nested-object foreign-key columns (`<field>_id`)
    pub index_foreign_keys: bool,

    /// Index `<field>_symbol` columns and symbol table values
    pub index_symbol_fields: bool,
}

impl Default for AnalyzeOptions {
    fn default() -> Self {
        AnalyzeOptions {
            sample_size: 20,
            generate_indexes: false,
            index_foreign_keys: true,
            index_symbol_fields: true,
        }
    }
}

/// Result of a schema inference run
#[derive(Debug, Clone)]
pub struct Analysis {
    pub schema: DatabaseSchema,

    /// Number of records the schema was inferred from
    pub sampled: usize,

    /// Fields redirected through symbol tables
    pub symbol_fields: BTreeSet<String>,
}

impl Analysis {
    /// DDL text for the inferred schema, including any indexes
    pub fn ddl(&self) -> String {
        self.schema.to_ddl()
    }
}

/// Read up to `sample_size` JSON objects from `reader`.
///
/// Blank lines do not count toward the sample; malformed lines and
/// non-object values are skipped with a warning.
pub fn sample_records<R: BufRead>(reader: R, sample_size: usize) -> Result<Vec<Map<String, Value>>> {
    let mut records = Vec::new();

    for item in JsonLines::new(reader) {
        if records.len() >= sample_size {
            break;
        }
        match item? {
            (_, Line::Object(record)) => records.push(record),
            (line, Line::NotObject) => warn!(line, "sample line is not a JSON object, skipped"),
            (line, Line::Invalid(err)) => warn!(line, error = %err, "malformed sample line, skipped"),
        }
    }

    Ok(records)
}

/// Sample `reader` and infer a schema from the sampled records
pub fn analyze_reader<R: BufRead>(reader: R, options: &AnalyzeOptions) -> Result<Analysis> {
    if options.sample_size == 0 {
        return Err(Error::InvalidSampleSize);
    }
    let records = sample_records(reader, options.sample_size)?;
    analyze_records(&records, options)
}

/// Infer a schema from already-parsed records
pub fn analyze_records(records: &[Map<String, Value>], options: &AnalyzeOptions) -> Result<Analysis> {
    if records.is_empty() {
        return Err(Error::EmptySample);
    }

    let mut analyzer = SchemaAnalyzer::default();
    let rows: Vec<&Map<String, Value>> = records.iter().collect();
    analyzer.analyze_table(MAIN_TABLE, &rows);

    let symbol_fields = analyzer.symbol_fields(records.len());
    let schema = analyzer.finish(&symbol_fields, options);

    Ok(Analysis {
        schema,
        sampled: records.len(),
        symbol_fields,
    })
}

/// Accumulates table observations and per-field distinct values
#[derive(Debug, Default)]
struct SchemaAnalyzer {
    tables: BTreeMap<String, TableBuilder>,

    // Field name -> distinct raw strings, shared across tables
    string_uniques: BTreeMap<String, HashSet<String>>,

    // Field name -> distinct canonical JSON encodings, shared across tables
    json_uniques: BTreeMap<String, HashSet<String>>,
}

impl SchemaAnalyzer {
    fn analyze_table(&mut self, name: &str, rows: &[&Map<String, Value>]) {
        let mut nested: BTreeMap<&str, Vec<&Map<String, Value>>> = BTreeMap::new();

        {
            let table = self.tables.entry(name.to_string()).or_default();
            for row in rows {
                for (field, value) in row.iter() {
                    if field == ID_COLUMN {
                        continue;
                    }
                    match value {
                        Value::Object(child) => {
                            nested.entry(field.as_str()).or_default().push(child);
                            continue;
                        }
                        Value::Array(_) => {
                            self.json_uniques
                                .entry(field.clone())
                                .or_default()
                                .insert(value.to_string());
                        }
                        Value::String(s) => {
                            self.string_uniques
                                .entry(field.clone())
                                .or_default()
                                .insert(s.clone());
                        }
                        _ => {}
                    }
                    table.observe(field, ValueKind::from_value(value));
                }
            }
        }

        for (field, child_rows) in nested {
            if field == MAIN_TABLE {
                warn!(
                    table = name,
                    field,
                    "nested field shares the root table name, its rows merge into it"
                );
            }
            if let Some(table) = self.tables.get_mut(name) {
                table.observe_nested(field, field);
            }
            self.analyze_table(field, &child_rows);
        }
    }

    /// Fields whose distinct-value count is below a fifth of the sample
    fn symbol_fields(&self, sampled: usize) -> BTreeSet<String> {
        let threshold = sampled / 5;
        let mut fields = BTreeSet::new();

        for (field, uniques) in self.string_uniques.iter().chain(self.json_uniques.iter()) {
            if uniques.len() < threshold && fields.insert(field.clone()) {
                debug!(field = %field, distinct = uniques.len(), threshold, "redirecting field to symbol table");
            }
        }

        fields
    }

    fn finish(self, symbol_fields: &BTreeSet<String>, options: &AnalyzeOptions) -> DatabaseSchema {
        let mut tables = BTreeMap::new();
        let mut symbol_tables = BTreeMap::new();

        for (name, mut builder) in self.tables {
            for field in symbol_fields {
                let textual = builder
                    .column_type(field)
                    .is_some_and(|field_type| field_type.is_textual());
                if textual {
                    let symbol = TableSchema::symbol_table(field);
                    builder.redirect(field, &symbol.name);
                    symbol_tables.entry(symbol.name.clone()).or_insert(symbol);
                }
            }
            tables.insert(name.clone(), builder.build(&name));
        }

        // A child table named like a symbol table keeps its inferred shape
        for (name, symbol) in symbol_tables {
            tables.entry(name).or_insert(symbol);
        }

        if options.generate_indexes {
            add_indexes(&mut tables, options);
        }

        DatabaseSchema::new(tables)
    }
}

fn add_indexes(tables: &mut BTreeMap<String, TableSchema>, options: &AnalyzeOptions) {
    for table in tables.values_mut() {
        let mut indexes = Vec::new();

        for column in table.foreign_keys.keys() {
            let wanted = match table.column_role(column) {
                ColumnRole::Symbol { .. } => options.index_symbol_fields,
                ColumnRole::Nested { .. } => options.index_foreign_keys,
                _ => false,
            };
            if wanted {
                indexes.push(IndexDef {
                    name: index_name(&table.name, column),
                    table: table.name.clone(),
                    columns: vec![column.clone()],
                    unique: false,
                });
            }
        }

        if table.is_symbol_table() && options.index_symbol_fields {
            indexes.push(IndexDef {
                name: index_name(&table.name, SYMBOL_VALUE_COLUMN),
                table: table.name.clone(),
                columns: vec![SYMBOL_VALUE_COLUMN.to_string()],
                unique: true,
            });
        }

        table.indexes = indexes;
    }
}
