//! DDL text <-> schema model
//!
//! The parser is line-oriented and tolerant. It reads back exactly what
//! [`render_ddl`] writes: one `CREATE TABLE` header per line, one column per
//! line, a closing `);` line, then optional `CREATE [UNIQUE] INDEX` lines.
//! A newline inside a quoted identifier does not end a line.

use crate::types::{
    DatabaseSchema, FieldType, IndexDef, TableSchema, ID_COLUMN, SYMBOL_VALUE_COLUMN,
};
use once_cell::sync::Lazy;
use regex::Regex;
use std::borrow::Cow;
use std::collections::BTreeMap;

// Plain word or double-quoted identifier with `""` escapes
const IDENT: &str = r#"(\w+|"(?:[^"]|"")*")"#;

static CREATE_TABLE_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"(?i)^CREATE\s+TABLE\s+(?:IF\s+NOT\s+EXISTS\s+)?{IDENT}"
    ))
    .unwrap()
});

static IDENT_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(IDENT).unwrap());

static COLUMN_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(&format!(r"(?s)^{IDENT}\s+(\w+)(.*)$")).unwrap());

static REFERENCES_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(&format!(r"(?i)\bREFERENCES\s+{IDENT}")).unwrap());

static CREATE_INDEX_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"(?is)^CREATE\s+(UNIQUE\s+)?INDEX\s+(?:IF\s+NOT\s+EXISTS\s+)?{IDENT}\s+ON\s+{IDENT}\s*\((.*)\)"
    ))
    .unwrap()
});

// Table-level constraint lines inside a CREATE TABLE block
static CONSTRAINT_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^(PRIMARY|UNIQUE|FOREIGN|CHECK|CONSTRAINT)\b").unwrap());

/// Keywords that cannot be used as bare identifiers
const RESERVED: &[&str] = &[
    "ABORT", "ACTION", "ADD", "ALL", "ALTER", "AND", "AS", "ASC", "BEGIN", "BETWEEN", "BY",
    "CASCADE", "CASE", "CAST", "CHECK", "COLLATE", "COLUMN", "COMMIT", "CONFLICT",
    "CONSTRAINT", "CREATE", "CROSS", "CURRENT", "DEFAULT", "DEFERRABLE", "DELETE", "DESC",
    "DISTINCT", "DROP", "ELSE", "END", "ESCAPE", "EXCEPT", "EXISTS", "FILTER", "FOREIGN",
    "FROM", "FULL", "GLOB", "GROUP", "HAVING", "IF", "IN", "INDEX", "INNER", "INSERT",
    "INTERSECT", "INTO", "IS", "ISNULL", "JOIN", "KEY", "LEFT", "LIKE", "LIMIT", "MATCH",
    "NATURAL", "NO", "NOT", "NOTNULL", "NULL", "OF", "OFFSET", "ON", "OR", "ORDER", "OUTER",
    "OVER", "PRIMARY", "RAISE", "RECURSIVE", "REFERENCES", "REGEXP", "RENAME", "REPLACE",
    "RETURNING", "RIGHT", "ROLLBACK", "ROW", "ROWS", "SELECT", "SET", "TABLE", "TEMP",
    "THEN", "TO", "TRANSACTION", "TRIGGER", "UNION", "UNIQUE", "UPDATE", "USING", "VALUES",
    "VIEW", "WHEN", "WHERE", "WINDOW", "WITH", "WITHOUT",
];

/// Quote an identifier when it is not a plain ASCII word or is reserved
pub fn quote_ident(name: &str) -> Cow<'_, str> {
    let plain = !name.is_empty()
        && !name.as_bytes()[0].is_ascii_digit()
        && name.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_')
        && !RESERVED.contains(&name.to_ascii_uppercase().as_str());

    if plain {
        Cow::Borrowed(name)
    } else {
        Cow::Owned(format!("\"{}\"", name.replace('"', "\"\"")))
    }
}

fn unquote_ident(raw: &str) -> String {
    match raw.strip_prefix('"').and_then(|s| s.strip_suffix('"')) {
        Some(inner) => inner.replace("\"\"", "\""),
        None => raw.to_string(),
    }
}

/// Split on newlines that are not inside a quoted identifier.
///
/// Quotes on `--` comment lines are ignored.
fn logical_lines(ddl: &str) -> Vec<&str> {
    let mut lines = Vec::new();
    let mut start = 0;
    let mut quoted = false;
    let mut comment = false;

    for (i, c) in ddl.char_indices() {
        match c {
            '\n' if !quoted => {
                lines.push(&ddl[start..i]);
                start = i + 1;
                comment = false;
            }
            '"' if !comment => quoted = !quoted,
            '-' if !quoted && ddl[start..i].trim().is_empty() && ddl[i..].starts_with("--") => {
                comment = true;
            }
            _ => {}
        }
    }
    if start < ddl.len() {
        lines.push(&ddl[start..]);
    }

    lines
}

/// Name for the index on `table.column`
pub fn index_name(table: &str, column: &str) -> String {
    let raw = format!("idx_{}_{}", table, column);
    raw.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect()
}

/// Parse DDL text into a schema model.
///
/// Anything outside `CREATE TABLE` blocks other than `CREATE INDEX` lines is
/// ignored, as are comment and blank lines. Indexes on unknown tables are
/// dropped.
pub fn parse_ddl(ddl: &str) -> DatabaseSchema {
    let mut tables: BTreeMap<String, TableSchema> = BTreeMap::new();
    let mut indexes = Vec::new();
    let mut current: Option<TableSchema> = None;

    for line in logical_lines(ddl) {
        let line = line.trim();
        if line.is_empty() || line.starts_with("--") {
            continue;
        }

        if let Some(caps) = CREATE_TABLE_REGEX.captures(line) {
            if let Some(table) = current.take() {
                tables.insert(table.name.clone(), table);
            }
            current = Some(TableSchema::new(unquote_ident(&caps[1])));
            continue;
        }

        let Some(table) = current.as_mut() else {
            if let Some(caps) = CREATE_INDEX_REGEX.captures(line) {
                indexes.push(IndexDef {
                    unique: caps.get(1).is_some(),
                    name: unquote_ident(&caps[2]),
                    table: unquote_ident(&caps[3]),
                    columns: IDENT_REGEX
                        .find_iter(&caps[4])
                        .map(|c| unquote_ident(c.as_str()))
                        .collect(),
                });
            }
            continue;
        };

        if line.starts_with(')') {
            if let Some(table) = current.take() {
                tables.insert(table.name.clone(), table);
            }
            continue;
        }
        if CONSTRAINT_REGEX.is_match(line) {
            continue;
        }

        if let Some(caps) = COLUMN_REGEX.captures(line) {
            let column = unquote_ident(&caps[1]);
            let rest = &caps[3];
            table
                .fields
                .insert(column.clone(), FieldType::from_sql(&caps[2]));
            if let Some(target) = REFERENCES_REGEX.captures(rest) {
                table
                    .foreign_keys
                    .insert(column, unquote_ident(&target[1]));
            }
        }
    }

    if let Some(table) = current.take() {
        tables.insert(table.name.clone(), table);
    }

    for index in indexes {
        if let Some(table) = tables.get_mut(&index.table) {
            table.indexes.push(index);
        }
    }

    DatabaseSchema::new(tables)
}

/// Render a schema model as DDL text.
///
/// Entity tables come first in dependency order, then symbol tables, then
/// every index. Columns are sorted by name.
pub fn render_ddl(schema: &DatabaseSchema) -> String {
    let mut out = String::new();

    let (symbols, entities): (Vec<&TableSchema>, Vec<&TableSchema>) = schema
        .ordered_tables()
        .partition(|table| table.is_symbol_table());

    for table in entities.iter().chain(symbols.iter()) {
        render_table(table, &mut out);
    }

    for table in entities.iter().chain(symbols.iter()) {
        for index in &table.indexes {
            render_index(index, &mut out);
        }
    }

    out
}

fn render_table(table: &TableSchema, out: &mut String) {
    let symbol_table = table.is_symbol_table();

    out.push_str(&format!("CREATE TABLE {} (\n", quote_ident(&table.name)));

    let columns: Vec<String> = table
        .fields
        .iter()
        .map(|(column, field_type)| {
            let mut line = format!("  {} {}", quote_ident(column), field_type.as_sql());
            if column == ID_COLUMN {
                line.push_str(" PRIMARY KEY");
            }
            if let Some(target) = table.foreign_keys.get(column) {
                line.push_str(&format!(" REFERENCES {}(id)", quote_ident(target)));
            }
            if symbol_table && column == SYMBOL_VALUE_COLUMN {
                line.push_str(" UNIQUE");
            }
            line
        })
        .collect();

    out.push_str(&columns.join(",\n"));
    out.push_str("\n);\n\n");
}

fn render_index(index: &IndexDef, out: &mut String) {
    let columns: Vec<Cow<'_, str>> = index.columns.iter().map(|c| quote_ident(c)).collect();
    out.push_str(&format!(
        "CREATE {}INDEX {} ON {} ({});\n",
        if index.unique { "UNIQUE " } else { "" },
        quote_ident(&index.name),
        quote_ident(&index.table),
        columns.join(", ")
    ));
}

impl DatabaseSchema {
    /// Render this schema as DDL text
    pub fn to_ddl(&self) -> String {
        render_ddl(self)
    }
}
