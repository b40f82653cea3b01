use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Name of the root table holding one row per input record
pub const MAIN_TABLE: &str = "main";

/// Surrogate key column present in every table
pub const ID_COLUMN: &str = "id";

/// Column suffix for nested-object foreign keys
pub const NESTED_SUFFIX: &str = "_id";

/// Column and table suffix for symbol redirection
pub const SYMBOL_SUFFIX: &str = "_symbol";

/// Value column of a symbol table
pub const SYMBOL_VALUE_COLUMN: &str = "value";

/// SQL storage type of a column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FieldType {
    Integer,
    Real,
    Text,
    Boolean,
    Json,
}

impl FieldType {
    pub fn as_sql(self) -> &'static str {
        match self {
            FieldType::Integer => "INTEGER",
            FieldType::Real => "REAL",
            FieldType::Text => "TEXT",
            FieldType::Boolean => "BOOLEAN",
            FieldType::Json => "JSON",
        }
    }

    /// Map a declared SQL type name onto a field type.
    ///
    /// Unknown names fall back to `TEXT`.
    pub fn from_sql(name: &str) -> Self {
        match name.to_ascii_uppercase().as_str() {
            "INTEGER" | "INT" | "BIGINT" => FieldType::Integer,
            "REAL" | "FLOAT" | "DOUBLE" | "NUMERIC" => FieldType::Real,
            "BOOLEAN" | "BOOL" => FieldType::Boolean,
            "JSON" => FieldType::Json,
            _ => FieldType::Text,
        }
    }

    /// Whether the column may hold canonical JSON text that is sniffed on read
    pub fn is_textual(self) -> bool {
        matches!(self, FieldType::Text | FieldType::Json)
    }
}

/// An index over one or more columns of a table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexDef {
    pub name: String,
    pub table: String,
    pub columns: Vec<String>,
    pub unique: bool,
}

/// Schema of a single table
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TableSchema {
    pub name: String,

    /// Column name -> storage type (always includes `id`)
    pub fields: BTreeMap<String, FieldType>,

    /// Column name -> referenced table name
    pub foreign_keys: BTreeMap<String, String>,

    pub indexes: Vec<IndexDef>,
}

/// How a column maps back onto the JSON object of its row
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnRole<'a> {
    /// The surrogate key; never part of the JSON representation
    Id,
    /// `<base>_symbol`: deduplicated value stored in `table`
    Symbol { base: &'a str, table: &'a str },
    /// `<base>_id`: one-to-one nested object stored in `table`
    Nested { base: &'a str, table: &'a str },
    /// Stored as-is (scalars) or as canonical JSON text (arrays/objects)
    Direct,
}

impl TableSchema {
    pub fn new(name: impl Into<String>) -> Self {
        TableSchema {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Build the two-column deduplication table for `field`
    pub fn symbol_table(field: &str) -> Self {
        let mut table = TableSchema::new(format!("{}{}", field, SYMBOL_SUFFIX));
        table.fields.insert(ID_COLUMN.to_string(), FieldType::Integer);
        table
            .fields
            .insert(SYMBOL_VALUE_COLUMN.to_string(), FieldType::Text);
        table
    }

    /// True for `{id, value}` tables named `<field>_symbol`
    pub fn is_symbol_table(&self) -> bool {
        self.name.ends_with(SYMBOL_SUFFIX)
            && self.fields.len() == 2
            && self.fields.contains_key(ID_COLUMN)
            && self.fields.contains_key(SYMBOL_VALUE_COLUMN)
    }

    pub fn field_type(&self, column: &str) -> Option<FieldType> {
        self.fields.get(column).copied()
    }

    /// Classify a column by the naming convention plus its foreign key.
    ///
    /// A `_symbol`/`_id` suffix without a foreign key is a plain field.
    pub fn column_role<'a>(&'a self, column: &'a str) -> ColumnRole<'a> {
        if column == ID_COLUMN {
            return ColumnRole::Id;
        }
        let Some(target) = self.foreign_keys.get(column) else {
            return ColumnRole::Direct;
        };
        if let Some(base) = column.strip_suffix(SYMBOL_SUFFIX) {
            return ColumnRole::Symbol {
                base,
                table: target,
            };
        }
        if let Some(base) = column.strip_suffix(NESTED_SUFFIX) {
            return ColumnRole::Nested {
                base,
                table: target,
            };
        }
        ColumnRole::Direct
    }
}

/// Schema of the whole database
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DatabaseSchema {
    pub tables: BTreeMap<String, TableSchema>,

    /// Creation order: every table follows the tables it references
    pub table_order: Vec<String>,
}

impl DatabaseSchema {
    /// Build a schema and compute its table order
    pub fn new(tables: BTreeMap<String, TableSchema>) -> Self {
        let table_order = crate::schema::resolve_table_order(&tables);
        DatabaseSchema {
            tables,
            table_order,
        }
    }

    pub fn table(&self, name: &str) -> Option<&TableSchema> {
        self.tables.get(name)
    }

    pub fn require_table(&self, name: &str) -> crate::Result<&TableSchema> {
        self.table(name)
            .ok_or_else(|| crate::Error::MissingTable(name.to_string()))
    }

    pub fn main_table(&self) -> crate::Result<&TableSchema> {
        self.require_table(MAIN_TABLE)
    }

    /// Tables in creation order
    pub fn ordered_tables(&self) -> impl Iterator<Item = &TableSchema> {
        self.table_order.iter().filter_map(|name| self.tables.get(name))
    }
}
