//! Per-table accumulators for schema inference
//!
//! Observations are accumulated across the whole sample and only turned into
//! a [`TableSchema`] once at the end.

use crate::types::{FieldType, TableSchema, ID_COLUMN, NESTED_SUFFIX};
use serde_json::Value;
use std::collections::BTreeMap;

/// Kind of a JSON value as seen by the analyzer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum ValueKind {
    Null,
    Boolean,
    Integer,
    Number,
    String,
    Array,
    Object,
}

impl ValueKind {
    pub(crate) fn from_value(value: &Value) -> Self {
        match value {
            Value::Null => ValueKind::Null,
            Value::Bool(_) => ValueKind::Boolean,
            Value::Number(n) => {
                if n.is_i64() {
                    ValueKind::Integer
                } else {
                    ValueKind::Number
                }
            }
            Value::String(_) => ValueKind::String,
            Value::Array(_) => ValueKind::Array,
            Value::Object(_) => ValueKind::Object,
        }
    }

    /// Storage type for a direct column; `None` for null and nested objects
    pub(crate) fn field_type(self) -> Option<FieldType> {
        match self {
            ValueKind::Boolean => Some(FieldType::Boolean),
            ValueKind::Integer => Some(FieldType::Integer),
            ValueKind::Number => Some(FieldType::Real),
            ValueKind::String => Some(FieldType::Text),
            ValueKind::Array => Some(FieldType::Json),
            ValueKind::Null | ValueKind::Object => None,
        }
    }
}

/// Merge two observed storage types
pub(crate) fn widen(current: FieldType, seen: FieldType) -> FieldType {
    use FieldType::*;
    match (current, seen) {
        (a, b) if a == b => a,
        (Integer, Real) | (Real, Integer) => Real,
        _ => Text,
    }
}

/// Accumulated observations for one table
#[derive(Debug, Default)]
pub(crate) struct TableBuilder {
    // `None` until a non-null value is seen
    columns: BTreeMap<String, Option<FieldType>>,
    foreign_keys: BTreeMap<String, String>,
}

impl TableBuilder {
    pub(crate) fn observe(&mut self, column: &str, kind: ValueKind) {
        let slot = self.columns.entry(column.to_string()).or_insert(None);
        if let Some(seen) = kind.field_type() {
            *slot = Some(match *slot {
                Some(current) => widen(current, seen),
                None => seen,
            });
        }
    }

    /// Record a nested object stored in child table `table`
    pub(crate) fn observe_nested(&mut self, field: &str, table: &str) {
        // A field seen only as null or as an object is nested, not direct
        if self.columns.get(field) == Some(&None) {
            self.columns.remove(field);
        }
        let column = format!("{}{}", field, NESTED_SUFFIX);
        self.columns.insert(column.clone(), Some(FieldType::Integer));
        self.foreign_keys.insert(column, table.to_string());
    }

    pub(crate) fn column_type(&self, column: &str) -> Option<FieldType> {
        self.columns.get(column).map(|t| t.unwrap_or(FieldType::Text))
    }

    /// Replace the direct column `field` with `<field>_symbol -> table`
    pub(crate) fn redirect(&mut self, field: &str, symbol_table: &str) {
        if self.columns.remove(field).is_some() {
            self.columns
                .insert(symbol_table.to_string(), Some(FieldType::Integer));
            self.foreign_keys
                .insert(symbol_table.to_string(), symbol_table.to_string());
        }
    }

    pub(crate) fn build(self, name: &str) -> TableSchema {
        let mut table = TableSchema::new(name);
        for (column, field_type) in self.columns {
            table
                .fields
                .insert(column, field_type.unwrap_or(FieldType::Text));
        }
        table
            .fields
            .insert(ID_COLUMN.to_string(), FieldType::Integer);
        table.foreign_keys = self.foreign_keys;
        table
    }
}
