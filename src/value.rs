//! Conversions between JSON values and stored column values

use crate::types::FieldType;
use rusqlite::types::Value as SqlValue;
use serde_json::{Number, Value};

/// Value to bind for a direct column.
///
/// Arrays and objects are stored as their canonical JSON text, booleans as
/// 0/1, integral numbers as INTEGER and everything else numeric as REAL.
pub fn to_sql_value(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
        Value::Number(n) => match n.as_i64() {
            Some(i) => SqlValue::Integer(i),
            None => n.as_f64().map_or(SqlValue::Null, SqlValue::Real),
        },
        Value::String(s) => SqlValue::Text(s.clone()),
        Value::Array(_) | Value::Object(_) => SqlValue::Text(value.to_string()),
    }
}

/// Text stored in a symbol table for `value`; `None` for null.
///
/// Strings are stored raw, everything else as canonical JSON.
pub fn symbol_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// Parse text that looks like a JSON array or object, else keep it as text.
///
/// Only a leading `[` or `{` triggers a parse attempt; a failed parse falls
/// back to the raw string.
pub fn sniff_json(text: String) -> Value {
    if text.starts_with('[') || text.starts_with('{') {
        if let Ok(parsed) = serde_json::from_str(&text) {
            return parsed;
        }
    }
    Value::String(text)
}

/// Convert a stored direct-column value back into JSON
pub fn from_sql_value(value: SqlValue, field_type: Option<FieldType>) -> Value {
    match (value, field_type) {
        (SqlValue::Null, _) => Value::Null,
        (SqlValue::Integer(i), Some(FieldType::Boolean)) => Value::Bool(i != 0),
        (SqlValue::Text(text), Some(ft)) if ft.is_textual() => sniff_json(text),
        (SqlValue::Integer(i), _) => Value::Number(i.into()),
        (SqlValue::Real(f), _) => real_to_json(f),
        (SqlValue::Text(text), _) => Value::String(text),
        (SqlValue::Blob(bytes), _) => Value::String(String::from_utf8_lossy(&bytes).into_owned()),
    }
}

/// Whole floats come back as integers, the way a widened INTEGER was written
fn real_to_json(f: f64) -> Value {
    if f.fract() == 0.0 && f >= i64::MIN as f64 && f < i64::MAX as f64 {
        return Value::Number((f as i64).into());
    }
    Number::from_f64(f).map_or(Value::Null, Value::Number)
}

/// Integer key held by a foreign-key column, if any
pub fn as_row_id(value: &SqlValue) -> Option<i64> {
    match value {
        SqlValue::Integer(i) => Some(*i),
        SqlValue::Real(f) if f.fract() == 0.0 => Some(*f as i64),
        SqlValue::Text(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_to_sql_value() {
        assert_eq!(to_sql_value(&json!(30)), SqlValue::Integer(30));
        assert_eq!(to_sql_value(&json!(5.5)), SqlValue::Real(5.5));
        assert_eq!(to_sql_value(&json!(true)), SqlValue::Integer(1));
        assert_eq!(to_sql_value(&json!(null)), SqlValue::Null);
        assert_eq!(
            to_sql_value(&json!([1, 2, 3])),
            SqlValue::Text("[1,2,3]".to_string())
        );
        assert_eq!(
            to_sql_value(&json!({"b": 1, "a": 2})),
            SqlValue::Text(r#"{"a":2,"b":1}"#.to_string())
        );
    }

    #[test]
    fn test_symbol_text() {
        assert_eq!(symbol_text(&json!("plain")), Some("plain".to_string()));
        assert_eq!(symbol_text(&json!([])), Some("[]".to_string()));
        assert_eq!(symbol_text(&json!(null)), None);
    }

    #[test]
    fn test_sniff_json() {
        assert_eq!(sniff_json("[1,2]".into()), json!([1, 2]));
        assert_eq!(sniff_json("{\"a\":1}".into()), json!({"a": 1}));
        assert_eq!(sniff_json("{not json".into()), json!("{not json"));
        assert_eq!(sniff_json("42".into()), json!("42"));
    }

    #[test]
    fn test_from_sql_value_respects_declared_type() {
        assert_eq!(
            from_sql_value(SqlValue::Integer(1), Some(FieldType::Boolean)),
            json!(true)
        );
        assert_eq!(
            from_sql_value(SqlValue::Integer(7), Some(FieldType::Integer)),
            json!(7)
        );
        assert_eq!(
            from_sql_value(SqlValue::Text("[17]".into()), Some(FieldType::Json)),
            json!([17])
        );
        // Non-textual columns are never sniffed
        assert_eq!(
            from_sql_value(SqlValue::Text("[17]".into()), Some(FieldType::Real)),
            json!("[17]")
        );
        assert_eq!(
            from_sql_value(SqlValue::Real(7.1), Some(FieldType::Real)),
            json!(7.1)
        );
    }

    #[test]
    fn test_whole_reals_read_back_as_integers() {
        assert_eq!(from_sql_value(SqlValue::Real(0.0), Some(FieldType::Real)), json!(0));
        assert_eq!(from_sql_value(SqlValue::Real(-3.0), Some(FieldType::Real)), json!(-3));
        assert_eq!(from_sql_value(SqlValue::Real(5.5), Some(FieldType::Real)), json!(5.5));
        assert_eq!(from_sql_value(SqlValue::Real(1e300), Some(FieldType::Real)), json!(1e300));
    }

    #[test]
    fn test_as_row_id() {
        assert_eq!(as_row_id(&SqlValue::Integer(3)), Some(3));
        assert_eq!(as_row_id(&SqlValue::Text("12".into())), Some(12));
        assert_eq!(as_row_id(&SqlValue::Null), None);
    }
}
