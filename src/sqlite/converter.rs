// ABOUTME: SQLite to export value conversion
// ABOUTME: Maps storage classes to values and parses JSON text in designated columns

use crate::table_spec::{ColumnKind, TableSpec};
use crate::value::{Row, Value};
use anyhow::{bail, Result};
use serde_json::Value as JsonValue;

/// Convert a single SQLite value
///
/// - INTEGER → integer
/// - REAL → float
/// - TEXT → text, or parsed JSON when the column is JSON-designated
/// - BLOB → unsupported (binary payloads have no portable literal here)
/// - NULL → NULL
///
/// SQLite stores JSON as TEXT, so designated columns are parsed here;
/// text that is not valid JSON stays text and is exported quoted.
///
/// # Examples
///
/// ```
/// # use pg_insert_export::sqlite::converter::sqlite_value_to_value;
/// # use pg_insert_export::table_spec::{ColumnKind, JsonCast};
/// # use pg_insert_export::value::Value;
/// # use rusqlite::types::Value as SqliteValue;
/// let v = sqlite_value_to_value(SqliteValue::Text("{\"a\":1}".into()), ColumnKind::Json(JsonCast::Jsonb));
/// assert_eq!(v, Value::Json(serde_json::json!({"a": 1})));
/// ```
pub fn sqlite_value_to_value(value: rusqlite::types::Value, kind: ColumnKind) -> Value {
    use rusqlite::types::Value as SqliteValue;

    match value {
        SqliteValue::Null => Value::Null,
        SqliteValue::Integer(i) => i.into(),
        SqliteValue::Real(f) => f.into(),
        SqliteValue::Text(text) => match kind {
            ColumnKind::Json(_) => match serde_json::from_str::<JsonValue>(&text) {
                Ok(json) => Value::Json(json),
                Err(e) => {
                    tracing::debug!("JSON column holds non-JSON text ({}); exporting as text", e);
                    Value::Text(text)
                }
            },
            _ => Value::Text(text),
        },
        SqliteValue::Blob(_) => Value::unsupported("blob"),
    }
}

/// Zip column names with one row's raw values
pub fn sqlite_row_to_row(
    spec: &TableSpec,
    columns: &[String],
    values: Vec<rusqlite::types::Value>,
) -> Result<Row> {
    if values.len() != columns.len() {
        bail!(
            "Row of '{}' has {} values for {} columns",
            spec.table(),
            values.len(),
            columns.len()
        );
    }

    Ok(columns
        .iter()
        .zip(values)
        .map(|(column, value)| {
            let converted = sqlite_value_to_value(value, spec.column_kind(column));
            (column.clone(), converted)
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table_spec::JsonCast;
    use rusqlite::types::Value as SqliteValue;

    #[test]
    fn test_storage_classes() {
        assert_eq!(
            sqlite_value_to_value(SqliteValue::Null, ColumnKind::Plain),
            Value::Null
        );
        assert_eq!(
            sqlite_value_to_value(SqliteValue::Integer(42), ColumnKind::Plain),
            Value::from(42i64)
        );
        assert_eq!(
            sqlite_value_to_value(SqliteValue::Real(1.5), ColumnKind::Plain),
            Value::from(1.5)
        );
        assert_eq!(
            sqlite_value_to_value(SqliteValue::Text("{}".into()), ColumnKind::Plain),
            Value::Text("{}".into())
        );
        assert_eq!(
            sqlite_value_to_value(SqliteValue::Blob(vec![1, 2]), ColumnKind::Plain),
            Value::unsupported("blob")
        );
    }

    #[test]
    fn test_json_column_with_invalid_json_stays_text() {
        assert_eq!(
            sqlite_value_to_value(
                SqliteValue::Text("not json".into()),
                ColumnKind::Json(JsonCast::Json)
            ),
            Value::Text("not json".into())
        );
    }

    #[test]
    fn test_row_conversion_checks_arity() {
        let mut spec = TableSpec::parse_cli("widgets", 10).unwrap();
        spec.add_json_column("meta".into()).unwrap();
        let columns = vec!["id".to_string(), "meta".to_string()];

        let row = sqlite_row_to_row(
            &spec,
            &columns,
            vec![SqliteValue::Integer(1), SqliteValue::Text("[1,2]".into())],
        )
        .unwrap();
        assert_eq!(row.get("meta"), Some(&Value::Json(serde_json::json!([1, 2]))));

        assert!(sqlite_row_to_row(&spec, &columns, vec![SqliteValue::Null]).is_err());
    }
}
