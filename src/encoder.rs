// ABOUTME: Converts one column value into its SQL literal text
// ABOUTME: Pure and deterministic; no I/O, no driver types

use crate::table_spec::ColumnKind;
use crate::value::{Number, Timestamp, Value};
use chrono::SecondsFormat;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EncodeError {
    #[error("unsupported value type '{0}'")]
    Unsupported(String),
}

/// Encode `value` as a SQL literal for a column of the given kind
///
/// Rules, first match wins:
/// 1. excluded column → `NULL`
/// 2. null → `NULL`
/// 3. bool → `TRUE` / `FALSE`
/// 4. number → canonical decimal text, unquoted
/// 5. timestamp → quoted ISO-8601
/// 6. JSON value in a JSON column → `'<json>'::jsonb` (or `::json`)
/// 7. anything textual → quoted with `'` doubled
///
/// Values the source could not map are refused rather than guessed.
pub fn encode_value(value: &Value, kind: ColumnKind) -> Result<String, EncodeError> {
    if kind == ColumnKind::Excluded {
        return Ok("NULL".to_string());
    }

    let literal = match value {
        Value::Null => "NULL".to_string(),
        Value::Bool(true) => "TRUE".to_string(),
        Value::Bool(false) => "FALSE".to_string(),
        Value::Number(number) => encode_number(number),
        Value::Timestamp(ts) => quote_literal(&format_timestamp(ts)),
        Value::Json(json) => match kind {
            ColumnKind::Json(cast) => format!("{}::{}", quote_literal(&json.to_string()), cast.as_sql()),
            _ => quote_literal(&json.to_string()),
        },
        Value::Text(text) => quote_literal(text),
        Value::Unsupported { type_name } => return Err(EncodeError::Unsupported(type_name.clone())),
    };

    Ok(literal)
}

/// Wrap `text` in single quotes, doubling every embedded quote
///
/// ```
/// # use pg_insert_export::encoder::quote_literal;
/// assert_eq!(quote_literal("O'Brien"), "'O''Brien'");
/// assert_eq!(quote_literal(""), "''");
/// ```
pub fn quote_literal(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    out.push('\'');
    for ch in text.chars() {
        if ch == '\'' {
            out.push('\'');
        }
        out.push(ch);
    }
    out.push('\'');
    out
}

fn encode_number(number: &Number) -> String {
    match number {
        Number::Integer(i) => i.to_string(),
        // Display is the shortest text that parses back to the same value
        Number::Float(f) => float_literal(f.to_string()),
        Number::Float32(f) => float_literal(f.to_string()),
        Number::Decimal(n) if n.is_finite() => n.as_str().to_string(),
        Number::Decimal(n) => quote_literal(n.as_str()),
    }
}

/// Non-finite floats have no unquoted literal; use the quoted input syntax
fn float_literal(text: String) -> String {
    match text.as_str() {
        "NaN" => "'NaN'".to_string(),
        "inf" => "'Infinity'".to_string(),
        "-inf" => "'-Infinity'".to_string(),
        _ => text,
    }
}

/// ISO-8601 text of a timestamp, with only as many fraction digits as needed
pub fn format_timestamp(ts: &Timestamp) -> String {
    match ts {
        Timestamp::WithTimeZone(dt) => dt.to_rfc3339_opts(SecondsFormat::AutoSi, true),
        Timestamp::Naive(dt) => dt.format("%Y-%m-%dT%H:%M:%S%.f").to_string(),
        Timestamp::Date(d) => d.format("%Y-%m-%d").to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table_spec::JsonCast;
    use crate::value::Numeric;
    use chrono::{NaiveDate, TimeZone, Utc};
    use rust_decimal::Decimal;
    use serde_json::json;
    use std::str::FromStr;

    fn plain(value: impl Into<Value>) -> String {
        encode_value(&value.into(), ColumnKind::Plain).unwrap()
    }

    #[test]
    fn null_and_empty_string_never_collide() {
        assert_eq!(plain(Value::Null), "NULL");
        assert_eq!(plain(""), "''");
    }

    #[test]
    fn booleans_are_unquoted_keywords() {
        assert_eq!(plain(true), "TRUE");
        assert_eq!(plain(false), "FALSE");
    }

    #[test]
    fn quotes_are_doubled() {
        assert_eq!(plain("O'Brien"), "'O''Brien'");
        assert_eq!(plain("'"), "''''");
        assert_eq!(plain("'''"), "''''''''");
        assert_eq!(plain("no quotes"), "'no quotes'");
    }

    #[test]
    fn text_keeps_backslashes_and_newlines_verbatim() {
        assert_eq!(plain("C:\\temp\nline2"), "'C:\\temp\nline2'");
    }

    #[test]
    fn integers_and_floats() {
        assert_eq!(plain(42i64), "42");
        assert_eq!(plain(-7i32), "-7");
        assert_eq!(plain(i64::MIN), "-9223372036854775808");
        assert_eq!(plain(0.1f64), "0.1");
        assert_eq!(plain(2.5f64), "2.5");
        assert_eq!(plain(1e21f64), "1000000000000000000000");
    }

    #[test]
    fn non_finite_floats_use_quoted_input_syntax() {
        assert_eq!(plain(f64::NAN), "'NaN'");
        assert_eq!(plain(f64::INFINITY), "'Infinity'");
        assert_eq!(plain(f64::NEG_INFINITY), "'-Infinity'");
    }

    #[test]
    fn non_finite_reals_use_quoted_input_syntax() {
        assert_eq!(plain(f32::NAN), "'NaN'");
        assert_eq!(plain(f32::NEG_INFINITY), "'-Infinity'");
    }

    #[test]
    fn reals_use_their_own_shortest_text() {
        assert_eq!(plain(0.1f32), "0.1");
        assert_eq!(plain(-3.25f32), "-3.25");
        assert_eq!(plain(16777216f32), "16777216");
    }

    #[test]
    fn decimals_keep_their_scale() {
        let d = Decimal::from_str("10.50").unwrap();
        assert_eq!(plain(d), "10.50");
        let d = Decimal::from_str("-0.000123456789").unwrap();
        assert_eq!(plain(d), "-0.000123456789");
    }

    #[test]
    fn numerics_beyond_decimal_precision_are_exact() {
        for text in [
            "12345678901234567890.1234567890123",
            "0.000000000000000000000000000001",
            "10000000000000000000000000000000000000000",
        ] {
            assert_eq!(plain(Numeric::parse(text).unwrap()), text);
        }
        assert_eq!(plain(Numeric::parse("NaN").unwrap()), "'NaN'");
        assert_eq!(plain(Numeric::parse("-Infinity").unwrap()), "'-Infinity'");
    }

    #[test]
    fn timestamps_are_quoted_iso8601() {
        let dt = Utc.with_ymd_and_hms(2024, 3, 5, 14, 30, 0).unwrap();
        assert_eq!(plain(dt), "'2024-03-05T14:30:00Z'");

        let dt = dt + chrono::Duration::milliseconds(123);
        assert_eq!(plain(dt), "'2024-03-05T14:30:00.123Z'");

        let dt = dt + chrono::Duration::microseconds(456);
        assert_eq!(plain(dt), "'2024-03-05T14:30:00.123456Z'");
    }

    #[test]
    fn naive_timestamps_and_dates() {
        let date = NaiveDate::from_ymd_opt(2023, 12, 31).unwrap();
        assert_eq!(plain(date), "'2023-12-31'");

        let naive = date.and_hms_opt(23, 59, 58).unwrap();
        assert_eq!(plain(naive), "'2023-12-31T23:59:58'");

        let naive = date.and_hms_micro_opt(1, 2, 3, 500_000).unwrap();
        assert_eq!(plain(naive), "'2023-12-31T01:02:03.500'");
    }

    #[test]
    fn json_column_is_cast() {
        let value = Value::Json(json!({"b": 1, "a": "it's"}));
        let encoded = encode_value(&value, ColumnKind::Json(JsonCast::Jsonb)).unwrap();
        assert_eq!(encoded, r#"'{"a":"it''s","b":1}'::jsonb"#);

        let encoded = encode_value(&value, ColumnKind::Json(JsonCast::Json)).unwrap();
        assert!(encoded.ends_with("::json"));
    }

    #[test]
    fn json_numbers_keep_every_digit() {
        let value = Value::Json(
            serde_json::from_str(
                r#"{"amount": 12345678901234567890123, "price": 10.50, "id": 9007199254740993.5}"#,
            )
            .unwrap(),
        );
        assert_eq!(
            encode_value(&value, ColumnKind::Json(JsonCast::Jsonb)).unwrap(),
            r#"'{"amount":12345678901234567890123,"id":9007199254740993.5,"price":10.50}'::jsonb"#
        );
    }

    #[test]
    fn json_outside_json_column_is_plain_text() {
        let value = Value::Json(json!([1, 2]));
        assert_eq!(encode_value(&value, ColumnKind::Plain).unwrap(), "'[1,2]'");
    }

    #[test]
    fn scalars_in_json_column_follow_scalar_rules() {
        let kind = ColumnKind::Json(JsonCast::Jsonb);
        assert_eq!(encode_value(&Value::Null, kind).unwrap(), "NULL");
        assert_eq!(encode_value(&Value::Bool(true), kind).unwrap(), "TRUE");
    }

    #[test]
    fn excluded_column_is_always_null() {
        for value in [
            Value::from("payload"),
            Value::from(12i64),
            Value::Json(json!({"k": "v"})),
            Value::unsupported("bytea"),
            Value::Null,
        ] {
            assert_eq!(encode_value(&value, ColumnKind::Excluded).unwrap(), "NULL");
        }
    }

    #[test]
    fn unsupported_value_is_refused() {
        let err = encode_value(&Value::unsupported("interval"), ColumnKind::Plain).unwrap_err();
        assert_eq!(err, EncodeError::Unsupported("interval".to_string()));
    }
}
