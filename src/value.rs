// ABOUTME: Tagged column values and ordered rows read from a table source
// ABOUTME: The encoder pattern-matches these instead of inspecting driver types

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use rust_decimal::Decimal;
use serde_json::Value as JsonValue;
use std::fmt;

/// Numeric column value, kept in the representation the source delivered it in
#[derive(Debug, Clone, PartialEq)]
pub enum Number {
    Integer(i64),
    Float(f64),
    /// `real`; kept narrow so its shortest text is the `f32` one
    Float32(f32),
    Decimal(Numeric),
}

/// Exact text of an arbitrary-precision decimal, never rounded
///
/// Holds `[-]digits[.digits]` or one of `NaN`, `Infinity` and `-Infinity`.
///
/// ```
/// # use pg_insert_export::value::Numeric;
/// assert_eq!(Numeric::parse("-0.000000000000000000000000000001").unwrap().as_str(),
///            "-0.000000000000000000000000000001");
/// assert!(!Numeric::parse("NaN").unwrap().is_finite());
/// assert!(Numeric::parse("1e5").is_none());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Numeric(String);

impl Numeric {
    pub fn parse(text: &str) -> Option<Self> {
        if matches!(text, "NaN" | "Infinity" | "-Infinity") {
            return Some(Self(text.to_string()));
        }

        let unsigned = text.strip_prefix('-').unwrap_or(text);
        let (int, frac) = match unsigned.split_once('.') {
            Some((int, frac)) => (int, Some(frac)),
            None => (unsigned, None),
        };
        let digits = |part: &str| !part.is_empty() && part.bytes().all(|b| b.is_ascii_digit());

        (digits(int) && frac.map_or(true, digits)).then(|| Self(text.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_finite(&self) -> bool {
        !matches!(self.0.as_str(), "NaN" | "Infinity" | "-Infinity")
    }
}

impl From<Decimal> for Numeric {
    fn from(v: Decimal) -> Self {
        Self(v.to_string())
    }
}

impl fmt::Display for Numeric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Point-in-time column value
#[derive(Debug, Clone, PartialEq)]
pub enum Timestamp {
    /// `timestamptz`, normalized to UTC
    WithTimeZone(DateTime<Utc>),
    /// `timestamp` without time zone
    Naive(NaiveDateTime),
    Date(NaiveDate),
}

/// One column value of a row
///
/// `Unsupported` carries the source type name of a value that has no
/// portable literal. It is only legal in excluded columns; anywhere else the
/// encoder rejects it.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Number(Number),
    Timestamp(Timestamp),
    Text(String),
    Json(JsonValue),
    Unsupported { type_name: String },
}

impl Value {
    pub fn unsupported(type_name: impl Into<String>) -> Self {
        Value::Unsupported {
            type_name: type_name.into(),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Number(Number::Integer(v.into()))
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Number(Number::Integer(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Number(Number::Float(v))
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::Number(Number::Float32(v))
    }
}

impl From<Numeric> for Value {
    fn from(v: Numeric) -> Self {
        Value::Number(Number::Decimal(v))
    }
}

impl From<Decimal> for Value {
    fn from(v: Decimal) -> Self {
        Numeric::from(v).into()
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(v: DateTime<Utc>) -> Self {
        Value::Timestamp(Timestamp::WithTimeZone(v))
    }
}

impl From<NaiveDateTime> for Value {
    fn from(v: NaiveDateTime) -> Self {
        Value::Timestamp(Timestamp::Naive(v))
    }
}

impl From<NaiveDate> for Value {
    fn from(v: NaiveDate) -> Self {
        Value::Timestamp(Timestamp::Date(v))
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<JsonValue> for Value {
    fn from(v: JsonValue) -> Self {
        Value::Json(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

/// Ordered column → value mapping for one fetched row
///
/// Column order is the order the source returned the columns in and becomes
/// the column list of the generated INSERT.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    columns: Vec<(String, Value)>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            columns: Vec::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, column: impl Into<String>, value: impl Into<Value>) {
        self.columns.push((column.into(), value.into()));
    }

    /// Builder form of [`Row::push`]
    pub fn with(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.push(column, value);
        self
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.columns
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value)
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|(name, _)| name.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.columns.iter().map(|(name, value)| (name.as_str(), value))
    }

    /// True when this row has exactly `columns`, in that order
    pub fn has_columns(&self, columns: &[String]) -> bool {
        self.columns.len() == columns.len()
            && self
                .columns
                .iter()
                .zip(columns)
                .all(|((name, _), expected)| name == expected)
    }
}

impl FromIterator<(String, Value)> for Row {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self {
            columns: iter.into_iter().collect(),
        }
    }
}
