// ABOUTME: Converts tokio-postgres rows into export rows
// ABOUTME: Decodes each column from its wire bytes; values that cannot be decoded become Unsupported

use crate::value::{Numeric, Row, Value};
use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde_json::Value as JsonValue;
use tokio_postgres::types::{FromSql, Kind, Type};

type DecodeError = Box<dyn std::error::Error + Sync + Send>;

const NUMERIC_POS: u16 = 0x0000;
const NUMERIC_NEG: u16 = 0x4000;
const NUMERIC_NAN: u16 = 0xC000;
const NUMERIC_PINF: u16 = 0xD000;
const NUMERIC_NINF: u16 = 0xF000;

/// Convert one result row, keeping the column order of the query
///
/// Supported types:
/// - BOOL → boolean
/// - INT2, INT4, INT8, OID → integer
/// - FLOAT4 → `f32`, FLOAT8 → `f64` (non-finite values preserved)
/// - NUMERIC → exact decimal text, any precision
/// - TIMESTAMPTZ, TIMESTAMP, DATE → timestamps
/// - TEXT, VARCHAR, BPCHAR, NAME, citext, enums → text
/// - UUID → text
/// - JSON, JSONB → structured JSON, numbers kept digit for digit
///
/// Any other type, and any value the driver cannot decode (such as an
/// `'infinity'` timestamp), is carried as [`Value::Unsupported`] so the
/// encoder can name the column that stopped the export.
pub fn convert_row(row: &tokio_postgres::Row) -> Result<Row> {
    let mut converted = Row::with_capacity(row.len());

    for (idx, column) in row.columns().iter().enumerate() {
        let raw = row
            .try_get::<_, RawValue<'_>>(idx)
            .with_context(|| format!("Failed to read column '{}'", column.name()))?;
        converted.push(column.name(), convert_value(column.type_(), raw.0));
    }

    Ok(converted)
}

/// Wire bytes of any column, `None` for NULL
struct RawValue<'a>(Option<&'a [u8]>);

impl<'a> FromSql<'a> for RawValue<'a> {
    fn from_sql(_ty: &Type, raw: &'a [u8]) -> std::result::Result<Self, DecodeError> {
        Ok(RawValue(Some(raw)))
    }

    fn from_sql_null(_ty: &Type) -> std::result::Result<Self, DecodeError> {
        Ok(RawValue(None))
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }
}

/// Convert one value in binary wire format
pub fn convert_value(ty: &Type, raw: Option<&[u8]>) -> Value {
    let Some(raw) = raw else {
        return Value::Null;
    };

    match decode(ty, raw) {
        Some(Ok(value)) => value,
        Some(Err(e)) => {
            tracing::debug!("Cannot decode {} value: {}", ty.name(), e);
            Value::unsupported(format!("{} ({})", ty.name(), e))
        }
        None => Value::unsupported(ty.name()),
    }
}

fn decode(ty: &Type, raw: &[u8]) -> Option<std::result::Result<Value, DecodeError>> {
    let value = match *ty {
        Type::BOOL => bool::from_sql(ty, raw).map(Value::from),
        Type::INT2 => i16::from_sql(ty, raw).map(|v| Value::from(i64::from(v))),
        Type::INT4 => i32::from_sql(ty, raw).map(Value::from),
        Type::INT8 => i64::from_sql(ty, raw).map(Value::from),
        Type::OID => u32::from_sql(ty, raw).map(|v| Value::from(i64::from(v))),
        Type::FLOAT4 => f32::from_sql(ty, raw).map(Value::from),
        Type::FLOAT8 => f64::from_sql(ty, raw).map(Value::from),
        Type::NUMERIC => decode_numeric(raw).map(Value::from),
        Type::TIMESTAMPTZ => DateTime::<Utc>::from_sql(ty, raw).map(Value::from),
        Type::TIMESTAMP => NaiveDateTime::from_sql(ty, raw).map(Value::from),
        Type::DATE => NaiveDate::from_sql(ty, raw).map(Value::from),
        Type::UUID => uuid::Uuid::from_sql(ty, raw).map(|u| Value::from(u.to_string())),
        Type::JSON | Type::JSONB => JsonValue::from_sql(ty, raw).map(Value::from),
        _ if is_textual(ty) => String::from_sql(ty, raw).map(Value::from),
        _ => return None,
    };
    Some(value)
}

/// Types whose binary form is their UTF-8 text
fn is_textual(ty: &Type) -> bool {
    matches!(*ty, Type::TEXT | Type::VARCHAR | Type::BPCHAR | Type::NAME)
        || ty.name() == "citext"
        || matches!(ty.kind(), Kind::Enum(_))
}

/// Render a binary `numeric` as the same text PostgreSQL prints for it
///
/// Layout: ndigits, weight, sign and display scale as 16-bit words,
/// followed by ndigits base-10000 digits, most significant first. The
/// first digit is worth `10000^weight`.
fn decode_numeric(raw: &[u8]) -> std::result::Result<Numeric, DecodeError> {
    let word = |i: usize| -> std::result::Result<u16, DecodeError> {
        raw.get(i * 2..i * 2 + 2)
            .map(|b| u16::from_be_bytes([b[0], b[1]]))
            .ok_or_else(|| "numeric value is truncated".into())
    };

    let ndigits = usize::from(word(0)?);
    let weight = i32::from(word(1)? as i16);
    let sign = word(2)?;
    let dscale = usize::from(word(3)?);

    let special = match sign {
        NUMERIC_POS | NUMERIC_NEG => None,
        NUMERIC_NAN => Some("NaN"),
        NUMERIC_PINF => Some("Infinity"),
        NUMERIC_NINF => Some("-Infinity"),
        other => return Err(format!("invalid numeric sign 0x{:04x}", other).into()),
    };
    if let Some(text) = special {
        return Numeric::parse(text).ok_or_else(|| "invalid numeric".into());
    }

    let digits = (0..ndigits)
        .map(|i| match word(4 + i)? {
            d if d > 9999 => Err(format!("invalid numeric digit {}", d).into()),
            d => Ok(d),
        })
        .collect::<std::result::Result<Vec<u16>, DecodeError>>()?;
    let digit = |pos: i32| -> u16 {
        usize::try_from(pos)
            .ok()
            .and_then(|pos| digits.get(pos).copied())
            .unwrap_or(0)
    };

    let mut text = String::new();
    if sign == NUMERIC_NEG {
        text.push('-');
    }

    if weight < 0 {
        text.push('0');
    } else {
        text.push_str(&digit(0).to_string());
        for pos in 1..=weight {
            text.push_str(&format!("{:04}", digit(pos)));
        }
    }

    if dscale > 0 {
        let mut fraction = String::with_capacity(dscale + 4);
        let mut pos = weight + 1;
        while fraction.len() < dscale {
            fraction.push_str(&format!("{:04}", digit(pos)));
            pos += 1;
        }
        fraction.truncate(dscale);
        text.push('.');
        text.push_str(&fraction);
    }

    Numeric::parse(&text).ok_or_else(|| format!("invalid numeric text '{}'", text).into())
}
