//! Conversion of driver rows into JSON objects

use std::fmt::Display;

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tokio_postgres::types::{FromSql, Type};
use tokio_postgres::Row;
use uuid::Uuid;

use crate::types::RowMap;
use crate::wire::{PgInet, PgInterval, PgNumeric};

/// Convert a row into a column-ordered JSON object.
///
/// Columns sharing a name (e.g. two `?column?`s) collapse to the last one;
/// the statement's column list still reports every column.
pub fn row_to_json(row: &Row) -> RowMap {
    let mut map = RowMap::with_capacity(row.len());
    for (idx, column) in row.columns().iter().enumerate() {
        map.insert(column.name().to_string(), cell_to_json(row, idx, column.type_()));
    }
    map
}

/// Decode one cell. Never fails: undecodable values become a placeholder.
pub fn cell_to_json(row: &Row, idx: usize, ty: &Type) -> Value {
    decode(row, idx, ty).unwrap_or_else(|e| {
        tracing::debug!("Failed to decode column {} ({}): {}", idx, ty.name(), e);
        Value::String(format!("<unreadable {}>", ty.name()))
    })
}

fn decode(row: &Row, idx: usize, ty: &Type) -> Result<Value, tokio_postgres::Error> {
    let value = match *ty {
        Type::BOOL => to_json(row.try_get::<_, Option<bool>>(idx)?),
        Type::INT2 => to_json(row.try_get::<_, Option<i16>>(idx)?),
        Type::INT4 => to_json(row.try_get::<_, Option<i32>>(idx)?),
        Type::INT8 => to_json(row.try_get::<_, Option<i64>>(idx)?),
        Type::OID => to_json(row.try_get::<_, Option<u32>>(idx)?),
        Type::FLOAT4 => to_json(row.try_get::<_, Option<f32>>(idx)?),
        Type::FLOAT8 => to_json(row.try_get::<_, Option<f64>>(idx)?),
        // Rendered as a string so no precision is lost in transit.
        Type::NUMERIC => display::<PgNumeric>(row, idx)?,
        Type::INTERVAL => display::<PgInterval>(row, idx)?,
        Type::INET | Type::CIDR => display::<PgInet>(row, idx)?,
        Type::CHAR => to_json(row.try_get::<_, Option<i8>>(idx)?.map(render_char)),
        Type::TEXT | Type::VARCHAR | Type::BPCHAR | Type::NAME | Type::UNKNOWN => {
            to_json(row.try_get::<_, Option<String>>(idx)?)
        }
        Type::JSON | Type::JSONB => row
            .try_get::<_, Option<Value>>(idx)?
            .unwrap_or(Value::Null),
        Type::UUID => to_json(row.try_get::<_, Option<Uuid>>(idx)?),
        Type::DATE => to_json(row.try_get::<_, Option<NaiveDate>>(idx)?),
        Type::TIME => to_json(row.try_get::<_, Option<NaiveTime>>(idx)?),
        Type::TIMESTAMP => to_json(row.try_get::<_, Option<NaiveDateTime>>(idx)?),
        Type::TIMESTAMPTZ => to_json(row.try_get::<_, Option<DateTime<Utc>>>(idx)?),
        Type::BYTEA => to_json(
            row.try_get::<_, Option<Vec<u8>>>(idx)?
                .map(|b| bytea_placeholder(b.len())),
        ),
        Type::BOOL_ARRAY => to_json(row.try_get::<_, Option<Vec<Option<bool>>>>(idx)?),
        Type::INT2_ARRAY => to_json(row.try_get::<_, Option<Vec<Option<i16>>>>(idx)?),
        Type::INT4_ARRAY => to_json(row.try_get::<_, Option<Vec<Option<i32>>>>(idx)?),
        Type::INT8_ARRAY => to_json(row.try_get::<_, Option<Vec<Option<i64>>>>(idx)?),
        Type::FLOAT4_ARRAY => to_json(row.try_get::<_, Option<Vec<Option<f32>>>>(idx)?),
        Type::FLOAT8_ARRAY => to_json(row.try_get::<_, Option<Vec<Option<f64>>>>(idx)?),
        Type::NUMERIC_ARRAY => display_array::<PgNumeric>(row, idx)?,
        Type::TEXT_ARRAY | Type::VARCHAR_ARRAY | Type::BPCHAR_ARRAY | Type::NAME_ARRAY => {
            to_json(row.try_get::<_, Option<Vec<Option<String>>>>(idx)?)
        }
        Type::DATE_ARRAY => to_json(row.try_get::<_, Option<Vec<Option<NaiveDate>>>>(idx)?),
        Type::TIME_ARRAY => to_json(row.try_get::<_, Option<Vec<Option<NaiveTime>>>>(idx)?),
        Type::TIMESTAMP_ARRAY => {
            to_json(row.try_get::<_, Option<Vec<Option<NaiveDateTime>>>>(idx)?)
        }
        Type::TIMESTAMPTZ_ARRAY => {
            to_json(row.try_get::<_, Option<Vec<Option<DateTime<Utc>>>>>(idx)?)
        }
        Type::INTERVAL_ARRAY => display_array::<PgInterval>(row, idx)?,
        Type::INET_ARRAY | Type::CIDR_ARRAY => display_array::<PgInet>(row, idx)?,
        Type::UUID_ARRAY => to_json(row.try_get::<_, Option<Vec<Option<Uuid>>>>(idx)?),
        Type::JSONB_ARRAY | Type::JSON_ARRAY => {
            to_json(row.try_get::<_, Option<Vec<Option<Value>>>>(idx)?)
        }
        // citext and friends decode as strings; anything else gets a marker.
        _ => match row.try_get::<_, Option<String>>(idx) {
            Ok(text) => to_json(text),
            Err(_) => Value::String(format!("<unsupported type {}>", ty.name())),
        },
    };
    Ok(value)
}

fn display<'a, T>(row: &'a Row, idx: usize) -> Result<Value, tokio_postgres::Error>
where
    T: FromSql<'a> + Display,
{
    let value = row.try_get::<_, Option<T>>(idx)?;
    Ok(to_json(value.map(|v| v.to_string())))
}

fn display_array<'a, T>(row: &'a Row, idx: usize) -> Result<Value, tokio_postgres::Error>
where
    T: FromSql<'a> + Display,
{
    let items = row.try_get::<_, Option<Vec<Option<T>>>>(idx)?;
    Ok(to_json(items.map(|items| {
        items
            .into_iter()
            .map(|item| item.map(|v| v.to_string()))
            .collect::<Vec<_>>()
    })))
}

fn to_json<T: Serialize>(value: Option<T>) -> Value {
    value
        .and_then(|v| serde_json::to_value(v).ok())
        .unwrap_or(Value::Null)
}

/// The single-byte `"char"` type used throughout `pg_catalog`.
fn render_char(byte: i8) -> String {
    char::from(byte as u8).to_string()
}

fn bytea_placeholder(len: usize) -> String {
    format!("<bytea {} bytes>", len)
}
