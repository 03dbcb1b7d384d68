//! Binding JSON tool arguments to statement parameters
//!
//! Values are always sent as bound parameters. Each JSON value is converted
//! to the Rust type matching the parameter type PostgreSQL inferred when the
//! statement was prepared; JSON `null` binds SQL `NULL` of that type.

use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use rust_decimal::Decimal;
use serde_json::Value;
use thiserror::Error;
use tokio_postgres::types::{ToSql, Type};
use uuid::Uuid;

pub type BoxedParam = Box<dyn ToSql + Sync + Send>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BindError {
    #[error("Statement expects {expected} parameters but {given} were supplied")]
    Arity { expected: usize, given: usize },

    #[error("Parameter ${position} expects {expected}, got {value}")]
    Incompatible {
        position: usize,
        expected: String,
        value: String,
    },

    #[error(
        "Parameter ${position} has unsupported type {type_name}; \
         cast it in the query, e.g. ${position}::text"
    )]
    Unsupported { position: usize, type_name: String },
}

/// Convert `values` to parameters for a statement with parameter `types`.
pub fn bind_params(values: &[Value], types: &[Type]) -> Result<Vec<BoxedParam>, BindError> {
    if values.len() != types.len() {
        return Err(BindError::Arity {
            expected: types.len(),
            given: values.len(),
        });
    }
    values
        .iter()
        .zip(types)
        .enumerate()
        .map(|(idx, (value, ty))| bind_one(idx + 1, value, ty))
        .collect()
}

fn bind_one(position: usize, value: &Value, ty: &Type) -> Result<BoxedParam, BindError> {
    let param: BoxedParam = match *ty {
        Type::BOOL => Box::new(convert(position, value, ty, as_bool)?),
        Type::INT2 => Box::new(convert(position, value, ty, |v| {
            as_i64(v).and_then(|n| i16::try_from(n).ok())
        })?),
        Type::INT4 => Box::new(convert(position, value, ty, |v| {
            as_i64(v).and_then(|n| i32::try_from(n).ok())
        })?),
        Type::INT8 => Box::new(convert(position, value, ty, as_i64)?),
        Type::OID => Box::new(convert(position, value, ty, |v| {
            as_i64(v).and_then(|n| u32::try_from(n).ok())
        })?),
        Type::FLOAT4 => Box::new(convert(position, value, ty, |v| as_f64(v).map(|f| f as f32))?),
        Type::FLOAT8 => Box::new(convert(position, value, ty, as_f64)?),
        Type::NUMERIC => Box::new(convert(position, value, ty, as_decimal)?),
        Type::TEXT | Type::VARCHAR | Type::BPCHAR | Type::NAME | Type::UNKNOWN => {
            Box::new(convert(position, value, ty, as_text)?)
        }
        Type::JSON | Type::JSONB => Box::new(convert(position, value, ty, |v| Some(v.clone()))?),
        Type::UUID => Box::new(convert(position, value, ty, |v| {
            v.as_str().and_then(|s| Uuid::parse_str(s).ok())
        })?),
        Type::DATE => Box::new(convert(position, value, ty, |v| {
            v.as_str()
                .and_then(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok())
        })?),
        Type::TIMESTAMP => Box::new(convert(position, value, ty, as_naive_datetime)?),
        Type::TIMESTAMPTZ => Box::new(convert(position, value, ty, |v| {
            v.as_str()
                .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                .map(|dt| dt.with_timezone(&Utc))
        })?),
        _ => {
            return Err(BindError::Unsupported {
                position,
                type_name: ty.name().to_string(),
            })
        }
    };
    Ok(param)
}

/// `null` → `None`; anything else must convert or the bind fails.
fn convert<T>(
    position: usize,
    value: &Value,
    ty: &Type,
    f: impl Fn(&Value) -> Option<T>,
) -> Result<Option<T>, BindError> {
    if value.is_null() {
        return Ok(None);
    }
    f(value).map(Some).ok_or_else(|| BindError::Incompatible {
        position,
        expected: ty.name().to_string(),
        value: value.to_string(),
    })
}

fn as_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::String(s) => match s.to_ascii_lowercase().as_str() {
            "true" | "t" => Some(true),
            "false" | "f" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

fn as_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn as_decimal(value: &Value) -> Option<Decimal> {
    let text = match value {
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.trim().to_string(),
        _ => return None,
    };
    Decimal::from_str(&text)
        .or_else(|_| Decimal::from_scientific(&text))
        .ok()
}

/// Scalars are sent as their text form; objects and arrays as JSON text.
fn as_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

fn as_naive_datetime(value: &Value) -> Option<NaiveDateTime> {
    let s = value.as_str()?;
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
}
