//! Form value cleaning — submitted strings to typed column values.

use std::collections::HashMap;
use std::sync::LazyLock;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use regex::Regex;
use serde_json::{Number, Value};

use crate::error::{AdminError, AdminResult};
use crate::metadata::{ColumnMetadata, ColumnType, EntityMetadata, Record};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CleanMode {
    Create,
    Update,
}

static DECIMAL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[+-]?(\d+(\.\d*)?|\.\d+)([eE][+-]?\d+)?$").unwrap());

const TIMESTAMP_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
];

fn is_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "on" | "true" | "1" | "yes"
    )
}

fn parse_naive_timestamp(value: &str) -> Option<NaiveDateTime> {
    TIMESTAMP_FORMATS
        .iter()
        .find_map(|f| NaiveDateTime::parse_from_str(value, f).ok())
}

/// Convert one non-empty submitted value for `column`.
pub fn clean_value(column: &ColumnMetadata, raw: &str) -> AdminResult<Value> {
    let trimmed = raw.trim();
    let field = column.name.as_str();

    match &column.column_type {
        ColumnType::Boolean => Ok(Value::Bool(is_truthy(raw))),
        ColumnType::Integer => {
            let n: i64 = trimmed
                .parse()
                .map_err(|_| AdminError::invalid_field(field, "not an integer"))?;
            if i32::try_from(n).is_err() {
                return Err(AdminError::invalid_field(field, "integer out of range"));
            }
            Ok(Value::from(n))
        }
        ColumnType::BigInt => trimmed
            .parse::<i64>()
            .map(Value::from)
            .map_err(|_| AdminError::invalid_field(field, "not an integer")),
        ColumnType::Float => trimmed
            .parse::<f64>()
            .ok()
            .and_then(Number::from_f64)
            .map(Value::Number)
            .ok_or_else(|| AdminError::invalid_field(field, "not a number")),
        ColumnType::Numeric if DECIMAL.is_match(trimmed) => Ok(Value::String(trimmed.to_string())),
        ColumnType::Numeric => Err(AdminError::invalid_field(field, "not a decimal number")),
        ColumnType::Uuid => uuid::Uuid::parse_str(trimmed)
            .map(|u| Value::String(u.hyphenated().to_string()))
            .map_err(|_| AdminError::invalid_field(field, "not a UUID")),
        ColumnType::Date => NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
            .map(|d| Value::String(d.format("%Y-%m-%d").to_string()))
            .map_err(|_| AdminError::invalid_field(field, "expected YYYY-MM-DD")),
        ColumnType::Timestamp => parse_naive_timestamp(trimmed)
            .map(|t| Value::String(t.format("%Y-%m-%dT%H:%M:%S%.f").to_string()))
            .ok_or_else(|| AdminError::invalid_field(field, "expected YYYY-MM-DDTHH:MM[:SS]")),
        ColumnType::Timestamptz => DateTime::parse_from_rfc3339(trimmed)
            .map(|t| t.with_timezone(&Utc))
            .ok()
            .or_else(|| parse_naive_timestamp(trimmed).map(|t| t.and_utc()))
            .map(|t| Value::String(t.to_rfc3339()))
            .ok_or_else(|| AdminError::invalid_field(field, "expected an RFC 3339 timestamp")),
        ColumnType::Json => serde_json::from_str(raw)
            .map_err(|e| AdminError::invalid_field(field, format!("invalid JSON: {e}"))),
        ColumnType::Text | ColumnType::Other(_) => Ok(Value::String(raw.to_string())),
    }
}

/// Turn submitted form pairs into a record ready for persistence.
///
/// Keys that are not columns of the entity are dropped. Boolean columns
/// follow checkbox semantics: absent means false.
pub fn clean_values(
    form: &[(String, String)],
    metadata: &EntityMetadata,
    mode: CleanMode,
) -> AdminResult<Record> {
    let mut submitted: HashMap<&str, Vec<&str>> = HashMap::new();
    for (key, value) in form {
        submitted.entry(key.as_str()).or_default().push(value.as_str());
    }

    let mut cleaned = Record::new();
    for column in &metadata.columns {
        let values = submitted.get(column.name.as_str());

        if column.column_type == ColumnType::Boolean {
            if column.is_generated {
                continue;
            }
            let checked = values.is_some_and(|vs| vs.iter().any(|v| is_truthy(v)));
            cleaned.insert(column.name.clone(), Value::Bool(checked));
            continue;
        }

        let Some(raw) = values.and_then(|vs| vs.last()) else {
            continue;
        };

        let blank = match column.column_type {
            ColumnType::Text | ColumnType::Other(_) => raw.is_empty(),
            _ => raw.trim().is_empty(),
        };

        if blank {
            if column.is_generated || (mode == CleanMode::Create && column.has_default) {
                continue;
            }
            if column.is_nullable {
                cleaned.insert(column.name.clone(), Value::Null);
            } else if matches!(column.column_type, ColumnType::Text | ColumnType::Other(_)) {
                cleaned.insert(column.name.clone(), Value::String(String::new()));
            } else {
                return Err(AdminError::invalid_field(&column.name, "required"));
            }
            continue;
        }

        cleaned.insert(column.name.clone(), clean_value(column, raw)?);
    }

    Ok(cleaned)
}
