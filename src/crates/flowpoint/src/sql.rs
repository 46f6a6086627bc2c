//! Dynamic SQL helpers for statements over arbitrary business tables
//!
//! Table and column names come from undo-log rows and tool arguments, so
//! they are always quoted; values are always bound, never interpolated.

use crate::error::{FlowpointError, Result};
use crate::models::RowMap;
use serde_json::Value;
use sqlx::query::Query;
use sqlx::sqlite::{SqliteArguments, SqliteRow};
use sqlx::{Column, Row, Sqlite, TypeInfo, ValueRef};

pub(crate) type SqliteQuery<'q> = Query<'q, Sqlite, SqliteArguments<'q>>;

/// Quote an identifier for SQLite, doubling embedded quotes
pub(crate) fn quote_ident(name: &str) -> Result<String> {
    if name.is_empty() || name.contains('\0') {
        return Err(FlowpointError::InvalidEntry(format!(
            "invalid identifier {:?}",
            name
        )));
    }
    Ok(format!("\"{}\"", name.replace('"', "\"\"")))
}

/// Build `"a" = ? AND "b" = ?` for a key map, returning the bound values in order
pub(crate) fn where_clause(key: &RowMap) -> Result<(String, Vec<Value>)> {
    if key.is_empty() {
        return Err(FlowpointError::InvalidEntry(
            "primary key is empty; statement would match every row".to_string(),
        ));
    }

    let mut parts = Vec::with_capacity(key.len());
    let mut params = Vec::with_capacity(key.len());
    for (column, value) in key {
        if value.is_null() {
            parts.push(format!("{} IS NULL", quote_ident(column)?));
        } else {
            parts.push(format!("{} = ?", quote_ident(column)?));
            params.push(value.clone());
        }
    }

    Ok((parts.join(" AND "), params))
}

/// Bind a JSON value with the closest SQLite storage class
pub(crate) fn bind_json<'q>(query: SqliteQuery<'q>, value: &Value) -> SqliteQuery<'q> {
    match value {
        Value::Null => query.bind(None::<String>),
        Value::Bool(b) => query.bind(*b),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                query.bind(i)
            } else if let Some(f) = n.as_f64() {
                query.bind(f)
            } else {
                query.bind(n.to_string())
            }
        }
        Value::String(s) => query.bind(s.clone()),
        // Nested documents are stored as JSON text
        Value::Array(_) | Value::Object(_) => query.bind(value.to_string()),
    }
}

/// Bind a sequence of values in order
pub(crate) fn bind_all<'q>(mut query: SqliteQuery<'q>, values: &[Value]) -> SqliteQuery<'q> {
    for value in values {
        query = bind_json(query, value);
    }
    query
}

/// Convert a dynamically-typed row into a column → value map
pub(crate) fn row_to_map(row: &SqliteRow) -> Result<RowMap> {
    let mut map = RowMap::new();

    for column in row.columns() {
        let idx = column.ordinal();
        let raw = row.try_get_raw(idx)?;

        let value = if raw.is_null() {
            Value::Null
        } else {
            match raw.type_info().name() {
                "INTEGER" => Value::from(row.try_get::<i64, _>(idx)?),
                "REAL" => Value::from(row.try_get::<f64, _>(idx)?),
                "TEXT" => Value::from(row.try_get::<String, _>(idx)?),
                other => {
                    return Err(FlowpointError::InvalidEntry(format!(
                        "column {} has unsupported storage class {}",
                        column.name(),
                        other
                    )))
                }
            }
        };

        map.insert(column.name().to_string(), value);
    }

    Ok(map)
}
