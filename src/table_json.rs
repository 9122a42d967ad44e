//! Purpose: Shared JSON serializers for CLI and HTTP serving paths.
//! Exports: `error_json`, `schema_json`, `tables_json`, `check_json`.
//! Role: Keep error and table metadata envelope shapes consistent across entry points.
//! Invariants: Stable key names/order; optional keys are omitted rather than null.

use csvserve::api::{Error, TableDescription};
use serde_json::{Map, Value, json};

pub(crate) fn error_json(err: &Error) -> Value {
    let mut inner = Map::new();
    inner.insert("kind".to_string(), json!(err.kind().as_str()));
    inner.insert("message".to_string(), json!(err.message().unwrap_or("error")));
    if let Some(hint) = err.hint() {
        inner.insert("hint".to_string(), json!(hint));
    }
    if let Some(table) = err.table() {
        inner.insert("table".to_string(), json!(table));
    }
    if let Some(path) = err.path() {
        inner.insert("path".to_string(), json!(path.display().to_string()));
    }
    if let Some(row) = err.row() {
        inner.insert("row".to_string(), json!(row));
    }
    if let Some(field) = err.field() {
        inner.insert("field".to_string(), json!(field));
    }

    let mut outer = Map::new();
    outer.insert("error".to_string(), Value::Object(inner));
    Value::Object(outer)
}

pub(crate) fn schema_json(description: &TableDescription) -> Value {
    let columns: Vec<&str> = description
        .columns
        .iter()
        .map(|(name, _)| name.as_str())
        .collect();
    let mut schema = Map::new();
    for (name, field_type) in &description.columns {
        schema.insert(name.clone(), json!(field_type.as_str()));
    }
    json!({
        "table": description.table,
        "columns": columns,
        "schema": schema,
    })
}

pub(crate) fn tables_json(tables: &[String], exposed: &[String]) -> Value {
    json!({ "tables": tables, "exposed": exposed })
}

/// One entry of a `check` report: row count on success, error envelope otherwise.
pub(crate) fn check_json(table: &str, result: &Result<usize, Error>) -> Value {
    match result {
        Ok(rows) => json!({ "table": table, "ok": true, "rows": rows }),
        Err(err) => {
            let mut map = Map::new();
            map.insert("table".to_string(), json!(table));
            map.insert("ok".to_string(), json!(false));
            if let Value::Object(error) = error_json(err) {
                map.extend(error);
            }
            Value::Object(map)
        }
    }
}
