//! Query text validation.
//!
//! The engine serializes the query to its AST (`json_serialize_sql`); the tree
//! is flattened to dotted keys and checked against a small deny list. Only
//! plain references to the generated views may appear in FROM clauses: table
//! functions, schema or catalog qualified names, and names containing `.`
//! (file paths) are rejected. Anything that does not look like a parsed
//! statement list is rejected as well.

use serde_json::{Map, Value};
use tracing::error;

use crate::engine::Engine;
use crate::error::{AppError, AppResult};
use crate::storage::escape_sql_literal;

const ERROR_SUFFIX: &str = ".error";
const FROM_TABLE: &str = "from_table";
const TABLE_NAME_SUFFIX: &str = ".table_name";
const FUNCTION_NAME: &str = "function.function_name";

/// Ask the engine for the AST of `raw_sql` and check it.
pub async fn validate(engine: &dyn Engine, raw_sql: &str) -> AppResult<()> {
    let cmd = format!("SELECT json_serialize_sql('{}')", escape_sql_literal(raw_sql));
    let ret = engine.run_commands(&[cmd.clone()]).await.map_err(|e| {
        error!(target: "duckframe::validate", error = %e, sql = %raw_sql, cmd = %cmd, "error validating sql");
        AppError::validation(format!("error validating sql: {}", e.message()))
    })?;
    check_serialized(&ret)
}

/// Check the engine's output for a `json_serialize_sql` call: one row, one column holding the AST.
pub fn check_serialized(ret: &str) -> AppResult<()> {
    let rows: Vec<Map<String, Value>> = serde_json::from_str(ret.trim()).map_err(|e| {
        error!(target: "duckframe::validate", error = %e, ret = %ret, "error converting json sql to ast");
        AppError::validation(format!("error converting json to ast: {}", e))
    })?;
    let first = rows.first().ok_or_else(|| {
        error!(target: "duckframe::validate", ret = %ret, "no ast returned");
        AppError::validation("no ast returned")
    })?;
    let cell = first.values().next().ok_or_else(|| AppError::validation(format!("invalid sql: {}", ret)))?;
    let ast = match cell {
        Value::Object(m) => m.clone(),
        // some engine versions print the JSON column as a string
        Value::String(s) => match serde_json::from_str::<Value>(s) {
            Ok(Value::Object(m)) => m,
            _ => return Err(AppError::validation(format!("invalid sql: {}", ret))),
        },
        _ => {
            error!(target: "duckframe::validate", sql = %ret, "invalid sql");
            return Err(AppError::validation(format!("invalid sql: {}", ret)));
        }
    };
    check_ast(&ast)
}

/// Deny-list walk over a serialized statement tree.
pub fn check_ast(ast: &Map<String, Value>) -> AppResult<()> {
    match ast.get("error") {
        None | Some(Value::Bool(false)) => {}
        Some(Value::Bool(true)) => {
            let msg = ast.get("error_message").and_then(Value::as_str).unwrap_or("unknown parser error");
            error!(target: "duckframe::validate", error = %msg, "error in ast");
            return Err(AppError::validation(format!("error in ast: {}", msg)));
        }
        Some(other) => return Err(AppError::validation(format!("error in ast: {}", other))),
    }

    match ast.get("statements") {
        Some(Value::Array(stmts)) if !stmts.is_empty() => {}
        _ => {
            error!(target: "duckframe::validate", "no statements in ast");
            return Err(AppError::validation("no statements in ast"));
        }
    }

    let mut table_function = None;
    for (k, v) in flatten(ast) {
        if k.ends_with(ERROR_SUFFIX) && v == Value::Bool(true) {
            error!(target: "duckframe::validate", key = %k, "error in sql");
            return Err(AppError::validation(format!("error in sql: {}", k)));
        }
        if !k.contains(FROM_TABLE) {
            continue;
        }
        if k.contains(FUNCTION_NAME) {
            let name = v.as_str().map(str::to_string).unwrap_or_else(|| v.to_string());
            error!(target: "duckframe::validate", function = %name, "function not allowed");
            return Err(AppError::validation(format!("function not allowed: {}", name)));
        }
        if k.ends_with(".type") && v.as_str() == Some("TABLE_FUNCTION") {
            // reported after the walk so the function name wins when present
            table_function.get_or_insert(k.clone());
        }
        if k.ends_with(TABLE_NAME_SUFFIX) {
            if let Some(name) = v.as_str() {
                if name.contains('.') {
                    error!(target: "duckframe::validate", table = %name, "table names with . not allowed");
                    return Err(AppError::validation(format!("table names with . not allowed: {}", name)));
                }
            }
        }
        if k.ends_with(".schema_name") || k.ends_with(".catalog_name") {
            if let Some(qualifier) = v.as_str() {
                if !qualifier.is_empty() {
                    error!(target: "duckframe::validate", qualifier = %qualifier, "qualified table names not allowed");
                    return Err(AppError::validation(format!("table names with . not allowed: {}.<table>", qualifier)));
                }
            }
        }
    }
    if let Some(k) = table_function {
        error!(target: "duckframe::validate", key = %k, "function not allowed");
        return Err(AppError::validation(format!("function not allowed: {}", k)));
    }
    Ok(())
}

/// Flatten nested objects/arrays into dotted keys (`a.0.b`); leaves only.
pub fn flatten(m: &Map<String, Value>) -> Vec<(String, Value)> {
    fn walk(prefix: &str, v: &Value, out: &mut Vec<(String, Value)>) {
        match v {
            Value::Object(m) => {
                for (k, child) in m {
                    walk(&join(prefix, k), child, out);
                }
            }
            Value::Array(items) => {
                for (i, child) in items.iter().enumerate() {
                    walk(&join(prefix, &i.to_string()), child, out);
                }
            }
            leaf => out.push((prefix.to_string(), leaf.clone())),
        }
    }
    fn join(prefix: &str, k: &str) -> String {
        if prefix.is_empty() { k.to_string() } else { format!("{}.{}", prefix, k) }
    }
    let mut out = Vec::new();
    for (k, v) in m {
        walk(k, v, &mut out);
    }
    out
}

#[cfg(test)]
#[path = "validate_tests.rs"]
mod validate_tests;
