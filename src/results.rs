//! Decoding engine output back into a frame.
//!
//! The shell prints json mode results as an array of row objects. Column order
//! is the key order of the rows (first appearance wins). A column named like a
//! field of the input frames takes that field's type; other columns get a type
//! inferred from their values.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde_json::{Map, Value as J};
use tracing::debug;

use crate::error::{AppError, AppResult};
use crate::frame::{Field, FieldKind, FieldType, Frame, Value};

const NAIVE_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"];
const ZONED_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S%.f%#z", "%Y-%m-%dT%H:%M:%S%.f%#z"];

/// Parse the timestamp layouts the engine prints; naive values are UTC.
pub fn parse_time(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(t) = DateTime::parse_from_rfc3339(s) {
        return Some(t.with_timezone(&Utc));
    }
    for fmt in ZONED_FORMATS {
        if let Ok(t) = DateTime::parse_from_str(s, fmt) {
            return Some(t.with_timezone(&Utc));
        }
    }
    for fmt in NAIVE_FORMATS {
        if let Ok(t) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(t.and_utc());
        }
    }
    None
}

/// Decode json rows into a frame named `name`. Empty output is an empty frame.
pub fn results_to_frame(name: &str, raw: &str, sources: &[Frame]) -> AppResult<Frame> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(Frame::new(name, Vec::new()));
    }
    let rows: Vec<Map<String, J>> = serde_json::from_str(raw)
        .map_err(|e| AppError::decode(format!("engine output is not a list of json rows: {}", e)))?;

    let mut columns: Vec<String> = Vec::new();
    for row in &rows {
        for k in row.keys() {
            if !columns.iter().any(|c| c == k) {
                columns.push(k.clone());
            }
        }
    }

    let mut fields = Vec::with_capacity(columns.len());
    for col in &columns {
        let cells: Vec<&J> = rows.iter().map(|r| r.get(col).unwrap_or(&J::Null)).collect();
        fields.push(decode_column(col, &cells, sources)?);
    }
    let frame = Frame::new(name, fields);
    debug!(target: "duckframe::results", frame = %name, rows = rows.len(), cols = columns.len(), "decoded results");
    Ok(frame)
}

fn decode_column(col: &str, cells: &[&J], sources: &[Frame]) -> AppResult<Field> {
    let saw_null = cells.iter().any(|v| v.is_null());
    if let Some(ft) = source_type(col, sources) {
        let ft = FieldType::nullable(ft.kind);
        match cells.iter().map(|v| Value::from_json(v, &ft)).collect::<AppResult<Vec<_>>>() {
            Ok(values) => return Ok(Field::new(col, ft, values)),
            // e.g. an aggregate aliased to a source column name
            Err(e) => debug!(target: "duckframe::results", column = %col, error = %e, "source type does not fit, inferring"),
        }
    }
    let ft = FieldType::new(infer_kind(cells), saw_null);
    let values = cells.iter().map(|v| Value::from_json(v, &ft)).collect::<AppResult<Vec<_>>>()?;
    Ok(Field::new(col, ft, values))
}

/// Type of the first source field whose (display) name is `col`, with a usable kind.
/// Engine output may contain nulls the source never had, so callers make it nullable.
fn source_type(col: &str, sources: &[Frame]) -> Option<FieldType> {
    sources
        .iter()
        .flat_map(|f| f.fields.iter())
        .find(|f| {
            let display = f.config.as_ref().and_then(|c| c.display_name.as_deref()).filter(|d| !d.is_empty());
            display.unwrap_or(f.name.as_str()) == col
        })
        .map(|f| f.field_type.clone())
        .filter(|ft| !matches!(ft.kind, FieldKind::Other(_)))
}

fn infer_kind(cells: &[&J]) -> FieldKind {
    let present: Vec<&J> = cells.iter().copied().filter(|v| !v.is_null()).collect();
    if present.is_empty() {
        return FieldKind::String;
    }
    if present.iter().all(|v| v.is_boolean()) {
        return FieldKind::Bool;
    }
    if present.iter().all(|v| v.is_i64()) {
        return FieldKind::Int64;
    }
    if present.iter().all(|v| v.is_number()) {
        return FieldKind::Float64;
    }
    if present.iter().all(|v| v.as_str().map(|s| parse_time(s).is_some()).unwrap_or(false)) {
        return FieldKind::Time;
    }
    if present.iter().all(|v| v.is_object() || v.is_array()) {
        return FieldKind::Json;
    }
    FieldKind::String
}
