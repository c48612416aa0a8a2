//! Field type to columnar type mapping.
//!
//! `map_type` is the single place that decides how a semantic field type is
//! stored in Parquet. It is total over the modelled kinds; anything else is an
//! `UnsupportedType` error, never a silently dropped column.

use polars::prelude::*;

use crate::error::{AppError, AppResult};
use crate::frame::{Field, FieldKind, FieldType, Value};

/// Columnar type and nullability for a field type.
pub fn map_type(ft: &FieldType) -> AppResult<(DataType, bool)> {
    let dt = match &ft.kind {
        FieldKind::String => DataType::String,
        FieldKind::Int8 => DataType::Int8,
        FieldKind::Int16 => DataType::Int16,
        FieldKind::Int32 => DataType::Int32,
        FieldKind::Int64 => DataType::Int64,
        FieldKind::Uint8 => DataType::UInt8,
        FieldKind::Uint16 | FieldKind::Enum => DataType::UInt16,
        FieldKind::Uint32 => DataType::UInt32,
        FieldKind::Uint64 => DataType::UInt64,
        FieldKind::Float32 => DataType::Float32,
        FieldKind::Float64 => DataType::Float64,
        FieldKind::Bool => DataType::Boolean,
        FieldKind::Time => DataType::Datetime(TimeUnit::Nanoseconds, None),
        FieldKind::Json => DataType::Binary,
        FieldKind::Other(name) => return Err(AppError::unsupported(name.clone())),
    };
    Ok((dt, ft.nullable))
}

/// All-null field of the nullable variant of `ft`, `len` rows long.
pub fn null_field(name: &str, ft: &FieldType, len: usize) -> AppResult<Field> {
    // reject unknown kinds up front so padding never invents a column the writer cannot store
    map_type(ft)?;
    Ok(Field::new(name, ft.as_nullable(), vec![Value::Null; len]))
}

fn cell_err(field: &Field, row: usize, v: &Value) -> AppError {
    AppError::materialization(format!(
        "field '{}' row {}: value {:?} does not fit type {}",
        field.name, row, v, field.field_type
    ))
}

fn non_null_err(field: &Field, row: usize) -> AppError {
    AppError::materialization(format!("field '{}' row {}: null in non-nullable {}", field.name, row, field.field_type))
}

/// Collect the cells of `field` as `Option<T>` using `conv` for non-null cells.
fn collect_cells<T>(field: &Field, conv: impl Fn(&Value) -> Option<T>) -> AppResult<Vec<Option<T>>> {
    let mut out = Vec::with_capacity(field.values.len());
    for (row, v) in field.values.iter().enumerate() {
        if v.is_null() {
            if !field.field_type.nullable {
                return Err(non_null_err(field, row));
            }
            out.push(None);
            continue;
        }
        match conv(v) {
            Some(x) => out.push(Some(x)),
            None => return Err(cell_err(field, row, v)),
        }
    }
    Ok(out)
}

fn as_i64(v: &Value) -> Option<i64> {
    match v {
        Value::Int(i) => Some(*i),
        Value::Uint(u) => i64::try_from(*u).ok(),
        _ => None,
    }
}

fn as_u64(v: &Value) -> Option<u64> {
    match v {
        Value::Uint(u) => Some(*u),
        Value::Int(i) => u64::try_from(*i).ok(),
        _ => None,
    }
}

fn as_f64(v: &Value) -> Option<f64> {
    match v {
        Value::Float(f) => Some(*f),
        Value::Int(i) => Some(*i as f64),
        Value::Uint(u) => Some(*u as f64),
        _ => None,
    }
}

/// Convert a field into a polars Series of the type chosen by `map_type`.
pub fn field_to_series(field: &Field) -> AppResult<Series> {
    let (dt, _) = map_type(&field.field_type)?;
    let name: PlSmallStr = field.name.as_str().into();
    let s = match &field.field_type.kind {
        FieldKind::String => Series::new(name, collect_cells(field, |v| match v {
            Value::String(s) => Some(s.clone()),
            _ => None,
        })?),
        FieldKind::Int8 => Series::new(name, collect_cells(field, |v| as_i64(v).and_then(|i| i8::try_from(i).ok()))?),
        FieldKind::Int16 => Series::new(name, collect_cells(field, |v| as_i64(v).and_then(|i| i16::try_from(i).ok()))?),
        FieldKind::Int32 => Series::new(name, collect_cells(field, |v| as_i64(v).and_then(|i| i32::try_from(i).ok()))?),
        FieldKind::Int64 => Series::new(name, collect_cells(field, as_i64)?),
        FieldKind::Uint8 => Series::new(name, collect_cells(field, |v| as_u64(v).and_then(|u| u8::try_from(u).ok()))?),
        FieldKind::Uint16 | FieldKind::Enum => {
            Series::new(name, collect_cells(field, |v| as_u64(v).and_then(|u| u16::try_from(u).ok()))?)
        }
        FieldKind::Uint32 => Series::new(name, collect_cells(field, |v| as_u64(v).and_then(|u| u32::try_from(u).ok()))?),
        FieldKind::Uint64 => Series::new(name, collect_cells(field, as_u64)?),
        FieldKind::Float32 => Series::new(name, collect_cells(field, |v| as_f64(v).map(|f| f as f32))?),
        FieldKind::Float64 => Series::new(name, collect_cells(field, as_f64)?),
        FieldKind::Bool => Series::new(name, collect_cells(field, |v| match v {
            Value::Bool(b) => Some(*b),
            _ => None,
        })?),
        FieldKind::Time => {
            let nanos = collect_cells(field, |v| match v {
                Value::Time(t) => t.timestamp_nanos_opt(),
                _ => None,
            })?;
            Series::new(name, nanos).cast(&dt)?
        }
        FieldKind::Json => Series::new(name, collect_cells(field, |v| match v {
            Value::Bytes(b) => Some(b.clone()),
            Value::String(s) => Some(s.clone().into_bytes()),
            _ => None,
        })?),
        FieldKind::Other(other) => return Err(AppError::unsupported(other.clone())),
    };
    Ok(s)
}
