//!
//! duckframe frame model
//! ---------------------
//! A `Frame` is an in-memory table: an ordered list of named, typed fields of
//! equal length, a logical name, and the group id (`ref_id`) under which the
//! frame is exposed to SQL as a view. Frames sharing a `ref_id` form one
//! queryable table after unification.
//!
//! Cells are held as the typed `Value` union; the `FieldType` of a field decides
//! how its cells are written to Parquet and how result columns are decoded.

use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};

/// Label set attached to a field. Ordered so pseudo-columns are generated deterministically.
pub type Labels = BTreeMap<String, String>;

/// Semantic kind of a field, independent of nullability.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FieldKind {
    String,
    Int8,
    Int16,
    Int32,
    Int64,
    Uint8,
    Uint16,
    Uint32,
    Uint64,
    Float32,
    Float64,
    Bool,
    /// Timestamp, nanosecond precision, UTC.
    Time,
    /// JSON document kept as opaque bytes.
    Json,
    /// Enum ordinal, stored as uint16.
    Enum,
    /// A kind produced by some other frame source that this crate does not model.
    Other(String),
}

impl FieldKind {
    fn as_str(&self) -> &str {
        match self {
            FieldKind::String => "string",
            FieldKind::Int8 => "int8",
            FieldKind::Int16 => "int16",
            FieldKind::Int32 => "int32",
            FieldKind::Int64 => "int64",
            FieldKind::Uint8 => "uint8",
            FieldKind::Uint16 => "uint16",
            FieldKind::Uint32 => "uint32",
            FieldKind::Uint64 => "uint64",
            FieldKind::Float32 => "float32",
            FieldKind::Float64 => "float64",
            FieldKind::Bool => "bool",
            FieldKind::Time => "time",
            FieldKind::Json => "json",
            FieldKind::Enum => "enum",
            FieldKind::Other(name) => name.as_str(),
        }
    }
}

/// Field type: kind plus nullability. Textual form is `int8` / `nullable_int8`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldType {
    pub kind: FieldKind,
    pub nullable: bool,
}

impl FieldType {
    pub const fn new(kind: FieldKind, nullable: bool) -> Self { Self { kind, nullable } }
    pub const fn required(kind: FieldKind) -> Self { Self { kind, nullable: false } }
    pub const fn nullable(kind: FieldKind) -> Self { Self { kind, nullable: true } }

    /// Same kind, nullable.
    pub fn as_nullable(&self) -> Self { Self { kind: self.kind.clone(), nullable: true } }
}

impl Display for FieldType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if self.nullable { write!(f, "nullable_{}", self.kind.as_str()) } else { write!(f, "{}", self.kind.as_str()) }
    }
}

impl FromStr for FieldType {
    type Err = std::convert::Infallible;

    /// Never fails: unknown names become `FieldKind::Other` and are rejected
    /// later by the type mapper, so they are never silently dropped.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        let (nullable, base) = match lower.strip_prefix("nullable_") {
            Some(rest) => (true, rest.to_string()),
            None => (false, lower.clone()),
        };
        let kind = match base.as_str() {
            "string" => FieldKind::String,
            "int8" => FieldKind::Int8,
            "int16" => FieldKind::Int16,
            "int32" => FieldKind::Int32,
            "int64" => FieldKind::Int64,
            "uint8" => FieldKind::Uint8,
            "uint16" => FieldKind::Uint16,
            "uint32" => FieldKind::Uint32,
            "uint64" => FieldKind::Uint64,
            "float32" => FieldKind::Float32,
            "float64" => FieldKind::Float64,
            "bool" | "boolean" => FieldKind::Bool,
            "time" | "timestamp" => FieldKind::Time,
            "json" => FieldKind::Json,
            "enum" => FieldKind::Enum,
            _ => FieldKind::Other(s.trim().to_string()),
        };
        Ok(FieldType { kind, nullable })
    }
}

impl Serialize for FieldType {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for FieldType {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(FieldType::from_str(&s).unwrap_or_else(|never| match never {}))
    }
}

/// A single typed cell.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Uint(u64),
    Float(f64),
    String(String),
    Time(DateTime<Utc>),
    Bytes(Vec<u8>),
}

impl Value {
    pub fn is_null(&self) -> bool { matches!(self, Value::Null) }

    /// Decode a JSON cell for a field of type `ft`.
    pub fn from_json(v: &serde_json::Value, ft: &FieldType) -> AppResult<Value> {
        use serde_json::Value as J;
        if v.is_null() {
            return Ok(Value::Null);
        }
        let bad = || AppError::decode(format!("value {} does not fit field type {}", v, ft));
        let out = match &ft.kind {
            FieldKind::String => match v {
                J::String(s) => Value::String(s.clone()),
                other => Value::String(other.to_string()),
            },
            FieldKind::Int8 | FieldKind::Int16 | FieldKind::Int32 | FieldKind::Int64 => {
                Value::Int(v.as_i64().ok_or_else(bad)?)
            }
            FieldKind::Uint8 | FieldKind::Uint16 | FieldKind::Uint32 | FieldKind::Uint64 | FieldKind::Enum => {
                Value::Uint(v.as_u64().ok_or_else(bad)?)
            }
            FieldKind::Float32 | FieldKind::Float64 => Value::Float(v.as_f64().ok_or_else(bad)?),
            FieldKind::Bool => Value::Bool(v.as_bool().ok_or_else(bad)?),
            FieldKind::Time => match v {
                J::String(s) => Value::Time(crate::results::parse_time(s).ok_or_else(bad)?),
                J::Number(n) => {
                    // epoch milliseconds
                    let ms = n.as_i64().ok_or_else(bad)?;
                    Value::Time(DateTime::<Utc>::from_timestamp_millis(ms).ok_or_else(bad)?)
                }
                _ => return Err(bad()),
            },
            FieldKind::Json => Value::Bytes(serde_json::to_vec(v)?),
            FieldKind::Other(name) => return Err(AppError::unsupported(name.clone())),
        };
        Ok(out)
    }

    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::Value as J;
        match self {
            Value::Null => J::Null,
            Value::Bool(b) => J::Bool(*b),
            Value::Int(i) => J::from(*i),
            Value::Uint(u) => J::from(*u),
            Value::Float(f) => serde_json::Number::from_f64(*f).map(J::Number).unwrap_or(J::Null),
            Value::String(s) => J::String(s.clone()),
            Value::Time(t) => J::String(t.to_rfc3339()),
            Value::Bytes(b) => serde_json::from_slice(b).unwrap_or_else(|_| J::String(String::from_utf8_lossy(b).into_owned())),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self { Value::String(s.to_string()) }
}

impl From<String> for Value {
    fn from(s: String) -> Self { Value::String(s) }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self { Value::Float(f) }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self { Value::Int(i) }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self { Value::Bool(b) }
}

impl From<DateTime<Utc>> for Value {
    fn from(t: DateTime<Utc>) -> Self { Value::Time(t) }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(o: Option<T>) -> Self { o.map(Into::into).unwrap_or(Value::Null) }
}

/// Display options carried alongside a field.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FieldConfig {
    /// Replaces the field name in the materialized view when non-empty.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub name: String,
    pub field_type: FieldType,
    pub labels: Labels,
    pub config: Option<FieldConfig>,
    pub values: Vec<Value>,
}

impl Field {
    pub fn new<S: Into<String>>(name: S, field_type: FieldType, values: Vec<Value>) -> Self {
        Self { name: name.into(), field_type, labels: Labels::new(), config: None, values }
    }

    pub fn with_labels(mut self, labels: Labels) -> Self {
        self.labels = labels;
        self
    }

    pub fn with_display_name<S: Into<String>>(mut self, display_name: S) -> Self {
        self.config = Some(FieldConfig { display_name: Some(display_name.into()) });
        self
    }

    pub fn len(&self) -> usize { self.values.len() }

    pub fn is_empty(&self) -> bool { self.values.is_empty() }

    /// Non-nullable string field with every row set to `value`.
    pub fn constant_string<S: Into<String>>(name: S, value: &str, rows: usize) -> Self {
        Field::new(name, FieldType::required(FieldKind::String), vec![Value::String(value.to_string()); rows])
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeSeverity {
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notice {
    pub severity: NoticeSeverity,
    pub text: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FrameMeta {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub notices: Vec<Notice>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Frame {
    pub name: String,
    pub ref_id: String,
    pub fields: Vec<Field>,
    pub meta: Option<FrameMeta>,
}

impl Frame {
    pub fn new<S: Into<String>>(name: S, fields: Vec<Field>) -> Self {
        let name = name.into();
        Self { ref_id: name.clone(), name, fields, meta: None }
    }

    pub fn with_ref_id<S: Into<String>>(mut self, ref_id: S) -> Self {
        self.ref_id = ref_id.into();
        self
    }

    /// Row count; the length of the first field.
    pub fn rows(&self) -> usize { self.fields.first().map(|f| f.len()).unwrap_or(0) }

    pub fn field(&self, name: &str) -> Option<&Field> { self.fields.iter().find(|f| f.name == name) }

    /// Fields of unequal length are a construction error.
    pub fn check_row_len(&self) -> AppResult<usize> {
        let rows = self.rows();
        for f in &self.fields {
            if f.len() != rows {
                return Err(AppError::materialization(format!(
                    "frame '{}' has fields of different lengths: '{}' has {} rows, expected {}",
                    self.name, f.name, f.len(), rows
                )));
            }
        }
        Ok(rows)
    }

    pub fn push_notice(&mut self, notice: Notice) {
        self.meta.get_or_insert_with(FrameMeta::default).notices.push(notice);
    }

    /// Build a frame from its JSON document form:
    /// `{"name": .., "ref_id": .., "fields": [{"name", "type", "labels", "config", "values"}]}`.
    pub fn from_json(doc: &serde_json::Value) -> AppResult<Frame> {
        let parsed: FrameDoc = serde_json::from_value(doc.clone())?;
        let mut fields = Vec::with_capacity(parsed.fields.len());
        for fd in parsed.fields {
            let mut values = Vec::with_capacity(fd.values.len());
            for v in &fd.values {
                values.push(Value::from_json(v, &fd.field_type)?);
            }
            fields.push(Field { name: fd.name, field_type: fd.field_type, labels: fd.labels, config: fd.config, values });
        }
        let ref_id = parsed.ref_id.unwrap_or_else(|| parsed.name.clone());
        let frame = Frame { name: parsed.name, ref_id, fields, meta: parsed.meta };
        frame.check_row_len()?;
        Ok(frame)
    }
}

#[derive(Deserialize)]
struct FrameDoc {
    name: String,
    #[serde(default, alias = "refId")]
    ref_id: Option<String>,
    #[serde(default)]
    fields: Vec<FieldDoc>,
    #[serde(default)]
    meta: Option<FrameMeta>,
}

#[derive(Deserialize)]
struct FieldDoc {
    name: String,
    #[serde(rename = "type")]
    field_type: FieldType,
    #[serde(default)]
    labels: Labels,
    #[serde(default)]
    config: Option<FieldConfig>,
    #[serde(default)]
    values: Vec<serde_json::Value>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn field_type_text_form() {
        let t: FieldType = "nullable_float64".parse().unwrap();
        assert_eq!(t, FieldType::nullable(FieldKind::Float64));
        assert_eq!(t.to_string(), "nullable_float64");
        let odd: FieldType = "decimal128".parse().unwrap();
        assert_eq!(odd.kind, FieldKind::Other("decimal128".into()));
        assert!(!odd.nullable);
    }

    #[test]
    fn frame_from_json_document() {
        let doc = json!({
            "name": "cpu",
            "refId": "A",
            "fields": [
                {"name": "time", "type": "time", "values": ["2024-02-23 09:01:54", 1708678914000i64]},
                {"name": "value", "type": "nullable_float64", "labels": {"server": "a"}, "values": [1.5, null]}
            ]
        });
        let f = Frame::from_json(&doc).unwrap();
        assert_eq!(f.ref_id, "A");
        assert_eq!(f.rows(), 2);
        assert_eq!(f.fields[0].values[0], f.fields[0].values[1]);
        assert_eq!(f.fields[1].values[1], Value::Null);
        assert_eq!(f.fields[1].labels.get("server").map(String::as_str), Some("a"));
    }

    #[test]
    fn frame_from_json_rejects_ragged_fields() {
        let doc = json!({
            "name": "x",
            "fields": [
                {"name": "a", "type": "int64", "values": [1, 2]},
                {"name": "b", "type": "int64", "values": [1]}
            ]
        });
        let err = Frame::from_json(&doc).unwrap_err();
        assert_eq!(err.code_str(), "materialization_error");
    }

    #[test]
    fn notices_are_appended_to_meta() {
        let mut f = Frame::new("foo", vec![]);
        f.push_notice(Notice { severity: NoticeSeverity::Info, text: "hello".into() });
        assert_eq!(f.meta.unwrap().notices.len(), 1);
    }
}
