#![allow(dead_code)]

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use polars::prelude::*;
use regex::Regex;
use serde_json::{json, Map, Value as J};

use duckframe::frame::{Field, FieldKind, FieldType, Frame, Value};
use duckframe::{AppError, AppResult, DuckDb, DuckOpts, Engine};

static CREATE_VIEW: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"^CREATE VIEW "((?:[^"]|"")*)" AS \(SELECT \* from '((?:[^']|'')*)'\);$"#).unwrap());
static SELECT_ALL: Lazy<Regex> = Lazy::new(|| Regex::new(r#"(?i)^select \* from "?([A-Za-z0-9_]+)"?\s*;?$"#).unwrap());
static SERIALIZE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)^SELECT json_serialize_sql\('(.*)'\)$").unwrap());
static TABLE_FN: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)from\s+(read_[a-z_]+)\s*\(").unwrap());

/// In-process engine double: answers validation with a canned AST and emulates
/// `select * from <view>` by reading the view's Parquet fragments.
#[derive(Default)]
pub struct ParquetEngine {
    pub batches: Mutex<Vec<Vec<String>>>,
}

impl ParquetEngine {
    pub fn new() -> Arc<Self> { Arc::new(Self::default()) }

    /// Globs of every view defined so far, in call order.
    pub fn view_globs(&self) -> Vec<String> {
        self.batches
            .lock()
            .iter()
            .flatten()
            .filter_map(|c| CREATE_VIEW.captures(c).map(|m| m[2].replace("''", "'")))
            .collect()
    }

    fn serialize(sql: &str) -> String {
        let from_table = match TABLE_FN.captures(sql) {
            Some(m) => json!({
                "type": "TABLE_FUNCTION", "alias": "", "sample": null,
                "function": { "class": "FUNCTION", "type": "FUNCTION", "alias": "", "function_name": m[1].to_lowercase(), "schema": "", "children": [] },
                "column_name_alias": []
            }),
            None => json!({ "type": "BASE_TABLE", "alias": "", "sample": null, "schema_name": "", "table_name": "t", "column_name_alias": [], "catalog_name": "" }),
        };
        let ast = json!({ "error": false, "statements": [{ "node": { "type": "SELECT_NODE", "from_table": from_table } }] });
        json!([{ "json_serialize_sql": ast }]).to_string()
    }
}

#[async_trait]
impl Engine for ParquetEngine {
    async fn run_commands(&self, commands: &[String]) -> AppResult<String> {
        self.batches.lock().push(commands.to_vec());
        if let [only] = commands {
            if let Some(m) = SERIALIZE.captures(only) {
                return Ok(Self::serialize(&m[1].replace("''", "'")));
            }
        }
        let mut views: HashMap<String, PathBuf> = HashMap::new();
        let mut out = String::new();
        for c in commands {
            if let Some(m) = CREATE_VIEW.captures(c) {
                let glob = m[2].replace("''", "'");
                let dir = glob.strip_suffix("/*.parquet").unwrap_or(&glob).to_string();
                views.insert(m[1].replace("\"\"", "\""), PathBuf::from(dir));
            } else if let Some(m) = SELECT_ALL.captures(c) {
                let dir = views.get(&m[1]).ok_or_else(|| AppError::execution(format!("Catalog Error: Table with name {} does not exist!", &m[1])))?;
                out = rows_json(dir).map_err(|e| AppError::execution(e.to_string()))?;
            } else {
                return Err(AppError::execution(format!("unsupported statement in test engine: {}", c)));
            }
        }
        Ok(out)
    }
}

fn read_dir_frames(dir: &Path) -> PolarsResult<Option<DataFrame>> {
    let mut files: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|e| e.ok().map(|e| e.path()))
        .filter(|p| p.extension().and_then(|s| s.to_str()) == Some("parquet"))
        .collect();
    files.sort();
    let mut acc: Option<DataFrame> = None;
    for p in files {
        let df = ParquetReader::new(std::fs::File::open(&p)?).finish()?;
        match acc.as_mut() {
            Some(a) => { a.vstack_mut(&df)?; }
            None => acc = Some(df),
        }
    }
    Ok(acc)
}

fn column_json(col: &Column) -> PolarsResult<Vec<J>> {
    let out = match col.dtype() {
        DataType::Boolean => col.bool()?.into_iter().map(|v| v.map(J::Bool).unwrap_or(J::Null)).collect(),
        DataType::String => col.str()?.into_iter().map(|v| v.map(|s| J::String(s.to_string())).unwrap_or(J::Null)).collect(),
        DataType::Float32 | DataType::Float64 => {
            let c = col.cast(&DataType::Float64)?;
            c.f64()?.into_iter().map(|v| v.map(|f| json!(f)).unwrap_or(J::Null)).collect()
        }
        DataType::Datetime(_, _) => {
            let c = col.cast(&DataType::Int64)?;
            c.i64()?
                .into_iter()
                .map(|v| {
                    v.map(|ns| J::String(chrono::DateTime::from_timestamp_nanos(ns).format("%Y-%m-%d %H:%M:%S%.f").to_string()))
                        .unwrap_or(J::Null)
                })
                .collect()
        }
        DataType::Binary => col
            .binary()?
            .into_iter()
            .map(|v| v.and_then(|b| serde_json::from_slice(b).ok()).unwrap_or(J::Null))
            .collect(),
        dt if dt.is_unsigned_integer() => {
            let c = col.cast(&DataType::UInt64)?;
            c.u64()?.into_iter().map(|v| v.map(|u| json!(u)).unwrap_or(J::Null)).collect()
        }
        _ => {
            let c = col.cast(&DataType::Int64)?;
            c.i64()?.into_iter().map(|v| v.map(|i| json!(i)).unwrap_or(J::Null)).collect()
        }
    };
    Ok(out)
}

/// Rows of every fragment under `dir` in the shell's json mode layout; empty when there are no rows.
fn rows_json(dir: &Path) -> PolarsResult<String> {
    let Some(df) = read_dir_frames(dir)? else { return Ok(String::new()) };
    if df.height() == 0 {
        return Ok(String::new());
    }
    let mut cols: Vec<(String, Vec<J>)> = Vec::new();
    for c in df.get_columns() {
        cols.push((c.name().to_string(), column_json(c)?));
    }
    let rows: Vec<J> = (0..df.height())
        .map(|i| {
            let mut m = Map::new();
            for (name, vals) in &cols {
                m.insert(name.clone(), vals[i].clone());
            }
            J::Object(m)
        })
        .collect();
    Ok(serde_json::to_string(&rows).unwrap_or_default())
}

pub fn session(tmp: &Path, engine: Arc<ParquetEngine>, opts: DuckOpts) -> DuckDb {
    DuckDb::with_engine("", opts.with_temp_dir(tmp), engine)
}

pub fn string_frame(ref_id: &str, vals: &[&str]) -> Frame {
    Frame::new(ref_id, vec![Field::new("value", FieldType::required(FieldKind::String), vals.iter().map(|v| Value::from(*v)).collect())])
}

pub fn parse_rows(json: &str) -> Vec<Map<String, J>> {
    if json.trim().is_empty() {
        return Vec::new();
    }
    serde_json::from_str(json).unwrap()
}

pub fn entries(dir: &Path) -> usize {
    std::fs::read_dir(dir).map(|d| d.count()).unwrap_or(0)
}
