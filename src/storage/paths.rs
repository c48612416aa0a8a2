use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::AppResult;

static UNSAFE_FILE_CHARS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^A-Za-z0-9_]").unwrap());

/// Fresh, uniquely named directory under `root`. The caller owns it.
pub(crate) fn create_group_dir(root: &Path) -> AppResult<PathBuf> {
    std::fs::create_dir_all(root)?;
    let dir = tempfile::Builder::new().prefix("duck").tempdir_in(root)?;
    Ok(dir.keep())
}

/// Fragment file name: `<group>-<frame>-<chunk>.parquet`, group reduced to `[A-Za-z0-9_]`.
pub(crate) fn fragment_name(group: &str, frame_idx: usize, chunk_idx: usize) -> String {
    let safe = UNSAFE_FILE_CHARS.replace_all(group, "_");
    format!("{}-{}-{}.parquet", safe, frame_idx, chunk_idx)
}

/// Glob the engine reads a group's fragments through.
pub fn view_glob(dir: &Path) -> String {
    format!("{}/*.parquet", dir.display())
}

/// Double single quotes for embedding in a SQL string literal.
pub fn escape_sql_literal(s: &str) -> String {
    s.replace('\'', "''")
}

/// Double-quoted SQL identifier.
pub fn quote_ident(s: &str) -> String {
    format!("\"{}\"", s.replace('"', "\"\""))
}
