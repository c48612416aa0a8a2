use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};

pub const DUCKDB_IMAGE: &str = "datacatering/duckdb:v1.0.0";

/// Options for a `DuckDb` session. Unset values fall back to `Default`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DuckOpts {
    /// Output mode passed to the shell's `.mode` directive.
    pub mode: String,
    /// Materialization format; only "parquet" is supported.
    pub format: String,
    /// Rows per Parquet fragment; 0 writes one fragment per frame.
    pub chunk: usize,
    /// Engine executable; looked up on PATH when unset.
    pub exe: Option<PathBuf>,
    /// How long a materialized result stays reusable. Zero disables caching.
    #[serde(with = "duration_secs")]
    pub cache_duration: Duration,
    /// Run the engine with `docker run` instead of a local executable.
    pub docker: bool,
    pub image: String,
    /// Parent of materialized directories; mounted into the container in docker mode.
    pub temp_dir: PathBuf,
}

impl Default for DuckOpts {
    fn default() -> Self {
        Self {
            mode: "json".to_string(),
            format: "parquet".to_string(),
            chunk: 0,
            exe: None,
            cache_duration: Duration::ZERO,
            docker: false,
            image: DUCKDB_IMAGE.to_string(),
            temp_dir: default_temp_dir(),
        }
    }
}

fn default_temp_dir() -> PathBuf {
    match std::env::var("TMPDIR") {
        Ok(t) if !t.is_empty() => PathBuf::from(t),
        _ => PathBuf::from("/tmp"),
    }
}

impl DuckOpts {
    /// Defaults overlaid with `DUCKFRAME_*` environment variables.
    pub fn from_env() -> AppResult<Self> {
        let mut o = Self::default();
        if let Ok(v) = std::env::var("DUCKFRAME_MODE") { if !v.is_empty() { o.mode = v; } }
        if let Ok(v) = std::env::var("DUCKFRAME_FORMAT") { if !v.is_empty() { o.format = v; } }
        if let Ok(v) = std::env::var("DUCKFRAME_CHUNK") {
            o.chunk = v.trim().parse().map_err(|_| AppError::config(format!("DUCKFRAME_CHUNK must be a row count, got '{}'", v)))?;
        }
        if let Ok(v) = std::env::var("DUCKFRAME_EXE") { if !v.is_empty() { o.exe = Some(PathBuf::from(v)); } }
        if let Ok(v) = std::env::var("DUCKFRAME_CACHE_SECS") {
            let secs: u64 = v.trim().parse().map_err(|_| AppError::config(format!("DUCKFRAME_CACHE_SECS must be seconds, got '{}'", v)))?;
            o.cache_duration = Duration::from_secs(secs);
        }
        if let Ok(v) = std::env::var("DUCKFRAME_DOCKER") {
            o.docker = matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on");
        }
        if let Ok(v) = std::env::var("DUCKFRAME_IMAGE") { if !v.is_empty() { o.image = v; } }
        o.validate()?;
        Ok(o)
    }

    pub fn with_chunk(mut self, chunk: usize) -> Self {
        self.chunk = chunk;
        self
    }

    pub fn with_cache_duration(mut self, d: Duration) -> Self {
        self.cache_duration = d;
        self
    }

    pub fn with_temp_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.temp_dir = dir.into();
        self
    }

    pub fn validate(&self) -> AppResult<()> {
        if !self.format.eq_ignore_ascii_case("parquet") {
            return Err(AppError::config(format!("unsupported format '{}': only parquet is supported", self.format)));
        }
        if self.mode.trim().is_empty() || self.mode.contains(char::is_whitespace) {
            return Err(AppError::config(format!("invalid output mode '{}'", self.mode)));
        }
        Ok(())
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_secs(u64::deserialize(d)?))
    }
}
