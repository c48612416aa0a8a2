//! `DuckDb`: a session bound to one engine, one materialization root and one cache.
//!
//! `query_frames` is the main path: validate the query text, materialize the
//! frames (or reuse a cached materialization), define one view per group and
//! run the query against those views.

use std::path::Path;
use std::sync::Arc;

use tracing::{debug, info};

use crate::cache::{CacheKey, QueryCache};
use crate::config::DuckOpts;
use crate::engine::{DuckDbEngine, Engine};
use crate::error::{AppError, AppResult};
use crate::frame::{Frame, Notice, NoticeSeverity};
use crate::results;
use crate::storage::{escape_sql_literal, quote_ident, view_glob, Dirs, Materializer};
use crate::validate;

pub const CACHE_NOTICE: &str = "Data retrieved from cache";

/// Raw engine output of a frame query.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryOutput {
    pub json: String,
    pub cached: bool,
}

pub struct DuckDb {
    name: String,
    opts: DuckOpts,
    engine: Arc<dyn Engine>,
    cache: QueryCache,
    materializer: Materializer,
}

impl DuckDb {
    /// In-memory database: every call starts from an empty catalog.
    pub fn new_in_memory(opts: DuckOpts) -> AppResult<Self> { Self::new("", opts) }

    /// Database backed by the file `name`; empty for in-memory.
    pub fn new<S: Into<String>>(name: S, opts: DuckOpts) -> AppResult<Self> {
        opts.validate()?;
        let name = name.into();
        let engine = Arc::new(DuckDbEngine::from_opts(&name, &opts));
        Ok(Self::with_engine(name, opts, engine))
    }

    /// Session over a caller supplied engine.
    pub fn with_engine<S: Into<String>>(name: S, opts: DuckOpts, engine: Arc<dyn Engine>) -> Self {
        let materializer = Materializer::new(&opts.temp_dir, opts.chunk);
        Self { name: name.into(), opts, engine, cache: QueryCache::new(), materializer }
    }

    pub fn name(&self) -> &str { &self.name }

    pub fn opts(&self) -> &DuckOpts { &self.opts }

    pub fn cache(&self) -> &QueryCache { &self.cache }

    pub async fn run_commands(&self, commands: &[String]) -> AppResult<String> {
        self.engine.run_commands(commands).await
    }

    pub async fn query(&self, sql: &str) -> AppResult<String> {
        self.run_commands(&[sql.to_string()]).await
    }

    pub async fn validate(&self, sql: &str) -> AppResult<()> {
        validate::validate(self.engine.as_ref(), sql).await
    }

    /// Run `query` over `frames`, each group exposed as a view named by its `ref_id`.
    pub async fn query_frames(&self, name: &str, query: &str, frames: &[Frame]) -> AppResult<QueryOutput> {
        self.validate(query).await?;

        let groups = group_order(frames);
        let materializer = self.materializer.clone();
        let owned = frames.to_vec();
        let engine = Arc::clone(&self.engine);
        let key = CacheKey::new(name, query);
        debug!(target: "duckframe::db", key = %key, groups = groups.len(), "query frames");

        let out = self
            .cache
            .run(
                key,
                self.opts.cache_duration,
                move || materializer.to_parquet(&owned),
                move |dirs| async move {
                    let commands = view_commands(&groups, &dirs, query)?;
                    engine.run_commands(&commands).await
                },
            )
            .await?;
        Ok(QueryOutput { json: out.value, cached: out.cached })
    }

    /// `query_frames`, decoded into a frame. A cache hit adds an info notice to every input frame.
    pub async fn query_frames_to_frame(&self, name: &str, query: &str, frames: &mut [Frame]) -> AppResult<Frame> {
        let out = self.query_frames(name, query, frames).await?;
        let frame = results::results_to_frame(name, &out.json, frames)?;
        if out.cached {
            for f in frames.iter_mut() {
                f.push_notice(Notice { severity: NoticeSeverity::Info, text: CACHE_NOTICE.to_string() });
            }
        }
        Ok(frame)
    }

    /// Drop every cached materialization and remove the database file, if any.
    pub async fn destroy(&self) -> AppResult<()> {
        self.cache.clear().await;
        if self.name.is_empty() {
            return Ok(());
        }
        match std::fs::remove_file(Path::new(&self.name)) {
            Ok(()) => {
                info!(target: "duckframe::db", db = %self.name, "database removed");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(AppError::execution(format!("failed to remove database '{}': {}", self.name, e))),
        }
    }
}

/// Distinct group ids in first-seen order.
fn group_order(frames: &[Frame]) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for f in frames {
        if !out.contains(&f.ref_id) {
            out.push(f.ref_id.clone());
        }
    }
    out
}

/// One `CREATE VIEW` per group followed by the query, terminated for the shell.
pub fn view_commands(groups: &[String], dirs: &Dirs, query: &str) -> AppResult<Vec<String>> {
    let mut commands = Vec::with_capacity(groups.len() + 1);
    for g in groups {
        let dir = dirs
            .get(g)
            .ok_or_else(|| AppError::materialization(format!("no materialized directory for group '{}'", g)))?;
        commands.push(format!("CREATE VIEW {} AS (SELECT * from '{}');", quote_ident(g), escape_sql_literal(&view_glob(dir))));
    }
    let query = query.trim();
    let last_line = query.lines().last().unwrap_or_default();
    if query.ends_with(';') && !last_line.contains("--") {
        commands.push(query.to_string());
    } else {
        // own line, so a trailing `--` comment cannot swallow it
        commands.push(format!("{}\n;", query));
    }
    Ok(commands)
}
