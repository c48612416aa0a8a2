//!
//! duckframe CLI
//! -------------
//! Runs a SQL query against frames loaded from a JSON file, each frame group
//! exposed as a view named by its ref id. Without `--frames` the query runs
//! directly against the engine. Prints the engine's JSON result.

use std::env;
use std::fs;
use std::io::{self, Read};
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use duckframe::{DuckDb, DuckOpts, Frame};

fn print_usage(program: &str) {
    eprintln!(
        "Usage:\n  {program} --frames <frames.json> --query \"<SQL>\" [options]\n  {program} -q \"<SQL>\" [options]          # query the engine directly\n  {program} --frames <frames.json>          # reads query text from stdin\n\nOptions:\n  --name <name>         result name, also part of the cache key (default: query)\n  --db <file>           database file (default: in-memory)\n  --chunk <rows>        rows per parquet fragment (default: 0, one per frame)\n  --cache-secs <secs>   keep materialized frames for reuse (default: 0)\n  --docker              run the engine with docker\n  --exe <path>          engine executable (default: duckdb on PATH)\n\nEnvironment:\n  DUCKFRAME_* variables set the same options; RUST_LOG sets log verbosity."
    );
}

fn load_frames(path: &PathBuf) -> Result<Vec<Frame>> {
    let text = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let doc: serde_json::Value = serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))?;
    let docs = match doc {
        serde_json::Value::Array(items) => items,
        single => vec![single],
    };
    let mut frames = Vec::with_capacity(docs.len());
    for d in &docs {
        frames.push(Frame::from_json(d)?);
    }
    Ok(frames)
}

fn value_of(args: &[String], i: usize, flag: &str, program: &str) -> String {
    match args.get(i + 1) {
        Some(v) => v.clone(),
        None => {
            eprintln!("{flag} requires a value");
            print_usage(program);
            std::process::exit(2);
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new("info"))?;
    fmt().with_env_filter(filter).with_writer(io::stderr).init();

    let mut args: Vec<String> = env::args().collect();
    let program = args.remove(0);

    let mut opts = DuckOpts::from_env()?;
    let mut frames_path: Option<PathBuf> = None;
    let mut query: Option<String> = None;
    let mut name = "query".to_string();
    let mut db_file = String::new();

    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--frames" => { frames_path = Some(PathBuf::from(value_of(&args, i, "--frames", &program))); i += 2; }
            "-q" | "--query" => { query = Some(value_of(&args, i, "--query", &program)); i += 2; }
            "--name" => { name = value_of(&args, i, "--name", &program); i += 2; }
            "--db" => { db_file = value_of(&args, i, "--db", &program); i += 2; }
            "--chunk" => {
                let v = value_of(&args, i, "--chunk", &program);
                opts.chunk = v.parse().map_err(|_| anyhow!("--chunk expects a row count, got '{}'", v))?;
                i += 2;
            }
            "--cache-secs" => {
                let v = value_of(&args, i, "--cache-secs", &program);
                let secs: u64 = v.parse().map_err(|_| anyhow!("--cache-secs expects seconds, got '{}'", v))?;
                opts.cache_duration = Duration::from_secs(secs);
                i += 2;
            }
            "--docker" => { opts.docker = true; i += 1; }
            "--exe" => { opts.exe = Some(PathBuf::from(value_of(&args, i, "--exe", &program))); i += 2; }
            "-h" | "--help" => { print_usage(&program); return Ok(()); }
            other => {
                eprintln!("unknown argument: {other}");
                print_usage(&program);
                std::process::exit(2);
            }
        }
    }

    let query = match query {
        Some(q) => q,
        None => {
            let mut buf = String::new();
            io::stdin().read_to_string(&mut buf)?;
            buf
        }
    };
    if query.trim().is_empty() {
        print_usage(&program);
        std::process::exit(2);
    }

    info!(target: "duckframe", chunk = opts.chunk, cache_secs = opts.cache_duration.as_secs(), docker = opts.docker, "duckframe starting");
    let db = DuckDb::new(db_file, opts)?;

    let out = match frames_path {
        Some(path) => {
            let frames = load_frames(&path)?;
            db.query_frames(&name, &query, &frames).await?.json
        }
        None => db.query(&query).await?,
    };
    print!("{}", out);
    db.cache().clear().await;
    Ok(())
}
