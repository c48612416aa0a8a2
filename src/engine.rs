//! Engine process protocol.
//!
//! The engine is the `duckdb` command line shell, run locally or in a
//! container. One call is one process: a `.mode` directive followed by
//! newline-terminated statements on stdin, results on stdout, and any stderr
//! output treated as failure.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, error};

use crate::config::DuckOpts;
use crate::error::{AppError, AppResult};

const NEWLINE: &str = "\n";
const FALLBACK_EXE: &str = "/usr/local/bin/duckdb";

/// Runs a batch of statements and returns the engine's stdout.
#[async_trait]
pub trait Engine: Send + Sync {
    async fn run_commands(&self, commands: &[String]) -> AppResult<String>;
}

/// How the engine process is launched.
#[derive(Debug, Clone, PartialEq)]
pub enum Launcher {
    /// Local executable, optionally opening a database file.
    Local { exe: PathBuf, database: Option<String> },
    /// `docker run -i -v <volume>:<volume> <image>`.
    Docker { image: String, volume: PathBuf },
}

#[derive(Debug, Clone)]
pub struct DuckDbEngine {
    launcher: Launcher,
    mode: String,
}

impl DuckDbEngine {
    pub fn new(launcher: Launcher, mode: impl Into<String>) -> Self {
        Self { launcher, mode: mode.into() }
    }

    /// Engine for `opts`; `database` is the file name for persistent databases, empty for in-memory.
    pub fn from_opts(database: &str, opts: &DuckOpts) -> Self {
        let launcher = if opts.docker {
            Launcher::Docker { image: opts.image.clone(), volume: opts.temp_dir.clone() }
        } else {
            let exe = opts.exe.clone().or_else(|| find_executable("duckdb")).unwrap_or_else(|| PathBuf::from(FALLBACK_EXE));
            let database = if database.is_empty() { None } else { Some(database.to_string()) };
            Launcher::Local { exe, database }
        };
        Self::new(launcher, opts.mode.clone())
    }

    pub fn launcher(&self) -> &Launcher { &self.launcher }

    fn command(&self) -> Command {
        match &self.launcher {
            Launcher::Local { exe, database } => {
                let mut cmd = Command::new(exe);
                if let Some(db) = database {
                    cmd.arg(db);
                }
                cmd
            }
            Launcher::Docker { image, volume } => {
                let mount = format!("{}:{}", volume.display(), volume.display());
                debug!(target: "duckframe::engine", volume = %mount, image = %image, "running command in docker");
                let mut cmd = Command::new("docker");
                cmd.args(["run", "-i", "-v", &mount, image]);
                cmd
            }
        }
    }
}

/// Stdin script for one batch: mode directive, then each statement on its own line.
pub fn script(mode: &str, commands: &[String]) -> String {
    let mut b = format!(".mode {} {}", mode, NEWLINE);
    for c in commands {
        b.push_str(c);
        b.push(' ');
        b.push_str(NEWLINE);
    }
    b
}

#[async_trait]
impl Engine for DuckDbEngine {
    async fn run_commands(&self, commands: &[String]) -> AppResult<String> {
        let input = script(&self.mode, commands);
        let mut child = self
            .command()
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| AppError::execution(format!("failed to start engine: {}", e)))?;

        if let Some(mut stdin) = child.stdin.take() {
            match stdin.write_all(input.as_bytes()).await {
                Ok(()) => {}
                // the engine exited before reading everything; its status and stderr tell why
                Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe => {
                    debug!(target: "duckframe::engine", error = %e, "engine closed its input early");
                }
                Err(e) => return Err(AppError::execution(format!("failed to write engine input: {}", e))),
            }
            // closing stdin ends the shell session
            drop(stdin);
        }

        let out = child
            .wait_with_output()
            .await
            .map_err(|e| AppError::execution(format!("engine did not complete: {}", e)))?;
        let stderr = String::from_utf8_lossy(&out.stderr).into_owned();
        if !out.status.success() {
            let message = format!("{}{}", out.status, stderr);
            error!(target: "duckframe::engine", cmd = %input, message = %message, "error running command");
            return Err(AppError::execution(message));
        }
        if !stderr.is_empty() {
            error!(target: "duckframe::engine", cmd = %input, error = %stderr, "error running command");
            return Err(AppError::execution(stderr));
        }
        Ok(String::from_utf8_lossy(&out.stdout).into_owned())
    }
}

/// First `name` found on `PATH`.
pub fn find_executable(name: &str) -> Option<PathBuf> {
    let path = std::env::var_os("PATH")?;
    std::env::split_paths(&path).map(|dir| dir.join(name)).find(|p| is_executable(p))
}

fn is_executable(p: &Path) -> bool {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        p.metadata().map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0).unwrap_or(false)
    }
    #[cfg(not(unix))]
    {
        p.is_file()
    }
}
