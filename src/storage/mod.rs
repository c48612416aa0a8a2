//!
//! duckframe storage module
//! ------------------------
//! This module materializes frame groups as Parquet fragments that the engine
//! reads through one view per group. Each group gets a fresh temporary
//! directory under the configured root; every frame of the group is written as
//! one fragment, or as one fragment per `chunk` rows when chunking is enabled.
//! The engine picks fragments up with a `<dir>/*.parquet` glob, so a group's
//! rows are the concatenation of its frames' rows.
//!
//! Key responsibilities:
//! - Grouping frames by `ref_id` and unifying each group's schema.
//! - Writing fragments, in parallel when chunked, failing the whole call if any
//!   fragment fails.
//! - Removing every directory created by a failed call.
//!
//! Ownership of the returned directories passes to the caller; `wipe` deletes them.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tracing::{debug, error, warn};

use crate::error::AppResult;
use crate::frame::Frame;
use crate::unify;

mod io;
mod paths;

pub use paths::{escape_sql_literal, quote_ident, view_glob};

/// Materialized directory per group id.
pub type Dirs = HashMap<String, PathBuf>;

/// Writes frame groups to Parquet fragments under a temp root.
#[derive(Debug, Clone)]
pub struct Materializer {
    /// Parent folder for per-group temp directories.
    root: PathBuf,
    /// Rows per fragment; 0 writes one fragment per frame.
    chunk: usize,
}

impl Materializer {
    pub fn new<P: AsRef<Path>>(root: P, chunk: usize) -> Self {
        Self { root: root.as_ref().to_path_buf(), chunk }
    }

    pub fn root_path(&self) -> &Path { &self.root }

    pub fn chunk(&self) -> usize { self.chunk }

    /// Unify and write every group of `frames`. The input frames are not modified.
    pub fn to_parquet(&self, frames: &[Frame]) -> AppResult<Dirs> {
        let mut dirs: Dirs = HashMap::new();
        match self.write_groups(frames, &mut dirs) {
            Ok(()) => Ok(dirs),
            Err(e) => {
                error!(target: "duckframe::storage", error = %e, "materialization failed; removing partial output");
                wipe(&dirs);
                Err(e)
            }
        }
    }

    fn write_groups(&self, frames: &[Frame], dirs: &mut Dirs) -> AppResult<()> {
        for f in frames {
            f.check_row_len()?;
        }
        for (group, mut group_frames) in unify::frames_by_ref(frames.to_vec()) {
            unify::unify_group(&group, &mut group_frames)?;
            let dir = paths::create_group_dir(&self.root)?;
            dirs.insert(group.clone(), dir.clone());
            debug!(target: "duckframe::storage", group = %group, dir = %dir.display(), frames = group_frames.len(), chunk = self.chunk, "materializing group");
            for (frame_idx, frame) in group_frames.iter().enumerate() {
                let df = io::frame_to_df(frame)?;
                if self.chunk > 0 {
                    io::write_chunks(&dir, &group, frame_idx, &df, self.chunk)?;
                } else {
                    io::write_fragment(&dir, &paths::fragment_name(&group, frame_idx, 0), df)?;
                }
            }
        }
        Ok(())
    }
}

/// Remove materialized directories; failures are logged, not returned.
pub fn wipe(dirs: &Dirs) {
    for dir in dirs.values() {
        if let Err(e) = std::fs::remove_dir_all(dir) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(target: "duckframe::storage", dir = %dir.display(), error = %e, "failed to remove parquet files");
            }
        }
    }
}

#[cfg(test)]
#[path = "storage_tests.rs"]
mod storage_tests;
