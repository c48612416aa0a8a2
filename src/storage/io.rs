use std::path::Path;

use polars::prelude::*;
use polars::prelude::StatisticsOptions;

use super::paths;
use crate::error::{AppError, AppResult};
use crate::frame::Frame;
use crate::tprintln;
use crate::types;

/// Columnar form of a unified frame.
pub(crate) fn frame_to_df(frame: &Frame) -> AppResult<DataFrame> {
    let mut cols: Vec<Column> = Vec::with_capacity(frame.fields.len());
    for fld in &frame.fields {
        cols.push(types::field_to_series(fld)?.into());
    }
    Ok(DataFrame::new(cols)?)
}

/// Write one Parquet fragment `dir/name`.
pub(crate) fn write_fragment(dir: &Path, name: &str, mut df: DataFrame) -> AppResult<()> {
    let __t0 = std::time::Instant::now();
    let path = dir.join(name);
    let mut file = std::fs::File::create(&path)?;
    ParquetWriter::new(&mut file)
        .with_statistics(StatisticsOptions::default())
        .finish(&mut df)?;
    tprintln!("[STORAGE] write_fragment: '{}' rows={} took={:?}", path.display(), df.height(), __t0.elapsed());
    Ok(())
}

/// Split `rows` into `(offset, len)` ranges of at most `chunk` rows; the last range holds the remainder.
pub(crate) fn make_chunks(rows: usize, chunk: usize) -> Vec<(usize, usize)> {
    if rows == 0 || chunk == 0 {
        return Vec::new();
    }
    (0..rows).step_by(chunk).map(|offset| (offset, chunk.min(rows - offset))).collect()
}

/// Write `df` as one fragment per chunk, one thread per chunk.
///
/// All writes run to completion; the first error in chunk order is returned.
pub(crate) fn write_chunks(dir: &Path, group: &str, frame_idx: usize, df: &DataFrame, chunk: usize) -> AppResult<()> {
    let ranges = make_chunks(df.height(), chunk);
    if ranges.is_empty() {
        // keep the schema visible to the engine even without rows
        return write_fragment(dir, &paths::fragment_name(group, frame_idx, 0), df.clone());
    }
    let results: Vec<AppResult<()>> = std::thread::scope(|scope| {
        let handles: Vec<_> = ranges
            .iter()
            .enumerate()
            .map(|(chunk_idx, &(offset, len))| {
                let part = df.slice(offset as i64, len);
                let name = paths::fragment_name(group, frame_idx, chunk_idx);
                scope.spawn(move || write_fragment(dir, &name, part))
            })
            .collect();
        handles
            .into_iter()
            .map(|h| h.join().unwrap_or_else(|_| Err(AppError::materialization("fragment writer panicked"))))
            .collect()
    });
    results.into_iter().collect::<AppResult<Vec<()>>>().map(|_| ())
}
