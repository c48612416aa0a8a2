use super::*;
use crate::frame::{Field, FieldKind, FieldType, Value};
use polars::prelude::*;

fn string_frame(ref_id: &str, vals: &[&str]) -> Frame {
    Frame::new(ref_id, vec![Field::new("value", FieldType::required(FieldKind::String), vals.iter().map(|v| Value::from(*v)).collect())])
}

fn parquet_files(dir: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = std::fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().path())
        .filter(|p| p.extension().and_then(|s| s.to_str()) == Some("parquet"))
        .collect();
    files.sort();
    files
}

fn read_all(dir: &Path) -> DataFrame {
    let mut out: Option<DataFrame> = None;
    for p in parquet_files(dir) {
        let df = ParquetReader::new(std::fs::File::open(&p).unwrap()).finish().unwrap();
        match out.as_mut() {
            Some(acc) => { acc.vstack_mut(&df).unwrap(); }
            None => out = Some(df),
        }
    }
    out.unwrap()
}

#[test]
fn test_write_single_fragment() {
    let tmp = tempfile::tempdir().unwrap();
    let m = Materializer::new(tmp.path(), 0);
    let dirs = m.to_parquet(&[string_frame("foo", &["test"])]).unwrap();
    let dir = dirs.get("foo").unwrap();
    assert!(dir.starts_with(tmp.path()));
    assert_eq!(parquet_files(dir).len(), 1);
    let df = read_all(dir);
    assert_eq!(df.height(), 1);
    assert_eq!(df.column("value").unwrap().str().unwrap().get(0), Some("test"));
    wipe(&dirs);
    assert!(!dir.exists());
}

#[test]
fn test_chunked_write_keeps_boundary_rows() {
    let tmp = tempfile::tempdir().unwrap();
    let m = Materializer::new(tmp.path(), 3);
    let frame = string_frame("foo", &["test", "test", "test", "test", "test", "test2"]);
    let dirs = m.to_parquet(&[frame]).unwrap();
    let dir = dirs.get("foo").unwrap();
    assert_eq!(parquet_files(dir).len(), 2);
    let df = read_all(dir);
    assert_eq!(df.height(), 6);
    let vals: Vec<Option<&str>> = df.column("value").unwrap().str().unwrap().into_iter().collect();
    assert!(vals.contains(&Some("test2")));
    wipe(&dirs);
}

#[test]
fn test_make_chunks_ranges() {
    assert_eq!(io::make_chunks(6, 3), vec![(0, 3), (3, 3)]);
    assert_eq!(io::make_chunks(7, 3), vec![(0, 3), (3, 3), (6, 1)]);
    assert_eq!(io::make_chunks(2, 5), vec![(0, 2)]);
    assert!(io::make_chunks(0, 3).is_empty());
}

#[test]
fn test_groups_get_separate_dirs_and_unified_schema() {
    let tmp = tempfile::tempdir().unwrap();
    let m = Materializer::new(tmp.path(), 0);
    let a1 = Frame::new("a", vec![Field::new("v1", FieldType::nullable(FieldKind::Float64), vec![Value::Float(1.0)])]).with_ref_id("A");
    let a2 = Frame::new("a", vec![Field::new("v2", FieldType::nullable(FieldKind::Float64), vec![Value::Float(2.0)])]).with_ref_id("A");
    let b = string_frame("B", &["x"]);
    let dirs = m.to_parquet(&[a1, b, a2]).unwrap();
    assert_eq!(dirs.len(), 2);
    assert_ne!(dirs["A"], dirs["B"]);
    let df = read_all(&dirs["A"]);
    assert_eq!(df.height(), 2);
    let names: Vec<String> = df.get_column_names().iter().map(|c| c.to_string()).collect();
    assert_eq!(names, vec!["v1".to_string(), "v2".to_string()]);
    assert_eq!(df.column("v2").unwrap().null_count(), 1);
    wipe(&dirs);
}

#[test]
fn test_input_frames_are_untouched() {
    let tmp = tempfile::tempdir().unwrap();
    let m = Materializer::new(tmp.path(), 0);
    let mut labels = crate::frame::Labels::new();
    labels.insert("server".into(), "A".into());
    let f = Frame::new("foo", vec![Field::new("v", FieldType::required(FieldKind::Float64), vec![Value::Float(1.0)]).with_labels(labels)]);
    let before = f.clone();
    let dirs = m.to_parquet(std::slice::from_ref(&f)).unwrap();
    assert_eq!(f, before);
    let df = read_all(&dirs["foo"]);
    assert!(df.column("server").is_ok());
    wipe(&dirs);
}

#[test]
fn test_failed_write_removes_partial_dirs() {
    let tmp = tempfile::tempdir().unwrap();
    let m = Materializer::new(tmp.path(), 0);
    let good = string_frame("good", &["a"]);
    let bad = Frame::new("bad", vec![Field::new("d", "decimal".parse().unwrap(), vec![Value::Int(1)])]);
    let err = m.to_parquet(&[good, bad]).unwrap_err();
    assert_eq!(err.code_str(), "unsupported_type");
    let leftovers: Vec<_> = std::fs::read_dir(tmp.path()).unwrap().collect();
    assert!(leftovers.is_empty(), "partial output left behind: {:?}", leftovers);
}

#[test]
fn test_failed_chunk_write_reports_error_after_all_chunks() {
    let tmp = tempfile::tempdir().unwrap();
    // a directory where the second chunk's fragment should go
    std::fs::create_dir(tmp.path().join(paths::fragment_name("foo", 0, 1))).unwrap();
    let df = io::frame_to_df(&string_frame("foo", &["a", "b", "c", "d", "e", "f", "g"])).unwrap();
    let err = io::write_chunks(tmp.path(), "foo", 0, &df, 3).unwrap_err();
    assert_eq!(err.code_str(), "materialization_error");
    // the other chunks still ran
    let written = parquet_files(tmp.path()).into_iter().filter(|p| p.is_file()).count();
    assert_eq!(written, 2);
}

#[test]
fn test_timestamps_written_at_nanoseconds() {
    use chrono::TimeZone;
    let tmp = tempfile::tempdir().unwrap();
    let m = Materializer::new(tmp.path(), 0);
    let t = chrono::Utc.with_ymd_and_hms(2024, 2, 23, 9, 1, 54).unwrap();
    let f = Frame::new("ts", vec![Field::new("time", FieldType::required(FieldKind::Time), vec![Value::Time(t)])]);
    let dirs = m.to_parquet(&[f]).unwrap();
    let df = read_all(&dirs["ts"]);
    assert_eq!(df.column("time").unwrap().dtype(), &DataType::Datetime(TimeUnit::Nanoseconds, None));
    wipe(&dirs);
}
