//! Shared fixtures: throwaway result stores on disk

#![allow(dead_code)]

use arrow::array::{Float64Array, Int64Array, RecordBatch};
use arrow::datatypes::{DataType, Field, Schema};
use parquet::arrow::ArrowWriter;
use serde_json::Value;
use std::fs::{self, File};
use std::path::Path;
use std::sync::Arc;
use trueno_compare::store::{
    ResultStore, METADATA_FILENAME, RESULTS_CSV_FILENAME, RESULTS_PARQUET_FILENAME,
};

/// Result store in a fresh temporary directory, removed when the guard drops
pub fn temp_store() -> (tempfile::TempDir, ResultStore) {
    let dir = tempfile::tempdir().unwrap();
    let store = ResultStore::new(dir.path());
    (dir, store)
}

/// Create `rel` below the store root with the given metadata
pub fn write_metadata(store: &ResultStore, rel: &str, metadata: &Value) -> std::path::PathBuf {
    let dir = store.join(rel);
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join(METADATA_FILENAME), metadata.to_string()).unwrap();
    dir
}

/// Write `results.csv` with `trial_id`, `st_tuner_time` and `metric` columns
pub fn write_csv_results(dir: &Path, metric: &str, time: &[f64], values: &[f64]) {
    let mut text = format!("trial_id,st_tuner_time,{metric}\n");
    for (i, (t, v)) in time.iter().zip(values).enumerate() {
        text.push_str(&format!("{i},{t},{v}\n"));
    }
    fs::write(dir.join(RESULTS_CSV_FILENAME), text).unwrap();
}

/// Write `results.parquet` with `trial_id`, `st_tuner_time` and `metric` columns
pub fn write_parquet_results(dir: &Path, metric: &str, time: &[f64], values: &[f64]) {
    let schema = Arc::new(Schema::new(vec![
        Field::new("trial_id", DataType::Int64, false),
        Field::new("st_tuner_time", DataType::Float64, false),
        Field::new(metric, DataType::Float64, false),
    ]));
    let ids: Vec<i64> = (0..time.len() as i64).collect();
    let batch = RecordBatch::try_new(
        Arc::clone(&schema),
        vec![
            Arc::new(Int64Array::from(ids)),
            Arc::new(Float64Array::from(time.to_vec())),
            Arc::new(Float64Array::from(values.to_vec())),
        ],
    )
    .unwrap();
    let file = File::create(dir.join(RESULTS_PARQUET_FILENAME)).unwrap();
    let mut writer = ArrowWriter::try_new(file, schema, None).unwrap();
    writer.write(&batch).unwrap();
    writer.close().unwrap();
}
