//! Per-run results tables (Arrow/Parquet/CSV)
//!
//! Each run directory holds one time-stamped results table, either
//! `results.parquet` or `results.csv`. Tables are normalized on load so that
//! tables of different runs can be combined column by column:
//!
//! - numeric columns (any int/uint/float width) → `Float64`
//! - untyped all-null columns (e.g. an all-empty CSV column) → `Float64`
//! - everything else → `Utf8`

use crate::store::{RESULTS_CSV_FILENAME, RESULTS_PARQUET_FILENAME};
use crate::{Error, Result};
use arrow::array::ArrayRef;
use arrow::compute;
use arrow::datatypes::{DataType, Field, Schema, SchemaRef};
use arrow::record_batch::RecordBatch;
use std::fs::File;
use std::io::Seek;
use std::path::Path;
use std::sync::Arc;

/// Results table of a single run
#[derive(Debug, Clone)]
pub struct ResultsTable {
    batch: RecordBatch,
}

impl ResultsTable {
    /// Wrap an existing batch, normalizing its column types
    ///
    /// # Errors
    /// Returns error if a column cannot be cast to its normalized type
    pub fn new(batch: &RecordBatch) -> Result<Self> {
        Ok(Self {
            batch: normalize(batch)?,
        })
    }

    /// Load the results table of a run directory
    ///
    /// Prefers `results.parquet` over `results.csv`. Returns `None` if the
    /// directory holds neither.
    ///
    /// # Errors
    /// Returns error if the file exists but cannot be read or parsed
    pub fn load_run_dir<P: AsRef<Path>>(run_dir: P) -> Result<Option<Self>> {
        let parquet = run_dir.as_ref().join(RESULTS_PARQUET_FILENAME);
        if parquet.is_file() {
            return Self::load_parquet(parquet).map(Some);
        }
        let csv = run_dir.as_ref().join(RESULTS_CSV_FILENAME);
        if csv.is_file() {
            return Self::load_csv(csv).map(Some);
        }
        Ok(None)
    }

    /// Load table from Parquet file
    ///
    /// # Errors
    /// Returns error if file cannot be read or parsed
    pub fn load_parquet<P: AsRef<Path>>(path: P) -> Result<Self> {
        use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;

        let file = File::open(path.as_ref())
            .map_err(|e| Error::StorageError(format!("Failed to open Parquet file: {e}")))?;

        let builder = ParquetRecordBatchReaderBuilder::try_new(file)
            .map_err(|e| Error::StorageError(format!("Failed to parse Parquet file: {e}")))?;
        let schema = Arc::clone(builder.schema());

        let reader = builder
            .build()
            .map_err(|e| Error::StorageError(format!("Failed to create Parquet reader: {e}")))?;

        let mut batches = Vec::new();
        for batch in reader {
            let batch = batch
                .map_err(|e| Error::StorageError(format!("Failed to read record batch: {e}")))?;
            batches.push(batch);
        }

        Self::from_batches(&schema, &batches)
    }

    /// Load table from CSV file with a header row (schema is inferred)
    ///
    /// # Errors
    /// Returns error if file cannot be read or parsed
    pub fn load_csv<P: AsRef<Path>>(path: P) -> Result<Self> {
        use arrow::csv::reader::Format;
        use arrow::csv::ReaderBuilder;

        let mut file = File::open(path.as_ref())
            .map_err(|e| Error::StorageError(format!("Failed to open CSV file: {e}")))?;

        let (schema, _) = Format::default()
            .with_header(true)
            .infer_schema(&mut file, None)
            .map_err(|e| Error::StorageError(format!("Failed to infer CSV schema: {e}")))?;
        file.rewind()?;

        let schema = Arc::new(schema);
        let reader = ReaderBuilder::new(Arc::clone(&schema))
            .with_header(true)
            .build(file)
            .map_err(|e| Error::StorageError(format!("Failed to create CSV reader: {e}")))?;

        let mut batches = Vec::new();
        for batch in reader {
            let batch = batch
                .map_err(|e| Error::StorageError(format!("Failed to read CSV record batch: {e}")))?;
            batches.push(batch);
        }

        Self::from_batches(&schema, &batches)
    }

    fn from_batches(schema: &SchemaRef, batches: &[RecordBatch]) -> Result<Self> {
        let combined = compute::concat_batches(schema, batches)
            .map_err(|e| Error::StorageError(format!("Failed to combine batches: {e}")))?;
        Self::new(&combined)
    }

    /// Normalized record batch
    #[must_use]
    pub const fn batch(&self) -> &RecordBatch {
        &self.batch
    }

    /// Number of rows
    #[must_use]
    pub fn num_rows(&self) -> usize {
        self.batch.num_rows()
    }

    /// Consume the table, returning the batch
    #[must_use]
    pub fn into_batch(self) -> RecordBatch {
        self.batch
    }
}

/// Column type after normalization
#[must_use]
pub fn normalized_type(data_type: &DataType) -> DataType {
    if data_type.is_numeric() || data_type == &DataType::Null {
        DataType::Float64
    } else {
        DataType::Utf8
    }
}

fn normalize(batch: &RecordBatch) -> Result<RecordBatch> {
    if batch.num_columns() == 0 {
        return Ok(batch.clone());
    }

    let schema = batch.schema();
    let mut fields = Vec::with_capacity(batch.num_columns());
    let mut columns: Vec<ArrayRef> = Vec::with_capacity(batch.num_columns());
    for (field, column) in schema.fields().iter().zip(batch.columns()) {
        let target = normalized_type(field.data_type());
        let column = if column.data_type() == &target {
            Arc::clone(column)
        } else {
            compute::cast(column, &target)?
        };
        fields.push(Field::new(field.name(), target, true));
        columns.push(column);
    }

    Ok(RecordBatch::try_new(Arc::new(Schema::new(fields)), columns)?)
}
