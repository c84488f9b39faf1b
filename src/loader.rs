//! Results loader: one combined table per benchmark
//!
//! Loads the results table of every run classified under a benchmark, tags
//! each row with its setup, subplot and run identifier, and concatenates
//! everything into a single [`CombinedTable`]. A run whose table is missing
//! or corrupt is skipped with a diagnostic, never failing the whole load.

use crate::diagnostics::{Diagnostic, DiagnosticSink};
use crate::index::RunReference;
use crate::store::ResultStore;
use crate::table::ResultsTable;
use crate::{Error, Result};
use arrow::array::{new_null_array, Array, ArrayRef, StringArray, UInt64Array};
use arrow::compute;
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use std::sync::Arc;

/// Tag column: setup name
pub const SETUP_NAME_COLUMN: &str = "setup_name";

/// Tag column: subplot index
pub const SUBPLOT_COLUMN: &str = "subplot_no";

/// Tag column: run identifier
pub const RUN_NAME_COLUMN: &str = "tuner_name";

const TAG_COLUMNS: [&str; 3] = [SETUP_NAME_COLUMN, SUBPLOT_COLUMN, RUN_NAME_COLUMN];

/// Tagged results of all loaded runs of one benchmark
#[derive(Debug, Clone)]
pub struct CombinedTable {
    batch: RecordBatch,
    num_runs: usize,
}

impl CombinedTable {
    /// Combined record batch (data columns followed by the tag columns)
    #[must_use]
    pub const fn batch(&self) -> &RecordBatch {
        &self.batch
    }

    /// Number of rows over all runs
    #[must_use]
    pub fn num_rows(&self) -> usize {
        self.batch.num_rows()
    }

    /// Number of runs that were loaded successfully
    #[must_use]
    pub const fn num_runs(&self) -> usize {
        self.num_runs
    }

    /// Combine already tagged run tables
    ///
    /// Data columns are the union over all runs in order of first
    /// appearance. A column keeps `Float64` only if it is `Float64` in every
    /// run containing it (all-null columns load as `Float64`); otherwise it
    /// becomes `Utf8`. Columns a run lacks
    /// are null-filled.
    ///
    /// # Errors
    /// Returns error if arrays cannot be cast or concatenated
    pub fn from_runs(runs: Vec<TaggedRun>) -> Result<Self> {
        let mut fields: Vec<(String, DataType)> = Vec::new();
        for run in &runs {
            for field in run.table.batch().schema().fields() {
                if TAG_COLUMNS.contains(&field.name().as_str()) {
                    continue;
                }
                match fields.iter_mut().find(|(name, _)| name == field.name()) {
                    Some((_, data_type)) => {
                        if data_type != field.data_type() {
                            *data_type = DataType::Utf8;
                        }
                    }
                    None => fields.push((field.name().clone(), field.data_type().clone())),
                }
            }
        }

        let mut schema_fields = Vec::with_capacity(fields.len() + TAG_COLUMNS.len());
        let mut columns: Vec<ArrayRef> = Vec::with_capacity(fields.len() + TAG_COLUMNS.len());

        for (name, data_type) in &fields {
            let mut parts: Vec<ArrayRef> = Vec::with_capacity(runs.len());
            for run in &runs {
                let batch = run.table.batch();
                let part = match batch.column_by_name(name) {
                    Some(column) if column.data_type() == data_type => Arc::clone(column),
                    Some(column) => compute::cast(column, data_type)?,
                    None => new_null_array(data_type, batch.num_rows()),
                };
                parts.push(part);
            }
            schema_fields.push(Field::new(name, data_type.clone(), true));
            columns.push(concat_arrays(&parts, data_type)?);
        }

        let mut setups: Vec<&str> = Vec::new();
        let mut subplots: Vec<u64> = Vec::new();
        let mut run_names: Vec<&str> = Vec::new();
        for run in &runs {
            let rows = run.table.num_rows();
            setups.extend(std::iter::repeat(run.setup_name.as_str()).take(rows));
            subplots.extend(std::iter::repeat(run.subplot as u64).take(rows));
            run_names.extend(std::iter::repeat(run.run_name.as_str()).take(rows));
        }
        schema_fields.push(Field::new(SETUP_NAME_COLUMN, DataType::Utf8, false));
        columns.push(Arc::new(StringArray::from(setups)));
        schema_fields.push(Field::new(SUBPLOT_COLUMN, DataType::UInt64, false));
        columns.push(Arc::new(UInt64Array::from(subplots)));
        schema_fields.push(Field::new(RUN_NAME_COLUMN, DataType::Utf8, false));
        columns.push(Arc::new(StringArray::from(run_names)));

        let batch = RecordBatch::try_new(Arc::new(Schema::new(schema_fields)), columns)?;
        Ok(Self {
            batch,
            num_runs: runs.len(),
        })
    }
}

/// A loaded run table together with its tags
#[derive(Debug, Clone)]
pub struct TaggedRun {
    /// Normalized results table
    pub table: ResultsTable,
    /// Setup name
    pub setup_name: String,
    /// Subplot index
    pub subplot: usize,
    /// Run identifier
    pub run_name: String,
}

impl TaggedRun {
    /// Tag `table` with the setup, subplot and run name of `reference`
    #[must_use]
    pub fn new(table: ResultsTable, reference: &RunReference) -> Self {
        Self {
            table,
            setup_name: reference.setup_name().to_string(),
            subplot: reference.subplot(),
            run_name: reference.run_name(),
        }
    }
}

fn concat_arrays(parts: &[ArrayRef], data_type: &DataType) -> Result<ArrayRef> {
    if parts.is_empty() {
        return Ok(new_null_array(data_type, 0));
    }
    let refs: Vec<&dyn Array> = parts.iter().map(|a| a.as_ref()).collect();
    compute::concat(&refs)
        .map_err(|e| Error::StorageError(format!("Failed to combine run tables: {e}")))
}

/// Load and combine the results of `references`
///
/// Returns `Ok(None)` if no run has a readable results table.
///
/// # Errors
/// Returns error only if combining successfully loaded tables fails
pub fn load_combined(
    store: &ResultStore,
    references: &[RunReference],
    sink: &dyn DiagnosticSink,
) -> Result<Option<CombinedTable>> {
    let mut runs = Vec::with_capacity(references.len());
    for reference in references {
        let run_dir = reference.full_path(store);
        match ResultsTable::load_run_dir(&run_dir) {
            Ok(Some(table)) => runs.push(TaggedRun::new(table, reference)),
            Ok(None) => sink.emit(Diagnostic::MissingResults { path: run_dir }),
            Err(e) => sink.emit(Diagnostic::UnreadableResults {
                path: run_dir,
                reason: e.to_string(),
            }),
        }
    }

    if runs.is_empty() {
        return Ok(None);
    }
    tracing::debug!(
        loaded = runs.len(),
        skipped = references.len() - runs.len(),
        "results tables loaded"
    );
    CombinedTable::from_runs(runs).map(Some)
}
