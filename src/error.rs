//! Error types for trueno-compare
//!
//! Toyota Way: Clear error messages with actionable guidance (Respect for People)
//!
//! Only fatal conditions live here. Recoverable conditions (missing results
//! files, replication mismatches) are reported through
//! [`Diagnostic`](crate::diagnostics::Diagnostic) events instead.

use std::collections::BTreeSet;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// trueno-compare error types
#[derive(Error, Debug)]
pub enum Error {
    /// Metadata present but unusable (e.g. benchmark key missing)
    #[error("Malformed run at {path}: {reason}")]
    MalformedRun {
        /// Run directory
        path: PathBuf,
        /// What is wrong with the metadata
        reason: String,
    },

    /// A caller-supplied classifier failed
    #[error("Classifier failed for run {path}: {source}")]
    Classifier {
        /// Run directory the classifier was applied to
        path: PathBuf,
        /// Error raised by the classifier
        #[source]
        source: anyhow::Error,
    },

    /// Configuration field unset or invalid after merging with defaults
    #[error("Configuration error: {field} {reason}")]
    Configuration {
        /// Name of the offending field
        field: String,
        /// What is wrong with it
        reason: String,
    },

    /// Observed setup names differ from the declared ones
    #[error(
        "Filtered results contain setup names {observed:?}, but should contain setup names {expected:?}\nCheck the setup classifier or clean up stale results"
    )]
    SetupSetMismatch {
        /// Setup names found in the result store
        observed: BTreeSet<String>,
        /// Setup names declared by the caller
        expected: BTreeSet<String>,
    },

    /// Benchmark not present in the index
    #[error("Unknown benchmark {requested:?}: benchmark_name must be one of {available:?}")]
    UnknownBenchmark {
        /// Requested benchmark (`None` if omitted with several available)
        requested: Option<String>,
        /// Benchmarks present in the index
        available: Vec<String>,
    },

    /// Subplot index produced by the classifier exceeds the layout
    #[error("Subplot index {index} out of range: layout has {num_subplots} subplots")]
    SubplotOutOfRange {
        /// Offending subplot index
        index: usize,
        /// Number of subplots in the resolved layout
        num_subplots: usize,
    },

    /// Setup name found in results but not declared
    #[error("Unknown setup {0:?}: not in declared setup list")]
    UnknownSetup(String),

    /// Column required for aggregation is absent from the combined table
    #[error("Column not found in results: {0}")]
    MissingColumn(String),

    /// The external aggregation estimator failed
    #[error("Aggregation estimator failed for [{subplot}, {setup}]: {source}")]
    Estimator {
        /// Subplot index of the cell
        subplot: usize,
        /// Setup name of the cell
        setup: String,
        /// Error raised by the estimator
        #[source]
        source: anyhow::Error,
    },

    /// The external renderer failed
    #[error("Renderer failed for benchmark {benchmark}: {source}")]
    Render {
        /// Benchmark being rendered
        benchmark: String,
        /// Error raised by the renderer
        #[source]
        source: anyhow::Error,
    },

    /// Storage error (results tables, store layout)
    #[error("Storage error: {0}")]
    StorageError(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Arrow error
    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    /// JSON error (metadata, configuration files)
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}
