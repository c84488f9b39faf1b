//! Non-fatal pipeline diagnostics
//!
//! Recoverable conditions (a run without results, a cell with fewer seeds
//! than expected) never abort the pipeline. They are emitted as
//! [`Diagnostic`] events into a [`DiagnosticSink`] passed by the caller.
//!
//! - [`NoopSink`]: discards everything (default)
//! - [`TracingSink`]: forwards to `tracing` at a per-event level
//! - [`CollectingSink`]: keeps events in memory for inspection

use std::fmt;
use std::path::PathBuf;
use std::sync::Mutex;

/// A recoverable condition observed while building, loading or aggregating
#[derive(Debug, Clone, PartialEq)]
pub enum Diagnostic {
    /// Store patterns scanned for one experiment name
    ScanPatterns {
        /// Experiment name prefix
        experiment: String,
        /// Wildcard patterns relative to the store root
        patterns: Vec<String>,
    },
    /// Metadata matched but no results table exists
    MissingResults {
        /// Run directory
        path: PathBuf,
    },
    /// Results table exists but could not be parsed
    UnreadableResults {
        /// Results file
        path: PathBuf,
        /// Parser error
        reason: String,
    },
    /// No run of a benchmark produced a results table
    NoData {
        /// Benchmark name
        benchmark: String,
    },
    /// A run contributes no samples inside the time window
    EmptyTrajectory {
        /// Subplot index
        subplot: usize,
        /// Setup name
        setup: String,
        /// Run identifier
        run: String,
    },
    /// Final wall-clock time summary for one cell
    RuntimeSummary {
        /// Subplot index (`None` without a subplot layout)
        subplot: Option<usize>,
        /// Setup name
        setup: String,
        /// Mean of per-run final times
        mean: f64,
        /// Population standard deviation of per-run final times
        std: f64,
        /// Number of contributing runs
        num_runs: usize,
    },
    /// A cell has a different number of runs than expected
    ReplicationMismatch {
        /// Subplot index (`None` without a subplot layout)
        subplot: Option<usize>,
        /// Setup name
        setup: String,
        /// Runs found
        found: usize,
        /// Runs expected
        expected: usize,
        /// Identifiers of the runs found
        runs: Vec<String>,
    },
}

fn cell_label(subplot: Option<usize>, setup: &str) -> String {
    subplot.map_or_else(|| format!("[{setup}]"), |s| format!("[{s}, {setup}]"))
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ScanPatterns {
                experiment,
                patterns,
            } => write!(f, "{experiment}: patterns = {patterns:?}"),
            Self::MissingResults { path } => write!(
                f,
                "{}: Meta-data matches filter, but results file not found. Skipping.",
                path.display()
            ),
            Self::UnreadableResults { path, reason } => {
                write!(f, "{}: cannot read results table: {reason}", path.display())
            }
            Self::NoData { benchmark } => {
                write!(f, "{benchmark}: no results found for any run")
            }
            Self::EmptyTrajectory {
                subplot,
                setup,
                run,
            } => write!(
                f,
                "[{subplot}, {setup}]: run {run} has no samples inside the time window. Dropped."
            ),
            Self::RuntimeSummary {
                subplot,
                setup,
                mean,
                std,
                num_runs,
            } => write!(
                f,
                "{}: max_rt = {mean:.2} (+- {std:.2}) over {num_runs} runs",
                cell_label(*subplot, setup)
            ),
            Self::ReplicationMismatch {
                subplot,
                setup,
                found,
                expected,
                runs,
            } => {
                let part = subplot.map_or_else(String::new, |s| format!("subplot = {s}, "));
                write!(
                    f,
                    "{part}setup = {setup} has {found} repeats instead of {expected}:\n{runs:?}"
                )
            }
        }
    }
}

/// Receiver for [`Diagnostic`] events
pub trait DiagnosticSink {
    /// Handle one event
    fn emit(&self, diagnostic: Diagnostic);
}

/// Discards all diagnostics
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSink;

impl DiagnosticSink for NoopSink {
    fn emit(&self, _diagnostic: Diagnostic) {}
}

/// Forwards diagnostics to `tracing`
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl DiagnosticSink for TracingSink {
    fn emit(&self, diagnostic: Diagnostic) {
        match &diagnostic {
            Diagnostic::ScanPatterns { .. } => tracing::debug!("{diagnostic}"),
            Diagnostic::RuntimeSummary { .. } => tracing::info!("{diagnostic}"),
            Diagnostic::MissingResults { .. }
            | Diagnostic::UnreadableResults { .. }
            | Diagnostic::NoData { .. }
            | Diagnostic::EmptyTrajectory { .. }
            | Diagnostic::ReplicationMismatch { .. } => tracing::warn!("{diagnostic}"),
        }
    }
}

/// Records diagnostics in memory
#[derive(Debug, Default)]
pub struct CollectingSink {
    events: Mutex<Vec<Diagnostic>>,
}

impl CollectingSink {
    /// Create an empty sink
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the events received so far
    #[must_use]
    pub fn events(&self) -> Vec<Diagnostic> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }
}

impl DiagnosticSink for CollectingSink {
    fn emit(&self, diagnostic: Diagnostic) {
        if let Ok(mut events) = self.events.lock() {
            events.push(diagnostic);
        }
    }
}

impl<S: DiagnosticSink + ?Sized> DiagnosticSink for &S {
    fn emit(&self, diagnostic: Diagnostic) {
        (**self).emit(diagnostic);
    }
}
