//! Aggregation of repeated runs over wall-clock time
//!
//! The combined table of a benchmark is grouped into cells by
//! `(subplot, setup)`. Within a cell, every run is turned into a best-so-far
//! trajectory, cut to the cell's time window and handed, together with the
//! other runs of the cell, to an external [`AggregationEstimator`]. The
//! estimator returns one [`AggregatedCurve`] per cell.
//!
//! Both optimization modes are aggregated as "lower is better":
//!
//! ```text
//! min:  y_t = multiplier * min(x_0..=x_t)
//! max:  y_t = 1 - multiplier * max(x_0..=x_t)
//! ```
//!
//! The max transform assumes the metric is already scaled into `[0, 1]`;
//! pre-scaling other metrics (via `metric_multiplier`) is up to the caller.

use crate::config::{Mode, ResolvedConfiguration};
use crate::diagnostics::{Diagnostic, DiagnosticSink};
use crate::loader::{CombinedTable, RUN_NAME_COLUMN, SETUP_NAME_COLUMN, SUBPLOT_COLUMN};
use crate::store::TUNER_TIME_COLUMN;
use crate::{Error, Result};
use arrow::array::{Array, Float64Array, StringArray, UInt64Array};
use arrow::record_batch::RecordBatch;
use rustc_hash::FxHashMap;
use std::collections::BTreeMap;

/// Aggregated statistic of one cell (semantics owned by the estimator)
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AggregatedCurve {
    /// Shared time grid
    pub time: Vec<f64>,
    /// Center statistic per grid point
    pub center: Vec<f64>,
    /// Lower band per grid point
    pub lower: Vec<f64>,
    /// Upper band per grid point
    pub upper: Vec<f64>,
}

/// External estimator turning per-run trajectories into one curve
///
/// Implementations must tolerate runs with differing time ranges and sample
/// counts. `mode` selects the statistic (e.g. `"iqm_bootstrap"`) and is
/// opaque to this crate.
pub trait AggregationEstimator {
    /// Aggregate `trajectories[i]` observed at `times[i]`
    ///
    /// # Errors
    /// Any error aborts the aggregation of the benchmark
    fn estimate(
        &self,
        trajectories: &[Vec<f64>],
        times: &[Vec<f64>],
        mode: &str,
    ) -> anyhow::Result<AggregatedCurve>;
}

impl<F> AggregationEstimator for F
where
    F: Fn(&[Vec<f64>], &[Vec<f64>], &str) -> anyhow::Result<AggregatedCurve>,
{
    fn estimate(
        &self,
        trajectories: &[Vec<f64>],
        times: &[Vec<f64>],
        mode: &str,
    ) -> anyhow::Result<AggregatedCurve> {
        self(trajectories, times, mode)
    }
}

/// Aggregated result of one `(subplot, setup)` cell
#[derive(Debug, Clone, PartialEq)]
pub struct AggregatedCell {
    /// Curve returned by the estimator
    pub curve: AggregatedCurve,
    /// Runs of the cell (sorted), including runs dropped by the window
    pub run_names: Vec<String>,
    /// Final wall-clock time of each run in `run_names`
    pub final_times: Vec<f64>,
}

impl AggregatedCell {
    /// Number of runs in the cell
    #[must_use]
    pub fn num_runs(&self) -> usize {
        self.run_names.len()
    }
}

/// Cells indexed `[subplot][setup]`, setups in declared order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CellGrid {
    setups: Vec<String>,
    cells: Vec<Vec<Option<AggregatedCell>>>,
}

impl CellGrid {
    /// Create a grid with all cells unset
    #[must_use]
    pub fn new(num_subplots: usize, setups: Vec<String>) -> Self {
        let cells = (0..num_subplots).map(|_| vec![None; setups.len()]).collect();
        Self { setups, cells }
    }

    /// Number of subplots (rows)
    #[must_use]
    pub fn num_subplots(&self) -> usize {
        self.cells.len()
    }

    /// Setup names (columns)
    #[must_use]
    pub fn setups(&self) -> &[String] {
        &self.setups
    }

    /// Cell at `[subplot][setup_index]`, `None` if unset or out of range
    #[must_use]
    pub fn get(&self, subplot: usize, setup_index: usize) -> Option<&AggregatedCell> {
        self.cells
            .get(subplot)
            .and_then(|row| row.get(setup_index))
            .and_then(Option::as_ref)
    }

    /// Cell of `setup` in `subplot`
    #[must_use]
    pub fn get_by_name(&self, subplot: usize, setup: &str) -> Option<&AggregatedCell> {
        let index = self.setups.iter().position(|s| s == setup)?;
        self.get(subplot, index)
    }

    /// All cells, unset ones included
    #[must_use]
    pub fn rows(&self) -> &[Vec<Option<AggregatedCell>>] {
        &self.cells
    }

    /// Populated cells as `(subplot, setup, cell)`
    pub fn populated(&self) -> impl Iterator<Item = (usize, &str, &AggregatedCell)> + '_ {
        self.cells.iter().enumerate().flat_map(move |(subplot, row)| {
            row.iter()
                .zip(&self.setups)
                .filter_map(move |(cell, setup)| {
                    cell.as_ref().map(|cell| (subplot, setup.as_str(), cell))
                })
        })
    }

    /// Number of populated cells
    #[must_use]
    pub fn num_populated(&self) -> usize {
        self.populated().count()
    }

    fn set(&mut self, subplot: usize, setup_index: usize, cell: AggregatedCell) {
        self.cells[subplot][setup_index] = Some(cell);
    }
}

/// Best-so-far trajectory of `values` under `mode`, scaled by `multiplier`
///
/// ```rust
/// use trueno_compare::aggregate::best_so_far;
/// use trueno_compare::config::Mode;
///
/// assert_eq!(best_so_far(&[5.0, 3.0, 4.0, 2.0], Mode::Min, 1.0), vec![5.0, 3.0, 3.0, 2.0]);
/// ```
#[must_use]
pub fn best_so_far(values: &[f64], mode: Mode, multiplier: f64) -> Vec<f64> {
    let mut out = Vec::with_capacity(values.len());
    let mut best: Option<f64> = None;
    for &value in values {
        let current = match (best, mode) {
            (None, _) => value,
            (Some(b), Mode::Min) => b.min(value),
            (Some(b), Mode::Max) => b.max(value),
        };
        best = Some(current);
        out.push(match mode {
            Mode::Min => multiplier * current,
            Mode::Max => 1.0 - multiplier * current,
        });
    }
    out
}

/// Keep the `(time, value)` pairs with `lower <= time <= upper`
#[must_use]
pub fn slice_window(times: &[f64], values: &[f64], window: (f64, f64)) -> (Vec<f64>, Vec<f64>) {
    let (lower, upper) = window;
    times
        .iter()
        .zip(values)
        .filter(|&(&t, _)| t >= lower && t <= upper)
        .map(|(&t, &v)| (t, v))
        .unzip()
}

/// Time-stamped metric of a single run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunTimeSeries {
    /// Wall-clock time, non-decreasing
    pub time: Vec<f64>,
    /// Metric observed at `time`
    pub metric: Vec<f64>,
}

impl RunTimeSeries {
    /// Final wall-clock time (`0.0` for an empty series)
    #[must_use]
    pub fn final_time(&self) -> f64 {
        self.time.last().copied().unwrap_or(0.0)
    }
}

type CellKey = (usize, String);

/// Runs of one cell, keyed by run name
type CellRuns = BTreeMap<String, RunTimeSeries>;

/// Aggregates a combined table into a [`CellGrid`]
pub struct Aggregator<E> {
    setups: Vec<String>,
    expected_run_count: usize,
    estimator: E,
}

impl<E> Aggregator<E> {
    /// Create an aggregator
    ///
    /// # Arguments
    ///
    /// * `setups` - Declared setup names; fixes the column order of the grid
    /// * `expected_run_count` - Runs (seeds) expected per cell
    /// * `estimator` - External aggregation estimator
    pub fn new(setups: Vec<String>, expected_run_count: usize, estimator: E) -> Self {
        Self {
            setups,
            expected_run_count,
            estimator,
        }
    }

    /// Declared setup names
    #[must_use]
    pub fn setups(&self) -> &[String] {
        &self.setups
    }
}

impl<E: AggregationEstimator> Aggregator<E> {
    /// Aggregate `table` under `config`
    ///
    /// # Errors
    /// Returns error if:
    /// - The time or metric column is missing or not numeric
    /// - A row names a subplot outside the layout or an undeclared setup
    /// - The estimator fails
    pub fn aggregate(
        &self,
        table: &CombinedTable,
        config: &ResolvedConfiguration,
        sink: &dyn DiagnosticSink,
    ) -> Result<CellGrid> {
        let num_subplots = config.num_subplots();
        let mut grid = CellGrid::new(num_subplots, self.setups.clone());

        let groups = group_runs(table.batch(), &config.metric)?;
        let mut keys: Vec<(usize, CellKey)> = Vec::with_capacity(groups.len());
        for (subplot, setup) in groups.keys() {
            if *subplot >= num_subplots {
                return Err(Error::SubplotOutOfRange {
                    index: *subplot,
                    num_subplots,
                });
            }
            let setup_index = self
                .setups
                .iter()
                .position(|s| s == setup)
                .ok_or_else(|| Error::UnknownSetup(setup.clone()))?;
            keys.push((setup_index, (*subplot, setup.clone())));
        }
        // Group map order is arbitrary; report cells row by row
        keys.sort_by_key(|(setup_index, (subplot, _))| (*subplot, *setup_index));

        for (setup_index, key) in keys {
            let runs = &groups[&key];
            let (subplot, setup) = key;
            if let Some(cell) = self.aggregate_cell(subplot, &setup, runs, config, sink)? {
                grid.set(subplot, setup_index, cell);
            }
        }

        tracing::debug!(
            cells = grid.num_populated(),
            subplots = num_subplots,
            setups = self.setups.len(),
            "aggregation finished"
        );
        Ok(grid)
    }

    fn aggregate_cell(
        &self,
        subplot: usize,
        setup: &str,
        runs: &CellRuns,
        config: &ResolvedConfiguration,
        sink: &dyn DiagnosticSink,
    ) -> Result<Option<AggregatedCell>> {
        let window = config.time_window(subplot);
        let label = config.subplots.as_ref().map(|_| subplot);

        let mut trajectories = Vec::with_capacity(runs.len());
        let mut times = Vec::with_capacity(runs.len());
        let mut run_names = Vec::with_capacity(runs.len());
        let mut final_times = Vec::with_capacity(runs.len());

        for (run_name, series) in runs {
            run_names.push(run_name.clone());
            final_times.push(series.final_time());

            let ys = best_so_far(&series.metric, config.mode, config.metric_multiplier);
            let (rt, ys) = match window {
                Some(window) => slice_window(&series.time, &ys, window),
                None => (series.time.clone(), ys),
            };
            if ys.is_empty() {
                sink.emit(Diagnostic::EmptyTrajectory {
                    subplot,
                    setup: setup.to_string(),
                    run: run_name.clone(),
                });
                continue;
            }
            trajectories.push(ys);
            times.push(rt);
        }

        let (mean, std) = mean_std(&final_times);
        sink.emit(Diagnostic::RuntimeSummary {
            subplot: label,
            setup: setup.to_string(),
            mean,
            std,
            num_runs: run_names.len(),
        });
        if run_names.len() != self.expected_run_count {
            sink.emit(Diagnostic::ReplicationMismatch {
                subplot: label,
                setup: setup.to_string(),
                found: run_names.len(),
                expected: self.expected_run_count,
                runs: run_names.clone(),
            });
        }

        if trajectories.is_empty() {
            return Ok(None);
        }
        let curve = self
            .estimator
            .estimate(&trajectories, &times, &config.aggregate_mode)
            .map_err(|source| Error::Estimator {
                subplot,
                setup: setup.to_string(),
                source,
            })?;

        Ok(Some(AggregatedCell {
            curve,
            run_names,
            final_times,
        }))
    }
}

/// Mean and population standard deviation
#[allow(clippy::cast_precision_loss)]
fn mean_std(values: &[f64]) -> (f64, f64) {
    if values.is_empty() {
        return (0.0, 0.0);
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    (mean, var.sqrt())
}

fn typed_column<'a, T: Array + 'static>(
    batch: &'a RecordBatch,
    name: &str,
    expected: &str,
) -> Result<&'a T> {
    let column = batch
        .column_by_name(name)
        .ok_or_else(|| Error::MissingColumn(name.to_string()))?;
    column.as_any().downcast_ref::<T>().ok_or_else(|| {
        Error::StorageError(format!(
            "column {name} has type {}, expected {expected}",
            column.data_type()
        ))
    })
}

/// Split the combined table into `(subplot, setup) → run → series`
///
/// Rows with a null time or metric are skipped.
fn group_runs(batch: &RecordBatch, metric: &str) -> Result<FxHashMap<CellKey, CellRuns>> {
    let setups = typed_column::<StringArray>(batch, SETUP_NAME_COLUMN, "Utf8")?;
    let subplots = typed_column::<UInt64Array>(batch, SUBPLOT_COLUMN, "UInt64")?;
    let run_names = typed_column::<StringArray>(batch, RUN_NAME_COLUMN, "Utf8")?;
    let times = typed_column::<Float64Array>(batch, TUNER_TIME_COLUMN, "Float64")?;
    let metrics = typed_column::<Float64Array>(batch, metric, "Float64")?;

    let mut groups: FxHashMap<CellKey, CellRuns> = FxHashMap::default();
    for row in 0..batch.num_rows() {
        if times.is_null(row) || metrics.is_null(row) {
            continue;
        }
        let subplot = usize::try_from(subplots.value(row)).unwrap_or(usize::MAX);
        let series = groups
            .entry((subplot, setups.value(row).to_string()))
            .or_default()
            .entry(run_names.value(row).to_string())
            .or_default();
        series.time.push(times.value(row));
        series.metric.push(metrics.value(row));
    }
    Ok(groups)
}
