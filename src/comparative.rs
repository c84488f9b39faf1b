//! Comparative study over a result store
//!
//! [`ComparativeResults`] ties the pipeline together: it indexes the store
//! once, checks that exactly the declared setups were found, and then
//! loads, aggregates and hands to a [`PlotSink`] one benchmark at a time.
//!
//! ```text
//! ResultStore ──scan──> ResultIndex ──load──> CombinedTable
//!                                                 │
//!                        PlotSink <──render── CellGrid <──aggregate──┘
//! ```
//!
//! ## Example
//!
//! ```rust,no_run
//! use trueno_compare::aggregate::AggregatedCurve;
//! use trueno_compare::classify::setup_from_key;
//! use trueno_compare::comparative::ComparativeResults;
//! use trueno_compare::config::{Mode, PlotConfiguration};
//! use trueno_compare::diagnostics::TracingSink;
//! use trueno_compare::store::ResultStore;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let by_algorithm = setup_from_key("algorithm");
//! let first_run = |ys: &[Vec<f64>], ts: &[Vec<f64>], _: &str| -> anyhow::Result<AggregatedCurve> {
//!     Ok(AggregatedCurve {
//!         time: ts[0].clone(),
//!         center: ys[0].clone(),
//!         lower: ys[0].clone(),
//!         upper: ys[0].clone(),
//!     })
//! };
//!
//! let results = ComparativeResults::builder(ResultStore::from_env()?, ["RS", "BO"], 5, &by_algorithm)
//!     .default_config(PlotConfiguration {
//!         metric: Some("val_loss".into()),
//!         mode: Some(Mode::Min),
//!         ..PlotConfiguration::default()
//!     })
//!     .build(&["odsc-1"], first_run, &TracingSink)?;
//!
//! if let Some(grid) = results.aggregate(None, None, &TracingSink)? {
//!     println!("{} cells", grid.num_populated());
//! }
//! # Ok(())
//! # }
//! ```

use crate::aggregate::{AggregationEstimator, Aggregator, CellGrid};
use crate::classify::{SetupClassifier, SubplotClassifier};
use crate::config::{PlotConfiguration, ResolvedConfiguration};
use crate::diagnostics::{Diagnostic, DiagnosticSink};
use crate::index::{IndexBuilder, MetadataValues, ResultIndex, DEFAULT_BENCHMARK_KEY};
use crate::loader;
use crate::store::ResultStore;
use crate::{Error, Result};

/// External renderer receiving one aggregated benchmark at a time
pub trait PlotSink {
    /// Draw `grid` for `benchmark` under the resolved `config`
    ///
    /// # Errors
    /// Any error aborts the plot call
    fn render(
        &mut self,
        benchmark: &str,
        config: &ResolvedConfiguration,
        grid: &CellGrid,
    ) -> anyhow::Result<()>;
}

impl<F> PlotSink for F
where
    F: FnMut(&str, &ResolvedConfiguration, &CellGrid) -> anyhow::Result<()>,
{
    fn render(
        &mut self,
        benchmark: &str,
        config: &ResolvedConfiguration,
        grid: &CellGrid,
    ) -> anyhow::Result<()> {
        self(benchmark, config, grid)
    }
}

/// Indexed comparative study of several setups
pub struct ComparativeResults<E> {
    store: ResultStore,
    index: ResultIndex,
    default_config: PlotConfiguration,
    aggregator: Aggregator<E>,
}

impl<E> std::fmt::Debug for ComparativeResults<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComparativeResults")
            .field("store", &self.store)
            .field("benchmarks", &self.index.benchmark_names())
            .field("setups", &self.aggregator.setups())
            .finish_non_exhaustive()
    }
}

impl ComparativeResults<()> {
    /// Start building a study
    ///
    /// # Arguments
    ///
    /// * `store` - Result store to scan
    /// * `setups` - Declared setup names, in plot order
    /// * `num_runs` - Runs (seeds) expected per setup and subplot
    /// * `setup_classifier` - Maps run metadata to a setup name
    pub fn builder<'a, I, S>(
        store: ResultStore,
        setups: I,
        num_runs: usize,
        setup_classifier: &'a dyn SetupClassifier,
    ) -> ComparativeResultsBuilder<'a>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        ComparativeResultsBuilder::new(store, setups, num_runs, setup_classifier)
    }
}

impl<E: AggregationEstimator> ComparativeResults<E> {
    /// Benchmarks found in the store (sorted)
    #[must_use]
    pub fn benchmark_names(&self) -> Vec<String> {
        self.index.benchmark_names()
    }

    /// Auxiliary metadata values per benchmark and key
    #[must_use]
    pub const fn metadata_values(&self) -> Option<&MetadataValues> {
        self.index.metadata_values()
    }

    /// Underlying result index
    #[must_use]
    pub const fn index(&self) -> &ResultIndex {
        &self.index
    }

    /// Declared setup names, in plot order
    #[must_use]
    pub fn setups(&self) -> &[String] {
        self.aggregator.setups()
    }

    /// Load and aggregate the results of one benchmark
    ///
    /// `benchmark` may be omitted if the store holds a single benchmark.
    /// `config` overrides the study defaults field by field. Returns
    /// `Ok(None)` if none of the benchmark's runs has a readable results
    /// table.
    ///
    /// # Errors
    /// Returns error if:
    /// - The benchmark is unknown, or omitted while several exist
    /// - The merged configuration lacks a required field (checked before
    ///   any results are read)
    /// - Aggregation fails (see [`Aggregator::aggregate`])
    pub fn aggregate(
        &self,
        benchmark: Option<&str>,
        config: Option<&PlotConfiguration>,
        sink: &dyn DiagnosticSink,
    ) -> Result<Option<CellGrid>> {
        Ok(self
            .resolve_and_aggregate(benchmark, config, sink)?
            .map(|(_, _, grid)| grid))
    }

    /// Aggregate one benchmark and hand the result to `renderer`
    ///
    /// The renderer is not called if the benchmark has no data.
    ///
    /// # Errors
    /// See [`ComparativeResults::aggregate`]; renderer failures are
    /// returned as [`Error::Render`]
    pub fn plot(
        &self,
        benchmark: Option<&str>,
        config: Option<&PlotConfiguration>,
        sink: &dyn DiagnosticSink,
        renderer: &mut dyn PlotSink,
    ) -> Result<Option<CellGrid>> {
        let Some((benchmark, resolved, grid)) =
            self.resolve_and_aggregate(benchmark, config, sink)?
        else {
            return Ok(None);
        };
        renderer
            .render(&benchmark, &resolved, &grid)
            .map_err(|source| Error::Render {
                benchmark: benchmark.clone(),
                source,
            })?;
        Ok(Some(grid))
    }

    fn resolve_and_aggregate(
        &self,
        benchmark: Option<&str>,
        config: Option<&PlotConfiguration>,
        sink: &dyn DiagnosticSink,
    ) -> Result<Option<(String, ResolvedConfiguration, CellGrid)>> {
        let benchmark = self.select_benchmark(benchmark)?;
        let resolved = match config {
            Some(config) => config.resolve(&self.default_config)?,
            None => self.default_config.resolve(&PlotConfiguration::default())?,
        };

        let references = self.index.runs(&benchmark).unwrap_or_default();
        tracing::info!(
            benchmark = %benchmark,
            runs = references.len(),
            "load results for benchmark"
        );
        let Some(table) = loader::load_combined(&self.store, references, sink)? else {
            sink.emit(Diagnostic::NoData {
                benchmark: benchmark.clone(),
            });
            return Ok(None);
        };

        tracing::info!(
            benchmark = %benchmark,
            rows = table.num_rows(),
            metric = %resolved.metric,
            "aggregate results"
        );
        let grid = self.aggregator.aggregate(&table, &resolved, sink)?;
        Ok(Some((benchmark, resolved, grid)))
    }

    fn select_benchmark(&self, requested: Option<&str>) -> Result<String> {
        let available = self.index.benchmark_names();
        match requested {
            Some(name) if available.iter().any(|b| b == name) => Ok(name.to_string()),
            None if available.len() == 1 => Ok(available[0].clone()),
            _ => Err(Error::UnknownBenchmark {
                requested: requested.map(str::to_string),
                available,
            }),
        }
    }
}

/// Builder for [`ComparativeResults`]
pub struct ComparativeResultsBuilder<'a> {
    store: ResultStore,
    setups: Vec<String>,
    num_runs: usize,
    setup_classifier: &'a dyn SetupClassifier,
    subplot_classifier: Option<&'a dyn SubplotClassifier>,
    benchmark_key: String,
    subdir_patterns: Option<Vec<String>>,
    extra_metadata_keys: Vec<String>,
    default_config: PlotConfiguration,
}

impl<'a> ComparativeResultsBuilder<'a> {
    /// Create a new builder with required fields.
    #[must_use]
    pub fn new<I, S>(
        store: ResultStore,
        setups: I,
        num_runs: usize,
        setup_classifier: &'a dyn SetupClassifier,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            store,
            setups: setups.into_iter().map(Into::into).collect(),
            num_runs,
            setup_classifier,
            subplot_classifier: None,
            benchmark_key: DEFAULT_BENCHMARK_KEY.to_string(),
            subdir_patterns: None,
            extra_metadata_keys: Vec::new(),
            default_config: PlotConfiguration::default(),
        }
    }

    /// Configuration every plot call starts from
    #[must_use]
    pub fn default_config(mut self, config: PlotConfiguration) -> Self {
        self.default_config = config;
        self
    }

    /// Classify runs into subplots
    #[must_use]
    pub fn subplot_classifier(mut self, classifier: &'a dyn SubplotClassifier) -> Self {
        self.subplot_classifier = Some(classifier);
        self
    }

    /// Metadata key holding the benchmark name
    #[must_use]
    pub fn benchmark_key(mut self, key: impl Into<String>) -> Self {
        self.benchmark_key = key.into();
        self
    }

    /// Look for runs in subdirectories of each experiment
    #[must_use]
    pub fn subdir_patterns<I, S>(mut self, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.subdir_patterns = Some(patterns.into_iter().map(Into::into).collect());
        self
    }

    /// Collect values of these metadata keys per benchmark
    #[must_use]
    pub fn extra_metadata_keys<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.extra_metadata_keys = keys.into_iter().map(Into::into).collect();
        self
    }

    /// Index the store and validate the observed setups
    ///
    /// # Errors
    /// Returns error if indexing fails (see [`IndexBuilder::build`]) or the
    /// observed setup names differ from the declared ones
    pub fn build<S, E>(
        self,
        experiment_names: &[S],
        estimator: E,
        sink: &dyn DiagnosticSink,
    ) -> Result<ComparativeResults<E>>
    where
        S: AsRef<str>,
        E: AggregationEstimator,
    {
        let mut builder = IndexBuilder::new(&self.store, self.setup_classifier)
            .benchmark_key(self.benchmark_key.as_str())
            .extra_metadata_keys(self.extra_metadata_keys.iter().map(String::as_str));
        if let Some(classifier) = self.subplot_classifier {
            builder = builder.subplot_classifier(classifier);
        }
        if let Some(patterns) = &self.subdir_patterns {
            builder = builder.subdir_patterns(patterns.iter().map(String::as_str));
        }

        let index = builder.build(experiment_names, sink)?;
        index.validate_setups(&self.setups)?;
        tracing::info!(
            benchmarks = index.benchmark_names().len(),
            runs = index.num_runs(),
            "comparative study indexed"
        );

        Ok(ComparativeResults {
            store: self.store,
            index,
            default_config: self.default_config,
            aggregator: Aggregator::new(self.setups, self.num_runs, estimator),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::AggregatedCurve;
    use crate::classify::{setup_from_key, RunMetadata};
    use crate::config::Mode;
    use crate::diagnostics::{CollectingSink, NoopSink};
    use crate::store::{METADATA_FILENAME, RESULTS_CSV_FILENAME};
    use serde_json::json;
    use std::fs;

    fn temp_store() -> (tempfile::TempDir, ResultStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = ResultStore::new(dir.path());
        (dir, store)
    }

    fn write_run(store: &ResultStore, name: &str, benchmark: &str, algorithm: &str, csv: Option<&str>) {
        let dir = store.join(name);
        fs::create_dir_all(&dir).unwrap();
        let metadata = json!({"benchmark": benchmark, "algorithm": algorithm});
        fs::write(dir.join(METADATA_FILENAME), metadata.to_string()).unwrap();
        if let Some(csv) = csv {
            fs::write(dir.join(RESULTS_CSV_FILENAME), csv).unwrap();
        }
    }

    fn mean_curve(
        trajectories: &[Vec<f64>],
        times: &[Vec<f64>],
        _mode: &str,
    ) -> anyhow::Result<AggregatedCurve> {
        let center = trajectories
            .iter()
            .map(|ys| ys.last().copied().unwrap_or(f64::NAN))
            .collect();
        Ok(AggregatedCurve {
            time: times.iter().map(|ts| ts.last().copied().unwrap_or(0.0)).collect(),
            center,
            ..AggregatedCurve::default()
        })
    }

    fn defaults() -> PlotConfiguration {
        PlotConfiguration {
            metric: Some("loss".into()),
            mode: Some(Mode::Min),
            ..PlotConfiguration::default()
        }
    }

    #[test]
    fn test_single_benchmark_selected_implicitly() {
        let (_dir, store) = temp_store();
        write_run(&store, "exp-1", "b1", "A", Some("st_tuner_time,loss\n1,3\n2,1\n"));
        write_run(&store, "exp-2", "b1", "B", Some("st_tuner_time,loss\n1,2\n"));

        let classifier = setup_from_key("algorithm");
        let results = ComparativeResults::builder(store.clone(), ["A", "B"], 1, &classifier)
            .default_config(defaults())
            .build(&["exp"], mean_curve, &NoopSink)
            .unwrap();
        assert_eq!(results.benchmark_names(), vec!["b1"]);

        let grid = results.aggregate(None, None, &NoopSink).unwrap().unwrap();
        assert_eq!(grid.get_by_name(0, "A").unwrap().curve.center, vec![1.0]);
        assert_eq!(grid.get_by_name(0, "B").unwrap().curve.center, vec![2.0]);
    }

    #[test]
    fn test_benchmark_required_when_ambiguous() {
        let (_dir, store) = temp_store();
        write_run(&store, "exp-1", "b1", "A", None);
        write_run(&store, "exp-2", "b2", "A", None);

        let classifier = setup_from_key("algorithm");
        let results = ComparativeResults::builder(store.clone(), ["A"], 1, &classifier)
            .default_config(defaults())
            .build(&["exp"], mean_curve, &NoopSink)
            .unwrap();

        let err = results.aggregate(None, None, &NoopSink).unwrap_err();
        match err {
            Error::UnknownBenchmark { requested, available } => {
                assert!(requested.is_none());
                assert_eq!(available, vec!["b1", "b2"]);
            }
            other => panic!("expected UnknownBenchmark, got {other}"),
        }
        assert!(matches!(
            results.aggregate(Some("b3"), None, &NoopSink),
            Err(Error::UnknownBenchmark { .. })
        ));
    }

    #[test]
    fn test_configuration_checked_before_loading() {
        let (_dir, store) = temp_store();
        write_run(&store, "exp-1", "b1", "A", None);

        let classifier = setup_from_key("algorithm");
        let results = ComparativeResults::builder(store.clone(), ["A"], 1, &classifier)
            .build(&["exp"], mean_curve, &NoopSink)
            .unwrap();

        let sink = CollectingSink::new();
        let err = results.aggregate(Some("b1"), None, &sink).unwrap_err();
        assert!(matches!(err, Error::Configuration { ref field, .. } if field == "metric"));
        // No load attempted, so no MissingResults diagnostic
        assert!(sink.events().is_empty());
    }

    #[test]
    fn test_no_data_yields_none() {
        let (_dir, store) = temp_store();
        write_run(&store, "exp-1", "b1", "A", None);

        let classifier = setup_from_key("algorithm");
        let results = ComparativeResults::builder(store.clone(), ["A"], 1, &classifier)
            .default_config(defaults())
            .build(&["exp"], mean_curve, &NoopSink)
            .unwrap();

        let sink = CollectingSink::new();
        let mut calls = 0;
        let mut renderer = |_: &str, _: &ResolvedConfiguration, _: &CellGrid| -> anyhow::Result<()> {
            calls += 1;
            Ok(())
        };
        assert!(results
            .plot(Some("b1"), None, &sink, &mut renderer)
            .unwrap()
            .is_none());
        assert_eq!(calls, 0);
        assert!(sink
            .events()
            .iter()
            .any(|d| matches!(d, Diagnostic::NoData { benchmark } if benchmark == "b1")));
    }

    #[test]
    fn test_setup_mismatch_fails_build() {
        let (_dir, store) = temp_store();
        write_run(&store, "exp-1", "b1", "A", None);
        write_run(&store, "exp-2", "b1", "stale", None);

        let classifier = setup_from_key("algorithm");
        let err = ComparativeResults::builder(store.clone(), ["A"], 1, &classifier)
            .build(&["exp"], mean_curve, &NoopSink)
            .unwrap_err();
        assert!(matches!(err, Error::SetupSetMismatch { .. }));
    }

    #[test]
    fn test_plot_passes_resolved_config_and_maps_errors() {
        let (_dir, store) = temp_store();
        write_run(&store, "exp-1", "b1", "A", Some("st_tuner_time,loss\n1,3\n"));

        let classifier = |metadata: &RunMetadata| -> anyhow::Result<Option<String>> {
            Ok(metadata.get_str("algorithm").map(str::to_string))
        };
        let results = ComparativeResults::builder(store.clone(), ["A"], 1, &classifier)
            .default_config(defaults())
            .build(&["exp"], mean_curve, &NoopSink)
            .unwrap();

        let override_config = PlotConfiguration {
            ylabel: Some("validation loss".into()),
            ..PlotConfiguration::default()
        };
        let mut seen = Vec::new();
        let mut renderer = |benchmark: &str,
                            config: &ResolvedConfiguration,
                            grid: &CellGrid|
         -> anyhow::Result<()> {
            seen.push((benchmark.to_string(), config.ylabel.clone(), grid.num_populated()));
            Ok(())
        };
        results
            .plot(None, Some(&override_config), &NoopSink, &mut renderer)
            .unwrap();
        assert_eq!(
            seen,
            vec![("b1".to_string(), Some("validation loss".to_string()), 1)]
        );

        let mut failing = |_: &str, _: &ResolvedConfiguration, _: &CellGrid| -> anyhow::Result<()> {
            anyhow::bail!("no display")
        };
        let err = results
            .plot(None, None, &NoopSink, &mut failing)
            .unwrap_err();
        assert!(matches!(err, Error::Render { ref benchmark, .. } if benchmark == "b1"));
    }
}
