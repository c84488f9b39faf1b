//! Result index: benchmark → classified runs
//!
//! Scanning a result store means reading one `metadata.json` per run. The
//! index built here does this exactly once, so results of each benchmark
//! can later be loaded without touching metadata again.
//!
//! ## Matching
//!
//! For experiment name `exp`, runs are the directories matching
//!
//! ```text
//! exp-*                          (flat layout)
//! exp/<subdir pattern>/exp-*     (nested layout, one entry per pattern)
//! ```
//!
//! Subdirectory patterns use shell glob syntax (`*`, `?`, `[...]`) against a
//! single path component. Wildcards never match a leading `.`.
//!
//! A matched directory without metadata is skipped silently: the runner
//! creates the directory before it writes metadata.

use crate::classify::{RunMetadata, SetupClassifier, SubplotClassifier};
use crate::diagnostics::{Diagnostic, DiagnosticSink};
use crate::store::{self, ResultStore, METADATA_FILENAME};
use crate::{Error, Result};
use glob::{MatchOptions, Pattern};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

/// Default metadata key holding the benchmark name
pub const DEFAULT_BENCHMARK_KEY: &str = "benchmark";

/// Auxiliary metadata values: benchmark → key → one value per run
pub type MetadataValues = BTreeMap<String, BTreeMap<String, Vec<Value>>>;

/// One classified run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunReference {
    path: PathBuf,
    setup_name: String,
    subplot: usize,
}

impl RunReference {
    /// Create a run reference
    ///
    /// # Arguments
    ///
    /// * `path` - Run directory relative to the store root
    /// * `setup_name` - Setup the run belongs to
    /// * `subplot` - Subplot index the run is drawn in
    #[must_use]
    pub fn new(path: impl Into<PathBuf>, setup_name: impl Into<String>, subplot: usize) -> Self {
        Self {
            path: path.into(),
            setup_name: setup_name.into(),
            subplot,
        }
    }

    /// Run directory relative to the store root
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Setup name
    #[must_use]
    pub fn setup_name(&self) -> &str {
        &self.setup_name
    }

    /// Subplot index
    #[must_use]
    pub const fn subplot(&self) -> usize {
        self.subplot
    }

    /// Run identifier (name of the run directory)
    ///
    /// Not unique across subdirectories: `exp/seed-0/exp-1` and
    /// `exp/seed-1/exp-1` both yield `exp-1`, and their rows are merged into
    /// one trajectory when aggregated.
    #[must_use]
    pub fn run_name(&self) -> String {
        store::run_name(&self.path)
    }

    /// Absolute run directory inside `store`
    #[must_use]
    pub fn full_path(&self, store: &ResultStore) -> PathBuf {
        store.join(&self.path)
    }
}

/// Index over all classified runs of a comparative study
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResultIndex {
    index: BTreeMap<String, Vec<RunReference>>,
    setup_names: BTreeSet<String>,
    metadata_values: Option<MetadataValues>,
}

impl ResultIndex {
    /// Benchmark names present in the index (sorted)
    #[must_use]
    pub fn benchmark_names(&self) -> Vec<String> {
        self.index.keys().cloned().collect()
    }

    /// Runs classified under `benchmark`
    #[must_use]
    pub fn runs(&self, benchmark: &str) -> Option<&[RunReference]> {
        self.index.get(benchmark).map(Vec::as_slice)
    }

    /// Distinct setup names over all benchmarks
    #[must_use]
    pub const fn setup_names(&self) -> &BTreeSet<String> {
        &self.setup_names
    }

    /// Auxiliary metadata values, if extra keys were requested
    #[must_use]
    pub const fn metadata_values(&self) -> Option<&MetadataValues> {
        self.metadata_values.as_ref()
    }

    /// Total number of indexed runs
    #[must_use]
    pub fn num_runs(&self) -> usize {
        self.index.values().map(Vec::len).sum()
    }

    /// Check if the index holds no runs
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Require the observed setup names to equal `expected` exactly
    ///
    /// # Errors
    /// Returns [`Error::SetupSetMismatch`] if the two sets differ
    pub fn validate_setups<S: AsRef<str>>(&self, expected: &[S]) -> Result<()> {
        let expected: BTreeSet<String> = expected.iter().map(|s| s.as_ref().to_string()).collect();
        if self.setup_names == expected {
            Ok(())
        } else {
            Err(Error::SetupSetMismatch {
                observed: self.setup_names.clone(),
                expected,
            })
        }
    }

    fn insert(&mut self, benchmark: &str, reference: RunReference) {
        self.setup_names.insert(reference.setup_name.clone());
        self.index
            .entry(benchmark.to_string())
            .or_default()
            .push(reference);
    }
}

/// Builds a [`ResultIndex`] by scanning a result store
///
/// ## Example
///
/// ```rust,no_run
/// use trueno_compare::classify::setup_from_key;
/// use trueno_compare::diagnostics::TracingSink;
/// use trueno_compare::index::IndexBuilder;
/// use trueno_compare::store::ResultStore;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let store = ResultStore::from_env()?;
/// let by_algorithm = setup_from_key("algorithm");
///
/// let index = IndexBuilder::new(&store, &by_algorithm)
///     .extra_metadata_keys(["n_workers"])
///     .build(&["odsc-1"], &TracingSink)?;
///
/// println!("{} runs over {:?}", index.num_runs(), index.benchmark_names());
/// # Ok(())
/// # }
/// ```
pub struct IndexBuilder<'a> {
    store: &'a ResultStore,
    setup_classifier: &'a dyn SetupClassifier,
    subplot_classifier: Option<&'a dyn SubplotClassifier>,
    benchmark_key: String,
    extra_metadata_keys: Vec<String>,
    subdir_patterns: Option<Vec<String>>,
}

impl<'a> IndexBuilder<'a> {
    /// Create a builder for `store` classifying runs with `setup_classifier`
    #[must_use]
    pub fn new(store: &'a ResultStore, setup_classifier: &'a dyn SetupClassifier) -> Self {
        Self {
            store,
            setup_classifier,
            subplot_classifier: None,
            benchmark_key: DEFAULT_BENCHMARK_KEY.to_string(),
            extra_metadata_keys: Vec::new(),
            subdir_patterns: None,
        }
    }

    /// Classify runs into subplots (default: all runs in subplot 0)
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

    /// Look for runs in subdirectories `exp/<pattern>/` (`"*"` for any)
    #[must_use]
    pub fn subdir_patterns<I, S>(mut self, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.subdir_patterns = Some(patterns.into_iter().map(Into::into).collect());
        self
    }

    /// Scan the store for runs of the given experiment names
    ///
    /// # Errors
    /// Returns error if:
    /// - Metadata of a run is unreadable or lacks the benchmark key
    /// - A classifier fails (annotated with the run path)
    /// - The store cannot be listed
    pub fn build<S: AsRef<str>>(
        &self,
        experiment_names: &[S],
        sink: &dyn DiagnosticSink,
    ) -> Result<ResultIndex> {
        let mut index = ResultIndex {
            metadata_values: (!self.extra_metadata_keys.is_empty()).then(BTreeMap::new),
            ..ResultIndex::default()
        };

        for experiment in experiment_names {
            let experiment = experiment.as_ref();
            let patterns = self.patterns_for(experiment);
            sink.emit(Diagnostic::ScanPatterns {
                experiment: experiment.to_string(),
                patterns: patterns.iter().map(|p| p.join("/")).collect(),
            });

            for pattern in &patterns {
                for run_dir in expand_pattern(self.store.root(), pattern)? {
                    self.index_run(&run_dir, &mut index)?;
                }
            }
        }

        tracing::debug!(
            runs = index.num_runs(),
            benchmarks = index.index.len(),
            "result index built"
        );
        Ok(index)
    }

    fn patterns_for(&self, experiment: &str) -> Vec<Vec<String>> {
        let literal = Pattern::escape(experiment);
        let run_pattern = format!("{literal}-*");
        match &self.subdir_patterns {
            None => vec![vec![run_pattern]],
            Some(subdirs) => subdirs
                .iter()
                .map(|sub| vec![literal.clone(), sub.clone(), run_pattern.clone()])
                .collect(),
        }
    }

    fn index_run(&self, run_dir: &Path, index: &mut ResultIndex) -> Result<()> {
        let Some(metadata) = read_metadata(run_dir)? else {
            return Ok(());
        };

        let benchmark = match metadata.get(&self.benchmark_key) {
            Some(Value::String(name)) => name.clone(),
            Some(other) => other.to_string(),
            None => {
                return Err(Error::MalformedRun {
                    path: run_dir.to_path_buf(),
                    reason: format!(
                        "metadata does not contain key {:?}:\n{}",
                        self.benchmark_key,
                        Value::Object(metadata.fields().clone())
                    ),
                })
            }
        };

        let setup = self
            .setup_classifier
            .classify_setup(&metadata)
            .map_err(|source| Error::Classifier {
                path: run_dir.to_path_buf(),
                source,
            })?;
        let Some(setup) = setup else {
            return Ok(());
        };

        let subplot = match self.subplot_classifier {
            Some(classifier) => {
                classifier
                    .classify_subplot(&metadata)
                    .map_err(|source| Error::Classifier {
                        path: run_dir.to_path_buf(),
                        source,
                    })?
            }
            None => Some(0),
        };
        let Some(subplot) = subplot else {
            return Ok(());
        };

        let relative = self.store.strip(run_dir)?;
        index.insert(&benchmark, RunReference::new(relative, setup, subplot));

        if let Some(values) = index.metadata_values.as_mut() {
            for key in &self.extra_metadata_keys {
                if let Some(value) = metadata.get(key) {
                    values
                        .entry(benchmark.clone())
                        .or_default()
                        .entry(key.clone())
                        .or_default()
                        .push(value.clone());
                }
            }
        }
        Ok(())
    }
}

/// Build an index with default options (flat layout, single subplot)
///
/// # Errors
/// See [`IndexBuilder::build`]
pub fn build_index<S: AsRef<str>>(
    store: &ResultStore,
    experiment_names: &[S],
    setup_classifier: &dyn SetupClassifier,
    sink: &dyn DiagnosticSink,
) -> Result<ResultIndex> {
    IndexBuilder::new(store, setup_classifier).build(experiment_names, sink)
}

/// Read a run's metadata, `None` if the file does not exist (yet)
fn read_metadata(run_dir: &Path) -> Result<Option<RunMetadata>> {
    let path = run_dir.join(METADATA_FILENAME);
    let text = match fs::read_to_string(&path) {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    RunMetadata::from_json_str(&text)
        .map(Some)
        .map_err(|e| Error::MalformedRun {
            path: run_dir.to_path_buf(),
            reason: format!("cannot parse {METADATA_FILENAME}: {e}"),
        })
}

/// Directories below `root` matching the glob segments, sorted by path
///
/// Each segment matches one directory level. Wildcards do not match a
/// leading `.`, so hidden directories are only found by literal patterns.
fn expand_pattern(root: &Path, segments: &[String]) -> Result<Vec<PathBuf>> {
    let options = MatchOptions {
        case_sensitive: true,
        require_literal_separator: true,
        require_literal_leading_dot: true,
    };
    let mut current = vec![root.to_path_buf()];
    for segment in segments {
        let pattern = Pattern::new(segment).map_err(|e| Error::Configuration {
            field: "subdir_patterns".to_string(),
            reason: format!("invalid pattern {segment:?}: {e}"),
        })?;
        let mut next = Vec::new();
        for dir in &current {
            if !dir.is_dir() {
                continue;
            }
            let walker = walkdir::WalkDir::new(dir)
                .min_depth(1)
                .max_depth(1)
                .follow_links(true)
                .sort_by_file_name();
            for entry in walker {
                let entry = entry.map_err(std::io::Error::from)?;
                if entry.file_type().is_dir()
                    && pattern.matches_with(&entry.file_name().to_string_lossy(), options)
                {
                    next.push(entry.into_path());
                }
            }
        }
        current = next;
    }
    current.sort();
    Ok(current)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::{CollectingSink, NoopSink};
    use serde_json::json;

    fn temp_store() -> (tempfile::TempDir, ResultStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = ResultStore::new(dir.path());
        (dir, store)
    }

    fn write_run(store: &ResultStore, rel: &str, metadata: &Value) {
        let dir = store.join(rel);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(METADATA_FILENAME), metadata.to_string()).unwrap();
    }

    fn by_algorithm(md: &RunMetadata) -> anyhow::Result<Option<String>> {
        Ok(md.get_str("algorithm").map(str::to_string))
    }

    #[test]
    fn test_flat_layout_and_prefix_filter() {
        let (_dir, store) = temp_store();
        write_run(&store, "exp-1", &json!({"benchmark": "b1", "algorithm": "A"}));
        write_run(&store, "exp-2", &json!({"benchmark": "b1", "algorithm": "B"}));
        write_run(&store, "other-1", &json!({"benchmark": "b1", "algorithm": "A"}));
        // Directory created before the runner wrote metadata
        fs::create_dir_all(store.join("exp-3")).unwrap();

        let index = build_index(&store, &["exp"], &by_algorithm, &NoopSink).unwrap();
        let runs = index.runs("b1").unwrap();
        assert_eq!(runs.len(), 2);
        assert_eq!(runs[0], RunReference::new("exp-1", "A", 0));
        assert_eq!(runs[1], RunReference::new("exp-2", "B", 0));
        assert!(index.metadata_values().is_none());
    }

    #[test]
    fn test_none_from_either_classifier_excludes_run() {
        let (_dir, store) = temp_store();
        write_run(&store, "exp-1", &json!({"benchmark": "b1", "algorithm": "A", "seed": 0}));
        write_run(&store, "exp-2", &json!({"benchmark": "b1", "seed": 1}));
        write_run(&store, "exp-3", &json!({"benchmark": "b1", "algorithm": "A", "seed": 9}));

        let by_seed = |md: &RunMetadata| -> anyhow::Result<Option<usize>> {
            Ok(md.get_i64("seed").filter(|s| *s < 5).map(|_| 0))
        };
        let index = IndexBuilder::new(&store, &by_algorithm)
            .subplot_classifier(&by_seed)
            .build(&["exp"], &NoopSink)
            .unwrap();
        let runs = index.runs("b1").unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].run_name(), "exp-1");
    }

    #[test]
    fn test_missing_benchmark_key_is_malformed_run() {
        let (_dir, store) = temp_store();
        write_run(&store, "exp-1", &json!({"algorithm": "A"}));

        let err = build_index(&store, &["exp"], &by_algorithm, &NoopSink).unwrap_err();
        match err {
            Error::MalformedRun { path, reason } => {
                assert!(path.ends_with("exp-1"));
                assert!(reason.contains("benchmark"));
            }
            other => panic!("expected MalformedRun, got {other}"),
        }
    }

    #[test]
    fn test_classifier_error_is_annotated_with_path() {
        let (_dir, store) = temp_store();
        write_run(&store, "exp-1", &json!({"benchmark": "b1"}));

        let failing = |_: &RunMetadata| -> anyhow::Result<Option<String>> {
            anyhow::bail!("unexpected metadata layout")
        };
        let err = build_index(&store, &["exp"], &failing, &NoopSink).unwrap_err();
        assert!(matches!(err, Error::Classifier { .. }));
        let msg = err.to_string();
        assert!(msg.contains("exp-1"));
        assert!(msg.contains("unexpected metadata layout"));
    }

    #[test]
    fn test_subdir_patterns_and_metadata_values() {
        let (_dir, store) = temp_store();
        write_run(
            &store,
            "exp/seed-0/exp-1",
            &json!({"benchmark": "b1", "algorithm": "A", "n_workers": 4}),
        );
        write_run(
            &store,
            "exp/seed-1/exp-1",
            &json!({"benchmark": "b1", "algorithm": "A", "n_workers": 8}),
        );
        write_run(
            &store,
            "exp/other/exp-1",
            &json!({"benchmark": "b2", "algorithm": "A"}),
        );

        let sink = CollectingSink::new();
        let index = IndexBuilder::new(&store, &by_algorithm)
            .subdir_patterns(["seed-*"])
            .extra_metadata_keys(["n_workers", "absent"])
            .build(&["exp"], &sink)
            .unwrap();

        assert_eq!(index.benchmark_names(), vec!["b1".to_string()]);
        let runs = index.runs("b1").unwrap();
        assert_eq!(runs[0].path(), Path::new("exp/seed-0/exp-1"));
        assert_eq!(runs[1].path(), Path::new("exp/seed-1/exp-1"));
        assert_eq!(runs[0].run_name(), runs[1].run_name());

        let values = index.metadata_values().unwrap();
        assert_eq!(values["b1"]["n_workers"], vec![json!(4), json!(8)]);
        assert!(!values["b1"].contains_key("absent"));

        assert!(matches!(
            &sink.events()[0],
            Diagnostic::ScanPatterns { patterns, .. } if patterns == &vec!["exp/seed-*/exp-*".to_string()]
        ));
    }

    #[test]
    fn test_subdir_patterns_support_character_classes() {
        let (_dir, store) = temp_store();
        for subdir in ["seed-0", "seed-1", "seed-2"] {
            write_run(
                &store,
                &format!("exp/{subdir}/exp-1"),
                &json!({"benchmark": "b1", "algorithm": "A"}),
            );
        }

        let index = IndexBuilder::new(&store, &by_algorithm)
            .subdir_patterns(["seed-[01]"])
            .build(&["exp"], &NoopSink)
            .unwrap();

        let paths: Vec<_> = index.runs("b1").unwrap().iter().map(|r| r.path().to_path_buf()).collect();
        assert_eq!(
            paths,
            vec![PathBuf::from("exp/seed-0/exp-1"), PathBuf::from("exp/seed-1/exp-1")]
        );
    }

    #[test]
    fn test_wildcards_skip_hidden_directories() {
        let (_dir, store) = temp_store();
        write_run(&store, "exp/seed-0/exp-1", &json!({"benchmark": "b1", "algorithm": "A"}));
        write_run(&store, "exp/.trash/exp-1", &json!({"benchmark": "b1", "algorithm": "A"}));

        let index = IndexBuilder::new(&store, &by_algorithm)
            .subdir_patterns(["*"])
            .build(&["exp"], &NoopSink)
            .unwrap();
        assert_eq!(index.num_runs(), 1);
        assert_eq!(index.runs("b1").unwrap()[0].path(), Path::new("exp/seed-0/exp-1"));

        let hidden = IndexBuilder::new(&store, &by_algorithm)
            .subdir_patterns([".trash"])
            .build(&["exp"], &NoopSink)
            .unwrap();
        assert_eq!(hidden.num_runs(), 1);
    }

    #[test]
    fn test_invalid_subdir_pattern_is_configuration_error() {
        let (_dir, store) = temp_store();
        write_run(&store, "exp/seed-0/exp-1", &json!({"benchmark": "b1", "algorithm": "A"}));

        let err = IndexBuilder::new(&store, &by_algorithm)
            .subdir_patterns(["seed-["])
            .build(&["exp"], &NoopSink)
            .unwrap_err();
        assert!(matches!(err, Error::Configuration { ref field, .. } if field == "subdir_patterns"));
    }

    #[test]
    fn test_validate_setups() {
        let mut index = ResultIndex::default();
        index.insert("b1", RunReference::new("exp-1", "A", 0));
        index.insert("b1", RunReference::new("exp-2", "B", 0));

        assert!(index.validate_setups(&["B", "A"]).is_ok());
        let err = index.validate_setups(&["A", "B", "C"]).unwrap_err();
        assert!(matches!(err, Error::SetupSetMismatch { .. }));
        assert!(index.validate_setups(&["A"]).is_err());
    }

    #[test]
    fn test_missing_store_root_yields_empty_index() {
        let dir = tempfile::tempdir().unwrap();
        let store = ResultStore::new(dir.path().join("missing"));
        let index = build_index(&store, &["exp"], &by_algorithm, &NoopSink).unwrap();
        assert!(index.is_empty());
        assert_eq!(index.num_runs(), 0);
    }
}
