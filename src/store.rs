//! Result store layout
//!
//! A result store is a directory tree written by the experiment runner:
//!
//! ```text
//! <root>/
//!   <experiment>-<timestamp>/
//!     metadata.json
//!     results.csv | results.parquet
//!   <experiment>/<subdir>/<experiment>-<timestamp>/   (nested layout)
//! ```
//!
//! Run paths kept in the index are relative to the root, so an index built on
//! one machine stays valid on another with a different store location.

use crate::{Error, Result};
use std::path::{Component, Path, PathBuf};

/// Metadata artifact written once per run
pub const METADATA_FILENAME: &str = "metadata.json";

/// Time-stamped results table (CSV)
pub const RESULTS_CSV_FILENAME: &str = "results.csv";

/// Time-stamped results table (Parquet), preferred over CSV when present
pub const RESULTS_PARQUET_FILENAME: &str = "results.parquet";

/// Column holding wall-clock seconds since the run started
pub const TUNER_TIME_COLUMN: &str = "st_tuner_time";

/// Column holding the trial identifier
pub const TRIAL_ID_COLUMN: &str = "trial_id";

/// Environment variable overriding the store root
pub const STORE_ROOT_ENV: &str = "TRUENO_COMPARE_STORE";

/// Root of an on-disk result store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultStore {
    root: PathBuf,
}

impl ResultStore {
    /// Create a store rooted at `root`
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Resolve the store root from the environment
    ///
    /// Uses `TRUENO_COMPARE_STORE` if set, else `$HOME/syne-tune`.
    ///
    /// # Errors
    /// Returns error if neither variable is set
    pub fn from_env() -> Result<Self> {
        if let Some(root) = std::env::var_os(STORE_ROOT_ENV) {
            return Ok(Self::new(root));
        }
        std::env::var_os("HOME")
            .map(|home| Self::new(PathBuf::from(home).join("syne-tune")))
            .ok_or_else(|| {
                Error::Other(format!(
                    "Cannot locate result store: set {STORE_ROOT_ENV} or HOME"
                ))
            })
    }

    /// Store root directory
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Join a store-relative run path onto the root
    #[must_use]
    pub fn join(&self, relative: impl AsRef<Path>) -> PathBuf {
        self.root.join(relative)
    }

    /// Strip the store root (and the separator after it) from `path`
    ///
    /// Left inverse of [`join`](Self::join): `strip(join(x)) == x` for any
    /// relative `x`.
    ///
    /// # Errors
    /// Returns error if `path` does not live below the root
    pub fn strip(&self, path: &Path) -> Result<PathBuf> {
        path.strip_prefix(&self.root)
            .map(Path::to_path_buf)
            .map_err(|_| {
                Error::StorageError(format!(
                    "run path {} is not below store root {}",
                    path.display(),
                    self.root.display()
                ))
            })
    }
}

/// Run identifier: the final component of a run path
///
/// Only the leaf is kept, so `exp/seed-0/exp-1` and `exp/seed-1/exp-1`
/// share the identifier `exp-1`. Runs are grouped by this identifier during
/// aggregation; give runs in different subdirectories distinct leaf names
/// if they must stay separate replicates.
#[must_use]
pub fn run_name(path: &Path) -> String {
    path.components()
        .rev()
        .find_map(|c| match c {
            Component::Normal(name) => Some(name.to_string_lossy().into_owned()),
            _ => None,
        })
        .unwrap_or_default()
}
