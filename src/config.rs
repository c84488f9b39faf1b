//! Plot and aggregation configuration
//!
//! Configuration comes in two layers: defaults given once for a comparative
//! study, and overrides given per plot. Every field is optional in both
//! layers. [`PlotConfiguration::resolve`] merges them field by field (the
//! override wins) and applies hard-coded fallbacks:
//!
//! | field               | fallback          |
//! |---------------------|-------------------|
//! | `aggregate_mode`    | `"iqm_bootstrap"` |
//! | `metric_multiplier` | `1.0`             |
//! | `dpi`               | `200`             |
//! | `grid`              | `false`           |
//! | `title_each_figure` | `false`           |
//!
//! `metric`, `mode` and (with subplots) `nrows`/`ncols` have no fallback and
//! must be set in one of the two layers.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// Aggregation mode used when none is configured
pub const DEFAULT_AGGREGATE_MODE: &str = "iqm_bootstrap";

/// Metric multiplier used when none is configured
pub const DEFAULT_METRIC_MULTIPLIER: f64 = 1.0;

/// Figure resolution used when none is configured
pub const DEFAULT_DPI: u32 = 200;

/// Optimization direction of the metric
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Lower metric values are better
    Min,
    /// Higher metric values are better
    Max,
}

impl FromStr for Mode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "min" => Ok(Self::Min),
            "max" => Ok(Self::Max),
            other => Err(Error::Configuration {
                field: "mode".to_string(),
                reason: format!("must be \"min\" or \"max\", got {other:?}"),
            }),
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Min => write!(f, "min"),
            Self::Max => write!(f, "max"),
        }
    }
}

/// Subplot layout parameters (all optional)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SubplotConfiguration {
    /// Title per subplot
    pub titles: Option<Vec<String>>,
    /// Draw the title of every subplot (not only the first row)
    pub title_each_figure: Option<bool>,
    /// Number of subplot rows
    pub nrows: Option<usize>,
    /// Number of subplot columns
    pub ncols: Option<usize>,
    /// Subplots that get a legend
    pub legend_no: Option<Vec<usize>>,
    /// Per-subplot upper time limit; the window becomes `[0, xlims[i]]`
    pub xlims: Option<Vec<f64>>,
    /// Further layout parameters passed through to the renderer
    pub kwargs: Option<Map<String, Value>>,
}

/// Plot and aggregation parameters (all optional)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PlotConfiguration {
    /// Metric column to aggregate
    pub metric: Option<String>,
    /// Optimization direction of `metric`
    pub mode: Option<Mode>,
    /// Label of the time axis
    pub xlabel: Option<String>,
    /// Label of the metric axis
    pub ylabel: Option<String>,
    /// Global time window `(lower, upper)`
    pub xlim: Option<(f64, f64)>,
    /// Metric axis range
    pub ylim: Option<(f64, f64)>,
    /// Factor applied to the best-so-far metric
    pub metric_multiplier: Option<f64>,
    /// Tick parameters passed through to the renderer
    pub tick_params: Option<Map<String, Value>>,
    /// Estimator mode selector (opaque to this crate)
    pub aggregate_mode: Option<String>,
    /// Figure resolution
    pub dpi: Option<u32>,
    /// Draw a grid
    pub grid: Option<bool>,
    /// Subplot layout
    pub subplots: Option<SubplotConfiguration>,
}

/// Subplot layout with all required fields set
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedSubplots {
    /// Title per subplot
    pub titles: Option<Vec<String>>,
    /// Draw the title of every subplot
    pub title_each_figure: bool,
    /// Number of subplot rows
    pub nrows: usize,
    /// Number of subplot columns
    pub ncols: usize,
    /// Subplots that get a legend
    pub legend_no: Option<Vec<usize>>,
    /// Per-subplot upper time limit
    pub xlims: Option<Vec<f64>>,
    /// Further layout parameters
    pub kwargs: Option<Map<String, Value>>,
}

impl ResolvedSubplots {
    /// Number of subplots in the layout
    #[must_use]
    pub const fn num_subplots(&self) -> usize {
        self.nrows.saturating_mul(self.ncols)
    }
}

/// Configuration with all required fields set
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedConfiguration {
    /// Metric column to aggregate
    pub metric: String,
    /// Optimization direction
    pub mode: Mode,
    /// Label of the time axis
    pub xlabel: Option<String>,
    /// Label of the metric axis
    pub ylabel: Option<String>,
    /// Global time window
    pub xlim: Option<(f64, f64)>,
    /// Metric axis range
    pub ylim: Option<(f64, f64)>,
    /// Factor applied to the best-so-far metric
    pub metric_multiplier: f64,
    /// Tick parameters
    pub tick_params: Option<Map<String, Value>>,
    /// Estimator mode selector
    pub aggregate_mode: String,
    /// Figure resolution
    pub dpi: u32,
    /// Draw a grid
    pub grid: bool,
    /// Subplot layout (`None`: single plot)
    pub subplots: Option<ResolvedSubplots>,
}

impl ResolvedConfiguration {
    /// Number of subplots (1 without a subplot layout)
    #[must_use]
    pub fn num_subplots(&self) -> usize {
        self.subplots
            .as_ref()
            .map_or(1, ResolvedSubplots::num_subplots)
    }

    /// Time window applied to results drawn in `subplot`
    ///
    /// Per-subplot limits take precedence over the global `xlim`.
    #[must_use]
    pub fn time_window(&self, subplot: usize) -> Option<(f64, f64)> {
        match self.subplots.as_ref().and_then(|s| s.xlims.as_ref()) {
            Some(xlims) => xlims.get(subplot).map(|&upper| (0.0, upper)),
            None => self.xlim,
        }
    }
}

fn pick<T: Clone>(value: &Option<T>, default: &Option<T>) -> Option<T> {
    value.as_ref().or(default.as_ref()).cloned()
}

fn required<T>(value: Option<T>, field: &str) -> Result<T> {
    value.ok_or_else(|| Error::Configuration {
        field: field.to_string(),
        reason: "must be given".to_string(),
    })
}

impl SubplotConfiguration {
    /// Merge with `default` field by field and apply fallbacks
    ///
    /// # Errors
    /// Returns [`Error::Configuration`] if `nrows`/`ncols` are unset or the
    /// layout is empty or too large
    pub fn resolve(&self, default: &Self) -> Result<ResolvedSubplots> {
        let nrows = required(pick(&self.nrows, &default.nrows), "subplots.nrows")?;
        let ncols = required(pick(&self.ncols, &default.ncols), "subplots.ncols")?;
        if nrows == 0 || ncols == 0 {
            return Err(Error::Configuration {
                field: "subplots".to_string(),
                reason: format!("layout {nrows}x{ncols} has no subplots"),
            });
        }
        let num_subplots = nrows.checked_mul(ncols).ok_or_else(|| Error::Configuration {
            field: "subplots".to_string(),
            reason: format!("layout {nrows}x{ncols} is too large"),
        })?;

        let xlims = pick(&self.xlims, &default.xlims);
        if let Some(xlims) = &xlims {
            if xlims.len() < num_subplots {
                return Err(Error::Configuration {
                    field: "subplots.xlims".to_string(),
                    reason: format!(
                        "has {} entries, but layout has {} subplots",
                        xlims.len(),
                        num_subplots
                    ),
                });
            }
        }

        Ok(ResolvedSubplots {
            titles: pick(&self.titles, &default.titles),
            title_each_figure: pick(&self.title_each_figure, &default.title_each_figure)
                .unwrap_or(false),
            nrows,
            ncols,
            legend_no: pick(&self.legend_no, &default.legend_no),
            xlims,
            kwargs: pick(&self.kwargs, &default.kwargs),
        })
    }
}

impl PlotConfiguration {
    /// Parse a configuration from JSON text
    ///
    /// # Errors
    /// Returns error on invalid JSON or unknown fields
    pub fn from_json_str(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Read a configuration from a JSON file
    ///
    /// # Errors
    /// Returns error if the file cannot be read or parsed
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    /// Merge with `default` field by field and apply fallbacks
    ///
    /// If only one side has a subplot layout, that layout is used as is;
    /// if both do, they are merged field by field as well.
    ///
    /// # Errors
    /// Returns [`Error::Configuration`] naming the first required field
    /// that is still unset
    pub fn resolve(&self, default: &Self) -> Result<ResolvedConfiguration> {
        let metric = required(pick(&self.metric, &default.metric), "metric")?;
        let mode = required(pick(&self.mode, &default.mode), "mode")?;

        let subplots = match (&self.subplots, &default.subplots) {
            (None, None) => None,
            (Some(only), None) | (None, Some(only)) => {
                Some(only.resolve(&SubplotConfiguration::default())?)
            }
            (Some(value), Some(fallback)) => Some(value.resolve(fallback)?),
        };

        Ok(ResolvedConfiguration {
            metric,
            mode,
            xlabel: pick(&self.xlabel, &default.xlabel),
            ylabel: pick(&self.ylabel, &default.ylabel),
            xlim: pick(&self.xlim, &default.xlim),
            ylim: pick(&self.ylim, &default.ylim),
            metric_multiplier: pick(&self.metric_multiplier, &default.metric_multiplier)
                .unwrap_or(DEFAULT_METRIC_MULTIPLIER),
            tick_params: pick(&self.tick_params, &default.tick_params),
            aggregate_mode: pick(&self.aggregate_mode, &default.aggregate_mode)
                .unwrap_or_else(|| DEFAULT_AGGREGATE_MODE.to_string()),
            dpi: pick(&self.dpi, &default.dpi).unwrap_or(DEFAULT_DPI),
            grid: pick(&self.grid, &default.grid).unwrap_or(false),
            subplots,
        })
    }
}

/// Resolve `value` against `default`, see [`PlotConfiguration::resolve`]
///
/// # Errors
/// Returns [`Error::Configuration`] if a required field is unset
pub fn resolve(
    value: &PlotConfiguration,
    default: &PlotConfiguration,
) -> Result<ResolvedConfiguration> {
    value.resolve(default)
}
