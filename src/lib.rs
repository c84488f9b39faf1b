//! # Trueno-Compare: Comparative Analysis of HPO Experiment Results
//!
//! **Version**: 0.1.0
//!
//! Trueno-Compare indexes a store of tuning runs, loads their time-stamped
//! results into Arrow tables and aggregates repeated runs of several setups
//! into best-so-far curves over wall-clock time, one cell per
//! `(subplot, setup)`.
//!
//! ## Pipeline
//!
//! - **Index** ([`index`]): scan `{experiment}-*` run directories, classify
//!   each run by benchmark, setup and subplot
//! - **Load** ([`loader`]): one tagged [`CombinedTable`](loader::CombinedTable)
//!   per benchmark, missing tables skipped with a diagnostic
//! - **Aggregate** ([`aggregate`]): best-so-far trajectories, time windows,
//!   external estimator
//! - **Render** ([`comparative`]): grids handed to a caller-supplied
//!   [`PlotSink`](comparative::PlotSink)
//!
//! Recoverable conditions never fail a call; they are emitted as
//! [`Diagnostic`](diagnostics::Diagnostic) events to a
//! [`DiagnosticSink`](diagnostics::DiagnosticSink).
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use trueno_compare::classify::setup_from_key;
//! use trueno_compare::diagnostics::TracingSink;
//! use trueno_compare::index::build_index;
//! use trueno_compare::loader::load_combined;
//! use trueno_compare::store::ResultStore;
//!
//! let store = ResultStore::from_env()?;
//! let index = build_index(&store, &["odsc-1"], &setup_from_key("algorithm"), &TracingSink)?;
//!
//! for benchmark in index.benchmark_names() {
//!     let runs = index.runs(&benchmark).unwrap_or_default();
//!     if let Some(table) = load_combined(&store, runs, &TracingSink)? {
//!         println!("{benchmark}: {} rows over {} runs", table.num_rows(), table.num_runs());
//!     }
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

pub mod aggregate;
pub mod classify;
pub mod comparative;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod index;
pub mod loader;
pub mod logging;
pub mod store;
pub mod table;

pub use error::{Error, Result};
