//! # Ethogram: Embedded Analytics for Behavioral Neuroscience
//!
//! Ethogram is an embedded analytics engine for two-alternative
//! visual-contrast discrimination experiments: typed records for subjects,
//! sessions, and trials, a columnar (Arrow) trial table with a typed
//! query-predicate layer, and the computational battery behind a behavioral
//! paper (psychometric curve fitting, time-varying weight estimation,
//! training-criterion classification, and spike-sorting quality metrics),
//! plus static figure rendering.
//!
//! ## Design Principles
//!
//! - **Typed predicates**: filters are values, never string fragments
//! - **Explicit errors**: every fit and query returns `Result`; the only
//!   degrade-and-continue path is the per-unit quality loop
//! - **Append-only writes**: bulk record loads plus one insert path for
//!   fitted weights
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use ethogram::storage::TrialTable;
//! use ethogram::query::{col, QueryExecutor};
//!
//! // Load a trials table from Parquet
//! let table = TrialTable::load_parquet("data/trials.parquet")?;
//!
//! // Typed filtering: trials with a rightward stimulus above 25% contrast
//! let high_right = col("contrast_right").gt(0.25).apply(&table.combined()?)?;
//! println!("{} trials", high_right.num_rows());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

pub mod behavior;
pub mod criteria;
pub mod error;
pub mod psychometric;
pub mod quality;
pub mod query;
#[cfg(feature = "report")]
pub mod report;
pub mod schema;
pub mod stats;
pub mod storage;
pub mod weights;

pub use error::{Error, Result};
