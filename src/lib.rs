//! cohortlens: a customer recurrence report for sales spreadsheets
//!
//! Loads transactions (customer, sale amount, year, optional phone), derives
//! per-customer recurrence and spend metrics, classifies customers into
//! profiles, filters them and renders summary metrics, a ranked bar chart,
//! a table and a semicolon-delimited export.

pub mod cli;
pub mod config;
pub mod data;
pub mod filter;
pub mod format;
pub mod model;
pub mod report;
pub mod segment;
pub mod viz;

// Re-export public items for easier access
pub use cli::Args;
pub use config::{CurrencyFormat, ReportConfig, SegmentRules};
pub use data::{load_transactions, IngestError, Transactions};
pub use filter::{apply_filters, FilterBounds, FilterCriteria};
pub use model::{aggregate_customers, CustomerAggregate};
pub use report::{build_report, export_csv, read_export, render_table, Report, Summary};
pub use segment::{Profile, Segmenter};
pub use viz::{create_ranking_chart, rank_entries};

/// Common result type used throughout the application
pub type Result<T> = anyhow::Result<T>;
