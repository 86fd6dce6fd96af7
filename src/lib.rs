//! Cost Attribution Library
//!
//! Attributes cloud usage and cost records to organizational cost centers across several
//! comparison windows (current period, prior month, year over year and a month-to-date
//! partial window), applying split-charge redistribution rules on the way.
//!
//! The engine is a pure computation over an already collected document: no network I/O and
//! no state shared between invocations, so many periods can be processed concurrently.
//!
//! ## Architecture Overview
//!
//! - [`periods`] - Calendar windows and reporting frames
//! - [`categories`] - Usage type → Storage / Compute / Support / Other
//! - [`parser`] - Raw grouped records → typed usage rows
//! - [`aggregate`] - Workload totals and tagging coverage
//! - [`attribution`] - Cost-center grouping with allocated-total precedence
//! - [`split_charge`] - Split-charge redistribution with snapshot semantics
//! - [`storage`] - Storage volume and unit-cost metrics
//! - [`mtd`] - Prior-month partial comparison for in-progress months
//! - [`analyzer`] - Assembles summaries and flattened export rows
//! - [`models`] - Input document and output structures
//! - [`config`] - Configuration management with environment variable support
//! - [`logging`] - Structured logging with JSON and pretty-print formats
//! - [`display`] - Terminal and JSON rendering
//! - [`reports`] - Local JSON persistence of processed reports
//!
//! ## Main Entry Point
//!
//! ```rust,no_run
//! use cost_attribution::{CollectedData, CostReportAnalyzer, EngineOptions};
//! use std::path::Path;
//!
//! # fn example() -> anyhow::Result<()> {
//! let data = CollectedData::from_path(Path::new("collected.json"))?;
//! let reports = CostReportAnalyzer::new(EngineOptions::default()).process(&data)?;
//! # Ok(())
//! # }
//! ```

pub mod aggregate;
pub mod analyzer;
pub mod attribution;
pub mod categories;
pub mod config;
pub mod display;
pub mod logging;
pub mod models;
pub mod mtd;
pub mod parser;
pub mod periods;
pub mod reports;
pub mod split_charge;
pub mod storage;

pub use analyzer::{CostReportAnalyzer, EngineOptions};
pub use models::*;
pub use periods::{get_periods, DateRange, PeriodKey, PeriodSet, ReportFrame};
pub use split_charge::{redistribute, SplitChargeConfig, SplitTreatment};
