//! Querystat - per-query statistics for database access layers
//!
//! This library plugs into a database layer's debug hook and records, for
//! every normalized query text, how often it ran, with which parameter
//! tuples, how long it took in total, and which application code issued it.
//! A sorted report (cheapest first, summary last) can be rendered as text,
//! JSON or CSV.

pub mod callsite;
pub mod clock;
pub mod collector;
pub mod config;
pub mod csv_output;
pub mod error;
pub mod json_output;
pub mod params;
pub mod report;
pub mod stats;

pub use collector::{Collector, DebugHook, DebuggableStorage, QueryToken};
pub use config::{CollectorConfig, CollectorOptions};
pub use error::ConfigurationError;
pub use params::{ParamKey, ParamValue};
pub use report::{render, render_text, Report, ReportSink};
pub use stats::{CollectorState, QueryStats};
