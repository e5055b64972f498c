//! JSON export of the query statistics report

use crate::report::{Report, ReportEntry};
use serde::{Deserialize, Serialize};

/// Summary statistics across all query shapes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonSummary {
    /// Total number of executions recorded
    pub total_queries: u64,
    /// Number of distinct query shapes
    pub distinct_queries: usize,
    /// Total time in seconds
    pub total_time_secs: f64,
}

/// Root JSON output structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonOutput {
    /// Format version identifier
    pub version: String,
    /// Format name
    pub format: String,
    /// Query entries, ascending by total time
    pub queries: Vec<ReportEntry>,
    pub summary: JsonSummary,
}

impl JsonOutput {
    /// Build the JSON document for a report
    pub fn from_report(report: &Report) -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            format: "querystat-json-v1".to_string(),
            queries: report.entries.clone(),
            summary: JsonSummary {
                total_queries: report.total_calls,
                distinct_queries: report.entries.len(),
                total_time_secs: report.total_time_secs,
            },
        }
    }

    /// Serialize to JSON string
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
