//! Human-readable query statistics report
//!
//! Entries are ordered by ascending total time so the most expensive query
//! shapes end up at the bottom, right above the summary line.

use crate::stats::CollectorState;
use serde::{Deserialize, Serialize};
use std::fmt;

/// One call site and how often it issued the query
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallSiteCount {
    pub site: String,
    pub count: u64,
}

/// Report line for a single query shape
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportEntry {
    pub query: String,
    pub count: u64,
    pub distinct_params: usize,
    /// Rendered parameter tuples, only when parameters were requested
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Vec<String>>,
    pub total_time_secs: f64,
    pub average_secs: f64,
    /// Only present when call-site capture was enabled
    #[serde(skip_serializing_if = "Option::is_none")]
    pub call_sites: Option<Vec<CallSiteCount>>,
}

impl fmt::Display for ReportEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.query)?;
        write!(
            f,
            "\n  calls: {}  distinct params: {}",
            self.count, self.distinct_params
        )?;

        if let Some(params) = &self.params {
            f.write_str("\n  params:")?;
            for p in params {
                write!(f, "\n    {}", p)?;
            }
        }

        write!(
            f,
            "\n  total: {:.4}s  average: {:.4}s",
            self.total_time_secs, self.average_secs
        )?;

        if let Some(sites) = self.call_sites.as_ref().filter(|s| !s.is_empty()) {
            f.write_str("\n  callers:")?;
            for site in sites {
                write!(f, "\n    {:>5}x {}", site.count, site.site)?;
            }
        }

        Ok(())
    }
}

impl ReportEntry {
    /// Multi-line text block for this entry
    pub fn to_text(&self) -> String {
        self.to_string()
    }
}

/// Sorted report over a collector snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub entries: Vec<ReportEntry>,
    pub total_time_secs: f64,
    pub total_calls: u64,
}

impl Report {
    /// Build a report from collected state
    ///
    /// Parameter tuples are included only when `show_params` is set, since
    /// they may carry sensitive literals.
    pub fn build(state: &CollectorState, show_params: bool) -> Self {
        let entries: Vec<ReportEntry> = state
            .sorted_by_time()
            .into_iter()
            .map(|(query, stats)| ReportEntry {
                query: query.to_string(),
                count: stats.count,
                distinct_params: stats.distinct_params(),
                params: show_params.then(|| {
                    stats
                        .sorted_params()
                        .into_iter()
                        .map(|(key, _)| key.to_string())
                        .collect()
                }),
                total_time_secs: stats.total_time_secs,
                average_secs: stats.average_secs(),
                call_sites: state.callers_enabled.then(|| {
                    stats
                        .sorted_call_sites()
                        .into_iter()
                        .map(|(site, count)| CallSiteCount {
                            site: site.to_string(),
                            count,
                        })
                        .collect()
                }),
            })
            .collect();

        Self {
            total_time_secs: entries.iter().map(|e| e.total_time_secs).sum(),
            total_calls: entries.iter().map(|e| e.count).sum(),
            entries,
        }
    }

    pub fn summary_line(&self) -> String {
        format!("Total query time: {:.4}s", self.total_time_secs)
    }

    /// One string per entry, followed by the summary line
    pub fn lines(&self) -> Vec<String> {
        let mut lines: Vec<String> = self.entries.iter().map(ReportEntry::to_text).collect();
        lines.push(self.summary_line());
        lines
    }

    /// Lines joined into one block, each followed by a blank line
    pub fn to_text(&self) -> String {
        self.lines()
            .into_iter()
            .fold(String::new(), |mut out, line| {
                out.push_str(&line);
                out.push_str("\n\n");
                out
            })
    }
}

/// Render the report as a sequence of strings
pub fn render(state: &CollectorState, show_params: bool) -> Vec<String> {
    Report::build(state, show_params).lines()
}

/// Render the report as a single block of text
pub fn render_text(state: &CollectorState, show_params: bool) -> String {
    Report::build(state, show_params).to_text()
}

/// Destination for rendered report text
pub trait ReportSink {
    fn print_line(&mut self, line: &str);
}

/// Writes report text to stderr
#[derive(Debug, Default, Clone, Copy)]
pub struct StderrSink;

impl ReportSink for StderrSink {
    fn print_line(&mut self, line: &str) {
        eprintln!("{}", line);
    }
}

/// Emits report text as `info` events
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl ReportSink for TracingSink {
    fn print_line(&mut self, line: &str) {
        tracing::info!(target: "querystat::report", "{}", line);
    }
}

impl ReportSink for Vec<String> {
    fn print_line(&mut self, line: &str) {
        self.push(line.to_string());
    }
}

impl ReportSink for String {
    fn print_line(&mut self, line: &str) {
        self.push_str(line);
        self.push('\n');
    }
}
