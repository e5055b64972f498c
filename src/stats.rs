//! Per-query-shape statistics
//!
//! One [`QueryStats`] per distinct normalized query text, accumulated for
//! the lifetime of a collector. Nothing is ever evicted.

use crate::params::ParamKey;
use std::collections::HashMap;

/// Round a duration in seconds to 4 decimal places
pub fn round4(seconds: f64) -> f64 {
    (seconds * 10_000.0).round() / 10_000.0
}

/// Statistics for a single query shape
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryStats {
    /// Number of times this query shape was started
    pub count: u64,
    /// Occurrences of each literal parameter tuple
    pub param_occurrences: HashMap<ParamKey, u64>,
    /// Sum of elapsed time across executions (seconds)
    pub total_time_secs: f64,
    /// Occurrences of each captured call site
    pub call_sites: HashMap<String, u64>,
}

impl QueryStats {
    /// Record one execution start
    pub fn record_call(&mut self, params: ParamKey, call_site: Option<String>) {
        self.count += 1;
        *self.param_occurrences.entry(params).or_insert(0) += 1;
        if let Some(site) = call_site {
            *self.call_sites.entry(site).or_insert(0) += 1;
        }
    }

    /// Add an already-rounded elapsed time
    pub fn add_time(&mut self, seconds: f64) {
        self.total_time_secs += seconds;
    }

    /// Number of distinct parameter tuples seen
    pub fn distinct_params(&self) -> usize {
        self.param_occurrences.len()
    }

    /// Average seconds per call (0 when never called)
    pub fn average_secs(&self) -> f64 {
        if self.count > 0 {
            self.total_time_secs / self.count as f64
        } else {
            0.0
        }
    }

    /// Parameter tuples in a stable order
    pub fn sorted_params(&self) -> Vec<(&ParamKey, u64)> {
        let mut params: Vec<_> = self.param_occurrences.iter().map(|(k, v)| (k, *v)).collect();
        params.sort_by(|a, b| a.0.cmp(b.0));
        params
    }

    /// Call sites, most frequent first, then by key
    pub fn sorted_call_sites(&self) -> Vec<(&str, u64)> {
        let mut sites: Vec<_> = self
            .call_sites
            .iter()
            .map(|(k, v)| (k.as_str(), *v))
            .collect();
        sites.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        sites
    }
}

/// Snapshot of everything a collector has accumulated
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CollectorState {
    /// Map from normalized query text to statistics
    pub queries: HashMap<String, QueryStats>,
    /// Whether call-site capture was enabled while collecting
    pub callers_enabled: bool,
}

impl CollectorState {
    pub fn new(callers_enabled: bool) -> Self {
        Self {
            queries: HashMap::new(),
            callers_enabled,
        }
    }

    /// Look up or lazily create the entry for a query shape
    pub fn entry(&mut self, query: &str) -> &mut QueryStats {
        if !self.queries.contains_key(query) {
            tracing::debug!(query, "new query shape");
        }
        self.queries.entry(query.to_string()).or_default()
    }

    pub fn get(&self, query: &str) -> Option<&QueryStats> {
        self.queries.get(query)
    }

    /// Total executions across all query shapes
    pub fn query_count(&self) -> u64 {
        self.queries.values().map(|s| s.count).sum()
    }

    /// Total elapsed time across all query shapes (seconds)
    pub fn total_time_secs(&self) -> f64 {
        self.queries.values().map(|s| s.total_time_secs).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.queries.is_empty()
    }

    /// Queries ordered by ascending total time, ties broken by text
    pub fn sorted_by_time(&self) -> Vec<(&str, &QueryStats)> {
        let mut sorted: Vec<_> = self.queries.iter().map(|(q, s)| (q.as_str(), s)).collect();
        sorted.sort_by(|a, b| {
            a.1.total_time_secs
                .partial_cmp(&b.1.total_time_secs)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.cmp(b.0))
        });
        sorted
    }
}
