//! Query statistics collector
//!
//! The collector sits behind a database layer's debug hook. Every query is
//! bracketed by [`Collector::record_start`] and [`Collector::record_end`];
//! in between, the host runs the query. Statistics are grouped by the
//! normalized query text the host passes in (placeholders, not literals).
//!
//! Timing is carried by a [`QueryToken`] returned from `record_start`, so
//! overlapping or interleaved queries on one collector each get their own
//! interval.

use crate::callsite::{call_site_key, BacktraceInspector, StackInspector};
use crate::clock::{Clock, SystemClock};
use crate::config::{CollectorConfig, CollectorOptions};
use crate::error::ConfigurationError;
use crate::params::{ParamKey, ParamValue};
use crate::report::{Report, ReportSink};
use crate::stats::{round4, CollectorState};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

/// Handle for one in-flight query, consumed by [`Collector::record_end`]
#[derive(Debug)]
#[must_use = "pass the token to record_end or the query's time is lost"]
pub struct QueryToken {
    query: String,
    started: Instant,
}

impl QueryToken {
    pub fn query(&self) -> &str {
        &self.query
    }
}

/// Listener interface a host database layer drives
///
/// Transaction callbacks default to no-ops so hosts can call them
/// unconditionally.
pub trait DebugHook: Send + Sync {
    fn query_start(&self, query: &str, params: &[ParamValue]) -> QueryToken;
    fn query_end(&self, token: QueryToken, query: &str, params: &[ParamValue]);
    fn transaction_begin(&self) {}
    fn transaction_commit(&self) {}
    fn transaction_rollback(&self) {}
}

/// Storage handle that can route its query events to a [`DebugHook`]
pub trait DebuggableStorage {
    fn set_debug_hook(&mut self, hook: Arc<dyn DebugHook>);
    fn set_debug_enabled(&mut self, enabled: bool);
}

/// Aggregates per-query-shape counts, timing and call sites
pub struct Collector {
    config: CollectorConfig,
    inspector: Box<dyn StackInspector>,
    clock: Arc<dyn Clock>,
    state: Mutex<CollectorState>,
    started: AtomicU64,
    finished: AtomicU64,
}

impl std::fmt::Debug for Collector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collector")
            .field("config", &self.config)
            .field("in_flight", &self.in_flight())
            .finish_non_exhaustive()
    }
}

impl Default for Collector {
    fn default() -> Self {
        Self::new(CollectorConfig::default())
    }
}

impl Collector {
    /// Create a collector using the system clock and `backtrace` stack walking
    pub fn new(config: CollectorConfig) -> Self {
        let callers_enabled = config.captures_callers();
        Self {
            config,
            inspector: Box::new(BacktraceInspector),
            clock: Arc::new(SystemClock),
            state: Mutex::new(CollectorState::new(callers_enabled)),
            started: AtomicU64::new(0),
            finished: AtomicU64::new(0),
        }
    }

    /// Build from a host configuration bag, optionally wiring into storage
    ///
    /// # Example
    /// ```
    /// use querystat::{Collector, CollectorOptions};
    ///
    /// let options = CollectorOptions::from_json(r#"{"printCaller": 0}"#).unwrap();
    /// let collector = Collector::from_options(options, None).unwrap();
    /// assert_eq!(collector.query_count(), 0);
    /// ```
    pub fn from_options(
        options: CollectorOptions,
        setup: Option<&mut dyn DebuggableStorage>,
    ) -> Result<Arc<Self>, ConfigurationError> {
        let collector = Arc::new(Self::new(options.into_config()?));
        if let Some(storage) = setup {
            collector.attach(storage);
        }
        Ok(collector)
    }

    /// Create a collector and install it as `storage`'s debug hook
    pub fn with_setup<S>(config: CollectorConfig, storage: &mut S) -> Arc<Self>
    where
        S: DebuggableStorage + ?Sized,
    {
        let collector = Arc::new(Self::new(config));
        collector.attach(storage);
        collector
    }

    /// Replace the stack inspector
    pub fn with_inspector(mut self, inspector: impl StackInspector + 'static) -> Self {
        self.inspector = Box::new(inspector);
        self
    }

    /// Replace the time source
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Install this collector as the active debug hook of `storage`
    pub fn attach<S>(self: &Arc<Self>, storage: &mut S)
    where
        S: DebuggableStorage + ?Sized,
    {
        let hook: Arc<dyn DebugHook> = Arc::clone(self) as Arc<dyn DebugHook>;
        storage.set_debug_hook(hook);
        storage.set_debug_enabled(true);
        tracing::debug!("collector attached to storage debug hook");
    }

    pub fn config(&self) -> &CollectorConfig {
        &self.config
    }

    /// Record that `query` is about to execute with `params`
    pub fn record_start(&self, query: &str, params: &[ParamValue]) -> QueryToken {
        let call_site = if self.config.captures_callers() {
            let frames = self
                .inspector
                .capture(self.config.filter(), self.config.print_caller());
            (!frames.is_empty()).then(|| call_site_key(&frames))
        } else {
            None
        };

        {
            let mut state = self.lock_state();
            state
                .entry(query)
                .record_call(ParamKey::from_params(params), call_site);
        }

        self.started.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(query, params = params.len(), "query started");

        QueryToken {
            query: query.to_string(),
            started: self.clock.now(),
        }
    }

    /// Record that the query behind `token` finished
    ///
    /// Success and failure are not distinguished. The elapsed time is rounded
    /// to 4 decimal places before being added to the query's total.
    pub fn record_end(&self, token: QueryToken, query: &str, _params: &[ParamValue]) {
        let elapsed = self
            .clock
            .now()
            .saturating_duration_since(token.started)
            .as_secs_f64();
        let elapsed = round4(elapsed);
        self.finished.fetch_add(1, Ordering::Relaxed);

        if query != token.query {
            tracing::warn!(
                started = %token.query,
                ended = %query,
                "query end does not match its start; attributing time to the started query"
            );
        }

        let mut state = self.lock_state();
        match state.queries.get_mut(&token.query) {
            Some(stats) => {
                stats.add_time(elapsed);
                tracing::trace!(query = %token.query, elapsed, "query finished");
            }
            None => {
                // Only possible when reset() ran while the query was in flight
                tracing::warn!(query = %token.query, elapsed, "query finished without recorded start");
            }
        }
    }

    /// Time `run` as one execution of `query`
    ///
    /// # Example
    /// ```
    /// use querystat::{Collector, CollectorConfig};
    ///
    /// let collector = Collector::new(CollectorConfig::without_callers());
    /// let rows = collector.time_query("SELECT 1", &[], || vec![1]);
    /// assert_eq!(rows, vec![1]);
    /// assert_eq!(collector.query_count(), 1);
    /// ```
    pub fn time_query<F, R>(&self, query: &str, params: &[ParamValue], run: F) -> R
    where
        F: FnOnce() -> R,
    {
        let token = self.record_start(query, params);
        let result = run();
        self.record_end(token, query, params);
        result
    }

    /// Total executions across all query shapes
    pub fn query_count(&self) -> u64 {
        self.lock_state().query_count()
    }

    /// Tokens issued by `record_start` and not yet consumed
    pub fn in_flight(&self) -> u64 {
        let started = self.started.load(Ordering::Relaxed);
        let finished = self.finished.load(Ordering::Relaxed);
        started.saturating_sub(finished)
    }

    pub fn transaction_begin(&self) {
        tracing::trace!("transaction begin (not tracked)");
    }

    pub fn transaction_commit(&self) {
        tracing::trace!("transaction commit (not tracked)");
    }

    pub fn transaction_rollback(&self) {
        tracing::trace!("transaction rollback (not tracked)");
    }

    /// Copy of the accumulated statistics
    pub fn snapshot(&self) -> CollectorState {
        self.lock_state().clone()
    }

    /// Drop every accumulated statistic
    pub fn reset(&self) {
        let mut state = self.lock_state();
        let dropped = state.queries.len();
        *state = CollectorState::new(self.config.captures_callers());
        tracing::debug!(dropped, "collector reset");
    }

    /// Build the sorted report
    pub fn report(&self, show_params: bool) -> Report {
        Report::build(&self.lock_state(), show_params)
    }

    /// Write the text report to `sink`
    pub fn print_report(&self, show_params: bool, sink: &mut dyn ReportSink) {
        sink.print_line(&self.report(show_params).to_text());
    }

    fn lock_state(&self) -> MutexGuard<'_, CollectorState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl DebugHook for Collector {
    fn query_start(&self, query: &str, params: &[ParamValue]) -> QueryToken {
        self.record_start(query, params)
    }

    fn query_end(&self, token: QueryToken, query: &str, params: &[ParamValue]) {
        self.record_end(token, query, params)
    }

    fn transaction_begin(&self) {
        Collector::transaction_begin(self)
    }

    fn transaction_commit(&self) {
        Collector::transaction_commit(self)
    }

    fn transaction_rollback(&self) {
        Collector::transaction_rollback(self)
    }
}
