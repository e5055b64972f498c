//! Call-site attribution for recorded queries
//!
//! When a query starts, the active call stack is walked outward and the
//! first frames that belong to application code (not the ORM, the async
//! runtime, the web server or this crate) are kept as the query's call site.
//!
//! Stack introspection is a capability: [`BacktraceInspector`] resolves
//! symbols through the `backtrace` crate, [`NoopInspector`] reports nothing
//! and is the right choice for stripped binaries or hot paths where symbol
//! resolution is too expensive.

use regex::Regex;
use std::fmt;
use std::path::{Path, PathBuf};

/// Hard cap on the number of frames walked per capture
pub const MAX_STACK_DEPTH: usize = 200;

/// Separator between frame descriptions inside a call-site key
pub const CALL_SITE_SEPARATOR: &str = "\n\t";

/// Default pattern for frames that never count as the "real" caller
///
/// Covers the standard library and test harness, stack-walking machinery,
/// database drivers and ORMs, async runtimes, and web frameworks/servers.
/// Compiler-generated trait shims whose self type is a reference, pointer,
/// function, trait object, slice, tuple or bare generic parameter are
/// skipped as well (e.g. `<&mut F as core::ops::function::FnOnce<A>>::call_once`).
pub const DEFAULT_IGNORE_PATTERN: &str = concat!(
    r"^<?(std|core|alloc|test|backtrace|querystat",
    r"|sqlx|sqlx_core|sqlx_postgres|sqlx_mysql|sqlx_sqlite|diesel|sea_orm|sea_query",
    r"|rusqlite|postgres|tokio_postgres|mysql|mysql_async|r2d2|deadpool|deadpool_postgres|bb8",
    r"|tokio|futures|futures_util|futures_executor|async_std",
    r"|hyper|axum|actix_web|actix_http|actix_server|tower|tower_http|warp|rocket|tracing)::",
    r"|^<(&|\*|\[|\(|fn\b|dyn\b|impl\b|[A-Z]\w* as )",
    r"|^_|^(start_thread|clone3?|main)$",
);

/// Crates whose frames sit between the host's call and the stack walk
///
/// A capture always starts inside this crate and the unwinder, so the
/// leading run of frames from these crates is dropped before the ignore
/// pattern is consulted, whatever that pattern is.
const INTERNAL_CRATES: &[&str] = &["querystat", "backtrace", "std", "core", "alloc"];

/// Whether a frame belongs to the collector or the unwinding machinery
fn is_internal(module: &str) -> bool {
    if module.starts_with('_') {
        return true;
    }
    let path = module.trim_start_matches('<');
    INTERNAL_CRATES
        .iter()
        .any(|krate| path.strip_prefix(krate).is_some_and(|rest| rest.starts_with("::")))
}

/// One resolved stack frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallerFrame {
    /// Demangled symbol path, e.g. `shop::orders::load_cart`
    pub module: String,
    pub line: Option<u32>,
    pub file: Option<PathBuf>,
}

impl CallerFrame {
    pub fn new(module: impl Into<String>, line: Option<u32>, file: Option<PathBuf>) -> Self {
        Self {
            module: module.into(),
            line,
            file,
        }
    }
}

impl fmt::Display for CallerFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.line {
            Some(line) => write!(f, "{}:{}", self.module, line)?,
            None => write!(f, "{}:?", self.module)?,
        }
        match &self.file {
            Some(file) => write!(f, " ({})", file.display()),
            None => write!(f, " (?)"),
        }
    }
}

/// Serialize captured frames into the key used by the call-site map
pub fn call_site_key(frames: &[CallerFrame]) -> String {
    frames
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(CALL_SITE_SEPARATOR)
}

/// Legacy rule for compiled template code
///
/// Frames whose symbol lives under `namespace` and whose source file ends in
/// `file_suffix` are generated from templates and skipped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateRule {
    pub namespace: String,
    pub file_suffix: String,
}

impl Default for TemplateRule {
    fn default() -> Self {
        Self {
            namespace: "askama::".to_string(),
            file_suffix: ".html".to_string(),
        }
    }
}

impl TemplateRule {
    fn matches(&self, frame: &CallerFrame) -> bool {
        let in_namespace = frame
            .module
            .trim_start_matches('<')
            .starts_with(&self.namespace);
        in_namespace
            && frame
                .file
                .as_deref()
                .and_then(Path::to_str)
                .is_some_and(|f| f.ends_with(&self.file_suffix))
    }
}

/// Decides which frames are skipped during attribution
#[derive(Debug, Clone)]
pub struct FrameFilter {
    ignore: Regex,
    template: Option<TemplateRule>,
}

impl FrameFilter {
    pub fn new(ignore: Regex, template: Option<TemplateRule>) -> Self {
        Self { ignore, template }
    }

    pub fn ignore_pattern(&self) -> &str {
        self.ignore.as_str()
    }

    pub fn template_rule(&self) -> Option<&TemplateRule> {
        self.template.as_ref()
    }

    /// Same ignore pattern, different template rule
    pub fn with_template_rule(&self, template: Option<TemplateRule>) -> Self {
        Self::new(self.ignore.clone(), template)
    }

    /// Check if a frame should be left out of the call site
    pub fn should_skip(&self, frame: &CallerFrame) -> bool {
        if self.ignore.is_match(&frame.module) {
            return true;
        }
        self.template.as_ref().is_some_and(|rule| rule.matches(frame))
    }

    /// Run a [`FrameWalk`] over already-resolved frames, innermost first
    pub fn select<I>(&self, frames: I, limit: usize) -> Vec<CallerFrame>
    where
        I: IntoIterator<Item = CallerFrame>,
    {
        let mut walk = FrameWalk::new(self, limit);
        for frame in frames {
            walk.offer(frame);
            if !walk.advance() {
                break;
            }
        }
        walk.finish()
    }
}

/// Incremental call-site selection over a stack, innermost frame first
///
/// Each physical frame may resolve to several symbols (inlining), so
/// symbols are fed with [`FrameWalk::offer`] and the physical frame is
/// closed with [`FrameWalk::advance`], which enforces [`MAX_STACK_DEPTH`].
#[derive(Debug)]
pub struct FrameWalk<'a> {
    filter: &'a FrameFilter,
    limit: usize,
    walked: usize,
    leaving_internals: bool,
    selected: Vec<CallerFrame>,
}

impl<'a> FrameWalk<'a> {
    pub fn new(filter: &'a FrameFilter, limit: usize) -> Self {
        Self {
            filter,
            limit,
            walked: 0,
            leaving_internals: true,
            selected: Vec::with_capacity(limit.min(MAX_STACK_DEPTH)),
        }
    }

    /// Consider one resolved symbol of the current physical frame
    pub fn offer(&mut self, frame: CallerFrame) {
        if self.selected.len() >= self.limit {
            return;
        }
        if self.leaving_internals {
            if is_internal(&frame.module) {
                return;
            }
            self.leaving_internals = false;
        }
        if !self.filter.should_skip(&frame) {
            self.selected.push(frame);
        }
    }

    /// Close the current physical frame; false once the walk should stop
    pub fn advance(&mut self) -> bool {
        self.walked += 1;
        self.selected.len() < self.limit && self.walked < MAX_STACK_DEPTH
    }

    /// Physical frames walked so far
    pub fn walked(&self) -> usize {
        self.walked
    }

    pub fn finish(self) -> Vec<CallerFrame> {
        self.selected
    }
}

impl Default for FrameFilter {
    fn default() -> Self {
        let ignore =
            Regex::new(DEFAULT_IGNORE_PATTERN).expect("default ignore pattern is a valid regex");
        Self::new(ignore, Some(TemplateRule::default()))
    }
}

/// Source of call stacks at query-start time
pub trait StackInspector: Send + Sync {
    /// Capture up to `limit` application frames, innermost first
    fn capture(&self, filter: &FrameFilter, limit: usize) -> Vec<CallerFrame>;
}

/// Inspector that never captures anything
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopInspector;

impl StackInspector for NoopInspector {
    fn capture(&self, _filter: &FrameFilter, _limit: usize) -> Vec<CallerFrame> {
        Vec::new()
    }
}

/// Inspector that walks the current thread's stack with `backtrace`
#[derive(Debug, Default, Clone, Copy)]
pub struct BacktraceInspector;

impl StackInspector for BacktraceInspector {
    fn capture(&self, filter: &FrameFilter, limit: usize) -> Vec<CallerFrame> {
        if limit == 0 {
            return Vec::new();
        }

        let mut walk = FrameWalk::new(filter, limit);

        backtrace::trace(|frame| {
            backtrace::resolve_frame(frame, |symbol| {
                // Unresolved frames cannot be attributed
                let Some(name) = symbol.name() else {
                    return;
                };
                walk.offer(CallerFrame::new(
                    format!("{:#}", name),
                    symbol.lineno(),
                    symbol.filename().map(Path::to_path_buf),
                ));
            });
            walk.advance()
        });

        let walked = walk.walked();
        let selected = walk.finish();
        tracing::trace!(walked, captured = selected.len(), "captured call site");
        selected
    }
}
