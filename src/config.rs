//! Collector configuration
//!
//! Two layers: [`CollectorConfig`] is the typed, validated form the collector
//! runs with; [`CollectorOptions`] is the loose configuration bag hosts pass
//! in (usually JSON), using the host-facing key names.

use crate::callsite::{FrameFilter, TemplateRule, DEFAULT_IGNORE_PATTERN};
use crate::error::ConfigurationError;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Default number of call-site frames captured per query
pub const DEFAULT_PRINT_CALLER: usize = 1;

/// Typed collector configuration
///
/// # Example
/// ```
/// use querystat::config::CollectorConfig;
///
/// let config = CollectorConfig::default()
///     .with_print_caller(3)
///     .with_ignore_pattern(r"^(std|core|myorm)::")
///     .unwrap();
/// assert_eq!(config.print_caller(), 3);
/// assert!(config.captures_callers());
/// ```
#[derive(Debug, Clone)]
pub struct CollectorConfig {
    /// Frames kept per call site; 0 disables stack inspection entirely
    print_caller: usize,
    filter: FrameFilter,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            print_caller: DEFAULT_PRINT_CALLER,
            filter: FrameFilter::default(),
        }
    }
}

impl CollectorConfig {
    /// Configuration with call-site capture switched off
    pub fn without_callers() -> Self {
        Self::default().with_print_caller(0)
    }

    pub fn with_print_caller(mut self, frames: usize) -> Self {
        self.print_caller = frames;
        self
    }

    /// Replace the ignore pattern (the default is not merged in)
    pub fn with_ignore_pattern(self, pattern: &str) -> Result<Self, ConfigurationError> {
        let ignore = compile_pattern(pattern)?;
        let template = self.filter.template_rule().cloned();
        Ok(Self {
            filter: FrameFilter::new(ignore, template),
            ..self
        })
    }

    /// Replace or remove the compiled-template frame rule
    pub fn with_template_rule(self, rule: Option<TemplateRule>) -> Self {
        Self {
            filter: self.filter.with_template_rule(rule),
            ..self
        }
    }

    pub fn print_caller(&self) -> usize {
        self.print_caller
    }

    pub fn captures_callers(&self) -> bool {
        self.print_caller > 0
    }

    pub fn filter(&self) -> &FrameFilter {
        &self.filter
    }

    pub fn ignore_pattern(&self) -> &str {
        self.filter.ignore_pattern()
    }
}

fn compile_pattern(pattern: &str) -> Result<Regex, ConfigurationError> {
    Regex::new(pattern).map_err(|source| ConfigurationError::InvalidPattern {
        pattern: pattern.to_string(),
        source,
    })
}

/// `printCaller` accepts either a flag or a frame count
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PrintCaller {
    Flag(bool),
    Frames(u32),
}

impl PrintCaller {
    pub fn frames(self) -> usize {
        match self {
            PrintCaller::Flag(true) => 1,
            PrintCaller::Flag(false) => 0,
            PrintCaller::Frames(n) => n as usize,
        }
    }
}

/// Host-facing configuration bag
///
/// Unknown keys are rejected. The storage handle (`setup`) is not part of
/// the bag; it is passed to [`crate::Collector::from_options`] as a typed value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CollectorOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub print_caller: Option<PrintCaller>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caller_ignore_pattern: Option<String>,
}

impl CollectorOptions {
    /// Parse options from a JSON object
    pub fn from_json(json: &str) -> Result<Self, ConfigurationError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Validate and convert into a [`CollectorConfig`]
    pub fn into_config(self) -> Result<CollectorConfig, ConfigurationError> {
        let mut config = CollectorConfig::default();
        if let Some(print_caller) = self.print_caller {
            config = config.with_print_caller(print_caller.frames());
        }
        if let Some(pattern) = self.caller_ignore_pattern {
            config = config.with_ignore_pattern(&pattern)?;
        }
        tracing::debug!(
            print_caller = config.print_caller(),
            custom_pattern = config.ignore_pattern() != DEFAULT_IGNORE_PATTERN,
            "collector options resolved"
        );
        Ok(config)
    }
}

impl TryFrom<CollectorOptions> for CollectorConfig {
    type Error = ConfigurationError;

    fn try_from(options: CollectorOptions) -> Result<Self, Self::Error> {
        options.into_config()
    }
}
