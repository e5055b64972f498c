//! Error types for collector construction
//!
//! Recording and reporting never fail; everything that can go wrong happens
//! while turning a configuration bag into a working collector.

use thiserror::Error;

/// Construction-time failure. Fatal to building a [`crate::Collector`].
#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("Invalid caller ignore pattern {pattern:?}: {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("Invalid collector options: {0}")]
    InvalidOptions(#[from] serde_json::Error),
}
