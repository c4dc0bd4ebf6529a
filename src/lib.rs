//! dvmeta: a concurrent metadata crawler for Dataverse repositories
//!
//! This crate walks a tree of collections starting at a user-specified root,
//! fetches every dataset's metadata concurrently, and reconstructs the
//! hierarchy in memory, keeping track of every fetch that failed along the way.

pub mod config;
pub mod crawler;
pub mod output;
pub mod state;

use thiserror::Error;

/// Main error type for dvmeta operations
#[derive(Debug, Error)]
pub enum DvMetaError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Invalid version policy: {0}")]
    Policy(#[from] PolicyError),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] ::url::ParseError),

    #[error("Invalid API key header value")]
    InvalidApiKey,

    #[error("Hierarchy error: {0}")]
    Hierarchy(#[from] state::HierarchyError),

    #[error("Output error: {0}")]
    Output(#[from] output::OutputError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),
}

/// Errors raised while parsing a version policy
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PolicyError {
    #[error(
        "\"{0}\" is not a version policy; expected \"draft\", \"latest\", \"latest-published\", \"x\" or \"x.y\""
    )]
    Unrecognized(String),
}

/// Result type alias for dvmeta operations
pub type Result<T> = std::result::Result<T, DvMetaError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use config::Config;
pub use crawler::{crawl, CrawlOptions, VersionPolicy};
pub use state::{CrawlResult, FailureKind, FetchOperation, VersionState};
