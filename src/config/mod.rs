//! Configuration module for dvmeta
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//!
//! # Example
//!
//! ```no_run
//! use dvmeta::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("config.toml")).unwrap();
//! println!("Crawling {} with {} concurrent requests",
//!     config.source.base_url, config.crawler.max_concurrent_requests);
//! ```

mod parser;
mod types;
mod validation;

pub use types::{Config, CrawlerConfig, OutputConfig, SourceConfig};

pub use parser::{compute_config_hash, load_config, load_config_with_hash, parse_config};
