//! Integration tests against mock Dataverse installations

mod common;
mod crawl_tests;
mod export_tests;
