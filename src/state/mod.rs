//! State module for the crawled hierarchy
//!
//! # Components
//!
//! - `Hierarchy`: the shared accumulator every crawl task writes into
//! - `CrawlResult`: the frozen, read-only outcome of a crawl
//! - `VersionState`: the tag assigned to each fetched dataset
//! - `FailureRecord`: one fetch that did not produce a usable result

mod failure;
mod hierarchy;
mod records;
mod version_state;

pub use failure::{FailureKind, FailureRecord, FetchOperation};
pub use hierarchy::{Discovered, Hierarchy, HierarchyError};
pub use records::{
    ChildListing, CollectionEntry, CollectionNode, CrawlResult, FileDescriptor, LeafEntry,
    LeafRecord, LeafRef,
};
pub use version_state::{ReleaseState, VersionState};
