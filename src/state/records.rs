//! Records held by the hierarchy and the frozen crawl result

use crate::state::failure::{FailureRecord, FetchOperation};
use crate::state::version_state::VersionState;
use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

/// A collection (dataverse) in the crawled hierarchy
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CollectionNode {
    pub id: String,

    /// Display name, taken from the parent's listing (the identifier for the root)
    pub name: String,

    /// The collection that discovered this one; None only for the crawl root
    pub parent: Option<String>,

    /// Child collections in listing order, including ones owned by another parent
    pub child_collections: Vec<String>,

    /// Child datasets in listing order
    pub child_leaves: Vec<String>,
}

impl CollectionNode {
    /// Creates a node whose children are not known yet
    pub fn stub(id: impl Into<String>, name: impl Into<String>, parent: Option<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            parent,
            child_collections: Vec::new(),
            child_leaves: Vec::new(),
        }
    }
}

/// A file attached to a dataset version
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileDescriptor {
    pub id: String,
    pub name: String,
    pub size: u64,

    /// `<algorithm>:<value>`, e.g. `MD5:0cc175b9c0f1b6a831c399e269772661`
    pub checksum: Option<String>,
}

/// A dataset whose metadata was fetched and classified
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LeafRecord {
    pub id: String,
    pub persistent_id: String,

    /// The collection that owns this dataset in the reconstructed hierarchy
    pub collection: String,

    pub state: VersionState,

    /// `major.minor` of the selected version; None for drafts
    pub version: Option<String>,

    /// The selected version exactly as returned by the API
    pub payload: Value,

    pub files: Vec<FileDescriptor>,
}

impl LeafRecord {
    pub fn total_bytes(&self) -> u64 {
        self.files.iter().map(|f| f.size).sum()
    }
}

/// A child collection as reported by a listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionEntry {
    pub id: String,
    pub name: String,
}

/// A child dataset as reported by a listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeafEntry {
    pub id: String,
    pub persistent_id: String,
}

/// The direct children of one collection, in listing order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChildListing {
    pub collections: Vec<CollectionEntry>,
    pub leaves: Vec<LeafEntry>,
}

impl ChildListing {
    pub fn is_empty(&self) -> bool {
        self.collections.is_empty() && self.leaves.is_empty()
    }
}

/// A dataset claimed for fetching, with the collection that owns it
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LeafRef {
    pub id: String,
    pub persistent_id: String,
    pub collection: String,
}

/// The frozen outcome of one crawl
///
/// All maps are ordered so that crawling an unchanged source twice yields
/// identical output regardless of the order in which fetches completed.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CrawlResult {
    /// The identifier the crawl started from
    pub root: String,

    pub collections: BTreeMap<String, CollectionNode>,
    pub leaves: BTreeMap<String, LeafRecord>,

    /// Collection ids from the root down to each dataset's owning collection
    pub ancestry: BTreeMap<String, Vec<String>>,

    /// Collections with no dataset anywhere below them
    pub empty_collections: BTreeSet<String>,

    /// Sorted by operation, then identifier
    pub failures: Vec<FailureRecord>,

    /// Raw role assignments per dataset, when permissions were requested
    pub permissions: BTreeMap<String, Value>,

    /// True if the crawl was interrupted before it drained
    pub cancelled: bool,
}

impl CrawlResult {
    pub fn ancestor_path(&self, leaf_id: &str) -> Option<&[String]> {
        self.ancestry.get(leaf_id).map(Vec::as_slice)
    }

    /// Number of collections between the root and the dataset, inclusive
    pub fn depth(&self, leaf_id: &str) -> Option<usize> {
        self.ancestor_path(leaf_id).map(<[String]>::len)
    }

    /// Slash-separated collection names below the root, e.g. `/Physics/Optics`
    ///
    /// Datasets owned directly by the root get `/`.
    pub fn display_path(&self, leaf_id: &str) -> Option<String> {
        let path = self.ancestor_path(leaf_id)?;
        let names: Vec<&str> = path
            .iter()
            .skip(1)
            .map(|id| {
                self.collections
                    .get(id)
                    .map(|node| node.name.as_str())
                    .unwrap_or(id.as_str())
            })
            .collect();
        Some(format!("/{}", names.join("/")))
    }

    pub fn leaves_in_state(&self, state: VersionState) -> impl Iterator<Item = &LeafRecord> {
        self.leaves.values().filter(move |leaf| leaf.state == state)
    }

    pub fn failures_for(&self, operation: FetchOperation) -> impl Iterator<Item = &FailureRecord> {
        self.failures
            .iter()
            .filter(move |failure| failure.operation == operation)
    }

    /// True if the root listing itself failed and nothing else was crawled
    pub fn root_failed(&self) -> bool {
        self.failures_for(FetchOperation::ListChildren)
            .any(|failure| failure.id == self.root)
    }

    /// Total number of files across all fetched datasets
    pub fn file_count(&self) -> usize {
        self.leaves.values().map(|leaf| leaf.files.len()).sum()
    }

    /// Total size of all files across all fetched datasets
    pub fn total_bytes(&self) -> u64 {
        self.leaves.values().map(LeafRecord::total_bytes).sum()
    }
}
