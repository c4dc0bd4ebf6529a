//! Shared accumulator for the crawled hierarchy
//!
//! Every in-flight task writes into one `Hierarchy`. All bookkeeping lives
//! behind a single mutex so that claiming an identifier (test-and-set),
//! inserting nodes, and settling empty subtrees are each one critical
//! section. The lock is never held across a network call.

use crate::state::failure::{FailureRecord, FetchOperation};
use crate::state::records::{ChildListing, CollectionNode, CrawlResult, LeafRecord, LeafRef};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};
use thiserror::Error;

/// Errors raised when an insert would break the hierarchy's invariants
#[derive(Debug, Error, PartialEq, Eq)]
pub enum HierarchyError {
    #[error("dataset {leaf} belongs to unknown collection {collection}")]
    UnknownCollection { leaf: String, collection: String },

    #[error("dataset {0} was inserted twice")]
    DuplicateLeaf(String),

    #[error("parent links above collection {0} do not lead to the root")]
    BrokenAncestry(String),
}

/// Work discovered by a successful listing that nobody else has claimed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Discovered {
    pub collections: Vec<String>,
    pub leaves: Vec<LeafRef>,
}

/// Emptiness bookkeeping for the subtree below one collection
#[derive(Debug, Default)]
struct Subtree {
    /// The collection's own listing finished (or failed)
    listed: bool,

    /// Listed child collections whose subtrees have not settled yet
    pending: usize,

    /// Every listed parent still waiting on this subtree's verdict
    waiters: Vec<String>,

    /// At least one dataset was discovered somewhere below
    has_leaves: bool,

    /// Some listing below failed, so "no datasets" cannot be confirmed
    incomplete: bool,

    settled: bool,
}

#[derive(Debug, Default)]
struct HierarchyState {
    collections: BTreeMap<String, CollectionNode>,
    subtrees: HashMap<String, Subtree>,
    leaves: BTreeMap<String, LeafRecord>,
    ancestry: BTreeMap<String, Vec<String>>,
    claimed: HashSet<(FetchOperation, String)>,
    empty: BTreeSet<String>,
    failures: Vec<FailureRecord>,
    permissions: BTreeMap<String, Value>,
}

/// The mutable hierarchy shared by all crawl tasks
pub struct Hierarchy {
    root: String,
    state: Mutex<HierarchyState>,
}

impl Hierarchy {
    /// Creates a hierarchy containing only the (already claimed) root
    pub fn new(root: impl Into<String>) -> Self {
        let root = root.into();
        let mut state = HierarchyState::default();
        state.insert_node(&root, &root, None);

        Self { root, state: Mutex::new(state) }
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    fn lock(&self) -> MutexGuard<'_, HierarchyState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Claims `id` for `operation`
    ///
    /// Returns true exactly once per (operation, id) pair; every later call
    /// returns false, whether the first claim succeeded, failed, or is still
    /// in flight.
    pub fn claim(&self, operation: FetchOperation, id: &str) -> bool {
        self.lock().claimed.insert((operation, id.to_string()))
    }

    /// Claims a collection for listing and records its stub node
    ///
    /// Returns false if the collection was already known, in which case the
    /// existing parent link is kept.
    pub fn insert_node(&self, id: &str, name: &str, parent: &str) -> bool {
        self.lock().insert_node(id, name, Some(parent.to_string()))
    }

    /// Records a successful listing of `collection`
    ///
    /// Child lists are stored as reported. Children not claimed before are
    /// claimed here with `collection` as their parent and returned so the
    /// caller can schedule them.
    pub fn record_listing(&self, collection: &str, listing: &ChildListing) -> Discovered {
        let mut state = self.lock();
        let mut discovered = Discovered::default();

        let Some(node) = state.collections.get_mut(collection) else {
            tracing::warn!("Listing for unknown collection {} ignored", collection);
            return discovered;
        };
        node.child_collections = listing.collections.iter().map(|c| c.id.clone()).collect();
        node.child_leaves = listing.leaves.iter().map(|l| l.id.clone()).collect();

        // Every listed child counts toward the verdict, claimed here or not
        let mut pending = 0;
        let mut has_leaves = !listing.leaves.is_empty();
        let mut incomplete = false;

        for child in &listing.collections {
            if state.insert_node(&child.id, &child.name, Some(collection.to_string())) {
                discovered.collections.push(child.id.clone());
            }

            let Some(child_subtree) = state.subtrees.get_mut(&child.id) else {
                continue;
            };
            if child_subtree.settled {
                has_leaves |= child_subtree.has_leaves;
                incomplete |= child_subtree.incomplete;
            } else {
                child_subtree.waiters.push(collection.to_string());
                pending += 1;
            }
        }

        for leaf in &listing.leaves {
            if state
                .claimed
                .insert((FetchOperation::FetchLeaf, leaf.id.clone()))
            {
                discovered.leaves.push(LeafRef {
                    id: leaf.id.clone(),
                    persistent_id: leaf.persistent_id.clone(),
                    collection: collection.to_string(),
                });
            }
        }

        let subtree = state.subtrees.entry(collection.to_string()).or_default();
        subtree.listed = true;
        subtree.pending = pending;
        subtree.has_leaves |= has_leaves;
        subtree.incomplete |= incomplete;
        if subtree.pending == 0 {
            state.settle(collection);
        }

        discovered
    }

    /// Stores a fetched dataset along with its ancestor path
    pub fn insert_leaf(&self, leaf: LeafRecord) -> Result<(), HierarchyError> {
        let mut state = self.lock();

        if state.leaves.contains_key(&leaf.id) {
            return Err(HierarchyError::DuplicateLeaf(leaf.id));
        }
        if !state.collections.contains_key(&leaf.collection) {
            return Err(HierarchyError::UnknownCollection {
                leaf: leaf.id,
                collection: leaf.collection,
            });
        }

        let path = state.ancestor_path(&leaf.collection)?;
        state.ancestry.insert(leaf.id.clone(), path);
        state.leaves.insert(leaf.id.clone(), leaf);
        Ok(())
    }

    pub fn insert_permissions(&self, leaf_id: &str, payload: Value) {
        self.lock().permissions.insert(leaf_id.to_string(), payload);
    }

    /// Appends a failure
    ///
    /// A failed listing settles the collection's subtree as incomplete: it is
    /// never marked empty, and neither is any ancestor without datasets.
    pub fn record_failure(&self, failure: FailureRecord) {
        let mut state = self.lock();

        if failure.operation == FetchOperation::ListChildren {
            if let Some(subtree) = state.subtrees.get_mut(&failure.id) {
                if !subtree.settled {
                    subtree.listed = true;
                    subtree.incomplete = true;
                    subtree.pending = 0;
                    state.settle(&failure.id);
                }
            }
        }

        state.failures.push(failure);
    }

    /// True if the collection has been confirmed to have no datasets below it
    pub fn is_confirmed_empty(&self, id: &str) -> bool {
        self.lock().empty.contains(id)
    }

    /// Moves everything accumulated so far into a `CrawlResult`
    ///
    /// If the root listing failed, the result carries only that failure.
    pub fn freeze(&self, cancelled: bool) -> CrawlResult {
        let state = std::mem::take(&mut *self.lock());

        let mut failures = state.failures;
        failures.sort_by(|a, b| (a.operation, &a.id).cmp(&(b.operation, &b.id)));

        let root_failed = failures
            .iter()
            .any(|f| f.operation == FetchOperation::ListChildren && f.id == self.root);
        if root_failed {
            return CrawlResult {
                root: self.root.clone(),
                failures,
                cancelled,
                ..Default::default()
            };
        }

        CrawlResult {
            root: self.root.clone(),
            collections: state.collections,
            leaves: state.leaves,
            ancestry: state.ancestry,
            empty_collections: state.empty,
            failures,
            permissions: state.permissions,
            cancelled,
        }
    }
}

impl HierarchyState {
    fn insert_node(&mut self, id: &str, name: &str, parent: Option<String>) -> bool {
        if !self
            .claimed
            .insert((FetchOperation::ListChildren, id.to_string()))
        {
            return false;
        }
        self.collections
            .insert(id.to_string(), CollectionNode::stub(id, name, parent));
        self.subtrees.insert(id.to_string(), Subtree::default());
        true
    }

    /// Collection ids from the root down to `collection`, inclusive
    fn ancestor_path(&self, collection: &str) -> Result<Vec<String>, HierarchyError> {
        let mut path = Vec::new();
        let mut current = Some(collection.to_string());

        while let Some(id) = current {
            // Parent links are set once, before any child is claimed, so a
            // chain longer than the node count means they were corrupted.
            if path.len() > self.collections.len() {
                return Err(HierarchyError::BrokenAncestry(collection.to_string()));
            }
            let node = self
                .collections
                .get(&id)
                .ok_or_else(|| HierarchyError::BrokenAncestry(collection.to_string()))?;
            current = node.parent.clone();
            path.push(id);
        }

        path.reverse();
        Ok(path)
    }

    /// Settles `id` and every waiting parent whose last pending child it was
    ///
    /// Collections on a cycle wait on each other and never settle, so their
    /// verdict stays unknown.
    fn settle(&mut self, id: &str) {
        let mut ready = vec![id.to_string()];

        while let Some(current) = ready.pop() {
            let Some(subtree) = self.subtrees.get_mut(&current) else {
                continue;
            };
            if subtree.settled {
                continue;
            }
            subtree.settled = true;
            let has_leaves = subtree.has_leaves;
            let incomplete = subtree.incomplete;
            let waiters = std::mem::take(&mut subtree.waiters);

            if !has_leaves && !incomplete {
                self.mark_empty(&current);
            }

            for waiter in waiters {
                let Some(parent) = self.subtrees.get_mut(&waiter) else {
                    continue;
                };
                parent.has_leaves |= has_leaves;
                parent.incomplete |= incomplete;
                parent.pending = parent.pending.saturating_sub(1);

                if parent.pending == 0 && parent.listed && !parent.settled {
                    ready.push(waiter);
                }
            }
        }
    }

    fn mark_empty(&mut self, id: &str) {
        tracing::debug!("Collection {} has no datasets below it", id);
        self.empty.insert(id.to_string());
    }
}
