//! JSON views of a crawl result
//!
//! Each function turns the frozen result into one `Export`. Objects are
//! keyed by dataset or collection id and built from ordered maps, so two
//! crawls of an unchanged source serialize identically.

use crate::output::traits::Export;
use crate::state::{CrawlResult, LeafRecord, VersionState};
use serde_json::{json, Map, Value};

/// Which optional exports to produce
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExportSelection {
    /// Write `empty_dv`
    pub empty_collections: bool,

    /// Write `permission_dict`
    pub permissions: bool,
}

/// Builds every export requested for this run, in write order
pub fn collect_exports(result: &CrawlResult, selection: ExportSelection) -> Vec<Export> {
    let mut exports = vec![
        pid_dict(result),
        pid_dict_dd(result),
        failures(result),
        dataset_metadata(result),
    ];

    if selection.permissions {
        exports.push(permission_dict(result));
    }
    if selection.empty_collections {
        exports.push(empty_collections(result));
    }

    exports
}

fn path_entry(result: &CrawlResult, leaf: &LeafRecord) -> Map<String, Value> {
    let mut entry = Map::new();
    entry.insert("CollectionAlias".into(), json!(result.root));
    entry.insert("datasetId".into(), json!(leaf.id));
    entry.insert("datasetPersistentId".into(), json!(leaf.persistent_id));
    entry.insert("collectionId".into(), json!(leaf.collection));
    entry.insert("path".into(), json!(result.display_path(&leaf.id)));
    entry.insert("pathIds".into(), json!(result.ancestor_path(&leaf.id)));
    entry
}

/// Hierarchical position of every fetched dataset
pub fn pid_dict(result: &CrawlResult) -> Export {
    let value: Map<String, Value> = result
        .leaves
        .values()
        .map(|leaf| (leaf.id.clone(), Value::Object(path_entry(result, leaf))))
        .collect();

    Export {
        name: "pid_dict",
        description: "Hierarchical Information of Datasets",
        entries: value.len(),
        value: Value::Object(value),
        always: false,
    }
}

/// Draft and deaccessioned datasets, with their tag
pub fn pid_dict_dd(result: &CrawlResult) -> Export {
    let value: Map<String, Value> = result
        .leaves
        .values()
        .filter(|leaf| leaf.state.is_draft_or_deaccessioned())
        .map(|leaf| {
            let mut entry = path_entry(result, leaf);
            entry.insert("versionState".into(), json!(leaf.state));
            (leaf.id.clone(), Value::Object(entry))
        })
        .collect();

    Export {
        name: "pid_dict_dd",
        description: "Hierarchical Information of Datasets (deaccessioned/draft)",
        entries: value.len(),
        value: Value::Object(value),
        always: false,
    }
}

/// Every failed fetch; written even when there were none
pub fn failures(result: &CrawlResult) -> Export {
    Export {
        name: "failed",
        description: "Identifiers that failed to be crawled",
        entries: result.failures.len(),
        value: json!(result.failures),
        always: true,
    }
}

/// Full metadata of every dataset that matched the version policy
pub fn dataset_metadata(result: &CrawlResult) -> Export {
    let value: Map<String, Value> = result
        .leaves_in_state(VersionState::Normal)
        .map(|leaf| {
            let permission_info = match result.permissions.get(&leaf.id) {
                Some(data) => json!({"status": "OK", "data": data}),
                None => json!({"status": "NA", "data": []}),
            };
            let entry = json!({
                "datasetId": leaf.id,
                "datasetPersistentId": leaf.persistent_id,
                "version": leaf.version,
                "data": leaf.payload,
                "path_info": Value::Object(path_entry(result, leaf)),
                "permission_info": permission_info,
            });
            (leaf.id.clone(), entry)
        })
        .collect();

    Export {
        name: "ds_metadata",
        description: "Dataset Metadata (Representation, File & Permission)",
        entries: value.len(),
        value: Value::Object(value),
        always: false,
    }
}

/// Raw role assignments per dataset
pub fn permission_dict(result: &CrawlResult) -> Export {
    Export {
        name: "permission_dict",
        description: "Dataset Metadata (Permission)",
        entries: result.permissions.len(),
        value: json!(result.permissions),
        always: false,
    }
}

/// Collections with no dataset anywhere below them
pub fn empty_collections(result: &CrawlResult) -> Export {
    let value: Vec<Value> = result
        .empty_collections
        .iter()
        .map(|id| {
            let node = result.collections.get(id);
            json!({
                "collectionId": id,
                "name": node.map(|n| n.name.as_str()),
                "parentId": node.and_then(|n| n.parent.as_deref()),
            })
        })
        .collect();

    Export {
        name: "empty_dv",
        description: "Empty Collections",
        entries: value.len(),
        value: Value::Array(value),
        always: false,
    }
}
