//! Wire format of the Dataverse native API
//!
//! Every response is wrapped in `{"status": "OK", "data": ...}`. Anything
//! that does not fit the expected shape becomes a malformed-response error
//! carrying a short excerpt of the payload.

use crate::crawler::fetcher::{FetchError, LeafVersion};
use crate::state::{ChildListing, CollectionEntry, FileDescriptor, LeafEntry, ReleaseState};
use serde::{Deserialize, Deserializer};
use serde_json::Value;

const EXCERPT_LEN: usize = 200;

#[derive(Debug, Deserialize)]
struct Envelope {
    status: String,

    #[serde(default)]
    data: Option<Value>,

    #[serde(default)]
    message: Option<Value>,
}

/// One entry of `/api/dataverses/{id}/contents`
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum ContentItem {
    Dataverse {
        #[serde(deserialize_with = "id_string")]
        id: String,

        #[serde(default)]
        title: Option<String>,
    },
    Dataset {
        #[serde(deserialize_with = "id_string")]
        id: String,
        protocol: String,
        authority: String,
        identifier: String,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VersionHeader {
    #[serde(default)]
    version_number: Option<u64>,

    #[serde(default)]
    version_minor_number: Option<u64>,

    #[serde(default)]
    version_state: Option<String>,

    #[serde(default)]
    files: Vec<FileMetadata>,
}

#[derive(Debug, Deserialize)]
struct FileMetadata {
    #[serde(default)]
    label: Option<String>,

    #[serde(rename = "dataFile")]
    data_file: DataFile,
}

#[derive(Debug, Deserialize)]
struct DataFile {
    #[serde(deserialize_with = "id_string")]
    id: String,

    #[serde(default)]
    filename: Option<String>,

    #[serde(default)]
    filesize: u64,

    #[serde(default)]
    checksum: Option<Checksum>,
}

#[derive(Debug, Deserialize)]
struct Checksum {
    #[serde(rename = "type")]
    algorithm: String,
    value: String,
}

/// Dataverse reports database ids as numbers and aliases as strings
fn id_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Id {
        Number(u64),
        Text(String),
    }

    Ok(match Id::deserialize(deserializer)? {
        Id::Number(n) => n.to_string(),
        Id::Text(s) => s,
    })
}

/// Returns at most the first `EXCERPT_LEN` characters of a payload
pub fn excerpt(body: &[u8]) -> String {
    let text = String::from_utf8_lossy(body);
    let mut chars = text.chars();
    let head: String = chars.by_ref().take(EXCERPT_LEN).collect();
    if chars.next().is_some() {
        format!("{}...", head)
    } else {
        head
    }
}

/// Checks the envelope and returns its `data` member
pub fn unwrap_envelope(body: &[u8]) -> Result<Value, FetchError> {
    let envelope: Envelope = serde_json::from_slice(body).map_err(|e| {
        FetchError::malformed(format!("undecodable response ({}): {}", e, excerpt(body)))
    })?;

    if envelope.status != "OK" {
        let detail = match envelope.message {
            Some(Value::String(message)) => message,
            Some(other) => other.to_string(),
            None => excerpt(body),
        };
        return Err(FetchError::malformed(format!(
            "status {:?}: {}",
            envelope.status, detail
        )));
    }

    envelope
        .data
        .ok_or_else(|| FetchError::malformed(format!("missing data field: {}", excerpt(body))))
}

/// Decodes the `data` member of a contents listing
///
/// Items of unknown type (files, harvested links) are skipped.
pub fn parse_listing(data: Value) -> Result<ChildListing, FetchError> {
    let items: Vec<ContentItem> = serde_json::from_value(data)
        .map_err(|e| FetchError::malformed(format!("unexpected contents listing: {}", e)))?;

    let mut listing = ChildListing::default();
    for item in items {
        match item {
            ContentItem::Dataverse { id, title } => listing.collections.push(CollectionEntry {
                name: title.unwrap_or_else(|| id.clone()),
                id,
            }),
            ContentItem::Dataset {
                id,
                protocol,
                authority,
                identifier,
            } => listing.leaves.push(LeafEntry {
                id,
                persistent_id: format!("{}:{}/{}", protocol, authority, identifier),
            }),
            ContentItem::Other => {}
        }
    }

    Ok(listing)
}

/// Decodes the `data` member of a version listing
///
/// Each version's JSON object is kept unchanged as its payload.
pub fn parse_versions(data: Value) -> Result<Vec<LeafVersion>, FetchError> {
    let entries = match data {
        Value::Array(entries) => entries,
        other => {
            return Err(FetchError::malformed(format!(
                "expected a list of versions, got {}",
                excerpt(other.to_string().as_bytes())
            )))
        }
    };

    entries
        .into_iter()
        .map(|payload| {
            let header = VersionHeader::deserialize(&payload)
                .map_err(|e| FetchError::malformed(format!("unexpected version entry: {}", e)))?;

            let release = header.version_state.as_deref().and_then(|state| {
                let parsed = ReleaseState::from_api_string(state);
                if parsed.is_none() {
                    tracing::debug!("Unknown versionState {:?}", state);
                }
                parsed
            });

            Ok(LeafVersion {
                number: header.version_number.zip(header.version_minor_number),
                release,
                files: header.files.into_iter().map(file_descriptor).collect(),
                payload,
            })
        })
        .collect()
}

fn file_descriptor(meta: FileMetadata) -> FileDescriptor {
    let file = meta.data_file;
    FileDescriptor {
        name: file
            .filename
            .or(meta.label)
            .unwrap_or_else(|| file.id.clone()),
        id: file.id,
        size: file.filesize,
        checksum: file
            .checksum
            .map(|c| format!("{}:{}", c.algorithm, c.value)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::FailureKind;
    use serde_json::json;

    #[test]
    fn test_unwrap_envelope_ok() {
        let body = br#"{"status":"OK","data":[1,2]}"#;
        assert_eq!(unwrap_envelope(body).unwrap(), json!([1, 2]));
    }

    #[test]
    fn test_unwrap_envelope_error_status() {
        let body = br#"{"status":"ERROR","message":"Dataverse foo not found"}"#;
        let err = unwrap_envelope(body).unwrap_err();
        assert_eq!(err.kind, FailureKind::MalformedResponse);
        assert!(err.message.contains("Dataverse foo not found"));
    }

    #[test]
    fn test_unwrap_envelope_missing_data() {
        let err = unwrap_envelope(br#"{"status":"OK"}"#).unwrap_err();
        assert_eq!(err.kind, FailureKind::MalformedResponse);
    }

    #[test]
    fn test_unwrap_envelope_not_json() {
        let err = unwrap_envelope(b"<html>gateway</html>").unwrap_err();
        assert_eq!(err.kind, FailureKind::MalformedResponse);
        assert!(err.message.contains("<html>gateway</html>"));
    }

    #[test]
    fn test_excerpt_truncates() {
        let long = "x".repeat(500);
        let short = excerpt(long.as_bytes());
        assert_eq!(short.len(), EXCERPT_LEN + 3);
        assert!(short.ends_with("..."));
        assert_eq!(excerpt(b"short"), "short");
    }

    #[test]
    fn test_parse_listing_mixed_items() {
        let data = json!([
            {"type": "dataverse", "id": 11, "title": "Physics"},
            {"type": "dataset", "id": 42, "protocol": "doi", "authority": "10.5072",
             "identifier": "FK2/ABC", "persistentUrl": "https://doi.org/10.5072/FK2/ABC"},
            {"type": "file", "id": 7},
            {"type": "dataverse", "id": "optics"}
        ]);

        let listing = parse_listing(data).unwrap();
        assert_eq!(
            listing.collections,
            vec![
                CollectionEntry {
                    id: "11".into(),
                    name: "Physics".into()
                },
                CollectionEntry {
                    id: "optics".into(),
                    name: "optics".into()
                },
            ]
        );
        assert_eq!(
            listing.leaves,
            vec![LeafEntry {
                id: "42".into(),
                persistent_id: "doi:10.5072/FK2/ABC".into()
            }]
        );
    }

    #[test]
    fn test_parse_listing_rejects_incomplete_dataset() {
        let data = json!([{"type": "dataset", "id": 42}]);
        let err = parse_listing(data).unwrap_err();
        assert_eq!(err.kind, FailureKind::MalformedResponse);
    }

    #[test]
    fn test_parse_versions() {
        let data = json!([
            {"versionState": "DRAFT", "files": []},
            {"versionNumber": 1, "versionMinorNumber": 0, "versionState": "RELEASED",
             "files": [{"label": "data.csv", "dataFile": {
                 "id": 5, "filename": "data.csv", "filesize": 2048,
                 "checksum": {"type": "MD5", "value": "abc"}}}]}
        ]);

        let versions = parse_versions(data).unwrap();
        assert_eq!(versions.len(), 2);
        assert_eq!(versions[0].number, None);
        assert_eq!(versions[0].release, Some(ReleaseState::Draft));
        assert_eq!(versions[1].number, Some((1, 0)));
        assert_eq!(versions[1].files[0].size, 2048);
        assert_eq!(versions[1].files[0].checksum.as_deref(), Some("MD5:abc"));
        assert_eq!(versions[1].payload["versionState"], "RELEASED");
    }

    #[test]
    fn test_parse_versions_requires_array() {
        let err = parse_versions(json!({"versionState": "DRAFT"})).unwrap_err();
        assert_eq!(err.kind, FailureKind::MalformedResponse);
    }
}
