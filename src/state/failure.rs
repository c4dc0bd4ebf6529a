//! Failure taxonomy for metadata fetches
//!
//! Every fetch that does not produce a usable result is recorded as a
//! `FailureRecord`. Failures never abort a crawl; they are exported so an
//! operator can re-run against just the failed identifiers.

use serde::Serialize;
use std::fmt;

/// The kind of request that was attempted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum FetchOperation {
    /// Listing the contents of a collection
    ListChildren,

    /// Fetching the versions and files of a dataset
    FetchLeaf,

    /// Fetching the role assignments of a dataset
    FetchPermission,
}

impl FetchOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ListChildren => "list-children",
            Self::FetchLeaf => "fetch-leaf",
            Self::FetchPermission => "fetch-permission",
        }
    }

    pub fn all() -> [Self; 3] {
        [Self::ListChildren, Self::FetchLeaf, Self::FetchPermission]
    }
}

impl fmt::Display for FetchOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classification of a failed fetch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailureKind {
    /// Connection refused, timeout, 5xx, 429 (after transport retries)
    TransientNetwork,

    /// The identifier no longer exists, or no version matched the policy
    NotFound,

    /// Authorization insufficient; never retried
    Forbidden,

    /// The response violated the API contract
    MalformedResponse,
}

impl FailureKind {
    /// Returns true if re-running the crawl might succeed without any change
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::TransientNetwork)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TransientNetwork => "transient-network",
            Self::NotFound => "not-found",
            Self::Forbidden => "forbidden",
            Self::MalformedResponse => "malformed-response",
        }
    }

    pub fn all() -> [Self; 4] {
        [
            Self::TransientNetwork,
            Self::NotFound,
            Self::Forbidden,
            Self::MalformedResponse,
        ]
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A fetch that did not produce a usable result
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailureRecord {
    /// The identifier the request was made for
    pub id: String,

    /// The operation that was attempted
    pub operation: FetchOperation,

    /// Why it failed
    pub kind: FailureKind,

    /// Status code, transport error, or an excerpt of the offending payload
    pub message: String,
}

impl FailureRecord {
    pub fn new(
        id: impl Into<String>,
        operation: FetchOperation,
        kind: FailureKind,
        message: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            operation,
            kind,
            message: message.into(),
        }
    }
}
