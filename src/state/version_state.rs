//! Version and accession state definitions for datasets
//!
//! `VersionState` is the tag the classification stage assigns to every
//! dataset that was fetched successfully; `ReleaseState` is the raw
//! `versionState` field reported by the repository for a single version.
use serde::Serialize;
use std::fmt;

/// Classification of a fetched dataset relative to the requested version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum VersionState {
    /// The fetched version is the one the caller asked for
    Normal,

    /// Only a draft exists; the draft was kept instead
    Draft,

    /// The dataset (or the requested version) has been deaccessioned
    Deaccessioned,
}

impl VersionState {
    /// Returns true if the dataset matched the requested version policy
    pub fn is_normal(&self) -> bool {
        matches!(self, Self::Normal)
    }

    /// Returns true if the dataset belongs to the draft/deaccessioned accounting
    pub fn is_draft_or_deaccessioned(&self) -> bool {
        matches!(self, Self::Draft | Self::Deaccessioned)
    }

    /// Returns the lowercase label used in exports and logs
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::Draft => "draft",
            Self::Deaccessioned => "deaccessioned",
        }
    }

    /// Returns all possible version states
    pub fn all_states() -> [Self; 3] {
        [Self::Normal, Self::Draft, Self::Deaccessioned]
    }
}

impl fmt::Display for VersionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The `versionState` of a single dataset version as reported by the API
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReleaseState {
    Draft,
    Released,
    Deaccessioned,
    Archived,
}

impl ReleaseState {
    /// Parses the API representation (`DRAFT`, `RELEASED`, ...)
    ///
    /// Returns None if the string doesn't match any known state.
    pub fn from_api_string(s: &str) -> Option<Self> {
        match s {
            "DRAFT" => Some(Self::Draft),
            "RELEASED" => Some(Self::Released),
            "DEACCESSIONED" => Some(Self::Deaccessioned),
            "ARCHIVED" => Some(Self::Archived),
            _ => None,
        }
    }

    pub fn to_api_string(&self) -> &'static str {
        match self {
            Self::Draft => "DRAFT",
            Self::Released => "RELEASED",
            Self::Deaccessioned => "DEACCESSIONED",
            Self::Archived => "ARCHIVED",
        }
    }
}
