//! Version policy parsing and dataset classification
//!
//! A dataset's versions are fetched in one request; `classify` then picks
//! the version the caller asked for and tags it. Keeping this a pure
//! function means the tree walk never needs to know about version rules.

use crate::crawler::fetcher::LeafVersion;
use crate::state::{ReleaseState, VersionState};
use crate::PolicyError;
use std::fmt;
use std::str::FromStr;

/// Which version of each dataset the caller wants
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionPolicy {
    /// The current draft
    Draft,

    /// The draft if there is one, otherwise the newest release
    Latest,

    /// The newest release, ignoring drafts
    LatestPublished,

    /// One specific `major.minor` release
    Exact { major: u64, minor: u64 },
}

impl FromStr for VersionPolicy {
    type Err = PolicyError;

    /// Parses `draft`, `latest`, `latest-published`, `x` or `x.y`
    ///
    /// Matching is case-insensitive and ignores surrounding whitespace. The
    /// Dataverse spellings with a leading colon (`:latest`) are accepted too.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase();
        let keyword = normalized.strip_prefix(':').unwrap_or(&normalized);

        match keyword {
            "draft" => return Ok(Self::Draft),
            "latest" => return Ok(Self::Latest),
            "latest-published" => return Ok(Self::LatestPublished),
            _ => {}
        }

        let unrecognized = || PolicyError::Unrecognized(s.trim().to_string());
        let mut parts = keyword.split('.');
        let major = parts
            .next()
            .and_then(|p| p.parse::<u64>().ok())
            .ok_or_else(unrecognized)?;
        let minor = match parts.next() {
            Some(p) => p.parse::<u64>().map_err(|_| unrecognized())?,
            None => 0,
        };
        if parts.next().is_some() {
            return Err(unrecognized());
        }

        Ok(Self::Exact { major, minor })
    }
}

impl fmt::Display for VersionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Draft => f.write_str("draft"),
            Self::Latest => f.write_str("latest"),
            Self::LatestPublished => f.write_str("latest-published"),
            Self::Exact { major, minor } => write!(f, "{}.{}", major, minor),
        }
    }
}

/// The version chosen for a dataset, as an index into its version list
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Selection {
    pub index: usize,
    pub state: VersionState,
}

impl Selection {
    fn normal(index: usize) -> Self {
        Self {
            index,
            state: VersionState::Normal,
        }
    }
}

/// Selects the version of a dataset matching `policy`
///
/// When nothing matches, a dataset that "exists only in a draft state" is
/// kept anyway. That means a dataset with no `Released` version at all: its
/// draft is kept (tagged `Draft`), or failing that its newest deaccessioned
/// version (tagged `Deaccessioned`).
///
/// A dataset with any released version never falls back, even when it also
/// has a draft. Released 1.0 plus a draft, requested at 2.0, yields None and
/// is reported as not found.
pub fn classify(versions: &[LeafVersion], policy: &VersionPolicy) -> Option<Selection> {
    let draft = find_draft(versions);
    let latest_released = newest_in_state(versions, ReleaseState::Released);

    let matched = match *policy {
        VersionPolicy::Draft => draft.map(Selection::normal),
        VersionPolicy::Latest => draft.or(latest_released).map(Selection::normal),
        VersionPolicy::LatestPublished => latest_released.map(Selection::normal),
        VersionPolicy::Exact { major, minor } => versions
            .iter()
            .position(|v| v.number == Some((major, minor)))
            .and_then(|index| match versions[index].release {
                Some(ReleaseState::Released) => Some(Selection::normal(index)),
                Some(ReleaseState::Deaccessioned) => Some(Selection {
                    index,
                    state: VersionState::Deaccessioned,
                }),
                _ => None,
            }),
    };

    if matched.is_some() || latest_released.is_some() {
        return matched;
    }

    if let Some(index) = draft {
        return Some(Selection {
            index,
            state: VersionState::Draft,
        });
    }

    newest_in_state(versions, ReleaseState::Deaccessioned).map(|index| Selection {
        index,
        state: VersionState::Deaccessioned,
    })
}

fn find_draft(versions: &[LeafVersion]) -> Option<usize> {
    versions
        .iter()
        .position(|v| v.release == Some(ReleaseState::Draft))
}

fn newest_in_state(versions: &[LeafVersion], state: ReleaseState) -> Option<usize> {
    versions
        .iter()
        .enumerate()
        .filter(|(_, v)| v.release == Some(state))
        .max_by_key(|(_, v)| v.number)
        .map(|(index, _)| index)
}
