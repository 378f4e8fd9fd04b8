//! Cache kinds known to the registry.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifies which repository cache a registry entry holds.
///
/// The set is closed: adding a cache means adding a variant here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheKind {
    Branches,
    GitLog,
    GitAheadBehind,
    GitStatus,
    GitLocks,
    GitUser,
    RepositoryInfo,
}

impl CacheKind {
    /// Every kind, in declaration order.
    pub const ALL: [CacheKind; 7] = [
        CacheKind::Branches,
        CacheKind::GitLog,
        CacheKind::GitAheadBehind,
        CacheKind::GitStatus,
        CacheKind::GitLocks,
        CacheKind::GitUser,
        CacheKind::RepositoryInfo,
    ];

    /// Stable snake_case name, matching the serde representation.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Branches => "branches",
            Self::GitLog => "git_log",
            Self::GitAheadBehind => "git_ahead_behind",
            Self::GitStatus => "git_status",
            Self::GitLocks => "git_locks",
            Self::GitUser => "git_user",
            Self::RepositoryInfo => "repository_info",
        }
    }
}

impl fmt::Display for CacheKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_matches_serde_name() {
        for kind in CacheKind::ALL {
            let json = serde_json::to_string(&kind).unwrap();
            assert_eq!(json, format!("\"{}\"", kind));
        }
    }

    #[test]
    fn test_all_is_distinct() {
        let mut kinds = CacheKind::ALL.to_vec();
        kinds.sort();
        kinds.dedup();
        assert_eq!(kinds.len(), CacheKind::ALL.len());
    }

    #[test]
    fn test_deserialize() {
        let kind: CacheKind = serde_json::from_str("\"git_ahead_behind\"").unwrap();
        assert_eq!(kind, CacheKind::GitAheadBehind);
    }
}
