//! Sync topics and the storage-key table.
//!
//! DESIGN
//! ======
//! Topics form a closed set; each one maps to known storage keys through an
//! explicit table rather than substring inference, so an ambiguous key like
//! `employee-creator-list` cannot silently land on the wrong topic. Lookup
//! of an unknown key falls back to [`DEFAULT_TOPIC`]; *binding* an unknown
//! key is rejected outright at bind time.

use serde::{Deserialize, Serialize};

/// Storage slot holding the most recent sync event envelope. Writing it is
/// what fires the storage signal in sibling contexts.
pub const LAST_SYNC_KEY: &str = "stacked-last-sync";

/// Topic assumed for storage keys outside the table.
pub const DEFAULT_TOPIC: SyncTopic = SyncTopic::Settings;

/// One synchronized record collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncTopic {
    Creators,
    Content,
    Categories,
    Settings,
    Employees,
    Strategies,
}

/// Every storage key the sync layer knows about. First entry per topic is
/// its canonical key.
pub const KEY_TABLE: &[(&str, SyncTopic)] = &[
    ("stacked-creators", SyncTopic::Creators),
    // Legacy key written before the creator list/detail split.
    ("stacked-creators-list", SyncTopic::Creators),
    ("stacked-content", SyncTopic::Content),
    ("stacked-categories", SyncTopic::Categories),
    ("stacked-settings", SyncTopic::Settings),
    ("stacked-employees", SyncTopic::Employees),
    ("stacked-strategies", SyncTopic::Strategies),
];

impl SyncTopic {
    /// Wire/log name, matching the serde representation.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Creators => "creators",
            Self::Content => "content",
            Self::Categories => "categories",
            Self::Settings => "settings",
            Self::Employees => "employees",
            Self::Strategies => "strategies",
        }
    }

    /// Canonical storage key for this topic.
    #[must_use]
    pub fn storage_key(self) -> &'static str {
        KEY_TABLE
            .iter()
            .find(|(_, topic)| *topic == self)
            .copied()
            // Unreachable while the table stays exhaustive; keep lookup total.
            .map_or(LAST_SYNC_KEY, |(key, _)| key)
    }
}

/// Exact table lookup, returning the table's own key so callers can index
/// fingerprint caches by `&'static str`.
#[must_use]
pub fn lookup(key: &str) -> Option<(&'static str, SyncTopic)> {
    KEY_TABLE.iter().find(|(k, _)| *k == key).copied()
}

/// Topic for an arbitrary storage key, falling back to [`DEFAULT_TOPIC`].
#[must_use]
pub fn topic_for_key(key: &str) -> SyncTopic {
    lookup(key).map_or(DEFAULT_TOPIC, |(_, topic)| topic)
}

#[cfg(test)]
#[path = "topic_test.rs"]
mod tests;
