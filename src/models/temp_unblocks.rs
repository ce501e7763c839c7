use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Hostname -> absolute expiry instant (ms since epoch).
///
/// A missing entry and an expired one mean the same thing: not unblocked.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TempUnblocks(BTreeMap<String, i64>);

impl TempUnblocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn expiry(&self, hostname: &str) -> Option<i64> {
        self.0.get(hostname).copied()
    }

    /// Set (or overwrite) the expiry for `hostname`.
    pub fn set_expiry(&mut self, hostname: &str, expires_at: i64) {
        self.0.insert(hostname.to_string(), expires_at);
    }

    /// Active while `now` is strictly before the stored expiry.
    pub fn is_active(&self, hostname: &str, now: i64) -> bool {
        self.expiry(hostname).is_some_and(|expires_at| expires_at > now)
    }

    /// Copy of the map without entries whose expiry is `<= now`, and whether
    /// anything was removed. The caller persists the copy if it changed.
    pub fn purge_expired(&self, now: i64) -> (Self, bool) {
        let kept: BTreeMap<String, i64> = self
            .0
            .iter()
            .filter(|(_, expires_at)| **expires_at > now)
            .map(|(site, &expires_at)| (site.clone(), expires_at))
            .collect();
        let changed = kept.len() != self.0.len();
        (Self(kept), changed)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, i64)> {
        self.0.iter().map(|(site, &expires_at)| (site.as_str(), expires_at))
    }
}

impl FromIterator<(String, i64)> for TempUnblocks {
    fn from_iter<I: IntoIterator<Item = (String, i64)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}
