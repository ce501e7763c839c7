use crate::constants::{DEFAULT_BLOCKED_SITES, KEY_ALLOWED_SITES, KEY_BLOCKED_SITES};
use crate::error::AppResult;
use crate::hostname::normalize;
use crate::store::{self, KeyValueStore};
use crate::validation::validate_site;
use log::info;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SiteLists {
    pub blocked_sites: Vec<String>,
    pub allowed_sites: Vec<String>,
}

pub fn default_blocked_sites() -> Vec<String> {
    DEFAULT_BLOCKED_SITES.iter().map(|s| (*s).to_string()).collect()
}

/// Turn what a user typed ("https://www.Reddit.com/r/all") into a hostname
/// ("reddit.com").
pub fn sanitize_site_input(raw: &str) -> AppResult<String> {
    let trimmed = raw.trim();
    let without_scheme = trimmed
        .strip_prefix("https://")
        .or_else(|| trimmed.strip_prefix("http://"))
        .unwrap_or(trimmed);
    let host = without_scheme.split('/').next().unwrap_or_default();
    let host = normalize(&host.to_lowercase()).to_string();
    validate_site(&host)?;
    Ok(host)
}

/// Block and allow list editing.
pub struct SiteListManager {
    store: Arc<dyn KeyValueStore>,
}

impl SiteListManager {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    fn read(&self) -> AppResult<SiteLists> {
        Ok(SiteLists {
            blocked_sites: store::get_or(
                self.store.as_ref(),
                KEY_BLOCKED_SITES,
                default_blocked_sites(),
            )?,
            allowed_sites: store::get_or(self.store.as_ref(), KEY_ALLOWED_SITES, Vec::new())?,
        })
    }

    /// Current lists. An emptied block list is restored to the defaults.
    pub fn load(&self) -> AppResult<SiteLists> {
        let mut lists = self.read()?;
        if lists.blocked_sites.is_empty() {
            info!("Block list is empty, restoring defaults");
            lists.blocked_sites = default_blocked_sites();
            store::set(self.store.as_ref(), KEY_BLOCKED_SITES, &lists.blocked_sites)?;
        }
        Ok(lists)
    }

    pub fn add_blocked(&self, raw: &str) -> AppResult<SiteLists> {
        let site = sanitize_site_input(raw)?;
        let mut lists = self.read()?;

        if !lists.blocked_sites.contains(&site) {
            lists.blocked_sites.push(site);
            store::set(self.store.as_ref(), KEY_BLOCKED_SITES, &lists.blocked_sites)?;
        }
        Ok(lists)
    }

    /// Allow a site. Any identical block list entry is removed at the same
    /// time; later additions to the block list are not re-checked.
    pub fn add_allowed(&self, raw: &str) -> AppResult<SiteLists> {
        let site = sanitize_site_input(raw)?;
        let mut lists = self.read()?;

        if !lists.allowed_sites.contains(&site) {
            lists.allowed_sites.push(site.clone());
        }
        lists.blocked_sites.retain(|s| *s != site);

        self.store.set_many(vec![
            (
                KEY_ALLOWED_SITES.to_string(),
                serde_json::to_value(&lists.allowed_sites)?,
            ),
            (
                KEY_BLOCKED_SITES.to_string(),
                serde_json::to_value(&lists.blocked_sites)?,
            ),
        ])?;
        Ok(lists)
    }

    pub fn remove_blocked(&self, site: &str) -> AppResult<SiteLists> {
        let mut lists = self.read()?;
        lists.blocked_sites.retain(|s| s != site);
        store::set(self.store.as_ref(), KEY_BLOCKED_SITES, &lists.blocked_sites)?;
        Ok(lists)
    }

    pub fn remove_allowed(&self, site: &str) -> AppResult<SiteLists> {
        let mut lists = self.read()?;
        lists.allowed_sites.retain(|s| s != site);
        store::set(self.store.as_ref(), KEY_ALLOWED_SITES, &lists.allowed_sites)?;
        Ok(lists)
    }
}
