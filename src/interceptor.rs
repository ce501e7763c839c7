use crate::cache::SiteCache;
use crate::clock::Clock;
use crate::error::AppResult;
use crate::history::HistoryTracker;
use crate::hostname::{self, is_blocked};
use crate::unblock::TempUnblockStore;
use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard};
use url::Url;

/// Resource type of top-level document loads.
pub const MAIN_FRAME: &str = "main_frame";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NavigationRequest {
    pub url: String,
    #[serde(default = "default_resource_type")]
    pub resource_type: String,
}

fn default_resource_type() -> String {
    MAIN_FRAME.to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Decision {
    Allow,
    Redirect {
        #[serde(rename = "redirectUrl")]
        redirect_url: String,
    },
}

/// Redirect-or-allow decision for each navigation.
pub struct RequestInterceptor {
    cache: Arc<Mutex<SiteCache>>,
    unblocks: TempUnblockStore,
    history: HistoryTracker,
    clock: Arc<dyn Clock>,
    block_page: Url,
}

impl RequestInterceptor {
    pub fn new(
        cache: Arc<Mutex<SiteCache>>,
        unblocks: TempUnblockStore,
        history: HistoryTracker,
        clock: Arc<dyn Clock>,
        block_page_url: &str,
    ) -> AppResult<Self> {
        Ok(Self {
            cache,
            unblocks,
            history,
            clock,
            block_page: Url::parse(block_page_url)?,
        })
    }

    fn lock_cache(&self) -> MutexGuard<'_, SiteCache> {
        match self.cache.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                warn!("RequestInterceptor: cache mutex was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    /// Block page URL carrying `hostname` as the `site` parameter.
    pub fn block_page_for(&self, hostname: &str) -> String {
        let mut target = self.block_page.clone();
        target.query_pairs_mut().append_pair("site", hostname);
        target.into()
    }

    pub fn on_before_request(&self, request: &NavigationRequest) -> AppResult<Decision> {
        if request.resource_type != MAIN_FRAME {
            return Ok(Decision::Allow);
        }

        let host = match hostname::from_url(&request.url) {
            Ok(Some(host)) => host,
            Ok(None) => return Ok(Decision::Allow),
            Err(e) => {
                debug!("Not intercepting unparseable URL {}: {e}", request.url);
                return Ok(Decision::Allow);
            }
        };

        if is_blocked(&host, &self.lock_cache().allowed_sites) {
            return Ok(Decision::Allow);
        }

        // Read storage, not the cache: a bypass granted elsewhere (e.g. on the
        // block page) must take effect on the very next navigation.
        let latest = self.unblocks.load()?;
        if latest.is_active(&host, self.clock.now_ms()) {
            self.lock_cache().temp_unblocks = latest;
            return Ok(Decision::Allow);
        }

        if !is_blocked(&host, &self.lock_cache().blocked_sites) {
            return Ok(Decision::Allow);
        }

        if let Err(e) = self.history.record_block(&host) {
            error!("Failed to record block for {host}: {e}");
        }
        info!("Blocked navigation to {host}");
        Ok(Decision::Redirect {
            redirect_url: self.block_page_for(&host),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::{DEFAULT_BLOCK_PAGE_URL, KEY_BLOCK_HISTORY, KEY_TEMP_UNBLOCKS};
    use crate::models::{BlockRecord, TempUnblocks};
    use crate::store::{self, KeyValueStore, MemoryStore};
    use crate::test_utils::{ManualClock, TEST_NOW};

    struct Fixture {
        interceptor: RequestInterceptor,
        store: Arc<MemoryStore>,
        cache: Arc<Mutex<SiteCache>>,
        clock: ManualClock,
    }

    fn fixture(blocked: &[&str], allowed: &[&str]) -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let clock = ManualClock::new(TEST_NOW);
        let dyn_store: Arc<dyn KeyValueStore> = Arc::clone(&store) as Arc<dyn KeyValueStore>;
        let dyn_clock: Arc<dyn Clock> = Arc::new(clock.clone());
        let cache = Arc::new(Mutex::new(SiteCache {
            blocked_sites: blocked.iter().map(|s| (*s).to_string()).collect(),
            allowed_sites: allowed.iter().map(|s| (*s).to_string()).collect(),
            temp_unblocks: TempUnblocks::new(),
        }));
        let interceptor = RequestInterceptor::new(
            Arc::clone(&cache),
            TempUnblockStore::new(Arc::clone(&dyn_store), Arc::clone(&dyn_clock)),
            HistoryTracker::new(Arc::clone(&dyn_store), Arc::clone(&dyn_clock)),
            dyn_clock,
            DEFAULT_BLOCK_PAGE_URL,
        )
        .unwrap();
        Fixture {
            interceptor,
            store,
            cache,
            clock,
        }
    }

    fn navigate(url: &str) -> NavigationRequest {
        NavigationRequest {
            url: url.to_string(),
            resource_type: MAIN_FRAME.to_string(),
        }
    }

    fn block_log(store: &MemoryStore) -> Vec<BlockRecord> {
        store::get_or(store, KEY_BLOCK_HISTORY, Vec::new()).unwrap()
    }

    #[test]
    fn test_blocked_site_redirects_with_site_param() {
        let f = fixture(&["reddit.com"], &[]);

        let decision = f
            .interceptor
            .on_before_request(&navigate("https://www.reddit.com/r/news"))
            .unwrap();

        assert_eq!(
            decision,
            Decision::Redirect {
                redirect_url: format!("{DEFAULT_BLOCK_PAGE_URL}?site=reddit.com"),
            }
        );
    }

    #[test]
    fn test_block_is_recorded() {
        let f = fixture(&["reddit.com"], &[]);
        f.interceptor
            .on_before_request(&navigate("https://old.reddit.com/"))
            .unwrap();

        assert_eq!(
            block_log(&f.store),
            vec![BlockRecord {
                site: "old.reddit.com".into(),
                timestamp: TEST_NOW,
            }]
        );
    }

    #[test]
    fn test_unlisted_site_allowed_without_record() {
        let f = fixture(&["reddit.com"], &[]);
        let decision = f
            .interceptor
            .on_before_request(&navigate("https://notreddit.com/"))
            .unwrap();
        assert_eq!(decision, Decision::Allow);
        assert!(block_log(&f.store).is_empty());
    }

    #[test]
    fn test_subresources_are_ignored() {
        let f = fixture(&["reddit.com"], &[]);
        let request = NavigationRequest {
            url: "https://reddit.com/logo.png".into(),
            resource_type: "image".into(),
        };
        assert_eq!(f.interceptor.on_before_request(&request).unwrap(), Decision::Allow);
    }

    #[test]
    fn test_allowed_list_takes_precedence() {
        let f = fixture(&["reddit.com"], &["reddit.com"]);
        let decision = f
            .interceptor
            .on_before_request(&navigate("https://reddit.com/"))
            .unwrap();
        assert_eq!(decision, Decision::Allow);
        assert!(block_log(&f.store).is_empty());
    }

    #[test]
    fn test_allowed_subdomain_of_blocked_parent() {
        let f = fixture(&["bbc.co.uk"], &["news.bbc.co.uk"]);
        assert_eq!(
            f.interceptor
                .on_before_request(&navigate("https://news.bbc.co.uk/"))
                .unwrap(),
            Decision::Allow
        );
        assert!(matches!(
            f.interceptor
                .on_before_request(&navigate("https://sport.bbc.co.uk/"))
                .unwrap(),
            Decision::Redirect { .. }
        ));
    }

    #[test]
    fn test_bypass_read_from_storage_not_cache() {
        let f = fixture(&["reddit.com"], &[]);

        // Written straight to storage; the cache never hears about it
        let mut unblocks = TempUnblocks::new();
        unblocks.set_expiry("reddit.com", TEST_NOW + 60_000);
        store::set(f.store.as_ref(), KEY_TEMP_UNBLOCKS, &unblocks).unwrap();

        let decision = f
            .interceptor
            .on_before_request(&navigate("https://reddit.com/"))
            .unwrap();

        assert_eq!(decision, Decision::Allow);
        assert_eq!(f.cache.lock().unwrap().temp_unblocks, unblocks);
    }

    #[test]
    fn test_expired_bypass_blocks_again() {
        let f = fixture(&["reddit.com"], &[]);
        let mut unblocks = TempUnblocks::new();
        unblocks.set_expiry("reddit.com", TEST_NOW + 60_000);
        store::set(f.store.as_ref(), KEY_TEMP_UNBLOCKS, &unblocks).unwrap();

        f.clock.advance_ms(60_000);

        assert!(matches!(
            f.interceptor
                .on_before_request(&navigate("https://reddit.com/"))
                .unwrap(),
            Decision::Redirect { .. }
        ));
    }

    #[test]
    fn test_bypass_is_per_hostname() {
        let f = fixture(&["reddit.com"], &[]);
        let mut unblocks = TempUnblocks::new();
        unblocks.set_expiry("reddit.com", TEST_NOW + 60_000);
        store::set(f.store.as_ref(), KEY_TEMP_UNBLOCKS, &unblocks).unwrap();

        assert!(matches!(
            f.interceptor
                .on_before_request(&navigate("https://old.reddit.com/"))
                .unwrap(),
            Decision::Redirect { .. }
        ));
    }

    #[test]
    fn test_unparseable_and_hostless_urls_allowed() {
        let f = fixture(&["reddit.com"], &[]);
        assert_eq!(
            f.interceptor.on_before_request(&navigate("not a url")).unwrap(),
            Decision::Allow
        );
        assert_eq!(
            f.interceptor.on_before_request(&navigate("about:blank")).unwrap(),
            Decision::Allow
        );
    }

    #[test]
    fn test_decision_json_shape() {
        let redirect = Decision::Redirect {
            redirect_url: "x".into(),
        };
        assert_eq!(
            serde_json::to_value(&redirect).unwrap(),
            serde_json::json!({"action": "redirect", "redirectUrl": "x"})
        );
        assert_eq!(
            serde_json::to_value(&Decision::Allow).unwrap(),
            serde_json::json!({"action": "allow"})
        );
    }
}
