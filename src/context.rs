use crate::cache::SiteCache;
use crate::clock::Clock;
use crate::config::BlockerConfig;
use crate::error::AppResult;
use crate::history::HistoryTracker;
use crate::interceptor::RequestInterceptor;
use crate::monitor::PageMonitor;
use crate::reflection::ReflectionGate;
use crate::sites::SiteListManager;
use crate::store::{KeyValueStore, StorageChange};
use crate::sweeper::CleanupSweeper;
use crate::unblock::TempUnblockStore;
use log::{info, warn};
use std::sync::{Arc, Mutex};

/// Process-wide state: the store, the request-path cache, and the
/// components built on them.
pub struct BlockerContext {
    pub config: BlockerConfig,
    pub store: Arc<dyn KeyValueStore>,
    pub clock: Arc<dyn Clock>,
    pub cache: Arc<Mutex<SiteCache>>,
    pub unblocks: Arc<TempUnblockStore>,
    pub history: HistoryTracker,
    pub reflection: ReflectionGate,
    pub sites: SiteListManager,
    pub interceptor: RequestInterceptor,
    pub sweeper: CleanupSweeper,
}

impl BlockerContext {
    /// Load the cache, subscribe it to storage changes, and purge bypasses
    /// that expired while nothing was running. Nothing is subscribed if
    /// construction fails.
    pub fn init(
        store: Arc<dyn KeyValueStore>,
        clock: Arc<dyn Clock>,
        config: BlockerConfig,
    ) -> AppResult<Self> {
        let cache = Arc::new(Mutex::new(SiteCache::load(store.as_ref())?));

        let unblocks = Arc::new(TempUnblockStore::new(Arc::clone(&store), Arc::clone(&clock)));
        let interceptor = RequestInterceptor::new(
            Arc::clone(&cache),
            TempUnblockStore::new(Arc::clone(&store), Arc::clone(&clock)),
            HistoryTracker::new(Arc::clone(&store), Arc::clone(&clock)),
            Arc::clone(&clock),
            &config.block_page_url,
        )?;

        let listener_cache = Arc::clone(&cache);
        store.subscribe(Arc::new(move |changes: &[StorageChange]| {
            match listener_cache.lock() {
                Ok(mut cache) => cache.apply_changes(changes),
                Err(poisoned) => {
                    warn!("Cache mutex was poisoned, recovering");
                    poisoned.into_inner().apply_changes(changes);
                }
            }
        }));

        let sweeper = CleanupSweeper::new(Arc::clone(&unblocks), config.cleanup_interval_secs);
        sweeper.sweep_once();

        info!(
            "Blocker ready: {} blocked, {} allowed",
            cache.lock().map(|c| c.blocked_sites.len()).unwrap_or(0),
            cache.lock().map(|c| c.allowed_sites.len()).unwrap_or(0),
        );

        Ok(Self {
            history: HistoryTracker::new(Arc::clone(&store), Arc::clone(&clock)),
            reflection: ReflectionGate::new(Arc::clone(&store), Arc::clone(&clock)),
            sites: SiteListManager::new(Arc::clone(&store)),
            interceptor,
            sweeper,
            unblocks,
            cache,
            config,
            store,
            clock,
        })
    }

    /// Monitor for one page showing `hostname`.
    pub fn page_monitor(&self, hostname: &str) -> PageMonitor {
        PageMonitor::new(
            hostname,
            self.config.poll_interval_secs,
            Arc::clone(&self.store),
            Arc::clone(&self.clock),
        )
    }
}
