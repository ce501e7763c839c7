use crate::constants::{CLEANUP_INTERVAL_SECS, DEFAULT_BLOCK_PAGE_URL, EXPIRY_POLL_INTERVAL_SECS};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockerConfig {
    /// How often expired bypasses are swept from storage.
    pub cleanup_interval_secs: u64,
    /// How often an open page re-checks its bypass.
    pub poll_interval_secs: u64,
    /// Extension page blocked navigations are redirected to.
    pub block_page_url: String,
}

impl Default for BlockerConfig {
    fn default() -> Self {
        Self {
            cleanup_interval_secs: CLEANUP_INTERVAL_SECS,
            poll_interval_secs: EXPIRY_POLL_INTERVAL_SECS,
            block_page_url: DEFAULT_BLOCK_PAGE_URL.to_string(),
        }
    }
}

impl BlockerConfig {
    /// Defaults, with the block page taken from `RAGEBLOCK_BLOCK_PAGE` when set.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(url) = std::env::var("RAGEBLOCK_BLOCK_PAGE") {
            if !url.trim().is_empty() {
                config.block_page_url = url.trim().to_string();
            }
        }
        config
    }
}
