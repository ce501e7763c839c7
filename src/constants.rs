// src/constants.rs

/// Storage key for the user-editable block list.
pub const KEY_BLOCKED_SITES: &str = "blockedSites";

/// Storage key for the allow list (overrides the block list).
pub const KEY_ALLOWED_SITES: &str = "allowedSites";

/// Storage key for the hostname -> expiry (ms since epoch) map.
pub const KEY_TEMP_UNBLOCKS: &str = "tempUnblocks";

/// Storage key for the bounded bypass log.
pub const KEY_BYPASS_HISTORY: &str = "bypassHistory";

/// Storage key for the bounded block log.
pub const KEY_BLOCK_HISTORY: &str = "blockHistory";

/// Storage key for the last time a reflection prompt was shown.
pub const KEY_LAST_REFLECTION: &str = "lastReflection";

/// Milliseconds in one minute
pub const MS_PER_MINUTE: i64 = 60 * 1000;

/// Milliseconds in one day (24 * 60 * 60 * 1000)
pub const MS_PER_DAY: i64 = 24 * 60 * MS_PER_MINUTE;

/// Trailing window used for "recent" counts.
pub const RECENT_WINDOW_MS: i64 = 7 * MS_PER_DAY;

/// Maximum entries kept in either history log.
pub const HISTORY_CAP: usize = 100;

/// Recent bypasses needed before a reflection prompt is considered.
pub const REFLECTION_THRESHOLD: usize = 5;

/// Minimum time between two reflection prompts.
pub const REFLECTION_COOLDOWN_MS: i64 = 7 * MS_PER_DAY;

/// Interval of the expired-bypass sweep.
pub const CLEANUP_INTERVAL_SECS: u64 = 60;

/// Interval at which an open page re-checks its bypass.
pub const EXPIRY_POLL_INTERVAL_SECS: u64 = 30;

/// Extension offered by the expiry overlay.
pub const OVERLAY_EXTRA_MINUTES: i64 = 5;

/// Longest bypass that can be granted in one go (24 hours)
pub const MAX_BYPASS_MINUTES: i64 = 24 * 60;

/// Maximum hostname length (RFC 1035)
pub const MAX_SITE_LEN: usize = 253;

/// Browsers cap native messages at 1MB (1024 * 1024 bytes)
pub const MAX_MESSAGE_SIZE: usize = 1024 * 1024;

/// Extension page navigations are redirected to when blocked.
pub const DEFAULT_BLOCK_PAGE_URL: &str = "moz-extension://rageblock/src/blocked.html";

/// Block list seeded on first install.
pub const DEFAULT_BLOCKED_SITES: &[&str] = &[
    "cnn.com",
    "foxnews.com",
    "msnbc.com",
    "nytimes.com",
    "washingtonpost.com",
    "theguardian.com",
    "bbc.com",
    "news.google.com",
    "reddit.com",
    "twitter.com",
    "x.com",
    "facebook.com",
];
