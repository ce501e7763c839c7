use crate::clock::Clock;
use crate::constants::{KEY_BYPASS_HISTORY, KEY_TEMP_UNBLOCKS, MAX_BYPASS_MINUTES, MS_PER_MINUTE};
use crate::error::AppResult;
use crate::history::push_bounded;
use crate::models::{BypassRecord, TempUnblocks};
use crate::store::{self, KeyValueStore};
use crate::validation::{require_site, validate_bypass_minutes};
use chrono::{DateTime, TimeZone};
use log::{info, warn};
use std::sync::Arc;

/// Temporary bypasses: grant, check, and purge.
pub struct TempUnblockStore {
    store: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
}

impl TempUnblockStore {
    pub fn new(store: Arc<dyn KeyValueStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    pub fn load(&self) -> AppResult<TempUnblocks> {
        store::get_or(self.store.as_ref(), KEY_TEMP_UNBLOCKS, TempUnblocks::new())
    }

    /// Unblock `site` for `minutes` from now and log the bypass.
    ///
    /// Overwrites any previous expiry for the site. The map and the bypass
    /// log are written together; nothing is written if validation fails.
    /// Returns the new expiry instant.
    pub fn grant(&self, site: Option<&str>, minutes: i64) -> AppResult<i64> {
        let site = require_site(site)?;
        let duration_ms = validate_bypass_minutes(minutes)?;

        let mut unblocks = self.load()?;
        let mut history: Vec<BypassRecord> =
            store::get_or(self.store.as_ref(), KEY_BYPASS_HISTORY, Vec::new())?;

        let now = self.clock.now_ms();
        let expires_at = now + duration_ms;
        unblocks.set_expiry(site, expires_at);
        push_bounded(
            &mut history,
            BypassRecord {
                site: site.to_string(),
                timestamp: now,
                duration: minutes,
            },
        );

        self.store.set_many(vec![
            (KEY_TEMP_UNBLOCKS.to_string(), serde_json::to_value(&unblocks)?),
            (KEY_BYPASS_HISTORY.to_string(), serde_json::to_value(&history)?),
        ])?;

        info!("Bypass granted for {site}: {minutes} min");
        Ok(expires_at)
    }

    pub fn is_active(&self, hostname: &str) -> AppResult<bool> {
        Ok(self.load()?.is_active(hostname, self.clock.now_ms()))
    }

    /// Drop expired entries from storage. Returns whether anything changed.
    pub fn purge_expired(&self) -> AppResult<bool> {
        let (purged, changed) = self.load()?.purge_expired(self.clock.now_ms());
        if changed {
            store::set(self.store.as_ref(), KEY_TEMP_UNBLOCKS, &purged)?;
        }
        Ok(changed)
    }
}

/// Whole minutes (rounded up) from `now` until the next local midnight,
/// capped at the longest allowed bypass.
pub fn minutes_until_midnight<Tz: TimeZone>(now: &DateTime<Tz>) -> i64 {
    let midnight = now
        .date_naive()
        .succ_opt()
        .and_then(|day| day.and_hms_opt(0, 0, 0))
        .and_then(|naive| now.timezone().from_local_datetime(&naive).earliest());

    match midnight {
        Some(midnight) => {
            let ms = midnight.signed_duration_since(now.clone()).num_milliseconds();
            let minutes = (ms + MS_PER_MINUTE - 1).div_euclid(MS_PER_MINUTE);
            minutes.clamp(1, MAX_BYPASS_MINUTES)
        }
        None => {
            warn!("Local midnight does not exist today, granting the maximum bypass");
            MAX_BYPASS_MINUTES
        }
    }
}
