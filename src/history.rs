use crate::clock::Clock;
use crate::constants::{HISTORY_CAP, KEY_BLOCK_HISTORY, KEY_BYPASS_HISTORY, RECENT_WINDOW_MS};
use crate::error::AppResult;
use crate::models::history::Timestamped;
use crate::models::{BlockRecord, BypassRecord};
use crate::store::{self, KeyValueStore};
use log::debug;
use std::sync::Arc;

/// Append `entry`, evicting the single oldest entry once the log is over cap.
pub fn push_bounded<T>(log: &mut Vec<T>, entry: T) {
    log.push(entry);
    if log.len() > HISTORY_CAP {
        log.remove(0);
    }
}

/// Entries newer than the trailing 7-day window (`timestamp > now - 7d`).
pub fn recent<T: Timestamped>(log: &[T], now: i64) -> impl Iterator<Item = &T> {
    let cutoff = now - RECENT_WINDOW_MS;
    log.iter().filter(move |entry| entry.timestamp() > cutoff)
}

pub fn count_recent<T: Timestamped>(log: &[T], now: i64) -> usize {
    recent(log, now).count()
}

/// Block and bypass logs backed by the shared store.
pub struct HistoryTracker {
    store: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
}

impl HistoryTracker {
    pub fn new(store: Arc<dyn KeyValueStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    pub fn bypass_log(&self) -> AppResult<Vec<BypassRecord>> {
        store::get_or(self.store.as_ref(), KEY_BYPASS_HISTORY, Vec::new())
    }

    pub fn block_log(&self) -> AppResult<Vec<BlockRecord>> {
        store::get_or(self.store.as_ref(), KEY_BLOCK_HISTORY, Vec::new())
    }

    pub fn record_block(&self, site: &str) -> AppResult<()> {
        let mut log = self.block_log()?;
        push_bounded(
            &mut log,
            BlockRecord {
                site: site.to_string(),
                timestamp: self.clock.now_ms(),
            },
        );
        store::set(self.store.as_ref(), KEY_BLOCK_HISTORY, &log)?;
        debug!("Recorded block for {site} ({} entries)", log.len());
        Ok(())
    }

    pub fn record_bypass(&self, site: &str, minutes: i64) -> AppResult<()> {
        let mut log = self.bypass_log()?;
        push_bounded(
            &mut log,
            BypassRecord {
                site: site.to_string(),
                timestamp: self.clock.now_ms(),
                duration: minutes,
            },
        );
        store::set(self.store.as_ref(), KEY_BYPASS_HISTORY, &log)
    }

    pub fn recent_bypass_count(&self) -> AppResult<usize> {
        Ok(count_recent(&self.bypass_log()?, self.clock.now_ms()))
    }

    pub fn recent_block_count(&self) -> AppResult<usize> {
        Ok(count_recent(&self.block_log()?, self.clock.now_ms()))
    }
}
