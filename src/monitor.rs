//! Per-page watch over an active bypass.
//!
//! A page on a blocked site that was let through by a bypass keeps polling
//! until the bypass lapses, then shows an overlay offering to go back or to
//! extend. [`ExpiryMonitor`] is the pure state machine; [`PageMonitor`]
//! feeds it from storage and carries out overlay choices.

use crate::clock::Clock;
use crate::constants::{KEY_BLOCKED_SITES, OVERLAY_EXTRA_MINUTES};
use crate::error::AppResult;
use crate::hostname::{is_blocked, normalize};
use crate::models::TempUnblocks;
use crate::sites::default_blocked_sites;
use crate::store::{self, KeyValueStore};
use crate::unblock::{minutes_until_midnight, TempUnblockStore};
use chrono::{Local, TimeZone};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MonitorState {
    /// Site is not blocked, or has no bypass to watch.
    Idle,
    /// Bypass active, polling for its expiry.
    Watching,
    /// Bypass lapsed, overlay on screen.
    Expired,
}

/// What the page should do after an evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum MonitorAction {
    /// Keep whatever timer is running.
    None,
    /// Replace any running timer with one firing every `interval_secs`.
    StartPolling {
        #[serde(rename = "intervalSecs")]
        interval_secs: u64,
    },
    StopPolling,
    /// Stop polling and cover the page.
    ShowOverlay,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverlayChoice {
    GoBack,
    FiveMoreMinutes,
    UntilMidnight,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverlayOutcome {
    /// Leave the page; monitoring ends.
    NavigateBack,
    /// Bypass renewed; the page continues with the given action.
    Continue(MonitorAction),
}

#[derive(Debug, Clone)]
pub struct ExpiryMonitor {
    hostname: String,
    poll_interval_secs: u64,
    state: MonitorState,
    overlay_shown: bool,
}

impl ExpiryMonitor {
    pub fn new(hostname: &str, poll_interval_secs: u64) -> Self {
        Self {
            hostname: normalize(hostname).to_string(),
            poll_interval_secs,
            state: MonitorState::Idle,
            overlay_shown: false,
        }
    }

    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    pub fn state(&self) -> MonitorState {
        self.state
    }

    pub fn overlay_shown(&self) -> bool {
        self.overlay_shown
    }

    fn show_overlay(&mut self) -> MonitorAction {
        self.overlay_shown = true;
        self.state = MonitorState::Expired;
        MonitorAction::ShowOverlay
    }

    /// Full re-evaluation, run on page load and on every storage change.
    pub fn evaluate<S: AsRef<str>>(
        &mut self,
        blocked_sites: &[S],
        unblocks: &TempUnblocks,
        now: i64,
    ) -> MonitorAction {
        if !is_blocked(&self.hostname, blocked_sites) {
            self.state = MonitorState::Idle;
            return MonitorAction::StopPolling;
        }

        if unblocks.is_active(&self.hostname, now) {
            self.state = MonitorState::Watching;
            return MonitorAction::StartPolling {
                interval_secs: self.poll_interval_secs,
            };
        }

        let lapsed = unblocks
            .expiry(&self.hostname)
            .is_some_and(|expires_at| expires_at <= now);
        if lapsed && !self.overlay_shown {
            return self.show_overlay();
        }

        if !self.overlay_shown {
            self.state = MonitorState::Idle;
        }
        MonitorAction::StopPolling
    }

    /// Poll tick while watching.
    pub fn check_expiry(&mut self, unblocks: &TempUnblocks, now: i64) -> MonitorAction {
        if unblocks.is_active(&self.hostname, now) {
            return MonitorAction::None;
        }
        if self.overlay_shown {
            MonitorAction::StopPolling
        } else {
            self.show_overlay()
        }
    }

    /// Forget the overlay after the user renewed the bypass.
    fn overlay_dismissed(&mut self) {
        self.overlay_shown = false;
        self.state = MonitorState::Idle;
    }
}

/// An [`ExpiryMonitor`] wired to storage.
pub struct PageMonitor {
    monitor: ExpiryMonitor,
    store: Arc<dyn KeyValueStore>,
    unblocks: TempUnblockStore,
    clock: Arc<dyn Clock>,
}

impl PageMonitor {
    pub fn new(
        hostname: &str,
        poll_interval_secs: u64,
        store: Arc<dyn KeyValueStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let unblocks = TempUnblockStore::new(Arc::clone(&store), Arc::clone(&clock));
        Self {
            monitor: ExpiryMonitor::new(hostname, poll_interval_secs),
            store,
            unblocks,
            clock,
        }
    }

    pub fn monitor(&self) -> &ExpiryMonitor {
        &self.monitor
    }

    pub fn refresh(&mut self) -> AppResult<MonitorAction> {
        let blocked: Vec<String> = store::get_or(
            self.store.as_ref(),
            KEY_BLOCKED_SITES,
            default_blocked_sites(),
        )?;
        let unblocks = self.unblocks.load()?;
        let action = self.monitor.evaluate(&blocked, &unblocks, self.clock.now_ms());
        debug!(
            "Monitor for {} is {:?}, action {action:?}",
            self.monitor.hostname, self.monitor.state
        );
        Ok(action)
    }

    pub fn tick(&mut self) -> AppResult<MonitorAction> {
        let unblocks = self.unblocks.load()?;
        Ok(self.monitor.check_expiry(&unblocks, self.clock.now_ms()))
    }

    /// Carry out an overlay button. Extending grants a fresh bypass and then
    /// re-evaluates from scratch. If the grant fails the overlay stays up.
    pub fn choose(&mut self, choice: OverlayChoice) -> AppResult<OverlayOutcome> {
        let minutes = match choice {
            OverlayChoice::GoBack => {
                info!("Leaving {} after bypass expired", self.monitor.hostname);
                return Ok(OverlayOutcome::NavigateBack);
            }
            OverlayChoice::FiveMoreMinutes => OVERLAY_EXTRA_MINUTES,
            OverlayChoice::UntilMidnight => {
                let now = Local
                    .timestamp_millis_opt(self.clock.now_ms())
                    .single()
                    .unwrap_or_else(Local::now);
                minutes_until_midnight(&now)
            }
        };

        self.unblocks.grant(Some(&self.monitor.hostname), minutes)?;
        self.monitor.overlay_dismissed();
        Ok(OverlayOutcome::Continue(self.refresh()?))
    }
}
