//! Native messaging host for the rageblock browser extension.
//!
//! Each message is a little-endian `u32` length followed by that many bytes
//! of JSON. The host answers most messages with exactly one reply and keeps
//! going until the browser closes stdin.

use crate::constants::MAX_MESSAGE_SIZE;
use crate::context::BlockerContext;
use crate::error::{AppError, AppResult};
use crate::hostname::normalize;
use crate::interceptor::{Decision, NavigationRequest};
use crate::models::TempUnblocks;
use crate::monitor::{MonitorAction, MonitorState, OverlayChoice, OverlayOutcome, PageMonitor};
use crate::sites::SiteLists;
use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::io::{self, Read, Write};

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum IncomingMessage {
    Navigate {
        #[serde(flatten)]
        request: NavigationRequest,
    },
    RequestState,
    GrantBypass {
        #[serde(default)]
        site: Option<String>,
        minutes: i64,
    },
    CheckReflection,
    GetStats,
    AddBlockedSite {
        site: String,
    },
    RemoveBlockedSite {
        site: String,
    },
    AddAllowedSite {
        site: String,
    },
    RemoveAllowedSite {
        site: String,
    },
    MonitorCheck {
        hostname: String,
        #[serde(default, rename = "pageId")]
        page_id: Option<String>,
    },
    OverlayAction {
        hostname: String,
        #[serde(default, rename = "pageId")]
        page_id: Option<String>,
        choice: OverlayChoice,
    },
    StorageChanged {
        changes: Map<String, Value>,
    },
    PageClosed {
        hostname: String,
        #[serde(default, rename = "pageId")]
        page_id: Option<String>,
    },
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutgoingMessage {
    Decision(Decision),
    State {
        #[serde(rename = "blockedSites")]
        blocked_sites: Vec<String>,
        #[serde(rename = "allowedSites")]
        allowed_sites: Vec<String>,
        #[serde(rename = "tempUnblocks")]
        temp_unblocks: TempUnblocks,
    },
    BypassGranted {
        site: String,
        #[serde(rename = "expiresAt")]
        expires_at: i64,
    },
    Reflection {
        count: usize,
        days: i64,
        message: String,
    },
    NoReflection,
    Stats {
        #[serde(rename = "recentBypasses")]
        recent_bypasses: usize,
        #[serde(rename = "recentBlocks")]
        recent_blocks: usize,
    },
    Monitor(MonitorAction),
    NavigateBack,
    Error {
        message: String,
    },
}

impl From<AppError> for OutgoingMessage {
    fn from(e: AppError) -> Self {
        OutgoingMessage::Error {
            message: e.to_string(),
        }
    }
}

/// Read one framed message. `Ok(None)` means the browser closed the pipe.
pub fn read_message<R: Read>(reader: &mut R) -> io::Result<Option<IncomingMessage>> {
    let mut len_bytes = [0u8; 4];
    match reader.read_exact(&mut len_bytes) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e),
    }
    let len = usize::try_from(u32::from_le_bytes(len_bytes))
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

    if len > MAX_MESSAGE_SIZE {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("Message too large: {len} bytes (max: {MAX_MESSAGE_SIZE} bytes)"),
        ));
    }

    let mut buffer = vec![0u8; len];
    reader.read_exact(&mut buffer)?;

    serde_json::from_slice(&buffer)
        .map(Some)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

pub fn write_message<W: Write>(writer: &mut W, message: &OutgoingMessage) -> io::Result<()> {
    let json = serde_json::to_vec(message)?;
    let len = u32::try_from(json.len())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "Reply too large to frame"))?;

    writer.write_all(&len.to_le_bytes())?;
    writer.write_all(&json)?;
    writer.flush()
}

pub struct NativeHost {
    ctx: BlockerContext,
    monitors: HashMap<String, TrackedPage>,
}

impl NativeHost {
    pub fn new(ctx: BlockerContext) -> Self {
        Self {
            ctx,
            monitors: HashMap::new(),
        }
    }

    pub fn context(&self) -> &BlockerContext {
        &self.ctx
    }

    /// Serve messages from `reader` until it is exhausted.
    pub fn run<R: Read, W: Write>(&mut self, reader: &mut R, writer: &mut W) -> io::Result<()> {
        while let Some(message) = read_message(reader)? {
            if let Some(reply) = self.handle_message(message) {
                write_message(writer, &reply)?;
            }
        }
        info!("Browser closed the connection");
        Ok(())
    }

    pub fn handle_message(&mut self, message: IncomingMessage) -> Option<OutgoingMessage> {
        debug!("Handling {message:?}");
        let reply = match message {
            IncomingMessage::Navigate { request } => self
                .ctx
                .interceptor
                .on_before_request(&request)
                .map(OutgoingMessage::Decision),
            IncomingMessage::RequestState => self.state(),
            IncomingMessage::GrantBypass { site, minutes } => self.grant_bypass(site, minutes),
            IncomingMessage::CheckReflection => self.check_reflection(),
            IncomingMessage::GetStats => self.stats(),
            IncomingMessage::AddBlockedSite { site } => self
                .ctx
                .sites
                .add_blocked(&site)
                .and_then(|lists| self.state_from(lists)),
            IncomingMessage::RemoveBlockedSite { site } => self
                .ctx
                .sites
                .remove_blocked(&site)
                .and_then(|lists| self.state_from(lists)),
            IncomingMessage::AddAllowedSite { site } => self
                .ctx
                .sites
                .add_allowed(&site)
                .and_then(|lists| self.state_from(lists)),
            IncomingMessage::RemoveAllowedSite { site } => self
                .ctx
                .sites
                .remove_allowed(&site)
                .and_then(|lists| self.state_from(lists)),
            IncomingMessage::MonitorCheck { hostname, page_id } => {
                self.monitor_check(&hostname, page_id)
            }
            IncomingMessage::OverlayAction {
                hostname,
                page_id,
                choice,
            } => self.overlay_action(&hostname, page_id, choice),
            IncomingMessage::StorageChanged { changes } => {
                if let Err(e) = self.storage_changed(changes) {
                    error!("Failed to apply storage change: {e}");
                }
                return None;
            }
            IncomingMessage::PageClosed { hostname, page_id } => {
                self.page_closed(&hostname, page_id);
                return None;
            }
        };

        Some(reply.unwrap_or_else(|e| {
            warn!("Request failed: {e}");
            OutgoingMessage::from(e)
        }))
    }

    fn state(&self) -> AppResult<OutgoingMessage> {
        let lists = self.ctx.sites.load()?;
        self.state_from(lists)
    }

    fn state_from(&self, lists: SiteLists) -> AppResult<OutgoingMessage> {
        Ok(OutgoingMessage::State {
            blocked_sites: lists.blocked_sites,
            allowed_sites: lists.allowed_sites,
            temp_unblocks: self.ctx.unblocks.load()?,
        })
    }

    fn grant_bypass(&self, site: Option<String>, minutes: i64) -> AppResult<OutgoingMessage> {
        let expires_at = self.ctx.unblocks.grant(site.as_deref(), minutes)?;
        Ok(OutgoingMessage::BypassGranted {
            site: site.unwrap_or_default().trim().to_string(),
            expires_at,
        })
    }

    fn check_reflection(&self) -> AppResult<OutgoingMessage> {
        Ok(match self.ctx.reflection.maybe_reflect()? {
            Some(reflection) => OutgoingMessage::Reflection {
                count: reflection.count,
                days: reflection.days,
                message: reflection.to_string(),
            },
            None => OutgoingMessage::NoReflection,
        })
    }

    fn stats(&self) -> AppResult<OutgoingMessage> {
        Ok(OutgoingMessage::Stats {
            recent_bypasses: self.ctx.history.recent_bypass_count()?,
            recent_blocks: self.ctx.history.recent_block_count()?,
        })
    }

    fn monitor_check(
        &mut self,
        hostname: &str,
        page_id: Option<String>,
    ) -> AppResult<OutgoingMessage> {
        let key = page_id.unwrap_or_else(|| hostname.to_string());
        let existing = self
            .monitors
            .remove(&key)
            .filter(|page| page.monitor.monitor().hostname() == normalize(hostname));

        let (monitor, action) = match existing {
            Some(mut page) => {
                let action = if page.stale {
                    page.monitor.refresh()?
                } else {
                    tick_or_refresh(&mut page.monitor)?
                };
                (page.monitor, action)
            }
            None => {
                let mut monitor = self.ctx.page_monitor(hostname);
                let action = monitor.refresh()?;
                (monitor, action)
            }
        };

        self.keep_if_needed(key, monitor);
        Ok(OutgoingMessage::Monitor(action))
    }

    fn overlay_action(
        &mut self,
        hostname: &str,
        page_id: Option<String>,
        choice: OverlayChoice,
    ) -> AppResult<OutgoingMessage> {
        let key = page_id.unwrap_or_else(|| hostname.to_string());
        let mut monitor = match self.monitors.remove(&key) {
            Some(page) => page.monitor,
            None => self.ctx.page_monitor(hostname),
        };

        match monitor.choose(choice) {
            Ok(OverlayOutcome::NavigateBack) => Ok(OutgoingMessage::NavigateBack),
            Ok(OverlayOutcome::Continue(action)) => {
                self.keep_if_needed(key, monitor);
                Ok(OutgoingMessage::Monitor(action))
            }
            Err(e) => {
                self.keep_if_needed(key, monitor);
                Err(e)
            }
        }
    }

    /// Track `monitor` only while it has something to watch. An idle page
    /// is re-created from storage on its next check.
    fn keep_if_needed(&mut self, key: String, monitor: PageMonitor) {
        if monitor.monitor().state() == MonitorState::Idle {
            return;
        }
        self.monitors.insert(
            key,
            TrackedPage {
                monitor,
                stale: false,
            },
        );
    }

    fn page_closed(&mut self, hostname: &str, page_id: Option<String>) {
        let key = page_id.unwrap_or_else(|| hostname.to_string());
        if self.monitors.remove(&key).is_some() {
            debug!("Stopped monitoring {key}");
        }
    }

    /// Write the browser's change record through to the store; the cache
    /// follows via its subscription. Open pages re-evaluate on their next
    /// check.
    fn storage_changed(&mut self, changes: Map<String, Value>) -> AppResult<()> {
        let mut writes = Vec::with_capacity(changes.len());
        for (key, value) in changes {
            if value.is_null() {
                self.ctx.store.remove(&key)?;
            } else {
                writes.push((key, value));
            }
        }
        if !writes.is_empty() {
            self.ctx.store.set_many(writes)?;
        }

        for page in self.monitors.values_mut() {
            page.stale = true;
        }
        Ok(())
    }
}

/// A monitored page. `stale` pages re-evaluate fully on their next check
/// because storage changed underneath them.
struct TrackedPage {
    monitor: PageMonitor,
    stale: bool,
}

/// A monitor that is watching ticks; any other state re-evaluates.
fn tick_or_refresh(monitor: &mut PageMonitor) -> AppResult<MonitorAction> {
    match monitor.monitor().state() {
        MonitorState::Watching => monitor.tick(),
        MonitorState::Idle | MonitorState::Expired => monitor.refresh(),
    }
}
