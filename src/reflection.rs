use crate::clock::Clock;
use crate::constants::{
    KEY_BYPASS_HISTORY, KEY_LAST_REFLECTION, MS_PER_DAY, REFLECTION_COOLDOWN_MS,
    REFLECTION_THRESHOLD,
};
use crate::error::AppResult;
use crate::history::recent;
use crate::models::BypassRecord;
use crate::store::{self, KeyValueStore};
use log::info;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;

/// Summary shown on the block page when bypasses pile up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Reflection {
    pub count: usize,
    pub days: i64,
}

impl fmt::Display for Reflection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "You've bypassed the block {} times in the last {} days. \
             Can you remember what any of those articles were about?",
            self.count, self.days
        )
    }
}

/// Decide whether a reflection is due. Pure: no state is touched.
pub fn evaluate(history: &[BypassRecord], last_reflection: i64, now: i64) -> Option<Reflection> {
    if now - last_reflection < REFLECTION_COOLDOWN_MS {
        return None;
    }

    let in_window: Vec<&BypassRecord> = recent(history, now).collect();
    if in_window.len() < REFLECTION_THRESHOLD {
        return None;
    }

    let oldest = in_window.iter().map(|b| b.timestamp).min()?;
    let days = ((now - oldest).div_euclid(MS_PER_DAY)).max(1);

    Some(Reflection {
        count: in_window.len(),
        days,
    })
}

/// Once-per-week gate over [`evaluate`].
pub struct ReflectionGate {
    store: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
}

impl ReflectionGate {
    pub fn new(store: Arc<dyn KeyValueStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Return a reflection if one is due, recording that it was shown.
    ///
    /// When nothing is due, storage is not written.
    pub fn maybe_reflect(&self) -> AppResult<Option<Reflection>> {
        let history: Vec<BypassRecord> =
            store::get_or(self.store.as_ref(), KEY_BYPASS_HISTORY, Vec::new())?;
        let last_reflection: i64 = store::get_or(self.store.as_ref(), KEY_LAST_REFLECTION, 0)?;
        let now = self.clock.now_ms();

        let Some(reflection) = evaluate(&history, last_reflection, now) else {
            return Ok(None);
        };

        store::set(self.store.as_ref(), KEY_LAST_REFLECTION, &now)?;
        info!(
            "Reflection due: {} bypasses over {} days",
            reflection.count, reflection.days
        );
        Ok(Some(reflection))
    }
}
