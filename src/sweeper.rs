use crate::unblock::TempUnblockStore;
use log::{debug, error};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Granularity at which a sleeping sweeper notices `stop()`.
const STOP_CHECK_INTERVAL: Duration = Duration::from_millis(200);

/// Shortest interval a sweeper will run at.
const MIN_INTERVAL: Duration = Duration::from_secs(1);

/// Background purge of expired bypasses on a fixed interval.
pub struct CleanupSweeper {
    interval: Duration,
    running: Arc<AtomicBool>,
    unblocks: Arc<TempUnblockStore>,
}

impl CleanupSweeper {
    /// `interval_secs` below one second is raised to one second.
    pub fn new(unblocks: Arc<TempUnblockStore>, interval_secs: u64) -> Self {
        Self {
            interval: Duration::from_secs(interval_secs).max(MIN_INTERVAL),
            running: Arc::new(AtomicBool::new(false)),
            unblocks,
        }
    }

    /// Run one purge now. Failures are logged and leave storage as it was.
    pub fn sweep_once(&self) -> bool {
        sweep(&self.unblocks)
    }

    pub fn start(&self) -> thread::JoinHandle<()> {
        self.running.store(true, Ordering::SeqCst);

        let running = Arc::clone(&self.running);
        let unblocks = Arc::clone(&self.unblocks);
        let interval = self.interval;

        thread::spawn(move || {
            let mut next_sweep = Instant::now() + interval;
            while running.load(Ordering::SeqCst) {
                if Instant::now() >= next_sweep {
                    sweep(&unblocks);
                    next_sweep = Instant::now() + interval;
                }
                thread::sleep(STOP_CHECK_INTERVAL.min(interval));
            }
        })
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

fn sweep(unblocks: &TempUnblockStore) -> bool {
    match unblocks.purge_expired() {
        Ok(changed) => {
            if changed {
                debug!("Purged expired bypasses");
            }
            changed
        }
        Err(e) => {
            error!("Failed to purge expired bypasses: {e}");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::Clock;
    use crate::store::{KeyValueStore, MemoryStore};
    use crate::test_utils::{ManualClock, TEST_NOW};

    fn setup() -> (Arc<TempUnblockStore>, ManualClock) {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        let clock = ManualClock::new(TEST_NOW);
        let dyn_clock: Arc<dyn Clock> = Arc::new(clock.clone());
        (Arc::new(TempUnblockStore::new(store, dyn_clock)), clock)
    }

    #[test]
    fn test_sweep_once_purges_expired() {
        let (unblocks, clock) = setup();
        unblocks.grant(Some("reddit.com"), 1).unwrap();
        let sweeper = CleanupSweeper::new(Arc::clone(&unblocks), 60);

        assert!(!sweeper.sweep_once());
        clock.advance_ms(60_000);
        assert!(sweeper.sweep_once());
        assert!(unblocks.load().unwrap().is_empty());
    }

    #[test]
    fn test_zero_interval_is_clamped() {
        let (unblocks, _clock) = setup();
        let sweeper = CleanupSweeper::new(unblocks, 0);
        assert_eq!(sweeper.interval, MIN_INTERVAL);

        let handle = sweeper.start();
        thread::sleep(Duration::from_millis(50));
        sweeper.stop();
        handle.join().unwrap();
    }

    #[test]
    fn test_sweeper_starts_and_stops() {
        let (unblocks, _clock) = setup();
        let sweeper = CleanupSweeper::new(unblocks, 1);

        assert!(!sweeper.is_running());

        let handle = sweeper.start();
        assert!(sweeper.is_running());

        thread::sleep(Duration::from_millis(100));

        sweeper.stop();
        handle.join().unwrap();

        assert!(!sweeper.is_running());
    }

    #[test]
    fn test_sweeper_thread_purges_on_interval() {
        let (unblocks, clock) = setup();
        unblocks.grant(Some("reddit.com"), 1).unwrap();
        clock.advance_ms(60_000);

        let sweeper = CleanupSweeper::new(Arc::clone(&unblocks), 1);
        let handle = sweeper.start();
        thread::sleep(Duration::from_millis(1500));
        sweeper.stop();
        handle.join().unwrap();

        assert!(unblocks.load().unwrap().is_empty());
    }
}
