//! Background reclamation.
//!
//! A dedicated thread wakes every `interval`, checks the budget and, while
//! it is exceeded, evicts one entry per exclusive-lock acquisition. A cycle
//! stops after `max_attempts` evictions even if the budget is still
//! exceeded; that case is logged and counted, never fatal.
//!
//! ```text
//!   ┌──────────── reclaim thread ─────────────┐
//!   │ loop:                                    │
//!   │   wait(interval) or stop signal          │
//!   │   while over_budget && attempts < max:   │
//!   │       cache.write().evict()              │   ◄── lock held per step
//!   │   exhausted? → warn!                     │
//!   └──────────────────────────────────────────┘
//! ```
//!
//! The thread is owned by a [`Reclaimer`] handle. Stopping sets the
//! cancellation flag, wakes the thread and joins it.

use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::{Condvar, Mutex};
use tracing::{debug, info, warn};

use crate::storage::gateway::Shared;
use crate::storage::load::resident_memory_kib;
use crate::traits::EvictionPolicy;

/// Default pause between reclamation cycles.
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(3);
/// Default bound on evictions per cycle.
pub const DEFAULT_MAX_ATTEMPTS: usize = 4000;

/// Condition that makes the reclamation loop evict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BudgetTrigger {
    /// More entries are resident than the policy's capacity.
    #[default]
    EntryCount,
    /// Process resident memory above `max_rss_kib`.
    Memory { max_rss_kib: u64 },
}

/// Reclamation settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReclaimConfig {
    pub interval: Duration,
    pub max_attempts: usize,
    pub trigger: BudgetTrigger,
}

impl Default for ReclaimConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_INTERVAL,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            trigger: BudgetTrigger::EntryCount,
        }
    }
}

/// Outcome of one reclamation cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReclaimReport {
    /// `evict` calls made.
    pub attempts: usize,
    /// Resident entries removed (LRU may drop several expired ones per call).
    pub evicted: usize,
    /// Budget still exceeded when the cycle ended.
    pub exhausted: bool,
}

fn over_budget(shared: &Shared, trigger: BudgetTrigger) -> bool {
    match trigger {
        BudgetTrigger::EntryCount => shared.cache.read().needs_eviction(),
        BudgetTrigger::Memory { max_rss_kib } => resident_memory_kib() > max_rss_kib,
    }
}

/// Runs one bounded cycle against `shared`.
pub(crate) fn run_cycle(shared: &Shared, config: &ReclaimConfig) -> ReclaimReport {
    let mut report = ReclaimReport::default();
    while report.attempts < config.max_attempts && over_budget(shared, config.trigger) {
        let evicted = shared.cache.write().evict();
        report.attempts += 1;
        report.evicted += evicted;
        if evicted == 0 {
            break;
        }
    }
    report.exhausted = over_budget(shared, config.trigger);

    shared.stats.record_cycle(&report);
    if report.exhausted {
        warn!(
            attempts = report.attempts,
            evicted = report.evicted,
            trigger = ?config.trigger,
            "reclamation could not reach budget"
        );
    } else if report.attempts > 0 {
        debug!(attempts = report.attempts, evicted = report.evicted, "reclamation cycle");
    }
    report
}

#[derive(Default)]
struct StopSignal {
    cancelled: Mutex<bool>,
    wake: Condvar,
}

/// Owned handle of the reclamation thread.
pub(crate) struct Reclaimer {
    stop: Arc<StopSignal>,
    handle: Option<JoinHandle<()>>,
}

impl Reclaimer {
    pub(crate) fn spawn(shared: Arc<Shared>, config: ReclaimConfig) -> io::Result<Self> {
        let stop = Arc::new(StopSignal::default());
        let thread_stop = Arc::clone(&stop);

        let handle = thread::Builder::new()
            .name("shardkv-reclaim".to_string())
            .spawn(move || {
                info!(interval = ?config.interval, "reclamation started");
                loop {
                    {
                        let mut cancelled = thread_stop.cancelled.lock();
                        if !*cancelled {
                            thread_stop.wake.wait_for(&mut cancelled, config.interval);
                        }
                        if *cancelled {
                            break;
                        }
                    }
                    run_cycle(&shared, &config);
                }
                info!("reclamation stopped");
            })?;

        Ok(Self {
            stop,
            handle: Some(handle),
        })
    }

    /// Sets the cancellation flag, wakes the thread and joins it.
    pub(crate) fn stop(mut self) {
        self.signal_and_join();
    }

    fn signal_and_join(&mut self) {
        *self.stop.cancelled.lock() = true;
        self.stop.wake.notify_all();
        if let Some(handle) = self.handle.take()
            && handle.join().is_err()
        {
            warn!("reclamation thread panicked");
        }
    }
}

impl Drop for Reclaimer {
    fn drop(&mut self) {
        self.signal_and_join();
    }
}
