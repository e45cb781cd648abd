use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use tracing::{debug, info};

use super::clock::{Clock, SystemClock};
use super::error::{AdmissionError, Result};
use super::policy::Policy;
use crate::metrics::{SWEEPS_TOTAL, SWEPT_RECORDS_TOTAL, TRACKED_KEYS};

pub const DEFAULT_HIGH_WATER_MARK: usize = 10_000;

// Counter for one identity+class key. Stale once `now >= window_reset_at`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaRecord {
    pub count: u32,
    pub window_reset_at: u64, // epoch ms
}

impl QuotaRecord {
    fn fresh(now: u64, policy: &Policy) -> Self {
        Self {
            count: 1,
            window_reset_at: now.saturating_add(policy.window_ms()),
        }
    }
}

/// Outcome of a single quota check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaCheck {
    pub allowed: bool,
    pub remaining: u32,
    pub reset_at: u64, // epoch ms
}

/// Counter storage behind the admission guard.
///
/// `QuotaStore` keeps counters in process memory, so every gateway instance
/// enforces its own limits. A shared store would implement this trait.
pub trait QuotaBackend: Send + Sync {
    fn check(&self, key: &str, policy: &Policy) -> Result<QuotaCheck>;

    fn tracked_keys(&self) -> usize;
}

/// In-memory fixed-window counters keyed by `identity:CLASS`.
///
/// The read-modify-write for a key runs under the DashMap shard lock, so
/// concurrent checks on the same key are serialized. Records are never reset
/// by a timer: a stale record is reinitialized on its next check, and dead
/// records are dropped by a sweep once the map grows past the high-water mark.
/// After each sweep the trigger moves to twice the surviving size, so a live
/// set above the mark costs O(log n) sweeps rather than one per new key.
pub struct QuotaStore {
    records: DashMap<String, QuotaRecord>,
    clock: Arc<dyn Clock>,
    high_water_mark: usize,
    next_sweep_at: AtomicUsize,
    sweeping: AtomicBool,
    sweeps_run: AtomicU64,
}

impl Default for QuotaStore {
    fn default() -> Self {
        Self::new()
    }
}

impl QuotaStore {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            records: DashMap::new(),
            clock,
            high_water_mark: DEFAULT_HIGH_WATER_MARK,
            next_sweep_at: AtomicUsize::new(DEFAULT_HIGH_WATER_MARK),
            sweeping: AtomicBool::new(false),
            sweeps_run: AtomicU64::new(0),
        }
    }

    pub fn with_high_water_mark(mut self, high_water_mark: usize) -> Self {
        self.high_water_mark = high_water_mark;
        self.next_sweep_at = AtomicUsize::new(high_water_mark);
        self
    }

    pub fn high_water_mark(&self) -> usize {
        self.high_water_mark
    }

    /// Sweeps run by this store so far.
    pub fn sweeps_run(&self) -> u64 {
        self.sweeps_run.load(Ordering::Relaxed)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<QuotaRecord> {
        self.records.get(key).map(|r| *r)
    }

    pub fn check(&self, key: &str, policy: &Policy) -> Result<QuotaCheck> {
        if key.trim().is_empty() {
            return Err(AdmissionError::InvalidKey("empty quota key".to_string()));
        }

        let now = self.clock.now_ms();
        let max = policy.max_requests();

        let (check, inserted) = match self.records.entry(key.to_string()) {
            Entry::Vacant(slot) => {
                let record = QuotaRecord::fresh(now, policy);
                slot.insert(record);
                (allowed(max, record), true)
            }
            Entry::Occupied(mut slot) => {
                let record = slot.get_mut();

                // window over? start a new one
                if now >= record.window_reset_at {
                    *record = QuotaRecord::fresh(now, policy);
                    (allowed(max, *record), false)
                } else {
                    // denied attempts count too, retries can't win quota back
                    record.count = record.count.saturating_add(1);
                    if record.count > max {
                        let check = QuotaCheck {
                            allowed: false,
                            remaining: 0,
                            reset_at: record.window_reset_at,
                        };
                        (check, false)
                    } else {
                        (allowed(max, *record), false)
                    }
                }
            }
        };

        // shard lock is released here; the sweep needs every shard
        if inserted {
            let len = self.records.len();
            TRACKED_KEYS.set(len as f64);
            if len > self.next_sweep_at.load(Ordering::Acquire) {
                self.sweep_at(now);
            }
        }

        Ok(check)
    }

    /// Drop every record whose window ended before now. Returns how many went.
    pub fn sweep(&self) -> usize {
        self.sweep_at(self.clock.now_ms())
    }

    fn sweep_at(&self, now: u64) -> usize {
        // one sweeper at a time, others just carry on
        if self.sweeping.swap(true, Ordering::AcqRel) {
            return 0;
        }

        let mut removed = 0;
        self.records.retain(|_, record| {
            let keep = record.window_reset_at >= now;
            if !keep {
                removed += 1;
            }
            keep
        });
        let len = self.records.len();
        self.next_sweep_at
            .store(self.high_water_mark.max(len.saturating_mul(2)), Ordering::Release);
        self.sweeps_run.fetch_add(1, Ordering::Relaxed);
        self.sweeping.store(false, Ordering::Release);

        SWEEPS_TOTAL.inc();
        SWEPT_RECORDS_TOTAL.inc_by(removed as u64);
        TRACKED_KEYS.set(len as f64);

        if removed > 0 {
            info!(removed, remaining = len, "Swept expired quota records");
        } else {
            debug!(tracked = len, "Quota sweep found nothing to remove");
        }
        removed
    }
}

fn allowed(max: u32, record: QuotaRecord) -> QuotaCheck {
    QuotaCheck {
        allowed: true,
        remaining: max.saturating_sub(record.count),
        reset_at: record.window_reset_at,
    }
}

impl QuotaBackend for QuotaStore {
    fn check(&self, key: &str, policy: &Policy) -> Result<QuotaCheck> {
        QuotaStore::check(self, key, policy)
    }

    fn tracked_keys(&self) -> usize {
        self.len()
    }
}
