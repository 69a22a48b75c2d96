//! Hot-key promotion tracking with periodic decay.
//!
//! A key turns hot once its access count reaches the promotion threshold;
//! a background decay pass halves counts, drops low-traffic keys, and
//! recomputes the hot set so a key that cools off is demoted. The tracker
//! lock is only ever held for map operations, never across I/O.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{debug, info};

/// Access count at which a key is promoted to hot.
pub const DEFAULT_HOT_SPOT_THRESHOLD: usize = 100;

/// Number of replica peers that receive a hot key's value.
pub const DEFAULT_BACKUP_COUNT: usize = 2;

/// Minimum interval between decay passes.
const CLEAN_INTERVAL: Duration = Duration::from_secs(600);

/// Classification of a key at the moment of an access.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyHeat {
    /// This access crossed the promotion threshold.
    Promoted,
    /// Already classified hot.
    Hot,
    /// Below the threshold.
    Cold,
}

impl KeyHeat {
    #[inline]
    pub fn is_hot(self) -> bool {
        matches!(self, KeyHeat::Promoted | KeyHeat::Hot)
    }
}

struct TrackerState {
    access_count: HashMap<String, usize>,
    hot_keys: HashSet<String>,
    threshold: usize,
    backup_count: usize,
    last_clean_at: Instant,
}

/// Shared hot-key state guarded by a single lock.
#[derive(Clone)]
pub struct HotSpotTracker {
    state: Arc<Mutex<TrackerState>>,
}

impl Default for HotSpotTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl HotSpotTracker {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(TrackerState {
                access_count: HashMap::new(),
                hot_keys: HashSet::new(),
                threshold: DEFAULT_HOT_SPOT_THRESHOLD,
                backup_count: DEFAULT_BACKUP_COUNT,
                last_clean_at: Instant::now(),
            })),
        }
    }

    /// Count one served lookup and classify the key.
    ///
    /// Every `CLEAN_INTERVAL` this also schedules a decay pass on a
    /// separate task; a panic inside that task is contained by the runtime
    /// and never propagates to callers.
    pub fn record_access(&self, key: &str) -> KeyHeat {
        let mut state = self.state.lock();

        if state.hot_keys.contains(key) {
            return KeyHeat::Hot;
        }

        let count = {
            let counter = state.access_count.entry(key.to_string()).or_insert(0);
            *counter += 1;
            *counter
        };

        if count >= state.threshold {
            state.hot_keys.insert(key.to_string());
            info!(key, count, "key promoted to hot spot");
            return KeyHeat::Promoted;
        }

        if state.last_clean_at.elapsed() > CLEAN_INTERVAL {
            // Stamp first so concurrent accesses do not pile up cleaners.
            state.last_clean_at = Instant::now();
            if let Ok(handle) = tokio::runtime::Handle::try_current() {
                let tracker = self.clone();
                handle.spawn(async move {
                    tracker.clean_expired();
                });
            }
        }

        KeyHeat::Cold
    }

    /// Decay pass: halve the counters worth keeping, drop the rest, and
    /// recompute the hot set. Idempotent modulo the halving.
    pub fn clean_expired(&self) {
        let mut state = self.state.lock();
        let state = &mut *state;
        state.last_clean_at = Instant::now();

        let threshold = state.threshold;
        let mut kept: HashMap<String, usize> = HashMap::new();
        for (key, count) in state.access_count.drain() {
            if state.hot_keys.contains(&key) || count > threshold / 2 {
                kept.insert(key, count / 2);
            }
        }
        state.access_count = kept;

        state.hot_keys = state
            .access_count
            .iter()
            .filter(|(_, &count)| count >= threshold)
            .map(|(key, _)| key.clone())
            .collect();

        debug!(
            hot_keys = state.hot_keys.len(),
            tracked = state.access_count.len(),
            "cleaned expired hot-spot counters"
        );
    }

    /// Whether the key is currently classified hot.
    pub fn is_hot(&self, key: &str) -> bool {
        self.state.lock().hot_keys.contains(key)
    }

    pub fn set_threshold(&self, threshold: usize) {
        self.state.lock().threshold = threshold;
    }

    pub fn threshold(&self) -> usize {
        self.state.lock().threshold
    }

    pub fn set_backup_count(&self, count: usize) {
        self.state.lock().backup_count = count;
    }

    pub fn backup_count(&self) -> usize {
        self.state.lock().backup_count
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_promotion_at_threshold() {
        let tracker = HotSpotTracker::new();
        tracker.set_threshold(5);

        for i in 1..5 {
            assert_eq!(tracker.record_access("k"), KeyHeat::Cold, "access {i}");
        }
        assert!(!tracker.is_hot("k"));

        assert_eq!(tracker.record_access("k"), KeyHeat::Promoted);
        assert!(tracker.is_hot("k"));
        assert_eq!(tracker.record_access("k"), KeyHeat::Hot);
    }

    #[test]
    fn test_threshold_zero_promotes_immediately() {
        let tracker = HotSpotTracker::new();
        tracker.set_threshold(0);

        assert!(!tracker.is_hot("k"));
        assert!(tracker.record_access("k").is_hot());
        assert!(tracker.is_hot("k"));
    }

    #[test]
    fn test_decay_halves_and_demotes() {
        let tracker = HotSpotTracker::new();
        tracker.set_threshold(4);

        for _ in 0..4 {
            tracker.record_access("hot");
        }
        assert!(tracker.is_hot("hot"));

        // 4 -> 2: below the threshold, so the key is demoted.
        tracker.clean_expired();
        assert!(!tracker.is_hot("hot"));

        // 2 -> 1 -> dropped entirely on the following pass.
        tracker.clean_expired();
        tracker.clean_expired();
        assert!(!tracker.is_hot("hot"));
    }

    #[test]
    fn test_decay_drops_low_traffic_keys() {
        let tracker = HotSpotTracker::new();
        tracker.set_threshold(10);

        tracker.record_access("rare");
        for _ in 0..6 {
            tracker.record_access("busy");
        }

        // rare: 1 <= 10/2 and not hot -> dropped. busy: 6 > 5 -> kept at 3.
        tracker.clean_expired();

        for _ in 0..7 {
            tracker.record_access("busy");
        }
        // 3 + 7 = 10: promoted, so the earlier counts survived the decay.
        assert!(tracker.is_hot("busy"));
    }

    #[test]
    fn test_backup_count_configuration() {
        let tracker = HotSpotTracker::new();
        assert_eq!(tracker.backup_count(), DEFAULT_BACKUP_COUNT);
        for count in [0, 1, 5] {
            tracker.set_backup_count(count);
            assert_eq!(tracker.backup_count(), count);
        }
    }
}
