//! Request coalescing: at most one in-flight load per key.
//!
//! The first caller for a key becomes the leader and runs the supplied
//! future; every caller arriving while that load is in flight becomes a
//! follower and receives a clone of the leader's result. The pending entry
//! is removed once the leader finishes, so sequential calls execute
//! independently.
//!
//! The pending-map lock guards only the map itself; followers wait on a
//! per-entry channel, never on the lock. If the leader panics or its future
//! is dropped mid-flight, the entry is cleaned up and followers are released
//! with an error rather than waiting forever.

use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;

use futures::FutureExt;
use parking_lot::Mutex;
use tokio::sync::watch;

use crate::error::{Error, Result};

type Slot<T> = Option<Result<T>>;
type PendingMap<T> = Mutex<HashMap<String, watch::Receiver<Slot<T>>>>;

/// Deduplicates concurrent executions keyed by string.
pub struct FlightGroup<T: Clone> {
    pending: PendingMap<T>,
}

enum Role<T: Clone> {
    Leader(watch::Sender<Slot<T>>),
    Follower(watch::Receiver<Slot<T>>),
}

/// Removes the pending entry when the leader completes or is dropped
/// mid-flight, so no stale entry outlives its call.
struct FlightGuard<'a, T: Clone> {
    pending: &'a PendingMap<T>,
    key: &'a str,
}

impl<T: Clone> Drop for FlightGuard<'_, T> {
    fn drop(&mut self) {
        self.pending.lock().remove(self.key);
    }
}

impl<T: Clone> Default for FlightGroup<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone> FlightGroup<T> {
    pub fn new() -> Self {
        Self {
            pending: Mutex::new(HashMap::new()),
        }
    }

    /// Run `fut` for `key`, unless a load for the same key is already in
    /// flight, in which case wait for and return that load's result.
    pub async fn work<F>(&self, key: &str, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        let role = {
            let mut pending = self.pending.lock();
            if let Some(rx) = pending.get(key) {
                Role::Follower(rx.clone())
            } else {
                let (tx, rx) = watch::channel(None);
                pending.insert(key.to_string(), rx);
                Role::Leader(tx)
            }
        };

        match role {
            Role::Leader(tx) => {
                let guard = FlightGuard {
                    pending: &self.pending,
                    key,
                };
                let result = match AssertUnwindSafe(fut).catch_unwind().await {
                    Ok(result) => result,
                    Err(_) => Err(Error::Internal(format!("load for key {key} panicked"))),
                };
                // Remove the entry before broadcasting so a caller arriving
                // after completion starts a fresh flight.
                drop(guard);
                let _ = tx.send(Some(result.clone()));
                result
            }
            Role::Follower(mut rx) => loop {
                if let Some(result) = rx.borrow().clone() {
                    return result;
                }
                if rx.changed().await.is_err() {
                    // Leader dropped without publishing a result.
                    return Err(Error::Internal(format!(
                        "in-flight load for key {key} was aborted"
                    )));
                }
            },
        }
    }

    /// Number of keys currently in flight.
    pub fn in_flight(&self) -> usize {
        self.pending.lock().len()
    }
}

// =============================================================================
// Tests
// =============================================================================
