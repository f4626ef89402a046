//! Non-blocking mutual exclusion for on-demand refreshes.
//!
//! A burst of concurrent "do we have fresh data yet?" callers must not fan
//! out into duplicate upstream fetches. The registry hands out at most one
//! guard per key; a caller that fails to acquire treats the refresh as
//! already in progress and returns immediately without waiting.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

/// Registry of in-flight refresh keys. Cloning shares the underlying set.
#[derive(Clone, Default)]
pub struct RefreshRegistry {
    in_flight: Arc<Mutex<HashSet<String>>>,
}

impl RefreshRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Try to claim a refresh key. Returns `None` immediately when another
    /// refresh for the same key is in flight; never blocks.
    pub fn try_acquire(&self, key: &str) -> Option<RefreshGuard> {
        let mut in_flight = self.in_flight.lock().unwrap();
        if in_flight.insert(key.to_string()) {
            Some(RefreshGuard {
                in_flight: Arc::clone(&self.in_flight),
                key: key.to_string(),
            })
        } else {
            None
        }
    }

    pub fn is_in_flight(&self, key: &str) -> bool {
        self.in_flight.lock().unwrap().contains(key)
    }
}

/// Releases the key when dropped, including on panic or early return.
pub struct RefreshGuard {
    in_flight: Arc<Mutex<HashSet<String>>>,
    key: String,
}

impl Drop for RefreshGuard {
    fn drop(&mut self) {
        if let Ok(mut in_flight) = self.in_flight.lock() {
            in_flight.remove(&self.key);
        }
    }
}
