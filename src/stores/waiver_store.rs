use dashmap::DashMap;

use crate::models::user::UserKey;
use crate::models::Timestamp;
use crate::utils::time::is_expired;

/// Users who were just sent to the waiver page.
///
/// A waiver can only be accepted for a (user, location) that a card tap or a
/// registration put here, within the configured window.
pub struct PendingWaivers {
    pending: DashMap<UserKey, Timestamp>,
    window_ms: i64,
}

impl PendingWaivers {
    pub fn new(window_ms: i64) -> Self {
        Self {
            pending: DashMap::new(),
            window_ms,
        }
    }

    pub fn mark(&self, key: UserKey, now: Timestamp) {
        self.pending.insert(key, now);
    }

    /// Consume the pending entry; false if there is none or it expired
    pub fn take(&self, key: UserKey, now: Timestamp) -> bool {
        match self.pending.remove(&key) {
            Some((_, since)) => !is_expired(since, self.window_ms, now),
            None => false,
        }
    }

    /// Drop expired entries, returning how many were removed
    pub fn sweep(&self, now: Timestamp) -> usize {
        let before = self.pending.len();
        self.pending
            .retain(|_, since| !is_expired(*since, self.window_ms, now));
        before.saturating_sub(self.pending.len())
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}
