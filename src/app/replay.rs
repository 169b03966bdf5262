//! Replay protection for webhook deliveries.

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::time::{Duration, Instant};

/// Default window during which a delivery signature may not be reused
pub const DEFAULT_REPLAY_WINDOW: Duration = Duration::from_secs(10 * 60);

/// Remembers accepted delivery signatures for a fixed window.
///
/// A key is claimed before processing and released again if processing
/// fails, so a sender's retry of a failed delivery is not mistaken for a
/// replay.
pub struct ReplayGuard {
    seen: DashMap<String, Instant>,
    window: Duration,
}

impl ReplayGuard {
    #[must_use]
    pub fn new(window: Duration) -> Self {
        Self {
            seen: DashMap::new(),
            window,
        }
    }

    /// Claim a key. Returns `false` if it was claimed within the window.
    pub fn try_claim(&self, key: &str) -> bool {
        self.prune();
        let now = Instant::now();
        match self.seen.entry(key.to_string()) {
            Entry::Occupied(mut entry) => {
                if now.duration_since(*entry.get()) < self.window {
                    false
                } else {
                    entry.insert(now);
                    true
                }
            }
            Entry::Vacant(entry) => {
                entry.insert(now);
                true
            }
        }
    }

    /// Forget a key so the next delivery carrying it is processed
    pub fn release(&self, key: &str) {
        self.seen.remove(key);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.seen.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }

    fn prune(&self) {
        let window = self.window;
        self.seen.retain(|_, claimed_at| claimed_at.elapsed() < window);
    }
}

impl Default for ReplayGuard {
    fn default() -> Self {
        Self::new(DEFAULT_REPLAY_WINDOW)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_claim_within_window_is_rejected() {
        let guard = ReplayGuard::default();
        assert!(guard.try_claim("payment:abc"));
        assert!(!guard.try_claim("payment:abc"));
        assert!(guard.try_claim("payment:def"));
        assert_eq!(guard.len(), 2);
    }

    #[test]
    fn test_release_allows_reprocessing() {
        let guard = ReplayGuard::default();
        assert!(guard.try_claim("solana:abc"));
        guard.release("solana:abc");
        assert!(guard.try_claim("solana:abc"));
    }

    #[test]
    fn test_expired_claims_are_pruned() {
        let guard = ReplayGuard::new(Duration::from_millis(20));
        assert!(guard.try_claim("k"));
        std::thread::sleep(Duration::from_millis(40));
        assert!(guard.try_claim("k"));
        assert_eq!(guard.len(), 1);
    }

    #[test]
    fn test_zero_window_never_blocks() {
        let guard = ReplayGuard::new(Duration::ZERO);
        assert!(guard.try_claim("k"));
        assert!(guard.try_claim("k"));
    }
}
