//! Free-tier cooldown tracking
//!
//! Only the most recent grant per agent matters; an agent with no grant
//! history is never in cooldown.

use crate::database::LedgerStore;
use crate::error::FaucetResult;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Answers "is this agent still in cooldown?" over the grants tree
pub struct CooldownTracker {
    store: Arc<LedgerStore>,
}

impl CooldownTracker {
    pub fn new(store: Arc<LedgerStore>) -> Self {
        Self { store }
    }

    /// Record a free-tier grant at `timestamp`
    pub fn record_grant(&self, agent_name: &str, timestamp: i64) -> FaucetResult<()> {
        debug!("Recording free-tier grant: agent={} ts={}", agent_name, timestamp);
        self.store.put_grant(agent_name, timestamp)
    }

    /// True iff a prior grant exists inside the window
    pub fn is_in_cooldown(&self, agent_name: &str, window: Duration) -> FaucetResult<bool> {
        Ok(self.remaining(agent_name, window)?.is_some())
    }

    /// Time left in the window, `None` when the agent is eligible
    pub fn remaining(&self, agent_name: &str, window: Duration) -> FaucetResult<Option<Duration>> {
        let last = match self.store.last_grant(agent_name)? {
            Some(ts) => ts,
            None => return Ok(None),
        };

        let elapsed = Utc::now().timestamp().saturating_sub(last).max(0) as u64;
        let window_secs = window.as_secs();

        if elapsed < window_secs {
            Ok(Some(Duration::from_secs(window_secs - elapsed)))
        } else {
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn tracker() -> (CooldownTracker, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(LedgerStore::open(dir.path()).unwrap());
        (CooldownTracker::new(store), dir)
    }

    #[test]
    fn test_never_in_cooldown_before_first_grant() {
        let (tracker, _dir) = tracker();
        let window = Duration::from_secs(3600);

        assert!(!tracker.is_in_cooldown("alice", window).unwrap());
        assert_eq!(tracker.remaining("alice", window).unwrap(), None);
    }

    #[test]
    fn test_in_cooldown_immediately_after_grant() {
        let (tracker, _dir) = tracker();
        let window = Duration::from_secs(3600);

        tracker.record_grant("alice", Utc::now().timestamp()).unwrap();

        assert!(tracker.is_in_cooldown("alice", window).unwrap());
        let remaining = tracker.remaining("alice", window).unwrap().unwrap();
        assert!(remaining <= window);
        assert!(remaining.as_secs() > 3590);
    }

    #[test]
    fn test_eligible_again_after_window_elapses() {
        let (tracker, _dir) = tracker();
        let window = Duration::from_secs(3600);

        let past = Utc::now().timestamp() - 3601;
        tracker.record_grant("alice", past).unwrap();

        assert!(!tracker.is_in_cooldown("alice", window).unwrap());
    }

    #[test]
    fn test_cooldown_is_per_agent() {
        let (tracker, _dir) = tracker();
        let window = Duration::from_secs(3600);

        tracker.record_grant("alice", Utc::now().timestamp()).unwrap();

        assert!(tracker.is_in_cooldown("alice", window).unwrap());
        assert!(!tracker.is_in_cooldown("bob", window).unwrap());
    }
}
