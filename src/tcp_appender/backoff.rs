//! Linear backoff state machine used while reconnecting.

use std::time::Duration;

use super::config::BackoffPolicy;

/// Produces the delays between consecutive reconnect attempts.
///
/// The delay starts at zero and grows by `step` before every retry until it
/// reaches `cap`; the sequence is deterministic for a given failure count.
#[derive(Clone, Debug)]
pub struct BackoffState {
    policy: BackoffPolicy,
    current: Duration,
}

impl BackoffState {
    /// Create a new state machine from the supplied policy.
    pub fn new(policy: BackoffPolicy) -> Self {
        Self {
            policy,
            current: Duration::ZERO,
        }
    }

    /// Delay to sleep before the next attempt.
    pub fn next_sleep(&mut self) -> Duration {
        self.current = self
            .current
            .saturating_add(self.policy.step)
            .min(self.policy.cap);
        self.current
    }
}
