//! Retry policy for the 401-refresh loops.
//!
//! Both transport decorators use the same bounded policy: a fixed number of
//! send attempts with a fixed, cancellable wait between them. The wait uses
//! `tokio::time`, so tests drive it with a paused clock instead of real delays.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::errors::TransportError;

/// Default number of send attempts per request.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
/// Default wait between attempts in milliseconds.
pub const DEFAULT_BACKOFF_MS: u64 = 2000;

/// Bounded retry policy with a fixed backoff.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryPolicy {
    /// Maximum number of send attempts (default: 3).
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Wait between attempts in ms (default: 2000).
    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: u64,
}

fn default_max_attempts() -> u32 {
    DEFAULT_MAX_ATTEMPTS
}
fn default_backoff_ms() -> u64 {
    DEFAULT_BACKOFF_MS
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            backoff_ms: DEFAULT_BACKOFF_MS,
        }
    }
}

impl RetryPolicy {
    /// Create a policy. `max_attempts` is clamped to at least 1.
    pub fn new(max_attempts: u32, backoff: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            #[allow(clippy::cast_possible_truncation)]
            backoff_ms: backoff.as_millis() as u64,
        }
    }

    /// Effective attempt count (never zero).
    pub fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// Backoff as a [`Duration`].
    pub fn backoff(&self) -> Duration {
        Duration::from_millis(self.backoff_ms)
    }

    /// Whether `attempt` (zero-based) is the final one.
    pub fn is_last_attempt(&self, attempt: u32) -> bool {
        attempt + 1 >= self.attempts()
    }

    /// Wait for the backoff interval, returning early with
    /// [`TransportError::Cancelled`] if `cancel` fires.
    pub async fn wait(&self, cancel: &CancellationToken) -> Result<(), TransportError> {
        tokio::select! {
            biased;
            () = cancel.cancelled() => Err(TransportError::Cancelled),
            () = tokio::time::sleep(self.backoff()) => Ok(()),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn defaults() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.backoff(), Duration::from_secs(2));
    }

    #[test]
    fn serde_defaults() {
        let policy: RetryPolicy = serde_json::from_str("{}").unwrap();
        assert_eq!(policy, RetryPolicy::default());
    }

    #[test]
    fn zero_attempts_clamped() {
        let policy = RetryPolicy::new(0, Duration::ZERO);
        assert_eq!(policy.attempts(), 1);
        assert!(policy.is_last_attempt(0));
    }

    #[test]
    fn last_attempt_detection() {
        let policy = RetryPolicy::default();
        assert!(!policy.is_last_attempt(0));
        assert!(!policy.is_last_attempt(1));
        assert!(policy.is_last_attempt(2));
    }

    #[tokio::test(start_paused = true)]
    async fn wait_elapses_backoff() {
        let policy = RetryPolicy::default();
        let start = tokio::time::Instant::now();
        policy.wait(&CancellationToken::new()).await.unwrap();
        assert!(start.elapsed() >= Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn wait_interrupted_by_cancel() {
        let policy = RetryPolicy::new(3, Duration::from_secs(60));
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        let _handle = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            trigger.cancel();
        });

        let start = tokio::time::Instant::now();
        let result = policy.wait(&cancel).await;
        assert_matches!(result, Err(TransportError::Cancelled));
        assert!(start.elapsed() < Duration::from_secs(60));
    }
}
