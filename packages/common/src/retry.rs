use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

/// One failed attempt of a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryAttempt {
    /// 1-based attempt number.
    pub attempt: u8,
    pub error: String,
    pub timestamp: DateTime<Utc>,
}

impl RetryAttempt {
    pub fn new(attempt: u8, error: impl Into<String>) -> Self {
        Self {
            attempt,
            error: error.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Result of recording a failure in the [`RetryTracker`].
#[derive(Debug, Clone)]
pub enum RetryDecision {
    Retry {
        attempt: u8,
        history: Vec<RetryAttempt>,
    },
    Exhausted { history: Vec<RetryAttempt> },
}

/// Failure history of in-flight requests, keyed by request key.
#[derive(Debug, Default)]
pub struct RetryTracker {
    state: HashMap<String, Vec<RetryAttempt>>,
    max_retries: u8,
}

impl RetryTracker {
    pub fn new(max_retries: u8) -> Self {
        Self {
            state: HashMap::new(),
            max_retries,
        }
    }

    /// Record a failure for `key` and decide whether another attempt is allowed.
    ///
    /// With `max_retries = n` a request gets `n + 1` attempts in total. The key is
    /// forgotten once it is exhausted.
    pub fn record_failure(&mut self, key: &str, error: &str) -> RetryDecision {
        let history = self.state.entry(key.to_string()).or_default();
        let attempt = u8::try_from(history.len() + 1).unwrap_or(u8::MAX);
        history.push(RetryAttempt::new(attempt, error));

        if attempt <= self.max_retries {
            RetryDecision::Retry {
                attempt,
                history: history.clone(),
            }
        } else {
            let history = self.state.remove(key).unwrap_or_default();
            RetryDecision::Exhausted { history }
        }
    }

    pub fn clear(&mut self, key: &str) {
        self.state.remove(key);
    }

    pub fn len(&self) -> usize {
        self.state.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.is_empty()
    }
}

/// Exponential backoff with 0-25% jitter.
///
/// Formula: `min(base_ms * 2^(attempt-1) + jitter, max_ms)`
pub fn calculate_backoff(attempt: u8, base_ms: u64, max_ms: u64) -> Duration {
    if attempt == 0 {
        return Duration::ZERO;
    }

    let exp_factor = 2u64.saturating_pow((attempt - 1) as u32);
    let delay_ms = base_ms.saturating_mul(exp_factor);

    let jitter = if delay_ms > 0 {
        rand::rng().random_range(0..=delay_ms / 4)
    } else {
        0
    };

    Duration::from_millis(delay_ms.saturating_add(jitter).min(max_ms))
}

/// Clears a key's retry state when dropped, unless defused.
///
/// Keeps the tracker from holding history of a request whose future was dropped
/// between attempts.
pub struct RetryCleanupGuard<'a> {
    tracker: &'a Arc<Mutex<RetryTracker>>,
    key: String,
    defused: bool,
}

impl<'a> RetryCleanupGuard<'a> {
    pub fn new(tracker: &'a Arc<Mutex<RetryTracker>>, key: impl Into<String>) -> Self {
        Self {
            tracker,
            key: key.into(),
            defused: false,
        }
    }

    pub fn defuse(&mut self) {
        self.defused = true;
    }
}

impl Drop for RetryCleanupGuard<'_> {
    fn drop(&mut self) {
        if !self.defused
            && let Ok(mut tracker) = self.tracker.try_lock()
        {
            tracker.clear(&self.key);
        }
    }
}
