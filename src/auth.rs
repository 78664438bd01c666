//! Re-authentication retry policy.
//!
//! The counter and the decision are plain values so the policy can be
//! exercised without a network or a client. The client owns the only
//! mutable copy and updates it under a lock.

use crate::config::DEFAULT_MAX_REAUTH_RETRIES;

/// Number of re-authentication attempts since the last success.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetryCounter {
    pub attempts: u32,
}

impl RetryCounter {
    /// Counter after one more attempt has been started.
    pub fn begin_attempt(self) -> Self {
        Self {
            attempts: self.attempts.saturating_add(1),
        }
    }
}

/// How a background re-authentication request ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReauthOutcome {
    Succeeded,
    Failed,
}

/// What the client does next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReauthDecision {
    /// A fresh credential was stored.
    Recovered,
    /// Attempt failed but the budget is not spent; the next 401 tries again.
    Retry,
    /// Budget exhausted: tear down the session and go to the login route.
    Abandon,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReauthPolicy {
    pub max_retries: u32,
}

impl Default for ReauthPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_REAUTH_RETRIES,
        }
    }
}

impl ReauthPolicy {
    pub fn new(max_retries: u32) -> Self {
        Self { max_retries }
    }

    /// Decide after an attempt finished. Success resets the counter; failure
    /// leaves it as is and abandons once it exceeds `max_retries`.
    pub fn decide(&self, counter: RetryCounter, outcome: ReauthOutcome) -> (ReauthDecision, RetryCounter) {
        match outcome {
            ReauthOutcome::Succeeded => (ReauthDecision::Recovered, RetryCounter::default()),
            ReauthOutcome::Failed if counter.attempts > self.max_retries => (ReauthDecision::Abandon, counter),
            ReauthOutcome::Failed => (ReauthDecision::Retry, counter),
        }
    }
}
