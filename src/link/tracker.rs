//! Link state tracking and retry decisions
//!
//! Pure bookkeeping for the two link axes (network association and broker
//! session): last observed levels, attempt/success timestamps, the retry
//! policy and the edge computation the supervisor acts on. No I/O happens
//! here.

use serde::{Deserialize, Serialize};

/// Default delay between session connection attempts
pub const DEFAULT_SESSION_RETRY_DELAY_MS: u64 = 30_000;

/// Observed change of a boolean link level between two ticks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Edge {
    /// Down -> Up
    Established,
    /// Up -> Down
    Lost,
    /// Up -> Up
    StableUp,
    /// Down -> Down
    StableDown,
}

impl Edge {
    pub fn between(previous: bool, current: bool) -> Self {
        match (previous, current) {
            (false, true) => Edge::Established,
            (true, false) => Edge::Lost,
            (true, true) => Edge::StableUp,
            (false, false) => Edge::StableDown,
        }
    }

    pub fn is_transition(self) -> bool {
        matches!(self, Edge::Established | Edge::Lost)
    }
}

/// Coarse phase of one link axis, for status reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkPhase {
    Down,
    Connecting,
    Up,
}

/// Session retry policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconnectConfig {
    /// Escalating delays in milliseconds, one per consecutive failed attempt
    #[serde(default)]
    pub backoff_pattern: Vec<u64>,
    /// Delay to use once the pattern is exhausted (or when it is empty)
    #[serde(default = "default_sustained_delay")]
    pub sustained_delay: u64,
}

fn default_sustained_delay() -> u64 {
    DEFAULT_SESSION_RETRY_DELAY_MS
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            backoff_pattern: Vec::new(),
            sustained_delay: DEFAULT_SESSION_RETRY_DELAY_MS,
        }
    }
}

impl ReconnectConfig {
    /// Fixed delay between every attempt
    pub fn fixed(delay_ms: u64) -> Self {
        Self {
            backoff_pattern: Vec::new(),
            sustained_delay: delay_ms,
        }
    }

    /// Delay to wait after the given (1-based) failed attempt
    pub fn calculate_backoff_delay(&self, attempt: u32) -> u64 {
        let index = attempt.saturating_sub(1) as usize;
        self.backoff_pattern
            .get(index)
            .copied()
            .unwrap_or(self.sustained_delay)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.sustained_delay == 0 {
            return Err("sustained_delay must be greater than 0".to_string());
        }
        if self.backoff_pattern.contains(&0) {
            return Err("backoff_pattern entries must be greater than 0".to_string());
        }
        Ok(())
    }
}

/// Outcome of asking whether a session attempt may start now
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Start attempt number `attempt` (1-based since the last success)
    Proceed { attempt: u32 },
    /// Still inside the retry delay
    Wait { remaining_ms: u64 },
}

/// Last observed state of both link axes
///
/// Timestamps are monotonic milliseconds; `None` means "never".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkState {
    pub network_associated: bool,
    pub session_established: bool,
    pub last_network_attempt_at: Option<u64>,
    pub last_network_success_at: Option<u64>,
    pub last_session_attempt_at: Option<u64>,
    /// Session attempts since the session was last established
    pub session_attempts: u32,
    /// Number of session establishments since start
    pub established_count: u32,
}

impl LinkState {
    pub fn new() -> Self {
        Self::default()
    }

    /// An association attempt was started and its outcome not yet observed
    pub fn network_attempt_outstanding(&self) -> bool {
        match (self.last_network_attempt_at, self.last_network_success_at) {
            (None, _) => false,
            (Some(_), None) => true,
            (Some(attempt), Some(success)) => attempt > success,
        }
    }

    /// A new association attempt may start
    ///
    /// True when nothing was ever attempted, or when the last success is at
    /// least as recent as the last attempt (the attempt concluded).
    pub fn may_attempt_association(&self) -> bool {
        !self.network_attempt_outstanding()
    }

    pub fn record_network_attempt(&mut self, now: u64) {
        self.last_network_attempt_at = Some(now);
    }

    pub fn record_network_success(&mut self, now: u64) {
        self.last_network_success_at = Some(now);
    }

    /// Decide whether a session attempt may start at `now`
    ///
    /// The delay must be strictly exceeded, measured from the last attempt.
    pub fn session_retry_decision(&self, now: u64, policy: &ReconnectConfig) -> RetryDecision {
        let next_attempt = self.session_attempts.saturating_add(1);
        let Some(last) = self.last_session_attempt_at else {
            return RetryDecision::Proceed {
                attempt: next_attempt,
            };
        };

        let delay = policy.calculate_backoff_delay(self.session_attempts);
        let elapsed = now.saturating_sub(last);
        if elapsed > delay {
            RetryDecision::Proceed {
                attempt: next_attempt,
            }
        } else {
            RetryDecision::Wait {
                remaining_ms: delay - elapsed + 1,
            }
        }
    }

    pub fn record_session_attempt(&mut self, now: u64) {
        self.last_session_attempt_at = Some(now);
        self.session_attempts = self.session_attempts.saturating_add(1);
    }

    /// Count an establishment and reset the attempt escalation
    pub fn record_session_established(&mut self) {
        self.established_count = self.established_count.wrapping_add(1);
        self.session_attempts = 0;
    }

    pub fn network_phase(&self) -> LinkPhase {
        if self.network_associated {
            LinkPhase::Up
        } else if self.network_attempt_outstanding() {
            LinkPhase::Connecting
        } else {
            LinkPhase::Down
        }
    }

    pub fn session_phase(&self) -> LinkPhase {
        if self.session_established {
            LinkPhase::Up
        } else if self.network_associated && self.session_attempts > 0 {
            LinkPhase::Connecting
        } else {
            LinkPhase::Down
        }
    }
}
