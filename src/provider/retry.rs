//! Bounded retry policy for status polling.
//!
//! The gateway never retries on its own; the orchestrator owns a
//! `PollTracker` per job and consults it after every poll.

use std::time::Duration;

use tokio::time::Instant;

/// Default polling interval for status checks (5 seconds).
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Default number of polls before a job is abandoned.
pub const DEFAULT_MAX_POLL_ATTEMPTS: u32 = 120;

/// Default number of consecutive transport errors tolerated while polling.
pub const DEFAULT_MAX_CONSECUTIVE_ERRORS: u32 = 5;

/// Default wall-clock limit for a single job (15 minutes).
pub const DEFAULT_DEADLINE: Duration = Duration::from_secs(900);

/// Limits applied to the poll loop of one job.
#[derive(Debug, Clone, PartialEq)]
pub struct PollPolicy {
    /// Delay between consecutive polls.
    pub interval: Duration,
    /// Maximum number of polls, successful or not.
    pub max_attempts: u32,
    /// Maximum number of transport errors in a row.
    pub max_consecutive_errors: u32,
    /// Wall-clock limit measured from the start of polling.
    pub deadline: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            max_attempts: DEFAULT_MAX_POLL_ATTEMPTS,
            max_consecutive_errors: DEFAULT_MAX_CONSECUTIVE_ERRORS,
            deadline: DEFAULT_DEADLINE,
        }
    }
}

/// Why a poll loop gave up.
#[derive(Debug, Clone, PartialEq)]
pub enum PollExhausted {
    /// Too many transport errors in a row.
    ConsecutiveErrors { attempts: u32 },
    /// The attempt budget ran out while the job was still running.
    Attempts { attempts: u32 },
    /// The wall-clock deadline passed.
    Deadline { elapsed: Duration },
}

/// Per-job bookkeeping against a `PollPolicy`.
#[derive(Debug, Clone)]
pub struct PollTracker {
    policy: PollPolicy,
    started: Instant,
    attempts: u32,
    consecutive_errors: u32,
}

impl PollTracker {
    /// Budgets of zero are raised to one so a single poll is always allowed.
    pub fn start(mut policy: PollPolicy) -> Self {
        policy.max_attempts = policy.max_attempts.max(1);
        policy.max_consecutive_errors = policy.max_consecutive_errors.max(1);
        Self {
            policy,
            started: Instant::now(),
            attempts: 0,
            consecutive_errors: 0,
        }
    }

    pub fn policy(&self) -> &PollPolicy {
        &self.policy
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn consecutive_errors(&self) -> u32 {
        self.consecutive_errors
    }

    /// Instant at which the wall-clock deadline passes.
    pub fn deadline_at(&self) -> Instant {
        self.started + self.policy.deadline
    }

    /// Time left before the deadline, zero once it has passed.
    pub fn remaining(&self) -> Duration {
        self.policy.deadline.saturating_sub(self.started.elapsed())
    }

    /// Record a poll that reached the provider.
    pub fn record_response(&mut self) {
        self.attempts = self.attempts.saturating_add(1);
        self.consecutive_errors = 0;
    }

    /// Record a poll that failed in transport.
    pub fn record_error(&mut self) {
        self.attempts = self.attempts.saturating_add(1);
        self.consecutive_errors = self.consecutive_errors.saturating_add(1);
    }

    /// Returns the reason to stop polling, if any limit has been reached.
    pub fn exhausted(&self) -> Option<PollExhausted> {
        if self.consecutive_errors >= self.policy.max_consecutive_errors {
            return Some(PollExhausted::ConsecutiveErrors {
                attempts: self.attempts,
            });
        }

        let elapsed = self.started.elapsed();
        if elapsed >= self.policy.deadline {
            return Some(PollExhausted::Deadline { elapsed });
        }

        if self.attempts >= self.policy.max_attempts {
            return Some(PollExhausted::Attempts {
                attempts: self.attempts,
            });
        }

        None
    }
}

/// Parse the Retry-After header value to get retry delay in seconds.
///
/// Only the integer seconds format is understood. Returns None if the header
/// is missing or cannot be parsed.
pub fn parse_retry_after(response: &reqwest::Response) -> Option<u64> {
    response
        .headers()
        .get("retry-after")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.trim().parse::<u64>().ok())
}

/// Delay before the next poll: the policy interval, stretched to honor a
/// provider-supplied Retry-After, and never past the poll deadline.
pub fn next_poll_delay(
    interval: Duration,
    retry_after_secs: Option<u64>,
    remaining: Duration,
) -> Duration {
    let delay = match retry_after_secs {
        Some(secs) => interval.max(Duration::from_secs(secs)),
        None => interval,
    };
    delay.min(remaining)
}
