//! Job states and the snapshots published to observers.

use std::fmt;

use crate::ledger::LedgerError;
use crate::provider::{PollExhausted, ProviderError};

/// Lifecycle state of the session's generation job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum JobState {
    #[default]
    Idle,
    Submitting,
    Polling,
    Completed,
    Failed,
}

impl JobState {
    /// A job is in flight and owns the session.
    pub fn is_active(self) -> bool {
        matches!(self, JobState::Submitting | JobState::Polling)
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Completed | JobState::Failed)
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            JobState::Idle => "idle",
            JobState::Submitting => "submitting",
            JobState::Polling => "polling",
            JobState::Completed => "completed",
            JobState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Why a job ended in `Failed`.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum JobFailure {
    #[error("API key not configured")]
    MissingCredential,

    #[error("Request rejected: {message}")]
    Rejected { message: String },

    #[error("Provider unavailable: {message}")]
    ProviderUnavailable { message: String },

    #[error("Generation failed: {message}")]
    GenerationFailed { message: String },

    #[error("Provider unreachable after {attempts} status checks")]
    PollingExhausted { attempts: u32 },

    #[error("Generation timed out")]
    TimedOut,

    #[error("Could not settle credits: {message}")]
    Settlement { message: String },
}

impl From<&ProviderError> for JobFailure {
    fn from(error: &ProviderError) -> Self {
        match error {
            ProviderError::MissingCredential => JobFailure::MissingCredential,
            ProviderError::InvalidRequest { message, .. } => JobFailure::Rejected {
                message: message.clone(),
            },
            other => JobFailure::ProviderUnavailable {
                message: other.to_string(),
            },
        }
    }
}

impl From<&LedgerError> for JobFailure {
    fn from(error: &LedgerError) -> Self {
        JobFailure::Settlement {
            message: error.to_string(),
        }
    }
}

impl From<PollExhausted> for JobFailure {
    fn from(reason: PollExhausted) -> Self {
        match reason {
            PollExhausted::ConsecutiveErrors { attempts } => {
                JobFailure::PollingExhausted { attempts }
            }
            PollExhausted::Attempts { .. } | PollExhausted::Deadline { .. } => JobFailure::TimedOut,
        }
    }
}

/// Point-in-time view of the job, as shown to the user.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct JobSnapshot {
    pub state: JobState,
    /// Provider job id; set from `Polling` on.
    pub job_id: Option<String>,
    /// Present only in `Completed`.
    pub result_url: Option<String>,
    /// Present only in `Failed`.
    pub failure: Option<JobFailure>,
    /// Set when `Completed` was reached through the placeholder fallback.
    pub fallback_reason: Option<String>,
    /// Last balance the orchestrator observed.
    pub balance: Option<u32>,
}

impl JobSnapshot {
    pub fn used_fallback(&self) -> bool {
        self.fallback_reason.is_some()
    }
}
