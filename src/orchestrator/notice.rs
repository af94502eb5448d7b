//! User-facing notices for rejected submissions and finished jobs.

use std::fmt;

use super::state::{JobFailure, JobSnapshot, JobState};
use super::OrchestratorError;
use crate::ledger::GENERATION_COST;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Success,
    Warning,
    Error,
}

/// A dismissible message for the user.
#[derive(Debug, Clone, PartialEq)]
pub struct Notice {
    pub severity: Severity,
    pub title: String,
    pub description: String,
}

impl Notice {
    fn new(severity: Severity, title: &str, description: impl Into<String>) -> Self {
        Self {
            severity,
            title: title.to_string(),
            description: description.into(),
        }
    }

    /// The notice for a snapshot, if its state warrants one.
    pub fn for_snapshot(snapshot: &JobSnapshot) -> Option<Self> {
        match snapshot.state {
            JobState::Completed if snapshot.used_fallback() => Some(Self::new(
                Severity::Warning,
                "Video generated with placeholder",
                "The video provider could not be reached, so a sample video was used",
            )),
            JobState::Completed => Some(Self::new(
                Severity::Success,
                "Video generated!",
                "Your UGC video has been created successfully",
            )),
            JobState::Failed => Some(match &snapshot.failure {
                Some(JobFailure::Settlement { .. }) => Self::new(
                    Severity::Error,
                    "Something went wrong",
                    "Your video could not be finalized. No credits were charged",
                ),
                Some(failure) => Self::new(Severity::Error, "Generation failed", failure.to_string()),
                None => Self::new(Severity::Error, "Generation failed", "Unknown error"),
            }),
            JobState::Idle | JobState::Submitting | JobState::Polling => None,
        }
    }
}

impl From<&OrchestratorError> for Notice {
    fn from(error: &OrchestratorError) -> Self {
        match error {
            OrchestratorError::NotIdle(state) if state.is_active() => Self::new(
                Severity::Warning,
                "Generation in progress",
                "Wait for the current video to finish or reset it first",
            ),
            OrchestratorError::NotIdle(_) => Self::new(
                Severity::Info,
                "Start over",
                "Reset the finished job before creating another video",
            ),
            OrchestratorError::NoAvatar => Self::new(
                Severity::Error,
                "Avatar required",
                "Please select an avatar first",
            ),
            OrchestratorError::NoVoice => Self::new(
                Severity::Error,
                "Voice required",
                "Please select a voice for your video",
            ),
            OrchestratorError::EmptyScript => Self::new(
                Severity::Error,
                "Script required",
                "Please write a script for your video",
            ),
            OrchestratorError::ScriptTooLong { max, .. } => Self::new(
                Severity::Error,
                "Script too long",
                format!("Scripts are limited to {} characters", max),
            ),
            OrchestratorError::InsufficientCredits { .. } => Self::new(
                Severity::Error,
                "Insufficient credits",
                format!(
                    "You need at least {} credits to generate a video",
                    GENERATION_COST
                ),
            ),
            OrchestratorError::MissingCredential => Self::new(
                Severity::Error,
                "API key required",
                "Set your video provider API key before generating",
            ),
            OrchestratorError::Ledger(_) => Self::new(
                Severity::Error,
                "Something went wrong",
                "Your credit balance could not be read",
            ),
        }
    }
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.title, self.description)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guard_notices() {
        let notice = Notice::from(&OrchestratorError::NoVoice);
        assert_eq!(notice.title, "Voice required");
        assert_eq!(notice.severity, Severity::Error);

        let notice = Notice::from(&OrchestratorError::InsufficientCredits {
            balance: 5,
            required: 10,
        });
        assert_eq!(
            notice.to_string(),
            "Insufficient credits: You need at least 10 credits to generate a video"
        );

        let busy = Notice::from(&OrchestratorError::NotIdle(JobState::Polling));
        assert_eq!(busy.severity, Severity::Warning);
        let done = Notice::from(&OrchestratorError::NotIdle(JobState::Completed));
        assert_eq!(done.severity, Severity::Info);
    }

    #[test]
    fn test_snapshot_notices() {
        assert!(Notice::for_snapshot(&JobSnapshot::default()).is_none());

        let completed = JobSnapshot {
            state: JobState::Completed,
            result_url: Some("https://x/video.mp4".to_string()),
            ..Default::default()
        };
        assert_eq!(
            Notice::for_snapshot(&completed).map(|n| n.severity),
            Some(Severity::Success)
        );

        let fallback = JobSnapshot {
            fallback_reason: Some("down".to_string()),
            ..completed
        };
        assert_eq!(
            Notice::for_snapshot(&fallback).map(|n| n.severity),
            Some(Severity::Warning)
        );

        let settlement = JobSnapshot {
            state: JobState::Failed,
            failure: Some(JobFailure::Settlement {
                message: "disk".to_string(),
            }),
            ..Default::default()
        };
        let notice = Notice::for_snapshot(&settlement).unwrap();
        assert_eq!(notice.title, "Something went wrong");
        assert!(!notice.description.contains("disk"));
    }
}
