//! JobOrchestrator - drives a generation job from submission to a terminal state.
//!
//! One job may be active per orchestrator. Submission is guarded, the status
//! poll runs as a spawned task that is aborted when the job leaves `Polling`,
//! and credits are debited exactly once, on the transition to `Completed`.
//!
//! ```text
//! Idle --submit--> Submitting --job id--> Polling --completed--> Completed
//!                      |                     |
//!                      |                     +--failed / exhausted--> Failed
//!                      +--error--> Failed (--fallback--> Completed)
//! Completed | Failed --reset--> Idle
//! ```

mod notice;
mod state;

pub use notice::{Notice, Severity};
pub use state::{JobFailure, JobSnapshot, JobState};

use std::sync::{Arc, Mutex as StdMutex};

use tokio::sync::{watch, Mutex};
use tokio::task::AbortHandle;
use tokio::time::Instant;

use crate::ledger::{CreditLedger, LedgerError, GENERATION_COST};
use crate::provider::{
    next_poll_delay, JobRequest, JobStatus, PollPolicy, PollTracker, ProviderError,
    ProviderGateway,
};
use crate::session::{Session, MAX_SCRIPT_CHARS};

/// Placeholder used when the provider cannot be reached.
pub const DEFAULT_PLACEHOLDER_URL: &str = "https://example.com/video.mp4";

/// What to do when submission fails because the provider is unavailable.
#[derive(Debug, Clone, PartialEq)]
pub struct FallbackPolicy {
    /// Resolve to `Completed` with `placeholder_url` instead of `Failed`.
    pub enabled: bool,
    pub placeholder_url: String,
}

impl Default for FallbackPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            placeholder_url: DEFAULT_PLACEHOLDER_URL.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct OrchestratorSettings {
    pub poll: PollPolicy,
    pub fallback: FallbackPolicy,
}

/// Whether the poll loop should keep going after a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollControl {
    Continue,
    Stop,
}

/// Submission rejected before anything was sent to the provider.
#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    #[error("Cannot start a new job while the current one is {0}")]
    NotIdle(JobState),

    #[error("No avatar selected")]
    NoAvatar,

    #[error("No voice selected")]
    NoVoice,

    #[error("Script is empty")]
    EmptyScript,

    #[error("Script is {chars} characters, the limit is {max}")]
    ScriptTooLong { chars: usize, max: usize },

    #[error("Insufficient credits: {balance} available, {required} required")]
    InsufficientCredits { balance: u32, required: u32 },

    #[error("Provider API key is not set")]
    MissingCredential,

    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

#[derive(Default)]
struct Inner {
    state: JobState,
    account_id: Option<String>,
    job_id: Option<String>,
    result_url: Option<String>,
    failure: Option<JobFailure>,
    fallback_reason: Option<String>,
    balance: Option<u32>,
    /// Bumped whenever the current job is replaced or cancelled.
    epoch: u64,
    tracker: Option<PollTracker>,
}

impl Inner {
    fn snapshot(&self) -> JobSnapshot {
        JobSnapshot {
            state: self.state,
            job_id: self.job_id.clone(),
            result_url: self.result_url.clone(),
            failure: self.failure.clone(),
            fallback_reason: self.fallback_reason.clone(),
            balance: self.balance,
        }
    }

    fn fail(&mut self, failure: JobFailure) {
        self.state = JobState::Failed;
        self.result_url = None;
        self.fallback_reason = None;
        self.failure = Some(failure);
    }
}

struct Shared {
    gateway: Arc<dyn ProviderGateway>,
    ledger: Arc<CreditLedger>,
    settings: OrchestratorSettings,
    inner: Mutex<Inner>,
    updates: watch::Sender<JobSnapshot>,
    /// Kept outside `inner` so the task can be aborted without the async lock.
    poll_task: StdMutex<Option<AbortHandle>>,
}

impl Shared {
    fn publish(&self, inner: &Inner) {
        self.updates.send_replace(inner.snapshot());
    }

    fn abort_poll_task(&self) {
        let mut task = self.poll_task.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(handle) = task.take() {
            handle.abort();
        }
    }

    /// Must only be called after the last await of the calling task, since
    /// the handle may belong to that task.
    fn stop_polling(&self, inner: &mut Inner) {
        inner.tracker = None;
        self.abort_poll_task();
    }

    /// Debit the generation cost and move to `Completed`, or to `Failed` if
    /// the debit does not go through.
    async fn settle(&self, inner: &mut Inner, result_url: String, fallback_reason: Option<String>) {
        let Some(account_id) = inner.account_id.clone() else {
            inner.fail(JobFailure::Settlement {
                message: "no account attached to job".to_string(),
            });
            return;
        };

        match self.ledger.debit(&account_id, GENERATION_COST).await {
            Ok(balance) => {
                inner.state = JobState::Completed;
                inner.result_url = Some(result_url);
                inner.failure = None;
                inner.fallback_reason = fallback_reason;
                inner.balance = Some(balance);
                log::info!("Job settled, {} credits remaining", balance);
            }
            Err(e) => {
                log::error!("Job finished but credits could not be settled: {}", e);
                inner.fail(JobFailure::from(&e));
            }
        }
    }

    async fn finish_submission(
        self: &Arc<Self>,
        epoch: u64,
        outcome: Result<String, ProviderError>,
    ) {
        let mut inner = self.inner.lock().await;
        if inner.epoch != epoch || inner.state != JobState::Submitting {
            log::debug!("Discarding submission result for a cancelled job");
            return;
        }

        match outcome {
            Ok(job_id) => {
                log::info!("Polling job {} every {:?}", job_id, self.settings.poll.interval);
                let tracker = PollTracker::start(self.settings.poll.clone());
                let deadline = tracker.deadline_at();
                inner.state = JobState::Polling;
                inner.job_id = Some(job_id.clone());
                inner.tracker = Some(tracker);
                let task = tokio::spawn(poll_loop(Arc::clone(self), job_id, deadline));
                self.abort_poll_task();
                *self.poll_task.lock().unwrap_or_else(|e| e.into_inner()) =
                    Some(task.abort_handle());
            }
            Err(error) => {
                log::warn!("Job submission failed: {}", error);
                inner.fail(JobFailure::from(&error));
                self.publish(&inner);

                if error.is_unavailable() && self.settings.fallback.enabled {
                    log::warn!("Provider unavailable, resolving with placeholder video");
                    let placeholder = self.settings.fallback.placeholder_url.clone();
                    self.settle(&mut inner, placeholder, Some(error.to_string()))
                        .await;
                }
            }
        }

        self.publish(&inner);
    }

    async fn handle_poll_response(
        &self,
        job_id: &str,
        outcome: Result<JobStatus, ProviderError>,
    ) -> PollControl {
        let mut inner = self.inner.lock().await;
        if inner.state != JobState::Polling || inner.job_id.as_deref() != Some(job_id) {
            log::debug!("Ignoring status for inactive job {}", job_id);
            return PollControl::Stop;
        }
        let Some(tracker) = inner.tracker.as_mut() else {
            return PollControl::Stop;
        };

        match outcome {
            Ok(JobStatus::Completed { video_url }) => {
                tracker.record_response();
                log::info!("Job {} completed: {}", job_id, video_url);
                self.settle(&mut inner, video_url, None).await;
            }
            Ok(JobStatus::Failed { error }) => {
                log::error!("Job {} failed: {}", job_id, error);
                inner.fail(JobFailure::GenerationFailed { message: error });
            }
            Ok(status) => {
                tracker.record_response();
                log::debug!("Job {} still running ({:?})", job_id, status);
                match tracker.exhausted() {
                    Some(reason) => {
                        log::error!("Giving up on job {}: {:?}", job_id, reason);
                        inner.fail(reason.into());
                    }
                    None => return PollControl::Continue,
                }
            }
            Err(e) if !e.is_unavailable() => {
                log::error!("Status check for job {} rejected: {}", job_id, e);
                inner.fail(JobFailure::from(&e));
            }
            Err(e) => {
                tracker.record_error();
                log::warn!(
                    "Status check for job {} failed ({} in a row): {}",
                    job_id,
                    tracker.consecutive_errors(),
                    e
                );
                match tracker.exhausted() {
                    Some(reason) => {
                        log::error!("Giving up on job {}: {:?}", job_id, reason);
                        inner.fail(reason.into());
                    }
                    None => return PollControl::Continue,
                }
            }
        }

        self.stop_polling(&mut inner);
        self.publish(&inner);
        PollControl::Stop
    }
}

/// Sleeps never extend past `deadline`, so the first status read after it
/// ends the job.
async fn poll_loop(shared: Arc<Shared>, job_id: String, deadline: Instant) {
    let interval = shared.settings.poll.interval;
    let remaining = || deadline.saturating_duration_since(Instant::now());
    let mut delay = interval.min(remaining());
    loop {
        tokio::time::sleep(delay).await;
        let outcome = shared.gateway.poll_status(&job_id).await;
        delay = next_poll_delay(
            interval,
            outcome.as_ref().err().and_then(ProviderError::retry_after_secs),
            remaining(),
        );
        if shared.handle_poll_response(&job_id, outcome).await == PollControl::Stop {
            break;
        }
    }
}

/// Drives generation jobs for one session.
pub struct JobOrchestrator {
    shared: Arc<Shared>,
}

impl JobOrchestrator {
    pub fn new(
        gateway: Arc<dyn ProviderGateway>,
        ledger: Arc<CreditLedger>,
        settings: OrchestratorSettings,
    ) -> Self {
        let (updates, _) = watch::channel(JobSnapshot::default());
        Self {
            shared: Arc::new(Shared {
                gateway,
                ledger,
                settings,
                inner: Mutex::new(Inner::default()),
                updates,
                poll_task: StdMutex::new(None),
            }),
        }
    }

    pub fn settings(&self) -> &OrchestratorSettings {
        &self.shared.settings
    }

    /// Current state of the job.
    pub fn snapshot(&self) -> JobSnapshot {
        self.shared.updates.borrow().clone()
    }

    /// Receive every state change.
    pub fn subscribe(&self) -> watch::Receiver<JobSnapshot> {
        self.shared.updates.subscribe()
    }

    /// Start a job for the session.
    ///
    /// Guards are checked before any network call; a rejected submission
    /// leaves the state untouched. Provider failures do not surface as `Err`:
    /// they move the job to `Failed` (or through the fallback to `Completed`)
    /// and are visible in the returned snapshot.
    pub async fn submit(&self, session: &Session) -> Result<JobSnapshot, OrchestratorError> {
        let shared = &self.shared;

        let (epoch, request) = {
            let mut inner = shared.inner.lock().await;
            if inner.state != JobState::Idle {
                return Err(OrchestratorError::NotIdle(inner.state));
            }

            let avatar = session.avatar.as_ref().ok_or(OrchestratorError::NoAvatar)?;
            let voice = session
                .voice
                .as_ref()
                .filter(|v| !v.voice_id.trim().is_empty())
                .ok_or(OrchestratorError::NoVoice)?;

            let balance = shared.ledger.balance(&session.account_id).await?;
            if inner.balance != Some(balance) {
                inner.balance = Some(balance);
                shared.publish(&inner);
            }
            if balance < GENERATION_COST {
                return Err(OrchestratorError::InsufficientCredits {
                    balance,
                    required: GENERATION_COST,
                });
            }

            if !shared.gateway.has_credential() {
                return Err(OrchestratorError::MissingCredential);
            }

            let script = session.script.trim();
            if script.is_empty() {
                return Err(OrchestratorError::EmptyScript);
            }
            let chars = script.chars().count();
            if chars > MAX_SCRIPT_CHARS {
                return Err(OrchestratorError::ScriptTooLong {
                    chars,
                    max: MAX_SCRIPT_CHARS,
                });
            }

            inner.epoch += 1;
            inner.state = JobState::Submitting;
            inner.account_id = Some(session.account_id.clone());
            inner.job_id = None;
            inner.result_url = None;
            inner.failure = None;
            inner.fallback_reason = None;
            shared.publish(&inner);

            let request = JobRequest {
                avatar_id: avatar.id.clone(),
                voice_id: voice.voice_id.clone(),
                voice_type: voice.voice_type.clone(),
                script: script.to_string(),
                name: session.video_name.clone(),
            };
            (inner.epoch, request)
        };

        log::info!(
            "Submitting job: avatar={} voice={}",
            request.avatar_id,
            request.voice_id
        );
        let outcome = shared.gateway.submit_job(&request).await;
        shared.finish_submission(epoch, outcome).await;

        Ok(self.snapshot())
    }

    /// Feed one status response into the state machine.
    ///
    /// Responses for any job other than the one currently polling are
    /// discarded.
    pub async fn handle_poll_response(
        &self,
        job_id: &str,
        outcome: Result<JobStatus, ProviderError>,
    ) -> PollControl {
        self.shared.handle_poll_response(job_id, outcome).await
    }

    /// Cancel whatever is running and return to `Idle`.
    pub async fn reset(&self) -> JobSnapshot {
        let mut inner = self.shared.inner.lock().await;
        if inner.state.is_active() {
            log::info!("Cancelling {} job {:?}", inner.state, inner.job_id);
        }
        self.shared.stop_polling(&mut inner);

        let epoch = inner.epoch + 1;
        let balance = inner.balance;
        *inner = Inner {
            epoch,
            balance,
            ..Inner::default()
        };
        self.shared.publish(&inner);
        inner.snapshot()
    }

    /// Wait until no job is in flight and return the resulting snapshot.
    pub async fn wait_for_terminal(&self) -> JobSnapshot {
        let mut updates = self.subscribe();
        let settled = updates
            .wait_for(|snapshot| !snapshot.state.is_active())
            .await
            .map(|snapshot| snapshot.clone());
        match settled {
            Ok(snapshot) => snapshot,
            Err(_) => self.snapshot(),
        }
    }
}

impl Drop for JobOrchestrator {
    fn drop(&mut self) {
        self.shared.abort_poll_task();
    }
}
