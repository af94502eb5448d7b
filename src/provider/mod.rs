//! Video provider integration.
//!
//! Talks to the external video-generation API: avatar listing, job
//! submission, and single-shot status reads. Retry decisions belong to the
//! caller; `retry` holds the bounded poll policy the orchestrator applies.

mod client;
mod retry;

pub use client::{
    JobRequest, JobStatus, ProviderClient, ProviderError, ProviderGateway, DEFAULT_VIDEO_NAME,
    DEFAULT_VOICE_TYPE, PROVIDER_API_BASE_URL, PROVIDER_API_KEY_ENV,
};
pub use retry::{next_poll_delay, PollExhausted, PollPolicy, PollTracker};
