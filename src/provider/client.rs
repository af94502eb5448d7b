//! ProviderClient - handles communication with the video provider's HTTP API.

use std::path::{Path, PathBuf};
use std::sync::RwLock;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;

use super::retry::parse_retry_after;
use crate::catalog::Avatar;

/// The environment variable name for the provider API key.
pub const PROVIDER_API_KEY_ENV: &str = "HEYGEN_API_KEY";

/// Default base URL for the provider API.
pub const PROVIDER_API_BASE_URL: &str = "https://api.heygen.com/v1";

/// Voice synthesis mode used when none is chosen.
pub const DEFAULT_VOICE_TYPE: &str = "text";

/// Title given to generated videos when none is supplied.
pub const DEFAULT_VIDEO_NAME: &str = "UGC Ad";

/// Default timeout for HTTP requests (30 seconds).
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default connection timeout (10 seconds).
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// HTTP status code for rate limiting.
const HTTP_STATUS_TOO_MANY_REQUESTS: u16 = 429;

/// The provider-facing operations the orchestrator depends on.
#[async_trait]
pub trait ProviderGateway: Send + Sync {
    /// Store the API key used for subsequent calls. Not validated eagerly.
    fn configure(&self, api_key: String);

    /// Whether an API key is currently configured.
    fn has_credential(&self) -> bool;

    /// Fetch the provider's avatar list.
    async fn list_avatars(&self) -> Result<Vec<Avatar>, ProviderError>;

    /// Submit a generation job and return its provider-assigned id.
    async fn submit_job(&self, request: &JobRequest) -> Result<String, ProviderError>;

    /// Read the current status of a job once.
    async fn poll_status(&self, job_id: &str) -> Result<JobStatus, ProviderError>;
}

/// A video generation request.
#[derive(Debug, Clone, PartialEq)]
pub struct JobRequest {
    pub avatar_id: String,
    pub voice_id: String,
    pub voice_type: String,
    pub script: String,
    pub name: Option<String>,
}

/// Wire body for `POST /video_generation`.
#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    avatar: AvatarRef<'a>,
    voice: VoiceRef<'a>,
    text: &'a str,
    name: &'a str,
}

#[derive(Debug, Serialize)]
struct AvatarRef<'a> {
    avatar_id: &'a str,
}

#[derive(Debug, Serialize)]
struct VoiceRef<'a> {
    voice_id: &'a str,
    voice_type: &'a str,
}

impl<'a> From<&'a JobRequest> for GenerateRequest<'a> {
    fn from(request: &'a JobRequest) -> Self {
        let voice_type = if request.voice_type.trim().is_empty() {
            DEFAULT_VOICE_TYPE
        } else {
            request.voice_type.as_str()
        };
        Self {
            avatar: AvatarRef {
                avatar_id: &request.avatar_id,
            },
            voice: VoiceRef {
                voice_id: &request.voice_id,
                voice_type,
            },
            text: &request.script,
            name: request.name.as_deref().unwrap_or(DEFAULT_VIDEO_NAME),
        }
    }
}

/// Response from job submission.
#[derive(Debug, Deserialize)]
struct SubmitResponse {
    #[serde(default)]
    video_id: Option<String>,
}

/// Response from the avatar listing endpoint.
#[derive(Debug, Deserialize)]
struct AvatarsResponse {
    #[serde(default)]
    avatars: Vec<Avatar>,
}

/// Response from status polling endpoint.
#[derive(Debug, Deserialize)]
struct StatusResponse {
    status: String,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// Body of non-2xx responses.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: Option<String>,
}

/// Status of a video generation job.
#[derive(Debug, Clone, PartialEq)]
pub enum JobStatus {
    /// Job is queued for processing.
    Pending,
    /// Video is being generated.
    Processing,
    /// Generation completed successfully.
    Completed { video_url: String },
    /// Generation failed on the provider side.
    Failed { error: String },
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed { .. } | JobStatus::Failed { .. })
    }
}

/// Client for communicating with the provider API.
pub struct ProviderClient {
    api_key: RwLock<Option<String>>,
    base_url: String,
    http_client: reqwest::Client,
}

impl ProviderClient {
    /// Create a client for the given base URL with no credential configured.
    pub fn new(base_url: impl Into<String>) -> Result<Self, ProviderError> {
        Self::with_timeout(base_url, DEFAULT_TIMEOUT)
    }

    /// Create a client with a custom per-request timeout.
    pub fn with_timeout(
        base_url: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, ProviderError> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(DEFAULT_CONNECT_TIMEOUT.min(timeout))
            .build()
            .map_err(|e| ProviderError::Unavailable {
                message: format!("failed to build HTTP client: {}", e),
                retry_after_secs: None,
            })?;

        Ok(Self {
            api_key: RwLock::new(None),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http_client,
        })
    }

    /// Create a client against the default base URL, reading the API key
    /// from `HEYGEN_API_KEY` when it is set.
    pub fn from_env() -> Result<Self, ProviderError> {
        let client = Self::new(PROVIDER_API_BASE_URL)?;
        if let Ok(key) = std::env::var(PROVIDER_API_KEY_ENV) {
            client.configure(key);
        }
        Ok(client)
    }

    /// Get the base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn bearer(&self) -> Result<String, ProviderError> {
        let guard = self.api_key.read().unwrap_or_else(|e| e.into_inner());
        match guard.as_deref() {
            Some(key) if !key.is_empty() => Ok(format!("Bearer {}", key)),
            _ => Err(ProviderError::MissingCredential),
        }
    }

    /// Translate a non-2xx response into a `ProviderError`.
    async fn error_from_response(response: reqwest::Response) -> ProviderError {
        let status = response.status();
        let retry_after_secs = parse_retry_after(&response);
        let text = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorBody>(&text)
            .ok()
            .and_then(|body| body.message)
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| {
                if text.is_empty() {
                    format!("Provider API error: {}", status.as_u16())
                } else {
                    text
                }
            });

        if status.is_server_error() || status.as_u16() == HTTP_STATUS_TOO_MANY_REQUESTS {
            ProviderError::Unavailable {
                message,
                retry_after_secs,
            }
        } else {
            ProviderError::InvalidRequest {
                status: status.as_u16(),
                message,
            }
        }
    }

    /// Download a video file from a URL to disk.
    ///
    /// Streams the download to disk without loading the full video into memory.
    pub async fn download_video(&self, url: &str, dest: &Path) -> Result<PathBuf, ProviderError> {
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let response = self.http_client.get(url).send().await?;

        if !response.status().is_success() {
            return Err(Self::error_from_response(response).await);
        }

        let mut file = tokio::fs::File::create(dest).await?;
        let mut stream = response.bytes_stream();

        use futures_util::StreamExt;
        while let Some(chunk_result) = stream.next().await {
            let chunk = chunk_result?;
            file.write_all(&chunk).await?;
        }

        file.flush().await?;

        Ok(dest.to_path_buf())
    }
}

#[async_trait]
impl ProviderGateway for ProviderClient {
    fn configure(&self, api_key: String) {
        let mut guard = self.api_key.write().unwrap_or_else(|e| e.into_inner());
        *guard = Some(api_key);
    }

    fn has_credential(&self) -> bool {
        self.bearer().is_ok()
    }

    /// Any failure, including authentication, is reported as `Unavailable`.
    async fn list_avatars(&self) -> Result<Vec<Avatar>, ProviderError> {
        let unavailable = |message: String| ProviderError::Unavailable {
            message,
            retry_after_secs: None,
        };

        let auth = self.bearer().map_err(|e| unavailable(e.to_string()))?;
        let url = format!("{}/avatars", self.base_url);

        let response = self
            .http_client
            .get(&url)
            .header("Authorization", auth)
            .send()
            .await
            .map_err(|e| unavailable(e.to_string()))?;

        if !response.status().is_success() {
            let error = Self::error_from_response(response).await;
            return Err(unavailable(error.to_string()));
        }

        let body: AvatarsResponse = response
            .json()
            .await
            .map_err(|e| unavailable(format!("malformed avatar list: {}", e)))?;
        Ok(body.avatars)
    }

    async fn submit_job(&self, request: &JobRequest) -> Result<String, ProviderError> {
        let auth = self.bearer()?;
        let url = format!("{}/video_generation", self.base_url);
        let body = GenerateRequest::from(request);

        let response = self
            .http_client
            .post(&url)
            .header("Authorization", auth)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let error = Self::error_from_response(response).await;
            log::warn!("Job submission rejected: {}", error);
            return Err(error);
        }

        let submitted: SubmitResponse = response.json().await?;
        match submitted.video_id.filter(|id| !id.is_empty()) {
            Some(video_id) => {
                log::info!("Job submitted, video_id: {}", video_id);
                Ok(video_id)
            }
            None => Err(ProviderError::InvalidResponse(
                "submission accepted but no video_id in response".to_string(),
            )),
        }
    }

    async fn poll_status(&self, job_id: &str) -> Result<JobStatus, ProviderError> {
        let auth = self.bearer()?;
        let url = format!("{}/video_generation/{}", self.base_url, job_id);

        let response = self
            .http_client
            .get(&url)
            .header("Authorization", auth)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::error_from_response(response).await);
        }

        let status_response: StatusResponse = response.json().await?;

        match status_response.status.to_lowercase().as_str() {
            "pending" | "waiting" => Ok(JobStatus::Pending),
            "processing" => Ok(JobStatus::Processing),
            "completed" => match status_response.url.filter(|u| !u.is_empty()) {
                Some(video_url) => Ok(JobStatus::Completed { video_url }),
                None => Err(ProviderError::InvalidResponse(
                    "job completed but no url in response".to_string(),
                )),
            },
            "failed" => Ok(JobStatus::Failed {
                error: status_response
                    .error
                    .unwrap_or_else(|| "Unknown error occurred during generation".to_string()),
            }),
            unknown => Err(ProviderError::InvalidResponse(format!(
                "unknown job status: {}",
                unknown
            ))),
        }
    }
}

/// Errors that can occur while talking to the provider.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("API key not configured")]
    MissingCredential,

    #[error("Provider unavailable: {message}")]
    Unavailable {
        message: String,
        /// Retry-After header value in seconds, if provided
        retry_after_secs: Option<u64>,
    },

    #[error("Request rejected ({status}): {message}")]
    InvalidRequest { status: u16, message: String },

    #[error("Unexpected provider response: {0}")]
    InvalidResponse(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<reqwest::Error> for ProviderError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_decode() {
            ProviderError::InvalidResponse(error.to_string())
        } else {
            ProviderError::Unavailable {
                message: error.to_string(),
                retry_after_secs: None,
            }
        }
    }
}

impl ProviderError {
    /// Whether this error means the provider could not be reached or did not
    /// behave, as opposed to rejecting the request itself.
    pub fn is_unavailable(&self) -> bool {
        matches!(
            self,
            ProviderError::Unavailable { .. } | ProviderError::InvalidResponse(_)
        )
    }

    pub fn retry_after_secs(&self) -> Option<u64> {
        match self {
            ProviderError::Unavailable {
                retry_after_secs, ..
            } => *retry_after_secs,
            _ => None,
        }
    }
}
