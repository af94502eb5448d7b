//! Session context and account sign-in.
//!
//! `Session` is the explicit context handed to the orchestrator: who is
//! generating, with which avatar, voice and script.

use crate::catalog::Avatar;
use crate::ledger::{CreditLedger, LedgerError, Profile};
use crate::provider::DEFAULT_VOICE_TYPE;
use crate::selection::{SelectionError, SelectionStore};

/// Placeholder replaced by the brand name in scripts.
pub const BRAND_PLACEHOLDER: &str = "[Brand]";

/// Maximum script length in characters.
pub const MAX_SCRIPT_CHARS: usize = 500;

/// Chosen voice and synthesis mode.
#[derive(Debug, Clone, PartialEq)]
pub struct VoiceChoice {
    pub voice_id: String,
    pub voice_type: String,
}

impl VoiceChoice {
    pub fn new(voice_id: impl Into<String>) -> Self {
        Self {
            voice_id: voice_id.into(),
            voice_type: DEFAULT_VOICE_TYPE.to_string(),
        }
    }

    pub fn with_type(voice_id: impl Into<String>, voice_type: impl Into<String>) -> Self {
        Self {
            voice_id: voice_id.into(),
            voice_type: voice_type.into(),
        }
    }
}

/// Everything a generation request needs from the user.
#[derive(Debug, Clone, Default)]
pub struct Session {
    pub account_id: String,
    pub avatar: Option<Avatar>,
    pub voice: Option<VoiceChoice>,
    pub script: String,
    pub video_name: Option<String>,
}

impl Session {
    pub fn new(account_id: impl Into<String>) -> Self {
        Self {
            account_id: account_id.into(),
            ..Self::default()
        }
    }

    /// Build a session for the signed-in account with the stored avatar.
    pub fn load(store: &SelectionStore) -> Result<Self, SessionError> {
        let account_id = store
            .current_account()
            .ok_or(SessionError::NotSignedIn)?
            .to_string();
        Ok(Self {
            account_id,
            avatar: store.avatar(),
            ..Self::default()
        })
    }

    pub fn with_avatar(mut self, avatar: Avatar) -> Self {
        self.avatar = Some(avatar);
        self
    }

    pub fn with_voice(mut self, voice: VoiceChoice) -> Self {
        self.voice = Some(voice);
        self
    }

    pub fn with_script(mut self, script: impl Into<String>) -> Self {
        self.script = script.into();
        self
    }
}

/// Whether the script carries the brand placeholder.
pub fn has_brand_placeholder(script: &str) -> bool {
    script.contains(BRAND_PLACEHOLDER)
}

/// Substitute the brand placeholder. Without a brand the script is returned
/// unchanged.
pub fn render_script(script: &str, brand: Option<&str>) -> String {
    match brand.map(str::trim).filter(|b| !b.is_empty()) {
        Some(brand) => script.replace(BRAND_PLACEHOLDER, brand),
        None => script.to_string(),
    }
}

/// Create an account and make it the current one.
pub async fn sign_up(
    ledger: &CreditLedger,
    store: &mut SelectionStore,
    email: &str,
    name: &str,
) -> Result<Profile, SessionError> {
    if email.trim().is_empty() || name.trim().is_empty() {
        return Err(SessionError::MissingFields);
    }
    let profile = ledger.create_profile(email, name).await?;
    store.set_current_account(&profile.id)?;
    Ok(profile)
}

/// Make an existing account the current one.
pub async fn sign_in(
    ledger: &CreditLedger,
    store: &mut SelectionStore,
    email: &str,
) -> Result<Profile, SessionError> {
    if email.trim().is_empty() {
        return Err(SessionError::MissingFields);
    }
    let profile = ledger
        .find_by_email(email)
        .await?
        .ok_or_else(|| SessionError::UnknownAccount(email.trim().to_string()))?;
    store.set_current_account(&profile.id)?;
    log::info!("Signed in as {}", profile.id);
    Ok(profile)
}

pub fn sign_out(store: &mut SelectionStore) -> Result<(), SessionError> {
    store.clear_current_account()?;
    Ok(())
}

/// Errors from session and account operations.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Not signed in")]
    NotSignedIn,

    #[error("Please fill in all required fields")]
    MissingFields,

    #[error("No account found for '{0}'")]
    UnknownAccount(String),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Selection(#[from] SelectionError),
}
