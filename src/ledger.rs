//! CreditLedger - per-account credit balances backed by a profile store.
//!
//! A debit is persisted before it is reported, so a failed write never
//! leaves a partially applied debit behind.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex as StdMutex};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::sync::Mutex;

/// Credits charged for one generated video.
pub const GENERATION_COST: u32 = 10;

/// Account role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    User,
    Admin,
}

/// Persisted account profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub id: String,
    pub email: String,
    pub name: String,
    pub credits: u32,
    #[serde(default)]
    pub role: Role,
}

/// Derive the stable account id for an email address.
///
/// Returns `user_` followed by the first 9 hex chars of SHA256 of the
/// lowercased address.
pub fn account_id_for_email(email: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(email.trim().to_lowercase().as_bytes());
    let digest = hex::encode(hasher.finalize());
    format!("user_{}", &digest[..9])
}

/// Durable storage for profiles.
#[async_trait]
pub trait ProfileStore: Send + Sync {
    async fn load(&self, account_id: &str) -> Result<Option<Profile>, LedgerError>;
    async fn find_by_email(&self, email: &str) -> Result<Option<Profile>, LedgerError>;
    async fn save(&self, profile: &Profile) -> Result<(), LedgerError>;
}

/// Profiles kept in a single JSON file keyed by account id.
pub struct JsonProfileStore {
    path: PathBuf,
}

impl JsonProfileStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_all(&self) -> Result<HashMap<String, Profile>, LedgerError> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|e| LedgerError::Corrupt {
                path: self.path.clone(),
                source: e,
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(HashMap::new()),
            Err(e) => Err(LedgerError::Persistence(e.to_string())),
        }
    }

    async fn write_all(&self, profiles: &HashMap<String, Profile>) -> Result<(), LedgerError> {
        let persist = |e: std::io::Error| LedgerError::Persistence(e.to_string());

        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(persist)?;
        }

        let bytes = serde_json::to_vec_pretty(profiles)
            .map_err(|e| LedgerError::Persistence(e.to_string()))?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, bytes).await.map_err(persist)?;
        tokio::fs::rename(&tmp, &self.path).await.map_err(persist)?;
        Ok(())
    }
}

#[async_trait]
impl ProfileStore for JsonProfileStore {
    async fn load(&self, account_id: &str) -> Result<Option<Profile>, LedgerError> {
        Ok(self.read_all().await?.remove(account_id))
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<Profile>, LedgerError> {
        Ok(self
            .read_all()
            .await?
            .into_values()
            .find(|p| p.email.eq_ignore_ascii_case(email.trim())))
    }

    async fn save(&self, profile: &Profile) -> Result<(), LedgerError> {
        let mut profiles = self.read_all().await?;
        profiles.insert(profile.id.clone(), profile.clone());
        self.write_all(&profiles).await
    }
}

/// Profiles kept in memory only.
#[derive(Default)]
pub struct MemoryProfileStore {
    profiles: StdMutex<HashMap<String, Profile>>,
}

impl MemoryProfileStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Profile>> {
        self.profiles.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl ProfileStore for MemoryProfileStore {
    async fn load(&self, account_id: &str) -> Result<Option<Profile>, LedgerError> {
        Ok(self.lock().get(account_id).cloned())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<Profile>, LedgerError> {
        Ok(self
            .lock()
            .values()
            .find(|p| p.email.eq_ignore_ascii_case(email.trim()))
            .cloned())
    }

    async fn save(&self, profile: &Profile) -> Result<(), LedgerError> {
        self.lock().insert(profile.id.clone(), profile.clone());
        Ok(())
    }
}

/// Credit balances per account.
///
/// Every read goes to the store, so a debit always starts from the balance
/// last written by anyone. Debits within one ledger are serialized; writers in
/// other processes are not locked out, and two processes debiting the same
/// account at the same instant can still overwrite each other.
pub struct CreditLedger {
    store: Arc<dyn ProfileStore>,
    starting_grant: u32,
    /// Held across each read-modify-write so debits never interleave.
    write_lock: Mutex<()>,
}

impl CreditLedger {
    pub fn new(store: Arc<dyn ProfileStore>, starting_grant: u32) -> Self {
        Self {
            store,
            starting_grant,
            write_lock: Mutex::new(()),
        }
    }

    pub fn starting_grant(&self) -> u32 {
        self.starting_grant
    }

    /// Current balance. Accounts without a record hold the starting grant.
    pub async fn balance(&self, account_id: &str) -> Result<u32, LedgerError> {
        Ok(self
            .store
            .load(account_id)
            .await?
            .map(|p| p.credits)
            .unwrap_or(self.starting_grant))
    }

    pub async fn profile(&self, account_id: &str) -> Result<Option<Profile>, LedgerError> {
        self.store.load(account_id).await
    }

    pub async fn find_by_email(&self, email: &str) -> Result<Option<Profile>, LedgerError> {
        self.store.find_by_email(email).await
    }

    /// Create a profile holding the starting grant.
    pub async fn create_profile(&self, email: &str, name: &str) -> Result<Profile, LedgerError> {
        let _guard = self.write_lock.lock().await;
        if self.store.find_by_email(email).await?.is_some() {
            return Err(LedgerError::AccountExists(email.trim().to_string()));
        }

        let profile = Profile {
            id: account_id_for_email(email),
            email: email.trim().to_string(),
            name: name.trim().to_string(),
            credits: self.starting_grant,
            role: Role::User,
        };
        self.store.save(&profile).await?;
        log::info!("Created account {} with {} credits", profile.id, profile.credits);
        Ok(profile)
    }

    /// Atomically subtract `amount` credits and return the new balance.
    ///
    /// The balance is re-read from the store first and the new balance is
    /// persisted before it is returned; on any error the balance is unchanged.
    pub async fn debit(&self, account_id: &str, amount: u32) -> Result<u32, LedgerError> {
        let _guard = self.write_lock.lock().await;

        let mut profile = self
            .store
            .load(account_id)
            .await?
            .unwrap_or_else(|| Profile {
                id: account_id.to_string(),
                email: String::new(),
                name: String::new(),
                credits: self.starting_grant,
                role: Role::User,
            });

        let balance = profile.credits;
        let new_balance = balance
            .checked_sub(amount)
            .ok_or(LedgerError::InsufficientCredits {
                balance,
                requested: amount,
            })?;

        profile.credits = new_balance;
        if let Err(e) = self.store.save(&profile).await {
            log::error!("Failed to persist debit for {}: {}", account_id, e);
            return Err(e);
        }

        log::info!(
            "Debited {} credits from {} ({} -> {})",
            amount,
            account_id,
            balance,
            new_balance
        );
        Ok(new_balance)
    }
}

/// Errors from the credit ledger and its stores.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("Insufficient credits: balance {balance}, requested {requested}")]
    InsufficientCredits { balance: u32, requested: u32 },

    #[error("Failed to persist credits: {0}")]
    Persistence(String),

    #[error("Profile file '{}' is corrupt: {source}", path.display())]
    Corrupt {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("An account for '{0}' already exists")]
    AccountExists(String),
}
