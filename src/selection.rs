//! SelectionStore - durable key-value store for the user's local choices.
//!
//! Holds the chosen avatar, the provider API key and the signed-in account
//! across runs. The whole map is rewritten on every change.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::catalog::Avatar;

/// Key of the JSON-encoded selected avatar.
pub const SELECTED_AVATAR_KEY: &str = "selected_avatar";

/// Key of the provider API key.
pub const API_KEY_KEY: &str = "heygen_api_key";

/// Key of the signed-in account id.
pub const CURRENT_ACCOUNT_KEY: &str = "ugc_user";

/// File-backed string map.
///
/// The API key is stored in plain text; on unix the file is created with
/// mode 0600.
#[derive(Debug)]
pub struct SelectionStore {
    path: PathBuf,
    entries: BTreeMap<String, String>,
}

impl SelectionStore {
    /// Open the store at `path`. A missing file is an empty store; a corrupt
    /// file is logged and replaced on the next write.
    pub fn open(path: PathBuf) -> Result<Self, SelectionError> {
        let entries = match std::fs::read_to_string(&path) {
            Ok(content) => match serde_json::from_str(&content) {
                Ok(entries) => entries,
                Err(e) => {
                    log::warn!(
                        "Ignoring unreadable selection store '{}': {}",
                        path.display(),
                        e
                    );
                    BTreeMap::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(SelectionError::Io { path, source: e }),
        };

        Ok(Self { path, entries })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    pub fn set(&mut self, key: &str, value: String) -> Result<(), SelectionError> {
        let previous = self.entries.insert(key.to_string(), value);
        if let Err(e) = self.persist() {
            match previous {
                Some(old) => self.entries.insert(key.to_string(), old),
                None => self.entries.remove(key),
            };
            return Err(e);
        }
        Ok(())
    }

    pub fn remove(&mut self, key: &str) -> Result<(), SelectionError> {
        if let Some(old) = self.entries.remove(key) {
            if let Err(e) = self.persist() {
                self.entries.insert(key.to_string(), old);
                return Err(e);
            }
        }
        Ok(())
    }

    /// Remove every entry.
    pub fn clear(&mut self) -> Result<(), SelectionError> {
        let previous = std::mem::take(&mut self.entries);
        if let Err(e) = self.persist() {
            self.entries = previous;
            return Err(e);
        }
        Ok(())
    }

    pub fn set_avatar(&mut self, avatar: &Avatar) -> Result<(), SelectionError> {
        let encoded = serde_json::to_string(avatar)?;
        self.set(SELECTED_AVATAR_KEY, encoded)
    }

    /// The selected avatar, if one is stored and decodes.
    pub fn avatar(&self) -> Option<Avatar> {
        let raw = self.get(SELECTED_AVATAR_KEY)?;
        match serde_json::from_str(raw) {
            Ok(avatar) => Some(avatar),
            Err(e) => {
                log::warn!("Stored avatar selection is unreadable: {}", e);
                None
            }
        }
    }

    pub fn clear_avatar(&mut self) -> Result<(), SelectionError> {
        self.remove(SELECTED_AVATAR_KEY)
    }

    pub fn set_api_key(&mut self, key: &str) -> Result<(), SelectionError> {
        self.set(API_KEY_KEY, key.trim().to_string())
    }

    pub fn api_key(&self) -> Option<&str> {
        self.get(API_KEY_KEY).filter(|k| !k.is_empty())
    }

    pub fn clear_api_key(&mut self) -> Result<(), SelectionError> {
        self.remove(API_KEY_KEY)
    }

    pub fn set_current_account(&mut self, account_id: &str) -> Result<(), SelectionError> {
        self.set(CURRENT_ACCOUNT_KEY, account_id.to_string())
    }

    pub fn current_account(&self) -> Option<&str> {
        self.get(CURRENT_ACCOUNT_KEY)
    }

    pub fn clear_current_account(&mut self) -> Result<(), SelectionError> {
        self.remove(CURRENT_ACCOUNT_KEY)
    }

    fn persist(&self) -> Result<(), SelectionError> {
        let io = |source: std::io::Error| SelectionError::Io {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(io)?;
        }

        let content = serde_json::to_string_pretty(&self.entries)?;
        let tmp = self.path.with_extension("json.tmp");
        write_private(&tmp, content.as_bytes()).map_err(io)?;
        std::fs::rename(&tmp, &self.path).map_err(io)?;
        Ok(())
    }
}

#[cfg(unix)]
fn write_private(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    use std::io::Write;
    use std::os::unix::fs::OpenOptionsExt;

    let mut file = std::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)?;
    file.write_all(bytes)?;
    file.sync_all()
}

#[cfg(not(unix))]
fn write_private(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    std::fs::write(path, bytes)
}

/// Errors from the selection store.
#[derive(Debug, thiserror::Error)]
pub enum SelectionError {
    #[error("Failed to access selection store '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to encode selection: {0}")]
    Encode(#[from] serde_json::Error),
}
