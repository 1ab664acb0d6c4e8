//! Durable client-local storage for the session mirror.
//!
//! SYSTEM CONTEXT
//! ==============
//! The manager writes `token` and `user` here after a token-backed sign-in and
//! removes both on sign-out. The delegated provider keeps its own record under
//! `provider-session`. Storage is a mirror of in-memory state, never a second
//! owner: unreadable or malformed entries are treated as absent.

use std::collections::HashMap;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::SessionError;

/// Key holding the raw bearer token.
pub const TOKEN_KEY: &str = "token";
/// Key holding the JSON-encoded [`crate::User`].
pub const USER_KEY: &str = "user";
/// Key holding the delegated provider's JSON-encoded [`crate::Session`].
pub const PROVIDER_SESSION_KEY: &str = "provider-session";

/// String key-value storage, shaped like browser `localStorage`.
pub trait SessionStore: Send + Sync {
    /// Read a value. `Ok(None)` when the key is absent.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Storage`] when the backing medium fails.
    fn load(&self, key: &str) -> Result<Option<String>, SessionError>;

    /// Write a value, replacing any previous one.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Storage`] when the backing medium fails.
    fn save(&self, key: &str, value: &str) -> Result<(), SessionError>;

    /// Delete a value. Removing an absent key succeeds.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Storage`] when the backing medium fails.
    fn remove(&self, key: &str) -> Result<(), SessionError>;
}

/// Load and decode a JSON value. Missing, unreadable or malformed entries yield `None`.
pub fn load_json<T: DeserializeOwned>(store: &dyn SessionStore, key: &str) -> Option<T> {
    let raw = match store.load(key) {
        Ok(raw) => raw?,
        Err(error) => {
            tracing::warn!(key, %error, "session storage read failed");
            return None;
        }
    };
    match serde_json::from_str(&raw) {
        Ok(value) => Some(value),
        Err(error) => {
            tracing::warn!(key, %error, "discarding malformed session storage entry");
            None
        }
    }
}

/// Encode and store a JSON value.
///
/// # Errors
///
/// Returns [`SessionError::Storage`] if encoding or writing fails.
pub fn save_json<T: Serialize>(store: &dyn SessionStore, key: &str, value: &T) -> Result<(), SessionError> {
    let raw = serde_json::to_string(value).map_err(|e| SessionError::Storage(e.to_string()))?;
    store.save(key, &raw)
}

// =============================================================================
// MEMORY STORE
// =============================================================================

/// Process-local storage. Nothing survives a restart.
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStore for MemoryStore {
    fn load(&self, key: &str) -> Result<Option<String>, SessionError> {
        let values = self.values.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        Ok(values.get(key).cloned())
    }

    fn save(&self, key: &str, value: &str) -> Result<(), SessionError> {
        let mut values = self.values.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        values.insert(key.to_owned(), value.to_owned());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), SessionError> {
        let mut values = self.values.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        values.remove(key);
        Ok(())
    }
}

// =============================================================================
// FILE STORE
// =============================================================================

/// One file per key under a directory.
///
/// Writes go to a temporary sibling and are renamed into place, so a crash
/// mid-write leaves either the old value or the new one. On Unix the files are
/// created owner-only.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    #[must_use]
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self { dir: dir.as_ref().to_path_buf() }
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, SessionError> {
        let valid = !key.is_empty() && key.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_');
        if !valid {
            return Err(SessionError::Storage(format!("invalid storage key: {key:?}")));
        }
        Ok(self.dir.join(key))
    }
}

fn storage_error(path: &Path, error: &std::io::Error) -> SessionError {
    SessionError::Storage(format!("{}: {error}", path.display()))
}

/// Write `value` to a newly created file. On Unix the file is owner-only
/// from the moment it exists; a leftover from an earlier crash is replaced.
fn write_private(path: &Path, value: &str) -> std::io::Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) => {}
        Err(error) if error.kind() == ErrorKind::NotFound => {}
        Err(error) => return Err(error),
    }
    let mut options = std::fs::OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut file = options.open(path)?;
    file.write_all(value.as_bytes())?;
    file.sync_all()
}

impl SessionStore for FileStore {
    fn load(&self, key: &str) -> Result<Option<String>, SessionError> {
        let path = self.path_for(key)?;
        match std::fs::read_to_string(&path) {
            Ok(raw) => Ok(Some(raw)),
            Err(error) if error.kind() == ErrorKind::NotFound => Ok(None),
            Err(error) => Err(storage_error(&path, &error)),
        }
    }

    fn save(&self, key: &str, value: &str) -> Result<(), SessionError> {
        let path = self.path_for(key)?;
        std::fs::create_dir_all(&self.dir).map_err(|e| storage_error(&self.dir, &e))?;

        let tmp = self.dir.join(format!(".{key}.tmp"));
        write_private(&tmp, value).map_err(|e| storage_error(&tmp, &e))?;
        std::fs::rename(&tmp, &path).map_err(|e| storage_error(&path, &e))
    }

    fn remove(&self, key: &str) -> Result<(), SessionError> {
        let path = self.path_for(key)?;
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(error) if error.kind() == ErrorKind::NotFound => Ok(()),
            Err(error) => Err(storage_error(&path, &error)),
        }
    }
}

#[cfg(test)]
#[path = "store_test.rs"]
mod tests;
