//! Persistent session credentials.
//!
//! # Design
//! The access token, refresh token and cached user profile live in a
//! process-wide key-value store under fixed key names that other parts of the
//! application read directly. `SessionStore` is the seam: the client only ever
//! calls `get`, `set`, `remove` and `clear`, so a host can back it with
//! whatever persistence it has. Semantics are last-writer-wins.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use thiserror::Error;

pub const ACCESS_TOKEN_KEY: &str = "access_token";
pub const REFRESH_TOKEN_KEY: &str = "refresh_token";
pub const USER_KEY: &str = "user";

/// Every key the client owns. `clear` removes exactly these.
pub const SESSION_KEYS: [&str; 3] = [ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY, USER_KEY];

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session file i/o: {0}")]
    Io(#[from] io::Error),

    #[error("session file is not valid JSON: {0}")]
    Format(#[from] serde_json::Error),
}

pub trait SessionStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;

    fn set(&self, key: &str, value: &str) -> Result<(), SessionError>;

    fn remove(&self, key: &str) -> Result<(), SessionError>;

    /// Remove all session keys. Unrelated keys are left alone.
    fn clear(&self) -> Result<(), SessionError> {
        for key in SESSION_KEYS {
            self.remove(key)?;
        }
        Ok(())
    }
}

impl<S: SessionStore + ?Sized> SessionStore for Arc<S> {
    fn get(&self, key: &str) -> Option<String> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<(), SessionError> {
        (**self).set(key, value)
    }

    fn remove(&self, key: &str) -> Result<(), SessionError> {
        (**self).remove(key)
    }

    fn clear(&self) -> Result<(), SessionError> {
        (**self).clear()
    }
}

/// In-process store. Lost when the process exits.
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    entries: RwLock<HashMap<String, String>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStore for MemorySessionStore {
    fn get(&self, key: &str) -> Option<String> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries.get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<(), SessionError> {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), SessionError> {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.remove(key);
        Ok(())
    }
}

/// Store persisted as a flat JSON object on disk.
///
/// The whole map is rewritten on every mutation through a temporary file and
/// a rename, so a crash never leaves a half-written session behind.
#[derive(Debug)]
pub struct FileSessionStore {
    path: PathBuf,
    entries: Mutex<HashMap<String, String>>,
}

impl FileSessionStore {
    /// Open the store at `path`, loading existing entries. A missing file is
    /// an empty session.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, SessionError> {
        let path = path.as_ref().to_path_buf();
        let entries = match fs::read_to_string(&path) {
            Ok(raw) if raw.trim().is_empty() => HashMap::new(),
            Ok(raw) => serde_json::from_str(&raw)?,
            Err(e) if e.kind() == io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => return Err(e.into()),
        };
        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, entries: &HashMap<String, String>) -> Result<(), SessionError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, serde_json::to_vec_pretty(entries)?)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl SessionStore for FileSessionStore {
    fn get(&self, key: &str) -> Option<String> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<(), SessionError> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.insert(key.to_string(), value.to_string());
        self.persist(&entries)
    }

    fn remove(&self, key: &str) -> Result<(), SessionError> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        if entries.remove(key).is_some() {
            self.persist(&entries)?;
        }
        Ok(())
    }

    fn clear(&self) -> Result<(), SessionError> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let before = entries.len();
        for key in SESSION_KEYS {
            entries.remove(key);
        }
        if entries.len() != before {
            self.persist(&entries)?;
        }
        Ok(())
    }
}
