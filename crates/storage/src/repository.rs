use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::{debug, warn};

/// Errors surfaced by key-value backends.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum MirrorError {
    #[error("storage quota exceeded ({needed} bytes needed, {limit} allowed)")]
    QuotaExceeded { needed: usize, limit: usize },

    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

//
// ─── KEYS ─────────────────────────────────────────────────────────────────────
//

/// Fixed keys of the persisted state. Each maps to one JSON blob.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MirrorKey {
    Token,
    RefreshToken,
    TokenExpiry,
    User,
    UserSettings,
    LearningProgress,
    QuizScores,
    StudyHistory,
    ConversionHistory,
    ConversionOptions,
}

impl MirrorKey {
    pub const ALL: [MirrorKey; 10] = [
        MirrorKey::Token,
        MirrorKey::RefreshToken,
        MirrorKey::TokenExpiry,
        MirrorKey::User,
        MirrorKey::UserSettings,
        MirrorKey::LearningProgress,
        MirrorKey::QuizScores,
        MirrorKey::StudyHistory,
        MirrorKey::ConversionHistory,
        MirrorKey::ConversionOptions,
    ];

    /// Keys scoped to a signed-in session; wiped on logout.
    pub const SESSION_SCOPED: [MirrorKey; 5] = [
        MirrorKey::Token,
        MirrorKey::RefreshToken,
        MirrorKey::TokenExpiry,
        MirrorKey::User,
        MirrorKey::UserSettings,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            MirrorKey::Token => "token",
            MirrorKey::RefreshToken => "refreshToken",
            MirrorKey::TokenExpiry => "tokenExpiry",
            MirrorKey::User => "user",
            MirrorKey::UserSettings => "userSettings",
            MirrorKey::LearningProgress => "learningProgress",
            MirrorKey::QuizScores => "quizScores",
            MirrorKey::StudyHistory => "studyHistory",
            MirrorKey::ConversionHistory => "conversionHistory",
            MirrorKey::ConversionOptions => "conversionOptions",
        }
    }
}

impl fmt::Display for MirrorKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

//
// ─── BACKEND CONTRACT ─────────────────────────────────────────────────────────
//

/// Synchronous string key-value backend. Implementations must stay local:
/// no call may wait on the network.
pub trait KeyValueStore: Send + Sync {
    /// Fetch the raw text stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns `MirrorError` if the backend cannot be read.
    fn get(&self, key: &str) -> Result<Option<String>, MirrorError>;

    /// Store `value` under `key`, replacing any previous value.
    ///
    /// # Errors
    ///
    /// Returns `MirrorError` if the write is rejected.
    fn set(&self, key: &str, value: &str) -> Result<(), MirrorError>;

    /// Delete `key`. Removing a missing key is not an error.
    ///
    /// # Errors
    ///
    /// Returns `MirrorError` if the backend cannot be written.
    fn remove(&self, key: &str) -> Result<(), MirrorError>;
}

/// Process-local backend, handy for tests and for running without a disk.
///
/// An optional quota (total bytes of keys plus values) makes writes fail the
/// way a full browser storage area would.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    entries: Arc<Mutex<HashMap<String, String>>>,
    quota: Option<usize>,
}

impl InMemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_quota(limit: usize) -> Self {
        Self {
            entries: Arc::default(),
            quota: Some(limit),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, String>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl KeyValueStore for InMemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, MirrorError> {
        Ok(self.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), MirrorError> {
        let mut entries = self.lock();
        if let Some(limit) = self.quota {
            let others: usize = entries
                .iter()
                .filter(|(k, _)| k.as_str() != key)
                .map(|(k, v)| k.len() + v.len())
                .sum();
            let needed = others + key.len() + value.len();
            if needed > limit {
                return Err(MirrorError::QuotaExceeded { needed, limit });
            }
        }
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), MirrorError> {
        self.lock().remove(key);
        Ok(())
    }
}

//
// ─── TYPED MIRROR ─────────────────────────────────────────────────────────────
//

/// JSON mirror of in-memory state over a [`KeyValueStore`].
///
/// The plain methods are best-effort: failures are logged and swallowed, so
/// callers keep their in-memory state and carry on. The `try_*` variants
/// report the error instead.
#[derive(Clone)]
pub struct Mirror {
    store: Arc<dyn KeyValueStore>,
}

impl Mirror {
    #[must_use]
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// Mirror over a fresh [`InMemoryStore`].
    #[must_use]
    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemoryStore::new()))
    }

    /// Serialize `value` and store it under `key`.
    ///
    /// # Errors
    ///
    /// Returns `MirrorError` if serialization or the backend write fails.
    pub fn try_save<T: Serialize + ?Sized>(
        &self,
        key: MirrorKey,
        value: &T,
    ) -> Result<(), MirrorError> {
        let text = serde_json::to_string(value)?;
        self.store.set(key.as_str(), &text)
    }

    /// Load and deserialize the value under `key`; `Ok(None)` when absent.
    ///
    /// # Errors
    ///
    /// Returns `MirrorError` if the backend read or deserialization fails.
    pub fn try_load<T: DeserializeOwned>(&self, key: MirrorKey) -> Result<Option<T>, MirrorError> {
        match self.store.get(key.as_str())? {
            Some(text) => Ok(Some(serde_json::from_str(&text)?)),
            None => Ok(None),
        }
    }

    /// Delete the value under `key`.
    ///
    /// # Errors
    ///
    /// Returns `MirrorError` if the backend write fails.
    pub fn try_remove(&self, key: MirrorKey) -> Result<(), MirrorError> {
        self.store.remove(key.as_str())
    }

    /// Best-effort write. Returns whether the value is now durable.
    pub fn save<T: Serialize + ?Sized>(&self, key: MirrorKey, value: &T) -> bool {
        match self.try_save(key, value) {
            Ok(()) => {
                debug!(key = %key, "mirrored state");
                true
            }
            Err(err) => {
                warn!(key = %key, error = %err, "failed to persist state; keeping in-memory copy");
                false
            }
        }
    }

    /// Best-effort read. Unreadable or corrupt values load as absent.
    #[must_use]
    pub fn load<T: DeserializeOwned>(&self, key: MirrorKey) -> Option<T> {
        match self.try_load(key) {
            Ok(value) => value,
            Err(err) => {
                warn!(key = %key, error = %err, "failed to load persisted state");
                None
            }
        }
    }

    /// Best-effort delete.
    pub fn remove(&self, key: MirrorKey) -> bool {
        match self.try_remove(key) {
            Ok(()) => true,
            Err(err) => {
                warn!(key = %key, error = %err, "failed to remove persisted state");
                false
            }
        }
    }

    /// Best-effort delete of several keys. Every key is attempted.
    pub fn remove_all(&self, keys: &[MirrorKey]) -> bool {
        keys.iter().fold(true, |ok, key| self.remove(*key) && ok)
    }
}

impl fmt::Debug for Mirror {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mirror").finish_non_exhaustive()
    }
}
