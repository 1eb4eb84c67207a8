//! Host-local storage clearing
//!
//! Logout has to wipe whatever the host environment persisted next to the
//! provider's own token cache: the session-scoped store, the long-lived
//! store, and the cookie jar. The [`HostStorage`] trait is that seam;
//! implementations exist for file-backed hosts and for in-memory use.

use chrono::{DateTime, Utc};
use entra_types::{SessionError, SessionResult};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, trace};

/// A single cookie record.
///
/// Cleared cookies are rewritten by name with an epoch expiry rather than
/// removed outright, matching how a browser host expires them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cookie {
    pub name: String,
    pub value: String,
    /// Expiry; `None` means session-lifetime
    pub expires: Option<DateTime<Utc>>,
}

impl Cookie {
    /// Whether the cookie is still live
    pub fn is_live(&self) -> bool {
        self.expires.map_or(true, |at| at > Utc::now())
    }

    fn expire(&mut self) {
        self.value.clear();
        self.expires = Some(DateTime::UNIX_EPOCH);
    }
}

/// Host-local persisted state the adapter can clear
pub trait HostStorage: Send + Sync {
    /// Clear the session-scoped key/value store
    fn clear_session_store(&self) -> SessionResult<()>;

    /// Clear the long-lived key/value store
    fn clear_persistent_store(&self) -> SessionResult<()>;

    /// Expire every cookie by name
    fn expire_cookies(&self) -> SessionResult<()>;
}

/// In-memory host storage for tests and embedders without durable state
#[derive(Default)]
pub struct MemoryHostStorage {
    session: Mutex<HashMap<String, String>>,
    persistent: Mutex<HashMap<String, String>>,
    cookies: Mutex<Vec<Cookie>>,
}

impl MemoryHostStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn store_session_value(&self, key: &str, value: &str) {
        self.session.lock().insert(key.to_string(), value.to_string());
    }

    pub fn store_persistent_value(&self, key: &str, value: &str) {
        self.persistent
            .lock()
            .insert(key.to_string(), value.to_string());
    }

    pub fn set_cookie(&self, cookie: Cookie) {
        self.cookies.lock().push(cookie);
    }

    pub fn session_is_empty(&self) -> bool {
        self.session.lock().is_empty()
    }

    pub fn persistent_is_empty(&self) -> bool {
        self.persistent.lock().is_empty()
    }

    pub fn live_cookie_count(&self) -> usize {
        self.cookies.lock().iter().filter(|c| c.is_live()).count()
    }
}

impl HostStorage for MemoryHostStorage {
    fn clear_session_store(&self) -> SessionResult<()> {
        self.session.lock().clear();
        Ok(())
    }

    fn clear_persistent_store(&self) -> SessionResult<()> {
        self.persistent.lock().clear();
        Ok(())
    }

    fn expire_cookies(&self) -> SessionResult<()> {
        for cookie in self.cookies.lock().iter_mut() {
            cookie.expire();
        }
        Ok(())
    }
}

/// File-backed host storage.
///
/// Keeps the two key/value stores and the cookie jar as JSON files under a
/// single directory. Clearing a store rewrites it empty; expiring cookies
/// rewrites each record with an epoch expiry.
pub struct FileHostStorage {
    session_path: PathBuf,
    persistent_path: PathBuf,
    cookie_path: PathBuf,
}

impl FileHostStorage {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        Self {
            session_path: dir.join("session_store.json"),
            persistent_path: dir.join("persistent_store.json"),
            cookie_path: dir.join("cookies.json"),
        }
    }

    pub fn store_session_value(&self, key: &str, value: &str) -> SessionResult<()> {
        let mut store = Self::read_store(&self.session_path)?;
        store.insert(key.to_string(), value.to_string());
        Self::write_store(&self.session_path, &store)
    }

    pub fn store_persistent_value(&self, key: &str, value: &str) -> SessionResult<()> {
        let mut store = Self::read_store(&self.persistent_path)?;
        store.insert(key.to_string(), value.to_string());
        Self::write_store(&self.persistent_path, &store)
    }

    pub fn set_cookie(&self, cookie: Cookie) -> SessionResult<()> {
        let mut cookies = self.cookies()?;
        cookies.push(cookie);
        self.write_cookies(&cookies)
    }

    /// Current cookie jar contents
    pub fn cookies(&self) -> SessionResult<Vec<Cookie>> {
        if !self.cookie_path.exists() {
            return Ok(Vec::new());
        }
        let contents = fs::read_to_string(&self.cookie_path)
            .map_err(|e| SessionError::Storage(format!("Failed to read cookie jar: {}", e)))?;
        serde_json::from_str(&contents)
            .map_err(|e| SessionError::Storage(format!("Failed to parse cookie jar: {}", e)))
    }

    pub fn session_value(&self, key: &str) -> SessionResult<Option<String>> {
        Ok(Self::read_store(&self.session_path)?.remove(key))
    }

    pub fn persistent_value(&self, key: &str) -> SessionResult<Option<String>> {
        Ok(Self::read_store(&self.persistent_path)?.remove(key))
    }

    fn read_store(path: &Path) -> SessionResult<HashMap<String, String>> {
        if !path.exists() {
            return Ok(HashMap::new());
        }
        let contents = fs::read_to_string(path)
            .map_err(|e| SessionError::Storage(format!("Failed to read store: {}", e)))?;
        if contents.trim().is_empty() {
            return Ok(HashMap::new());
        }
        serde_json::from_str(&contents)
            .map_err(|e| SessionError::Storage(format!("Failed to parse store: {}", e)))
    }

    fn write_store(path: &Path, store: &HashMap<String, String>) -> SessionResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                SessionError::Storage(format!("Failed to create storage directory: {}", e))
            })?;
        }
        let contents = serde_json::to_string_pretty(store)
            .map_err(|e| SessionError::Storage(format!("Failed to serialize store: {}", e)))?;
        fs::write(path, contents)
            .map_err(|e| SessionError::Storage(format!("Failed to write store: {}", e)))
    }

    fn write_cookies(&self, cookies: &[Cookie]) -> SessionResult<()> {
        if let Some(parent) = self.cookie_path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                SessionError::Storage(format!("Failed to create storage directory: {}", e))
            })?;
        }
        let contents = serde_json::to_string_pretty(cookies)
            .map_err(|e| SessionError::Storage(format!("Failed to serialize cookie jar: {}", e)))?;
        fs::write(&self.cookie_path, contents)
            .map_err(|e| SessionError::Storage(format!("Failed to write cookie jar: {}", e)))
    }
}

impl HostStorage for FileHostStorage {
    fn clear_session_store(&self) -> SessionResult<()> {
        Self::write_store(&self.session_path, &HashMap::new())?;
        trace!("Cleared session store");
        Ok(())
    }

    fn clear_persistent_store(&self) -> SessionResult<()> {
        Self::write_store(&self.persistent_path, &HashMap::new())?;
        trace!("Cleared persistent store");
        Ok(())
    }

    fn expire_cookies(&self) -> SessionResult<()> {
        let mut cookies = self.cookies()?;
        if cookies.is_empty() {
            return Ok(());
        }
        for cookie in &mut cookies {
            cookie.expire();
        }
        self.write_cookies(&cookies)?;
        debug!("Expired {} cookies", cookies.len());
        Ok(())
    }
}
