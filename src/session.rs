use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::services::{AccessToken, PortalError, ServiceResult};

/// Sessions last 24 hours from login.
pub const SESSION_TTL_MS: i64 = 24 * 60 * 60 * 1000;

pub trait Clock: Send + Sync {
    fn now_millis(&self) -> i64;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> i64 {
        Utc::now().timestamp_millis()
    }
}

/// Clock that only moves when told to.
#[derive(Clone, Debug, Default)]
pub struct ManualClock {
    now: Arc<AtomicI64>,
}

impl ManualClock {
    pub fn at(millis: i64) -> Self {
        Self {
            now: Arc::new(AtomicI64::new(millis)),
        }
    }

    pub fn advance(&self, millis: i64) {
        self.now.fetch_add(millis, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_millis(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }
}

/// String key-value slots, the shape of browser local storage.
pub trait SessionStorage: Send + Sync {
    fn get_item(&self, key: &str) -> ServiceResult<Option<String>>;
    fn set_item(&self, key: &str, value: &str) -> ServiceResult<()>;
    fn remove_item(&self, key: &str) -> ServiceResult<()>;
}

#[derive(Clone, Debug, Default)]
pub struct MemoryStorage {
    items: Arc<Mutex<HashMap<String, String>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn items(&self) -> ServiceResult<std::sync::MutexGuard<'_, HashMap<String, String>>> {
        self.items
            .lock()
            .map_err(|_| PortalError::Storage("storage poisoned".into()))
    }
}

impl SessionStorage for MemoryStorage {
    fn get_item(&self, key: &str) -> ServiceResult<Option<String>> {
        Ok(self.items()?.get(key).cloned())
    }

    fn set_item(&self, key: &str, value: &str) -> ServiceResult<()> {
        self.items()?.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove_item(&self, key: &str) -> ServiceResult<()> {
        self.items()?.remove(key);
        Ok(())
    }
}

/// One `<key>.json` file per slot inside `dir`.
#[derive(Clone, Debug)]
pub struct FileStorage {
    dir: PathBuf,
}

impl FileStorage {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }
}

impl SessionStorage for FileStorage {
    fn get_item(&self, key: &str) -> ServiceResult<Option<String>> {
        match fs::read_to_string(self.path_for(key)) {
            Ok(raw) => Ok(Some(raw)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    fn set_item(&self, key: &str, value: &str) -> ServiceResult<()> {
        fs::create_dir_all(&self.dir)?;
        fs::write(self.path_for(key), value)?;
        Ok(())
    }

    fn remove_item(&self, key: &str) -> ServiceResult<()> {
        match fs::remove_file(self.path_for(key)) {
            Err(err) if err.kind() != ErrorKind::NotFound => Err(err.into()),
            _ => Ok(()),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionKind {
    Admin,
    Tracking,
}

impl SessionKind {
    pub fn storage_key(self) -> &'static str {
        match self {
            SessionKind::Admin => "adminSession",
            SessionKind::Tracking => "trackingSession",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub codigo: Option<String>,
    pub login_time: i64,
    pub expires: i64,
    /// Backend token from a password sign-in; test-credential logins carry none.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<AccessToken>,
}

impl Session {
    pub fn is_expired(&self, now_millis: i64) -> bool {
        self.expires < now_millis
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SessionCheck {
    Missing,
    Corrupt,
    Expired(Session),
    Active(Session),
}

/// Persisted session slots plus the clock used to stamp and check them.
#[derive(Clone)]
pub struct SessionStore {
    storage: Arc<dyn SessionStorage>,
    clock: Arc<dyn Clock>,
}

impl SessionStore {
    pub fn new(storage: Arc<dyn SessionStorage>, clock: Arc<dyn Clock>) -> Self {
        Self { storage, clock }
    }

    pub fn in_memory(clock: Arc<dyn Clock>) -> Self {
        Self::new(Arc::new(MemoryStorage::new()), clock)
    }

    pub fn now(&self) -> i64 {
        self.clock.now_millis()
    }

    /// Overwrites the slot for `kind` with a fresh 24 hour session.
    pub fn start(
        &self,
        kind: SessionKind,
        email: &str,
        codigo: Option<&str>,
    ) -> ServiceResult<Session> {
        self.start_with_token(kind, email, codigo, None)
    }

    pub fn start_with_token(
        &self,
        kind: SessionKind,
        email: &str,
        codigo: Option<&str>,
        access_token: Option<AccessToken>,
    ) -> ServiceResult<Session> {
        let login_time = self.now();
        let session = Session {
            email: email.to_string(),
            codigo: codigo.map(str::to_string),
            login_time,
            expires: login_time + SESSION_TTL_MS,
            access_token,
        };
        let raw = serde_json::to_string(&session)
            .map_err(|e| PortalError::Internal(format!("session encode failed: {e}")))?;
        self.storage.set_item(kind.storage_key(), &raw)?;
        debug!(slot = kind.storage_key(), email, "session stored");
        Ok(session)
    }

    pub fn inspect(&self, kind: SessionKind) -> ServiceResult<SessionCheck> {
        let Some(raw) = self.storage.get_item(kind.storage_key())? else {
            return Ok(SessionCheck::Missing);
        };
        let session: Session = match serde_json::from_str(&raw) {
            Ok(session) => session,
            Err(err) => {
                warn!(slot = kind.storage_key(), error = %err, "unreadable session");
                return Ok(SessionCheck::Corrupt);
            }
        };
        if session.is_expired(self.now()) {
            Ok(SessionCheck::Expired(session))
        } else {
            Ok(SessionCheck::Active(session))
        }
    }

    /// Active session or nothing; expired and corrupt slots are cleared on the way.
    pub fn require_active(&self, kind: SessionKind) -> ServiceResult<Option<Session>> {
        match self.inspect(kind)? {
            SessionCheck::Active(session) => Ok(Some(session)),
            SessionCheck::Missing => Ok(None),
            SessionCheck::Expired(_) | SessionCheck::Corrupt => {
                self.clear(kind)?;
                Ok(None)
            }
        }
    }

    pub fn clear(&self, kind: SessionKind) -> ServiceResult<()> {
        self.storage.remove_item(kind.storage_key())
    }
}
