//! Client-local key/value storage and the persisted dismissal record.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tempfile::NamedTempFile;

use swlife_core::DismissalRecord;

use crate::error::PlatformError;

/// Default storage key of the install-banner dismissal timestamp.
pub const DISMISSAL_KEY: &str = "pwa-install-dismissed";

/// String-keyed local storage. Last write wins.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, PlatformError>;
    fn set(&self, key: &str, value: &str) -> Result<(), PlatformError>;
    fn remove(&self, key: &str) -> Result<(), PlatformError>;
}

impl<T: KeyValueStore + ?Sized> KeyValueStore for std::sync::Arc<T> {
    fn get(&self, key: &str) -> Result<Option<String>, PlatformError> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<(), PlatformError> {
        (**self).set(key, value)
    }

    fn remove(&self, key: &str) -> Result<(), PlatformError> {
        (**self).remove(key)
    }
}

// ─── MemoryStore ──────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct MemoryStore {
    map: Mutex<BTreeMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, String>> {
        // A poisoned map still holds consistent string pairs.
        self.map.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, PlatformError> {
        Ok(self.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), PlatformError> {
        self.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), PlatformError> {
        self.lock().remove(key);
        Ok(())
    }
}

// ─── FileStore ────────────────────────────────────────────────────

/// JSON object file, rewritten atomically (temp file + rename) on each write.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_map(&self) -> Result<BTreeMap<String, String>, PlatformError> {
        match std::fs::read_to_string(&self.path) {
            Ok(content) if content.trim().is_empty() => Ok(BTreeMap::new()),
            Ok(content) => Ok(serde_json::from_str(&content)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(e.into()),
        }
    }

    fn write_map(&self, map: &BTreeMap<String, String>) -> Result<(), PlatformError> {
        let dir = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        std::fs::create_dir_all(dir)?;

        let mut tmp = NamedTempFile::new_in(dir)?;
        let output = serde_json::to_string_pretty(map)?;
        tmp.write_all(output.as_bytes())?;
        tmp.write_all(b"\n")?;
        tmp.flush()?;
        tmp.persist(&self.path).map_err(|e| e.error)?;
        Ok(())
    }

    fn modify(
        &self,
        f: impl FnOnce(&mut BTreeMap<String, String>),
    ) -> Result<(), PlatformError> {
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut map = self.read_map()?;
        f(&mut map);
        self.write_map(&map)
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, PlatformError> {
        Ok(self.read_map()?.remove(key))
    }

    fn set(&self, key: &str, value: &str) -> Result<(), PlatformError> {
        self.modify(|map| {
            map.insert(key.to_string(), value.to_string());
        })
    }

    fn remove(&self, key: &str) -> Result<(), PlatformError> {
        self.modify(|map| {
            map.remove(key);
        })
    }
}

// ─── Dismissal record ─────────────────────────────────────────────

/// Read the dismissal record. Missing, unreadable, or corrupt values count
/// as "no record" so the install banner can never crash start-up.
pub fn load_dismissal(store: &dyn KeyValueStore, key: &str) -> Option<DismissalRecord> {
    let raw = match store.get(key) {
        Ok(Some(raw)) => raw,
        Ok(None) => return None,
        Err(e) => {
            tracing::warn!(key, "failed to read dismissal record: {e}");
            return None;
        }
    };
    match raw.trim().parse::<i64>() {
        Ok(timestamp_ms) => Some(DismissalRecord::at(timestamp_ms)),
        Err(e) => {
            tracing::warn!(key, value = %raw, "ignoring corrupt dismissal record: {e}");
            None
        }
    }
}

/// Persist the record as a plain epoch-millisecond string.
pub fn save_dismissal(
    store: &dyn KeyValueStore,
    key: &str,
    record: DismissalRecord,
) -> Result<(), PlatformError> {
    store.set(key, &record.timestamp_ms.to_string())
}
