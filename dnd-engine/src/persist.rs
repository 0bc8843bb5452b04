//! Record persistence and per-key locking.
//!
//! Each record is one JSON file wrapped in a versioned envelope. Writes keep
//! a shadow copy of the previous file so a failed write can be rolled back.
//! [`KeyedLocks`] hands out one async mutex per record key so a whole
//! load-mutate-persist cycle runs exclusively.

use futures::future::BoxFuture;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::io::ErrorKind;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};
use thiserror::Error;
use tokio::fs;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::{debug, warn};

/// Errors from persistence operations.
#[derive(Debug, Error)]
pub enum PersistError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Version mismatch: expected {expected}, found {found}")]
    VersionMismatch { expected: u32, found: u32 },

    #[error("Write of record '{key}' failed (previous version restored: {restored}): {source}")]
    WriteFailed {
        key: String,
        restored: bool,
        #[source]
        source: std::io::Error,
    },
}

/// Current record format version.
const RECORD_VERSION: u32 = 1;

#[derive(Serialize)]
struct EnvelopeRef<'a, T> {
    version: u32,
    data: &'a T,
}

#[derive(Deserialize)]
struct Envelope<T> {
    version: u32,
    data: T,
}

/// Final step of a save: put the serialized record at its path.
type WriteFn = for<'a> fn(&'a Path, String) -> BoxFuture<'a, std::io::Result<()>>;

fn write_file(path: &Path, content: String) -> BoxFuture<'_, std::io::Result<()>> {
    Box::pin(fs::write(path, content))
}

/// A directory of JSON records of one type, keyed by string id.
pub struct RecordStore<T> {
    dir: PathBuf,
    write: WriteFn,
    _marker: PhantomData<fn() -> T>,
}

impl<T> fmt::Debug for RecordStore<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordStore")
            .field("dir", &self.dir)
            .finish_non_exhaustive()
    }
}

impl<T> RecordStore<T>
where
    T: Serialize + DeserializeOwned,
{
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            write: write_file,
            _marker: PhantomData,
        }
    }

    #[cfg(test)]
    fn with_writer(mut self, write: WriteFn) -> Self {
        self.write = write;
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the record for `key`.
    pub fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", escape_key(key)))
    }

    fn shadow_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json.bak", escape_key(key)))
    }

    /// Load a record. A missing file is `Ok(None)`.
    pub async fn load(&self, key: &str) -> Result<Option<T>, PersistError> {
        let content = match fs::read_to_string(self.path_for(key)).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let envelope: Envelope<T> = serde_json::from_str(&content)?;
        if envelope.version != RECORD_VERSION {
            return Err(PersistError::VersionMismatch {
                expected: RECORD_VERSION,
                found: envelope.version,
            });
        }
        Ok(Some(envelope.data))
    }

    /// Write a record.
    ///
    /// The existing file is copied to a `.bak` shadow first. If the write
    /// fails the shadow is copied back and the failure is returned; on
    /// success the shadow is removed.
    pub async fn save(&self, key: &str, value: &T) -> Result<(), PersistError> {
        let content = serde_json::to_string_pretty(&EnvelopeRef {
            version: RECORD_VERSION,
            data: value,
        })?;
        fs::create_dir_all(&self.dir).await?;

        let path = self.path_for(key);
        let shadow = self.shadow_path(key);
        let has_shadow = match fs::copy(&path, &shadow).await {
            Ok(_) => true,
            Err(e) if e.kind() == ErrorKind::NotFound => false,
            Err(e) => return Err(e.into()),
        };

        if let Err(source) = (self.write)(&path, content).await {
            let restored = has_shadow && fs::copy(&shadow, &path).await.is_ok();
            warn!(key, restored, error = %source, "record write failed");
            return Err(PersistError::WriteFailed {
                key: key.to_string(),
                restored,
                source,
            });
        }

        if has_shadow {
            if let Err(e) = fs::remove_file(&shadow).await {
                debug!(key, error = %e, "could not remove shadow copy");
            }
        }
        Ok(())
    }

    /// Delete a record. Returns false if there was nothing to delete.
    pub async fn delete(&self, key: &str) -> Result<bool, PersistError> {
        match fs::remove_file(self.path_for(key)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

/// Make a key safe as a file stem.
///
/// ASCII alphanumerics and `-` pass through; every other byte becomes `_XX`.
/// `_` itself is escaped, so two distinct keys never share a file.
pub fn escape_key(key: &str) -> String {
    let mut escaped = String::with_capacity(key.len());
    for byte in key.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'-' {
            escaped.push(byte as char);
        } else {
            escaped.push_str(&format!("_{byte:02x}"));
        }
    }
    escaped
}

/// One async mutex per key, created on demand.
///
/// Entries are held weakly and pruned once no task holds or waits on them,
/// so the registry does not grow with every id ever seen.
#[derive(Debug, Default)]
pub struct KeyedLocks {
    locks: Mutex<HashMap<String, Weak<AsyncMutex<()>>>>,
}

impl KeyedLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `key`.
    pub async fn lock(&self, key: &str) -> OwnedMutexGuard<()> {
        let mutex = {
            let mut locks = self.locks.lock();
            locks.retain(|_, weak| weak.strong_count() > 0);
            match locks.get(key).and_then(Weak::upgrade) {
                Some(existing) => existing,
                None => {
                    let created = Arc::new(AsyncMutex::new(()));
                    locks.insert(key.to_string(), Arc::downgrade(&created));
                    created
                }
            }
        };
        mutex.lock_owned().await
    }

    /// Number of keys currently held or awaited.
    pub fn active(&self) -> usize {
        let locks = self.locks.lock();
        locks.values().filter(|weak| weak.strong_count() > 0).count()
    }
}
