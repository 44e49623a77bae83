//! Persistent index from cache keys to store handles.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use parking_lot::{Mutex, RwLock};
use pulith_fs::{AtomicWriteOptions, Transaction, atomic_read, atomic_write};
use pulith_store::Store;
use tracing::{debug, warn};

use super::blocking::run_blocking;
use crate::core::CacheKey;
use crate::data::{CacheEntry, CachePolicy};
use crate::error::Result;

const ENTRIES: &str = "entries";
const ACCESS: &str = "access.json";
const LOCK: &str = "index.lock";

/// Cache index backed by one JSON document per entry.
///
/// ```text
/// <dir>/
///   entries/<key>.json   one CacheEntry each, replaced atomically
///   access.json          last access per key, written by flush()
///   index.lock           held while mutating entries/
/// ```
///
/// An entry is only trusted while every object it references is present in
/// the store; anything else is evicted on read and reported as a miss.
pub struct CacheIndex {
    dir: PathBuf,
    store: Arc<dyn Store>,
    policy: CachePolicy,
    entries: RwLock<HashMap<CacheKey, CacheEntry>>,
    access: Mutex<HashMap<CacheKey, DateTime<Utc>>>,
}

impl std::fmt::Debug for CacheIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheIndex")
            .field("dir", &self.dir)
            .field("policy", &self.policy)
            .field("entries", &self.entries.read().len())
            .finish_non_exhaustive()
    }
}

impl CacheIndex {
    /// Open or create the index in `dir`, loading every readable entry.
    pub fn open(dir: impl Into<PathBuf>, store: Arc<dyn Store>, policy: CachePolicy) -> Result<Self> {
        let dir = dir.into();
        let entries_dir = dir.join(ENTRIES);
        fs::create_dir_all(&entries_dir).map_err(|e| write_error(&entries_dir, e))?;

        let mut entries = HashMap::new();
        let listing = fs::read_dir(&entries_dir).map_err(|e| read_error(&entries_dir, e))?;
        for item in listing {
            let path = item.map_err(|e| read_error(&entries_dir, e))?.path();
            let Some(key) = entry_key(&path) else {
                continue;
            };
            if let Some(entry) = load_entry(&path, &key) {
                entries.insert(key, entry);
            }
        }

        let mut access = load_access(&dir.join(ACCESS));
        access.retain(|key, _| entries.contains_key(key));
        for (key, entry) in &entries {
            access.entry(key.clone()).or_insert(entry.stored_at);
        }

        debug!(dir = %dir.display(), entries = entries.len(), "opened cache index");
        Ok(Self {
            dir,
            store,
            policy,
            entries: RwLock::new(entries),
            access: Mutex::new(access),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn policy(&self) -> CachePolicy {
        self.policy
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Look up `key`. Expired entries are returned too; callers decide
    /// whether to revalidate with [`CacheEntry::is_expired`].
    pub fn get(&self, key: &CacheKey) -> Option<CacheEntry> {
        let cached = self.entries.read().get(key).cloned();
        let entry = match cached {
            Some(entry) => entry,
            None => {
                let entry = load_entry(&self.entry_path(key), key)?;
                self.entries.write().insert(key.clone(), entry.clone());
                entry
            }
        };

        if let Some(missing) = entry
            .referenced_objects()
            .into_iter()
            .find(|hash| !self.store.contains(hash))
        {
            warn!(%key, %missing, url = %entry.url, "cache entry references a missing object; evicting");
            if let Err(e) = self.evict(key) {
                warn!(%key, error = %e, "failed to evict dangling cache entry");
            }
            return None;
        }

        self.touch(key);
        Some(entry)
    }

    /// Write `entry`, replacing any previous entry for its key. The objects
    /// it references must already be committed to the store.
    pub fn put(&self, entry: CacheEntry) -> Result<()> {
        let json = serde_json::to_vec_pretty(&entry)?;
        {
            let _lock = Transaction::open_locked(self.dir.join(LOCK))?;
            atomic_write(
                self.entry_path(&entry.key),
                &json,
                AtomicWriteOptions::new().sync(true),
            )?;
        }

        debug!(key = %entry.key, url = %entry.url, "stored cache entry");
        self.access.lock().insert(entry.key.clone(), Utc::now());
        self.entries.write().insert(entry.key.clone(), entry);
        Ok(())
    }

    /// [`get`](Self::get) on the blocking pool, for use from async code.
    pub async fn lookup(self: &Arc<Self>, key: &CacheKey) -> Result<Option<CacheEntry>> {
        let index = Arc::clone(self);
        let key = key.clone();
        run_blocking(move || Ok(index.get(&key))).await
    }

    /// [`put`](Self::put) on the blocking pool. Waiting on another process's
    /// `index.lock` never stalls the runtime.
    pub async fn commit(self: &Arc<Self>, entry: CacheEntry) -> Result<()> {
        let index = Arc::clone(self);
        run_blocking(move || index.put(entry)).await
    }

    /// Remove `key`. Returns whether an entry existed.
    pub fn evict(&self, key: &CacheKey) -> Result<bool> {
        let path = self.entry_path(key);
        let removed_file = {
            let _lock = Transaction::open_locked(self.dir.join(LOCK))?;
            match fs::remove_file(&path) {
                Ok(()) => true,
                Err(e) if e.kind() == io::ErrorKind::NotFound => false,
                Err(e) => return Err(write_error(&path, e).into()),
            }
        };
        self.access.lock().remove(key);
        let removed_entry = self.entries.write().remove(key).is_some();
        Ok(removed_file || removed_entry)
    }

    /// Record an access to `key` for [`prune`](Self::prune).
    pub fn touch(&self, key: &CacheKey) {
        self.access.lock().insert(key.clone(), Utc::now());
    }

    /// Evict entries not accessed within `max_idle`. Returns how many were
    /// removed.
    pub fn prune(&self, max_idle: Duration) -> Result<usize> {
        let max_idle = TimeDelta::from_std(max_idle).unwrap_or(TimeDelta::MAX);
        let Some(cutoff) = Utc::now().checked_sub_signed(max_idle) else {
            return Ok(0);
        };

        let idle: Vec<CacheKey> = {
            let entries = self.entries.read();
            let access = self.access.lock();
            entries
                .iter()
                .filter(|(key, entry)| {
                    access.get(*key).copied().unwrap_or(entry.stored_at) <= cutoff
                })
                .map(|(key, _)| key.clone())
                .collect()
        };

        let mut removed = 0;
        for key in &idle {
            if self.evict(key)? {
                removed += 1;
            }
        }
        if removed > 0 {
            debug!(removed, "pruned idle cache entries");
        }
        Ok(removed)
    }

    /// Persist access times.
    pub fn flush(&self) -> Result<()> {
        let json = serde_json::to_vec(&*self.access.lock())?;
        let _lock = Transaction::open_locked(self.dir.join(LOCK))?;
        atomic_write(self.dir.join(ACCESS), &json, AtomicWriteOptions::new())?;
        Ok(())
    }

    pub fn close(self) -> Result<()> {
        self.flush()
    }

    fn entry_path(&self, key: &CacheKey) -> PathBuf {
        self.dir.join(ENTRIES).join(format!("{key}.json"))
    }
}

fn entry_key(path: &Path) -> Option<CacheKey> {
    if path.extension()? != "json" {
        return None;
    }
    CacheKey::parse(path.file_stem()?.to_str()?)
}

/// Read and parse one entry file. Unreadable or mismatched files are removed.
fn load_entry(path: &Path, key: &CacheKey) -> Option<CacheEntry> {
    let bytes = match atomic_read(path) {
        Ok(bytes) => bytes,
        Err(pulith_fs::Error::Read { source, .. }) if source.kind() == io::ErrorKind::NotFound => {
            return None;
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "unreadable cache entry");
            return None;
        }
    };

    match serde_json::from_slice::<CacheEntry>(&bytes) {
        Ok(entry) if &entry.key == key => Some(entry),
        Ok(entry) => {
            warn!(path = %path.display(), found = %entry.key, "cache entry stored under the wrong key; removing");
            let _ = fs::remove_file(path);
            None
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "corrupt cache entry; removing");
            let _ = fs::remove_file(path);
            None
        }
    }
}

fn load_access(path: &Path) -> HashMap<CacheKey, DateTime<Utc>> {
    let Ok(bytes) = atomic_read(path) else {
        return HashMap::new();
    };
    serde_json::from_slice(&bytes).unwrap_or_else(|e| {
        warn!(path = %path.display(), error = %e, "ignoring corrupt access log");
        HashMap::new()
    })
}

fn read_error(path: &Path, source: io::Error) -> pulith_fs::Error {
    pulith_fs::Error::Read {
        path: path.to_path_buf(),
        source,
    }
}

fn write_error(path: &Path, source: io::Error) -> pulith_fs::Error {
    pulith_fs::Error::Write {
        path: path.to_path_buf(),
        source,
    }
}
