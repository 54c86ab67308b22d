//! Durable client-side cache bridging restarts.
//!
//! Holds the session (`token`, `user`) and an optional warm-start snapshot of
//! the dashboard documents (`documents`). The snapshot is only ever shown
//! while a live fetch is pending; it is never used as a fetch source.

use crate::error::CacheError;
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use tokio::sync::{Mutex, RwLock};

pub const TOKEN_KEY: &str = "token";
pub const USER_KEY: &str = "user";
pub const DOCUMENTS_KEY: &str = "documents";

/// Every key written by this crate. Sign-out removes all of them together.
pub const ALL_KEYS: [&str; 3] = [TOKEN_KEY, USER_KEY, DOCUMENTS_KEY];

#[async_trait]
pub trait DurableCache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    async fn set(&self, key: &str, value: String) -> Result<(), CacheError>;

    /// Removes all `keys` in one step.
    async fn remove_many(&self, keys: &[&str]) -> Result<(), CacheError>;
}

/// Process-local cache, used in tests and for ephemeral sessions.
#[derive(Default)]
pub struct MemoryCache {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl DurableCache for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: String) -> Result<(), CacheError> {
        self.entries.write().await.insert(key.to_string(), value);
        Ok(())
    }

    async fn remove_many(&self, keys: &[&str]) -> Result<(), CacheError> {
        let mut entries = self.entries.write().await;
        for key in keys {
            entries.remove(*key);
        }
        Ok(())
    }
}

/// JSON map persisted to a single file.
///
/// Each mutation rewrites the whole file through a temporary sibling and a
/// rename, so readers never observe a half-written map.
pub struct FileCache {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> Result<BTreeMap<String, String>, CacheError> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) if bytes.is_empty() => Ok(BTreeMap::new()),
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(e.into()),
        }
    }

    async fn store(&self, entries: &BTreeMap<String, String>) -> Result<(), CacheError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let tmp = self.path.with_extension("tmp");
        tokio::fs::write(&tmp, serde_json::to_vec_pretty(entries)?).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl DurableCache for FileCache {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let _guard = self.lock.lock().await;
        Ok(self.load().await?.remove(key))
    }

    async fn set(&self, key: &str, value: String) -> Result<(), CacheError> {
        let _guard = self.lock.lock().await;
        let mut entries = self.load().await?;
        entries.insert(key.to_string(), value);
        self.store(&entries).await
    }

    async fn remove_many(&self, keys: &[&str]) -> Result<(), CacheError> {
        let _guard = self.lock.lock().await;
        let mut entries = match self.load().await {
            Ok(entries) => entries,
            // A corrupt file is replaced rather than blocking sign-out.
            Err(CacheError::Corrupt(e)) => {
                tracing::warn!(path = %self.path.display(), error = %e, "Discarding corrupt cache file");
                BTreeMap::new()
            }
            Err(e) => return Err(e),
        };
        let before = entries.len();
        for key in keys {
            entries.remove(*key);
        }
        if entries.len() == before && tokio::fs::metadata(&self.path).await.is_err() {
            return Ok(());
        }
        self.store(&entries).await
    }
}
