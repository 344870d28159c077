//! JSON file store
//!
//! The whole dataset lives in one JSON document on disk. Reads are served from
//! memory while the file's modification time is unchanged; writes replace the
//! file atomically and refresh the cache.

use crate::error::AppError;
use crate::models::AppData;
use chrono::Utc;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::SystemTime;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, warn};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Data file {path} could not be parsed: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to serialize data: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl StoreError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

#[derive(Debug, Default)]
struct CacheState {
    last_modified: Option<SystemTime>,
    cached_value: Option<AppData>,
}

/// File-backed store for [`AppData`], shared by all handlers
#[derive(Debug)]
pub struct DataStore {
    path: PathBuf,
    cache: Mutex<CacheState>,
    disk_loads: AtomicU64,
}

impl DataStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            cache: Mutex::new(CacheState::default()),
            disk_loads: AtomicU64::new(0),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of times the file has actually been read and parsed
    pub fn disk_loads(&self) -> u64 {
        self.disk_loads.load(Ordering::Relaxed)
    }

    /// Current dataset, from the cache when the file is unchanged
    pub async fn read(&self) -> Result<AppData, StoreError> {
        let mut cache = self.cache.lock().await;
        self.load(&mut cache).await
    }

    /// Replace the whole dataset
    #[cfg(test)]
    pub async fn write(&self, data: AppData) -> Result<AppData, StoreError> {
        let mut cache = self.cache.lock().await;
        self.persist(&mut cache, data).await
    }

    /// Read, mutate and write back under one lock.
    ///
    /// Nothing is written when `apply` fails.
    pub async fn update<T, F>(&self, apply: F) -> Result<T, AppError>
    where
        F: FnOnce(&mut AppData) -> Result<T, AppError>,
    {
        let mut cache = self.cache.lock().await;
        let mut data = self.load(&mut cache).await?;
        let output = apply(&mut data)?;
        self.persist(&mut cache, data).await?;
        Ok(output)
    }

    async fn load(&self, cache: &mut CacheState) -> Result<AppData, StoreError> {
        let metadata = match tokio::fs::metadata(&self.path).await {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("Data file {} does not exist yet, starting empty", self.path.display());
                return Ok(AppData::default());
            }
            Err(e) => return Err(StoreError::io(&self.path, e)),
        };
        let modified = metadata.modified().ok();

        if let (Some(modified), Some(cached)) = (modified, cache.cached_value.as_ref()) {
            if cache.last_modified == Some(modified) {
                return Ok(cached.clone());
            }
        }

        let bytes = tokio::fs::read(&self.path)
            .await
            .map_err(|e| StoreError::io(&self.path, e))?;
        let data: AppData = serde_json::from_slice(&bytes).map_err(|source| StoreError::Parse {
            path: self.path.clone(),
            source,
        })?;
        self.disk_loads.fetch_add(1, Ordering::Relaxed);
        debug!(
            "Loaded {} requests and {} clubs from {}",
            data.requests.len(),
            data.map_points.len(),
            self.path.display()
        );

        cache.last_modified = modified;
        cache.cached_value = Some(data.clone());
        Ok(data)
    }

    async fn persist(&self, cache: &mut CacheState, mut data: AppData) -> Result<AppData, StoreError> {
        data.last_updated = Some(Utc::now());
        let json = serde_json::to_vec_pretty(&data)?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| StoreError::io(parent, e))?;
        }

        let tmp_path = self.temp_path();
        tokio::fs::write(&tmp_path, &json)
            .await
            .map_err(|e| StoreError::io(&tmp_path, e))?;
        if let Err(e) = tokio::fs::rename(&tmp_path, &self.path).await {
            if let Err(cleanup) = tokio::fs::remove_file(&tmp_path).await {
                warn!("Failed to remove {}: {}", tmp_path.display(), cleanup);
            }
            return Err(StoreError::io(&self.path, e));
        }

        let modified = tokio::fs::metadata(&self.path)
            .await
            .map_err(|e| StoreError::io(&self.path, e))?
            .modified()
            .ok();
        cache.last_modified = modified;
        cache.cached_value = Some(data.clone());

        debug!("Wrote {} bytes to {}", json.len(), self.path.display());
        Ok(data)
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "data.json".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}
