//! Best-effort JSON-backed mappings on local disk.
//!
//! Two independent files: download counts by key, and the RFC 3339 instant
//! each key was first uploaded. Reads fail soft to an empty mapping; write
//! failures are logged and swallowed so the file-transfer operation that
//! triggered the bookkeeping never fails on it. Each read-modify-write
//! cycle runs under the store's own mutex, so parallel requests within
//! one process cannot clobber each other's entries.

use chrono::{DateTime, Utc};
use serde::{Serialize, de::DeserializeOwned};
use std::{
    collections::HashMap,
    path::{Path, PathBuf},
};
use tokio::{fs, sync::Mutex};
use tracing::warn;

async fn load_mapping<V: DeserializeOwned>(path: &Path) -> HashMap<String, V> {
    match fs::read(path).await {
        Ok(bytes) => serde_json::from_slice(&bytes).unwrap_or_default(),
        Err(_) => HashMap::new(),
    }
}

async fn store_mapping<V: Serialize>(path: &Path, mapping: &HashMap<String, V>) {
    let payload = match serde_json::to_vec_pretty(mapping) {
        Ok(payload) => payload,
        Err(err) => {
            warn!("could not serialize {}: {}", path.display(), err);
            return;
        }
    };
    if let Err(err) = fs::write(path, payload).await {
        warn!("could not write {}: {}", path.display(), err);
    }
}

/// Per-key download counters.
pub struct CounterStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl CounterStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    /// Current counts. A missing or unreadable file reads as empty; an
    /// absent key means zero downloads.
    pub async fn read(&self) -> HashMap<String, u64> {
        load_mapping(&self.path).await
    }

    /// Bump the count for `key` by one. The guard covers the whole
    /// read-modify-write cycle and is released on every exit path.
    pub async fn increment(&self, key: &str) {
        let _guard = self.lock.lock().await;
        let mut counts = load_mapping::<u64>(&self.path).await;
        *counts.entry(key.to_string()).or_insert(0) += 1;
        store_mapping(&self.path, &counts).await;
    }
}

/// First-upload instants by key, kept as RFC 3339 strings at rest so the
/// quota accountant can apply its fail-open rule to entries that no
/// longer parse.
pub struct UploadLog {
    path: PathBuf,
    lock: Mutex<()>,
}

impl UploadLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    /// Raw timestamp strings by key. Fails soft to empty.
    pub async fn read(&self) -> HashMap<String, String> {
        load_mapping(&self.path).await
    }

    /// Record when `key` was uploaded. Written once per key; a later call
    /// for the same key leaves the original entry untouched.
    pub async fn record(&self, key: &str, at: DateTime<Utc>) {
        let _guard = self.lock.lock().await;
        let mut entries = load_mapping::<String>(&self.path).await;
        entries
            .entry(key.to_string())
            .or_insert_with(|| at.to_rfc3339());
        store_mapping(&self.path, &entries).await;
    }
}
