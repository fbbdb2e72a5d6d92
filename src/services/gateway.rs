//! Request orchestration: unique key assignment, upload ingest, download
//! serving, and listing assembly.

use crate::{
    errors::GatewayError,
    models::{object::ObjectMeta, usage::UsageSnapshot},
    services::{
        object_store::{ObjectDownload, ObjectStore},
        persist::{CounterStore, UploadLog},
        quota,
    },
};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::Stream;
use std::{
    io,
    path::{Path, PathBuf},
    sync::Arc,
};
use tracing::info;

/// Everything the orchestrator needs beyond its collaborators: link bases
/// for templated URLs, the local data directory, and accounting knobs.
/// Constructed once at startup and injected; there is no global state.
#[derive(Clone, Debug)]
pub struct GatewaySettings {
    /// Base URL of this gateway, no trailing slash.
    pub public_base_url: String,
    /// Public base URL of the store itself, no trailing slash.
    pub store_public_url: String,
    /// Directory holding the persisted counter and history files.
    pub data_dir: PathBuf,
    /// Monthly quota ceiling in bytes.
    pub quota_limit: u64,
    /// Upper bound on collision probes before giving up on a name.
    pub max_key_probes: u32,
}

/// A successfully ingested upload.
#[derive(Clone, Debug)]
pub struct UploadReceipt {
    pub key: String,
    pub local_url: String,
    pub public_url: String,
}

/// One listing row: store metadata enriched with links and its download count.
pub struct FileEntry {
    pub meta: ObjectMeta,
    pub local_url: String,
    pub public_url: String,
    pub download_count: u64,
}

pub struct FileListing {
    pub files: Vec<FileEntry>,
    pub stats: UsageSnapshot,
}

/// Shared application state carried by the router.
#[derive(Clone)]
pub struct Gateway<S> {
    store: S,
    counters: Arc<CounterStore>,
    uploads: Arc<UploadLog>,
    settings: Arc<GatewaySettings>,
}

impl<S: ObjectStore> Gateway<S> {
    pub fn new(
        store: S,
        counters: CounterStore,
        uploads: UploadLog,
        settings: GatewaySettings,
    ) -> Self {
        Self {
            store,
            counters: Arc::new(counters),
            uploads: Arc::new(uploads),
            settings: Arc::new(settings),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn data_dir(&self) -> &Path {
        &self.settings.data_dir
    }

    fn local_url(&self, key: &str) -> String {
        format!("{}/api/serve-file/{}", self.settings.public_base_url, key)
    }

    fn public_url(&self, key: &str) -> String {
        format!("{}/{}", self.settings.store_public_url, key)
    }

    /// Derive a key that does not collide with any stored object.
    ///
    /// Probes `name`, then `name (1).ext`, `name (2).ext`, … up to the
    /// configured bound. The probe and the subsequent put are not atomic;
    /// two concurrent uploads of the same name can still race on the final
    /// write (last writer wins, no corruption).
    pub async fn resolve_unique_key(&self, desired: &str) -> Result<String, GatewayError> {
        if self.store.head(desired).await?.is_none() {
            return Ok(desired.to_string());
        }
        let (stem, extension) = split_extension(desired);
        for n in 1..=self.settings.max_key_probes {
            let candidate = format!("{stem} ({n}){extension}");
            if self.store.head(&candidate).await?.is_none() {
                return Ok(candidate);
            }
        }
        Err(GatewayError::KeyNamespaceExhausted {
            name: desired.to_string(),
        })
    }

    /// Ingest one upload: assign a key, stream the body to the store, then
    /// record the upload instant. A history write failure is not an upload
    /// failure; the object is already durably stored by then.
    pub async fn ingest<B>(
        &self,
        desired_name: &str,
        content_type: Option<String>,
        body: B,
    ) -> Result<UploadReceipt, GatewayError>
    where
        B: Stream<Item = io::Result<Bytes>> + Send,
    {
        let key = self.resolve_unique_key(desired_name).await?;
        let written = self.store.put_stream(&key, content_type, body).await?;
        self.uploads.record(&key, Utc::now()).await;
        info!("stored `{}` ({} bytes)", key, written);
        Ok(UploadReceipt {
            local_url: self.local_url(&key),
            public_url: self.public_url(&key),
            key,
        })
    }

    /// Open an object for download. The counter is bumped as soon as the
    /// object is known to exist, before any body bytes move, so a stream
    /// that fails partway still counts.
    pub async fn serve(&self, key: &str) -> Result<ObjectDownload, GatewayError> {
        let download = self.store.get(key).await?;
        self.counters.increment(key).await;
        Ok(download)
    }

    /// Enumerate the store and assemble per-file rows plus the usage
    /// snapshot, newest first. Store enumeration failure fails the whole
    /// listing; the bookkeeping reads each fail soft to empty.
    pub async fn list_files(&self, now: DateTime<Utc>) -> Result<FileListing, GatewayError> {
        let objects = self.store.list().await?;
        let counts = self.counters.read().await;
        let uploads = self.uploads.read().await;
        let stats = quota::compute_usage(&objects, &uploads, now, self.settings.quota_limit);

        let mut files: Vec<FileEntry> = objects
            .into_iter()
            .map(|meta| FileEntry {
                local_url: self.local_url(&meta.key),
                public_url: self.public_url(&meta.key),
                download_count: counts.get(&meta.key).copied().unwrap_or(0),
                meta,
            })
            .collect();
        files.sort_by(|a, b| b.meta.last_modified.cmp(&a.meta.last_modified));

        Ok(FileListing { files, stats })
    }
}

/// Split `name.ext` into (`name`, `.ext`). Names without an extension, or
/// dotfiles like `.env`, keep the whole name as the stem.
fn split_extension(name: &str) -> (&str, &str) {
    match name.rfind('.') {
        Some(idx) if idx > 0 => name.split_at(idx),
        _ => (name, ""),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::mock_store::MemoryStore;
    use chrono::TimeZone;
    use futures::StreamExt;
    use tempfile::TempDir;

    fn gateway(dir: &TempDir, store: MemoryStore) -> Gateway<MemoryStore> {
        Gateway::new(
            store,
            CounterStore::new(dir.path().join("download_counts.json")),
            UploadLog::new(dir.path().join("upload_history.json")),
            GatewaySettings {
                public_base_url: "http://localhost".to_string(),
                store_public_url: "https://cdn.example.com".to_string(),
                data_dir: dir.path().to_path_buf(),
                quota_limit: quota::DEFAULT_QUOTA_LIMIT,
                max_key_probes: 1000,
            },
        )
    }

    fn body(data: &'static [u8]) -> impl Stream<Item = io::Result<Bytes>> + Send {
        futures::stream::iter(vec![Ok(Bytes::from_static(data))])
    }

    fn at(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 8, day, 0, 0, 0).unwrap()
    }

    #[test]
    fn extension_split_matches_upload_names() {
        assert_eq!(split_extension("report.pdf"), ("report", ".pdf"));
        assert_eq!(split_extension("archive.tar.gz"), ("archive.tar", ".gz"));
        assert_eq!(split_extension("README"), ("README", ""));
        assert_eq!(split_extension(".env"), (".env", ""));
    }

    #[tokio::test]
    async fn free_names_are_kept_and_taken_names_get_a_suffix() {
        let dir = tempfile::tempdir().unwrap();
        let store = MemoryStore::new();
        let gw = gateway(&dir, store.clone());

        let first = gw
            .ingest("report.pdf", Some("application/pdf".into()), body(b"one"))
            .await
            .unwrap();
        assert_eq!(first.key, "report.pdf");
        assert_eq!(first.local_url, "http://localhost/api/serve-file/report.pdf");
        assert_eq!(first.public_url, "https://cdn.example.com/report.pdf");

        let second = gw
            .ingest("report.pdf", Some("application/pdf".into()), body(b"two"))
            .await
            .unwrap();
        assert_eq!(second.key, "report (1).pdf");
        assert!(store.contains("report.pdf"));
        assert!(store.contains("report (1).pdf"));
    }

    #[tokio::test]
    async fn resolver_skips_every_taken_candidate() {
        let dir = tempfile::tempdir().unwrap();
        let store = MemoryStore::new();
        store.insert("report.pdf", b"a", at(1));
        store.insert("report (1).pdf", b"b", at(1));
        let gw = gateway(&dir, store);

        assert_eq!(
            gw.resolve_unique_key("report.pdf").await.unwrap(),
            "report (2).pdf"
        );
        assert_eq!(gw.resolve_unique_key("fresh.txt").await.unwrap(), "fresh.txt");
    }

    #[tokio::test]
    async fn a_crowded_namespace_is_an_explicit_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = MemoryStore::new();
        store.insert("dup.txt", b"a", at(1));
        store.insert("dup (1).txt", b"b", at(1));
        store.insert("dup (2).txt", b"c", at(1));
        let gw = Gateway::new(
            store,
            CounterStore::new(dir.path().join("download_counts.json")),
            UploadLog::new(dir.path().join("upload_history.json")),
            GatewaySettings {
                public_base_url: "http://localhost".to_string(),
                store_public_url: "https://cdn.example.com".to_string(),
                data_dir: dir.path().to_path_buf(),
                quota_limit: quota::DEFAULT_QUOTA_LIMIT,
                max_key_probes: 2,
            },
        );

        assert!(matches!(
            gw.resolve_unique_key("dup.txt").await,
            Err(GatewayError::KeyNamespaceExhausted { .. })
        ));
    }

    #[tokio::test]
    async fn downloads_are_counted_per_key() {
        let dir = tempfile::tempdir().unwrap();
        let store = MemoryStore::new();
        let gw = gateway(&dir, store.clone());

        store.set_now(at(1));
        gw.ingest("a.txt", None, body(b"aaa")).await.unwrap();
        store.set_now(at(2));
        gw.ingest("b.txt", None, body(b"bbbb")).await.unwrap();

        let download = gw.serve("a.txt").await.unwrap();
        assert_eq!(download.meta.key, "a.txt");
        let chunks: Vec<_> = download.body.collect().await;
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].as_ref().unwrap().as_ref(), b"aaa".as_slice());

        let listing = gw.list_files(at(7)).await.unwrap();
        assert_eq!(listing.files.len(), 2);
        // newest first
        assert_eq!(listing.files[0].meta.key, "b.txt");
        assert_eq!(listing.files[0].download_count, 0);
        assert_eq!(listing.files[1].meta.key, "a.txt");
        assert_eq!(listing.files[1].download_count, 1);
    }

    #[tokio::test]
    async fn listing_reports_usage_from_the_upload_log() {
        let dir = tempfile::tempdir().unwrap();
        let store = MemoryStore::new();
        let gw = gateway(&dir, store.clone());

        store.set_now(at(3));
        gw.ingest("fresh.bin", None, body(b"12345678")).await.unwrap();

        let listing = gw.list_files(at(7)).await.unwrap();
        assert_eq!(listing.stats.total_files, 1);
        assert_eq!(listing.stats.total_size, 8);
        assert_eq!(listing.stats.current_period_size, 8);
        assert_eq!(
            listing.stats.remaining_quota,
            quota::DEFAULT_QUOTA_LIMIT - 8
        );
    }

    #[tokio::test]
    async fn serving_a_missing_key_is_not_found_and_uncounted() {
        let dir = tempfile::tempdir().unwrap();
        let gw = gateway(&dir, MemoryStore::new());

        assert!(matches!(
            gw.serve("nope.txt").await,
            Err(GatewayError::NotFound)
        ));
        assert!(gw.counters.read().await.is_empty());
    }
}
