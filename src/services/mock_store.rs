//! In-memory `ObjectStore` double for tests.

use crate::models::object::ObjectMeta;
use crate::services::object_store::{ObjectDownload, ObjectStore, StoreError, StoreResult};
use bytes::{Bytes, BytesMut};
use chrono::{DateTime, Utc};
use futures::{Stream, StreamExt, pin_mut, stream};
use std::{
    collections::BTreeMap,
    future::Future,
    io,
    sync::{Arc, Mutex},
};

#[derive(Clone)]
struct StoredObject {
    data: Bytes,
    content_type: Option<String>,
    last_modified: DateTime<Utc>,
}

/// In-memory store keyed like a bucket. `set_now` controls the
/// last-modified stamp applied to subsequent uploads, so tests can build
/// listings with a known order.
#[derive(Clone)]
pub struct MemoryStore {
    objects: Arc<Mutex<BTreeMap<String, StoredObject>>>,
    now: Arc<Mutex<DateTime<Utc>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            objects: Arc::new(Mutex::new(BTreeMap::new())),
            now: Arc::new(Mutex::new(DateTime::UNIX_EPOCH)),
        }
    }

    pub fn set_now(&self, at: DateTime<Utc>) {
        *self.now.lock().unwrap() = at;
    }

    /// Seed an object directly, bypassing the upload path.
    pub fn insert(&self, key: &str, data: &[u8], last_modified: DateTime<Utc>) {
        self.objects.lock().unwrap().insert(
            key.to_string(),
            StoredObject {
                data: Bytes::copy_from_slice(data),
                content_type: None,
                last_modified,
            },
        );
    }

    pub fn contains(&self, key: &str) -> bool {
        self.objects.lock().unwrap().contains_key(key)
    }

    fn meta_of(key: &str, object: &StoredObject) -> ObjectMeta {
        ObjectMeta {
            key: key.to_string(),
            size: object.data.len() as i64,
            last_modified: object.last_modified,
            content_type: object.content_type.clone(),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ObjectStore for MemoryStore {
    fn head(&self, key: &str) -> impl Future<Output = StoreResult<Option<ObjectMeta>>> + Send {
        async move {
            let objects = self.objects.lock().unwrap();
            Ok(objects.get(key).map(|object| Self::meta_of(key, object)))
        }
    }

    fn put_stream<S>(
        &self,
        key: &str,
        content_type: Option<String>,
        body: S,
    ) -> impl Future<Output = StoreResult<u64>> + Send
    where
        S: Stream<Item = io::Result<Bytes>> + Send,
    {
        async move {
            pin_mut!(body);
            let mut data = BytesMut::new();
            while let Some(chunk) = body.next().await {
                data.extend_from_slice(&chunk?);
            }
            let written = data.len() as u64;
            let last_modified = *self.now.lock().unwrap();
            self.objects.lock().unwrap().insert(
                key.to_string(),
                StoredObject {
                    data: data.freeze(),
                    content_type,
                    last_modified,
                },
            );
            Ok(written)
        }
    }

    fn get(&self, key: &str) -> impl Future<Output = StoreResult<ObjectDownload>> + Send {
        async move {
            let found = self.objects.lock().unwrap().get(key).cloned();
            match found {
                Some(object) => {
                    let meta = Self::meta_of(key, &object);
                    let body = stream::iter(vec![Ok::<Bytes, io::Error>(object.data)]).boxed();
                    Ok(ObjectDownload { meta, body })
                }
                None => Err(StoreError::NotFound {
                    key: key.to_string(),
                }),
            }
        }
    }

    fn list(&self) -> impl Future<Output = StoreResult<Vec<ObjectMeta>>> + Send {
        async move {
            let objects = self.objects.lock().unwrap();
            Ok(objects
                .iter()
                .map(|(key, object)| Self::meta_of(key, object))
                .collect())
        }
    }
}
