//! Object-store client seam.
//!
//! `ObjectStore` is the minimal surface the gateway needs from the remote
//! store; `S3ObjectStore` implements it over the AWS SDK against any
//! S3-compatible endpoint. Tests substitute the in-memory double from
//! `mock_store`.

use crate::models::object::ObjectMeta;
use aws_sdk_s3::{
    Client,
    config::{BehaviorVersion, Credentials, Region},
    error::{DisplayErrorContext, SdkError},
    primitives::ByteStream,
    types::{CompletedMultipartUpload, CompletedPart},
};
use bytes::{Bytes, BytesMut};
use chrono::{DateTime, Utc};
use futures::{
    Stream, StreamExt, pin_mut,
    stream::{BoxStream, FuturesUnordered},
};
use std::{future::Future, io, pin::Pin};
use thiserror::Error;
use tokio_util::io::ReaderStream;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("object `{key}` not found")]
    NotFound { key: String },
    #[error("object store request failed: {0}")]
    Upstream(String),
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

impl StoreError {
    /// Wrap an SDK failure, keeping the full error chain in the message
    /// for operability. Credentials never appear in SDK error output.
    fn upstream<E>(err: SdkError<E>) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        StoreError::Upstream(DisplayErrorContext(err).to_string())
    }
}

/// An object opened for reading: metadata plus its chunked byte stream.
pub struct ObjectDownload {
    pub meta: ObjectMeta,
    pub body: BoxStream<'static, io::Result<Bytes>>,
}

/// The operations the gateway needs from the remote store.
pub trait ObjectStore: Clone + Send + Sync + 'static {
    /// Metadata-only existence probe. `Ok(None)` when the key is absent;
    /// any other failure is an error, never a "maybe".
    fn head(&self, key: &str) -> impl Future<Output = StoreResult<Option<ObjectMeta>>> + Send;

    /// Stream a new object body under `key`. Returns the bytes written.
    fn put_stream<S>(
        &self,
        key: &str,
        content_type: Option<String>,
        body: S,
    ) -> impl Future<Output = StoreResult<u64>> + Send
    where
        S: Stream<Item = io::Result<Bytes>> + Send;

    /// Open `key` for reading.
    fn get(&self, key: &str) -> impl Future<Output = StoreResult<ObjectDownload>> + Send;

    /// Enumerate every object in the bucket.
    fn list(&self) -> impl Future<Output = StoreResult<Vec<ObjectMeta>>> + Send;
}

/// Transfer tuning for the S3-backed store.
#[derive(Clone, Debug)]
pub struct TransferSettings {
    /// Payloads larger than this go through multipart upload.
    pub multipart_threshold: usize,
    /// Part size for multipart uploads.
    pub multipart_chunk_size: usize,
    /// Maximum parts uploaded in parallel.
    pub multipart_concurrency: usize,
    /// Chunk size for streamed downloads.
    pub download_chunk_size: usize,
}

#[derive(Clone)]
pub struct S3ObjectStore {
    client: Client,
    bucket: String,
    transfer: TransferSettings,
}

impl S3ObjectStore {
    pub fn new(client: Client, bucket: impl Into<String>, transfer: TransferSettings) -> Self {
        Self {
            client,
            bucket: bucket.into(),
            transfer,
        }
    }

    /// Build a client for an S3-compatible endpoint with static
    /// credentials, path-style addressing, and the `auto` region the
    /// R2-style endpoints expect.
    pub fn connect(
        endpoint_url: &str,
        access_key_id: &str,
        secret_access_key: &str,
        bucket: impl Into<String>,
        transfer: TransferSettings,
    ) -> Self {
        let credentials = Credentials::new(access_key_id, secret_access_key, None, None, "static");
        let config = aws_sdk_s3::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new("auto"))
            .endpoint_url(endpoint_url)
            .credentials_provider(credentials)
            .force_path_style(true)
            .build();
        Self::new(Client::from_conf(config), bucket, transfer)
    }

    fn upload_part(
        &self,
        key: &str,
        upload_id: &str,
        part_number: i32,
        chunk: Bytes,
    ) -> impl Future<Output = StoreResult<CompletedPart>> + Send + 'static {
        let request = self
            .client
            .upload_part()
            .bucket(&self.bucket)
            .key(key)
            .upload_id(upload_id)
            .part_number(part_number)
            .body(ByteStream::from(chunk));
        async move {
            let uploaded = request.send().await.map_err(StoreError::upstream)?;
            Ok(CompletedPart::builder()
                .set_e_tag(uploaded.e_tag().map(str::to_string))
                .part_number(part_number)
                .build())
        }
    }

    /// Consume the rest of `body` as multipart parts, keeping at most
    /// `multipart_concurrency` part uploads in flight. `buffered` holds
    /// the bytes already read while deciding the upload strategy.
    async fn upload_parts<S>(
        &self,
        key: &str,
        upload_id: &str,
        mut buffered: BytesMut,
        mut body: Pin<&mut S>,
    ) -> StoreResult<(u64, Vec<CompletedPart>)>
    where
        S: Stream<Item = io::Result<Bytes>> + Send + ?Sized,
    {
        let part_size = self.transfer.multipart_chunk_size.max(1);
        let max_in_flight = self.transfer.multipart_concurrency.max(1);
        let mut in_flight = FuturesUnordered::new();
        let mut parts = Vec::new();
        let mut part_number: i32 = 0;
        let mut total = buffered.len() as u64;
        let mut drained = false;

        loop {
            while buffered.len() >= part_size {
                part_number += 1;
                in_flight.push(self.upload_part(
                    key,
                    upload_id,
                    part_number,
                    buffered.split_to(part_size).freeze(),
                ));
                while in_flight.len() >= max_in_flight {
                    match in_flight.next().await {
                        Some(done) => parts.push(done?),
                        None => break,
                    }
                }
            }
            if drained {
                break;
            }
            match body.next().await {
                Some(chunk) => {
                    let chunk = chunk?;
                    total += chunk.len() as u64;
                    buffered.extend_from_slice(&chunk);
                }
                None => drained = true,
            }
        }

        if !buffered.is_empty() {
            part_number += 1;
            in_flight.push(self.upload_part(key, upload_id, part_number, buffered.freeze()));
        }
        while let Some(done) = in_flight.next().await {
            parts.push(done?);
        }

        parts.sort_by_key(|part| part.part_number().unwrap_or(0));
        Ok((total, parts))
    }

    async fn put_multipart<S>(
        &self,
        key: &str,
        content_type: Option<String>,
        buffered: BytesMut,
        body: Pin<&mut S>,
    ) -> StoreResult<u64>
    where
        S: Stream<Item = io::Result<Bytes>> + Send + ?Sized,
    {
        let created = self
            .client
            .create_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .set_content_type(content_type)
            .send()
            .await
            .map_err(StoreError::upstream)?;
        let upload_id = created
            .upload_id()
            .ok_or_else(|| StoreError::Upstream("multipart upload id missing from response".into()))?
            .to_string();

        let outcome: StoreResult<u64> = async {
            let (total, parts) = self.upload_parts(key, &upload_id, buffered, body).await?;
            debug!("completing multipart upload of `{}` in {} parts", key, parts.len());
            let completed = CompletedMultipartUpload::builder()
                .set_parts(Some(parts))
                .build();
            self.client
                .complete_multipart_upload()
                .bucket(&self.bucket)
                .key(key)
                .upload_id(&upload_id)
                .multipart_upload(completed)
                .send()
                .await
                .map_err(StoreError::upstream)?;
            Ok(total)
        }
        .await;

        if outcome.is_err() {
            if let Err(abort_err) = self
                .client
                .abort_multipart_upload()
                .bucket(&self.bucket)
                .key(key)
                .upload_id(&upload_id)
                .send()
                .await
            {
                warn!(
                    "could not abort multipart upload for `{}`: {}",
                    key,
                    DisplayErrorContext(abort_err)
                );
            }
        }
        outcome
    }
}

fn from_sdk_time(at: &aws_sdk_s3::primitives::DateTime) -> DateTime<Utc> {
    DateTime::from_timestamp(at.secs(), at.subsec_nanos()).unwrap_or(DateTime::UNIX_EPOCH)
}

impl ObjectStore for S3ObjectStore {
    fn head(&self, key: &str) -> impl Future<Output = StoreResult<Option<ObjectMeta>>> + Send {
        async move {
            match self
                .client
                .head_object()
                .bucket(&self.bucket)
                .key(key)
                .send()
                .await
            {
                Ok(out) => Ok(Some(ObjectMeta {
                    key: key.to_string(),
                    size: out.content_length().unwrap_or(0),
                    last_modified: out
                        .last_modified()
                        .map(from_sdk_time)
                        .unwrap_or(DateTime::UNIX_EPOCH),
                    content_type: out.content_type().map(str::to_string),
                })),
                Err(SdkError::ServiceError(err)) if err.err().is_not_found() => Ok(None),
                Err(err) => Err(StoreError::upstream(err)),
            }
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
            let mut buffered = BytesMut::new();
            loop {
                if buffered.len() > self.transfer.multipart_threshold {
                    return self.put_multipart(key, content_type, buffered, body).await;
                }
                match body.next().await {
                    Some(chunk) => buffered.extend_from_slice(&chunk?),
                    None => break,
                }
            }

            let total = buffered.len() as u64;
            self.client
                .put_object()
                .bucket(&self.bucket)
                .key(key)
                .set_content_type(content_type)
                .body(ByteStream::from(buffered.freeze()))
                .send()
                .await
                .map_err(StoreError::upstream)?;
            Ok(total)
        }
    }

    fn get(&self, key: &str) -> impl Future<Output = StoreResult<ObjectDownload>> + Send {
        async move {
            let out = match self
                .client
                .get_object()
                .bucket(&self.bucket)
                .key(key)
                .send()
                .await
            {
                Ok(out) => out,
                Err(SdkError::ServiceError(err)) if err.err().is_no_such_key() => {
                    return Err(StoreError::NotFound {
                        key: key.to_string(),
                    });
                }
                Err(err) => return Err(StoreError::upstream(err)),
            };

            let meta = ObjectMeta {
                key: key.to_string(),
                size: out.content_length().unwrap_or(0),
                last_modified: out
                    .last_modified()
                    .map(from_sdk_time)
                    .unwrap_or(DateTime::UNIX_EPOCH),
                content_type: out.content_type().map(str::to_string),
            };
            let reader = out.body.into_async_read();
            let body = ReaderStream::with_capacity(reader, self.transfer.download_chunk_size).boxed();
            Ok(ObjectDownload { meta, body })
        }
    }

    fn list(&self) -> impl Future<Output = StoreResult<Vec<ObjectMeta>>> + Send {
        async move {
            let mut objects = Vec::new();
            let mut continuation: Option<String> = None;
            loop {
                let page = self
                    .client
                    .list_objects_v2()
                    .bucket(&self.bucket)
                    .set_continuation_token(continuation.take())
                    .send()
                    .await
                    .map_err(StoreError::upstream)?;
                for entry in page.contents() {
                    let Some(key) = entry.key() else { continue };
                    objects.push(ObjectMeta {
                        key: key.to_string(),
                        size: entry.size().unwrap_or(0),
                        last_modified: entry
                            .last_modified()
                            .map(from_sdk_time)
                            .unwrap_or(DateTime::UNIX_EPOCH),
                        content_type: None,
                    });
                }
                continuation = page.next_continuation_token().map(str::to_string);
                if continuation.is_none() {
                    break;
                }
            }
            Ok(objects)
        }
    }
}
