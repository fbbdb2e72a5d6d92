//! HTTP handlers for upload, listing, and proxied download.
//! Bodies stream through in both directions; nothing is buffered beyond
//! the multipart part size.

use crate::{
    errors::GatewayError,
    services::{gateway::Gateway, object_store::ObjectStore, size_format::format_size},
};
use axum::{
    Json,
    body::Body,
    extract::{Multipart, Path, State, multipart::Field},
    http::{HeaderValue, header},
    response::Response,
};
use bytes::Bytes;
use chrono::{SecondsFormat, Utc};
use futures::{Stream, stream};
use serde::Serialize;
use std::io;

#[derive(Serialize)]
pub struct UploadResponse {
    pub message: &'static str,
    pub filename: String,
    pub local_url: String,
    pub public_url: String,
}

#[derive(Serialize)]
pub struct FileEntryResponse {
    pub key: String,
    pub last_modified: String,
    pub size: i64,
    pub local_url: String,
    pub public_url: String,
    pub download_count: u64,
}

#[derive(Serialize)]
pub struct StatsResponse {
    pub total_files: u64,
    pub total_size: u64,
    pub formatted_total_size: String,
    pub current_period_size: u64,
    pub formatted_current_period_size: String,
    pub remaining_quota: u64,
    pub formatted_remaining: String,
    pub days_until_reset: i64,
}

#[derive(Serialize)]
pub struct ListFilesResponse {
    pub files: Vec<FileEntryResponse>,
    pub stats: StatsResponse,
}

/// `POST /api/upload` — multipart form body with a `file` field.
pub async fn upload_file<S: ObjectStore>(
    State(gateway): State<Gateway<S>>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, GatewayError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| GatewayError::InvalidMultipart(err.to_string()))?
    {
        if field.name() == Some("file") {
            let filename = field
                .file_name()
                .map(str::to_string)
                .filter(|name| !name.is_empty())
                .ok_or(GatewayError::EmptyFilename)?;
            let content_type = field.content_type().map(str::to_string);

            let receipt = gateway
                .ingest(&filename, content_type, field_body(field))
                .await
                .map_err(|err| err.with_context("An unexpected error occurred"))?;

            return Ok(Json(UploadResponse {
                message: "File uploaded successfully!",
                filename: receipt.key,
                local_url: receipt.local_url,
                public_url: receipt.public_url,
            }));
        }
    }
    Err(GatewayError::MissingFilePart)
}

/// Adapt a multipart field into the byte stream the store consumes.
fn field_body(field: Field<'_>) -> impl Stream<Item = io::Result<Bytes>> + Send + '_ {
    stream::unfold(field, |mut field| async move {
        match field.chunk().await {
            Ok(Some(chunk)) => Some((Ok(chunk), field)),
            Ok(None) => None,
            Err(err) => Some((Err(io::Error::new(io::ErrorKind::Other, err)), field)),
        }
    })
}

/// `GET /api/files` — the full listing plus the usage stats block.
pub async fn list_files<S: ObjectStore>(
    State(gateway): State<Gateway<S>>,
) -> Result<Json<ListFilesResponse>, GatewayError> {
    let listing = gateway
        .list_files(Utc::now())
        .await
        .map_err(|err| err.with_context("Failed to fetch file list"))?;

    let files = listing
        .files
        .into_iter()
        .map(|entry| FileEntryResponse {
            key: entry.meta.key,
            last_modified: entry
                .meta
                .last_modified
                .to_rfc3339_opts(SecondsFormat::Secs, true),
            size: entry.meta.size,
            local_url: entry.local_url,
            public_url: entry.public_url,
            download_count: entry.download_count,
        })
        .collect();

    let stats = listing.stats;
    Ok(Json(ListFilesResponse {
        files,
        stats: StatsResponse {
            total_files: stats.total_files,
            total_size: stats.total_size,
            formatted_total_size: format_size(stats.total_size),
            current_period_size: stats.current_period_size,
            formatted_current_period_size: format_size(stats.current_period_size),
            remaining_quota: stats.remaining_quota,
            formatted_remaining: format_size(stats.remaining_quota),
            days_until_reset: stats.days_until_reset,
        },
    }))
}

/// `GET /api/serve-file/{key}` (and the historical `/files/{key}` alias) —
/// stream the object back as an attachment.
pub async fn serve_file<S: ObjectStore>(
    State(gateway): State<Gateway<S>>,
    Path(key): Path<String>,
) -> Result<Response, GatewayError> {
    let download = gateway.serve(&key).await?;
    let meta = download.meta;

    let mut response = Response::new(Body::from_stream(download.body));
    let headers = response.headers_mut();

    let content_type = meta
        .content_type
        .unwrap_or_else(|| "application/octet-stream".into());
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_str(&content_type)
            .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream")),
    );
    headers.insert(
        header::CONTENT_LENGTH,
        HeaderValue::from_str(&meta.size.max(0).to_string())
            .unwrap_or_else(|_| HeaderValue::from_static("0")),
    );
    let disposition = format!("attachment; filename=\"{}\"", meta.key);
    if let Ok(value) = HeaderValue::from_str(&disposition) {
        headers.insert(header::CONTENT_DISPOSITION, value);
    }
    headers.insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static("no-store, no-cache, must-revalidate"),
    );
    headers.insert(header::PRAGMA, HeaderValue::from_static("no-cache"));
    headers.insert(header::EXPIRES, HeaderValue::from_static("0"));

    Ok(response)
}
