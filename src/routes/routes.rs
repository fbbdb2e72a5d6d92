//! Defines routes for the gateway API.
//!
//! ## Structure
//! - **File endpoints**
//!   - `POST /api/upload`           — multipart upload (body limit disabled)
//!   - `GET  /api/files`            — listing with per-file counts and usage stats
//!   - `GET  /api/serve-file/{key}` — proxied, counted download
//!   - `GET  /files/{key}`          — historical alias of the download route
//!
//! - **Probes**
//!   - `GET /health` — liveness
//!   - `GET /readyz` — readiness (store + disk)

use crate::{
    handlers::{
        file_handlers::{list_files, serve_file, upload_file},
        health_handlers::{health, readyz},
    },
    services::{gateway::Gateway, object_store::ObjectStore},
};
use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};

/// Build and return the router for all gateway routes.
///
/// The router carries shared state (`Gateway`) to all handlers; the store
/// implementation stays generic so tests can swap in a double.
pub fn routes<S: ObjectStore>() -> Router<Gateway<S>> {
    Router::new()
        // probes (mounted at root)
        .route("/health", get(health))
        .route("/readyz", get(readyz::<S>))
        // file endpoints
        .route(
            "/api/upload",
            post(upload_file::<S>).layer(DefaultBodyLimit::disable()),
        )
        .route("/api/files", get(list_files::<S>))
        .route("/api/serve-file/{key}", get(serve_file::<S>))
        .route("/files/{key}", get(serve_file::<S>))
}
