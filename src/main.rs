use anyhow::Result;
use axum::Router;
use std::{fs, io::ErrorKind, path::Path};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

mod config;
mod errors;
mod handlers;
mod models;
mod routes;
mod services;

use services::{
    gateway::{Gateway, GatewaySettings},
    object_store::{S3ObjectStore, TransferSettings},
    persist::{CounterStore, UploadLog},
};

#[tokio::main]
async fn main() -> Result<()> {
    // --- Logging setup ---
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // --- Parse config ---
    let cfg = config::AppConfig::from_env_and_args()?;
    tracing::info!("Starting r2-gateway with config: {:?}", cfg);

    // --- Ensure data directory exists ---
    let data_dir = Path::new(&cfg.data_dir);
    if !data_dir.exists() {
        fs::create_dir_all(data_dir)?;
        tracing::info!("Created data directory at {}", cfg.data_dir);
    }

    // --- Object store client ---
    let store = S3ObjectStore::connect(
        &cfg.endpoint_url,
        &cfg.access_key_id,
        &cfg.secret_access_key,
        &cfg.bucket,
        TransferSettings {
            multipart_threshold: cfg.multipart_threshold,
            multipart_chunk_size: cfg.multipart_chunk_size,
            multipart_concurrency: cfg.multipart_concurrency,
            download_chunk_size: cfg.download_chunk_size,
        },
    );

    // --- Initialize core service ---
    let gateway = Gateway::new(
        store,
        CounterStore::new(data_dir.join("download_counts.json")),
        UploadLog::new(data_dir.join("upload_history.json")),
        GatewaySettings {
            public_base_url: cfg.public_base_url.clone(),
            store_public_url: cfg.store_public_url.clone(),
            data_dir: data_dir.to_path_buf(),
            quota_limit: cfg.quota_limit,
            max_key_probes: cfg.max_key_probes,
        },
    );

    // --- Build router ---
    let app: Router = routes::routes().with_state(gateway);

    // --- Start server ---
    let addr = cfg.addr();
    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(err)
            if err.kind() == ErrorKind::PermissionDenied
                && matches!(cfg.host.as_str(), "0.0.0.0" | "::") =>
        {
            let fallback_addr = format!("127.0.0.1:{}", cfg.port);
            tracing::warn!(
                "Permission denied binding to {} ({}). Falling back to {}",
                addr,
                err,
                fallback_addr
            );
            TcpListener::bind(&fallback_addr).await?
        }
        Err(err) => return Err(err.into()),
    };

    tracing::info!("Server listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app).await?;

    Ok(())
}
