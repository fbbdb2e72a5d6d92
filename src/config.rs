use crate::services::quota;
use anyhow::{Context, Result};
use clap::Parser;
use std::{env, fmt};

/// Centralized application configuration: store credentials and endpoints,
/// link bases, quota ceiling, and transfer tuning. Built once at startup
/// and handed to the components that need it.
#[derive(Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub data_dir: String,
    pub account_id: String,
    pub access_key_id: String,
    pub secret_access_key: String,
    pub bucket: String,
    pub endpoint_url: String,
    pub store_public_url: String,
    pub public_base_url: String,
    pub quota_limit: u64,
    pub multipart_threshold: usize,
    pub multipart_chunk_size: usize,
    pub multipart_concurrency: usize,
    pub download_chunk_size: usize,
    pub max_key_probes: u32,
}

/// Command-line arguments; everything else comes from the environment.
#[derive(Parser, Debug)]
#[command(author, version, about = "HTTP gateway for an S3-compatible object store")]
pub struct Args {
    /// Host to bind to (overrides GATEWAY_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides GATEWAY_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Directory for the persisted counter and history files (overrides GATEWAY_DATA_DIR)
    #[arg(long)]
    pub data_dir: Option<String>,

    /// Bucket holding the uploaded objects (overrides R2_BUCKET_NAME)
    #[arg(long)]
    pub bucket: Option<String>,
}

impl AppConfig {
    /// Parse environment variables + CLI args into an AppConfig.
    pub fn from_env_and_args() -> Result<Self> {
        let args = Args::parse();

        // --- Environment fallback ---
        let env_host = env::var("GATEWAY_HOST").unwrap_or_else(|_| "0.0.0.0".into());
        let env_port = optional_env::<u16>("GATEWAY_PORT")?.unwrap_or(5000);
        let env_data_dir = env::var("GATEWAY_DATA_DIR").unwrap_or_else(|_| "./data".into());

        let account_id = required_env("R2_ACCOUNT_ID")?;
        let access_key_id = required_env("R2_ACCESS_KEY_ID")?;
        let secret_access_key = required_env("R2_SECRET_ACCESS_KEY")?;
        let bucket = match args.bucket {
            Some(bucket) => bucket,
            None => required_env("R2_BUCKET_NAME")?,
        };
        let endpoint_url = env::var("R2_ENDPOINT_URL")
            .unwrap_or_else(|_| format!("https://{account_id}.r2.cloudflarestorage.com"));
        let store_public_url = required_env("R2_PUBLIC_URL")?
            .trim_end_matches('/')
            .to_string();
        let public_base_url = env::var("PUBLIC_BASE_URL")
            .unwrap_or_else(|_| "http://localhost".into())
            .trim_end_matches('/')
            .to_string();

        // --- Merge ---
        Ok(Self {
            host: args.host.unwrap_or(env_host),
            port: args.port.unwrap_or(env_port),
            data_dir: args.data_dir.unwrap_or(env_data_dir),
            account_id,
            access_key_id,
            secret_access_key,
            bucket,
            endpoint_url,
            store_public_url,
            public_base_url,
            quota_limit: optional_env("GATEWAY_QUOTA_LIMIT")?
                .unwrap_or(quota::DEFAULT_QUOTA_LIMIT),
            multipart_threshold: optional_env("GATEWAY_MULTIPART_THRESHOLD")?
                .unwrap_or(10 * 1024 * 1024),
            multipart_chunk_size: optional_env("GATEWAY_MULTIPART_CHUNK_SIZE")?
                .unwrap_or(10 * 1024 * 1024),
            multipart_concurrency: optional_env("GATEWAY_MULTIPART_CONCURRENCY")?.unwrap_or(10),
            download_chunk_size: optional_env("GATEWAY_DOWNLOAD_CHUNK_SIZE")?
                .unwrap_or(1024 * 1024),
            max_key_probes: optional_env("GATEWAY_MAX_KEY_PROBES")?.unwrap_or(1000),
        })
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

// The secret never reaches the logs; startup logs the config via Debug.
impl fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("data_dir", &self.data_dir)
            .field("account_id", &self.account_id)
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .field("bucket", &self.bucket)
            .field("endpoint_url", &self.endpoint_url)
            .field("store_public_url", &self.store_public_url)
            .field("public_base_url", &self.public_base_url)
            .field("quota_limit", &self.quota_limit)
            .field("multipart_threshold", &self.multipart_threshold)
            .field("multipart_chunk_size", &self.multipart_chunk_size)
            .field("multipart_concurrency", &self.multipart_concurrency)
            .field("download_chunk_size", &self.download_chunk_size)
            .field("max_key_probes", &self.max_key_probes)
            .finish()
    }
}

fn required_env(name: &str) -> Result<String> {
    env::var(name).with_context(|| format!("reading required environment variable {name}"))
}

fn optional_env<T>(name: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(name) {
        Ok(value) => value
            .parse::<T>()
            .map(Some)
            .with_context(|| format!("parsing {name} value `{value}`")),
        Err(env::VarError::NotPresent) => Ok(None),
        Err(err) => Err(err).with_context(|| format!("reading {name}")),
    }
}
