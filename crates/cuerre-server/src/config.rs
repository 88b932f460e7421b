//! Server configuration parsed from environment variables

use crate::error::{AppError, Result};
use cuerre_blobstore::StoreOptions;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Which durable store backs the service
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Postgres,
    /// In-process only; uploads are lost on restart
    Memory,
}

impl FromStr for StoreBackend {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" => Ok(StoreBackend::Postgres),
            "memory" => Ok(StoreBackend::Memory),
            other => Err(format!("unknown store backend {:?}", other)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    /// Base for retrieval URLs, without a trailing slash
    pub app_url: String,
    pub database_url: String,
    pub store_backend: StoreBackend,
    pub store: StoreOptions,
    pub cache_dir: PathBuf,
    pub cache_ttl: chrono::Duration,
    pub sweep_interval: Duration,
    pub static_dir: Option<PathBuf>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from any key lookup
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |keys: &[&'static str]| {
            keys.iter().find_map(|key| {
                lookup(key)
                    .filter(|value| !value.trim().is_empty())
                    .map(|value| (*key, value))
            })
        };

        let port = parse_or(var(&["CUERRE_PORT", "PORT"]), 3030u16)?;

        let app_url = var(&["CUERRE_APP_URL"])
            .map(|(_, value)| value)
            .unwrap_or_else(|| "http://localhost:3030".to_string());
        let app_url = normalize_app_url(&app_url)?;

        let database_url = var(&["CUERRE_DB_URL", "DATABASE_URL"])
            .map(|(_, value)| value)
            .unwrap_or_else(|| "postgres://localhost/cuerre".to_string());

        let store_backend = parse_or(var(&["BLOB_STORE"]), StoreBackend::Postgres)?;

        let defaults = StoreOptions::default();
        let max_connections = parse_or(var(&["DB_MAX_CONNECTIONS"]), defaults.max_connections)?;
        if max_connections == 0 {
            return Err(AppError::Config("DB_MAX_CONNECTIONS: must be at least 1".into()));
        }
        let timeout_secs = parse_or(var(&["DB_TIMEOUT_SECS"]), defaults.op_timeout.as_secs())?;

        let cache_dir = var(&["CUERRE_CACHE_DIR"])
            .map(|(_, value)| PathBuf::from(value))
            .unwrap_or_else(|| PathBuf::from("./tmp"));

        let ttl_secs = parse_or(
            var(&["CACHE_TTL_SECS"]),
            file_blob_cache::DEFAULT_TTL_SECS,
        )?;
        if ttl_secs < 0 {
            return Err(AppError::Config("CACHE_TTL_SECS: must not be negative".into()));
        }

        let sweep_secs = parse_or(var(&["SWEEP_INTERVAL_SECS"]), 300u64)?;
        if sweep_secs == 0 {
            return Err(AppError::Config("SWEEP_INTERVAL_SECS: must be at least 1".into()));
        }

        let static_dir = var(&["STATIC_DIR"]).map(|(_, value)| PathBuf::from(value));

        Ok(Self {
            port,
            app_url,
            database_url,
            store_backend,
            store: StoreOptions {
                max_connections,
                op_timeout: Duration::from_secs(timeout_secs),
            },
            cache_dir,
            cache_ttl: chrono::Duration::seconds(ttl_secs),
            sweep_interval: Duration::from_secs(sweep_secs),
            static_dir,
        })
    }
}

fn parse_or<T>(value: Option<(&str, String)>, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match value {
        None => Ok(default),
        Some((key, raw)) => raw
            .trim()
            .parse()
            .map_err(|e| AppError::Config(format!("{}: {}", key, e))),
    }
}

fn normalize_app_url(raw: &str) -> Result<String> {
    let trimmed = raw.trim().trim_end_matches('/');
    let parsed = url::Url::parse(trimmed)
        .map_err(|e| AppError::Config(format!("CUERRE_APP_URL: {}", e)))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(AppError::Config(format!(
            "CUERRE_APP_URL: unsupported scheme {:?}",
            parsed.scheme()
        )));
    }
    Ok(trimmed.to_string())
}
