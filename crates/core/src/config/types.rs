use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::PathBuf;

/// Root configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    pub catalog: CatalogConfig,
    #[serde(default)]
    pub download: DownloadConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub reaper: ReaperConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: IpAddr,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> IpAddr {
    "0.0.0.0".parse().unwrap()
}

fn default_port() -> u16 {
    8080
}

/// Catalog collaborator endpoint
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CatalogConfig {
    /// Base URL of the catalog service (e.g. "http://localhost:9200").
    pub base_url: String,
    /// Request timeout in seconds (default: 30)
    #[serde(default = "default_catalog_timeout")]
    pub timeout_secs: u32,
}

fn default_catalog_timeout() -> u32 {
    30
}

/// Download engine configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DownloadConfig {
    /// Process-wide fetcher concurrency bound.
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
    /// Minimum spacing between consecutive requests to the origin.
    #[serde(default = "default_request_spacing_ms")]
    pub request_spacing_ms: u64,
    /// Timeout per download attempt.
    #[serde(default = "default_attempt_timeout")]
    pub attempt_timeout_secs: u64,
    /// Maximum attempts per file (including the first).
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Where fetched files and assembled archives are staged.
    #[serde(default = "default_staging_dir")]
    pub staging_dir: PathBuf,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            max_concurrent: default_max_concurrent(),
            request_spacing_ms: default_request_spacing_ms(),
            attempt_timeout_secs: default_attempt_timeout(),
            max_attempts: default_max_attempts(),
            staging_dir: default_staging_dir(),
        }
    }
}

fn default_max_concurrent() -> usize {
    12
}

fn default_request_spacing_ms() -> u64 {
    100
}

fn default_attempt_timeout() -> u64 {
    30
}

fn default_max_attempts() -> u32 {
    3
}

fn default_staging_dir() -> PathBuf {
    PathBuf::from("papyrus-staging")
}

/// Job store tier configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StoreConfig {
    /// Durable KV service endpoint. Absent means the store silently
    /// degrades to the fallback tier.
    #[serde(default)]
    pub durable_url: Option<String>,
    /// Bearer token for the durable KV service.
    #[serde(default)]
    pub durable_token: Option<String>,
    /// Durable tier request timeout in seconds (default: 5)
    #[serde(default = "default_durable_timeout")]
    pub durable_timeout_secs: u32,
    /// Fallback tier database file.
    #[serde(default = "default_fallback_path")]
    pub fallback_path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            durable_url: None,
            durable_token: None,
            durable_timeout_secs: default_durable_timeout(),
            fallback_path: default_fallback_path(),
        }
    }
}

fn default_durable_timeout() -> u32 {
    5
}

fn default_fallback_path() -> PathBuf {
    PathBuf::from("papyrus-jobs.db")
}

/// Reaper configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ReaperConfig {
    /// Idle time after which a job and its files are reclaimed.
    #[serde(default = "default_ttl")]
    pub ttl_secs: u64,
    /// How often the background sweep runs.
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
}

impl Default for ReaperConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_ttl(),
            sweep_interval_secs: default_sweep_interval(),
        }
    }
}

fn default_ttl() -> u64 {
    3600
}

fn default_sweep_interval() -> u64 {
    300
}
