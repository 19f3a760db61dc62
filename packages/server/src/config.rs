use std::path::PathBuf;
use std::time::Duration;

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct CorsConfig {
    pub allow_origins: Vec<String>,
    pub max_age: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub cors: CorsConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    pub jwt_secret: String,
}

/// Blob storage and skin service settings.
#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    /// Directory that holds every skin file. Default: "./data/skins".
    #[serde(default = "default_storage_root")]
    pub root: PathBuf,
    /// Maximum accepted file size in bytes. Default: 1 MiB.
    #[serde(default = "default_max_blob_size")]
    pub max_blob_size: u64,
    /// Upper bound for a single skin operation. Default: 5000 ms.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    /// Interval between orphan sweeps; 0 disables the sweeper. Default: 3600 s.
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
    /// Minimum age of an unreferenced file before it is swept. Default: 600 s.
    #[serde(default = "default_sweep_grace_secs")]
    pub sweep_grace_secs: u64,
}

fn default_storage_root() -> PathBuf {
    PathBuf::from("./data/skins")
}
fn default_max_blob_size() -> u64 {
    1024 * 1024
}
fn default_request_timeout_ms() -> u64 {
    5_000
}
fn default_sweep_interval_secs() -> u64 {
    3_600
}
fn default_sweep_grace_secs() -> u64 {
    600
}

impl StorageConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn sweep_grace(&self) -> Duration {
        Duration::from_secs(self.sweep_grace_secs)
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: default_storage_root(),
            max_blob_size: default_max_blob_size(),
            request_timeout_ms: default_request_timeout_ms(),
            sweep_interval_secs: default_sweep_interval_secs(),
            sweep_grace_secs: default_sweep_grace_secs(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        let s = Config::builder()
            .set_default("server.host", "127.0.0.1")?
            .set_default("server.port", 3000)?
            .set_default("server.cors.allow_origins", Vec::<String>::new())?
            .set_default("server.cors.max_age", 3600)?
            // Load from config/config.toml
            .add_source(File::with_name("config/config").required(false))
            // Override from environment (e.g., SKINVAULT__AUTH__JWT_SECRET)
            .add_source(Environment::with_prefix("SKINVAULT").separator("__"))
            .build()?;

        s.try_deserialize()
    }
}
