//! Configuration loading and types for the COSI blob test server.
//!
//! Configuration is read from a YAML file and deserialized into the
//! [`Config`] struct.  Every section is optional; a missing file section
//! (or a missing file, when no `--config` is given) falls back to the
//! defaults below.

use serde::Deserialize;
use std::path::Path;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// HTTP server settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Location of the mounted COSI bucket info secret.
    #[serde(default)]
    pub secret: SecretConfig,

    /// Blob storage backend settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Request handling behavior.
    #[serde(default)]
    pub api: ApiConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Observability settings.
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

/// HTTP listener configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Bind host address.
    #[serde(default = "default_host")]
    pub host: String,

    /// Bind port.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Graceful shutdown timeout in seconds.
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout: u64,

    /// Value for `Access-Control-Allow-Origin`; `*` allows any origin.
    #[serde(default = "default_cors_allow_origin")]
    pub cors_allow_origin: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            shutdown_timeout: default_shutdown_timeout(),
            cors_allow_origin: default_cors_allow_origin(),
        }
    }
}

/// Secret file configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct SecretConfig {
    /// Path to the `BucketInfo` JSON file mounted by the COSI provisioner.
    #[serde(default = "default_secret_path")]
    pub path: String,
}

impl Default for SecretConfig {
    fn default() -> Self {
        Self {
            path: default_secret_path(),
        }
    }
}

/// Blob storage backend configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Backend type: `azure` or `memory`.
    #[serde(default = "default_storage_backend")]
    pub backend: String,

    /// Container used by single-name routes when the credential does not
    /// name one itself (connection strings, account-scoped SAS URLs).
    #[serde(default)]
    pub default_container: Option<String>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: default_storage_backend(),
            default_container: None,
        }
    }
}

/// Request handling configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    /// Reject upload bodies carrying fields other than `data`.
    #[serde(default = "default_true")]
    pub strict_body: bool,

    /// Blob read by the `GET /` probe.
    #[serde(default = "default_probe_blob")]
    pub probe_blob: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            strict_body: true,
            probe_blob: default_probe_blob(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: text or json.
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

/// Observability settings.
#[derive(Debug, Clone, Deserialize)]
pub struct ObservabilityConfig {
    /// Enable Prometheus metrics collection and the `/metrics` endpoint.
    #[serde(default = "default_true")]
    pub metrics: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self { metrics: true }
    }
}

// -- Defaults ----------------------------------------------------------------

fn default_true() -> bool {
    true
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_shutdown_timeout() -> u64 {
    30
}

fn default_cors_allow_origin() -> String {
    "*".to_string()
}

fn default_secret_path() -> String {
    "/cosi/bucket1/BucketInfo".to_string()
}

fn default_storage_backend() -> String {
    "azure".to_string()
}

fn default_probe_blob() -> String {
    "LoremIpsum.txt".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

// -- Loader ------------------------------------------------------------------

/// Load and parse configuration from a YAML file at `path`.
pub fn load_config<P: AsRef<Path>>(path: P) -> anyhow::Result<Config> {
    let contents = std::fs::read_to_string(path.as_ref())?;
    let config: Config = serde_yaml::from_str(&contents)?;
    Ok(config)
}
