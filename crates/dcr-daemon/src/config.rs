//! Configuration for dcr-daemon

use dcr_node::{HttpGatewayConfig, NodeSettings};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Main daemon configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Storage configuration
    #[serde(default)]
    pub storage: StorageConfig,

    /// Outgoing calls to other nodes
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Lock waiting
    #[serde(default)]
    pub locking: LockingConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// JSON file with event definitions created at start-up
    #[serde(default)]
    pub events_file: Option<PathBuf>,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Listen address
    pub listen_addr: SocketAddr,

    /// Address other nodes reach this one at
    #[serde(default = "default_public_uri")]
    pub public_uri: String,

    /// Enable CORS
    #[serde(default = "default_true")]
    pub enable_cors: bool,

    /// Request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([127, 0, 0, 1], 8080)),
            public_uri: default_public_uri(),
            enable_cors: true,
            request_timeout_secs: default_request_timeout(),
        }
    }
}

/// Storage configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StorageConfig {
    /// In-memory storage (for development/testing)
    #[default]
    Memory,

    /// PostgreSQL storage
    Postgres {
        /// Connection URL
        url: String,

        /// Maximum connections in pool
        #[serde(default = "default_pool_size")]
        max_connections: u32,

        /// Connection timeout in seconds
        #[serde(default = "default_connection_timeout")]
        connect_timeout_secs: u64,
    },
}

/// Gateway configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Per-call timeout in milliseconds
    #[serde(default = "default_gateway_timeout")]
    pub request_timeout_ms: u64,

    /// Retries on transport errors and 5xx
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_retry_backoff")]
    pub retry_backoff_ms: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            request_timeout_ms: default_gateway_timeout(),
            max_retries: default_max_retries(),
            retry_backoff_ms: default_retry_backoff(),
        }
    }
}

impl GatewayConfig {
    pub fn to_http_config(&self) -> HttpGatewayConfig {
        HttpGatewayConfig {
            request_timeout: Duration::from_millis(self.request_timeout_ms),
            max_retries: self.max_retries,
            retry_backoff: Duration::from_millis(self.retry_backoff_ms),
        }
    }
}

/// Locking configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockingConfig {
    /// How long reads wait for a foreign lock to clear; 0 fails fast
    #[serde(default = "default_wait_timeout")]
    pub wait_timeout_ms: u64,
}

impl Default for LockingConfig {
    fn default() -> Self {
        Self {
            wait_timeout_ms: default_wait_timeout(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,

    /// JSON format
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

// Default value helpers
fn default_true() -> bool {
    true
}

fn default_public_uri() -> String {
    "http://127.0.0.1:8080".to_string()
}

fn default_request_timeout() -> u64 {
    30
}

fn default_pool_size() -> u32 {
    10
}

fn default_connection_timeout() -> u64 {
    5
}

fn default_gateway_timeout() -> u64 {
    10_000
}

fn default_max_retries() -> u32 {
    1
}

fn default_retry_backoff() -> u64 {
    200
}

fn default_wait_timeout() -> u64 {
    5_000
}

fn default_log_level() -> String {
    "info".to_string()
}

impl DaemonConfig {
    /// Load configuration from file
    pub fn load(path: Option<&str>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();

        // Add default configuration
        builder = builder.add_source(config::Config::try_from(&DaemonConfig::default())?);

        // Add file configuration if provided
        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }

        // DCR_SERVER__PUBLIC_URI=... style overrides
        builder = builder.add_source(
            config::Environment::with_prefix("DCR")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        builder.build()?.try_deserialize()
    }

    /// Settings handed to the event service
    pub fn node_settings(&self) -> NodeSettings {
        NodeSettings::new(self.server.public_uri.clone())
            .with_lock_wait_timeout(Duration::from_millis(self.locking.wait_timeout_ms))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = DaemonConfig::default();
        assert_eq!(config.server.listen_addr.port(), 8080);
        assert!(matches!(config.storage, StorageConfig::Memory));
        assert!(config.events_file.is_none());
    }

    #[test]
    fn test_server_defaults() {
        let config = ServerConfig::default();
        assert!(config.enable_cors);
        assert_eq!(config.request_timeout_secs, 30);
        assert_eq!(config.public_uri, "http://127.0.0.1:8080");
    }

    #[test]
    fn test_gateway_config_conversion() {
        let http = GatewayConfig {
            request_timeout_ms: 1500,
            max_retries: 3,
            retry_backoff_ms: 50,
        }
        .to_http_config();
        assert_eq!(http.request_timeout, Duration::from_millis(1500));
        assert_eq!(http.max_retries, 3);
        assert_eq!(http.retry_backoff, Duration::from_millis(50));
    }

    #[test]
    fn test_node_settings_from_config() {
        let mut config = DaemonConfig::default();
        config.server.public_uri = "http://node-a:9000".to_string();
        config.locking.wait_timeout_ms = 0;

        let settings = config.node_settings();
        assert_eq!(settings.public_uri, "http://node-a:9000");
        assert_eq!(settings.lock_wait_timeout, Duration::ZERO);
    }

    #[test]
    fn test_load_without_file_uses_defaults() {
        let config = DaemonConfig::load(None).unwrap();
        assert_eq!(config.locking.wait_timeout_ms, 5_000);
        assert_eq!(config.gateway.max_retries, 1);
    }
}
