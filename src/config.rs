//! WolfShard Configuration
//!
//! Configuration structures for a WolfShard storage node. The storage root
//! is carried here and handed to the store at construction time.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::storage::NodeId;

/// Main WolfShard configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WolfShardConfig {
    /// Node-specific configuration
    pub node: NodeConfig,

    /// On-disk storage configuration
    #[serde(default)]
    pub storage: StorageConfig,

    /// Directory service configuration
    pub directory: DirectoryConfig,

    /// Backup replication configuration
    #[serde(default)]
    pub replication: ReplicationConfig,

    /// Status API configuration
    #[serde(default)]
    pub api: ApiConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Node-specific configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Node identifier assigned by the directory service
    pub id: NodeId,

    /// Address to bind for the client/peer protocol
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    /// Advertised address for peers and the directory service
    #[serde(default)]
    pub advertise_address: Option<String>,
}

/// On-disk storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Parent of every node root; the node stores under `root_dir/<node id>`
    #[serde(default = "default_root_dir")]
    pub root_dir: PathBuf,
}

/// Directory service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectoryConfig {
    /// Directory service address (host:port)
    pub address: String,

    /// Connection timeout in milliseconds
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    /// Request timeout in milliseconds
    #[serde(default = "default_directory_timeout_ms")]
    pub request_timeout_ms: u64,
}

/// Backup replication configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplicationConfig {
    /// Connection timeout for replica calls in milliseconds
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    /// Request timeout for replica calls in milliseconds
    #[serde(default = "default_replica_timeout_ms")]
    pub request_timeout_ms: u64,

    /// Number of files hashed concurrently during the startup inventory
    #[serde(default = "default_inventory_concurrency")]
    pub inventory_concurrency: usize,
}

/// Status API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Enable HTTP status API
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// HTTP API bind address
    #[serde(default = "default_api_address")]
    pub bind_address: String,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

// Default value functions
fn default_bind_address() -> String {
    "0.0.0.0:9600".to_string()
}

fn default_root_dir() -> PathBuf {
    PathBuf::from("/var/lib/wolfshard")
}

fn default_connect_timeout_ms() -> u64 {
    2000
}

fn default_directory_timeout_ms() -> u64 {
    5000
}

fn default_replica_timeout_ms() -> u64 {
    10000
}

fn default_inventory_concurrency() -> usize {
    8
}

fn default_true() -> bool {
    true
}

fn default_api_address() -> String {
    "0.0.0.0:8090".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root_dir: default_root_dir(),
        }
    }
}

impl Default for ReplicationConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: default_connect_timeout_ms(),
            request_timeout_ms: default_replica_timeout_ms(),
            inventory_concurrency: default_inventory_concurrency(),
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bind_address: default_api_address(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl WolfShardConfig {
    /// Build a config with defaults for everything but identity and the directory
    pub fn new(node_id: NodeId, directory_address: impl Into<String>) -> Self {
        Self {
            node: NodeConfig {
                id: node_id,
                bind_address: default_bind_address(),
                advertise_address: None,
            },
            storage: StorageConfig::default(),
            directory: DirectoryConfig {
                address: directory_address.into(),
                connect_timeout_ms: default_connect_timeout_ms(),
                request_timeout_ms: default_directory_timeout_ms(),
            },
            replication: ReplicationConfig::default(),
            api: ApiConfig::default(),
            logging: LoggingConfig::default(),
        }
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: &std::path::Path) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    /// Load configuration from a TOML string
    pub fn from_str(content: &str) -> crate::Result<Self> {
        let config: WolfShardConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Render the configuration as TOML
    pub fn to_toml(&self) -> crate::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Validate the configuration
    pub fn validate(&self) -> crate::Result<()> {
        if self.node.id == 0 {
            return Err(crate::Error::Config("node.id must be non-zero".into()));
        }

        if self.node.bind_address.is_empty() {
            return Err(crate::Error::Config("node.bind_address cannot be empty".into()));
        }

        if self.directory.address.is_empty() {
            return Err(crate::Error::Config("directory.address cannot be empty".into()));
        }

        if self.advertise_address() == self.directory.address {
            return Err(crate::Error::Config(
                "node address must differ from directory.address".into(),
            ));
        }

        if self.directory.connect_timeout_ms == 0
            || self.directory.request_timeout_ms == 0
            || self.replication.connect_timeout_ms == 0
            || self.replication.request_timeout_ms == 0
        {
            return Err(crate::Error::Config("timeouts must be non-zero".into()));
        }

        if self.replication.inventory_concurrency == 0 {
            return Err(crate::Error::Config(
                "replication.inventory_concurrency must be at least 1".into(),
            ));
        }

        Ok(())
    }

    /// Get the advertised address (or bind address if not set)
    pub fn advertise_address(&self) -> &str {
        self.node
            .advertise_address
            .as_deref()
            .unwrap_or(&self.node.bind_address)
    }

    /// Get this node's storage root
    pub fn node_root(&self) -> PathBuf {
        self.storage.root_dir.join(self.node.id.to_string())
    }

    /// Connect timeout for directory calls
    pub fn directory_connect_timeout(&self) -> Duration {
        Duration::from_millis(self.directory.connect_timeout_ms)
    }

    /// Request timeout for directory calls
    pub fn directory_request_timeout(&self) -> Duration {
        Duration::from_millis(self.directory.request_timeout_ms)
    }

    /// Connect timeout for replica calls
    pub fn replica_connect_timeout(&self) -> Duration {
        Duration::from_millis(self.replication.connect_timeout_ms)
    }

    /// Request timeout for replica calls
    pub fn replica_request_timeout(&self) -> Duration {
        Duration::from_millis(self.replication.request_timeout_ms)
    }
}
