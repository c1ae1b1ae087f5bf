//! WolfShard Error Types

use thiserror::Error;

/// Result type alias for WolfShard operations
pub type Result<T> = std::result::Result<T, Error>;

/// WolfShard error types
#[derive(Error, Debug)]
pub enum Error {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration file: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("Configuration serialization error: {0}")]
    ConfigSerialize(#[from] toml::ser::Error),

    // Storage errors
    #[error("Invalid path for user {user_id}: {path}")]
    InvalidPath { user_id: u64, path: String },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Upload failed: {0}")]
    UploadFailed(String),

    #[error("Delete failed: {0}")]
    DeleteFailed(String),

    #[error("File unrecoverable: {0}")]
    FileUnrecoverable(String),

    // Replication errors
    #[error("Replica {address} unreachable: {reason}")]
    ReplicaUnreachable { address: String, reason: String },

    #[error("Replica {address} rejected request: {reason}")]
    ReplicaRejected { address: String, reason: String },

    // Directory service errors
    #[error("Directory service error: {0}")]
    Directory(String),

    #[error("Registration failed: {0}")]
    Registration(String),

    // Network errors
    #[error("Network error: {0}")]
    Network(String),

    #[error("Connection failed to {address}: {reason}")]
    ConnectionFailed { address: String, reason: String },

    #[error("Connection timeout to {0}")]
    ConnectionTimeout(String),

    #[error("Protocol error: unexpected {0}")]
    UnexpectedMessage(&'static str),

    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Check if this error means the target is absent rather than broken
    pub fn is_not_found(&self) -> bool {
        match self {
            Error::NotFound(_) => true,
            Error::Io(e) => e.kind() == std::io::ErrorKind::NotFound,
            _ => false,
        }
    }

    /// Check if this error came from the transport rather than the peer
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Error::ConnectionTimeout(_)
                | Error::ConnectionFailed { .. }
                | Error::Network(_)
                | Error::Serialization(_)
                | Error::Io(_)
        )
    }
}
