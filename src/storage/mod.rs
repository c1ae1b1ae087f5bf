//! Storage Module
//!
//! Sandboxed per-user file storage on the local disk.

pub mod hasher;
pub mod local;
pub mod locks;
pub mod sandbox;

pub use hasher::{digest_bytes, digest_file};
pub use local::{Listing, LocalStore};
pub use locks::FileLocks;
pub use sandbox::Sandbox;

use serde::{Deserialize, Serialize};

/// User identifier; each user owns an exclusive storage partition
pub type UserId = u64;

/// Storage node identifier, assigned by the directory service
pub type NodeId = u64;

/// Marker appended to a user's directory name for backup-role storage
pub const BACKUP_SUFFIX: &str = "_backup";

/// Which copy of a user's partition an operation addresses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    /// The user's working copy on this node
    Primary,
    /// A mirror of a peer's primary copy, kept for integrity checks and repair
    Backup,
}

impl Role {
    /// Directory name of a user's partition in this role
    pub fn dir_name(self, user_id: UserId) -> String {
        match self {
            Role::Primary => user_id.to_string(),
            Role::Backup => format!("{}{}", user_id, BACKUP_SUFFIX),
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Primary => write!(f, "PRIMARY"),
            Role::Backup => write!(f, "BACKUP"),
        }
    }
}
