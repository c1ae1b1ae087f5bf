//! WolfShard - Replicated Per-User File Storage Node
//!
//! A storage node keeps each user's files in a sandboxed partition on local
//! disk and mirrors every write to the user's backup node. Reads verify the
//! primary copy against the backup by content digest and repair whichever
//! side is missing or diverged.
//!
//! # Architecture
//!
//! Nodes take their cluster topology from an external directory service:
//! which node mirrors each user, and the creation and update times of every
//! file. Clients and peers talk to a node over a framed TCP protocol; peers
//! use the replica primitives to maintain each other's backup partitions.
//!
//! # Features
//!
//! - Path sandboxing with traversal and symlink-escape rejection
//! - Atomic write-replace with per-file locking
//! - SHA-256 digest comparison between primary and backup copies
//! - Lazy repair on fetch in both directions
//! - Tracking of files whose backup copy is known to be stale
//! - HTTP status API

pub mod api;
pub mod config;
pub mod directory;
pub mod error;
pub mod network;
pub mod node;
pub mod replication;
pub mod storage;

pub use config::WolfShardConfig;
pub use error::{Error, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::WolfShardConfig;
    pub use crate::directory::DirectoryService;
    pub use crate::error::{Error, Result};
    pub use crate::node::FileNode;
    pub use crate::replication::{Message, Replica, ReplicationCoordinator};
    pub use crate::storage::{LocalStore, NodeId, Role, UserId};
}
