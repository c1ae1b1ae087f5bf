//! Wire Protocol
//!
//! Messages exchanged between clients, storage nodes and the directory
//! service. Every request receives exactly one response message.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::storage::{NodeId, UserId};

/// Largest frame body accepted from the network
pub const MAX_FRAME_SIZE: u32 = 256 * 1024 * 1024;

/// Protocol messages for node communication
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Message {
    // ========== User-facing operations ==========
    /// List a directory in the user's primary partition
    List {
        user_id: UserId,
        path: String,
    },

    /// Directory listing response
    Listing {
        dirs: Vec<String>,
        files: Vec<ListEntry>,
    },

    /// Store a file on this node and its backup
    Upload {
        user_id: UserId,
        path: String,
        data: Vec<u8>,
    },

    /// Fetch a file, verified against the backup
    Fetch {
        user_id: UserId,
        path: String,
    },

    /// Delete a file from this node and its backup
    Delete {
        user_id: UserId,
        path: String,
    },

    // ========== Replica primitives (backup partition only) ==========
    /// List a directory of a mirrored partition
    ReplicaList {
        user_id: UserId,
        path: String,
    },

    /// Mirrored directory listing response
    ReplicaListing {
        dirs: Vec<String>,
        files: Vec<String>,
    },

    /// Read a mirrored file
    ReplicaRead {
        user_id: UserId,
        path: String,
    },

    /// Write a mirrored file
    ReplicaWrite {
        user_id: UserId,
        path: String,
        data: Vec<u8>,
    },

    /// Delete a mirrored file
    ReplicaDelete {
        user_id: UserId,
        path: String,
    },

    /// Digest of a mirrored file
    ReplicaDigest {
        user_id: UserId,
        path: String,
    },

    /// Digest response
    Digest {
        digest: String,
    },

    /// File content response (fetch and replica read)
    FileData {
        data: Vec<u8>,
    },

    // ========== Directory service ==========
    /// Announce a storage node
    RegisterFileServer {
        node_id: NodeId,
        address: String,
    },

    /// Withdraw a storage node
    UnregisterFileServer {
        node_id: NodeId,
    },

    /// Report a node's file inventory
    SaveFileInfo {
        entries: Vec<InventoryEntry>,
    },

    /// Look up directory metadata for files of a user
    GetFileInfo {
        user_id: UserId,
        file_names: Vec<String>,
    },

    /// Directory metadata response
    FileInfoList {
        entries: Vec<FileInfo>,
    },

    /// Look up the backup node holding a user's mirror
    GetBackupNode {
        user_id: UserId,
    },

    /// Backup node response
    BackupNode {
        address: Option<String>,
    },

    /// Boolean outcome of a directory call
    Accepted {
        success: bool,
    },

    // ========== Status ==========
    /// Operation completed
    Ack,

    /// Error response
    Error {
        code: ErrorCode,
        message: String,
    },
}

/// One file found on a node at startup
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryEntry {
    pub user_id: UserId,
    pub node_id: NodeId,
    /// Absolute path on the reporting node
    pub path: String,
    pub file_name: String,
    pub digest: String,
    pub modified: DateTime<Utc>,
}

/// File metadata kept by the directory service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileInfo {
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A file in a listing returned to clients
pub type ListEntry = FileInfo;

/// Error codes carried across the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCode {
    /// Path escapes the user's partition
    InvalidPath,
    /// File or directory absent
    NotFound,
    /// Neither copy could be served
    FileUnrecoverable,
    /// Local write failed
    UploadFailed,
    /// Local delete failed
    DeleteFailed,
    /// Request not handled by this endpoint
    Unsupported,
    /// Internal error
    Internal,
}

impl Message {
    /// Serialize message to bytes
    pub fn serialize(&self) -> Result<Vec<u8>, bincode::Error> {
        bincode::serialize(self)
    }

    /// Deserialize message from bytes
    pub fn deserialize(bytes: &[u8]) -> Result<Self, bincode::Error> {
        bincode::deserialize(bytes)
    }

    /// Build the error response for a failed request
    pub fn from_error(error: &Error) -> Self {
        let code = match error {
            Error::InvalidPath { .. } => ErrorCode::InvalidPath,
            e if e.is_not_found() => ErrorCode::NotFound,
            Error::FileUnrecoverable(_) => ErrorCode::FileUnrecoverable,
            Error::UploadFailed(_) => ErrorCode::UploadFailed,
            Error::DeleteFailed(_) => ErrorCode::DeleteFailed,
            Error::UnexpectedMessage(_) => ErrorCode::Unsupported,
            _ => ErrorCode::Internal,
        };

        Message::Error {
            code,
            message: error.to_string(),
        }
    }

    /// Get the message type name (for logging)
    pub fn type_name(&self) -> &'static str {
        match self {
            Message::List { .. } => "List",
            Message::Listing { .. } => "Listing",
            Message::Upload { .. } => "Upload",
            Message::Fetch { .. } => "Fetch",
            Message::Delete { .. } => "Delete",
            Message::ReplicaList { .. } => "ReplicaList",
            Message::ReplicaListing { .. } => "ReplicaListing",
            Message::ReplicaRead { .. } => "ReplicaRead",
            Message::ReplicaWrite { .. } => "ReplicaWrite",
            Message::ReplicaDelete { .. } => "ReplicaDelete",
            Message::ReplicaDigest { .. } => "ReplicaDigest",
            Message::Digest { .. } => "Digest",
            Message::FileData { .. } => "FileData",
            Message::RegisterFileServer { .. } => "RegisterFileServer",
            Message::UnregisterFileServer { .. } => "UnregisterFileServer",
            Message::SaveFileInfo { .. } => "SaveFileInfo",
            Message::GetFileInfo { .. } => "GetFileInfo",
            Message::FileInfoList { .. } => "FileInfoList",
            Message::GetBackupNode { .. } => "GetBackupNode",
            Message::BackupNode { .. } => "BackupNode",
            Message::Accepted { .. } => "Accepted",
            Message::Ack => "Ack",
            Message::Error { .. } => "Error",
        }
    }
}

/// Frame header for length-prefixed messages
#[derive(Debug, Clone, Copy)]
pub struct FrameHeader {
    /// Message length
    pub length: u32,
    /// Message checksum
    pub checksum: u32,
}

impl FrameHeader {
    /// Header size in bytes
    pub const SIZE: usize = 8;

    /// Create a new frame header
    pub fn new(data: &[u8]) -> Self {
        Self {
            length: data.len() as u32,
            checksum: crc32fast::hash(data),
        }
    }

    /// Serialize header to bytes
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut bytes = [0u8; Self::SIZE];
        bytes[0..4].copy_from_slice(&self.length.to_le_bytes());
        bytes[4..8].copy_from_slice(&self.checksum.to_le_bytes());
        bytes
    }

    /// Deserialize header from bytes
    pub fn from_bytes(bytes: &[u8; Self::SIZE]) -> Self {
        let [l0, l1, l2, l3, c0, c1, c2, c3] = *bytes;
        Self {
            length: u32::from_le_bytes([l0, l1, l2, l3]),
            checksum: u32::from_le_bytes([c0, c1, c2, c3]),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upload_serialization() {
        let msg = Message::Upload {
            user_id: 7,
            path: "notes.txt".to_string(),
            data: b"hello".to_vec(),
        };

        let bytes = msg.serialize().unwrap();
        let restored = Message::deserialize(&bytes).unwrap();

        match restored {
            Message::Upload { user_id, path, data } => {
                assert_eq!(user_id, 7);
                assert_eq!(path, "notes.txt");
                assert_eq!(data, b"hello");
            }
            _ => panic!("Wrong message type"),
        }
    }

    #[test]
    fn test_error_codes_follow_taxonomy() {
        let invalid = Message::from_error(&Error::InvalidPath { user_id: 7, path: "../x".into() });
        assert!(matches!(invalid, Message::Error { code: ErrorCode::InvalidPath, .. }));

        let missing = Message::from_error(&Error::NotFound("user 7 path a".into()));
        assert!(matches!(missing, Message::Error { code: ErrorCode::NotFound, .. }));

        let lost = Message::from_error(&Error::FileUnrecoverable("a".into()));
        assert!(matches!(lost, Message::Error { code: ErrorCode::FileUnrecoverable, .. }));
    }

    #[test]
    fn test_frame_header() {
        let data = b"test message data";
        let header = FrameHeader::new(data);
        let bytes = header.to_bytes();
        let restored = FrameHeader::from_bytes(&bytes);

        assert_eq!(header.length, restored.length);
        assert_eq!(header.checksum, restored.checksum);
    }
}
