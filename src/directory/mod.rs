//! Directory Service Client
//!
//! The directory service is the cluster's metadata authority: it knows which
//! storage nodes exist, which node mirrors each user, and the creation and
//! update times of every file. Nodes only consume it.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{Error, Result};
use crate::network::NetworkClient;
use crate::replication::protocol::{FileInfo, InventoryEntry};
use crate::replication::Message;
use crate::storage::{NodeId, UserId};

/// Calls a storage node makes against the directory service
#[async_trait]
pub trait DirectoryService: Send + Sync {
    /// Announce this node; `false` means the directory refused it
    async fn register_file_server(&self, node_id: NodeId, address: &str) -> Result<bool>;

    async fn unregister_file_server(&self, node_id: NodeId) -> Result<()>;

    /// Report the startup inventory; `false` means the directory refused it
    async fn save_file_info(&self, entries: Vec<InventoryEntry>) -> Result<bool>;

    /// Metadata for the named files of a user; unknown names are omitted
    async fn get_file_info(&self, user_id: UserId, file_names: Vec<String>) -> Result<Vec<FileInfo>>;

    /// Address of the node holding the user's backup, if one is assigned
    async fn backup_node(&self, user_id: UserId) -> Result<Option<String>>;
}

/// Directory service reached over the node protocol
pub struct RemoteDirectory {
    address: String,
    client: Arc<NetworkClient>,
}

impl RemoteDirectory {
    pub fn new(address: impl Into<String>, client: Arc<NetworkClient>) -> Self {
        Self {
            address: address.into(),
            client,
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    async fn call(&self, request: Message) -> Result<Message> {
        let kind = request.type_name();
        let response = self
            .client
            .send(&self.address, request)
            .await
            .map_err(|e| Error::Directory(format!("{} to {} failed: {}", kind, self.address, e)))?;

        match response {
            Message::Error { message, .. } => Err(Error::Directory(format!("{} rejected: {}", kind, message))),
            other => Ok(other),
        }
    }
}

#[async_trait]
impl DirectoryService for RemoteDirectory {
    async fn register_file_server(&self, node_id: NodeId, address: &str) -> Result<bool> {
        let request = Message::RegisterFileServer {
            node_id,
            address: address.to_string(),
        };
        match self.call(request).await? {
            Message::Accepted { success } => Ok(success),
            other => Err(Error::UnexpectedMessage(other.type_name())),
        }
    }

    async fn unregister_file_server(&self, node_id: NodeId) -> Result<()> {
        match self.call(Message::UnregisterFileServer { node_id }).await? {
            Message::Accepted { .. } | Message::Ack => Ok(()),
            other => Err(Error::UnexpectedMessage(other.type_name())),
        }
    }

    async fn save_file_info(&self, entries: Vec<InventoryEntry>) -> Result<bool> {
        match self.call(Message::SaveFileInfo { entries }).await? {
            Message::Accepted { success } => Ok(success),
            other => Err(Error::UnexpectedMessage(other.type_name())),
        }
    }

    async fn get_file_info(&self, user_id: UserId, file_names: Vec<String>) -> Result<Vec<FileInfo>> {
        match self.call(Message::GetFileInfo { user_id, file_names }).await? {
            Message::FileInfoList { entries } => Ok(entries),
            other => Err(Error::UnexpectedMessage(other.type_name())),
        }
    }

    async fn backup_node(&self, user_id: UserId) -> Result<Option<String>> {
        match self.call(Message::GetBackupNode { user_id }).await? {
            Message::BackupNode { address } => Ok(address),
            other => Err(Error::UnexpectedMessage(other.type_name())),
        }
    }
}
