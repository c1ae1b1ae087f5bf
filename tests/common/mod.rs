//! Test doubles shared by the integration tests

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use wolfshard::directory::DirectoryService;
use wolfshard::network::MessageHandler;
use wolfshard::replication::protocol::{ErrorCode, FileInfo, InventoryEntry};
use wolfshard::replication::{Message, Replica, ReplicaConnector};
use wolfshard::storage::{Listing, NodeId, UserId};
use wolfshard::{Error, Result};

/// Directory service kept in memory
#[derive(Default)]
pub struct MemoryDirectory {
    pub servers: Mutex<HashMap<NodeId, String>>,
    pub inventory: Mutex<Vec<InventoryEntry>>,
    pub backups: Mutex<HashMap<UserId, String>>,
}

impl MemoryDirectory {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn assign_backup(&self, user_id: UserId, address: &str) {
        self.backups.lock().unwrap().insert(user_id, address.to_string());
    }
}

#[async_trait]
impl DirectoryService for MemoryDirectory {
    async fn register_file_server(&self, node_id: NodeId, address: &str) -> Result<bool> {
        self.servers.lock().unwrap().insert(node_id, address.to_string());
        Ok(true)
    }

    async fn unregister_file_server(&self, node_id: NodeId) -> Result<()> {
        self.servers.lock().unwrap().remove(&node_id);
        Ok(())
    }

    async fn save_file_info(&self, entries: Vec<InventoryEntry>) -> Result<bool> {
        self.inventory.lock().unwrap().extend(entries);
        Ok(true)
    }

    async fn get_file_info(&self, user_id: UserId, file_names: Vec<String>) -> Result<Vec<FileInfo>> {
        let inventory = self.inventory.lock().unwrap();
        Ok(file_names
            .into_iter()
            .filter_map(|name| {
                inventory
                    .iter()
                    .find(|e| e.user_id == user_id && e.file_name == name)
                    .map(|e| FileInfo {
                        name,
                        created_at: e.modified,
                        updated_at: e.modified,
                    })
            })
            .collect())
    }

    async fn backup_node(&self, user_id: UserId) -> Result<Option<String>> {
        Ok(self.backups.lock().unwrap().get(&user_id).cloned())
    }
}

/// Serves a [`MemoryDirectory`] over the node protocol
pub struct DirectoryServer(pub Arc<MemoryDirectory>);

#[async_trait]
impl MessageHandler for DirectoryServer {
    async fn handle(&self, _peer_addr: &str, message: Message) -> Message {
        let directory = &self.0;
        let result = match message {
            Message::RegisterFileServer { node_id, address } => directory
                .register_file_server(node_id, &address)
                .await
                .map(|success| Message::Accepted { success }),
            Message::UnregisterFileServer { node_id } => directory
                .unregister_file_server(node_id)
                .await
                .map(|_| Message::Ack),
            Message::SaveFileInfo { entries } => directory
                .save_file_info(entries)
                .await
                .map(|success| Message::Accepted { success }),
            Message::GetFileInfo { user_id, file_names } => directory
                .get_file_info(user_id, file_names)
                .await
                .map(|entries| Message::FileInfoList { entries }),
            Message::GetBackupNode { user_id } => directory
                .backup_node(user_id)
                .await
                .map(|address| Message::BackupNode { address }),
            other => Err(Error::UnexpectedMessage(other.type_name())),
        };
        result.unwrap_or_else(|e| Message::Error {
            code: ErrorCode::Internal,
            message: e.to_string(),
        })
    }
}

/// A backup node that never answers
pub struct UnreachableReplica {
    pub address: String,
}

impl UnreachableReplica {
    fn down<T>(&self) -> Result<T> {
        Err(Error::ReplicaUnreachable {
            address: self.address.clone(),
            reason: "connection refused".into(),
        })
    }
}

#[async_trait]
impl Replica for UnreachableReplica {
    fn address(&self) -> &str {
        &self.address
    }
    async fn list(&self, _: UserId, _: &str) -> Result<Listing> {
        self.down()
    }
    async fn read(&self, _: UserId, _: &str) -> Result<Vec<u8>> {
        self.down()
    }
    async fn write(&self, _: UserId, _: &str, _: Vec<u8>) -> Result<()> {
        self.down()
    }
    async fn delete(&self, _: UserId, _: &str) -> Result<()> {
        self.down()
    }
    async fn digest_of(&self, _: UserId, _: &str) -> Result<String> {
        self.down()
    }
}

/// Connects known addresses to in-process replicas; anything else is down
#[derive(Default)]
pub struct StaticConnector {
    pub replicas: Mutex<HashMap<String, Arc<dyn Replica>>>,
}

impl StaticConnector {
    pub fn with(address: &str, replica: Arc<dyn Replica>) -> Arc<Self> {
        let connector = Self::default();
        connector.replicas.lock().unwrap().insert(address.to_string(), replica);
        Arc::new(connector)
    }
}

impl ReplicaConnector for StaticConnector {
    fn connect(&self, address: &str) -> Arc<dyn Replica> {
        match self.replicas.lock().unwrap().get(address) {
            Some(replica) => Arc::clone(replica),
            None => Arc::new(UnreachableReplica {
                address: address.to_string(),
            }),
        }
    }
}
