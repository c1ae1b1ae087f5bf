//! Node Service
//!
//! A storage node's lifecycle and request surface. On startup the node
//! registers with the directory service and reports its inventory; it serves
//! only if both calls succeed. Client operations go through the
//! [`ReplicationCoordinator`]; replica primitives from peers go straight to
//! the backup partition and are never re-replicated.

pub mod inventory;

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

use crate::config::WolfShardConfig;
use crate::directory::{DirectoryService, RemoteDirectory};
use crate::error::{Error, Result};
use crate::network::{MessageHandler, NetworkClient};
use crate::replication::protocol::{ListEntry, Message};
use crate::replication::{
    DeficiencyTracker, LocalReplica, RemoteConnector, Replica, ReplicaConnector, ReplicationCoordinator,
};
use crate::storage::{LocalStore, NodeId, Role, UserId};

/// Directory listing returned to clients
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DirectoryListing {
    pub dirs: Vec<String>,
    pub files: Vec<ListEntry>,
}

/// A storage node
pub struct FileNode {
    node_id: NodeId,
    address: String,
    store: LocalStore,
    directory: Arc<dyn DirectoryService>,
    coordinator: ReplicationCoordinator,
    backup: LocalReplica,
    inventory_concurrency: usize,
    registered: AtomicBool,
}

impl FileNode {
    pub fn new(
        node_id: NodeId,
        address: impl Into<String>,
        store: LocalStore,
        directory: Arc<dyn DirectoryService>,
        connector: Arc<dyn ReplicaConnector>,
    ) -> Self {
        let address = address.into();
        Self {
            node_id,
            backup: LocalReplica::new(address.clone(), store.clone()),
            coordinator: ReplicationCoordinator::new(store.clone(), Arc::clone(&directory), connector),
            address,
            store,
            directory,
            inventory_concurrency: 8,
            registered: AtomicBool::new(false),
        }
    }

    /// Build a node that talks to its directory and peers over TCP
    pub fn from_config(config: &WolfShardConfig) -> Result<Self> {
        let store = LocalStore::new(config.node_root())?;

        let directory_client = Arc::new(NetworkClient::new(
            config.directory_connect_timeout(),
            config.directory_request_timeout(),
        ));
        let replica_client = Arc::new(NetworkClient::new(
            config.replica_connect_timeout(),
            config.replica_request_timeout(),
        ));

        let node = Self::new(
            config.node.id,
            config.advertise_address(),
            store,
            Arc::new(RemoteDirectory::new(config.directory.address.clone(), directory_client)),
            Arc::new(RemoteConnector::new(replica_client)),
        );
        Ok(node.with_inventory_concurrency(config.replication.inventory_concurrency))
    }

    pub fn with_inventory_concurrency(mut self, concurrency: usize) -> Self {
        self.inventory_concurrency = concurrency.max(1);
        self
    }

    pub fn node_id(&self) -> NodeId {
        self.node_id
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn root(&self) -> &Path {
        self.store.root()
    }

    pub fn is_registered(&self) -> bool {
        self.registered.load(Ordering::SeqCst)
    }

    pub fn deficiencies(&self) -> &Arc<DeficiencyTracker> {
        self.coordinator.deficiencies()
    }

    pub fn coordinator(&self) -> &ReplicationCoordinator {
        &self.coordinator
    }

    /// Register with the directory service and report the inventory.
    ///
    /// Returns the number of files reported. Any failure means the node must
    /// not serve.
    pub async fn startup(&self) -> Result<usize> {
        tracing::info!("Registering node {} at {}", self.node_id, self.address);
        let accepted = self
            .directory
            .register_file_server(self.node_id, &self.address)
            .await
            .map_err(|e| Error::Registration(format!("register failed: {}", e)))?;
        if !accepted {
            return Err(Error::Registration(format!(
                "directory refused node {}",
                self.node_id
            )));
        }
        self.registered.store(true, Ordering::SeqCst);

        tracing::info!("Scanning {}", self.store.root().display());
        let entries = match inventory::scan(&self.store, self.node_id, self.inventory_concurrency).await {
            Ok(entries) => entries,
            Err(e) => {
                self.shutdown().await;
                return Err(Error::Registration(format!("inventory scan failed: {}", e)));
            }
        };
        let count = entries.len();

        let saved = match self.directory.save_file_info(entries).await {
            Ok(saved) => saved,
            Err(e) => {
                self.shutdown().await;
                return Err(Error::Registration(format!("inventory report failed: {}", e)));
            }
        };
        if !saved {
            self.shutdown().await;
            return Err(Error::Registration("directory refused inventory".to_string()));
        }

        tracing::info!("Reported {} files to the directory service", count);
        Ok(count)
    }

    /// Withdraw from the directory service
    pub async fn shutdown(&self) {
        if !self.registered.swap(false, Ordering::SeqCst) {
            return;
        }
        match self.directory.unregister_file_server(self.node_id).await {
            Ok(()) => tracing::info!("Node {} unregistered", self.node_id),
            Err(e) => tracing::warn!("Failed to unregister node {}: {}", self.node_id, e),
        }
    }

    /// List a directory of the user's primary partition, with creation and
    /// update times from the directory service where it has them
    pub async fn list(&self, user_id: UserId, dir_path: &str) -> Result<DirectoryListing> {
        let listing = self.store.list(user_id, Role::Primary, dir_path).await?;

        let known: HashMap<String, ListEntry> = match self
            .directory
            .get_file_info(user_id, listing.files.clone())
            .await
        {
            Ok(infos) => infos.into_iter().map(|info| (info.name.clone(), info)).collect(),
            Err(e) => {
                tracing::warn!(user_id, path = dir_path, "File info lookup failed, using local times: {}", e);
                HashMap::new()
            }
        };

        let mut files = Vec::with_capacity(listing.files.len());
        for name in listing.files {
            if let Some(info) = known.get(&name) {
                files.push(info.clone());
                continue;
            }
            let relative = Path::new(dir_path).join(&name);
            match self.store.stat(user_id, Role::Primary, &relative.to_string_lossy()).await {
                Ok(meta) => files.push(ListEntry {
                    name,
                    created_at: meta.modified,
                    updated_at: meta.modified,
                }),
                // Removed since the listing was taken
                Err(e) if e.is_not_found() => {}
                Err(e) => return Err(e),
            }
        }

        Ok(DirectoryListing {
            dirs: listing.dirs,
            files,
        })
    }

    async fn dispatch(&self, message: Message) -> Result<Message> {
        match message {
            Message::List { user_id, path } => {
                let listing = self.list(user_id, &path).await?;
                Ok(Message::Listing {
                    dirs: listing.dirs,
                    files: listing.files,
                })
            }
            Message::Upload { user_id, path, data } => {
                self.coordinator.upload(user_id, &path, data).await?;
                Ok(Message::Ack)
            }
            Message::Fetch { user_id, path } => {
                let data = self.coordinator.fetch(user_id, &path).await?;
                Ok(Message::FileData { data })
            }
            Message::Delete { user_id, path } => {
                self.coordinator.delete(user_id, &path).await?;
                Ok(Message::Ack)
            }
            Message::ReplicaList { user_id, path } => {
                let listing = self.backup.list(user_id, &path).await?;
                Ok(Message::ReplicaListing {
                    dirs: listing.dirs,
                    files: listing.files,
                })
            }
            Message::ReplicaRead { user_id, path } => {
                let data = self.backup.read(user_id, &path).await?;
                Ok(Message::FileData { data })
            }
            Message::ReplicaWrite { user_id, path, data } => {
                self.backup.write(user_id, &path, data).await?;
                Ok(Message::Ack)
            }
            Message::ReplicaDelete { user_id, path } => {
                self.backup.delete(user_id, &path).await?;
                Ok(Message::Ack)
            }
            Message::ReplicaDigest { user_id, path } => {
                let digest = self.backup.digest_of(user_id, &path).await?;
                Ok(Message::Digest { digest })
            }
            other => Err(Error::UnexpectedMessage(other.type_name())),
        }
    }
}

#[async_trait]
impl MessageHandler for FileNode {
    async fn handle(&self, peer_addr: &str, message: Message) -> Message {
        let kind = message.type_name();
        match self.dispatch(message).await {
            Ok(response) => response,
            Err(e) => {
                tracing::debug!("{} from {} failed: {}", kind, peer_addr, e);
                Message::from_error(&e)
            }
        }
    }
}
