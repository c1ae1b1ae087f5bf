//! Replica Client
//!
//! The primitive operations a primary needs from its backup node. Callers
//! must be able to tell three failure classes apart:
//!
//! - [`Error::ReplicaUnreachable`]: timeout or transport failure
//! - [`Error::NotFound`]: the peer answered and the file is absent
//! - [`Error::InvalidPath`] / [`Error::ReplicaRejected`]: the peer refused

use std::sync::Arc;

use async_trait::async_trait;

use super::protocol::{ErrorCode, Message};
use crate::error::{Error, Result};
use crate::network::NetworkClient;
use crate::storage::{Listing, LocalStore, Role, UserId};

/// Operations on a backup copy of a user's partition
#[async_trait]
pub trait Replica: Send + Sync {
    /// Address identifying the backup node
    fn address(&self) -> &str;

    async fn list(&self, user_id: UserId, dir_path: &str) -> Result<Listing>;

    async fn read(&self, user_id: UserId, file_path: &str) -> Result<Vec<u8>>;

    async fn write(&self, user_id: UserId, file_path: &str, data: Vec<u8>) -> Result<()>;

    async fn delete(&self, user_id: UserId, file_path: &str) -> Result<()>;

    async fn digest_of(&self, user_id: UserId, file_path: &str) -> Result<String>;
}

/// Produces a replica handle for a backup address looked up per operation
pub trait ReplicaConnector: Send + Sync {
    fn connect(&self, address: &str) -> Arc<dyn Replica>;
}

/// Replica on a peer node, reached over the node protocol
pub struct RemoteReplica {
    address: String,
    client: Arc<NetworkClient>,
}

impl RemoteReplica {
    pub fn new(address: impl Into<String>, client: Arc<NetworkClient>) -> Self {
        Self {
            address: address.into(),
            client,
        }
    }

    /// Send one request, classifying transport failures and peer errors
    async fn call(&self, user_id: UserId, path: &str, request: Message) -> Result<Message> {
        let response = self.client.send(&self.address, request).await.map_err(|e| {
            if e.is_transport() {
                Error::ReplicaUnreachable {
                    address: self.address.clone(),
                    reason: e.to_string(),
                }
            } else {
                e
            }
        })?;

        match response {
            Message::Error { code, message } => Err(match code {
                ErrorCode::NotFound => Error::NotFound(message),
                ErrorCode::InvalidPath => Error::InvalidPath {
                    user_id,
                    path: path.to_string(),
                },
                _ => Error::ReplicaRejected {
                    address: self.address.clone(),
                    reason: message,
                },
            }),
            other => Ok(other),
        }
    }
}

#[async_trait]
impl Replica for RemoteReplica {
    fn address(&self) -> &str {
        &self.address
    }

    async fn list(&self, user_id: UserId, dir_path: &str) -> Result<Listing> {
        let request = Message::ReplicaList {
            user_id,
            path: dir_path.to_string(),
        };
        match self.call(user_id, dir_path, request).await? {
            Message::ReplicaListing { dirs, files } => Ok(Listing { dirs, files }),
            other => Err(Error::UnexpectedMessage(other.type_name())),
        }
    }

    async fn read(&self, user_id: UserId, file_path: &str) -> Result<Vec<u8>> {
        let request = Message::ReplicaRead {
            user_id,
            path: file_path.to_string(),
        };
        match self.call(user_id, file_path, request).await? {
            Message::FileData { data } => Ok(data),
            other => Err(Error::UnexpectedMessage(other.type_name())),
        }
    }

    async fn write(&self, user_id: UserId, file_path: &str, data: Vec<u8>) -> Result<()> {
        let request = Message::ReplicaWrite {
            user_id,
            path: file_path.to_string(),
            data,
        };
        match self.call(user_id, file_path, request).await? {
            Message::Ack => Ok(()),
            other => Err(Error::UnexpectedMessage(other.type_name())),
        }
    }

    async fn delete(&self, user_id: UserId, file_path: &str) -> Result<()> {
        let request = Message::ReplicaDelete {
            user_id,
            path: file_path.to_string(),
        };
        match self.call(user_id, file_path, request).await? {
            Message::Ack => Ok(()),
            other => Err(Error::UnexpectedMessage(other.type_name())),
        }
    }

    async fn digest_of(&self, user_id: UserId, file_path: &str) -> Result<String> {
        let request = Message::ReplicaDigest {
            user_id,
            path: file_path.to_string(),
        };
        match self.call(user_id, file_path, request).await? {
            Message::Digest { digest } => Ok(digest),
            other => Err(Error::UnexpectedMessage(other.type_name())),
        }
    }
}

/// Connects to backups over the node protocol, sharing one client pool
pub struct RemoteConnector {
    client: Arc<NetworkClient>,
}

impl RemoteConnector {
    pub fn new(client: Arc<NetworkClient>) -> Self {
        Self { client }
    }
}

impl ReplicaConnector for RemoteConnector {
    fn connect(&self, address: &str) -> Arc<dyn Replica> {
        Arc::new(RemoteReplica::new(address, Arc::clone(&self.client)))
    }
}

/// The backup partition of a local store.
///
/// This is what a node runs when a peer's replica requests arrive, and it is
/// usable in-process wherever a [`Replica`] is expected.
#[derive(Clone)]
pub struct LocalReplica {
    address: String,
    store: LocalStore,
}

impl LocalReplica {
    pub fn new(address: impl Into<String>, store: LocalStore) -> Self {
        Self {
            address: address.into(),
            store,
        }
    }

    pub fn store(&self) -> &LocalStore {
        &self.store
    }
}

#[async_trait]
impl Replica for LocalReplica {
    fn address(&self) -> &str {
        &self.address
    }

    async fn list(&self, user_id: UserId, dir_path: &str) -> Result<Listing> {
        self.store.list(user_id, Role::Backup, dir_path).await
    }

    async fn read(&self, user_id: UserId, file_path: &str) -> Result<Vec<u8>> {
        self.store.read(user_id, Role::Backup, file_path).await
    }

    async fn write(&self, user_id: UserId, file_path: &str, data: Vec<u8>) -> Result<()> {
        self.store.write(user_id, Role::Backup, file_path, data).await
    }

    async fn delete(&self, user_id: UserId, file_path: &str) -> Result<()> {
        self.store.delete(user_id, Role::Backup, file_path).await
    }

    async fn digest_of(&self, user_id: UserId, file_path: &str) -> Result<String> {
        self.store.digest_of(user_id, Role::Backup, file_path).await
    }
}
