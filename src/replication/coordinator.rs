//! Replication Coordinator
//!
//! Runs the user-facing upload, fetch and delete operations against the local
//! primary copy and the user's backup node, and repairs whichever copy is
//! found missing or diverged on the read path.
//!
//! The backup address is looked up from the directory on every operation.
//! When the two copies disagree the backup wins, except for files flagged in
//! the [`DeficiencyTracker`], whose backup is known to be behind.

use std::path::Path;
use std::sync::Arc;

use super::deficiency::{DeficiencyKind, DeficiencyTracker};
use super::replica::{Replica, ReplicaConnector};
use crate::directory::DirectoryService;
use crate::error::{Error, Result};
use crate::storage::{digest_bytes, LocalStore, Role, UserId};

/// Coordinates the two copies of every user file
pub struct ReplicationCoordinator {
    store: LocalStore,
    directory: Arc<dyn DirectoryService>,
    connector: Arc<dyn ReplicaConnector>,
    deficiencies: Arc<DeficiencyTracker>,
}

impl ReplicationCoordinator {
    /// Create a coordinator over the local store and the cluster's directory
    pub fn new(
        store: LocalStore,
        directory: Arc<dyn DirectoryService>,
        connector: Arc<dyn ReplicaConnector>,
    ) -> Self {
        Self {
            store,
            directory,
            connector,
            deficiencies: Arc::new(DeficiencyTracker::new()),
        }
    }

    /// The local store holding primary copies
    pub fn store(&self) -> &LocalStore {
        &self.store
    }

    /// Files whose backup copy needs repair
    pub fn deficiencies(&self) -> &Arc<DeficiencyTracker> {
        &self.deficiencies
    }

    /// Write a file locally, then mirror it to the backup.
    ///
    /// Succeeds once the local write is durable. The file stays flagged for
    /// repair from the local commit until the backup acknowledges, so a
    /// caller that stops waiting in between leaves the flag in place.
    pub async fn upload(&self, user_id: UserId, path: &str, data: Vec<u8>) -> Result<()> {
        let key = self.store.sandbox().resolve_file(user_id, Role::Primary, path)?;
        let backup = self.backup_for(user_id).await;

        // The local write commits even if this future is dropped, so the
        // flag goes up before it and comes down only on backup success
        let previous = self.deficiencies.get(&key);
        self.deficiencies
            .record(&key, user_id, path, DeficiencyKind::StaleWrite, "backup write in flight");

        let mirrored = data.clone();
        if let Err(e) = self.store.write(user_id, Role::Primary, path, data).await {
            self.deficiencies.restore(&key, previous);
            return Err(match e {
                Error::InvalidPath { .. } => e,
                other => Error::UploadFailed(format!("user {} path {}: {}", user_id, path, other)),
            });
        }

        let outcome = match backup {
            Ok(replica) => replica.write(user_id, path, mirrored).await,
            Err(e) => Err(e),
        };

        match outcome {
            Ok(()) => {
                self.deficiencies.clear(&key);
            }
            Err(e) => {
                tracing::warn!(user_id, path, "Backup write failed, file flagged for repair: {}", e);
                self.deficiencies
                    .record(&key, user_id, path, DeficiencyKind::StaleWrite, e.to_string());
            }
        }

        Ok(())
    }

    /// Serve a file, verifying it against the backup and repairing either
    /// copy when it is missing or diverged
    pub async fn fetch(&self, user_id: UserId, path: &str) -> Result<Vec<u8>> {
        let key = self.store.sandbox().resolve_file(user_id, Role::Primary, path)?;
        let backup = self.backup_for(user_id).await;

        let local = match self.store.read(user_id, Role::Primary, path).await {
            Ok(data) => Some(data),
            Err(e) if e.is_not_found() => None,
            Err(e @ Error::InvalidPath { .. }) => return Err(e),
            Err(e) => {
                tracing::warn!(user_id, path, "Local copy unreadable: {}", e);
                None
            }
        };

        match local {
            Some(data) => Ok(self.verify_local(user_id, path, &key, data, backup).await),
            None => self.recover_from_backup(user_id, path, &key, backup).await,
        }
    }

    /// Delete a file locally, then on the backup. Deleting an absent file
    /// succeeds.
    pub async fn delete(&self, user_id: UserId, path: &str) -> Result<()> {
        let key = self.store.sandbox().resolve_file(user_id, Role::Primary, path)?;
        let backup = self.backup_for(user_id).await;

        let previous = self.deficiencies.get(&key);
        self.deficiencies
            .record(&key, user_id, path, DeficiencyKind::PendingDelete, "backup delete in flight");

        match self.store.delete(user_id, Role::Primary, path).await {
            Ok(()) => {}
            Err(e) if e.is_not_found() => {
                tracing::debug!(user_id, path, "Local copy already absent");
            }
            Err(e) => {
                self.deficiencies.restore(&key, previous);
                return Err(match e {
                    Error::InvalidPath { .. } => e,
                    other => Error::DeleteFailed(format!("user {} path {}: {}", user_id, path, other)),
                });
            }
        }

        let outcome = match backup {
            Ok(replica) => replica.delete(user_id, path).await,
            Err(e) => Err(e),
        };

        match outcome {
            Ok(()) => {
                self.deficiencies.clear(&key);
            }
            Err(e) if e.is_not_found() => {
                self.deficiencies.clear(&key);
            }
            Err(e) => {
                tracing::warn!(user_id, path, "Backup delete failed, file flagged for repair: {}", e);
                self.deficiencies
                    .record(&key, user_id, path, DeficiencyKind::PendingDelete, e.to_string());
            }
        }

        Ok(())
    }

    /// Resolve the user's backup node for this operation
    async fn backup_for(&self, user_id: UserId) -> Result<Arc<dyn Replica>> {
        match self.directory.backup_node(user_id).await {
            Ok(Some(address)) => Ok(self.connector.connect(&address)),
            Ok(None) => Err(Error::Directory(format!("no backup node assigned for user {}", user_id))),
            Err(e) => {
                tracing::warn!(user_id, "Backup lookup failed: {}", e);
                Err(e)
            }
        }
    }

    /// Local copy exists: compare with the backup and pick the winner
    async fn verify_local(
        &self,
        user_id: UserId,
        path: &str,
        key: &Path,
        data: Vec<u8>,
        backup: Result<Arc<dyn Replica>>,
    ) -> Vec<u8> {
        let replica = match backup {
            Ok(replica) => replica,
            Err(e) => {
                tracing::warn!(user_id, path, "Serving unverified local copy: {}", e);
                return data;
            }
        };

        if self.deficiencies.contains(key) {
            self.repair_backup(replica.as_ref(), user_id, path, key, &data).await;
            return data;
        }

        let local_digest = digest_bytes(&data);
        match replica.digest_of(user_id, path).await {
            Ok(remote_digest) if remote_digest == local_digest => data,
            Ok(remote_digest) => {
                tracing::warn!(
                    user_id,
                    path,
                    local = %local_digest,
                    backup = %remote_digest,
                    "Copies diverged, taking the backup copy"
                );
                match replica.read(user_id, path).await {
                    Ok(backup_data) => {
                        self.repair_local(user_id, path, &backup_data).await;
                        backup_data
                    }
                    Err(e) => {
                        tracing::warn!(user_id, path, "Backup read failed, serving unverified local copy: {}", e);
                        data
                    }
                }
            }
            Err(e) if e.is_not_found() => {
                self.repair_backup(replica.as_ref(), user_id, path, key, &data).await;
                data
            }
            Err(e) => {
                tracing::warn!(user_id, path, "Serving unverified local copy: {}", e);
                data
            }
        }
    }

    /// Local copy missing: serve the backup copy and restore it locally
    async fn recover_from_backup(
        &self,
        user_id: UserId,
        path: &str,
        key: &Path,
        backup: Result<Arc<dyn Replica>>,
    ) -> Result<Vec<u8>> {
        let unrecoverable = |reason: String| {
            Error::FileUnrecoverable(format!("user {} path {}: {}", user_id, path, reason))
        };

        let replica = backup.map_err(|e| unrecoverable(format!("local copy missing, {}", e)))?;

        // The file was deleted here but the backup missed it; finish the delete
        if let Some(deficiency) = self.deficiencies.get(key) {
            if deficiency.kind == DeficiencyKind::PendingDelete {
                match replica.delete(user_id, path).await {
                    Ok(()) => {
                        self.deficiencies.clear(key);
                        tracing::info!(user_id, path, "Completed pending backup delete");
                    }
                    Err(e) if e.is_not_found() => {
                        self.deficiencies.clear(key);
                    }
                    Err(e) => {
                        tracing::warn!(user_id, path, "Pending backup delete still failing: {}", e);
                    }
                }
                return Err(unrecoverable("file was deleted".to_string()));
            }
        }

        match replica.read(user_id, path).await {
            Ok(data) => {
                self.repair_local(user_id, path, &data).await;
                Ok(data)
            }
            Err(e) => Err(unrecoverable(format!("local copy missing, backup: {}", e))),
        }
    }

    async fn repair_local(&self, user_id: UserId, path: &str, data: &[u8]) {
        match self.store.write(user_id, Role::Primary, path, data.to_vec()).await {
            Ok(()) => tracing::info!(user_id, path, "Repaired local copy from backup"),
            Err(e) => tracing::warn!(user_id, path, "Local repair failed: {}", e),
        }
    }

    async fn repair_backup(&self, replica: &dyn Replica, user_id: UserId, path: &str, key: &Path, data: &[u8]) {
        match replica.write(user_id, path, data.to_vec()).await {
            Ok(()) => {
                self.deficiencies.clear(key);
                tracing::info!(user_id, path, backup = replica.address(), "Repaired backup copy");
            }
            Err(e) => {
                tracing::warn!(user_id, path, "Backup repair failed: {}", e);
                self.deficiencies
                    .record(key, user_id, path, DeficiencyKind::StaleWrite, e.to_string());
            }
        }
    }
}
