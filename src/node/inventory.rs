//! Startup Inventory
//!
//! Walks the node root and describes every owned file for the directory
//! service. Files that disappear while the walk is running are skipped.

use futures::stream::{self, StreamExt};

use crate::error::Result;
use crate::replication::protocol::InventoryEntry;
use crate::storage::local::file_meta;
use crate::storage::{digest_file, LocalStore, NodeId};

/// Build the inventory of `store`, hashing up to `concurrency` files at once
pub async fn scan(store: &LocalStore, node_id: NodeId, concurrency: usize) -> Result<Vec<InventoryEntry>> {
    let mut owned = Vec::new();
    for path in store.files().await? {
        match store.sandbox().classify_owner(&path) {
            Some((user_id, _role)) => owned.push((user_id, path)),
            None => tracing::debug!("Skipping unowned file {}", path.display()),
        }
    }

    let mut entries: Vec<InventoryEntry> = stream::iter(owned)
        .map(|(user_id, path)| async move {
            let digest = digest_file(&path).await?;
            let metadata = tokio::fs::metadata(&path).await?;
            let meta = file_meta(&metadata)?;
            let file_name = path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default();

            Ok::<_, crate::Error>(InventoryEntry {
                user_id,
                node_id,
                path: path.to_string_lossy().into_owned(),
                file_name,
                digest,
                modified: meta.modified,
            })
        })
        .buffer_unordered(concurrency.max(1))
        .filter_map(|result| async move {
            match result {
                Ok(entry) => Some(entry),
                Err(e) => {
                    tracing::warn!("Skipping file during inventory: {}", e);
                    None
                }
            }
        })
        .collect()
        .await;

    entries.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(entries)
}
