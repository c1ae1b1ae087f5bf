//! HTTP API Server
//!
//! Read-only status endpoints for operators.

use std::sync::Arc;

use axum::{extract::State, response::IntoResponse, routing::get, Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tower_http::trace::TraceLayer;

use crate::config::ApiConfig;
use crate::error::{Error, Result};
use crate::node::FileNode;
use crate::replication::{DeficiencyKind, DeficiencyTracker};
use crate::storage::{NodeId, UserId};

/// Shared application state
pub struct AppState {
    pub node: Arc<FileNode>,
}

/// HTTP API server
pub struct HttpServer {
    config: ApiConfig,
    state: Arc<AppState>,
    shutdown: watch::Sender<bool>,
}

impl HttpServer {
    /// Create a new HTTP server
    pub fn new(config: ApiConfig, node: Arc<FileNode>) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            config,
            state: Arc::new(AppState { node }),
            shutdown,
        }
    }

    /// Create the router
    fn create_router(state: Arc<AppState>) -> Router {
        Router::new()
            .route("/health", get(handle_health))
            .route("/status", get(handle_status))
            .route("/deficiencies", get(handle_deficiencies))
            .layer(TraceLayer::new_for_http())
            .with_state(state)
    }

    /// Bind and serve until stopped; returns at once when disabled
    pub async fn start(&self) -> Result<()> {
        if !self.config.enabled {
            tracing::info!("HTTP API disabled");
            return Ok(());
        }

        let listener = TcpListener::bind(&self.config.bind_address).await?;
        tracing::info!("HTTP API listening on {}", listener.local_addr()?);
        self.serve(listener).await
    }

    /// Serve from an already bound listener until stopped
    pub async fn serve(&self, listener: TcpListener) -> Result<()> {
        let app = Self::create_router(Arc::clone(&self.state));
        let mut shutdown_rx = self.shutdown.subscribe();

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                while shutdown_rx.changed().await.is_ok() {
                    if *shutdown_rx.borrow() {
                        break;
                    }
                }
            })
            .await
            .map_err(|e| Error::Network(format!("HTTP server error: {}", e)))
    }

    /// Stop the server
    pub fn stop(&self) {
        let _ = self.shutdown.send(true);
    }
}

// ============ Response Types ============

/// Health response
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub healthy: bool,
    pub node_id: NodeId,
}

/// Status response
#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub node_id: NodeId,
    pub address: String,
    pub node_root: String,
    pub registered: bool,
    pub deficiencies: usize,
}

/// A file whose backup copy needs repair
#[derive(Debug, Serialize, Deserialize)]
pub struct DeficiencyEntry {
    pub user_id: UserId,
    pub path: String,
    pub kind: String,
    pub reason: String,
    pub since: DateTime<Utc>,
}

impl DeficiencyEntry {
    fn collect(tracker: &DeficiencyTracker) -> Vec<Self> {
        tracker
            .list()
            .into_iter()
            .map(|d| DeficiencyEntry {
                user_id: d.user_id,
                path: d.path,
                kind: match d.kind {
                    DeficiencyKind::StaleWrite => "stale_write".to_string(),
                    DeficiencyKind::PendingDelete => "pending_delete".to_string(),
                },
                reason: d.reason,
                since: d.since,
            })
            .collect()
    }
}

// ============ Handlers ============

async fn handle_health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(HealthResponse {
        healthy: state.node.is_registered(),
        node_id: state.node.node_id(),
    })
}

async fn handle_status(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let node = &state.node;
    Json(StatusResponse {
        node_id: node.node_id(),
        address: node.address().to_string(),
        node_root: node.root().display().to_string(),
        registered: node.is_registered(),
        deficiencies: node.deficiencies().len(),
    })
}

async fn handle_deficiencies(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(DeficiencyEntry::collect(state.node.deficiencies()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::DirectoryService;
    use crate::replication::protocol::{FileInfo, InventoryEntry};
    use crate::replication::{Replica, ReplicaConnector};
    use crate::storage::LocalStore;
    use async_trait::async_trait;
    use tempfile::tempdir;

    struct Lonely;

    #[async_trait]
    impl DirectoryService for Lonely {
        async fn register_file_server(&self, _: NodeId, _: &str) -> Result<bool> {
            Ok(true)
        }
        async fn unregister_file_server(&self, _: NodeId) -> Result<()> {
            Ok(())
        }
        async fn save_file_info(&self, _: Vec<InventoryEntry>) -> Result<bool> {
            Ok(true)
        }
        async fn get_file_info(&self, _: UserId, _: Vec<String>) -> Result<Vec<FileInfo>> {
            Ok(Vec::new())
        }
        async fn backup_node(&self, _: UserId) -> Result<Option<String>> {
            Ok(None)
        }
    }

    struct NoPeers;

    impl ReplicaConnector for NoPeers {
        fn connect(&self, address: &str) -> Arc<dyn Replica> {
            panic!("unexpected connect to {}", address)
        }
    }

    #[tokio::test]
    async fn test_status_endpoints() {
        let dir = tempdir().unwrap();
        let node = Arc::new(FileNode::new(
            5,
            "127.0.0.1:9600",
            LocalStore::new(dir.path()).unwrap(),
            Arc::new(Lonely),
            Arc::new(NoPeers),
        ));
        node.startup().await.unwrap();
        // No backup assigned, so the upload is flagged
        node.coordinator().upload(7, "a.txt", b"a".to_vec()).await.unwrap();

        let server = Arc::new(HttpServer::new(ApiConfig::default(), Arc::clone(&node)));
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        let serving = Arc::clone(&server);
        let handle = tokio::spawn(async move { serving.serve(listener).await });

        let client = reqwest::Client::new();
        let health: HealthResponse = client
            .get(format!("{}/health", base))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert!(health.healthy);
        assert_eq!(health.node_id, 5);

        let status: StatusResponse = client
            .get(format!("{}/status", base))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert!(status.registered);
        assert_eq!(status.deficiencies, 1);

        let flagged: Vec<DeficiencyEntry> = client
            .get(format!("{}/deficiencies", base))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(flagged.len(), 1);
        assert_eq!(flagged[0].path, "a.txt");
        assert_eq!(flagged[0].kind, "stale_write");

        server.stop();
        handle.await.unwrap().unwrap();
    }
}
