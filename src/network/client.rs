//! Network Client
//!
//! TCP client for connecting to peer nodes and the directory service.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::time::timeout;

use super::{read_message, write_message};
use crate::error::{Error, Result};
use crate::replication::Message;

/// Idle connections older than this are not reused
const MAX_IDLE_TIME: Duration = Duration::from_secs(60);

/// Idle connection kept for reuse
struct PoolEntry {
    stream: TcpStream,
    last_used: Instant,
}

/// Network client for request/response exchanges with remote endpoints.
///
/// A pooled connection is checked out for the whole exchange, so a request
/// abandoned mid-flight (timeout or caller cancellation) drops its connection
/// instead of returning a half-read stream to the pool.
pub struct NetworkClient {
    /// Idle connections per address
    pool: Arc<Mutex<HashMap<String, Vec<PoolEntry>>>>,
    /// Connection timeout
    connect_timeout: Duration,
    /// Request timeout
    request_timeout: Duration,
    /// Max idle connections kept per address
    max_idle: usize,
}

impl NetworkClient {
    /// Create a new network client
    pub fn new(connect_timeout: Duration, request_timeout: Duration) -> Self {
        Self {
            pool: Arc::new(Mutex::new(HashMap::new())),
            connect_timeout,
            request_timeout,
            max_idle: 4,
        }
    }

    /// Send a message to a remote endpoint and wait for its response
    pub async fn send(&self, address: &str, message: Message) -> Result<Message> {
        let result = timeout(self.request_timeout, self.send_inner(address, message)).await;

        match result {
            Ok(inner_result) => inner_result,
            Err(_) => Err(Error::ConnectionTimeout(address.to_string())),
        }
    }

    /// Send without timeout wrapper
    async fn send_inner(&self, address: &str, message: Message) -> Result<Message> {
        // Try an idle pooled connection first
        if let Some(mut entry) = self.checkout(address).await {
            match exchange(&mut entry.stream, &message).await {
                Ok(response) => {
                    self.checkin(address, entry.stream).await;
                    return Ok(response);
                }
                Err(e) => {
                    // Peer closed the idle connection; retry on a fresh one
                    tracing::debug!("Pooled connection to {} failed: {}", address, e);
                }
            }
        }

        let mut stream = self.connect(address).await?;
        let response = exchange(&mut stream, &message).await?;
        self.checkin(address, stream).await;

        Ok(response)
    }

    /// Connect to an address
    async fn connect(&self, address: &str) -> Result<TcpStream> {
        let result = timeout(self.connect_timeout, TcpStream::connect(address)).await;

        match result {
            Ok(Ok(stream)) => {
                stream.set_nodelay(true)?;
                Ok(stream)
            }
            Ok(Err(e)) => Err(Error::ConnectionFailed {
                address: address.to_string(),
                reason: e.to_string(),
            }),
            Err(_) => Err(Error::ConnectionTimeout(address.to_string())),
        }
    }

    /// Take an idle connection out of the pool, dropping stale ones
    async fn checkout(&self, address: &str) -> Option<PoolEntry> {
        let mut pool = self.pool.lock().await;
        let idle = pool.get_mut(address)?;
        while let Some(entry) = idle.pop() {
            if entry.last_used.elapsed() <= MAX_IDLE_TIME {
                return Some(entry);
            }
            tracing::debug!("Removing stale connection to {}", address);
        }
        None
    }

    /// Return a healthy connection to the pool
    async fn checkin(&self, address: &str, stream: TcpStream) {
        let mut pool = self.pool.lock().await;
        let idle = pool.entry(address.to_string()).or_default();
        if idle.len() < self.max_idle {
            idle.push(PoolEntry {
                stream,
                last_used: Instant::now(),
            });
        }
    }

    /// Get idle connection count
    pub async fn connection_count(&self) -> usize {
        self.pool.lock().await.values().map(Vec::len).sum()
    }
}

/// One request/response exchange on an open stream
async fn exchange(stream: &mut TcpStream, message: &Message) -> Result<Message> {
    let (mut reader, mut writer) = stream.split();
    write_message(&mut writer, message).await?;
    read_message(&mut reader).await
}
