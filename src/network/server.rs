//! Network Server
//!
//! TCP server accepting requests from clients and peer nodes.

use std::sync::Arc;
use tokio::net::tcp::OwnedReadHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;

use super::{read_message, write_message};
use crate::error::{Error, Result};
use crate::replication::Message;

/// Answers one request with one response
#[async_trait::async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(&self, peer_addr: &str, message: Message) -> Message;
}

/// Network server for client and peer communication
pub struct NetworkServer {
    /// Bind address
    bind_address: String,
    /// Request handler
    handler: Arc<dyn MessageHandler>,
    /// Shutdown signal
    shutdown: watch::Sender<bool>,
}

impl NetworkServer {
    /// Create a new network server
    pub fn new(bind_address: String, handler: Arc<dyn MessageHandler>) -> Self {
        let (shutdown_tx, _) = watch::channel(false);

        Self {
            bind_address,
            handler,
            shutdown: shutdown_tx,
        }
    }

    /// Bind the listening socket
    pub async fn bind(&self) -> Result<TcpListener> {
        let listener = TcpListener::bind(&self.bind_address).await?;
        tracing::info!("Network server listening on {}", listener.local_addr()?);
        Ok(listener)
    }

    /// Bind and serve until stopped
    pub async fn start(&self) -> Result<()> {
        let listener = self.bind().await?;
        self.serve(listener).await
    }

    /// Serve connections from an already bound listener until stopped
    pub async fn serve(&self, listener: TcpListener) -> Result<()> {
        let mut shutdown_rx = self.shutdown.subscribe();

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((socket, addr)) => {
                            let peer_addr = addr.to_string();
                            let handler = Arc::clone(&self.handler);
                            let shutdown_rx = self.shutdown.subscribe();

                            tokio::spawn(async move {
                                if let Err(e) = handle_connection(socket, peer_addr.clone(), handler, shutdown_rx).await {
                                    tracing::warn!("Connection error from {}: {}", peer_addr, e);
                                }
                            });
                        }
                        Err(e) => {
                            tracing::error!("Accept error: {}", e);
                        }
                    }
                }
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        break;
                    }
                }
            }
        }

        tracing::info!("Network server stopped");
        Ok(())
    }

    /// Stop the server
    pub fn stop(&self) {
        let _ = self.shutdown.send(true);
    }
}

/// Handle a single connection, one request at a time
async fn handle_connection(
    socket: TcpStream,
    peer_addr: String,
    handler: Arc<dyn MessageHandler>,
    mut shutdown_rx: watch::Receiver<bool>,
) -> Result<()> {
    let (mut reader, mut writer) = socket.into_split();

    loop {
        let message = tokio::select! {
            result = read_message(&mut reader) => result,
            _ = shutdown_rx.changed() => break,
        };

        match message {
            Ok(message) => {
                tracing::trace!("Received {} from {}", message.type_name(), peer_addr);

                // A client that hangs up cancels the request; local writes run on
                // their own tasks and still complete
                let response = tokio::select! {
                    response = handler.handle(&peer_addr, message) => response,
                    _ = wait_for_close(&mut reader) => {
                        tracing::debug!("Peer {} disconnected, abandoning request", peer_addr);
                        break;
                    }
                };
                write_message(&mut writer, &response).await?;
            }
            Err(Error::Io(ref e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                // Connection closed
                break;
            }
            Err(e) => {
                tracing::warn!("Error reading message from {}: {}", peer_addr, e);
                break;
            }
        }
    }

    Ok(())
}

/// Resolve once the peer closes its side of the connection
async fn wait_for_close(reader: &mut OwnedReadHalf) {
    let mut probe = [0u8; 1];
    match reader.peek(&mut probe).await {
        Ok(0) | Err(_) => {}
        // Pipelined data is not a hang-up
        Ok(_) => std::future::pending::<()>().await,
    }
}
