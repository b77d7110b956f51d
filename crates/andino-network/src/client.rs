//! Line client for talking to an Andino terminal.
//!
//! Used by integration tests and by tooling that scripts a terminal. Every
//! I/O operation is bounded by the configured timeout.
//!
//! ```no_run
//! use andino_network::{LineClient, LineClientConfig};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut client = LineClient::new(LineClientConfig {
//!     server_addr: "192.168.0.50:9999".parse()?,
//!     ..LineClientConfig::default()
//! });
//! client.connect().await?;
//! client.send_line("INFO").await?;
//! let reply = client.recv_line().await?;
//! println!("{reply}");
//! client.close().await;
//! # Ok(())
//! # }
//! ```

use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

use andino_core::TextEncoding;
use andino_core::constants::DEFAULT_TCP_PORT;
use andino_protocol::{LineCodec, ProtocolError};
use futures::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio_util::codec::Framed;
use tracing::{debug, info, trace, warn};

const CLOSE_TIMEOUT: Duration = Duration::from_millis(500);

#[derive(Debug, Clone)]
pub struct LineClientConfig {
    pub server_addr: SocketAddr,
    /// Timeout for connect, send and receive.
    pub timeout: Duration,
    pub encoding: TextEncoding,
}

impl Default for LineClientConfig {
    fn default() -> Self {
        Self {
            server_addr: SocketAddr::from((Ipv4Addr::LOCALHOST, DEFAULT_TCP_PORT)),
            timeout: Duration::from_millis(3000),
            encoding: TextEncoding::Utf8,
        }
    }
}

#[derive(Debug, Error)]
pub enum LineClientError {
    #[error("Not connected to server")]
    NotConnected,

    #[error("Connection timeout after {0}ms")]
    ConnectionTimeout(u64),

    #[error("Read timeout after {0}ms")]
    ReadTimeout(u64),

    #[error("Write timeout after {0}ms")]
    WriteTimeout(u64),

    #[error("Connection lost: {0}")]
    ConnectionLost(String),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Single-connection line client.
pub struct LineClient {
    config: LineClientConfig,
    framed: Option<Framed<TcpStream, LineCodec>>,
}

impl LineClient {
    pub fn new(config: LineClientConfig) -> Self {
        Self {
            config,
            framed: None,
        }
    }

    fn timeout_ms(&self) -> u64 {
        self.config.timeout.as_millis() as u64
    }

    pub async fn connect(&mut self) -> Result<(), LineClientError> {
        let addr = self.config.server_addr;
        let stream = tokio::time::timeout(self.config.timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| LineClientError::ConnectionTimeout(self.timeout_ms()))??;

        if let Err(e) = stream.set_nodelay(true) {
            warn!(addr = %addr, error = %e, "Failed to set TCP_NODELAY");
        }
        info!(addr = %addr, "Connected");
        self.framed = Some(Framed::new(
            stream,
            LineCodec::with_encoding(self.config.encoding),
        ));
        Ok(())
    }

    /// Send one line; the newline is appended.
    pub async fn send_line(&mut self, line: &str) -> Result<(), LineClientError> {
        let timeout = self.config.timeout;
        let timeout_ms = self.timeout_ms();
        let framed = self.framed.as_mut().ok_or(LineClientError::NotConnected)?;
        trace!(line, "Sending line");
        tokio::time::timeout(timeout, framed.send(line))
            .await
            .map_err(|_| LineClientError::WriteTimeout(timeout_ms))??;
        Ok(())
    }

    /// Wait for the next line from the server.
    pub async fn recv_line(&mut self) -> Result<String, LineClientError> {
        let timeout = self.config.timeout;
        let timeout_ms = self.timeout_ms();
        let framed = self.framed.as_mut().ok_or(LineClientError::NotConnected)?;
        match tokio::time::timeout(timeout, framed.next()).await {
            Ok(Some(Ok(line))) => {
                trace!(line = %line, "Received line");
                Ok(line)
            }
            Ok(Some(Err(e))) => Err(e.into()),
            Ok(None) => {
                self.framed = None;
                Err(LineClientError::ConnectionLost(
                    "Server closed connection".to_string(),
                ))
            }
            Err(_) => Err(LineClientError::ReadTimeout(timeout_ms)),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.framed.is_some()
    }

    /// Flush and shut down the connection. Idempotent.
    pub async fn close(&mut self) {
        let Some(mut framed) = self.framed.take() else {
            return;
        };
        if let Ok(Err(e)) = tokio::time::timeout(CLOSE_TIMEOUT, SinkExt::<&str>::flush(&mut framed)).await {
            warn!(error = %e, "Flush failed during close");
        }
        let mut stream = framed.into_inner();
        if let Ok(Err(e)) = tokio::time::timeout(CLOSE_TIMEOUT, stream.shutdown()).await {
            debug!(error = %e, "Shutdown failed during close");
        }
        info!(addr = %self.config.server_addr, "Connection closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncBufReadExt, BufReader};
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_send_without_connect() {
        let mut client = LineClient::new(LineClientConfig::default());
        assert!(matches!(
            client.send_line("INFO").await,
            Err(LineClientError::NotConnected)
        ));
        assert!(matches!(
            client.recv_line().await,
            Err(LineClientError::NotConnected)
        ));
    }

    #[tokio::test]
    async fn test_round_trip_with_raw_socket() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let peer = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let (read, mut write) = stream.into_split();
            let mut lines = BufReader::new(read).lines();
            let line = lines.next_line().await.unwrap().unwrap();
            write
                .write_all(format!("echo {line}\r\n").as_bytes())
                .await
                .unwrap();
        });

        let mut client = LineClient::new(LineClientConfig {
            server_addr: addr,
            ..LineClientConfig::default()
        });
        client.connect().await.unwrap();
        client.send_line("REL? 1").await.unwrap();
        assert_eq!(client.recv_line().await.unwrap(), "echo REL? 1");
        peer.await.unwrap();

        assert!(matches!(
            client.recv_line().await,
            Err(LineClientError::ConnectionLost(_))
        ));
        assert!(!client.is_connected());
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let mut client = LineClient::new(LineClientConfig::default());
        client.close().await;
        client.close().await;
        assert!(!client.is_connected());
    }
}
