//! TCP line server with broadcast fan-out.
//!
//! # Architecture
//!
//! ```text
//! Client A ┐                       ┌─ reader task A ─┐
//! Client B ├──> accept loop ──────>├─ reader task B ─┼──> LineHandler::on_message(line, client)
//! Client C ┘        │              └─ reader task C ─┘
//!                   │
//!                   └─> Broadcaster { id -> FramedWrite }  <── send_line_to_all(line)
//! ```
//!
//! Every connection gets its own reader task, so a slow command on one
//! connection never stalls another. Lines from one connection are handled in
//! order. Writes are best-effort and run concurrently: a client whose write
//! fails or times out is dropped without holding up the others.
//!
//! # Design Principles
//!
//! - **No authentication, no TLS**: the terminal sits on a plant network
//! - **Broadcast only**: replies go to every client, there is no addressing
//! - **Bounded**: a maximum line length and a connection limit

use std::collections::HashMap;
use std::future::Future;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use andino_core::constants::{
    DEFAULT_BIND_ADDRESS, DEFAULT_MAX_CONNECTIONS, DEFAULT_TCP_PORT, DEFAULT_WRITE_TIMEOUT_MS,
    MAX_LINE_LENGTH,
};
use andino_core::{TcpConfig, TextEncoding};
use andino_protocol::LineCodec;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use futures::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::codec::{FramedRead, FramedWrite};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

/// How long `stop` waits for connections to finish their current line.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Back-off after a failed `accept`, e.g. out of file descriptors.
const ACCEPT_ERROR_DELAY: Duration = Duration::from_millis(50);

/// Configuration for [`LineServer`].
///
/// # Example
///
/// ```
/// use andino_network::LineServerConfig;
///
/// let config = LineServerConfig {
///     bind_addr: "127.0.0.1:9999".parse().unwrap(),
///     ..LineServerConfig::default()
/// };
/// assert_eq!(config.max_connections, 32);
/// ```
#[derive(Debug, Clone)]
pub struct LineServerConfig {
    pub bind_addr: SocketAddr,
    pub max_connections: usize,
    pub encoding: TextEncoding,
    pub max_line_length: usize,
    /// Per-client limit for one write.
    pub write_timeout: Duration,
}

impl Default for LineServerConfig {
    fn default() -> Self {
        let ip = DEFAULT_BIND_ADDRESS
            .parse::<IpAddr>()
            .unwrap_or(IpAddr::from([0, 0, 0, 0]));
        Self {
            bind_addr: SocketAddr::new(ip, DEFAULT_TCP_PORT),
            max_connections: DEFAULT_MAX_CONNECTIONS,
            encoding: TextEncoding::Utf8,
            max_line_length: MAX_LINE_LENGTH,
            write_timeout: Duration::from_millis(DEFAULT_WRITE_TIMEOUT_MS),
        }
    }
}

impl LineServerConfig {
    /// Build from the `[tcp]` configuration section.
    pub fn from_tcp(tcp: &TcpConfig) -> Result<Self, LineServerError> {
        let ip = tcp
            .bind_address
            .parse::<IpAddr>()
            .map_err(|_| LineServerError::InvalidAddress(tcp.bind_address.clone()))?;
        Ok(Self {
            bind_addr: SocketAddr::new(ip, tcp.port),
            max_connections: tcp.max_connections,
            encoding: tcp.encoding,
            max_line_length: MAX_LINE_LENGTH,
            write_timeout: Duration::from_millis(tcp.write_timeout_ms),
        })
    }

    fn codec(&self) -> LineCodec {
        LineCodec::with_encoding(self.encoding).max_length(self.max_line_length)
    }
}

/// Errors that can occur during line server operations.
#[derive(Debug, Error)]
pub enum LineServerError {
    #[error("Invalid bind address {0:?}")]
    InvalidAddress(String),

    #[error("Failed to bind to {addr}: {source}")]
    BindFailed {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("Server is already running")]
    AlreadyRunning,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// The connection a line came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientHandle {
    id: u64,
    addr: SocketAddr,
    connected_at: DateTime<Utc>,
}

impl ClientHandle {
    pub fn new(id: u64, addr: SocketAddr) -> Self {
        Self {
            id,
            addr,
            connected_at: Utc::now(),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn connected_at(&self) -> DateTime<Utc> {
        self.connected_at
    }
}

impl std::fmt::Display for ClientHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{} {}", self.id, self.addr)
    }
}

/// Connection information snapshot.
#[derive(Debug, Clone)]
pub struct ConnectionInfo {
    pub id: u64,
    pub remote_addr: SocketAddr,
    pub connected_at: DateTime<Utc>,
    pub uptime: chrono::Duration,
}

/// Receives every line read from any client.
///
/// Calls for one connection are sequential; calls for different
/// connections run concurrently.
pub trait LineHandler: Send + Sync + 'static {
    fn on_message(&self, line: String, client: ClientHandle) -> impl Future<Output = ()> + Send;
}

type PeerWriter = FramedWrite<OwnedWriteHalf, LineCodec>;

struct Peer {
    client: ClientHandle,
    /// Locked per line so concurrent broadcasts never interleave bytes.
    writer: Arc<Mutex<PeerWriter>>,
}

/// Cloneable handle that writes to every connected client.
#[derive(Clone)]
pub struct Broadcaster {
    peers: Arc<Mutex<HashMap<u64, Peer>>>,
    encoding: TextEncoding,
    write_timeout: Duration,
}

impl std::fmt::Debug for Broadcaster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Broadcaster")
            .field("encoding", &self.encoding)
            .field("write_timeout", &self.write_timeout)
            .finish_non_exhaustive()
    }
}

impl Broadcaster {
    fn new(encoding: TextEncoding, write_timeout: Duration) -> Self {
        Self {
            peers: Arc::new(Mutex::new(HashMap::new())),
            encoding,
            write_timeout,
        }
    }

    /// Write `line` plus newline to every client.
    ///
    /// Clients whose write fails or times out are disconnected. Returns the
    /// number of clients the line reached.
    pub async fn send_line_to_all(&self, line: &str) -> usize {
        if let Err(e) = self.encoding.encode(line) {
            warn!(error = %e, line, "Line cannot be encoded, not sent");
            return 0;
        }

        // The peer map is only held for the snapshot, never across a write.
        let targets: Vec<(ClientHandle, Arc<Mutex<PeerWriter>>)> = self
            .peers
            .lock()
            .await
            .values()
            .map(|peer| (peer.client.clone(), Arc::clone(&peer.writer)))
            .collect();

        let writes = targets.iter().map(|(client, writer)| async move {
            let write = async { writer.lock().await.send(line).await };
            match tokio::time::timeout(self.write_timeout, write).await {
                Ok(Ok(())) => None,
                Ok(Err(e)) => {
                    warn!(client = %client, error = %e, "Write failed, dropping client");
                    Some(client.id)
                }
                Err(_) => {
                    warn!(
                        client = %client,
                        timeout_ms = self.write_timeout.as_millis() as u64,
                        "Write timed out, dropping client"
                    );
                    Some(client.id)
                }
            }
        });
        let failed: Vec<u64> = join_all(writes).await.into_iter().flatten().collect();

        if !failed.is_empty() {
            let mut peers = self.peers.lock().await;
            for id in &failed {
                peers.remove(id);
            }
        }
        let reached = targets.len() - failed.len();
        trace!(line, clients = reached, "Broadcast");
        reached
    }

    pub async fn connection_count(&self) -> usize {
        self.peers.lock().await.len()
    }

    pub async fn connections(&self) -> Vec<ConnectionInfo> {
        let now = Utc::now();
        self.peers
            .lock()
            .await
            .values()
            .map(|peer| ConnectionInfo {
                id: peer.client.id,
                remote_addr: peer.client.addr,
                connected_at: peer.client.connected_at,
                uptime: now - peer.client.connected_at,
            })
            .collect()
    }

    async fn insert(&self, client: ClientHandle, writer: PeerWriter) {
        let writer = Arc::new(Mutex::new(writer));
        self.peers
            .lock()
            .await
            .insert(client.id, Peer { client, writer });
    }

    async fn remove(&self, id: u64) -> bool {
        self.peers.lock().await.remove(&id).is_some()
    }

    /// Flush and drop every client.
    async fn close_all(&self) {
        let peers: Vec<Peer> = self.peers.lock().await.drain().map(|(_, p)| p).collect();
        for peer in peers {
            let close = async { SinkExt::<&str>::close(&mut *peer.writer.lock().await).await };
            let _ = tokio::time::timeout(self.write_timeout, close).await;
            debug!(client = %peer.client, "Connection closed");
        }
    }
}

struct Running {
    local_addr: SocketAddr,
    shutdown: CancellationToken,
    accept: JoinHandle<()>,
}

/// TCP server for newline-delimited command lines.
///
/// `start` and `stop` take `&self`, so the server can be shared with the
/// component that decides when to stop it.
///
/// # Example
///
/// ```no_run
/// use andino_network::{ClientHandle, LineHandler, LineServer, LineServerConfig};
///
/// struct Log;
/// impl LineHandler for Log {
///     async fn on_message(&self, line: String, client: ClientHandle) {
///         println!("{client}: {line}");
///     }
/// }
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let server = LineServer::new(LineServerConfig::default());
/// let addr = server.start(Log).await?;
/// println!("listening on {addr}");
/// server.send_line_to_all("hello").await;
/// server.stop().await;
/// # Ok(())
/// # }
/// ```
pub struct LineServer {
    config: LineServerConfig,
    broadcaster: Broadcaster,
    next_id: Arc<AtomicU64>,
    running: Mutex<Option<Running>>,
}

impl std::fmt::Debug for LineServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LineServer")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl LineServer {
    pub fn new(config: LineServerConfig) -> Self {
        let broadcaster = Broadcaster::new(config.encoding, config.write_timeout);
        Self {
            config,
            broadcaster,
            next_id: Arc::new(AtomicU64::new(1)),
            running: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &LineServerConfig {
        &self.config
    }

    /// Handle for writing to all clients; valid before `start` and after `stop`.
    pub fn broadcaster(&self) -> Broadcaster {
        self.broadcaster.clone()
    }

    pub async fn send_line_to_all(&self, line: &str) -> usize {
        self.broadcaster.send_line_to_all(line).await
    }

    /// Bind and start accepting connections. Returns the bound address.
    ///
    /// # Errors
    ///
    /// - [`LineServerError::AlreadyRunning`] if started twice
    /// - [`LineServerError::BindFailed`] if the address is unavailable
    pub async fn start<H: LineHandler>(&self, handler: H) -> Result<SocketAddr, LineServerError> {
        let mut running = self.running.lock().await;
        if running.is_some() {
            return Err(LineServerError::AlreadyRunning);
        }

        let addr = self.config.bind_addr;
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| LineServerError::BindFailed { addr, source })?;
        let local_addr = listener.local_addr()?;
        info!(
            addr = %local_addr,
            max_connections = self.config.max_connections,
            encoding = %self.config.encoding,
            "Line server listening"
        );

        let shutdown = CancellationToken::new();
        let acceptor = Acceptor {
            listener,
            config: self.config.clone(),
            broadcaster: self.broadcaster.clone(),
            handler: Arc::new(handler),
            next_id: Arc::clone(&self.next_id),
            shutdown: shutdown.clone(),
        };
        let accept = tokio::spawn(acceptor.run());

        *running = Some(Running {
            local_addr,
            shutdown,
            accept,
        });
        Ok(local_addr)
    }

    /// Close the listener and every client. Idempotent.
    pub async fn stop(&self) {
        let Some(running) = self.running.lock().await.take() else {
            return;
        };
        running.shutdown.cancel();
        if let Err(e) = running.accept.await {
            error!(error = %e, "Accept loop failed");
        }
        self.broadcaster.close_all().await;
        info!(addr = %running.local_addr, "Line server stopped");
    }

    pub async fn is_running(&self) -> bool {
        self.running.lock().await.is_some()
    }

    pub async fn local_addr(&self) -> Option<SocketAddr> {
        self.running.lock().await.as_ref().map(|r| r.local_addr)
    }

    pub async fn connections(&self) -> Vec<ConnectionInfo> {
        self.broadcaster.connections().await
    }
}

struct Acceptor<H> {
    listener: TcpListener,
    config: LineServerConfig,
    broadcaster: Broadcaster,
    handler: Arc<H>,
    next_id: Arc<AtomicU64>,
    shutdown: CancellationToken,
}

impl<H: LineHandler> Acceptor<H> {
    async fn run(self) {
        let mut readers = JoinSet::new();

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, addr)) => self.admit(stream, addr, &mut readers).await,
                    Err(e) => {
                        warn!(error = %e, "Accept failed");
                        tokio::time::sleep(ACCEPT_ERROR_DELAY).await;
                    }
                },
                Some(joined) = readers.join_next(), if !readers.is_empty() => {
                    if let Err(e) = joined
                        && e.is_panic()
                    {
                        error!(error = %e, "Connection task panicked");
                    }
                }
            }
        }

        drop(self.listener);
        let drained = tokio::time::timeout(DRAIN_TIMEOUT, async {
            while readers.join_next().await.is_some() {}
        })
        .await;
        if drained.is_err() {
            warn!(remaining = readers.len(), "Connections did not finish in time, aborting");
            readers.shutdown().await;
        }
    }

    async fn admit(&self, stream: TcpStream, addr: SocketAddr, readers: &mut JoinSet<()>) {
        let current = self.broadcaster.connection_count().await;
        if current >= self.config.max_connections {
            warn!(
                addr = %addr,
                max_connections = self.config.max_connections,
                "Connection rejected: maximum connections reached"
            );
            drop(stream);
            return;
        }

        if let Err(e) = stream.set_nodelay(true) {
            warn!(addr = %addr, error = %e, "Failed to set TCP_NODELAY");
        }

        let client = ClientHandle::new(self.next_id.fetch_add(1, Ordering::Relaxed), addr);
        let (read_half, write_half) = stream.into_split();
        let reader = FramedRead::new(read_half, self.config.codec());
        let writer = FramedWrite::new(write_half, self.config.codec());
        self.broadcaster.insert(client.clone(), writer).await;
        info!(client = %client, total = current + 1, "Client connected");

        readers.spawn(serve_connection(
            reader,
            client,
            Arc::clone(&self.handler),
            self.broadcaster.clone(),
            self.shutdown.clone(),
        ));
    }
}

async fn serve_connection<H: LineHandler>(
    mut reader: FramedRead<OwnedReadHalf, LineCodec>,
    client: ClientHandle,
    handler: Arc<H>,
    broadcaster: Broadcaster,
    shutdown: CancellationToken,
) {
    loop {
        let next = tokio::select! {
            _ = shutdown.cancelled() => break,
            next = reader.next() => next,
        };
        match next {
            Some(Ok(line)) => {
                trace!(client = %client, line = %line, "Received line");
                handler.on_message(line, client.clone()).await;
            }
            Some(Err(e)) => {
                warn!(client = %client, error = %e, "Read failed, closing connection");
                break;
            }
            None => break,
        }
    }

    if broadcaster.remove(client.id).await {
        info!(client = %client, "Client disconnected");
    }
}
