//! Line transport for the Andino command protocol.
//!
//! # Components
//!
//! - **LineServer**: accepts any number of clients, hands every received line
//!   to a [`LineHandler`] and fans replies and events out to all clients
//!   through a [`Broadcaster`].
//! - **LineClient**: a single connection to a line server, used by tools and
//!   tests.
//!
//! # Example
//!
//! ```no_run
//! use andino_network::{ClientHandle, LineHandler, LineServer, LineServerConfig};
//!
//! struct Echo(andino_network::Broadcaster);
//!
//! impl LineHandler for Echo {
//!     async fn on_message(&self, line: String, _client: ClientHandle) {
//!         self.0.send_line_to_all(&line).await;
//!     }
//! }
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = LineServerConfig::default();
//! let server = LineServer::new(config);
//! let handler = Echo(server.broadcaster());
//! server.start(handler).await?;
//! # Ok(())
//! # }
//! ```

mod client;
mod server;

pub use client::{LineClient, LineClientConfig, LineClientError};
pub use server::{
    Broadcaster, ClientHandle, ConnectionInfo, LineHandler, LineServer, LineServerConfig,
    LineServerError,
};
