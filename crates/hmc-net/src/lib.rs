//! ---
//! hmc_section: "03-network-bridge"
//! hmc_subsection: "module"
//! hmc_type: "source"
//! hmc_scope: "code"
//! hmc_description: "Socket bridge joining remote processes to the bus."
//! hmc_version: "v0.1.0-alpha"
//! hmc_owner: "tbd"
//! ---
#![warn(missing_docs)]

pub mod connection;
pub mod proxy;
pub mod server;

use std::net::SocketAddr;

/// Shared result type for bridge operations.
pub type Result<T> = std::result::Result<T, NetError>;

/// Errors produced by the socket bridge.
#[derive(Debug, thiserror::Error)]
pub enum NetError {
    /// The listening socket could not be bound. Fatal to the backend: the
    /// daemon must abort startup rather than run without its bridge.
    #[error("failed to bind connection server on {addr}: {source}")]
    Bind {
        /// Address the server attempted to bind.
        addr: SocketAddr,
        /// Underlying socket error.
        source: std::io::Error,
    },
    /// I/O failure on an individual connection.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// A peer violated the handshake or frame protocol.
    #[error("protocol violation: {0}")]
    Protocol(String),
    /// A frame or handshake line failed to decode.
    #[error(transparent)]
    Codec(#[from] hmc_msg::MessagingError),
}

pub use connection::ClientConnection;
pub use proxy::MessageBusProxy;
pub use server::ConnectionServer;
