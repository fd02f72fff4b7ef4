//! ---
//! hmc_section: "03-network-bridge"
//! hmc_subsection: "module"
//! hmc_type: "source"
//! hmc_scope: "code"
//! hmc_description: "Listening socket accepting remote bus participants."
//! hmc_version: "v0.1.0-alpha"
//! hmc_owner: "tbd"
//! ---
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::{debug, info, warn};

use hmc_msg::MessageBus;

use crate::connection::ClientConnection;
use crate::{NetError, Result};

/// Accepts inbound socket connections and hands each one to its own
/// [`ClientConnection`] task bound to the shared bus.
///
/// Connection handling never blocks the accept loop, so a stalled or
/// misbehaving peer cannot starve new clients.
pub struct ConnectionServer {
    listener: TcpListener,
    bus: Arc<MessageBus>,
}

impl ConnectionServer {
    /// Bind the listening socket.
    ///
    /// Binding is the one precondition everything else depends on; failure
    /// is returned as [`NetError::Bind`] and must abort backend startup.
    pub async fn bind(addr: SocketAddr, bus: Arc<MessageBus>) -> Result<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| NetError::Bind { addr, source })?;
        info!(%addr, "connection server listening");
        Ok(Self { listener, bus })
    }

    /// Address the server actually bound (resolves port 0 in tests).
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Run the accept loop forever. Accept errors are logged and the loop
    /// keeps going; per-connection failures stay inside their own task.
    pub async fn serve(self) {
        loop {
            match self.listener.accept().await {
                Ok((stream, peer)) => {
                    debug!(%peer, "incoming connection accepted");
                    ClientConnection::new(stream, peer, Arc::clone(&self.bus)).spawn();
                }
                Err(error) => {
                    warn!(%error, "accept failed");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn binding_an_occupied_port_is_a_bind_error() {
        let bus = Arc::new(MessageBus::new());
        let first = ConnectionServer::bind("127.0.0.1:0".parse().unwrap(), Arc::clone(&bus))
            .await
            .expect("first bind succeeds");
        let addr = first.local_addr().expect("local addr");

        let second = ConnectionServer::bind(addr, bus).await;
        match second {
            Err(NetError::Bind { addr: failed, .. }) => assert_eq!(failed, addr),
            Err(other) => panic!("expected bind error, got {other}"),
            Ok(_) => panic!("second bind unexpectedly succeeded"),
        }
    }
}
