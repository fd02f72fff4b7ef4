//! ---
//! hmc_section: "03-network-bridge"
//! hmc_subsection: "module"
//! hmc_type: "source"
//! hmc_scope: "code"
//! hmc_description: "Per-socket worker bridging one remote peer onto the bus."
//! hmc_version: "v0.1.0-alpha"
//! hmc_owner: "tbd"
//! ---
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::anyhow;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use hmc_msg::codec::{decode_subscriptions, encode_frame, FrameDecoder};
use hmc_msg::{Message, MessageBus, MessageHandler};

use crate::{NetError, Result};

/// Abstraction of one connected remote peer.
///
/// The connection is a sink and a source at the same time: it registers on
/// the bus as a handler forwarding matching messages out to the socket, and
/// it publishes every frame the peer sends onto the same bus. Remote and
/// local publishers are indistinguishable to the other handlers.
pub struct ClientConnection {
    stream: TcpStream,
    peer: SocketAddr,
    bus: Arc<MessageBus>,
}

impl ClientConnection {
    /// Wrap an accepted socket.
    pub fn new(stream: TcpStream, peer: SocketAddr, bus: Arc<MessageBus>) -> Self {
        Self { stream, peer, bus }
    }

    /// Drive the connection on its own task. Errors are scoped to this
    /// connection: they are logged and the session is torn down, nothing
    /// else on the bus is affected.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            let peer = self.peer;
            if let Err(error) = self.run().await {
                warn!(%peer, %error, "client connection closed with error");
            } else {
                debug!(%peer, "client connection closed");
            }
        })
    }

    async fn run(self) -> Result<()> {
        let bus = self.bus;
        let peer = self.peer;
        let (read_half, write_half) = self.stream.into_split();
        let mut reader = BufReader::new(read_half);

        // Handshake: name line, then the kind-to-priority subscription map.
        let client_name = read_handshake_line(&mut reader, "client name").await?;
        let subscription_line = read_handshake_line(&mut reader, "subscription map").await?;
        let subscriptions = decode_subscriptions(&subscription_line)?;

        let (tx, rx) = mpsc::unbounded_channel();
        let writer_task = tokio::spawn(write_loop(write_half, rx, client_name.clone()));

        // Register only when the peer actually wants deliveries; a client
        // with an empty map is send-only.
        let handler: Option<Arc<dyn MessageHandler>> = if subscriptions.is_empty() {
            None
        } else {
            let handler: Arc<dyn MessageHandler> = Arc::new(OutboundHandler {
                name: client_name.clone(),
                tx,
            });
            bus.register(Arc::clone(&handler), &subscriptions);
            Some(handler)
        };

        info!(%peer, client = %client_name, subscriptions = subscriptions.len(), "client active");
        let result = read_loop(&mut reader, &bus).await;

        if let Some(handler) = handler {
            bus.unregister(&handler);
        }
        writer_task.abort();
        result
    }
}

/// Bus-side face of a connection: forwards deliveries to the writer task.
///
/// The handler only enqueues; socket I/O never happens under the bus lock.
struct OutboundHandler {
    name: String,
    tx: mpsc::UnboundedSender<Message>,
}

impl MessageHandler for OutboundHandler {
    fn name(&self) -> &str {
        &self.name
    }

    fn handle(&self, message: &Message) -> anyhow::Result<()> {
        self.tx
            .send(message.clone())
            .map_err(|_| anyhow!("outbound channel closed"))
    }
}

async fn read_handshake_line(
    reader: &mut BufReader<OwnedReadHalf>,
    what: &str,
) -> Result<String> {
    let mut line = String::new();
    if reader.read_line(&mut line).await? == 0 {
        return Err(NetError::Protocol(format!(
            "peer closed the socket before sending the {what}"
        )));
    }
    Ok(line.trim_end_matches(['\r', '\n']).to_owned())
}

async fn read_loop(reader: &mut BufReader<OwnedReadHalf>, bus: &Arc<MessageBus>) -> Result<()> {
    let mut decoder = FrameDecoder::new();
    let mut line = String::new();
    loop {
        line.clear();
        if reader.read_line(&mut line).await? == 0 {
            // Peer closed the socket.
            return Ok(());
        }
        if let Some(message) = decoder.push_line(&line)? {
            bus.notify(&message);
        }
    }
}

async fn write_loop(
    mut writer: OwnedWriteHalf,
    mut rx: mpsc::UnboundedReceiver<Message>,
    client_name: String,
) {
    while let Some(message) = rx.recv().await {
        let frame = match encode_frame(&message) {
            Ok(frame) => frame,
            Err(error) => {
                warn!(client = %client_name, %error, "failed to encode outbound frame");
                continue;
            }
        };
        if let Err(error) = writer.write_all(frame.as_bytes()).await {
            warn!(client = %client_name, %error, "outbound write failed");
            break;
        }
    }
}
