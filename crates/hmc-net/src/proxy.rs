//! ---
//! hmc_section: "03-network-bridge"
//! hmc_subsection: "module"
//! hmc_type: "source"
//! hmc_scope: "code"
//! hmc_description: "Client-side proxy tunneling bus traffic over a socket."
//! hmc_version: "v0.1.0-alpha"
//! hmc_owner: "tbd"
//! ---
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use hmc_msg::codec::{encode_frame, encode_subscriptions, FrameDecoder};
use hmc_msg::{Message, MessageHandler, SubscriptionMap};

use crate::{NetError, Result};

/// Gives an out-of-process component the same publish/subscribe experience
/// as an in-process handler, tunneled over the connection server protocol.
///
/// A send-only client passes an empty subscription map and no handler. A
/// subscribing client supplies both; matching messages are then delivered to
/// the local handler from a background receive task, concurrently with any
/// sends.
pub struct MessageBusProxy {
    writer: Mutex<OwnedWriteHalf>,
    receive_task: Option<JoinHandle<()>>,
}

impl MessageBusProxy {
    /// Connect to the backend and perform the handshake.
    pub async fn connect(
        addr: SocketAddr,
        client_name: &str,
        subscriptions: &SubscriptionMap,
        handler: Option<Arc<dyn MessageHandler>>,
    ) -> Result<Self> {
        if client_name.contains(['\r', '\n']) {
            return Err(NetError::Protocol(
                "client name must not contain line breaks".to_owned(),
            ));
        }

        let stream = TcpStream::connect(addr).await?;
        let (read_half, mut write_half) = stream.into_split();

        write_half
            .write_all(format!("{client_name}\n").as_bytes())
            .await?;
        write_half
            .write_all(encode_subscriptions(subscriptions)?.as_bytes())
            .await?;
        debug!(%addr, client = %client_name, "connected to message bus");

        let receive_task = match handler {
            Some(handler) if !subscriptions.is_empty() => {
                Some(tokio::spawn(receive_loop(BufReader::new(read_half), handler)))
            }
            _ => None,
        };

        Ok(Self {
            writer: Mutex::new(write_half),
            receive_task,
        })
    }

    /// Publish one message to the remote bus.
    pub async fn send(&self, message: &Message) -> Result<()> {
        let frame = encode_frame(message)?;
        let mut writer = self.writer.lock().await;
        writer.write_all(frame.as_bytes()).await?;
        Ok(())
    }

    /// Orderly shutdown of both socket directions.
    pub async fn disconnect(self) -> Result<()> {
        let mut writer = self.writer.into_inner();
        writer.shutdown().await?;
        if let Some(task) = self.receive_task {
            task.abort();
        }
        Ok(())
    }
}

/// Mirror of the server-side frame loop: reassemble frames, hand each
/// decoded message to the local handler.
async fn receive_loop(mut reader: BufReader<OwnedReadHalf>, handler: Arc<dyn MessageHandler>) {
    let mut decoder = FrameDecoder::new();
    let mut line = String::new();
    loop {
        line.clear();
        match reader.read_line(&mut line).await {
            Ok(0) => {
                debug!(handler = handler.name(), "backend closed the connection");
                break;
            }
            Ok(_) => match decoder.push_line(&line) {
                Ok(Some(message)) => {
                    if let Err(error) = handler.handle(&message) {
                        warn!(handler = handler.name(), %error, "proxy handler failed");
                    }
                }
                Ok(None) => {}
                Err(error) => {
                    warn!(%error, "malformed frame from backend; stopping receive loop");
                    break;
                }
            },
            Err(error) => {
                warn!(%error, "proxy read failed");
                break;
            }
        }
    }
}
