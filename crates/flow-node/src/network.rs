//! P2P service: accepts connections, speaks the wire protocol, and
//! bridges messages to the flow handler.

use flow_handler::{DataOrigin, FlowCommand, FlowHandle};
use flow_network::{serviced_message, Message, MessageCodec, NetworkError, PingTracker};
use flow_types::{BrokerInfo, Hash, NetworkId};
use futures::{SinkExt, StreamExt};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio_util::codec::Framed;
use tracing::{debug, info, warn};

/// P2P service configuration.
#[derive(Clone)]
pub struct NetworkService {
    node_id: Hash,
    network_id: NetworkId,
    broker: BrokerInfo,
    groups: u32,
    ping_frequency: Duration,
    handle: FlowHandle,
}

impl NetworkService {
    /// Create the service.
    pub fn new(
        node_id: Hash,
        network_id: NetworkId,
        broker: BrokerInfo,
        groups: u32,
        ping_frequency: Duration,
        handle: FlowHandle,
    ) -> Self {
        NetworkService {
            node_id,
            network_id,
            broker,
            groups,
            ping_frequency,
            handle,
        }
    }

    /// Accept inbound connections forever.
    pub async fn listen(self, bind_address: String) -> std::io::Result<()> {
        let listener = TcpListener::bind(&bind_address).await?;
        info!(%bind_address, "P2P listener started");
        loop {
            let (stream, peer_addr) = listener.accept().await?;
            debug!(%peer_addr, "Inbound connection");
            let service = self.clone();
            tokio::spawn(async move {
                if let Err(e) = service.serve_connection(stream, false).await {
                    debug!(%peer_addr, error = %e, "Connection closed");
                }
            });
        }
    }

    /// Dial a known peer and serve the connection.
    pub async fn connect(self, address: String) {
        match TcpStream::connect(&address).await {
            Ok(stream) => {
                info!(%address, "Connected to peer");
                if let Err(e) = self.serve_connection(stream, true).await {
                    debug!(%address, error = %e, "Connection closed");
                }
            }
            Err(e) => warn!(%address, error = %e, "Connect failed"),
        }
    }

    /// Drive one connection: handshake, then message dispatch with
    /// periodic pings. Any protocol error closes the connection.
    async fn serve_connection(
        &self,
        stream: TcpStream,
        initiator: bool,
    ) -> Result<(), NetworkError> {
        let mut framed = Framed::new(stream, MessageCodec::new(self.network_id));

        // Handshake: the initiator opens with Hello, the acceptor
        // answers with HelloAck. Anything else closes the connection.
        if initiator {
            framed
                .send(Message::Hello {
                    node_id: self.node_id,
                })
                .await?;
            match framed.next().await {
                Some(Ok(Message::HelloAck { node_id })) => {
                    debug!(peer = %node_id, "Handshake complete");
                }
                Some(Ok(other)) => {
                    return Err(NetworkError::InvalidMessage(format!(
                        "Expected HelloAck, got type {}",
                        other.type_id()
                    )));
                }
                Some(Err(e)) => return Err(e),
                None => return Err(NetworkError::Io("Closed during handshake".into())),
            }
        } else {
            match framed.next().await {
                Some(Ok(Message::Hello { node_id })) => {
                    debug!(peer = %node_id, "Handshake received");
                }
                Some(Ok(other)) => {
                    return Err(NetworkError::InvalidMessage(format!(
                        "Expected Hello, got type {}",
                        other.type_id()
                    )));
                }
                Some(Err(e)) => return Err(e),
                None => return Err(NetworkError::Io("Closed during handshake".into())),
            }
            framed
                .send(Message::HelloAck {
                    node_id: self.node_id,
                })
                .await?;
        }

        let mut pings = PingTracker::new(self.ping_frequency);
        let mut tick = tokio::time::interval(self.ping_frequency / 4);

        loop {
            tokio::select! {
                _ = tick.tick() => {
                    let now = Instant::now();
                    if pings.is_expired(now) {
                        return Err(NetworkError::PingTimeout);
                    }
                    if let Some(ping) = pings.next_ping(now, unix_now_ms() as i64) {
                        framed.send(ping).await?;
                    }
                }
                incoming = framed.next() => {
                    let message = match incoming {
                        Some(Ok(message)) => message,
                        Some(Err(e)) => return Err(e),
                        None => return Ok(()),
                    };
                    if !serviced_message(&message, &self.broker, self.groups) {
                        warn!("Dropping message for unserviced chain");
                        continue;
                    }
                    if let Some(reply) = self.dispatch(message, &mut pings).await? {
                        framed.send(reply).await?;
                    }
                }
            }
        }
    }

    /// Turn one peer message into handler traffic and an optional reply.
    async fn dispatch(
        &self,
        message: Message,
        pings: &mut PingTracker,
    ) -> Result<Option<Message>, NetworkError> {
        match message {
            Message::Hello { .. } | Message::HelloAck { .. } => {
                Err(NetworkError::InvalidMessage("Duplicate handshake".into()))
            }
            Message::Ping { nonce, .. } => Ok(Some(Message::Pong { nonce })),
            Message::Pong { nonce } => {
                pings.on_pong(nonce, Instant::now())?;
                Ok(None)
            }
            Message::SendBlocks(blocks) => {
                for block in blocks {
                    self.handle
                        .send(FlowCommand::AddBlock {
                            block,
                            origin: DataOrigin::Remote,
                        })
                        .await;
                }
                Ok(None)
            }
            Message::SendHeaders(headers) => {
                for header in headers {
                    self.handle
                        .send(FlowCommand::AddHeader {
                            header,
                            origin: DataOrigin::Remote,
                        })
                        .await;
                }
                Ok(None)
            }
            Message::GetBlocks { locators } => {
                let (reply_tx, reply_rx) = oneshot::channel();
                self.handle
                    .send(FlowCommand::GetBlocks {
                        locators,
                        reply: reply_tx,
                    })
                    .await;
                let blocks = reply_rx.await.unwrap_or_default();
                Ok(Some(Message::SendBlocks(blocks)))
            }
            Message::GetHeaders { locators } => {
                let (reply_tx, reply_rx) = oneshot::channel();
                self.handle
                    .send(FlowCommand::GetHeaders {
                        locators,
                        reply: reply_tx,
                    })
                    .await;
                let headers = reply_rx.await.unwrap_or_default();
                Ok(Some(Message::SendHeaders(headers)))
            }
        }
    }
}

fn unix_now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}
