//! UDP channels.
//!
//! One socket serves every message kind. Sends are fire-and-forget tasks on
//! the I/O runtime; the receive loop parses, filters reserved senders, and
//! hands successfully parsed messages to the installed handler. A socket
//! error pauses receiving for five seconds instead of killing the loop.

use crate::reserved::{map_endpoint_to_v6, reserved_address};
use chr_consensus::Vote;
use chr_ledger::Block;
use chr_messages::{
    ConfirmAck, ConfirmReq, Keepalive, Message, MessageHeader, NodeIdHandshake, ParseStatus,
    Parser, Publish,
};
use chr_types::{KeyPair, NetworkId};
use chr_utils::{DetailType, Direction, StatType, Stats};
use std::net::{Ipv6Addr, SocketAddr, SocketAddrV6};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::Notify;

use crate::NetworkError;

/// Installed by the node; receives every well-formed message with its
/// header (the dispatch path needs the sender's `version_using`).
pub type MessageHandler = Box<dyn Fn(Message, MessageHeader, SocketAddrV6) + Send + Sync>;

/// Largest datagram we accept; anything bigger than the wire format's
/// maximum frame is hostile.
const RECEIVE_BUFFER_SIZE: usize = 4096;

pub struct UdpNetwork {
    socket: Arc<UdpSocket>,
    network: NetworkId,
    parser: Parser,
    stats: Arc<Stats>,
    /// This node's identity keypair, used to answer handshake challenges.
    pub node_id: Arc<KeyPair>,
    handle: tokio::runtime::Handle,
    shutdown: Notify,
    on: AtomicBool,
    local: SocketAddrV6,
}

impl UdpNetwork {
    /// Bind the peering socket. Must run on the I/O runtime, whose handle
    /// is captured for later fire-and-forget sends from worker threads.
    pub async fn bind(
        port: u16,
        network: NetworkId,
        work_threshold: u64,
        stats: Arc<Stats>,
        node_id: Arc<KeyPair>,
    ) -> Result<Arc<Self>, NetworkError> {
        let socket = UdpSocket::bind((Ipv6Addr::UNSPECIFIED, port))
            .await
            .map_err(NetworkError::Bind)?;
        let local = match socket.local_addr().map_err(NetworkError::Io)? {
            SocketAddr::V6(v6) => v6,
            SocketAddr::V4(v4) => SocketAddrV6::new(v4.ip().to_ipv6_mapped(), v4.port(), 0, 0),
        };
        Ok(Arc::new(Self {
            socket: Arc::new(socket),
            network,
            parser: Parser::new(network, work_threshold),
            stats,
            node_id,
            handle: tokio::runtime::Handle::current(),
            shutdown: Notify::new(),
            on: AtomicBool::new(true),
            local,
        }))
    }

    pub fn local_endpoint(&self) -> SocketAddrV6 {
        self.local
    }

    /// Spawn the receive loop with the node's message handler.
    pub fn start(self: &Arc<Self>, handler: MessageHandler) {
        let this = self.clone();
        self.handle.spawn(async move {
            this.receive_loop(handler).await;
        });
    }

    pub fn stop(&self) {
        self.on.store(false, Ordering::SeqCst);
        self.shutdown.notify_waiters();
    }

    async fn receive_loop(self: Arc<Self>, handler: MessageHandler) {
        let mut buffer = [0u8; RECEIVE_BUFFER_SIZE];
        while self.on.load(Ordering::SeqCst) {
            let received = tokio::select! {
                _ = self.shutdown.notified() => break,
                received = self.socket.recv_from(&mut buffer) => received,
            };
            match received {
                Ok((size, sender)) => {
                    let sender = map_endpoint_to_v6(&sender);
                    self.receive_action(&buffer[..size], sender, &handler);
                }
                Err(error) => {
                    tracing::warn!(%error, "UDP receive error");
                    tokio::select! {
                        _ = self.shutdown.notified() => break,
                        _ = tokio::time::sleep(Duration::from_secs(5)) => {}
                    }
                }
            }
        }
        tracing::debug!("UDP receive loop stopped");
    }

    fn receive_action(&self, bytes: &[u8], sender: SocketAddrV6, handler: &MessageHandler) {
        if reserved_address(&sender, self.network, false) || sender == self.local {
            tracing::debug!(%sender, "dropping datagram from reserved sender");
            self.stats
                .inc_detail_only(StatType::Error, DetailType::BadSender);
            return;
        }
        match self.parser.parse(bytes) {
            Ok((message, header)) => {
                self.stats.add(
                    StatType::Traffic,
                    DetailType::All,
                    Direction::In,
                    bytes.len() as u64,
                );
                handler(message, header, sender);
            }
            Err(status) => {
                self.stats.inc_type(StatType::Error);
                match status {
                    ParseStatus::InsufficientWork => {
                        tracing::debug!(%sender, "insufficient work in message");
                        self.stats
                            .inc_detail_only(StatType::Error, DetailType::InsufficientWork);
                    }
                    other => {
                        tracing::debug!(%sender, status = ?other, "datagram failed to parse");
                    }
                }
            }
        }
    }

    // ── Senders ─────────────────────────────────────────────────────────

    /// Queue a datagram. Errors are logged and swallowed; UDP gives no
    /// delivery promise anyway.
    pub fn send_buffer(&self, bytes: Vec<u8>, endpoint: SocketAddrV6) {
        let socket = self.socket.clone();
        let stats = self.stats.clone();
        self.handle.spawn(async move {
            match socket.send_to(&bytes, SocketAddr::V6(endpoint)).await {
                Ok(size) => {
                    stats.add(StatType::Traffic, DetailType::All, Direction::Out, size as u64);
                }
                Err(error) => {
                    tracing::debug!(%endpoint, %error, "UDP send failed");
                }
            }
        });
    }

    pub fn send_message(&self, message: &Message, endpoint: SocketAddrV6) {
        self.send_buffer(message.to_bytes(self.network), endpoint);
    }

    pub fn send_keepalive(&self, endpoint: SocketAddrV6, peers: [SocketAddrV6; 8]) {
        tracing::trace!(%endpoint, "sending keepalive");
        self.stats
            .inc(StatType::Message, DetailType::Keepalive, Direction::Out);
        self.send_message(&Message::Keepalive(Keepalive { peers }), endpoint);
    }

    /// Send a handshake carrying our challenge and/or the signed answer to
    /// the peer's challenge.
    pub fn send_node_id_handshake(
        &self,
        endpoint: SocketAddrV6,
        query: Option<[u8; 32]>,
        respond_to: Option<[u8; 32]>,
    ) {
        let response = respond_to.map(|cookie| {
            (
                self.node_id.public,
                chr_crypto::sign_message(&cookie, &self.node_id.private),
            )
        });
        tracing::trace!(%endpoint, query = query.is_some(), response = response.is_some(),
            "sending node_id_handshake");
        self.stats
            .inc(StatType::Message, DetailType::NodeIdHandshake, Direction::Out);
        self.send_message(
            &Message::NodeIdHandshake(NodeIdHandshake { query, response }),
            endpoint,
        );
    }

    pub fn send_confirm_req(&self, endpoint: SocketAddrV6, block: Block) {
        self.stats
            .inc(StatType::Message, DetailType::ConfirmReq, Direction::Out);
        self.send_message(&Message::ConfirmReq(ConfirmReq { block }), endpoint);
    }

    /// Publish a block to the fanout set.
    pub fn republish_block(&self, block: Block, fanout: Vec<SocketAddrV6>) {
        let bytes = Message::Publish(Publish { block }).to_bytes(self.network);
        for endpoint in fanout {
            self.stats
                .inc(StatType::Message, DetailType::Publish, Direction::Out);
            self.send_buffer(bytes.clone(), endpoint);
        }
    }

    /// Rebroadcast a vote to the fanout set.
    pub fn republish_vote(&self, vote: Vote, fanout: Vec<SocketAddrV6>) {
        let bytes = Message::ConfirmAck(ConfirmAck { vote }).to_bytes(self.network);
        for endpoint in fanout {
            self.stats
                .inc(StatType::Message, DetailType::ConfirmAck, Direction::Out);
            self.send_buffer(bytes.clone(), endpoint);
        }
    }

    /// Send a confirm_req for `block` to each endpoint, `stagger` apart.
    pub fn broadcast_confirm_req(
        &self,
        block: Block,
        endpoints: Vec<SocketAddrV6>,
        stagger: Duration,
    ) {
        let bytes = Message::ConfirmReq(ConfirmReq { block }).to_bytes(self.network);
        let socket = self.socket.clone();
        let stats = self.stats.clone();
        self.handle.spawn(async move {
            for endpoint in endpoints {
                stats.inc(StatType::Message, DetailType::ConfirmReq, Direction::Out);
                if let Err(error) = socket.send_to(&bytes, SocketAddr::V6(endpoint)).await {
                    tracing::debug!(%endpoint, %error, "confirm_req send failed");
                }
                if !stagger.is_zero() {
                    tokio::time::sleep(stagger).await;
                }
            }
        });
    }

    /// Answer one confirm_ack directly to its requester.
    pub fn confirm_send(&self, vote: Vote, endpoint: SocketAddrV6) {
        tracing::trace!(%endpoint, sequence = vote.sequence, "sending confirm_ack");
        self.stats
            .inc(StatType::Message, DetailType::ConfirmAck, Direction::Out);
        self.send_message(&Message::ConfirmAck(ConfirmAck { vote }), endpoint);
    }
}
