//! Commitment gossip: WebSocket fan-out from a publisher to follower nodes
//!
//! The publisher runs `GossipServer`, followers connect with `GossipClient`.
//! Delivery is at-least-once and unordered; the verifier's parent-hash check
//! makes duplicates and reordering harmless, so nothing is deduplicated here.

use std::collections::HashMap;
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use parking_lot::RwLock;
use protocol_types::{GossipMessage, RawTxList, SignedCommitment};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc};
use tokio_tungstenite::{accept_async, connect_async, tungstenite::Message};

/// Gossip server (run by the publishing preconfer node)
pub struct GossipServer {
    /// Channel fanning messages out to all connected peers
    tx: broadcast::Sender<Vec<u8>>,
    /// Connected peers by remote address
    peers: Arc<RwLock<HashMap<String, PeerInfo>>>,
    stats: Arc<RwLock<ServerStats>>,
}

#[derive(Debug, Clone)]
struct PeerInfo {
    pub last_head: u64,
}

#[derive(Debug, Default)]
struct ServerStats {
    pub messages_broadcast: u64,
    pub peers_connected: usize,
}

impl GossipServer {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1000);
        Self {
            tx,
            peers: Arc::new(RwLock::new(HashMap::new())),
            stats: Arc::new(RwLock::new(ServerStats::default())),
        }
    }

    /// Start listening for follower connections
    pub async fn start(&self, addr: &str) -> anyhow::Result<()> {
        let listener = TcpListener::bind(addr).await?;
        tracing::info!("Gossip server listening on {}", addr);

        let tx = self.tx.clone();
        let peers = self.peers.clone();
        let stats = self.stats.clone();

        tokio::spawn(async move {
            loop {
                match listener.accept().await {
                    Ok((stream, peer_addr)) => {
                        tracing::info!("Peer connected from {}", peer_addr);
                        let rx = tx.subscribe();
                        let peers = peers.clone();
                        let stats = stats.clone();

                        tokio::spawn(async move {
                            if let Err(e) =
                                handle_peer_connection(stream, peer_addr.to_string(), rx, peers, stats)
                                    .await
                            {
                                tracing::warn!("Peer connection error: {}", e);
                            }
                        });
                    }
                    Err(e) => {
                        tracing::error!("Accept error: {}", e);
                    }
                }
            }
        });

        Ok(())
    }

    /// Broadcast a signed commitment with its raw transaction list
    pub fn broadcast_commitment(&self, commitment: &SignedCommitment, tx_list: &RawTxList) {
        let msg = GossipMessage::Commitment {
            commitment: commitment.clone(),
            tx_list: tx_list.clone(),
        };

        match self.tx.send(msg.to_bytes()) {
            Ok(n) => {
                self.stats.write().messages_broadcast += 1;
                tracing::debug!(
                    "Broadcast commitment for block {} to {} peers",
                    commitment.preconfirmation().block_number,
                    n
                );
            }
            Err(_) => {
                // No peers connected
            }
        }
    }

    /// Broadcast a heartbeat carrying the current head block number
    pub fn broadcast_heartbeat(&self, block_number: u64) {
        let _ = self.tx.send(GossipMessage::Heartbeat { block_number }.to_bytes());
    }

    pub fn connected_peers(&self) -> usize {
        self.peers.read().len()
    }
}

impl Default for GossipServer {
    fn default() -> Self {
        Self::new()
    }
}

async fn handle_peer_connection(
    stream: TcpStream,
    peer_addr: String,
    mut rx: broadcast::Receiver<Vec<u8>>,
    peers: Arc<RwLock<HashMap<String, PeerInfo>>>,
    stats: Arc<RwLock<ServerStats>>,
) -> anyhow::Result<()> {
    let ws_stream = accept_async(stream).await?;
    let (mut ws_sender, mut ws_receiver) = ws_stream.split();

    peers
        .write()
        .insert(peer_addr.clone(), PeerInfo { last_head: 0 });
    stats.write().peers_connected = peers.read().len();

    // Forward broadcasts to this peer
    let send_task = tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(data) => {
                    if ws_sender.send(Message::Binary(data)).await.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!("Peer lagged {} messages", n);
                }
                Err(broadcast::error::RecvError::Closed) => {
                    break;
                }
            }
        }
    });

    // Handle messages coming back from the peer
    while let Some(msg) = ws_receiver.next().await {
        match msg {
            Ok(Message::Binary(data)) => {
                if let Ok(gossip_msg) = GossipMessage::from_bytes(&data) {
                    if let GossipMessage::HeadStatus { block_number } = gossip_msg {
                        tracing::debug!("Peer {} at head {}", peer_addr, block_number);
                        if let Some(info) = peers.write().get_mut(&peer_addr) {
                            info.last_head = block_number;
                        }
                    }
                }
            }
            Ok(Message::Close(_)) => break,
            Err(e) => {
                tracing::warn!("WebSocket error: {}", e);
                break;
            }
            _ => {}
        }
    }

    // Cleanup
    send_task.abort();
    peers.write().remove(&peer_addr);
    stats.write().peers_connected = peers.read().len();
    tracing::info!("Peer {} disconnected", peer_addr);

    Ok(())
}

/// Gossip client (run by follower nodes)
pub struct GossipClient {
    /// Incoming commitments, in arrival order
    commitment_rx: mpsc::Receiver<(SignedCommitment, RawTxList)>,
    /// Channel for messages back to the publisher
    msg_tx: mpsc::Sender<GossipMessage>,
}

impl GossipClient {
    /// Connect to a publisher's gossip server
    pub async fn connect(publisher_addr: &str) -> anyhow::Result<Self> {
        let url = format!("ws://{}", publisher_addr);
        let (ws_stream, _) = connect_async(&url).await?;
        let (mut ws_sender, mut ws_receiver) = ws_stream.split();

        tracing::info!("Connected to publisher at {}", publisher_addr);

        let (commitment_tx, commitment_rx) = mpsc::channel::<(SignedCommitment, RawTxList)>(1000);
        let (msg_tx, mut msg_rx) = mpsc::channel::<GossipMessage>(100);

        // Receiver task: decode and forward to the application queue
        tokio::spawn(async move {
            while let Some(msg) = ws_receiver.next().await {
                match msg {
                    Ok(Message::Binary(data)) => {
                        if let Ok(gossip_msg) = GossipMessage::from_bytes(&data) {
                            match gossip_msg {
                                GossipMessage::Commitment { commitment, tx_list } => {
                                    let _ = commitment_tx.send((commitment, tx_list)).await;
                                }
                                GossipMessage::Heartbeat { block_number } => {
                                    tracing::trace!("Heartbeat at head {}", block_number);
                                }
                                _ => {}
                            }
                        }
                    }
                    Ok(Message::Close(_)) => {
                        tracing::warn!("Publisher closed connection");
                        break;
                    }
                    Err(e) => {
                        tracing::error!("WebSocket error: {}", e);
                        break;
                    }
                    _ => {}
                }
            }
        });

        // Sender task
        tokio::spawn(async move {
            while let Some(msg) = msg_rx.recv().await {
                if ws_sender.send(Message::Binary(msg.to_bytes())).await.is_err() {
                    break;
                }
            }
        });

        Ok(Self {
            commitment_rx,
            msg_tx,
        })
    }

    /// Receive the next commitment from the publisher
    pub async fn recv_commitment(&mut self) -> Option<(SignedCommitment, RawTxList)> {
        self.commitment_rx.recv().await
    }

    /// Report our verified head back to the publisher
    pub async fn send_head_status(&self, block_number: u64) {
        let _ = self
            .msg_tx
            .send(GossipMessage::HeadStatus { block_number })
            .await;
    }
}
