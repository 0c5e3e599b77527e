use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use chrono::Utc;
use dashmap::DashMap;
use ember_core::block::Block;
use ember_core::chain::{Blockchain, SyncAction};
use ember_core::miner::find_block;
use ember_core::network::Message;
use log::{debug, error, info, warn};
use serde_json::Value;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch, RwLock};
use tokio::time;
use uuid::Uuid;

use crate::connection_handler;

/// Outbound queue depth per peer before a slow peer is dropped.
const PEER_SEND_QUEUE: usize = 32;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// One registered peer: the remote address for operator listings, and the
/// sender feeding the task that owns the socket's write half.
struct Peer {
    addr: SocketAddr,
    tx: mpsc::Sender<Message>,
}

struct NodeState {
    chain: RwLock<Blockchain>,
    peers: DashMap<Uuid, Peer>,
    head_tx: watch::Sender<Block>,
    shutdown_tx: watch::Sender<bool>,
    mining_cancel: AtomicBool,
    mining_busy: AtomicBool,
}

/// Handle to a running ledger node. Cheap to clone; the operator front end
/// drives the node exclusively through this.
#[derive(Clone)]
pub struct Node {
    state: Arc<NodeState>,
}

impl Node {
    pub fn new() -> Self {
        let chain = Blockchain::new();
        let (head_tx, _) = watch::channel(chain.latest_block().clone());
        let (shutdown_tx, _) = watch::channel(false);
        Node {
            state: Arc::new(NodeState {
                chain: RwLock::new(chain),
                peers: DashMap::new(),
                head_tx,
                shutdown_tx,
                mining_cancel: AtomicBool::new(false),
                mining_busy: AtomicBool::new(false),
            }),
        }
    }

    /// Bind the gossip listener and start accepting peer connections.
    /// Returns the bound address (useful with port 0).
    pub async fn listen(&self, addr: &str) -> Result<SocketAddr> {
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("failed to bind gossip listener on {}", addr))?;
        let local_addr = listener.local_addr()?;
        info!("listening for peers on {}", local_addr);

        let node = self.clone();
        let mut shutdown_rx = self.state.shutdown_tx.subscribe();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown_rx.changed() => {
                        info!("gossip listener on {} stopped", local_addr);
                        break;
                    }
                    accepted = listener.accept() => match accepted {
                        Ok((socket, addr)) => {
                            debug!("inbound connection from {}", addr);
                            node.register_connection(socket);
                        }
                        Err(e) => error!("error accepting connection: {}", e),
                    }
                }
            }
        });
        Ok(local_addr)
    }

    /// Connect out to a remote node and register it in the peer set.
    pub async fn add_peer(&self, addr: &str) -> Result<()> {
        let socket = time::timeout(CONNECT_TIMEOUT, TcpStream::connect(addr))
            .await
            .with_context(|| format!("timeout connecting to peer {}", addr))?
            .with_context(|| format!("failed to connect to peer {}", addr))?;
        info!("connected to peer {}", addr);
        self.register_connection(socket);
        Ok(())
    }

    /// Addresses of the currently active peers.
    pub fn peers(&self) -> Vec<SocketAddr> {
        self.state.peers.iter().map(|p| p.value().addr).collect()
    }

    /// Read-only snapshot of the canonical chain.
    pub async fn blocks(&self) -> Vec<Block> {
        self.state.chain.read().await.blocks().to_vec()
    }

    pub async fn latest_block(&self) -> Block {
        self.state.chain.read().await.latest_block().clone()
    }

    /// New-head notifications, usable by a front end for logging. The
    /// receiver always holds the most recently accepted head.
    pub fn subscribe_heads(&self) -> watch::Receiver<Block> {
        self.state.head_tx.subscribe()
    }

    /// Mine one block carrying `data` on top of the current head. The nonce
    /// search runs on a blocking thread off a head snapshot; the chain lock
    /// is re-acquired only to append, and the result is validated against
    /// the then-current head first, so a chain that advanced mid-search
    /// discards the stale block instead of force-appending it.
    pub async fn mine_block(&self, data: Value) -> Result<Block> {
        if self
            .state
            .mining_busy
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            bail!("a mining task is already running");
        }
        let result = self.mine_block_inner(data).await;
        self.state.mining_busy.store(false, Ordering::SeqCst);
        result
    }

    async fn mine_block_inner(&self, data: Value) -> Result<Block> {
        let (next_index, previous_hash, difficulty) = {
            let chain = self.state.chain.read().await;
            let head = chain.latest_block();
            (head.index + 1, head.hash.clone(), chain.next_difficulty())
        };
        let timestamp = Utc::now().timestamp();
        info!("mining block {} at difficulty {}", next_index, difficulty);

        let state = self.state.clone();
        let mined = tokio::task::spawn_blocking(move || {
            find_block(
                next_index,
                &previous_hash,
                timestamp,
                data,
                difficulty,
                &state.mining_cancel,
            )
        })
        .await
        .context("mining task panicked")?;
        let Some(block) = mined else {
            bail!("mining cancelled");
        };

        {
            let mut chain = self.state.chain.write().await;
            if let Err(reason) = chain.try_append(block.clone()) {
                bail!(
                    "mined block {} discarded, no longer a valid successor: {}",
                    block.index,
                    reason
                );
            }
        }
        self.publish_head(block.clone());
        Ok(block)
    }

    /// Apply a received block sequence and emit whatever gossip the outcome
    /// calls for.
    pub(crate) async fn handle_chain_response(&self, from: Uuid, blocks: Vec<Block>) {
        let action = {
            let mut chain = self.state.chain.write().await;
            chain.handle_chain_response(blocks)
        };
        match action {
            SyncAction::Appended | SyncAction::Replaced => {
                let head = self.latest_block().await;
                info!("new head at index {} (hash {})", head.index, head.hash);
                self.publish_head(head);
            }
            SyncAction::RequestFullChain => {
                self.send_to(from, Message::QueryAll);
            }
            SyncAction::KeptLocal | SyncAction::Rejected => {}
        }
    }

    /// Notify subscribers and gossip the new head to every active peer.
    fn publish_head(&self, head: Block) {
        let _ = self.state.head_tx.send(head.clone());
        self.broadcast(Message::ChainResponse(vec![head]));
    }

    /// Send to every registered peer. A failure on one peer drops that peer
    /// and never blocks sends to the others.
    pub(crate) fn broadcast(&self, message: Message) {
        let ids: Vec<Uuid> = self.state.peers.iter().map(|p| *p.key()).collect();
        debug!("broadcasting to {} peers", ids.len());
        for id in ids {
            self.send_to(id, message.clone());
        }
    }

    pub(crate) fn send_to(&self, id: Uuid, message: Message) {
        let Some(tx) = self.state.peers.get(&id).map(|p| p.tx.clone()) else {
            return;
        };
        if tx.try_send(message).is_err() {
            warn!("peer {} unreachable or backed up, dropping it", id);
            self.remove_peer(id);
        }
    }

    pub(crate) fn remove_peer(&self, id: Uuid) {
        if self.state.peers.remove(&id).is_some() {
            info!("peer {} removed from the active set", id);
        }
    }

    /// Register an established duplex connection: spawn a writer task owning
    /// the write half, a reader task driving the protocol, and immediately
    /// query the peer's head.
    pub(crate) fn register_connection(&self, socket: TcpStream) {
        let peer_addr = match socket.peer_addr() {
            Ok(addr) => addr,
            Err(e) => {
                warn!("dropping connection without a peer address: {}", e);
                return;
            }
        };
        let (read_half, mut write_half) = socket.into_split();
        let id = Uuid::new_v4();
        let (tx, mut rx) = mpsc::channel::<Message>(PEER_SEND_QUEUE);
        self.state.peers.insert(
            id,
            Peer {
                addr: peer_addr,
                tx,
            },
        );
        info!("peer {} registered ({})", id, peer_addr);

        let writer_node = self.clone();
        tokio::spawn(async move {
            while let Some(message) = rx.recv().await {
                if let Err(e) = message.send_async(&mut write_half).await {
                    warn!("failed to send to peer {}: {}", id, e);
                    break;
                }
            }
            writer_node.remove_peer(id);
        });

        let reader_node = self.clone();
        tokio::spawn(async move {
            if let Err(e) =
                connection_handler::handle_connection(reader_node.clone(), id, read_half).await
            {
                debug!("peer {} reader closed: {:#}", id, e);
            }
            reader_node.remove_peer(id);
        });

        self.send_to(id, Message::QueryLatest);
    }

    /// Cancel any in-flight mining search promptly, stop accepting
    /// connections, and close all peer connections. The chain is left in
    /// whatever consistent state it had reached.
    pub fn shutdown(&self) {
        info!("node shutting down");
        self.state.mining_cancel.store(true, Ordering::SeqCst);
        let _ = self.state.shutdown_tx.send(true);
        self.state.peers.clear();
    }
}

impl Default for Node {
    fn default() -> Self {
        Self::new()
    }
}
