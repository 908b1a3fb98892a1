// Network node - owns the ledger and manages peer connections

use crate::config::NodeConfig;
use crate::consensus::ValidationError;
use crate::core::{Block, Transaction, UnspentTxOut};
use crate::network::mining::MiningControl;
use crate::network::peer::{self, PeerFrame, PeerId, PeerLineCodec, PeerRegistry};
use crate::network::Message;
use crate::storage::Ledger;
use futures::StreamExt;
use std::fmt;
use std::net::SocketAddr;
use std::sync::{Arc, OnceLock};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{RwLock, mpsc, watch};
use tokio_util::codec::FramedRead;

/// Node-level failures reported to command callers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeError {
    /// Block or transaction rejected by the ledger
    Validation(ValidationError),
    /// Another mining activity is already running
    MiningInProgress,
    /// The search was stopped before it found a block
    MiningCancelled,
    /// The node has been shut down
    ShutDown,
    Network(String),
}

impl fmt::Display for NodeError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            NodeError::Validation(e) => write!(f, "{}", e),
            NodeError::MiningInProgress => write!(f, "Mining already in progress"),
            NodeError::MiningCancelled => write!(f, "Mining cancelled"),
            NodeError::ShutDown => write!(f, "Node is shut down"),
            NodeError::Network(e) => write!(f, "Network error: {}", e),
        }
    }
}

impl std::error::Error for NodeError {}

impl From<ValidationError> for NodeError {
    fn from(e: ValidationError) -> Self {
        NodeError::Validation(e)
    }
}

/// Network node
///
/// Cloning is cheap and every clone drives the same node. All ledger
/// mutation happens under the ledger write lock; when peers are needed
/// too the ledger lock is taken first.
#[derive(Clone)]
pub struct Node {
    pub(super) config: Arc<NodeConfig>,
    pub(super) ledger: Arc<RwLock<Ledger>>,
    pub(super) peers: Arc<RwLock<PeerRegistry>>,
    pub(super) mining: Arc<MiningControl>,
    local_addr: Arc<OnceLock<SocketAddr>>,
    shutdown: Arc<watch::Sender<bool>>,
}

impl Node {
    /// Create a new node holding only genesis
    pub fn new(config: NodeConfig) -> Self {
        let ledger = Ledger::new(config.conservation_rule);
        let (shutdown, _) = watch::channel(false);
        Self {
            config: Arc::new(config),
            ledger: Arc::new(RwLock::new(ledger)),
            peers: Arc::new(RwLock::new(PeerRegistry::new())),
            mining: Arc::new(MiningControl::new()),
            local_addr: Arc::new(OnceLock::new()),
            shutdown: Arc::new(shutdown),
        }
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    /// Bind the listener, accept connections in the background and dial the
    /// configured peers after the settle delay. Returns the bound address.
    pub async fn start(&self) -> Result<SocketAddr, String> {
        let listener = TcpListener::bind(self.config.listen_addr)
            .await
            .map_err(|e| format!("Failed to bind {}: {}", self.config.listen_addr, e))?;
        let local_addr = listener
            .local_addr()
            .map_err(|e| format!("Failed to read local address: {}", e))?;
        if self.local_addr.set(local_addr).is_err() {
            return Err("Node already started".to_string());
        }

        log::info!("Node {} listening on {}", self.config.name, local_addr);
        tokio::spawn(self.clone().accept_loop(listener));

        if !self.config.peers.is_empty() {
            let node = self.clone();
            tokio::spawn(async move {
                tokio::time::sleep(node.config.dial_delay).await;
                node.connect_to_peers().await;
            });
        }

        Ok(local_addr)
    }

    /// Address the listener is bound to, once started
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr.get().copied()
    }

    /// Address announced to peers in hello
    pub fn advertised_address(&self) -> String {
        match (&self.config.advertised_addr, self.local_addr()) {
            (Some(addr), _) => addr.clone(),
            (None, Some(addr)) => addr.to_string(),
            (None, None) => self.config.listen_addr.to_string(),
        }
    }

    async fn accept_loop(self, listener: TcpListener) {
        let mut shutdown = self.shutdown.subscribe();
        loop {
            tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok((stream, addr)) => {
                        log::info!("New connection from {}", addr);
                        tokio::spawn(self.clone().handle_peer(stream, addr, false));
                    }
                    Err(e) => log::error!("Failed to accept connection: {}", e),
                },
                _ = shutdown.changed() => break,
            }
        }
        log::debug!("Listener on {} closed", listener.local_addr().map(|a| a.to_string()).unwrap_or_default());
    }

    /// Dial every configured peer once
    pub async fn connect_to_peers(&self) {
        for addr in &self.config.peers {
            if let Err(e) = self.connect_to_peer(addr).await {
                log::warn!("{}", e);
            }
        }
    }

    /// Connect to a peer and announce our address
    pub async fn connect_to_peer(&self, addr: &str) -> Result<(), String> {
        let stream = TcpStream::connect(addr)
            .await
            .map_err(|e| format!("Failed to connect to {}: {}", addr, e))?;
        let remote_addr = stream
            .peer_addr()
            .map_err(|e| format!("Failed to read peer address of {}: {}", addr, e))?;

        log::info!("Connected to peer {}", remote_addr);
        tokio::spawn(self.clone().handle_peer(stream, remote_addr, true));
        Ok(())
    }

    /// Drive one connection until it closes, then deregister it
    async fn handle_peer(self, stream: TcpStream, addr: SocketAddr, outbound: bool) {
        let (read_half, write_half) = stream.into_split();
        let (sender, receiver) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            if let Err(e) = peer::write_lines(write_half, receiver).await {
                log::debug!("Peer {} writer stopped: {}", addr, e);
            }
        });

        let id = self.peers.write().await.register(addr, sender);
        if outbound {
            let hello = Message::Hello(self.advertised_address());
            self.peers.write().await.send_to(id, &hello);
        }

        let mut frames = FramedRead::new(read_half, PeerLineCodec::default());
        let mut shutdown = self.shutdown.subscribe();
        loop {
            tokio::select! {
                frame = frames.next() => match frame {
                    Some(Ok(PeerFrame::Line(line))) if line.trim().is_empty() => {}
                    Some(Ok(PeerFrame::Line(line))) => match Message::from_json(&line) {
                        Ok(message) => self.handle_message(id, message).await,
                        Err(e) => log::warn!("Dropping message from {}: {}", addr, e),
                    },
                    Some(Ok(PeerFrame::Oversized)) => {
                        log::warn!(
                            "Dropping message from {}: line exceeds {} bytes",
                            addr,
                            peer::MAX_LINE_BYTES
                        );
                    }
                    None => {
                        log::info!("Peer {} disconnected", addr);
                        break;
                    }
                    Some(Err(e)) => {
                        log::info!("Peer {} connection error: {}", addr, e);
                        break;
                    }
                },
                _ = shutdown.changed() => break,
            }
        }

        self.peers.write().await.remove(id);
    }

    /// Dispatch one message received from `from`
    pub(crate) async fn handle_message(&self, from: PeerId, message: Message) {
        log::debug!("Received {:?} from peer {}", message.message_type(), from);

        match message {
            Message::Hello(address) => {
                self.peers.write().await.set_announced_address(from, address);
            }
            Message::Transaction(tx) => {
                let mut ledger = self.ledger.write().await;
                match ledger.admit_transaction(tx.clone()) {
                    Ok(()) => {
                        self.peers.write().await.broadcast(&Message::Transaction(tx), Some(from));
                    }
                    Err(e) => log::warn!("Rejected transaction {} from peer {}: {}", tx.id, from, e),
                }
            }
            Message::NewBlock(block) => {
                let mut ledger = self.ledger.write().await;
                match ledger.accept_block(block.clone()) {
                    Ok(()) => {
                        self.peers.write().await.broadcast(&Message::NewBlock(block), Some(from));
                    }
                    Err(e) => log::warn!("Rejected block {} from peer {}: {}", block.index, from, e),
                }
            }
        }
    }

    /// Whole chain, genesis first
    pub async fn blocks(&self) -> Vec<Block> {
        self.ledger.read().await.chain().blocks().to_vec()
    }

    pub async fn latest_block(&self) -> Block {
        self.ledger.read().await.chain().tip().clone()
    }

    pub async fn unspent_tx_outs(&self) -> Vec<UnspentTxOut> {
        self.ledger.read().await.utxo_set().to_vec()
    }

    pub async fn mempool(&self) -> Vec<Transaction> {
        self.ledger.read().await.mempool().transactions().to_vec()
    }

    pub async fn balance(&self, address: &str) -> u64 {
        self.ledger.read().await.utxo_set().balance(address)
    }

    /// Addresses announced by connected peers
    pub async fn peer_addresses(&self) -> Vec<String> {
        self.peers.read().await.announced_addresses()
    }

    /// Get number of connected peers
    pub async fn peer_count(&self) -> usize {
        self.peers.read().await.len()
    }

    /// Admit a locally submitted transaction and gossip it to every peer
    pub async fn submit_transaction(&self, tx: Transaction) -> Result<(), NodeError> {
        let mut ledger = self.ledger.write().await;
        if let Err(e) = ledger.admit_transaction(tx.clone()) {
            log::warn!("Rejected submitted transaction {}: {}", tx.id, e);
            return Err(e.into());
        }
        self.peers.write().await.broadcast(&Message::Transaction(tx), None);
        Ok(())
    }

    /// Stop mining, stop listening and close every connection
    pub async fn shutdown(&self) {
        self.mining.shutdown();
        self.shutdown.send_replace(true);
        self.peers.write().await.clear();
        log::info!("Node {} shut down", self.config.name);
    }
}
