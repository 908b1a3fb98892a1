// Peer connection management

use crate::network::Message;
use bytes::BytesMut;
use std::collections::HashMap;
use std::net::SocketAddr;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tokio_util::codec::{Decoder, LinesCodec, LinesCodecError};

/// Longest line accepted from a peer; longer lines are discarded unread
pub const MAX_LINE_BYTES: usize = 4 * 1024 * 1024;

/// One frame read from a peer connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerFrame {
    Line(String),
    /// A line longer than the limit; its bytes were dropped
    Oversized,
}

/// Newline framing with a length cap.
///
/// An over-long line is reported as `PeerFrame::Oversized` instead of an
/// error, so the stream stays usable and reading resumes at the next line.
#[derive(Debug, Clone)]
pub struct PeerLineCodec {
    lines: LinesCodec,
}

impl PeerLineCodec {
    pub fn new(max_length: usize) -> Self {
        Self {
            lines: LinesCodec::new_with_max_length(max_length),
        }
    }
}

impl Default for PeerLineCodec {
    fn default() -> Self {
        Self::new(MAX_LINE_BYTES)
    }
}

impl Decoder for PeerLineCodec {
    type Item = PeerFrame;
    type Error = LinesCodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<PeerFrame>, LinesCodecError> {
        match self.lines.decode(src) {
            Ok(line) => Ok(line.map(PeerFrame::Line)),
            Err(LinesCodecError::MaxLineLengthExceeded) => Ok(Some(PeerFrame::Oversized)),
            Err(e) => Err(e),
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<PeerFrame>, LinesCodecError> {
        match self.lines.decode_eof(src) {
            Ok(line) => Ok(line.map(PeerFrame::Line)),
            Err(LinesCodecError::MaxLineLengthExceeded) => Ok(Some(PeerFrame::Oversized)),
            Err(e) => Err(e),
        }
    }
}

/// Identity of one open connection, unique for the node's lifetime
pub type PeerId = u64;

/// Handle to one open peer connection
#[derive(Debug, Clone)]
pub struct PeerHandle {
    pub id: PeerId,
    pub remote_addr: SocketAddr,
    /// Address the peer announced in its hello, if any
    pub announced_address: Option<String>,
    sender: UnboundedSender<String>,
}

impl PeerHandle {
    /// Queue one line for the connection's writer; false once it has closed
    pub fn send_line(&self, line: String) -> bool {
        self.sender.send(line).is_ok()
    }
}

/// Registry of open connections, keyed by connection identity
#[derive(Debug, Default)]
pub struct PeerRegistry {
    peers: HashMap<PeerId, PeerHandle>,
    next_id: PeerId,
}

impl PeerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new connection with no announced address
    pub fn register(&mut self, remote_addr: SocketAddr, sender: UnboundedSender<String>) -> PeerId {
        let id = self.next_id;
        self.next_id += 1;
        self.peers.insert(
            id,
            PeerHandle {
                id,
                remote_addr,
                announced_address: None,
                sender,
            },
        );
        log::debug!("Registered peer {} ({}), {} connected", id, remote_addr, self.peers.len());
        id
    }

    /// Drop a connection; its writer stops once the handle is gone
    pub fn remove(&mut self, id: PeerId) -> Option<PeerHandle> {
        let removed = self.peers.remove(&id);
        if let Some(peer) = &removed {
            log::debug!("Removed peer {} ({})", id, peer.remote_addr);
        }
        removed
    }

    pub fn get(&self, id: PeerId) -> Option<&PeerHandle> {
        self.peers.get(&id)
    }

    /// Record the address a peer announced; false for an unknown peer
    pub fn set_announced_address(&mut self, id: PeerId, address: String) -> bool {
        match self.peers.get_mut(&id) {
            Some(peer) => {
                log::info!("Peer {} announced address {}", peer.remote_addr, address);
                peer.announced_address = Some(address);
                true
            }
            None => false,
        }
    }

    /// Announced addresses of connected peers, in connection order
    pub fn announced_addresses(&self) -> Vec<String> {
        let mut peers: Vec<&PeerHandle> = self.peers.values().collect();
        peers.sort_by_key(|peer| peer.id);
        peers
            .into_iter()
            .filter_map(|peer| peer.announced_address.clone())
            .collect()
    }

    /// Send to one peer, deregistering it if its connection has closed
    pub fn send_to(&mut self, id: PeerId, message: &Message) -> bool {
        let delivered = self
            .peers
            .get(&id)
            .is_some_and(|peer| peer.send_line(message.to_json()));
        if !delivered {
            self.remove(id);
        }
        delivered
    }

    /// Send to every peer except `exclude`; returns how many were reached.
    ///
    /// Peers whose connection has closed are deregistered rather than retried.
    pub fn broadcast(&mut self, message: &Message, exclude: Option<PeerId>) -> usize {
        let line = message.to_json();
        let mut closed = Vec::new();
        let mut delivered = 0;

        for peer in self.peers.values() {
            if Some(peer.id) == exclude {
                continue;
            }
            if peer.send_line(line.clone()) {
                delivered += 1;
            } else {
                closed.push(peer.id);
            }
        }

        for id in closed {
            self.remove(id);
        }

        log::debug!("Broadcast {:?} to {} peers", message.message_type(), delivered);
        delivered
    }

    /// Drop every connection
    pub fn clear(&mut self) {
        self.peers.clear();
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }
}

/// Writer half of a connection: drain queued lines onto the socket.
///
/// Returns when every sender is dropped or the socket fails.
pub async fn write_lines<W>(mut writer: W, mut lines: UnboundedReceiver<String>) -> Result<(), String>
where
    W: AsyncWrite + Unpin,
{
    while let Some(line) = lines.recv().await {
        writer
            .write_all(line.as_bytes())
            .await
            .map_err(|e| format!("Failed to send message: {}", e))?;
        writer
            .write_all(b"\n")
            .await
            .map_err(|e| format!("Failed to send message: {}", e))?;
        writer
            .flush()
            .await
            .map_err(|e| format!("Failed to flush: {}", e))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use tokio::io::{AsyncBufReadExt, BufReader};
    use tokio::sync::mpsc;
    use tokio_util::codec::FramedRead;

    fn addr(port: u16) -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], port))
    }

    fn hello() -> Message {
        Message::Hello("127.0.0.1:9000".to_string())
    }

    #[test]
    fn test_register_and_announce() {
        let mut registry = PeerRegistry::new();
        let (first_tx, _first_rx) = mpsc::unbounded_channel();
        let (second_tx, _second_rx) = mpsc::unbounded_channel();

        let first = registry.register(addr(1), first_tx);
        let second = registry.register(addr(2), second_tx);
        assert_ne!(first, second);
        assert_eq!(registry.len(), 2);
        assert!(registry.announced_addresses().is_empty());

        assert!(registry.set_announced_address(second, "10.0.0.2:42069".to_string()));
        assert!(registry.set_announced_address(first, "10.0.0.1:42069".to_string()));
        assert!(!registry.set_announced_address(99, "nowhere".to_string()));
        assert_eq!(
            registry.announced_addresses(),
            vec!["10.0.0.1:42069".to_string(), "10.0.0.2:42069".to_string()]
        );
    }

    #[test]
    fn test_broadcast_excludes_origin() {
        let mut registry = PeerRegistry::new();
        let (origin_tx, mut origin_rx) = mpsc::unbounded_channel();
        let (other_tx, mut other_rx) = mpsc::unbounded_channel();
        let origin = registry.register(addr(1), origin_tx);
        registry.register(addr(2), other_tx);

        assert_eq!(registry.broadcast(&hello(), Some(origin)), 1);
        assert_eq!(other_rx.try_recv().unwrap(), hello().to_json());
        assert!(origin_rx.try_recv().is_err());

        assert_eq!(registry.broadcast(&hello(), None), 2);
        assert!(origin_rx.try_recv().is_ok());
    }

    #[test]
    fn test_broadcast_deregisters_closed_peers() {
        let mut registry = PeerRegistry::new();
        let (open_tx, _open_rx) = mpsc::unbounded_channel();
        let (closed_tx, closed_rx) = mpsc::unbounded_channel();
        registry.register(addr(1), open_tx);
        let closed = registry.register(addr(2), closed_tx);
        drop(closed_rx);

        assert_eq!(registry.broadcast(&hello(), None), 1);
        assert_eq!(registry.len(), 1);
        assert!(registry.get(closed).is_none());
    }

    #[test]
    fn test_send_to_closed_peer() {
        let mut registry = PeerRegistry::new();
        let (tx, rx) = mpsc::unbounded_channel();
        let id = registry.register(addr(1), tx);
        drop(rx);

        assert!(!registry.send_to(id, &hello()));
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_write_lines_frames_one_message_per_line() {
        let (client, server) = tokio::io::duplex(4096);
        let (tx, rx) = mpsc::unbounded_channel();
        let writer = tokio::spawn(write_lines(client, rx));

        tx.send(hello().to_json()).unwrap();
        tx.send(Message::Hello("second".to_string()).to_json()).unwrap();
        drop(tx);
        writer.await.unwrap().unwrap();

        let mut lines = BufReader::new(server).lines();
        assert_eq!(Message::from_json(&lines.next_line().await.unwrap().unwrap()), Ok(hello()));
        assert_eq!(
            Message::from_json(&lines.next_line().await.unwrap().unwrap()),
            Ok(Message::Hello("second".to_string()))
        );
        assert_eq!(lines.next_line().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_oversized_line_is_skipped() {
        let (mut client, server) = tokio::io::duplex(64 * 1024);
        let mut frames = FramedRead::new(server, PeerLineCodec::new(16));

        let long = "x".repeat(10_000);
        client
            .write_all(format!("short\n{}\nafter\n", long).as_bytes())
            .await
            .unwrap();
        drop(client);

        assert_eq!(frames.next().await.unwrap().unwrap(), PeerFrame::Line("short".to_string()));
        assert_eq!(frames.next().await.unwrap().unwrap(), PeerFrame::Oversized);
        assert_eq!(frames.next().await.unwrap().unwrap(), PeerFrame::Line("after".to_string()));
        assert!(frames.next().await.is_none());
    }
}
