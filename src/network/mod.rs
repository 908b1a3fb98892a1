// P2P networking

mod message;
mod mining;
mod node;
mod peer;

pub use message::{Envelope, Message, MessageType, PROTOCOL_VERSION};
pub use mining::{MiningControl, MiningJob};
pub use node::{Node, NodeError};
pub use peer::{MAX_LINE_BYTES, PeerFrame, PeerHandle, PeerId, PeerLineCodec, PeerRegistry, write_lines};
