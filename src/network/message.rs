// Network protocol messages

use crate::core::{Block, Transaction};
use serde::{Deserialize, Serialize};

/// Protocol version carried by every envelope
pub const PROTOCOL_VERSION: &str = "v1";

/// Network message types, as named on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MessageType {
    Hello,
    NewBlock,
    NewTransaction,
}

/// Wire envelope; one per line on a peer connection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    pub version: String,
    #[serde(rename = "type")]
    pub message_type: MessageType,
    /// Plain address for `hello`, serialized block or transaction otherwise
    pub payload: String,
}

/// Network message
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    /// Sender's externally reachable address
    Hello(String),
    NewBlock(Block),
    Transaction(Transaction),
}

impl Message {
    /// Get message type
    pub fn message_type(&self) -> MessageType {
        match self {
            Message::Hello(_) => MessageType::Hello,
            Message::NewBlock(_) => MessageType::NewBlock,
            Message::Transaction(_) => MessageType::NewTransaction,
        }
    }

    /// Wrap the message in a `v1` envelope
    pub fn to_envelope(&self) -> Envelope {
        let payload = match self {
            Message::Hello(address) => address.clone(),
            Message::NewBlock(block) => {
                serde_json::to_string(block).expect("blocks always serialize to JSON")
            }
            Message::Transaction(tx) => {
                serde_json::to_string(tx).expect("transactions always serialize to JSON")
            }
        };

        Envelope {
            version: PROTOCOL_VERSION.to_string(),
            message_type: self.message_type(),
            payload,
        }
    }

    /// Parse the payload of an envelope
    pub fn from_envelope(envelope: Envelope) -> Result<Self, String> {
        if envelope.version != PROTOCOL_VERSION {
            return Err(format!("Unsupported protocol version: {}", envelope.version));
        }

        match envelope.message_type {
            MessageType::Hello => Ok(Message::Hello(envelope.payload)),
            MessageType::NewBlock => serde_json::from_str(&envelope.payload)
                .map(Message::NewBlock)
                .map_err(|e| format!("Invalid block payload: {}", e)),
            MessageType::NewTransaction => serde_json::from_str(&envelope.payload)
                .map(Message::Transaction)
                .map_err(|e| format!("Invalid transaction payload: {}", e)),
        }
    }

    /// Serialize to a single line of JSON (no trailing newline)
    pub fn to_json(&self) -> String {
        serde_json::to_string(&self.to_envelope()).expect("envelopes always serialize to JSON")
    }

    /// Parse one line of JSON
    pub fn from_json(line: &str) -> Result<Self, String> {
        let envelope: Envelope =
            serde_json::from_str(line).map_err(|e| format!("Invalid envelope: {}", e))?;
        Self::from_envelope(envelope)
    }
}
