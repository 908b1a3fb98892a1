// Proof-of-work UTXO ledger node
// Chain, UTXO set and mempool shared by a TCP gossip network and a miner

pub mod core;
pub mod consensus;
pub mod storage;
pub mod network;
pub mod wallet;
pub mod config;
pub mod cli;

// Re-exports for convenience
pub use crate::core::{Block, OutPoint, Transaction, TxInput, TxOutput, UnspentTxOut};
pub use consensus::{BlockValidator, ConservationRule, Miner, TransactionValidator, ValidationError};
pub use storage::{Chain, Ledger, Mempool, UtxoSet};
pub use network::{Message, Node, NodeError};
pub use wallet::TransactionBuilder;
pub use config::NodeConfig;
pub use cli::Cli;
