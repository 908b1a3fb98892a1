// Basic ledger types and consensus constants

use std::fmt;

/// Reward paid by every coinbase transaction
pub const COINBASE_AMOUNT: u64 = 50;

/// Sentinel `txOutId` carried by the single input of a coinbase transaction
pub const COINBASE_INPUT_ID: &str = "0";

/// Fixed hash of the genesis block (never mined, never recomputed)
pub const GENESIS_HASH: &str = "genesisBlockHash";

/// Genesis timestamp (Unix seconds)
pub const GENESIS_TIMESTAMP: i64 = 1;

/// Difficulty of the genesis block, inherited until the first retarget
pub const GENESIS_DIFFICULTY: u32 = 4;

/// Expected seconds between two blocks
pub const BLOCK_GENERATION_INTERVAL_SECONDS: i64 = 10;

/// Number of blocks between two difficulty adjustments
pub const DIFFICULTY_ADJUSTMENT_INTERVAL: u64 = 10;

/// Outpoint - identifies a previous output by producing transaction id and output index
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OutPoint {
    pub tx_out_id: String,
    pub tx_out_index: u64,
}

impl OutPoint {
    pub fn new(tx_out_id: impl Into<String>, tx_out_index: u64) -> Self {
        Self {
            tx_out_id: tx_out_id.into(),
            tx_out_index,
        }
    }

    /// Whether this outpoint is the coinbase sentinel rather than a real output
    pub fn is_coinbase_sentinel(&self) -> bool {
        self.tx_out_id == COINBASE_INPUT_ID
    }
}

impl fmt::Display for OutPoint {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}:{}", self.tx_out_id, self.tx_out_index)
    }
}
