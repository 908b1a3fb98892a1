// Block data structures

use crate::core::{
    GENESIS_DIFFICULTY, GENESIS_HASH, GENESIS_TIMESTAMP, Transaction, hash_parts, is_hex_digest,
};
use serde::{Deserialize, Serialize};

/// Block - a batch of transactions linked to its predecessor by hash
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Block {
    /// Position in the chain (genesis = 0)
    pub index: u64,
    /// SHA256 of the block contents, hex encoded
    pub hash: String,
    /// Hash of the previous block (`None` only for genesis)
    pub previous_hash: Option<String>,
    /// Block timestamp (Unix seconds)
    pub timestamp: i64,
    /// Transactions, coinbase first
    pub transactions: Vec<Transaction>,
    /// Required number of leading zero bits in `hash`
    pub difficulty: u32,
    /// Nonce for proof-of-work
    pub nonce: u64,
}

impl Block {
    /// Create a block and compute its hash
    pub fn new(
        index: u64,
        previous_hash: Option<String>,
        timestamp: i64,
        transactions: Vec<Transaction>,
        difficulty: u32,
        nonce: u64,
    ) -> Self {
        let mut block = Self {
            index,
            hash: String::new(),
            previous_hash,
            timestamp,
            transactions,
            difficulty,
            nonce,
        };
        block.hash = block.calculate_hash();
        block
    }

    /// Create the genesis block
    ///
    /// Identical on every node; its hash is a fixed label rather than a digest.
    pub fn genesis() -> Self {
        Self {
            index: 0,
            hash: GENESIS_HASH.to_string(),
            previous_hash: None,
            timestamp: GENESIS_TIMESTAMP,
            transactions: Vec::new(),
            difficulty: GENESIS_DIFFICULTY,
            nonce: 0,
        }
    }

    /// Everything in the hash preimage except the trailing nonce:
    /// index, previousHash, timestamp, transactions as JSON, difficulty.
    /// A missing previous hash contributes nothing.
    pub fn hash_prefix(&self) -> String {
        let transactions = serde_json::to_string(&self.transactions)
            .expect("transactions always serialize to JSON");
        format!(
            "{}{}{}{}{}",
            self.index,
            self.previous_hash.as_deref().unwrap_or(""),
            self.timestamp,
            transactions,
            self.difficulty
        )
    }

    /// Hash of a preimage prefix completed with `nonce`
    pub fn hash_with_nonce(prefix: &str, nonce: u64) -> String {
        hash_parts(&[&prefix, &nonce])
    }

    /// Recompute the block hash from its contents
    pub fn calculate_hash(&self) -> String {
        Self::hash_with_nonce(&self.hash_prefix(), self.nonce)
    }

    /// Check if this is the genesis block
    pub fn is_genesis(&self) -> bool {
        self == &Self::genesis()
    }

    /// Shape checks that typing alone does not give us: a digest-shaped
    /// hash and a link to a predecessor.
    pub fn has_valid_structure(&self) -> bool {
        is_hex_digest(&self.hash) && self.previous_hash.is_some()
    }

    /// Ids of the transactions in this block, in order
    pub fn transaction_ids(&self) -> Vec<String> {
        self.transactions.iter().map(|tx| tx.id.clone()).collect()
    }
}
