// Transaction data structures

use crate::core::{COINBASE_AMOUNT, COINBASE_INPUT_ID, OutPoint, hash_parts};
use serde::{Deserialize, Serialize};
use std::fmt::Display;

/// Transaction input - references a previous transaction output
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TxInput {
    /// Id of the transaction that produced the spent output ("0" for coinbase)
    pub tx_out_id: String,
    /// Index of the output in that transaction (block index for coinbase)
    pub tx_out_index: u64,
    /// Hex DER ECDSA signature over the spending transaction id
    pub signature: String,
}

impl TxInput {
    /// Create a new, unsigned transaction input
    pub fn new(tx_out_id: impl Into<String>, tx_out_index: u64) -> Self {
        Self {
            tx_out_id: tx_out_id.into(),
            tx_out_index,
            signature: String::new(),
        }
    }

    /// Create the sentinel input of a coinbase transaction
    pub fn coinbase(block_index: u64) -> Self {
        Self::new(COINBASE_INPUT_ID, block_index)
    }

    /// Check if this is a coinbase input
    pub fn is_coinbase(&self) -> bool {
        self.tx_out_id == COINBASE_INPUT_ID
    }

    /// The output this input spends
    pub fn outpoint(&self) -> OutPoint {
        OutPoint::new(self.tx_out_id.clone(), self.tx_out_index)
    }
}

/// Transaction output - specifies amount and recipient
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TxOutput {
    /// Recipient public key, hex encoded
    pub address: String,
    pub amount: u64,
}

impl TxOutput {
    pub fn new(address: impl Into<String>, amount: u64) -> Self {
        Self {
            address: address.into(),
            amount,
        }
    }
}

/// Transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub id: String,
    pub tx_ins: Vec<TxInput>,
    pub tx_outs: Vec<TxOutput>,
}

impl Transaction {
    /// Create a new transaction; the id is derived immediately
    pub fn new(tx_ins: Vec<TxInput>, tx_outs: Vec<TxOutput>) -> Self {
        let mut tx = Self {
            id: String::new(),
            tx_ins,
            tx_outs,
        };
        tx.id = tx.calculate_id();
        tx
    }

    /// Create a coinbase transaction paying the block reward to `receiver_address`
    pub fn coinbase(receiver_address: impl Into<String>, block_index: u64) -> Self {
        Self::new(
            vec![TxInput::coinbase(block_index)],
            vec![TxOutput::new(receiver_address, COINBASE_AMOUNT)],
        )
    }

    /// Derive the transaction id.
    ///
    /// Preimage: every input's `txOutId` followed by its `txOutIndex`, then
    /// every output's `address` followed by its `amount`. Signatures are not
    /// part of the id, which is what they sign.
    pub fn calculate_id(&self) -> String {
        let capacity = 2 * (self.tx_ins.len() + self.tx_outs.len());
        let mut parts: Vec<&dyn Display> = Vec::with_capacity(capacity);
        for input in &self.tx_ins {
            parts.push(&input.tx_out_id);
            parts.push(&input.tx_out_index);
        }
        for output in &self.tx_outs {
            parts.push(&output.address);
            parts.push(&output.amount);
        }
        hash_parts(&parts)
    }

    /// Check if this is shaped like a coinbase transaction
    pub fn is_coinbase(&self) -> bool {
        self.tx_ins.len() == 1 && self.tx_ins[0].is_coinbase()
    }

    /// Calculate total output value, `None` on overflow
    pub fn total_output_value(&self) -> Option<u64> {
        self.tx_outs
            .iter()
            .try_fold(0u64, |sum, out| sum.checked_add(out.amount))
    }

    /// Outpoints consumed by this transaction (coinbase sentinels excluded)
    pub fn spent_outpoints(&self) -> impl Iterator<Item = OutPoint> + '_ {
        self.tx_ins
            .iter()
            .filter(|input| !input.is_coinbase())
            .map(TxInput::outpoint)
    }
}

/// Unspent transaction output - the unit of spendable value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnspentTxOut {
    pub tx_out_id: String,
    pub tx_out_index: u64,
    pub address: String,
    pub amount: u64,
}

impl UnspentTxOut {
    pub fn new(tx_out_id: impl Into<String>, tx_out_index: u64, address: impl Into<String>, amount: u64) -> Self {
        Self {
            tx_out_id: tx_out_id.into(),
            tx_out_index,
            address: address.into(),
            amount,
        }
    }

    /// Tag an output with the id of its producing transaction and its position
    pub fn from_output(output: &TxOutput, tx_id: &str, index: u64) -> Self {
        Self::new(tx_id, index, output.address.clone(), output.amount)
    }

    pub fn outpoint(&self) -> OutPoint {
        OutPoint::new(self.tx_out_id.clone(), self.tx_out_index)
    }
}
