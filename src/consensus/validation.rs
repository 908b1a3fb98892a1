// Transaction and block validation

use crate::consensus::pow::meets_difficulty;
use crate::core::{Block, COINBASE_AMOUNT, OutPoint, Transaction};
use crate::storage::UtxoSet;
use secp256k1::{Message, PublicKey, Secp256k1, VerifyOnly, ecdsa::Signature};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

/// Validation error types
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Block hash is not digest-shaped or previous hash is missing
    InvalidStructure,
    /// Block index is not the successor of the tip
    InvalidIndex { expected: u64, actual: u64 },
    /// Block does not link to the tip
    InvalidPreviousHash { expected: String, actual: Option<String> },
    /// Stored block hash differs from the recomputed one
    InvalidHash { expected: String, actual: String },
    /// Block hash doesn't have enough leading zero bits
    InvalidProofOfWork { difficulty: u32 },
    /// Block has no transactions (not even a coinbase)
    NoTransactions,
    /// First transaction is not a well-formed coinbase
    InvalidCoinbase(String),
    /// The same outpoint is spent twice inside one block
    DoubleSpendInBlock(OutPoint),
    /// A transaction inside a block failed validation
    InvalidTransaction { tx_id: String, reason: Box<ValidationError> },
    /// Transaction id doesn't match its contents
    InvalidTransactionId { expected: String, actual: String },
    /// Non-coinbase transaction without inputs
    EmptyTransaction,
    /// Input references an output that is not in the UTXO set
    UnknownInput(OutPoint),
    /// Input signature doesn't verify against the spent output's address
    InvalidSignature(OutPoint),
    /// Input or output amounts overflow
    ValueOverflow,
    /// Inputs and outputs violate the conservation rule
    ValueMismatch { inputs: u64, outputs: u64 },
    /// Transaction is already in the mempool
    DuplicateTransaction(String),
    /// Transaction spends an outpoint already spent by a mempool transaction
    MempoolDoubleSpend(OutPoint),
    /// Block no longer extends the current tip
    StaleBlock { index: u64 },
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ValidationError::InvalidStructure => write!(f, "Invalid block structure"),
            ValidationError::InvalidIndex { expected, actual } => {
                write!(f, "Invalid index: expected {}, got {}", expected, actual)
            }
            ValidationError::InvalidPreviousHash { expected, actual } => write!(
                f,
                "Invalid previous hash: expected {}, got {}",
                expected,
                actual.as_deref().unwrap_or("null")
            ),
            ValidationError::InvalidHash { expected, actual } => {
                write!(f, "Incorrect hash: computed {}, block carries {}", expected, actual)
            }
            ValidationError::InvalidProofOfWork { difficulty } => {
                write!(f, "Hash does not meet difficulty {}", difficulty)
            }
            ValidationError::NoTransactions => write!(f, "Block has no transactions"),
            ValidationError::InvalidCoinbase(reason) => write!(f, "Invalid coinbase: {}", reason),
            ValidationError::DoubleSpendInBlock(outpoint) => {
                write!(f, "Double spend of {} inside block", outpoint)
            }
            ValidationError::InvalidTransaction { tx_id, reason } => {
                write!(f, "Invalid transaction {}: {}", tx_id, reason)
            }
            ValidationError::InvalidTransactionId { expected, actual } => {
                write!(f, "Invalid transaction id: computed {}, got {}", expected, actual)
            }
            ValidationError::EmptyTransaction => write!(f, "Transaction has no inputs"),
            ValidationError::UnknownInput(outpoint) => write!(f, "No unspent output {}", outpoint),
            ValidationError::InvalidSignature(outpoint) => {
                write!(f, "Invalid signature for input {}", outpoint)
            }
            ValidationError::ValueOverflow => write!(f, "Amount overflow"),
            ValidationError::ValueMismatch { inputs, outputs } => {
                write!(f, "Inputs total {} but outputs total {}", inputs, outputs)
            }
            ValidationError::DuplicateTransaction(id) => {
                write!(f, "Transaction {} already in mempool", id)
            }
            ValidationError::MempoolDoubleSpend(outpoint) => {
                write!(f, "Output {} already spent by a mempool transaction", outpoint)
            }
            ValidationError::StaleBlock { index } => {
                write!(f, "Block {} no longer extends the chain tip", index)
            }
        }
    }
}

impl std::error::Error for ValidationError {}

/// How input value must relate to output value in a regular transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConservationRule {
    /// Inputs must equal outputs
    #[default]
    Exact,
    /// Inputs must be at least the outputs; any surplus is dropped
    Covering,
}

impl ConservationRule {
    pub fn allows(&self, inputs: u64, outputs: u64) -> bool {
        match self {
            ConservationRule::Exact => inputs == outputs,
            ConservationRule::Covering => inputs >= outputs,
        }
    }
}

impl FromStr for ConservationRule {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "exact" => Ok(ConservationRule::Exact),
            "covering" => Ok(ConservationRule::Covering),
            other => Err(format!("Unknown conservation rule: {} (expected exact or covering)", other)),
        }
    }
}

impl fmt::Display for ConservationRule {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ConservationRule::Exact => write!(f, "exact"),
            ConservationRule::Covering => write!(f, "covering"),
        }
    }
}

/// Verify a hex DER ECDSA signature over the 32 bytes of `message_hex`
/// with the hex SEC1 public key `address`.
pub fn verify_signature(
    secp: &Secp256k1<VerifyOnly>,
    address: &str,
    message_hex: &str,
    signature_hex: &str,
) -> bool {
    let Ok(pubkey_bytes) = hex::decode(address) else {
        return false;
    };
    let Ok(public_key) = PublicKey::from_slice(&pubkey_bytes) else {
        return false;
    };
    let Ok(digest) = hex::decode(message_hex) else {
        return false;
    };
    let Ok(message) = Message::from_digest_slice(&digest) else {
        return false;
    };
    let Ok(sig_bytes) = hex::decode(signature_hex) else {
        return false;
    };
    let Ok(mut signature) = Signature::from_der(&sig_bytes) else {
        return false;
    };
    // libsecp256k1 only accepts low-S; other signers don't always produce it
    signature.normalize_s();

    secp.verify_ecdsa(&message, &signature, &public_key).is_ok()
}

/// Transaction validator
#[derive(Debug, Clone)]
pub struct TransactionValidator {
    rule: ConservationRule,
    secp: Secp256k1<VerifyOnly>,
}

impl Default for TransactionValidator {
    fn default() -> Self {
        Self::new(ConservationRule::default())
    }
}

impl TransactionValidator {
    pub fn new(rule: ConservationRule) -> Self {
        Self {
            rule,
            secp: Secp256k1::verification_only(),
        }
    }

    pub fn conservation_rule(&self) -> ConservationRule {
        self.rule
    }

    /// Validate a regular (non-coinbase) transaction against `utxo_set`:
    /// id, input resolution and signatures, then value conservation.
    pub fn validate_transaction(&self, tx: &Transaction, utxo_set: &UtxoSet) -> Result<(), ValidationError> {
        let expected_id = tx.calculate_id();
        if expected_id != tx.id {
            return Err(ValidationError::InvalidTransactionId {
                expected: expected_id,
                actual: tx.id.clone(),
            });
        }

        if tx.tx_ins.is_empty() {
            return Err(ValidationError::EmptyTransaction);
        }

        let mut total_input = 0u64;
        for input in &tx.tx_ins {
            let outpoint = input.outpoint();
            let utxo = utxo_set
                .get(&outpoint)
                .ok_or_else(|| ValidationError::UnknownInput(outpoint.clone()))?;

            if !verify_signature(&self.secp, &utxo.address, &tx.id, &input.signature) {
                return Err(ValidationError::InvalidSignature(outpoint));
            }

            total_input = total_input
                .checked_add(utxo.amount)
                .ok_or(ValidationError::ValueOverflow)?;
        }

        let total_output = tx.total_output_value().ok_or(ValidationError::ValueOverflow)?;
        if !self.rule.allows(total_input, total_output) {
            return Err(ValidationError::ValueMismatch {
                inputs: total_input,
                outputs: total_output,
            });
        }

        Ok(())
    }

    pub fn is_valid_transaction(&self, tx: &Transaction, utxo_set: &UtxoSet) -> bool {
        match self.validate_transaction(tx, utxo_set) {
            Ok(()) => true,
            Err(e) => {
                log::warn!("Rejected transaction {}: {}", tx.id, e);
                false
            }
        }
    }

    /// Validate the coinbase shape: one sentinel input carrying the block
    /// index, one output paying exactly the block reward.
    pub fn validate_coinbase(tx: &Transaction, block_index: u64) -> Result<(), ValidationError> {
        let expected_id = tx.calculate_id();
        if expected_id != tx.id {
            return Err(ValidationError::InvalidTransactionId {
                expected: expected_id,
                actual: tx.id.clone(),
            });
        }
        if tx.tx_ins.len() != 1 {
            return Err(ValidationError::InvalidCoinbase(format!(
                "expected 1 input, got {}",
                tx.tx_ins.len()
            )));
        }
        let input = &tx.tx_ins[0];
        if !input.is_coinbase() || input.tx_out_index != block_index {
            return Err(ValidationError::InvalidCoinbase(format!(
                "input must be 0:{}, got {}",
                block_index,
                input.outpoint()
            )));
        }
        if tx.tx_outs.len() != 1 {
            return Err(ValidationError::InvalidCoinbase(format!(
                "expected 1 output, got {}",
                tx.tx_outs.len()
            )));
        }
        if tx.tx_outs[0].amount != COINBASE_AMOUNT {
            return Err(ValidationError::InvalidCoinbase(format!(
                "reward must be {}, got {}",
                COINBASE_AMOUNT, tx.tx_outs[0].amount
            )));
        }
        Ok(())
    }

    pub fn is_valid_coinbase(tx: &Transaction, block_index: u64) -> bool {
        Self::validate_coinbase(tx, block_index).is_ok()
    }

    /// Validate the transaction list of block `block_index`: coinbase
    /// first, no outpoint spent twice, every other transaction valid on
    /// its own against `utxo_set`.
    pub fn validate_block_transactions(
        &self,
        transactions: &[Transaction],
        utxo_set: &UtxoSet,
        block_index: u64,
    ) -> Result<(), ValidationError> {
        let Some(coinbase) = transactions.first() else {
            return Err(ValidationError::NoTransactions);
        };
        Self::validate_coinbase(coinbase, block_index)?;

        let mut spent = HashSet::new();
        for outpoint in transactions.iter().flat_map(Transaction::spent_outpoints) {
            if !spent.insert(outpoint.clone()) {
                return Err(ValidationError::DoubleSpendInBlock(outpoint));
            }
        }

        for tx in &transactions[1..] {
            self.validate_transaction(tx, utxo_set)
                .map_err(|reason| ValidationError::InvalidTransaction {
                    tx_id: tx.id.clone(),
                    reason: Box::new(reason),
                })?;
        }

        Ok(())
    }
}

/// Block validator
#[derive(Debug, Clone, Default)]
pub struct BlockValidator {
    transactions: TransactionValidator,
}

impl BlockValidator {
    /// Create a new block validator
    pub fn new(rule: ConservationRule) -> Self {
        Self {
            transactions: TransactionValidator::new(rule),
        }
    }

    pub fn transaction_validator(&self) -> &TransactionValidator {
        &self.transactions
    }

    /// Validate `candidate` as the successor of `previous`.
    ///
    /// Checks run in order and stop at the first failure: structure, index,
    /// linkage, hash and proof of work, then the transactions.
    pub fn validate_block(
        &self,
        candidate: &Block,
        previous: &Block,
        utxo_set: &UtxoSet,
    ) -> Result<(), ValidationError> {
        if !candidate.has_valid_structure() {
            return Err(ValidationError::InvalidStructure);
        }

        if candidate.index != previous.index + 1 {
            return Err(ValidationError::InvalidIndex {
                expected: previous.index + 1,
                actual: candidate.index,
            });
        }

        if candidate.previous_hash.as_deref() != Some(previous.hash.as_str()) {
            return Err(ValidationError::InvalidPreviousHash {
                expected: previous.hash.clone(),
                actual: candidate.previous_hash.clone(),
            });
        }

        let computed = candidate.calculate_hash();
        if computed != candidate.hash {
            return Err(ValidationError::InvalidHash {
                expected: computed,
                actual: candidate.hash.clone(),
            });
        }

        if !meets_difficulty(&candidate.hash, candidate.difficulty) {
            return Err(ValidationError::InvalidProofOfWork {
                difficulty: candidate.difficulty,
            });
        }

        self.transactions
            .validate_block_transactions(&candidate.transactions, utxo_set, candidate.index)
    }

    pub fn is_valid_block(&self, candidate: &Block, previous: &Block, utxo_set: &UtxoSet) -> bool {
        match self.validate_block(candidate, previous, utxo_set) {
            Ok(()) => true,
            Err(e) => {
                log::warn!("Rejected block {}: {}", candidate.index, e);
                false
            }
        }
    }

    /// Validate `candidate` as a one-block extension of `chain`'s tip
    pub fn validate_chain_extension(
        &self,
        chain: &[Block],
        candidate: &Block,
        utxo_set: &UtxoSet,
    ) -> Result<(), ValidationError> {
        let tip = chain.last().ok_or(ValidationError::StaleBlock { index: candidate.index })?;
        self.validate_block(candidate, tip, utxo_set)
    }
}
