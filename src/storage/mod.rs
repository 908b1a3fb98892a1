// Ledger state: chain, UTXO set and mempool

mod chain;
mod mempool;
mod utxo_set;

pub use chain::Chain;
pub use mempool::Mempool;
pub use utxo_set::UtxoSet;

use crate::consensus::{BlockValidator, ConservationRule, ValidationError};
use crate::core::{Block, Transaction};

/// Everything needed to mine the next block
#[derive(Debug, Clone)]
pub struct BlockTemplate {
    /// Current tip, which the new block extends
    pub previous: Block,
    /// Coinbase followed by a snapshot of the mempool
    pub transactions: Vec<Transaction>,
    pub difficulty: u32,
}

/// Ledger - the node's chain, UTXO set and mempool.
///
/// Each mutating method runs validate, apply and evict as one step; the
/// caller holds the single write lock around it so no two acceptances
/// interleave.
#[derive(Debug, Clone, Default)]
pub struct Ledger {
    chain: Chain,
    utxo_set: UtxoSet,
    mempool: Mempool,
    validator: BlockValidator,
}

impl Ledger {
    /// Create a ledger holding only genesis
    pub fn new(rule: ConservationRule) -> Self {
        Self {
            chain: Chain::new(),
            utxo_set: UtxoSet::new(),
            mempool: Mempool::new(),
            validator: BlockValidator::new(rule),
        }
    }

    pub fn chain(&self) -> &Chain {
        &self.chain
    }

    pub fn utxo_set(&self) -> &UtxoSet {
        &self.utxo_set
    }

    pub fn mempool(&self) -> &Mempool {
        &self.mempool
    }

    pub fn validator(&self) -> &BlockValidator {
        &self.validator
    }

    /// Accept `block` as the next block of the chain.
    ///
    /// On success the UTXO set is replaced by its successor, mined and
    /// now-unspendable transactions leave the mempool and the block is
    /// appended. On failure nothing changes.
    pub fn accept_block(&mut self, block: Block) -> Result<(), ValidationError> {
        self.validator
            .validate_chain_extension(self.chain.blocks(), &block, &self.utxo_set)?;

        self.utxo_set = self.utxo_set.apply_block_transactions(&block.transactions);

        let evicted = self.mempool.evict(&block.transaction_ids());
        let pruned = self.mempool.prune_spent(&self.utxo_set);
        if evicted + pruned > 0 {
            log::debug!("Mempool: {} mined, {} no longer spendable", evicted, pruned);
        }

        log::info!(
            "Accepted block {} ({} transactions, hash {})",
            block.index,
            block.transactions.len(),
            block.hash
        );
        self.chain.append(block);
        Ok(())
    }

    /// Accept a block mined locally from a template.
    ///
    /// The search ran without the lock, so the tip may have moved since the
    /// template was taken; such a block is stale and discarded.
    pub fn accept_mined_block(&mut self, block: Block) -> Result<(), ValidationError> {
        if block.previous_hash.as_deref() != Some(self.chain.tip().hash.as_str()) {
            return Err(ValidationError::StaleBlock { index: block.index });
        }
        self.accept_block(block)
    }

    /// Admit a transaction to the mempool
    pub fn admit_transaction(&mut self, tx: Transaction) -> Result<(), ValidationError> {
        let id = tx.id.clone();
        self.mempool
            .admit(tx, &self.utxo_set, self.validator.transaction_validator())?;
        log::info!("Admitted transaction {} ({} pending)", id, self.mempool.len());
        Ok(())
    }

    /// Coinbase to `miner_address` plus the current mempool, on top of the tip
    pub fn block_template(&self, miner_address: &str) -> BlockTemplate {
        let previous = self.chain.tip().clone();
        let mut transactions = vec![Transaction::coinbase(miner_address, previous.index + 1)];
        transactions.extend(self.mempool.transactions().iter().cloned());

        BlockTemplate {
            difficulty: self.chain.next_difficulty(),
            previous,
            transactions,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consensus::Miner;
    use crate::core::{COINBASE_AMOUNT, TxInput, TxOutput};
    use secp256k1::{Message, PublicKey, Secp256k1, SecretKey};

    fn keypair() -> (SecretKey, String) {
        let (key, public_key): (SecretKey, PublicKey) =
            Secp256k1::new().generate_keypair(&mut rand::thread_rng());
        (key, hex::encode(public_key.serialize_uncompressed()))
    }

    fn mine(ledger: &Ledger, miner_address: &str) -> Block {
        let template = ledger.block_template(miner_address);
        Miner::new()
            .mine_block(&template.previous, template.transactions, template.difficulty)
            .block
            .unwrap()
    }

    fn pay(ledger: &Ledger, key: &SecretKey, from: &str, to: &str) -> Transaction {
        let utxo = ledger.utxo_set().for_address(from).remove(0);
        let mut tx = Transaction::new(
            vec![TxInput::new(utxo.tx_out_id, utxo.tx_out_index)],
            vec![TxOutput::new(to, utxo.amount)],
        );
        let message = Message::from_digest_slice(&hex::decode(&tx.id).unwrap()).unwrap();
        tx.tx_ins[0].signature = hex::encode(Secp256k1::new().sign_ecdsa(&message, key).serialize_der().to_vec());
        tx
    }

    #[test]
    fn test_mine_and_accept_block() {
        let mut ledger = Ledger::default();
        let block = mine(&ledger, "04aa");

        ledger.accept_block(block.clone()).unwrap();
        assert_eq!(ledger.chain().len(), 2);
        assert_eq!(ledger.chain().tip(), &block);
        assert_eq!(ledger.utxo_set().len(), 1);
        assert_eq!(ledger.utxo_set().balance("04aa"), COINBASE_AMOUNT);
    }

    #[test]
    fn test_rejected_block_changes_nothing() {
        let mut ledger = Ledger::default();
        let mut block = mine(&ledger, "04aa");
        block.nonce += 1;

        assert!(ledger.accept_block(block).is_err());
        assert_eq!(ledger.chain().len(), 1);
        assert!(ledger.utxo_set().is_empty());
    }

    #[test]
    fn test_block_evicts_mined_transactions() {
        let (key, alice) = keypair();
        let mut ledger = Ledger::default();
        let funding = mine(&ledger, &alice);
        ledger.accept_block(funding).unwrap();

        let tx = pay(&ledger, &key, &alice, "04bb");
        ledger.admit_transaction(tx.clone()).unwrap();
        assert_eq!(ledger.mempool().len(), 1);

        let template = ledger.block_template("04cc");
        assert_eq!(template.transactions.len(), 2);
        assert_eq!(template.transactions[1], tx);

        let block = mine(&ledger, "04cc");
        ledger.accept_block(block).unwrap();
        assert!(ledger.mempool().is_empty());
        assert_eq!(ledger.utxo_set().balance(&alice), 0);
        assert_eq!(ledger.utxo_set().balance("04bb"), COINBASE_AMOUNT);
        assert_eq!(ledger.utxo_set().balance("04cc"), COINBASE_AMOUNT);
    }

    #[test]
    fn test_block_from_peer_prunes_conflicting_mempool_entry() {
        let (key, alice) = keypair();
        let mut ledger = Ledger::default();
        ledger.accept_block(mine(&ledger, &alice)).unwrap();

        // A peer mines a block spending alice's coin one way...
        let mut peer = ledger.clone();
        peer.admit_transaction(pay(&peer, &key, &alice, "04bb")).unwrap();
        let peer_block = mine(&peer, "04dd");

        // ...while our mempool holds a different spend of the same coin
        ledger.admit_transaction(pay(&ledger, &key, &alice, "04cc")).unwrap();
        ledger.accept_block(peer_block).unwrap();

        assert!(ledger.mempool().is_empty());
        assert_eq!(ledger.utxo_set().balance("04bb"), COINBASE_AMOUNT);
    }

    #[test]
    fn test_stale_mined_block() {
        let mut ledger = Ledger::default();
        let first = mine(&ledger, "04aa");
        let competing = mine(&ledger, "04bb");

        ledger.accept_mined_block(first).unwrap();
        assert_eq!(
            ledger.accept_mined_block(competing),
            Err(ValidationError::StaleBlock { index: 1 })
        );
        assert_eq!(ledger.chain().len(), 2);
    }
}
