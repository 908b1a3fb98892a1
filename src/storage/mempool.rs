// Pending transaction pool

use crate::consensus::{TransactionValidator, ValidationError};
use crate::core::{OutPoint, Transaction};
use crate::storage::UtxoSet;
use std::collections::HashSet;

/// Mempool - locally admitted transactions waiting for a block, in admission order
#[derive(Debug, Clone, Default)]
pub struct Mempool {
    transactions: Vec<Transaction>,
}

impl Mempool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Admit `tx` if it is valid against `utxo_set`, not already pooled and
    /// spends nothing a pooled transaction already spends.
    pub fn admit(
        &mut self,
        tx: Transaction,
        utxo_set: &UtxoSet,
        validator: &TransactionValidator,
    ) -> Result<(), ValidationError> {
        validator.validate_transaction(&tx, utxo_set)?;

        if self.contains(&tx.id) {
            return Err(ValidationError::DuplicateTransaction(tx.id));
        }

        let pooled = self.spent_outpoints();
        if let Some(conflict) = tx.spent_outpoints().find(|outpoint| pooled.contains(outpoint)) {
            return Err(ValidationError::MempoolDoubleSpend(conflict));
        }

        self.transactions.push(tx);
        Ok(())
    }

    /// Remove every transaction whose id is in `mined_ids`; returns how many went
    pub fn evict(&mut self, mined_ids: &[String]) -> usize {
        let mined: HashSet<&str> = mined_ids.iter().map(String::as_str).collect();
        let before = self.transactions.len();
        self.transactions.retain(|tx| !mined.contains(tx.id.as_str()));
        before - self.transactions.len()
    }

    /// Remove transactions spending outputs that are no longer unspent
    pub fn prune_spent(&mut self, utxo_set: &UtxoSet) -> usize {
        let before = self.transactions.len();
        self.transactions
            .retain(|tx| tx.spent_outpoints().all(|outpoint| utxo_set.contains(&outpoint)));
        before - self.transactions.len()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.transactions.iter().any(|tx| tx.id == id)
    }

    /// Outpoints consumed by pooled transactions
    pub fn spent_outpoints(&self) -> HashSet<OutPoint> {
        self.transactions
            .iter()
            .flat_map(Transaction::spent_outpoints)
            .collect()
    }

    pub fn transactions(&self) -> &[Transaction] {
        &self.transactions
    }

    pub fn len(&self) -> usize {
        self.transactions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{TxInput, TxOutput, UnspentTxOut};
    use secp256k1::{Message, Secp256k1, SecretKey};

    struct Fixture {
        utxo_set: UtxoSet,
        key: SecretKey,
    }

    /// Two 10-coin outputs, `cc:0` and `cc:1`, owned by one key
    fn fixture() -> Fixture {
        let secp = Secp256k1::new();
        let (key, public_key) = secp.generate_keypair(&mut rand::thread_rng());
        let address = hex::encode(public_key.serialize_uncompressed());
        let utxo_set = [
            UnspentTxOut::new("cc", 0, address.clone(), 10),
            UnspentTxOut::new("cc", 1, address, 10),
        ]
        .into_iter()
        .collect();
        Fixture { utxo_set, key }
    }

    fn spend(key: &SecretKey, index: u64, receiver: &str) -> Transaction {
        let mut tx = Transaction::new(vec![TxInput::new("cc", index)], vec![TxOutput::new(receiver, 10)]);
        let message = Message::from_digest_slice(&hex::decode(&tx.id).unwrap()).unwrap();
        let signature = Secp256k1::new().sign_ecdsa(&message, key);
        tx.tx_ins[0].signature = hex::encode(signature.serialize_der().to_vec());
        tx
    }

    #[test]
    fn test_admit_valid_transaction() {
        let f = fixture();
        let mut mempool = Mempool::new();
        let tx = spend(&f.key, 0, "04aa");

        assert_eq!(mempool.admit(tx.clone(), &f.utxo_set, &TransactionValidator::default()), Ok(()));
        assert!(mempool.contains(&tx.id));
        assert_eq!(mempool.len(), 1);
    }

    #[test]
    fn test_admit_rejects_invalid_transaction() {
        let f = fixture();
        let mut mempool = Mempool::new();
        let mut tx = spend(&f.key, 0, "04aa");
        tx.tx_ins[0].signature.clear();

        assert!(mempool.admit(tx, &f.utxo_set, &TransactionValidator::default()).is_err());
        assert!(mempool.is_empty());
    }

    #[test]
    fn test_admit_rejects_duplicate() {
        let f = fixture();
        let validator = TransactionValidator::default();
        let mut mempool = Mempool::new();
        let tx = spend(&f.key, 0, "04aa");

        mempool.admit(tx.clone(), &f.utxo_set, &validator).unwrap();
        assert_eq!(
            mempool.admit(tx.clone(), &f.utxo_set, &validator),
            Err(ValidationError::DuplicateTransaction(tx.id))
        );
    }

    #[test]
    fn test_double_spend_then_non_conflicting_input() {
        let f = fixture();
        let validator = TransactionValidator::default();
        let mut mempool = Mempool::new();

        mempool.admit(spend(&f.key, 0, "04aa"), &f.utxo_set, &validator).unwrap();

        // Same input, different receiver: conflicts with the pooled spend
        assert_eq!(
            mempool.admit(spend(&f.key, 0, "04bb"), &f.utxo_set, &validator),
            Err(ValidationError::MempoolDoubleSpend(OutPoint::new("cc", 0)))
        );

        // Different, unspent input: accepted
        assert_eq!(mempool.admit(spend(&f.key, 1, "04bb"), &f.utxo_set, &validator), Ok(()));
        assert_eq!(mempool.len(), 2);
    }

    #[test]
    fn test_evict_mined_transactions() {
        let f = fixture();
        let validator = TransactionValidator::default();
        let mut mempool = Mempool::new();
        let first = spend(&f.key, 0, "04aa");
        let second = spend(&f.key, 1, "04aa");
        mempool.admit(first.clone(), &f.utxo_set, &validator).unwrap();
        mempool.admit(second.clone(), &f.utxo_set, &validator).unwrap();

        assert_eq!(mempool.evict(&[first.id.clone(), "unrelated".to_string()]), 1);
        assert!(!mempool.contains(&first.id));
        assert!(mempool.contains(&second.id));
    }

    #[test]
    fn test_prune_spent() {
        let f = fixture();
        let mut mempool = Mempool::new();
        let tx = spend(&f.key, 0, "04aa");
        mempool.admit(tx, &f.utxo_set, &TransactionValidator::default()).unwrap();

        let mut spent_elsewhere = f.utxo_set.clone();
        spent_elsewhere.remove(&OutPoint::new("cc", 0));

        assert_eq!(mempool.prune_spent(&f.utxo_set), 0);
        assert_eq!(mempool.prune_spent(&spent_elsewhere), 1);
        assert!(mempool.is_empty());
    }
}
