// Transaction builder

use crate::core::{OutPoint, Transaction, TxInput, TxOutput, UnspentTxOut};
use crate::storage::UtxoSet;
use secp256k1::{Message, PublicKey, Secp256k1, SecretKey};
use std::collections::HashSet;

/// Address owned by `key`: hex of its uncompressed SEC1 public key
pub fn address_of(key: &SecretKey) -> String {
    let secp = Secp256k1::signing_only();
    hex::encode(PublicKey::from_secret_key(&secp, key).serialize_uncompressed())
}

/// Transaction builder
///
/// Spends the sender's outputs from a UTXO set snapshot, skipping any
/// outpoint marked as already spent (e.g. by pending mempool transactions).
pub struct TransactionBuilder<'a> {
    utxo_set: &'a UtxoSet,
    excluded: HashSet<OutPoint>,
}

impl<'a> TransactionBuilder<'a> {
    /// Create a new transaction builder
    pub fn new(utxo_set: &'a UtxoSet) -> Self {
        Self {
            utxo_set,
            excluded: HashSet::new(),
        }
    }

    /// Never select these outpoints
    pub fn exclude(mut self, outpoints: impl IntoIterator<Item = OutPoint>) -> Self {
        self.excluded.extend(outpoints);
        self
    }

    /// Build a signed transaction sending `amount` from `key`'s address to `to`.
    ///
    /// Any surplus of the selected inputs returns to the sender as change.
    pub fn build(&self, key: &SecretKey, to: &str, amount: u64) -> Result<Transaction, String> {
        if amount == 0 {
            return Err("Amount must be positive".to_string());
        }

        let from = address_of(key);
        let (selected, total_input) = self.select_utxos(&from, amount)?;

        let inputs: Vec<TxInput> = selected
            .iter()
            .map(|utxo| TxInput::new(utxo.tx_out_id.clone(), utxo.tx_out_index))
            .collect();

        let mut outputs = vec![TxOutput::new(to, amount)];
        let change = total_input - amount;
        if change > 0 {
            outputs.push(TxOutput::new(from, change));
        }

        let mut tx = Transaction::new(inputs, outputs);
        Self::sign_transaction(&mut tx, key)?;

        log::debug!(
            "Built transaction {} ({} inputs, {} to {}, change {})",
            tx.id,
            tx.tx_ins.len(),
            amount,
            to,
            change
        );
        Ok(tx)
    }

    /// Select the sender's outputs, smallest first, until `target` is covered
    fn select_utxos(&self, from: &str, target: u64) -> Result<(Vec<UnspentTxOut>, u64), String> {
        let mut candidates: Vec<UnspentTxOut> = self
            .utxo_set
            .for_address(from)
            .into_iter()
            .filter(|utxo| !self.excluded.contains(&utxo.outpoint()))
            .collect();
        candidates.sort_by_key(|utxo| utxo.amount);

        let mut selected = Vec::new();
        let mut total = 0u64;

        for utxo in candidates {
            total = total.saturating_add(utxo.amount);
            selected.push(utxo);

            if total >= target {
                return Ok((selected, total));
            }
        }

        Err(format!("Insufficient funds: required {}, available {}", target, total))
    }

    /// Sign every input over the transaction id
    pub fn sign_transaction(tx: &mut Transaction, key: &SecretKey) -> Result<(), String> {
        let secp = Secp256k1::signing_only();
        let digest = hex::decode(&tx.id).map_err(|e| format!("Invalid transaction id: {}", e))?;
        let message = Message::from_digest_slice(&digest)
            .map_err(|e| format!("Invalid message: {}", e))?;

        let signature = hex::encode(secp.sign_ecdsa(&message, key).serialize_der().to_vec());
        for input in &mut tx.tx_ins {
            input.signature = signature.clone();
        }

        Ok(())
    }

    /// Spendable balance of `address`, excluding marked outpoints
    pub fn balance(&self, address: &str) -> u64 {
        self.utxo_set
            .for_address(address)
            .iter()
            .filter(|utxo| !self.excluded.contains(&utxo.outpoint()))
            .fold(0u64, |sum, utxo| sum.saturating_add(utxo.amount))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consensus::TransactionValidator;

    fn key() -> SecretKey {
        SecretKey::new(&mut rand::thread_rng())
    }

    fn funded(key: &SecretKey, amounts: &[u64]) -> UtxoSet {
        let address = address_of(key);
        amounts
            .iter()
            .enumerate()
            .map(|(i, amount)| UnspentTxOut::new(format!("{:02x}", i), 0, address.clone(), *amount))
            .collect()
    }

    #[test]
    fn test_transaction_builder() {
        let key = key();
        let utxo_set = funded(&key, &[100]);

        let tx = TransactionBuilder::new(&utxo_set).build(&key, "04bb", 40).unwrap();

        assert_eq!(tx.tx_ins.len(), 1);
        assert_eq!(tx.tx_outs.len(), 2); // Payment + change
        assert_eq!(tx.tx_outs[0], TxOutput::new("04bb", 40));
        assert_eq!(tx.tx_outs[1], TxOutput::new(address_of(&key), 60));
        assert_eq!(TransactionValidator::default().validate_transaction(&tx, &utxo_set), Ok(()));
    }

    #[test]
    fn test_exact_amount_has_no_change() {
        let key = key();
        let utxo_set = funded(&key, &[30, 20]);

        let tx = TransactionBuilder::new(&utxo_set).build(&key, "04bb", 50).unwrap();
        assert_eq!(tx.tx_ins.len(), 2);
        assert_eq!(tx.tx_outs, vec![TxOutput::new("04bb", 50)]);
        assert!(TransactionValidator::default().is_valid_transaction(&tx, &utxo_set));
    }

    #[test]
    fn test_selects_smallest_first() {
        let key = key();
        let utxo_set = funded(&key, &[50, 5, 10]);

        let tx = TransactionBuilder::new(&utxo_set).build(&key, "04bb", 12).unwrap();
        let spent: Vec<u64> = tx
            .tx_ins
            .iter()
            .map(|input| utxo_set.get(&input.outpoint()).unwrap().amount)
            .collect();
        assert_eq!(spent, vec![5, 10]);
        assert_eq!(tx.tx_outs[1].amount, 3);
    }

    #[test]
    fn test_insufficient_funds() {
        let key = key();
        let utxo_set = funded(&key, &[10, 5]);

        let result = TransactionBuilder::new(&utxo_set).build(&key, "04bb", 16);
        assert_eq!(result, Err("Insufficient funds: required 16, available 15".to_string()));
    }

    #[test]
    fn test_excluded_outpoints_are_not_spent() {
        let key = key();
        let utxo_set = funded(&key, &[10, 20]);
        let builder = TransactionBuilder::new(&utxo_set).exclude([OutPoint::new("00", 0)]);

        assert_eq!(builder.balance(&address_of(&key)), 20);
        let tx = builder.build(&key, "04bb", 20).unwrap();
        assert_eq!(tx.tx_ins[0].outpoint(), OutPoint::new("01", 0));
        assert!(builder.build(&key, "04bb", 25).is_err());
    }

    #[test]
    fn test_zero_amount_rejected() {
        let key = key();
        let utxo_set = funded(&key, &[10]);
        assert!(TransactionBuilder::new(&utxo_set).build(&key, "04bb", 0).is_err());
    }
}
