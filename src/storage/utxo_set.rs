// UTXO (Unspent Transaction Output) set management

use crate::core::{OutPoint, Transaction, UnspentTxOut};
use std::collections::{HashMap, HashSet};

/// UTXO set - every spendable output keyed by its outpoint
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UtxoSet {
    entries: HashMap<OutPoint, UnspentTxOut>,
}

impl UtxoSet {
    /// Create an empty UTXO set
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a UTXO, returning the entry it replaced
    pub fn insert(&mut self, utxo: UnspentTxOut) -> Option<UnspentTxOut> {
        self.entries.insert(utxo.outpoint(), utxo)
    }

    /// Remove a UTXO (spent)
    pub fn remove(&mut self, outpoint: &OutPoint) -> Option<UnspentTxOut> {
        self.entries.remove(outpoint)
    }

    /// Get a UTXO
    pub fn get(&self, outpoint: &OutPoint) -> Option<&UnspentTxOut> {
        self.entries.get(outpoint)
    }

    /// Check if a UTXO exists
    pub fn contains(&self, outpoint: &OutPoint) -> bool {
        self.entries.contains_key(outpoint)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All UTXOs, ordered by outpoint
    pub fn to_vec(&self) -> Vec<UnspentTxOut> {
        let mut utxos: Vec<UnspentTxOut> = self.entries.values().cloned().collect();
        utxos.sort_by(|a, b| a.outpoint().cmp(&b.outpoint()));
        utxos
    }

    /// All UTXOs paying `address`, ordered by outpoint
    pub fn for_address(&self, address: &str) -> Vec<UnspentTxOut> {
        self.to_vec()
            .into_iter()
            .filter(|utxo| utxo.address == address)
            .collect()
    }

    /// Get balance for an address
    pub fn balance(&self, address: &str) -> u64 {
        self.entries
            .values()
            .filter(|utxo| utxo.address == address)
            .fold(0u64, |sum, utxo| sum.saturating_add(utxo.amount))
    }

    /// The UTXO set after accepting a block carrying `transactions`.
    ///
    /// Every output of every transaction becomes a new entry; every input
    /// except coinbase sentinels removes the entry it references. The input
    /// set is left untouched, so callers swap the result in as one step.
    pub fn apply_block_transactions(&self, transactions: &[Transaction]) -> UtxoSet {
        let created = transactions.iter().flat_map(|tx| {
            tx.tx_outs
                .iter()
                .enumerate()
                .map(move |(index, output)| UnspentTxOut::from_output(output, &tx.id, index as u64))
        });

        let consumed: HashSet<OutPoint> = transactions
            .iter()
            .flat_map(Transaction::spent_outpoints)
            .collect();

        let mut entries: HashMap<OutPoint, UnspentTxOut> = self
            .entries
            .iter()
            .filter(|(outpoint, _)| !consumed.contains(*outpoint))
            .map(|(outpoint, utxo)| (outpoint.clone(), utxo.clone()))
            .collect();

        for utxo in created {
            entries.insert(utxo.outpoint(), utxo);
        }

        UtxoSet { entries }
    }
}

impl FromIterator<UnspentTxOut> for UtxoSet {
    fn from_iter<I: IntoIterator<Item = UnspentTxOut>>(iter: I) -> Self {
        let mut set = UtxoSet::new();
        for utxo in iter {
            set.insert(utxo);
        }
        set
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{TxInput, TxOutput};

    fn starting_set() -> UtxoSet {
        [
            UnspentTxOut::new("aa", 0, "alice", 30),
            UnspentTxOut::new("aa", 1, "bob", 20),
            UnspentTxOut::new("bb", 0, "alice", 5),
        ]
        .into_iter()
        .collect()
    }

    fn block_transactions() -> Vec<Transaction> {
        vec![
            Transaction::coinbase("miner", 3),
            Transaction::new(
                vec![TxInput::new("aa", 0)],
                vec![TxOutput::new("carol", 10), TxOutput::new("alice", 20)],
            ),
        ]
    }

    #[test]
    fn test_add_and_get_utxo() {
        let mut utxo_set = UtxoSet::new();
        let utxo = UnspentTxOut::new("aa", 0, "alice", 5000);

        assert!(utxo_set.insert(utxo.clone()).is_none());
        assert_eq!(utxo_set.get(&OutPoint::new("aa", 0)), Some(&utxo));
        assert!(utxo_set.contains(&OutPoint::new("aa", 0)));
        assert!(!utxo_set.contains(&OutPoint::new("aa", 1)));
    }

    #[test]
    fn test_remove_utxo() {
        let mut utxo_set = starting_set();
        assert!(utxo_set.remove(&OutPoint::new("aa", 1)).is_some());
        assert!(utxo_set.remove(&OutPoint::new("aa", 1)).is_none());
        assert_eq!(utxo_set.len(), 2);
    }

    #[test]
    fn test_get_balance() {
        let utxo_set = starting_set();
        assert_eq!(utxo_set.balance("alice"), 35);
        assert_eq!(utxo_set.balance("bob"), 20);
        assert_eq!(utxo_set.balance("nobody"), 0);
        assert_eq!(utxo_set.for_address("alice").len(), 2);
    }

    #[test]
    fn test_apply_block_transactions() {
        let before = starting_set();
        let txs = block_transactions();
        let after = before.apply_block_transactions(&txs);

        assert!(!after.contains(&OutPoint::new("aa", 0)));
        assert!(after.contains(&OutPoint::new("aa", 1)));
        assert!(after.contains(&OutPoint::new("bb", 0)));
        assert_eq!(after.get(&OutPoint::new(txs[0].id.clone(), 0)).unwrap().amount, 50);
        assert_eq!(after.get(&OutPoint::new(txs[1].id.clone(), 0)).unwrap().address, "carol");
        assert_eq!(after.get(&OutPoint::new(txs[1].id.clone(), 1)).unwrap().amount, 20);
        assert_eq!(after.len(), 5);

        // The source set is untouched
        assert_eq!(before, starting_set());
    }

    #[test]
    fn test_apply_is_deterministic() {
        let txs = block_transactions();
        let first = starting_set().apply_block_transactions(&txs);
        let second = starting_set().apply_block_transactions(&txs);
        assert_eq!(first, second);
    }

    #[test]
    fn test_apply_then_reverse_restores_original() {
        let before = starting_set();
        let txs = block_transactions();
        let mut after = before.apply_block_transactions(&txs);

        for tx in &txs {
            for index in 0..tx.tx_outs.len() {
                after.remove(&OutPoint::new(tx.id.clone(), index as u64));
            }
            for outpoint in tx.spent_outpoints() {
                after.insert(before.get(&outpoint).unwrap().clone());
            }
        }

        assert_eq!(after, before);
    }

    #[test]
    fn test_coinbase_sentinel_does_not_remove_entries() {
        // An entry whose id happens to be "0" survives a coinbase input 0:3
        let mut before = starting_set();
        before.insert(UnspentTxOut::new("0", 3, "odd", 1));

        let after = before.apply_block_transactions(&[Transaction::coinbase("miner", 3)]);
        assert!(after.contains(&OutPoint::new("0", 3)));
    }

    #[test]
    fn test_to_vec_is_ordered() {
        let utxos = starting_set().to_vec();
        let outpoints: Vec<OutPoint> = utxos.iter().map(UnspentTxOut::outpoint).collect();
        assert_eq!(
            outpoints,
            vec![OutPoint::new("aa", 0), OutPoint::new("aa", 1), OutPoint::new("bb", 0)]
        );
    }
}
