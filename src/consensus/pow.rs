// Proof of Work implementation

use crate::core::{Block, Transaction};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Count leading zero bits of a hex digest; `None` if any character is not hex
pub fn leading_zero_bits(hash_hex: &str) -> Option<u32> {
    let mut zeros = 0;
    let mut counting = true;

    for c in hash_hex.chars() {
        let nibble = c.to_digit(16)? as u8;
        if !counting {
            continue;
        }
        if nibble == 0 {
            zeros += 4;
        } else {
            // A nibble sits in the low 4 bits of the byte
            zeros += nibble.leading_zeros() - 4;
            counting = false;
        }
    }

    Some(zeros)
}

/// Check that the hash has at least `difficulty` leading zero bits.
///
/// Difficulty counts bits, not hex characters: difficulty 4 means one
/// leading `0` nibble, difficulty 5 additionally needs the next nibble < 8.
pub fn meets_difficulty(hash_hex: &str, difficulty: u32) -> bool {
    leading_zero_bits(hash_hex).is_some_and(|zeros| zeros >= difficulty)
}

/// Current Unix time in seconds
pub fn unix_time_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// Proof of Work miner
///
/// The nonce search checks a shared cancel flag before every attempt, so a
/// search running on a blocking thread stops within one hash of `cancel`.
#[derive(Debug, Clone, Default)]
pub struct Miner {
    cancel: Arc<AtomicBool>,
}

impl Miner {
    /// Create a new miner with its own cancel flag
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a miner that stops when `cancel` is raised
    pub fn with_cancel_flag(cancel: Arc<AtomicBool>) -> Self {
        Self { cancel }
    }

    /// Interrupt any search running on this miner (or a clone of it)
    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::Relaxed)
    }

    /// Mine the successor of `previous` carrying `transactions`.
    ///
    /// Index, previous hash and timestamp are fixed up front; the nonce is
    /// searched upward from 0 until the hash meets `difficulty`.
    pub fn mine_block(
        &self,
        previous: &Block,
        transactions: Vec<Transaction>,
        difficulty: u32,
    ) -> MiningResult {
        let start_time = Instant::now();
        let mut template = Block {
            index: previous.index + 1,
            hash: String::new(),
            previous_hash: Some(previous.hash.clone()),
            timestamp: unix_time_now(),
            transactions,
            difficulty,
            nonce: 0,
        };
        let prefix = template.hash_prefix();
        let mut attempts = 0u64;

        for nonce in 0..=u64::MAX {
            if self.is_cancelled() {
                log::debug!("Mining of block {} cancelled after {} attempts", template.index, attempts);
                break;
            }

            let hash = Block::hash_with_nonce(&prefix, nonce);
            attempts += 1;

            if meets_difficulty(&hash, difficulty) {
                template.nonce = nonce;
                template.hash = hash;
                return MiningResult {
                    block: Some(template),
                    attempts,
                    duration: start_time.elapsed(),
                };
            }

            // Progress indicator every 100k attempts
            if attempts % 100_000 == 0 {
                let elapsed = start_time.elapsed();
                log::debug!("Mining attempts: {} ({:.1} KH/s)",
                    attempts,
                    attempts as f64 / elapsed.as_secs_f64() / 1000.0
                );
            }
        }

        MiningResult {
            block: None,
            attempts,
            duration: start_time.elapsed(),
        }
    }
}

/// Mining result
#[derive(Debug)]
pub struct MiningResult {
    /// The mined block, `None` if the search was cancelled
    pub block: Option<Block>,
    /// Number of attempts
    pub attempts: u64,
    /// Time taken
    pub duration: Duration,
}

impl MiningResult {
    /// Calculate hash rate (hashes per second)
    pub fn hash_rate(&self) -> f64 {
        self.attempts as f64 / self.duration.as_secs_f64()
    }
}
