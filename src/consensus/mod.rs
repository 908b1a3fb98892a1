// Consensus and validation logic

pub mod pow;
pub mod difficulty;
pub mod validation;

pub use pow::{Miner, MiningResult, leading_zero_bits, meets_difficulty, unix_time_now};
pub use difficulty::next_difficulty;
pub use validation::{BlockValidator, ConservationRule, TransactionValidator, ValidationError};
