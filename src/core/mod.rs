// Core ledger data structures

mod types;
mod hash;
mod transaction;
mod block;

pub use types::*;
pub use hash::*;
pub use transaction::*;
pub use block::*;
