// Wallet: signed transaction construction

mod tx_builder;

pub use tx_builder::{TransactionBuilder, address_of};
