//! Transaction registry: pending multisig transactions and their details.

mod client;
mod models;

pub use client::RegistryClient;
pub use models::{DataDecoded, Transaction, TransactionPage, pending_only};
