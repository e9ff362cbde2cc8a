//! safe-sentinel: review pending Safe multisig transactions from the terminal.
//!
//! Pending transactions come from the Safe Transaction Service. Each one can
//! be run through two streamed AI checks, risk detection and intent matching,
//! before the signing backend is asked for its co-signature.

pub mod analysis;
pub mod app;
pub mod bootstrap;
pub mod cli;
pub mod config;
pub mod error;
pub mod metadata;
pub mod registry;
pub mod routes;
pub mod session;
pub mod settings;
pub mod signer;
pub mod ui;
pub mod units;

pub use app::App;
pub use config::Config;
pub use error::{Error, Result};
