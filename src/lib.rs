//! Wallet ledger: transaction and settlement engine for custodial wallets.
//!
//! Turns transfer intents into balanced ledger entries, enforces balance and
//! lock invariants under concurrency, applies quota rewards atomically with the
//! movement, and hands bank delivery to a background settlement worker.

pub mod clock;
pub mod config;
pub mod context;
pub mod db;
pub mod error;
pub mod gateway;
pub mod handlers;
pub mod models;
pub mod services;
pub mod store;

pub use context::LedgerContext;
pub use error::AppError;
