//! Data models representing database entities.
//!
//! This module contains all data structures that map to database tables,
//! plus the request/response bodies built from them.

/// Banks and registered beneficiary accounts
pub mod bank;
/// Outbound gateway audit log
pub mod external_log;
/// Payment intents
pub mod payment;
/// Repayment plans and instalments
pub mod payment_plan;
/// Reward quotas
pub mod quota;
/// Settlement jobs
pub mod settlement;
/// Ledger transactions
pub mod transaction;
/// Custodial wallets
pub mod wallet;

/// A stored code did not match any known variant.
#[derive(Debug, thiserror::Error)]
#[error("unknown {kind} value: {value}")]
pub struct UnknownVariant {
    kind: &'static str,
    value: String,
}

impl UnknownVariant {
    pub fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}
