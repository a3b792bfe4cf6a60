//! Business logic services.
//!
//! Services contain the ledger's business logic, separated from HTTP handlers.
//! They open units of work, validate, and sequence multi-leg operations.

pub mod payment_plan_service;
pub mod quota_service;
pub mod registry;
pub mod settlement_worker;
pub mod transaction_service;
pub mod transfer_service;
pub mod wallet_service;
