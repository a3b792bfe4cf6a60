//! Transaction data models and API request/response types.
//!
//! This module defines:
//! - `Transaction`: Database entity, the ledger-visible effect of one payment on one wallet
//! - Request types for internal transfers, external transfers and bank credits
//! - `TransactionView`: Response body for history and lookups

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::payment::{Payment, PaymentStatus};

/// Represents a transaction record from the database.
///
/// # Database Table
///
/// Maps to the `transactions` table. Each transaction:
/// - Belongs to exactly one payment (`payment_id` is UNIQUE)
/// - Touches exactly one wallet
/// - Stores a signed amount (positive credits, negative debits)
/// - Optionally points at the transaction it was chained from (fee, cashback, refund)
///
/// Rows are never updated after insert.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow, Serialize)]
pub struct Transaction {
    pub id: Uuid,

    pub payment_id: Uuid,

    pub wallet_id: Uuid,

    /// Signed amount in minor units
    pub amount: i64,

    /// Transaction type code from the `transaction_types` dictionary (e.g. "TRANSFER")
    pub transaction_type: String,

    pub notes: Option<String>,

    /// Transaction this one was chained from
    pub parent_id: Option<Uuid>,

    pub created_at: DateTime<Utc>,
}

impl Transaction {
    pub fn is_credit(&self) -> bool {
        self.amount > 0
    }
}

/// Request to move money between two wallets.
///
/// # JSON Example
///
/// ```json
/// {
///   "source": "550e8400-e29b-41d4-a716-446655440000",
///   "destination": "660e8400-e29b-41d4-a716-446655440001",
///   "amount": 1500,
///   "pin": "123456",
///   "notes": "Dinner",
///   "flag": "TRANSFER"
/// }
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct InternalTransferRequest {
    pub source: Uuid,
    pub destination: Uuid,
    pub amount: i64,
    pub pin: String,
    pub notes: Option<String>,
    #[serde(default = "default_internal_flag")]
    pub flag: String,
}

fn default_internal_flag() -> String {
    "TRANSFER".to_string()
}

/// Request to send money from a wallet to a registered bank account.
///
/// # JSON Example
///
/// ```json
/// {
///   "source": "550e8400-e29b-41d4-a716-446655440000",
///   "bank_account_id": "770e8400-e29b-41d4-a716-446655440002",
///   "amount": 10000,
///   "pin": "123456",
///   "flag": "BANK_TRANSFER"
/// }
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct ExternalTransferRequest {
    pub source: Uuid,
    pub bank_account_id: Uuid,
    pub amount: i64,
    pub pin: String,
    pub notes: Option<String>,
    #[serde(default = "default_external_flag")]
    pub flag: String,
}

fn default_external_flag() -> String {
    "BANK_TRANSFER".to_string()
}

/// Bank-originated credit (virtual account deposit, payroll from an employer bank).
///
/// `ref_number` is the bank's reference and makes the callback idempotent.
#[derive(Debug, Clone, Deserialize)]
pub struct BankCreditRequest {
    pub wallet_id: Uuid,
    pub amount: i64,
    pub flag: String,
    pub source_account: String,
    pub channel_id: Option<String>,
    pub ref_number: String,
    pub notes: Option<String>,
}

/// Which side of the ledger a history query returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    #[default]
    All,
    In,
    Out,
}

impl Direction {
    pub fn includes(&self, transaction: &Transaction) -> bool {
        match self {
            Direction::All => true,
            Direction::In => transaction.amount > 0,
            Direction::Out => transaction.amount < 0,
        }
    }
}

/// Query string for wallet history.
#[derive(Debug, Clone, Deserialize)]
pub struct HistoryQuery {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
    #[serde(default)]
    pub direction: Direction,
}

/// Caller-visible view of a ledger entry.
#[derive(Debug, Clone, Serialize)]
pub struct TransactionView {
    pub id: Uuid,
    pub wallet_id: Uuid,
    pub transaction_type: String,
    pub amount: i64,
    pub notes: Option<String>,
    pub parent_id: Option<Uuid>,
    pub source_account: String,
    pub destination: String,
    pub status: PaymentStatus,
    pub bank_ref: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl TransactionView {
    pub fn new(transaction: Transaction, payment: &Payment) -> Self {
        Self {
            id: transaction.id,
            wallet_id: transaction.wallet_id,
            transaction_type: transaction.transaction_type,
            amount: transaction.amount,
            notes: transaction.notes,
            parent_id: transaction.parent_id,
            source_account: payment.source_account.clone(),
            destination: payment.destination.clone(),
            status: payment.status,
            bank_ref: payment.ref_number.clone(),
            created_at: transaction.created_at,
        }
    }
}

/// Response for transfer endpoints.
///
/// `transaction_id` is the sender's debit (or the credit, for bank callbacks).
#[derive(Debug, Serialize)]
pub struct TransferResponse {
    pub transaction_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fee_transaction_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cashback_transaction_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub messages: Vec<String>,
}

impl TransferResponse {
    pub fn new(transaction_id: Uuid) -> Self {
        Self {
            transaction_id,
            fee_transaction_id: None,
            cashback_transaction_id: None,
            messages: Vec::new(),
        }
    }
}

/// Response for refunds.
#[derive(Debug, Serialize)]
pub struct RefundResponse {
    pub reversal_ids: Vec<Uuid>,
}
