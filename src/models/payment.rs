//! Payment data models.
//!
//! A payment is a single money-movement intent. Every payment produces exactly
//! one ledger transaction; the optional `ref_number` is the idempotency key for
//! bank-correlated movements.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::UnknownVariant;

/// Direction of a payment relative to the wallet it touches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentType {
    Credit,
    Debit,
}

impl PaymentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentType::Credit => "CREDIT",
            PaymentType::Debit => "DEBIT",
        }
    }
}

impl FromStr for PaymentType {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CREDIT" => Ok(PaymentType::Credit),
            "DEBIT" => Ok(PaymentType::Debit),
            _ => Err(UnknownVariant::new("payment type", s)),
        }
    }
}

/// Payment lifecycle.
///
/// Internal movements are `Done` as soon as they commit. Movements that settle
/// against the bank stay `Pending` until the settlement worker confirms them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Pending,
    Done,
    Cancelled,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "PENDING",
            PaymentStatus::Done => "DONE",
            PaymentStatus::Cancelled => "CANCELLED",
        }
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(PaymentStatus::Pending),
            "DONE" => Ok(PaymentStatus::Done),
            "CANCELLED" => Ok(PaymentStatus::Cancelled),
            _ => Err(UnknownVariant::new("payment status", s)),
        }
    }
}

/// Represents a payment record from the database.
///
/// # Database Table
///
/// Maps to the `payments` table. `ref_number` carries a UNIQUE constraint.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Payment {
    pub id: Uuid,

    /// Wallet id or external account identifier the money comes from
    pub source_account: String,

    /// Wallet id or external account identifier the money goes to
    pub destination: String,

    /// Signed amount in minor units (negative for debits)
    pub amount: i64,

    pub payment_type: PaymentType,

    /// Bank channel for bank-originated credits
    pub channel_id: Option<String>,

    /// Idempotency key for bank-correlated payments
    pub ref_number: Option<String>,

    pub status: PaymentStatus,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

/// Parameters for creating a payment.
#[derive(Debug, Clone)]
pub struct NewPayment {
    pub source_account: String,
    pub destination: String,
    pub amount: i64,
    pub payment_type: PaymentType,
    pub channel_id: Option<String>,
    pub ref_number: Option<String>,
    pub status: PaymentStatus,
}

impl NewPayment {
    pub fn into_payment(self, now: DateTime<Utc>) -> Payment {
        Payment {
            id: Uuid::new_v4(),
            source_account: self.source_account,
            destination: self.destination,
            amount: self.amount,
            payment_type: self.payment_type,
            channel_id: self.channel_id,
            ref_number: self.ref_number,
            status: self.status,
            created_at: now,
            updated_at: now,
        }
    }
}
