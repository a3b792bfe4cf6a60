//! Bank and beneficiary account models.
//!
//! Banks and registered beneficiary accounts are maintained by admin tooling;
//! the ledger only reads them to route external transfers and price fees.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::UnknownVariant;

/// Interbank clearing method a destination bank is reached through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransferTier {
    Online,
    Clearing,
    Rtgs,
}

impl TransferTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransferTier::Online => "ONLINE",
            TransferTier::Clearing => "CLEARING",
            TransferTier::Rtgs => "RTGS",
        }
    }
}

impl fmt::Display for TransferTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransferTier {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ONLINE" => Ok(TransferTier::Online),
            "CLEARING" => Ok(TransferTier::Clearing),
            "RTGS" => Ok(TransferTier::Rtgs),
            _ => Err(UnknownVariant::new("transfer tier", s)),
        }
    }
}

/// Maps to the `banks` table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Bank {
    /// Clearing code, e.g. "014" for BCA
    pub code: String,
    pub name: String,
    pub tier: TransferTier,
}

/// Maps to the `bank_accounts` table.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow, Serialize)]
pub struct BankAccount {
    pub id: Uuid,
    pub wallet_id: Uuid,
    pub bank_code: String,
    pub account_no: String,
    pub account_name: String,
}

impl BankAccount {
    pub fn destination(&self) -> BankDestination {
        BankDestination {
            bank_code: self.bank_code.clone(),
            account_no: self.account_no.clone(),
            account_name: self.account_name.clone(),
        }
    }
}

/// Where a settlement sends money.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BankDestination {
    pub bank_code: String,
    pub account_no: String,
    pub account_name: String,
}

impl fmt::Display for BankDestination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.bank_code, self.account_no)
    }
}

/// Request body for a beneficiary inquiry.
#[derive(Debug, Deserialize)]
pub struct InquiryRequest {
    pub wallet_id: Uuid,
    pub bank_account_id: Uuid,
}
