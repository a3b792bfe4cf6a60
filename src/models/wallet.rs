//! Wallet data models and API request/response types.
//!
//! This module defines:
//! - `Wallet`: Database entity holding a user's custodial balance
//! - `OpenWalletRequest`: Request body for onboarding a wallet
//! - `WalletResponse`: Response body returned to clients (no pin material)

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Represents a wallet record from the database.
///
/// # Database Table
///
/// Maps to the `wallets` table.
///
/// # Balance Storage
///
/// Balances are stored as `i64` minor units to avoid floating-point precision issues.
/// The balance always equals the sum of the wallet's committed transaction amounts,
/// and is only ever changed by the transaction core while the row is locked.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow, Serialize)]
pub struct Wallet {
    /// Unique identifier for this wallet
    pub id: Uuid,

    /// Current balance in minor units
    ///
    /// Must be >= 0 (enforced by database CHECK constraint).
    pub balance: i64,

    /// Whether the wallet is locked for transactions
    ///
    /// Set after too many incorrect PIN attempts or by operators.
    pub is_locked: bool,

    /// SHA-256 hash of the wallet PIN salted with the wallet id (64 hex characters)
    #[serde(skip_serializing)]
    pub pin_hash: String,

    /// Number of consecutive incorrect PIN attempts inside the current window
    pub pin_attempts: i32,

    /// When the incorrect-attempt counter stops counting
    pub pin_attempts_expire_at: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

impl Wallet {
    /// Create a fresh, unlocked wallet with zero balance.
    pub fn new(pin: &str, now: DateTime<Utc>) -> Self {
        let id = Uuid::new_v4();
        Self {
            id,
            balance: 0,
            is_locked: false,
            pin_hash: hash_pin(id, pin),
            pin_attempts: 0,
            pin_attempts_expire_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Check a candidate PIN against the stored hash.
    pub fn pin_matches(&self, pin: &str) -> bool {
        hash_pin(self.id, pin) == self.pin_hash
    }

    /// Incorrect attempts that still count at `now`.
    pub fn live_pin_attempts(&self, now: DateTime<Utc>) -> i32 {
        match self.pin_attempts_expire_at {
            Some(expire_at) if expire_at > now => self.pin_attempts,
            _ => 0,
        }
    }
}

/// Hash a PIN for storage.
///
/// The wallet id is mixed in so equal PINs never share a hash.
pub fn hash_pin(wallet_id: Uuid, pin: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(wallet_id.as_bytes());
    hasher.update(pin.as_bytes());
    hex::encode(hasher.finalize())
}

/// Request body for opening a new wallet.
///
/// # JSON Example
///
/// ```json
/// {
///   "pin": "123456"
/// }
/// ```
#[derive(Debug, Deserialize)]
pub struct OpenWalletRequest {
    pub pin: String,
}

/// Response body for wallet endpoints.
#[derive(Debug, Serialize)]
pub struct WalletResponse {
    pub id: Uuid,
    pub balance: i64,
    pub is_locked: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Convert database Wallet to API WalletResponse.
///
/// Drops the pin hash and attempt counters.
impl From<Wallet> for WalletResponse {
    fn from(wallet: Wallet) -> Self {
        Self {
            id: wallet.id,
            balance: wallet.balance,
            is_locked: wallet.is_locked,
            created_at: wallet.created_at,
            updated_at: wallet.updated_at,
        }
    }
}
