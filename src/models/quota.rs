//! Reward quota models.
//!
//! A quota is a time-boxed allowance of reward-eligible transactions for one
//! wallet. Each use is recorded as a `QuotaUsage` row tied to exactly one
//! transaction; refunds record a negative usage against the reversal.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::UnknownVariant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RewardType {
    Fixed,
    Percentage,
}

impl RewardType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RewardType::Fixed => "FIXED",
            RewardType::Percentage => "PERCENTAGE",
        }
    }
}

impl FromStr for RewardType {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "FIXED" => Ok(RewardType::Fixed),
            "PERCENTAGE" => Ok(RewardType::Percentage),
            _ => Err(UnknownVariant::new("reward type", s)),
        }
    }
}

/// Maps to the `quotas` table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Quota {
    pub id: Uuid,
    pub wallet_id: Uuid,
    /// Inclusive start of the validity window
    pub start_valid: DateTime<Utc>,
    /// Exclusive end of the validity window
    pub end_valid: DateTime<Utc>,
    /// Number of reward-eligible transactions granted
    pub no_of_transactions: i32,
    pub reward_type: RewardType,
    /// Minor units for `Fixed`, percent for `Percentage`
    pub reward_amount: Decimal,
}

impl Quota {
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        self.start_valid <= now && now < self.end_valid
    }

    /// Reward owed for a transaction of `amount` (sign ignored), rounded to minor units.
    pub fn reward_for(&self, amount: i64) -> i64 {
        let reward = match self.reward_type {
            RewardType::Fixed => self.reward_amount,
            RewardType::Percentage => {
                Decimal::from(amount.unsigned_abs()) * self.reward_amount / Decimal::ONE_HUNDRED
            }
        };
        reward
            .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
            .to_i64()
            .unwrap_or(0)
    }
}

/// Maps to the `quota_usages` table (`transaction_id` is UNIQUE).
#[derive(Debug, Clone, PartialEq, sqlx::FromRow, Serialize)]
pub struct QuotaUsage {
    pub id: Uuid,
    pub quota_id: Uuid,
    pub transaction_id: Uuid,
    /// +1 when a transaction consumes the allowance, -1 when a refund gives it back
    pub usage: i32,
    pub created_at: DateTime<Utc>,
}

/// Outcome of consulting the reward engine for one transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct QuotaReward {
    pub is_rewarded: bool,
    pub reward_amount: i64,
}

impl QuotaReward {
    pub const NONE: Self = Self {
        is_rewarded: false,
        reward_amount: 0,
    };
}
