//! Application configuration management.
//!
//! This module handles loading configuration from environment variables.
//! It uses the `envy` crate to automatically deserialize environment variables into a type-safe struct,
//! then projects the ledger-relevant parts into the plain-data `LedgerConfig` carried by every operation.

use std::time::Duration;

use serde::Deserialize;

use crate::models::bank::{Bank, TransferTier};

/// Application configuration loaded from environment variables.
///
/// # Environment Variables
///
/// - `DATABASE_URL` (required): PostgreSQL connection string
/// - `BANK_GATEWAY_URL` (required): base URL of the bank gateway
/// - `SERVER_PORT` (optional): HTTP server port, defaults to 3000
/// - `DATABASE_MAX_CONNECTIONS` (optional): pool size, defaults to 10
/// - `BANK_GATEWAY_TIMEOUT_SECS`, `OWN_BANK_CODE`, `FEE_ONLINE`, `FEE_CLEARING`, `FEE_RTGS`,
///   `MAX_PIN_ATTEMPTS`, `PIN_ATTEMPT_WINDOW_MINUTES`, `SETTLEMENT_MAX_RETRIES`,
///   `SETTLEMENT_MAX_RETRY_DAYS`, `SETTLEMENT_POLL_INTERVAL_SECS`, `SETTLEMENT_BATCH_SIZE`,
///   `SETTLEMENT_STALE_SECS`, `PLAN_LOOKAHEAD_DAYS` (optional, see defaults below)
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub database_url: String,

    #[serde(default = "default_max_connections")]
    pub database_max_connections: u32,

    pub bank_gateway_url: String,

    #[serde(default = "default_port")]
    pub server_port: u16,

    #[serde(default = "default_gateway_timeout")]
    pub bank_gateway_timeout_secs: u64,

    #[serde(default = "default_own_bank_code")]
    pub own_bank_code: String,

    #[serde(default = "default_fee_online")]
    pub fee_online: i64,

    #[serde(default = "default_fee_clearing")]
    pub fee_clearing: i64,

    #[serde(default = "default_fee_rtgs")]
    pub fee_rtgs: i64,

    #[serde(default = "default_max_pin_attempts")]
    pub max_pin_attempts: i32,

    #[serde(default = "default_pin_window")]
    pub pin_attempt_window_minutes: i64,

    #[serde(default = "default_max_retries")]
    pub settlement_max_retries: i32,

    #[serde(default = "default_max_retry_days")]
    pub settlement_max_retry_days: i32,

    #[serde(default = "default_poll_interval")]
    pub settlement_poll_interval_secs: u64,

    #[serde(default = "default_batch_size")]
    pub settlement_batch_size: usize,

    #[serde(default = "default_stale_secs")]
    pub settlement_stale_secs: i64,

    #[serde(default)]
    pub plan_lookahead_days: i64,
}

fn default_max_connections() -> u32 {
    10
}

fn default_port() -> u16 {
    3000
}

fn default_gateway_timeout() -> u64 {
    30
}

fn default_own_bank_code() -> String {
    "009".to_string()
}

fn default_fee_online() -> i64 {
    6500
}

fn default_fee_clearing() -> i64 {
    2900
}

fn default_fee_rtgs() -> i64 {
    25000
}

fn default_max_pin_attempts() -> i32 {
    3
}

fn default_pin_window() -> i64 {
    60
}

fn default_max_retries() -> i32 {
    5
}

fn default_max_retry_days() -> i32 {
    3
}

fn default_poll_interval() -> u64 {
    5
}

fn default_batch_size() -> usize {
    50
}

fn default_stale_secs() -> i64 {
    300
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// This method first attempts to load a `.env` file (which is optional),
    /// then reads environment variables and deserializes them into a Config struct.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Required environment variables are missing (e.g., DATABASE_URL)
    /// - Environment variable values cannot be parsed into expected types
    pub fn from_env() -> Result<Self, envy::Error> {
        dotenvy::dotenv().ok();

        envy::from_env::<Config>()
    }

    /// Parsed gateway base URL.
    pub fn gateway_url(&self) -> Result<url::Url, url::ParseError> {
        url::Url::parse(&self.bank_gateway_url)
    }

    pub fn gateway_timeout(&self) -> Duration {
        Duration::from_secs(self.bank_gateway_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.settlement_poll_interval_secs)
    }

    /// Ledger settings handed to every operation through `LedgerContext`.
    pub fn ledger(&self) -> LedgerConfig {
        LedgerConfig {
            fees: FeeTable {
                own_bank_code: self.own_bank_code.clone(),
                online: self.fee_online,
                clearing: self.fee_clearing,
                rtgs: self.fee_rtgs,
            },
            pin: PinPolicy {
                max_attempts: self.max_pin_attempts,
                window_minutes: self.pin_attempt_window_minutes,
            },
            settlement: SettlementPolicy {
                max_retries: self.settlement_max_retries,
                max_retry_days: self.settlement_max_retry_days,
                backoff_min: 2.0,
                backoff_max: 4.0,
                batch_size: self.settlement_batch_size,
                stale_after_secs: self.settlement_stale_secs,
            },
            plan_lookahead_days: self.plan_lookahead_days,
        }
    }
}

/// Ledger configuration as plain data.
#[derive(Debug, Clone, PartialEq)]
pub struct LedgerConfig {
    pub fees: FeeTable,
    pub pin: PinPolicy,
    pub settlement: SettlementPolicy,
    /// Days ahead of today an auto-debit may already collect
    pub plan_lookahead_days: i64,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            fees: FeeTable {
                own_bank_code: default_own_bank_code(),
                online: default_fee_online(),
                clearing: default_fee_clearing(),
                rtgs: default_fee_rtgs(),
            },
            pin: PinPolicy {
                max_attempts: default_max_pin_attempts(),
                window_minutes: default_pin_window(),
            },
            settlement: SettlementPolicy {
                max_retries: default_max_retries(),
                max_retry_days: default_max_retry_days(),
                backoff_min: 2.0,
                backoff_max: 4.0,
                batch_size: default_batch_size(),
                stale_after_secs: default_stale_secs(),
            },
            plan_lookahead_days: 0,
        }
    }
}

/// Transfer fees per destination tier, in minor units.
#[derive(Debug, Clone, PartialEq)]
pub struct FeeTable {
    /// Transfers to this bank are in-house and free
    pub own_bank_code: String,
    pub online: i64,
    pub clearing: i64,
    pub rtgs: i64,
}

impl FeeTable {
    pub fn is_own_bank(&self, bank: &Bank) -> bool {
        bank.code == self.own_bank_code
    }

    /// Fee charged for sending to `bank`, priced by the bank's tier right now.
    pub fn fee_for(&self, bank: &Bank) -> i64 {
        if self.is_own_bank(bank) {
            return 0;
        }
        match bank.tier {
            TransferTier::Online => self.online,
            TransferTier::Clearing => self.clearing,
            TransferTier::Rtgs => self.rtgs,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PinPolicy {
    /// Incorrect attempts that lock the wallet
    pub max_attempts: i32,
    /// How long an incorrect attempt keeps counting
    pub window_minutes: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SettlementPolicy {
    /// Retries after the first attempt before a job's budget is exhausted
    pub max_retries: i32,
    /// Days a recurring job may be pushed back before it fails
    pub max_retry_days: i32,
    /// Backoff base is drawn from `[backoff_min, backoff_max)`
    pub backoff_min: f64,
    pub backoff_max: f64,
    /// Jobs claimed per scan
    pub batch_size: usize,
    /// Seconds after which an IN_FLIGHT job is presumed abandoned
    pub stale_after_secs: i64,
}
