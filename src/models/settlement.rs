//! Settlement job records.
//!
//! Every call the ledger owes the bank is persisted as a job before it is
//! attempted. The worker drives jobs through:
//!
//! ```text
//! PENDING → IN_FLIGHT → SETTLED
//!               ↓  ↑
//!             RETRY      → FAILED
//! ```

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::UnknownVariant;
use super::bank::BankDestination;

/// What the worker has to do for a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SettlementKind {
    /// One-shot interbank transfer; fails terminally when the budget runs out
    BankTransfer,
    /// Auto-debit against a payment plan; rescheduled day by day instead of failing
    PlanDebit,
    /// Deferred scheduler attempt for a payment plan (no bank call)
    PlanSchedule,
    /// Virtual account issuance for a top-up
    VirtualAccount,
}

impl SettlementKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SettlementKind::BankTransfer => "BANK_TRANSFER",
            SettlementKind::PlanDebit => "PLAN_DEBIT",
            SettlementKind::PlanSchedule => "PLAN_SCHEDULE",
            SettlementKind::VirtualAccount => "VIRTUAL_ACCOUNT",
        }
    }

    /// Recurring obligations are rescheduled instead of failed.
    pub fn reschedules(&self) -> bool {
        matches!(self, SettlementKind::PlanDebit | SettlementKind::PlanSchedule)
    }
}

impl FromStr for SettlementKind {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "BANK_TRANSFER" => Ok(SettlementKind::BankTransfer),
            "PLAN_DEBIT" => Ok(SettlementKind::PlanDebit),
            "PLAN_SCHEDULE" => Ok(SettlementKind::PlanSchedule),
            "VIRTUAL_ACCOUNT" => Ok(SettlementKind::VirtualAccount),
            _ => Err(UnknownVariant::new("settlement kind", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SettlementStatus {
    Pending,
    InFlight,
    Retry,
    Settled,
    Failed,
}

impl SettlementStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SettlementStatus::Pending => "PENDING",
            SettlementStatus::InFlight => "IN_FLIGHT",
            SettlementStatus::Retry => "RETRY",
            SettlementStatus::Settled => "SETTLED",
            SettlementStatus::Failed => "FAILED",
        }
    }

    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(self, SettlementStatus::Settled | SettlementStatus::Failed)
    }
}

impl fmt::Display for SettlementStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SettlementStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(SettlementStatus::Pending),
            "IN_FLIGHT" => Ok(SettlementStatus::InFlight),
            "RETRY" => Ok(SettlementStatus::Retry),
            "SETTLED" => Ok(SettlementStatus::Settled),
            "FAILED" => Ok(SettlementStatus::Failed),
            _ => Err(UnknownVariant::new("settlement status", s)),
        }
    }
}

/// Maps to the `settlement_jobs` table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SettlementJob {
    pub id: Uuid,
    pub kind: SettlementKind,
    pub status: SettlementStatus,
    pub wallet_id: Uuid,
    /// Ledger payment being settled (absent for plan schedules and VA issuance)
    pub payment_id: Option<Uuid>,
    pub payment_plan_id: Option<Uuid>,
    /// Instalments covered by a plan debit
    pub plan_ids: Vec<Uuid>,
    /// Amount sent to the bank (always positive)
    pub amount: i64,
    pub destination: Option<BankDestination>,
    /// Client reference handed to the bank on every attempt
    pub request_ref: String,
    /// Attempts made in the current retry cycle
    pub attempt_count: i32,
    /// Days the job has been pushed back
    pub reschedule_count: i32,
    pub next_attempt_at: DateTime<Utc>,
    pub last_error: Option<String>,
    /// Bank reference or issued virtual account number
    pub bank_ref: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SettlementJob {
    pub fn new(kind: SettlementKind, wallet_id: Uuid, amount: i64, now: DateTime<Utc>) -> Self {
        let id = Uuid::new_v4();
        Self {
            id,
            kind,
            status: SettlementStatus::Pending,
            wallet_id,
            payment_id: None,
            payment_plan_id: None,
            plan_ids: Vec::new(),
            amount,
            destination: None,
            request_ref: request_ref_for(id),
            attempt_count: 0,
            reschedule_count: 0,
            next_attempt_at: now,
            last_error: None,
            bank_ref: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn for_payment(mut self, payment_id: Uuid) -> Self {
        self.payment_id = Some(payment_id);
        self
    }

    pub fn to(mut self, destination: BankDestination) -> Self {
        self.destination = Some(destination);
        self
    }

    pub fn for_plan(mut self, payment_plan_id: Uuid, plan_ids: Vec<Uuid>) -> Self {
        self.payment_plan_id = Some(payment_plan_id);
        self.plan_ids = plan_ids;
        self
    }

    pub fn not_before(mut self, at: DateTime<Utc>) -> Self {
        self.next_attempt_at = at;
        self
    }
}

/// Stable client reference for a job, reused on every attempt so the bank can dedup.
pub fn request_ref_for(job_id: Uuid) -> String {
    format!("WL{}", job_id.simple()).to_uppercase()
}

/// Response body for a top-up request.
#[derive(Debug, Serialize)]
pub struct TopUpResponse {
    pub job_id: Uuid,
    pub status: SettlementStatus,
}

#[derive(Debug, Deserialize)]
pub struct TopUpRequest {
    pub amount: i64,
}
