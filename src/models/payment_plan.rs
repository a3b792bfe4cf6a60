//! Repayment plan models.
//!
//! A `PaymentPlan` groups the `Plan` instalments a wallet owes to one
//! destination bank account. Instalments are settled from payroll credits or by
//! deferred auto-debit.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::UnknownVariant;
use super::bank::BankDestination;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PlanStatus {
    Pending,
    Started,
    Retrying,
    Sending,
    Failed,
    Paid,
}

impl PlanStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlanStatus::Pending => "PENDING",
            PlanStatus::Started => "STARTED",
            PlanStatus::Retrying => "RETRYING",
            PlanStatus::Sending => "SENDING",
            PlanStatus::Failed => "FAILED",
            PlanStatus::Paid => "PAID",
        }
    }

    /// Instalments that can still be picked up by an auto-debit. RETRYING
    /// instalments were already debited and are only being re-sent.
    pub fn is_open(&self) -> bool {
        matches!(self, PlanStatus::Pending | PlanStatus::Started)
    }
}

impl fmt::Display for PlanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PlanStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(PlanStatus::Pending),
            "STARTED" => Ok(PlanStatus::Started),
            "RETRYING" => Ok(PlanStatus::Retrying),
            "SENDING" => Ok(PlanStatus::Sending),
            "FAILED" => Ok(PlanStatus::Failed),
            "PAID" => Ok(PlanStatus::Paid),
            _ => Err(UnknownVariant::new("plan status", s)),
        }
    }
}

/// Maps to the `payment_plans` table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PaymentPlan {
    pub id: Uuid,
    pub wallet_id: Uuid,
    pub destination: BankDestination,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

/// Maps to the `plans` table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Plan {
    pub id: Uuid,
    pub payment_plan_id: Uuid,
    pub amount: i64,
    pub due_date: NaiveDate,
    pub status: PlanStatus,
}

/// Sum of the instalments an auto-debit taken on `as_of` would cover.
pub fn outstanding(plans: &[Plan], as_of: NaiveDate) -> i64 {
    plans
        .iter()
        .filter(|plan| plan.status.is_open() && plan.due_date <= as_of)
        .map(|plan| plan.amount)
        .sum()
}

/// Earliest instalment that still needs paying.
pub fn next_unpaid(plans: &[Plan]) -> Option<&Plan> {
    plans
        .iter()
        .filter(|plan| plan.status.is_open())
        .min_by_key(|plan| plan.due_date)
}

/// Request body for creating a payment plan.
///
/// # JSON Example
///
/// ```json
/// {
///   "wallet_id": "550e8400-e29b-41d4-a716-446655440000",
///   "bank_account_id": "770e8400-e29b-41d4-a716-446655440002",
///   "instalments": [
///     { "amount": 500000, "due_date": "2026-11-25" },
///     { "amount": 500000, "due_date": "2026-12-25" }
///   ]
/// }
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct CreatePaymentPlanRequest {
    pub wallet_id: Uuid,
    pub bank_account_id: Uuid,
    pub instalments: Vec<Instalment>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Instalment {
    pub amount: i64,
    pub due_date: NaiveDate,
}

#[derive(Debug, Serialize)]
pub struct PaymentPlanResponse {
    pub plan: PaymentPlan,
    pub instalments: Vec<Plan>,
}

/// Response body for a settle attempt. Carries `"AUTO_DEBIT"` when collection
/// was deferred.
#[derive(Debug, Serialize)]
pub struct SettlePlanResponse {
    pub messages: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plan(amount: i64, due: &str, status: PlanStatus) -> Plan {
        Plan {
            id: Uuid::new_v4(),
            payment_plan_id: Uuid::nil(),
            amount,
            due_date: due.parse().unwrap(),
            status,
        }
    }

    #[test]
    fn test_outstanding_skips_paid_and_future() {
        let plans = vec![
            plan(100, "2026-01-10", PlanStatus::Paid),
            plan(200, "2026-02-10", PlanStatus::Started),
            plan(300, "2026-03-10", PlanStatus::Pending),
        ];
        let as_of: NaiveDate = "2026-02-28".parse().unwrap();
        assert_eq!(outstanding(&plans, as_of), 200);
        assert_eq!(next_unpaid(&plans).unwrap().amount, 200);
    }

    #[test]
    fn test_sending_instalments_are_not_open() {
        let plans = vec![
            plan(200, "2026-02-10", PlanStatus::Sending),
            plan(300, "2026-02-10", PlanStatus::Retrying),
        ];
        assert!(next_unpaid(&plans).is_none());
        assert_eq!(outstanding(&plans, "2026-12-31".parse().unwrap()), 0);
    }
}
