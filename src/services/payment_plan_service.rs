//! Payment-plan auto-settlement scheduler.
//!
//! `decide` is a pure function from plan state, available funds and today's
//! date to what should happen. The async entry points load that state under the
//! wallet lock, apply the decision in the same unit of work, and hand any bank
//! delivery to the settlement worker as a `PLAN_DEBIT` job.
//!
//! Lock order is wallet, then payment plan.

use chrono::{DateTime, Days, NaiveDate, NaiveTime, Utc};
use uuid::Uuid;

use crate::context::LedgerContext;
use crate::error::AppError;
use crate::models::payment_plan::{
    CreatePaymentPlanRequest, PaymentPlan, PaymentPlanResponse, Plan, PlanStatus, next_unpaid,
    outstanding,
};
use crate::models::settlement::{SettlementJob, SettlementKind, SettlementStatus};
use crate::services::transaction_service::{
    Settlement, TransactionParams, ledger_failure, process_transaction,
};
use crate::store::UnitOfWork;

/// Message returned to the caller whenever collection is deferred.
pub const AUTO_DEBIT_MESSAGE: &str = "AUTO_DEBIT";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeferReason {
    /// Next instalment is not due yet
    NotDue,
    /// Next instalment is past the retry window
    Late,
    /// Funds do not cover what is due
    InsufficientFunds,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlanDecision {
    /// No active plan or nothing left to pay
    NoPlan,
    DebitNow { amount: i64, plan_ids: Vec<Uuid> },
    Deferred { reason: DeferReason, until: NaiveDate },
}

/// Decide what to do with a wallet's plan.
///
/// Evaluated in order:
/// 1. nothing unpaid → `NoPlan`
/// 2. `today + lookahead` before the next due date → defer to that date
/// 3. more than `max_retry_days` past the next due date → defer a day (`Late`)
/// 4. `available` below what is due → defer a day (`InsufficientFunds`)
/// 5. otherwise debit everything due
pub fn decide(
    plans: &[Plan],
    available: i64,
    today: NaiveDate,
    lookahead_days: i64,
    max_retry_days: i32,
) -> PlanDecision {
    let Some(next) = next_unpaid(plans) else {
        return PlanDecision::NoPlan;
    };
    let tomorrow = today + Days::new(1);
    let effective_today = add_days(today, lookahead_days);

    if effective_today < next.due_date {
        return PlanDecision::Deferred {
            reason: DeferReason::NotDue,
            until: add_days(next.due_date, -lookahead_days).max(tomorrow),
        };
    }
    if today > add_days(next.due_date, i64::from(max_retry_days)) {
        return PlanDecision::Deferred {
            reason: DeferReason::Late,
            until: tomorrow,
        };
    }

    let due = outstanding(plans, effective_today);
    if available < due {
        return PlanDecision::Deferred {
            reason: DeferReason::InsufficientFunds,
            until: tomorrow,
        };
    }

    PlanDecision::DebitNow {
        amount: due,
        plan_ids: plans
            .iter()
            .filter(|plan| plan.status.is_open() && plan.due_date <= effective_today)
            .map(|plan| plan.id)
            .collect(),
    }
}

fn add_days(date: NaiveDate, days: i64) -> NaiveDate {
    let magnitude = Days::new(days.unsigned_abs());
    let shifted = if days >= 0 {
        date.checked_add_days(magnitude)
    } else {
        date.checked_sub_days(magnitude)
    };
    shifted.unwrap_or(date)
}

pub(crate) fn start_of(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(NaiveTime::MIN).and_utc()
}

/// Apply a decision inside `uow`. The wallet must already be locked.
async fn apply(
    uow: &mut dyn UnitOfWork,
    now: DateTime<Utc>,
    plan: &PaymentPlan,
    plans: &[Plan],
    decision: &PlanDecision,
    schedule_on_defer: bool,
) -> Result<(), AppError> {
    match decision {
        PlanDecision::NoPlan => {}
        PlanDecision::DebitNow { amount, plan_ids } => {
            process_transaction(
                uow,
                now,
                TransactionParams {
                    wallet_id: plan.wallet_id,
                    source: plan.wallet_id.to_string(),
                    destination: plan.destination.to_string(),
                    amount: *amount,
                    is_credit: false,
                    flag: "AUTO_DEBIT".to_string(),
                    notes: Some(format!("Payment plan {}", plan.id)),
                    channel_id: None,
                    ref_number: None,
                    parent_id: None,
                    settle_to: Some(Settlement {
                        destination: plan.destination.clone(),
                        plan: Some((plan.id, plan_ids.clone())),
                    }),
                },
            )
            .await?;
            uow.set_plan_status(plan_ids, PlanStatus::Sending).await?;
            tracing::info!(
                payment_plan_id = %plan.id,
                wallet_id = %plan.wallet_id,
                amount = *amount,
                instalments = plan_ids.len(),
                "Auto-debit collected"
            );
        }
        PlanDecision::Deferred { reason, until } => {
            // Job before instalment rows; the worker updates instalments while holding its job
            if schedule_on_defer {
                schedule_attempt(uow, now, plan, start_of(*until)).await?;
            }
            if let Some(next) = next_unpaid(plans) {
                if next.status == PlanStatus::Pending {
                    uow.set_plan_status(&[next.id], PlanStatus::Started).await?;
                }
            }
            tracing::info!(
                payment_plan_id = %plan.id,
                reason = ?reason,
                until = %until,
                "Auto-debit deferred"
            );
        }
    }
    Ok(())
}

/// Make sure one `PLAN_SCHEDULE` job will look at `plan` by `at`. An open job
/// is reused, and pulled forward if it would run later.
async fn schedule_attempt(
    uow: &mut dyn UnitOfWork,
    now: DateTime<Utc>,
    plan: &PaymentPlan,
    at: DateTime<Utc>,
) -> Result<(), AppError> {
    let open = uow
        .jobs_for_plan(plan.id, SettlementKind::PlanSchedule)
        .await?
        .into_iter()
        .find(|job| !job.status.is_terminal());

    match open {
        Some(job) if job.status == SettlementStatus::InFlight => {}
        Some(job) => {
            let mut job = uow.lock_job(job.id).await?;
            if job.next_attempt_at > at {
                job.next_attempt_at = at;
                job.updated_at = now;
                uow.update_job(&job).await?;
            }
        }
        None => {
            let job = SettlementJob::new(SettlementKind::PlanSchedule, plan.wallet_id, 0, now)
                .for_plan(plan.id, Vec::new())
                .not_before(at);
            uow.enqueue_job(&job).await?;
        }
    }
    Ok(())
}

fn messages(decision: &PlanDecision) -> Vec<String> {
    match decision {
        PlanDecision::Deferred { .. } => vec![AUTO_DEBIT_MESSAGE.to_string()],
        _ => Vec::new(),
    }
}

/// React to a payroll credit of `payroll` on `wallet_id` posted in `uow`.
///
/// Runs before the credit commits, so the credit and whatever the scheduler
/// decides land together or not at all.
pub async fn on_payroll_received(
    uow: &mut dyn UnitOfWork,
    ctx: &LedgerContext,
    wallet_id: Uuid,
    payroll: i64,
) -> Result<Vec<String>, AppError> {
    let now = ctx.clock.now();
    let wallet = uow.lock_wallet(wallet_id).await?;
    let Some(active) = uow.active_payment_plan(wallet_id).await? else {
        return Ok(Vec::new());
    };
    let plan = uow.lock_payment_plan(active.id).await?;
    let plans = uow.plans_for(plan.id).await?;

    let decision = decide(
        &plans,
        payroll.min(wallet.balance),
        ctx.clock.today(),
        ctx.config.plan_lookahead_days,
        ctx.config.settlement.max_retry_days,
    );
    apply(uow, now, &plan, &plans, &decision, true).await?;
    Ok(messages(&decision))
}

/// Run the scheduler for one plan against the wallet's whole balance.
///
/// With `schedule_on_defer`, a deferral enqueues a `PLAN_SCHEDULE` job for the
/// date it defers to; the settlement worker passes `false` and reschedules its
/// own job instead.
pub(crate) async fn run_plan(
    ctx: &LedgerContext,
    payment_plan_id: Uuid,
    schedule_on_defer: bool,
) -> Result<PlanDecision, AppError> {
    let now = ctx.clock.now();
    let mut uow = ctx.store.begin().await.map_err(ledger_failure)?;
    let wallet_id = uow
        .get_payment_plan(payment_plan_id)
        .await?
        .ok_or(AppError::PaymentPlanNotFound(payment_plan_id))?
        .wallet_id;

    let wallet = uow.lock_wallet(wallet_id).await?;
    let plan = uow.lock_payment_plan(payment_plan_id).await?;
    if !plan.is_active {
        return Ok(PlanDecision::NoPlan);
    }
    let plans = uow.plans_for(plan.id).await?;

    let decision = decide(
        &plans,
        wallet.balance,
        ctx.clock.today(),
        ctx.config.plan_lookahead_days,
        ctx.config.settlement.max_retry_days,
    );
    apply(uow.as_mut(), now, &plan, &plans, &decision, schedule_on_defer)
        .await
        .map_err(ledger_failure)?;
    uow.commit().await.map_err(ledger_failure)?;
    Ok(decision)
}

/// Try to collect what a plan owes now.
pub async fn settle_plan(
    ctx: &LedgerContext,
    payment_plan_id: Uuid,
) -> Result<Vec<String>, AppError> {
    let decision = run_plan(ctx, payment_plan_id, true).await?;
    Ok(messages(&decision))
}

/// Register a repayment plan for a wallet.
///
/// # Errors
///
/// - `InvalidRequest`: no instalments
/// - `InvalidAmount`: an instalment amount is not positive
/// - `BankAccountNotFound`: unknown account, or one registered to another wallet
/// - `PaymentPlanExists`: the wallet already has an active plan
pub async fn create_payment_plan(
    ctx: &LedgerContext,
    request: CreatePaymentPlanRequest,
) -> Result<PaymentPlanResponse, AppError> {
    if request.instalments.is_empty() {
        return Err(AppError::InvalidRequest(
            "A payment plan needs at least one instalment".to_string(),
        ));
    }
    if request.instalments.iter().any(|i| i.amount <= 0) {
        return Err(AppError::InvalidAmount);
    }

    let now = ctx.clock.now();
    let mut uow = ctx.store.begin().await?;
    uow.lock_wallet(request.wallet_id).await?;

    let account = uow
        .get_bank_account(request.bank_account_id)
        .await?
        .filter(|account| account.wallet_id == request.wallet_id)
        .ok_or(AppError::BankAccountNotFound)?;
    if uow.active_payment_plan(request.wallet_id).await?.is_some() {
        return Err(AppError::PaymentPlanExists);
    }

    let plan = PaymentPlan {
        id: Uuid::new_v4(),
        wallet_id: request.wallet_id,
        destination: account.destination(),
        is_active: true,
        created_at: now,
    };
    let mut instalments: Vec<Plan> = request
        .instalments
        .iter()
        .map(|i| Plan {
            id: Uuid::new_v4(),
            payment_plan_id: plan.id,
            amount: i.amount,
            due_date: i.due_date,
            status: PlanStatus::Pending,
        })
        .collect();
    instalments.sort_by_key(|p| p.due_date);

    uow.insert_payment_plan(&plan, &instalments).await?;
    uow.commit().await?;

    tracing::info!(
        payment_plan_id = %plan.id,
        wallet_id = %plan.wallet_id,
        instalments = instalments.len(),
        "Payment plan created"
    );
    Ok(PaymentPlanResponse {
        plan,
        instalments,
    })
}

/// Mark the instalments a settled `PLAN_DEBIT` covered as paid, and close the
/// plan once nothing is left.
pub(crate) async fn mark_paid(
    uow: &mut dyn UnitOfWork,
    payment_plan_id: Uuid,
    plan_ids: &[Uuid],
) -> Result<(), AppError> {
    let mut plan = uow.lock_payment_plan(payment_plan_id).await?;
    uow.set_plan_status(plan_ids, PlanStatus::Paid).await?;
    let plans = uow.plans_for(payment_plan_id).await?;
    if plans.iter().all(|p| p.status == PlanStatus::Paid) {
        plan.is_active = false;
        uow.update_payment_plan(&plan).await?;
        tracing::info!(payment_plan_id = %payment_plan_id, "Payment plan fully paid");
    }
    Ok(())
}

/// Mark instalments as failed after their job gave up. Without explicit ids,
/// every open instalment due by `as_of` fails.
pub(crate) async fn mark_failed(
    uow: &mut dyn UnitOfWork,
    payment_plan_id: Uuid,
    plan_ids: &[Uuid],
    as_of: NaiveDate,
) -> Result<(), AppError> {
    let ids: Vec<Uuid> = if plan_ids.is_empty() {
        uow.plans_for(payment_plan_id)
            .await?
            .into_iter()
            .filter(|p| p.status.is_open() && p.due_date <= as_of)
            .map(|p| p.id)
            .collect()
    } else {
        plan_ids.to_vec()
    };
    uow.set_plan_status(&ids, PlanStatus::Failed).await
}
