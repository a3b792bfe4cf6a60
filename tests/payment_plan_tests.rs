mod common;

use chrono::{Days, Duration, NaiveDate};
use uuid::Uuid;

use common::{BCA, Harness};
use wallet_ledger::config::LedgerConfig;
use wallet_ledger::error::AppError;
use wallet_ledger::models::payment_plan::{CreatePaymentPlanRequest, Instalment, PlanStatus};
use wallet_ledger::models::settlement::{SettlementKind, SettlementStatus};
use wallet_ledger::models::transaction::{BankCreditRequest, InternalTransferRequest};
use wallet_ledger::services::payment_plan_service::{self, AUTO_DEBIT_MESSAGE};
use wallet_ledger::services::transfer_service;

fn today() -> NaiveDate {
    common::start_time().date_naive()
}

async fn plan(h: &Harness, wallet_id: Uuid, instalments: &[(i64, NaiveDate)]) -> Uuid {
    let account = h.bank_account(wallet_id, BCA).await;
    payment_plan_service::create_payment_plan(
        &h.ctx,
        CreatePaymentPlanRequest {
            wallet_id,
            bank_account_id: account,
            instalments: instalments
                .iter()
                .map(|&(amount, due_date)| Instalment { amount, due_date })
                .collect(),
        },
    )
    .await
    .unwrap()
    .plan
    .id
}

fn payroll(employer: Uuid, employee: Uuid, amount: i64) -> InternalTransferRequest {
    InternalTransferRequest {
        source: employer,
        destination: employee,
        amount,
        pin: common::PIN.to_string(),
        notes: Some("October salary".to_string()),
        flag: "PAYROLL".to_string(),
    }
}

#[tokio::test]
async fn test_payroll_collects_due_instalment() {
    let h = Harness::new().await;
    let employer = h.wallet(10_000_000).await;
    let employee = h.wallet(0).await;
    let plan_id = plan(&h, employee, &[(500_000, today())]).await;

    let response = transfer_service::internal_transfer(&h.ctx, payroll(employer, employee, 5_000_000))
        .await
        .unwrap();
    assert!(response.messages.is_empty());
    assert_eq!(h.balance(employee).await, 4_500_000);

    let jobs = h.jobs().await;
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].kind, SettlementKind::PlanDebit);
    assert_eq!(jobs[0].amount, 500_000);
    assert_eq!(h.instalments(plan_id).await[0].status, PlanStatus::Sending);

    h.run_worker(1, Duration::minutes(1)).await;

    assert_eq!(h.jobs().await[0].status, SettlementStatus::Settled);
    assert_eq!(h.instalments(plan_id).await[0].status, PlanStatus::Paid);

    // Fully paid plans close, so a new one can be opened
    plan(&h, employee, &[(100, today())]).await;
}

#[tokio::test]
async fn test_payroll_before_due_date_defers() {
    let h = Harness::new().await;
    let employer = h.wallet(10_000_000).await;
    let employee = h.wallet(0).await;
    let due = today().checked_add_days(Days::new(10)).unwrap();
    let plan_id = plan(&h, employee, &[(500_000, due)]).await;

    let response = transfer_service::internal_transfer(&h.ctx, payroll(employer, employee, 5_000_000))
        .await
        .unwrap();
    assert_eq!(response.messages, vec![AUTO_DEBIT_MESSAGE.to_string()]);
    assert_eq!(h.balance(employee).await, 5_000_000);
    assert_eq!(h.instalments(plan_id).await[0].status, PlanStatus::Started);

    let jobs = h.jobs().await;
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].kind, SettlementKind::PlanSchedule);
    assert_eq!(jobs[0].next_attempt_at.date_naive(), due);

    // Nothing happens before the due date
    h.run_worker(1, Duration::days(9)).await;
    assert_eq!(h.balance(employee).await, 5_000_000);

    // Due date: the schedule collects, then the debit is delivered
    h.clock.advance(Duration::days(1));
    h.run_worker(2, Duration::minutes(1)).await;

    assert_eq!(h.balance(employee).await, 4_500_000);
    let jobs = h.jobs().await;
    assert!(jobs.iter().all(|job| job.status == SettlementStatus::Settled));
    assert!(jobs.iter().any(|job| job.kind == SettlementKind::PlanDebit));
    assert_eq!(h.instalments(plan_id).await[0].status, PlanStatus::Paid);
}

#[tokio::test]
async fn test_short_payroll_defers_a_day() {
    let h = Harness::new().await;
    let employer = h.wallet(10_000_000).await;
    let employee = h.wallet(0).await;
    plan(&h, employee, &[(500_000, today())]).await;

    let response = transfer_service::internal_transfer(&h.ctx, payroll(employer, employee, 300_000))
        .await
        .unwrap();

    assert_eq!(response.messages, vec![AUTO_DEBIT_MESSAGE.to_string()]);
    assert_eq!(h.balance(employee).await, 300_000);
    let job = h.jobs().await.remove(0);
    assert_eq!(job.kind, SettlementKind::PlanSchedule);
    assert_eq!(
        job.next_attempt_at.date_naive(),
        today().checked_add_days(Days::new(1)).unwrap()
    );
}

#[tokio::test]
async fn test_failing_plan_debit_reschedules_then_fails() {
    let mut config = LedgerConfig::default();
    config.settlement.max_retries = 1;
    config.settlement.max_retry_days = 2;
    let h = Harness::with_config(config).await;
    let employer = h.wallet(10_000_000).await;
    let employee = h.wallet(0).await;
    let plan_id = plan(&h, employee, &[(500_000, today())]).await;

    transfer_service::internal_transfer(&h.ctx, payroll(employer, employee, 5_000_000))
        .await
        .unwrap();
    h.gateway.set_fail_all_payments(true);

    // Day 0 and 1: budget spent, pushed to day 2
    h.run_worker(2, Duration::days(1)).await;
    let job = h.jobs().await.remove(0);
    assert_eq!(job.status, SettlementStatus::Pending);
    assert_eq!(job.reschedule_count, 1);
    assert_eq!(job.attempt_count, 0);
    assert_eq!(h.instalments(plan_id).await[0].status, PlanStatus::Retrying);

    h.run_worker(6, Duration::days(1)).await;
    let job = h.jobs().await.remove(0);
    assert_eq!(job.status, SettlementStatus::Failed);
    assert_eq!(job.reschedule_count, 2);
    assert_eq!(h.instalments(plan_id).await[0].status, PlanStatus::Failed);
    assert_eq!(h.gateway.payment_calls(), 6);
    // Collected money stays collected
    assert_eq!(h.balance(employee).await, 4_500_000);
}

#[tokio::test]
async fn test_settle_plan_collects_overdue_instalments_together() {
    let h = Harness::new().await;
    let employee = h.wallet(2_000_000).await;
    let plan_id = plan(
        &h,
        employee,
        &[
            (300_000, today().checked_sub_days(Days::new(1)).unwrap()),
            (300_000, today()),
            (300_000, today().checked_add_days(Days::new(30)).unwrap()),
        ],
    )
    .await;

    let messages = payment_plan_service::settle_plan(&h.ctx, plan_id)
        .await
        .unwrap();
    assert!(messages.is_empty());
    assert_eq!(h.balance(employee).await, 1_400_000);

    let job = h.jobs().await.remove(0);
    assert_eq!(job.amount, 600_000);
    assert_eq!(job.plan_ids.len(), 2);

    let statuses: Vec<PlanStatus> = h
        .instalments(plan_id)
        .await
        .into_iter()
        .map(|p| p.status)
        .collect();
    assert_eq!(statuses.iter().filter(|s| **s == PlanStatus::Sending).count(), 2);
    assert_eq!(statuses.iter().filter(|s| **s == PlanStatus::Pending).count(), 1);
}

#[tokio::test]
async fn test_one_active_plan_per_wallet() {
    let h = Harness::new().await;
    let employee = h.wallet(0).await;
    plan(&h, employee, &[(1_000, today())]).await;

    let account = h.bank_account(employee, BCA).await;
    let err = payment_plan_service::create_payment_plan(
        &h.ctx,
        CreatePaymentPlanRequest {
            wallet_id: employee,
            bank_account_id: account,
            instalments: vec![Instalment {
                amount: 1_000,
                due_date: today(),
            }],
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::PaymentPlanExists));
}

fn is_transfer_failed(err: &AppError) -> bool {
    matches!(err, AppError::UnprocessableEntity(reason) if reason == "TRANSFER_FAILED")
}

#[tokio::test]
async fn test_payroll_rolls_back_when_plan_cannot_be_settled() {
    let h = Harness::new().await;
    let employer = h.wallet(10_000_000).await;
    let employee = h.wallet(0).await;
    let plan_id = plan(&h, employee, &[(500_000, today())]).await;

    h.store.break_row(plan_id).await;
    let err = transfer_service::internal_transfer(&h.ctx, payroll(employer, employee, 5_000_000))
        .await
        .unwrap_err();
    assert!(is_transfer_failed(&err));
    assert_eq!(h.balance(employer).await, 10_000_000);
    assert_eq!(h.balance(employee).await, 0);
    assert!(h.jobs().await.is_empty());

    // Retrying pays the salary once and collects the instalment
    h.store.repair_row(plan_id).await;
    transfer_service::internal_transfer(&h.ctx, payroll(employer, employee, 5_000_000))
        .await
        .unwrap();
    assert_eq!(h.balance(employer).await, 5_000_000);
    assert_eq!(h.balance(employee).await, 4_500_000);
    assert_eq!(h.jobs().await.len(), 1);
}

#[tokio::test]
async fn test_replayed_payroll_credit_runs_scheduler_after_failure() {
    let h = Harness::new().await;
    let employee = h.wallet(0).await;
    let plan_id = plan(&h, employee, &[(500_000, today())]).await;
    let credit = BankCreditRequest {
        wallet_id: employee,
        amount: 5_000_000,
        flag: "RECEIVE_PAYROLL".to_string(),
        source_account: "014:9988776655".to_string(),
        channel_id: None,
        ref_number: "PAYROLL-2026-10".to_string(),
        notes: None,
    };

    h.store.break_row(plan_id).await;
    let err = transfer_service::receive_bank_credit(&h.ctx, credit.clone())
        .await
        .unwrap_err();
    assert!(is_transfer_failed(&err));
    assert_eq!(h.balance(employee).await, 0);

    h.store.repair_row(plan_id).await;
    transfer_service::receive_bank_credit(&h.ctx, credit)
        .await
        .unwrap();
    assert_eq!(h.balance(employee).await, 4_500_000);
    assert_eq!(h.instalments(plan_id).await[0].status, PlanStatus::Sending);
}

#[tokio::test]
async fn test_repeated_deferrals_share_one_schedule_job() {
    let h = Harness::new().await;
    let employer = h.wallet(10_000_000).await;
    let employee = h.wallet(0).await;
    let plan_id = plan(&h, employee, &[(500_000, today())]).await;

    for _ in 0..2 {
        let response = transfer_service::internal_transfer(&h.ctx, payroll(employer, employee, 100_000))
            .await
            .unwrap();
        assert_eq!(response.messages, vec![AUTO_DEBIT_MESSAGE.to_string()]);
    }
    let messages = payment_plan_service::settle_plan(&h.ctx, plan_id)
        .await
        .unwrap();
    assert_eq!(messages, vec![AUTO_DEBIT_MESSAGE.to_string()]);

    let jobs = h.jobs().await;
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].kind, SettlementKind::PlanSchedule);
    assert_eq!(jobs[0].status, SettlementStatus::Pending);
}
