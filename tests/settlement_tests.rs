mod common;

use chrono::Duration;

use common::{BCA, Harness};
use wallet_ledger::config::LedgerConfig;
use wallet_ledger::error::AppError;
use wallet_ledger::gateway::GatewayError;
use wallet_ledger::models::payment::PaymentStatus;
use wallet_ledger::models::settlement::{SettlementKind, SettlementStatus};
use wallet_ledger::services::transfer_service;
use wallet_ledger::store::LedgerStore;

#[tokio::test]
async fn test_transient_failures_then_settled() {
    let h = Harness::new().await;
    let alice = h.wallet(20_000).await;
    let account = h.bank_account(alice, BCA).await;
    let transfer = transfer_service::external_transfer(&h.ctx, h.external(alice, account, 10_000))
        .await
        .unwrap();

    h.gateway.fail_next_payments(3, GatewayError::Timeout);
    h.run_worker(6, Duration::hours(1)).await;

    let job = h.jobs().await.remove(0);
    assert_eq!(job.status, SettlementStatus::Settled);
    assert_eq!(job.attempt_count, 4);
    assert_eq!(job.bank_ref.as_deref(), Some("BR-1"));
    assert_eq!(h.gateway.payment_calls(), 4);
    assert_eq!(h.gateway.executed_payments(), 1);

    let view = transfer_service::get_transaction(&h.ctx, transfer.transaction_id)
        .await
        .unwrap();
    assert_eq!(view.status, PaymentStatus::Done);
    assert_eq!(view.bank_ref.as_deref(), Some("BR-1"));

    // The worker never touches balances
    assert_eq!(h.balance(alice).await, 3_500);
    assert_eq!(h.store.external_logs().await.len(), 4);
}

#[tokio::test]
async fn test_retry_waits_for_backoff() {
    let h = Harness::new().await;
    let alice = h.wallet(20_000).await;
    let account = h.bank_account(alice, BCA).await;
    transfer_service::external_transfer(&h.ctx, h.external(alice, account, 1_000))
        .await
        .unwrap();

    h.gateway.fail_next_payments(1, GatewayError::Status(503));
    let worker = h.worker();
    worker.run_once().await.unwrap();
    // Backoff for the first retry is at least two seconds
    worker.run_once().await.unwrap();

    let job = h.jobs().await.remove(0);
    assert_eq!(job.status, SettlementStatus::Retry);
    assert_eq!(job.attempt_count, 1);
    assert!(job.next_attempt_at >= common::start_time() + Duration::seconds(2));
    assert!(job.next_attempt_at <= common::start_time() + Duration::seconds(4));
    assert_eq!(h.gateway.payment_calls(), 1);
}

#[tokio::test]
async fn test_exhausted_one_shot_transfer_fails_without_refund() {
    let h = Harness::new().await;
    let alice = h.wallet(20_000).await;
    let account = h.bank_account(alice, BCA).await;
    transfer_service::external_transfer(&h.ctx, h.external(alice, account, 10_000))
        .await
        .unwrap();

    h.gateway.set_fail_all_payments(true);
    h.run_worker(10, Duration::hours(1)).await;

    let job = h.jobs().await.remove(0);
    assert_eq!(job.status, SettlementStatus::Failed);
    // First attempt plus the retry budget
    assert_eq!(job.attempt_count, 6);
    assert_eq!(h.gateway.payment_calls(), 6);
    assert!(job.last_error.is_some());
    assert_eq!(h.balance(alice).await, 3_500);
}

#[tokio::test]
async fn test_stale_in_flight_job_settles_without_resending() {
    let h = Harness::new().await;
    let alice = h.wallet(20_000).await;
    let account = h.bank_account(alice, BCA).await;
    transfer_service::external_transfer(&h.ctx, h.external(alice, account, 10_000))
        .await
        .unwrap();

    // A worker claimed the job and the bank executed it, then the worker died.
    let job = h.jobs().await.remove(0);
    let mut uow = h.store.begin().await.unwrap();
    let mut claimed = uow.lock_job(job.id).await.unwrap();
    claimed.status = SettlementStatus::InFlight;
    claimed.attempt_count = 1;
    uow.update_job(&claimed).await.unwrap();
    uow.commit().await.unwrap();
    h.gateway.mark_executed(&job.request_ref, "BR-LOST");

    // Not stale yet
    h.worker().run_once().await.unwrap();
    assert_eq!(h.gateway.status_calls(), 0);

    h.clock.advance(Duration::minutes(10));
    h.worker().run_once().await.unwrap();

    let job = h.jobs().await.remove(0);
    assert_eq!(job.status, SettlementStatus::Settled);
    assert_eq!(job.bank_ref.as_deref(), Some("BR-LOST"));
    assert_eq!(h.gateway.status_calls(), 1);
    assert_eq!(h.gateway.payment_calls(), 0);
    assert_eq!(h.gateway.executed_payments(), 1);
}

#[tokio::test]
async fn test_stale_job_unknown_to_bank_is_resent() {
    let h = Harness::new().await;
    let alice = h.wallet(20_000).await;
    let account = h.bank_account(alice, BCA).await;
    transfer_service::external_transfer(&h.ctx, h.external(alice, account, 10_000))
        .await
        .unwrap();

    let job = h.jobs().await.remove(0);
    let mut uow = h.store.begin().await.unwrap();
    let mut claimed = uow.lock_job(job.id).await.unwrap();
    claimed.status = SettlementStatus::InFlight;
    claimed.attempt_count = 1;
    uow.update_job(&claimed).await.unwrap();
    uow.commit().await.unwrap();

    h.clock.advance(Duration::minutes(10));
    h.worker().run_once().await.unwrap();

    let job = h.jobs().await.remove(0);
    assert_eq!(job.status, SettlementStatus::Settled);
    assert_eq!(h.gateway.status_calls(), 1);
    assert_eq!(h.gateway.payment_calls(), 1);
}

#[tokio::test]
async fn test_top_up_issues_virtual_account() {
    let h = Harness::new().await;
    let alice = h.wallet(0).await;

    let response = transfer_service::request_top_up(&h.ctx, alice, 250_000)
        .await
        .unwrap();
    assert_eq!(response.status, SettlementStatus::Pending);

    h.run_worker(1, Duration::minutes(1)).await;

    let job = h.jobs().await.remove(0);
    assert_eq!(job.id, response.job_id);
    assert_eq!(job.kind, SettlementKind::VirtualAccount);
    assert_eq!(job.status, SettlementStatus::Settled);
    assert_eq!(job.bank_ref.as_deref(), Some("880800000001"));
    assert_eq!(h.gateway.virtual_account_calls(), 1);
    assert_eq!(h.balance(alice).await, 0);
}

#[tokio::test]
async fn test_refund_external_transfer_reverses_transfer_and_fee() {
    let h = Harness::new().await;
    let alice = h.wallet(20_000).await;
    let account = h.bank_account(alice, BCA).await;
    let transfer = transfer_service::external_transfer(&h.ctx, h.external(alice, account, 10_000))
        .await
        .unwrap();

    let err = transfer_service::refund(&h.ctx, transfer.transaction_id)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::SettlementInProgress));

    h.run_worker(1, Duration::minutes(1)).await;

    let refund = transfer_service::refund(&h.ctx, transfer.transaction_id)
        .await
        .unwrap();
    assert_eq!(refund.reversal_ids.len(), 2);
    assert_eq!(h.balance(alice).await, 20_000);

    let primary = transfer_service::get_transaction(&h.ctx, refund.reversal_ids[0])
        .await
        .unwrap();
    assert_eq!(primary.amount, 10_000);
    assert_eq!(primary.transaction_type, "BANK_TRANSFER_REFUND");
    assert_eq!(primary.parent_id, Some(transfer.transaction_id));

    let fee = transfer_service::get_transaction(&h.ctx, refund.reversal_ids[1])
        .await
        .unwrap();
    assert_eq!(fee.amount, 6_500);
    assert_eq!(fee.transaction_type, "TRANSFER_FEE_REFUND");
    assert_eq!(fee.parent_id, transfer.fee_transaction_id);

    let original = transfer_service::get_transaction(&h.ctx, transfer.transaction_id)
        .await
        .unwrap();
    assert_eq!(original.status, PaymentStatus::Cancelled);
}

#[tokio::test]
async fn test_refund_without_fee_has_one_reversal() {
    let h = Harness::new().await;
    let alice = h.wallet(0).await;
    let top_up = h.top_up(alice, 5_000).await;

    let refund = transfer_service::refund(&h.ctx, top_up).await.unwrap();

    assert_eq!(refund.reversal_ids.len(), 1);
    let reversal = transfer_service::get_transaction(&h.ctx, refund.reversal_ids[0])
        .await
        .unwrap();
    assert_eq!(reversal.amount, -5_000);
    assert_eq!(h.balance(alice).await, 0);
}

#[tokio::test]
async fn test_refund_guards() {
    let h = Harness::new().await;
    let alice = h.wallet(20_000).await;
    let bob = h.wallet(0).await;
    let account = h.bank_account(alice, BCA).await;
    let transfer = transfer_service::external_transfer(&h.ctx, h.external(alice, account, 10_000))
        .await
        .unwrap();
    h.run_worker(1, Duration::minutes(1)).await;

    let err = transfer_service::refund(&h.ctx, transfer.fee_transaction_id.unwrap())
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotRefundable(_)));

    let refund = transfer_service::refund(&h.ctx, transfer.transaction_id)
        .await
        .unwrap();
    let again = transfer_service::refund(&h.ctx, transfer.transaction_id)
        .await
        .unwrap_err();
    assert!(matches!(again, AppError::AlreadyRefunded));

    let of_refund = transfer_service::refund(&h.ctx, refund.reversal_ids[0])
        .await
        .unwrap_err();
    assert!(matches!(of_refund, AppError::CannotRefundRefund));

    let internal = transfer_service::internal_transfer(&h.ctx, h.internal(alice, bob, 100))
        .await
        .unwrap();
    let err = transfer_service::refund(&h.ctx, internal.transaction_id)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotRefundable(_)));

    let missing = transfer_service::refund(&h.ctx, uuid::Uuid::new_v4()).await;
    assert!(matches!(missing, Err(AppError::TransactionNotFound(_))));
}

#[tokio::test]
async fn test_refund_gives_quota_back() {
    let h = Harness::new().await;
    let alice = h.wallet(100_000).await;
    let account = h.bank_account(alice, BCA).await;
    h.grant_quota(
        alice,
        1,
        wallet_ledger::models::quota::RewardType::Fixed,
        rust_decimal_macros::dec!(1000),
    )
    .await;

    let first = transfer_service::external_transfer(&h.ctx, h.external(alice, account, 10_000))
        .await
        .unwrap();
    assert!(first.cashback_transaction_id.is_some());
    h.run_worker(1, Duration::minutes(1)).await;

    transfer_service::refund(&h.ctx, first.transaction_id)
        .await
        .unwrap();
    // Cashback is kept
    assert_eq!(h.balance(alice).await, 101_000);

    let second = transfer_service::external_transfer(&h.ctx, h.external(alice, account, 10_000))
        .await
        .unwrap();
    assert!(second.cashback_transaction_id.is_some());
}

#[tokio::test]
async fn test_worker_honours_small_retry_budget() {
    let mut config = LedgerConfig::default();
    config.settlement.max_retries = 0;
    let h = Harness::with_config(config).await;
    let alice = h.wallet(20_000).await;
    let account = h.bank_account(alice, BCA).await;
    transfer_service::external_transfer(&h.ctx, h.external(alice, account, 1_000))
        .await
        .unwrap();

    h.gateway.fail_next_payments(1, GatewayError::Transport("reset".into()));
    h.run_worker(3, Duration::hours(1)).await;

    let job = h.jobs().await.remove(0);
    assert_eq!(job.status, SettlementStatus::Failed);
    assert_eq!(h.gateway.payment_calls(), 1);
}
