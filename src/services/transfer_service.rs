//! Transfer orchestrator.
//!
//! Sequences multi-leg ledger operations on top of the transaction core:
//!
//! ```text
//! VALIDATE → DEBIT_SOURCE → CREDIT_DESTINATION → (FEE) → (REWARD) → LINK → COMMIT
//! ```
//!
//! Validation that needs no lock (existence, lock state, PIN) runs first. All
//! legs of one operation are then posted in a single unit of work, so a
//! failure in any leg leaves no partial transfer behind. Wallets are locked in
//! ascending id order when more than one is involved. Bank delivery happens
//! later, on the settlement worker, after this commit.

use uuid::Uuid;

use crate::context::LedgerContext;
use crate::error::AppError;
use crate::gateway::InquiryResult;
use crate::models::bank::{Bank, BankAccount, InquiryRequest};
use crate::models::external_log::ExternalLog;
use crate::models::payment::PaymentStatus;
use crate::models::settlement::{SettlementJob, SettlementKind, TopUpResponse};
use crate::models::transaction::{
    BankCreditRequest, ExternalTransferRequest, HistoryQuery, InternalTransferRequest,
    RefundResponse, TransactionView, TransferResponse,
};
use crate::models::wallet::Wallet;
use crate::services::quota_service;
use crate::services::registry::TransactionProduct;
use crate::services::transaction_service::{
    Settlement, TransactionParams, execute_transaction, ledger_failure, process_transaction,
};
use crate::services::wallet_service;
use crate::store::UnitOfWork;

/// Load a wallet that is about to be debited or credited by a caller request.
async fn usable_wallet(uow: &mut dyn UnitOfWork, wallet_id: Uuid) -> Result<Wallet, AppError> {
    let wallet = uow
        .get_wallet(wallet_id)
        .await?
        .ok_or(AppError::WalletNotFound(wallet_id))?;
    if wallet.is_locked {
        return Err(AppError::WalletLocked);
    }
    Ok(wallet)
}

/// Beneficiary account registered to `wallet_id`, with its bank.
async fn beneficiary(
    uow: &mut dyn UnitOfWork,
    wallet_id: Uuid,
    bank_account_id: Uuid,
) -> Result<(BankAccount, Bank), AppError> {
    let account = uow
        .get_bank_account(bank_account_id)
        .await?
        .filter(|account| account.wallet_id == wallet_id)
        .ok_or(AppError::BankAccountNotFound)?;
    let bank = uow
        .get_bank(&account.bank_code)
        .await?
        .ok_or(AppError::BankAccountNotFound)?;
    Ok((account, bank))
}

/// Move money between two wallets.
///
/// # Errors
///
/// - `InvalidTransactionType`: flag has no receiver leg
/// - `SameAccount`, `InvalidAmount`, `WalletNotFound`, `WalletLocked`
/// - `IncorrectPin` / `MaxPinAttempt`
/// - `InsufficientBalance`
pub async fn internal_transfer(
    ctx: &LedgerContext,
    request: InternalTransferRequest,
) -> Result<TransferResponse, AppError> {
    let product = TransactionProduct::resolve(&request.flag)?;
    let receive = product
        .paired_receive()
        .ok_or_else(|| AppError::InvalidTransactionType {
            flag: request.flag.clone(),
            reason: "not a wallet-to-wallet type",
        })?;
    if request.amount <= 0 {
        return Err(AppError::InvalidAmount);
    }
    if request.source == request.destination {
        return Err(AppError::SameAccount);
    }

    {
        let mut uow = ctx.store.begin().await?;
        usable_wallet(uow.as_mut(), request.source).await?;
        usable_wallet(uow.as_mut(), request.destination).await?;
    }
    wallet_service::verify_pin(ctx, request.source, &request.pin).await?;

    let now = ctx.clock.now();
    let mut uow = ctx.store.begin().await.map_err(ledger_failure)?;

    let (first, second) = if request.source < request.destination {
        (request.source, request.destination)
    } else {
        (request.destination, request.source)
    };
    for wallet_id in [first, second] {
        if uow.lock_wallet(wallet_id).await?.is_locked {
            return Err(AppError::WalletLocked);
        }
    }

    let debit = process_transaction(
        uow.as_mut(),
        now,
        TransactionParams {
            wallet_id: request.source,
            source: request.source.to_string(),
            destination: request.destination.to_string(),
            amount: request.amount,
            is_credit: false,
            flag: product.flag().to_string(),
            notes: request.notes.clone(),
            channel_id: None,
            ref_number: None,
            parent_id: None,
            settle_to: None,
        },
    )
    .await?;

    let credit = process_transaction(
        uow.as_mut(),
        now,
        TransactionParams {
            wallet_id: request.destination,
            source: request.source.to_string(),
            destination: request.destination.to_string(),
            amount: request.amount,
            is_credit: true,
            flag: receive.flag().to_string(),
            notes: request.notes,
            channel_id: None,
            ref_number: None,
            parent_id: Some(debit.transaction().id),
            settle_to: None,
        },
    )
    .await?;

    let messages = credit
        .loaded
        .post_create(uow.as_mut(), ctx)
        .await
        .map_err(ledger_failure)?;
    uow.commit().await.map_err(ledger_failure)?;

    tracing::info!(
        transaction_id = %debit.transaction().id,
        source = %request.source,
        destination = %request.destination,
        amount = request.amount,
        flag = %product,
        "Internal transfer committed"
    );

    let mut response = TransferResponse::new(debit.transaction().id);
    response.messages = messages;
    Ok(response)
}

/// Send money from a wallet to a registered bank account.
///
/// Posts the transfer, the tier fee (if any) chained to it, and a cashback
/// chained to the fee when the wallet's quota rewards it. The bank payment is
/// enqueued for the settlement worker.
///
/// # Errors
///
/// - `InvalidTransactionType`: flag is not an outbound bank type
/// - `InvalidAmount`, `WalletNotFound`, `WalletLocked`, `BankAccountNotFound`
/// - `IncorrectPin` / `MaxPinAttempt`
/// - `InsufficientBalance`: balance below amount plus fee
pub async fn external_transfer(
    ctx: &LedgerContext,
    request: ExternalTransferRequest,
) -> Result<TransferResponse, AppError> {
    let product = TransactionProduct::resolve(&request.flag)?;
    if !product.is_external() {
        return Err(AppError::InvalidTransactionType {
            flag: request.flag,
            reason: "not an outbound bank type",
        });
    }
    if request.amount <= 0 {
        return Err(AppError::InvalidAmount);
    }

    let (account, bank) = {
        let mut uow = ctx.store.begin().await?;
        usable_wallet(uow.as_mut(), request.source).await?;
        beneficiary(uow.as_mut(), request.source, request.bank_account_id).await?
    };
    wallet_service::verify_pin(ctx, request.source, &request.pin).await?;

    let fee = ctx.config.fees.fee_for(&bank);
    let destination = account.destination();
    let now = ctx.clock.now();
    let mut uow = ctx.store.begin().await.map_err(ledger_failure)?;

    let wallet = uow.lock_wallet(request.source).await?;
    if wallet.is_locked {
        return Err(AppError::WalletLocked);
    }
    let total = request
        .amount
        .checked_add(fee)
        .ok_or(AppError::InvalidAmount)?;
    if wallet.balance < total {
        return Err(AppError::InsufficientBalance);
    }

    let transfer = process_transaction(
        uow.as_mut(),
        now,
        TransactionParams {
            wallet_id: request.source,
            source: request.source.to_string(),
            destination: destination.to_string(),
            amount: request.amount,
            is_credit: false,
            flag: product.flag().to_string(),
            notes: request.notes,
            channel_id: None,
            ref_number: None,
            parent_id: None,
            settle_to: Some(Settlement {
                destination: destination.clone(),
                plan: None,
            }),
        },
    )
    .await?;
    let mut response = TransferResponse::new(transfer.transaction().id);

    if fee > 0 {
        let fee_leg = process_transaction(
            uow.as_mut(),
            now,
            TransactionParams {
                wallet_id: request.source,
                source: request.source.to_string(),
                destination: bank.code.clone(),
                amount: fee,
                is_credit: false,
                flag: TransactionProduct::TransferFee.flag().to_string(),
                notes: Some(format!("{} transfer fee", bank.tier)),
                channel_id: None,
                ref_number: None,
                parent_id: Some(transfer.transaction().id),
                settle_to: None,
            },
        )
        .await?;
        response.fee_transaction_id = Some(fee_leg.transaction().id);

        let reward =
            quota_service::use_quota(uow.as_mut(), now, request.source, fee_leg.transaction())
                .await
                .map_err(ledger_failure)?;
        if reward.is_rewarded {
            let cashback = process_transaction(
                uow.as_mut(),
                now,
                TransactionParams {
                    wallet_id: request.source,
                    source: bank.code.clone(),
                    destination: request.source.to_string(),
                    amount: reward.reward_amount,
                    is_credit: true,
                    flag: TransactionProduct::Cashback.flag().to_string(),
                    notes: None,
                    channel_id: None,
                    ref_number: None,
                    parent_id: Some(fee_leg.transaction().id),
                    settle_to: None,
                },
            )
            .await?;
            response.cashback_transaction_id = Some(cashback.transaction().id);
        }
    }

    uow.commit().await.map_err(ledger_failure)?;

    tracing::info!(
        transaction_id = %transfer.transaction().id,
        source = %request.source,
        bank_code = %bank.code,
        amount = request.amount,
        fee,
        cashback = response.cashback_transaction_id.is_some(),
        "External transfer committed"
    );
    Ok(response)
}

/// Reverse a transaction and, for outbound transfers, its fee.
///
/// Cashback is not reversed. The fee's quota use is given back and the
/// original payment is marked CANCELLED.
///
/// # Errors
///
/// - `TransactionNotFound`
/// - `CannotRefundRefund`: the transaction is itself a reversal
/// - `NotRefundable`: the type has no reversal, or is a fee (refund its transfer)
/// - `AlreadyRefunded`
/// - `SettlementInProgress`: the bank payment has not reached a final state
pub async fn refund(ctx: &LedgerContext, transaction_id: Uuid) -> Result<RefundResponse, AppError> {
    let now = ctx.clock.now();
    let mut uow = ctx.store.begin().await.map_err(ledger_failure)?;

    let original = uow
        .get_transaction(transaction_id)
        .await?
        .ok_or(AppError::TransactionNotFound(transaction_id))?;
    let product = TransactionProduct::resolve(&original.transaction_type)?;
    if product.is_refund() {
        return Err(AppError::CannotRefundRefund);
    }
    let reversal = match product.refund_flag() {
        Some(reversal) if product != TransactionProduct::TransferFee => reversal,
        _ => return Err(AppError::NotRefundable(product.flag().to_string())),
    };

    uow.lock_wallet(original.wallet_id).await?;

    let children = uow.child_transactions(original.id).await?;
    let already_refunded = children.iter().any(|child| {
        TransactionProduct::resolve(&child.transaction_type).is_ok_and(|p| p.is_refund())
    });
    if already_refunded {
        return Err(AppError::AlreadyRefunded);
    }

    let in_flight = uow
        .jobs_for_payment(original.payment_id)
        .await?
        .iter()
        .any(|job| !job.status.is_terminal());
    if in_flight {
        return Err(AppError::SettlementInProgress);
    }

    let mut reversal_ids = Vec::with_capacity(2);
    let primary = process_transaction(
        uow.as_mut(),
        now,
        TransactionParams {
            wallet_id: original.wallet_id,
            source: original.wallet_id.to_string(),
            destination: original.wallet_id.to_string(),
            amount: original.amount.abs(),
            is_credit: reversal.is_credit(),
            flag: reversal.flag().to_string(),
            notes: Some(format!("Refund of {}", original.id)),
            channel_id: None,
            ref_number: None,
            parent_id: Some(original.id),
            settle_to: None,
        },
    )
    .await?;
    reversal_ids.push(primary.transaction().id);

    for fee in children
        .iter()
        .filter(|child| child.transaction_type == TransactionProduct::TransferFee.flag())
    {
        let fee_reversal = process_transaction(
            uow.as_mut(),
            now,
            TransactionParams {
                wallet_id: fee.wallet_id,
                source: fee.wallet_id.to_string(),
                destination: fee.wallet_id.to_string(),
                amount: fee.amount.abs(),
                is_credit: true,
                flag: TransactionProduct::TransferFeeRefund.flag().to_string(),
                notes: Some(format!("Refund of {}", fee.id)),
                channel_id: None,
                ref_number: None,
                parent_id: Some(fee.id),
                settle_to: None,
            },
        )
        .await?;
        quota_service::revert_usage(uow.as_mut(), now, fee, fee_reversal.transaction())
            .await
            .map_err(ledger_failure)?;
        reversal_ids.push(fee_reversal.transaction().id);
    }

    if let Some(mut payment) = uow
        .get_payment(original.payment_id)
        .await
        .map_err(ledger_failure)?
    {
        payment.status = PaymentStatus::Cancelled;
        payment.updated_at = now;
        uow.update_payment(&payment).await.map_err(ledger_failure)?;
    }
    uow.commit().await.map_err(ledger_failure)?;

    tracing::info!(
        transaction_id = %original.id,
        flag = %product,
        reversals = reversal_ids.len(),
        "Transaction refunded"
    );
    Ok(RefundResponse { reversal_ids })
}

/// Credit a wallet from a bank callback.
///
/// A repeated callback with the same `ref_number` returns the transaction the
/// first one recorded.
pub async fn receive_bank_credit(
    ctx: &LedgerContext,
    request: BankCreditRequest,
) -> Result<TransferResponse, AppError> {
    let product = TransactionProduct::resolve(&request.flag)?;
    if !product.is_bank_credit() {
        return Err(AppError::InvalidTransactionType {
            flag: request.flag,
            reason: "not a bank credit type",
        });
    }
    if request.amount <= 0 {
        return Err(AppError::InvalidAmount);
    }
    if request.ref_number.is_empty() {
        return Err(AppError::InvalidRequest(
            "ref_number is required".to_string(),
        ));
    }

    let params = TransactionParams {
        wallet_id: request.wallet_id,
        source: request.source_account,
        destination: request.wallet_id.to_string(),
        amount: request.amount,
        is_credit: true,
        flag: product.flag().to_string(),
        notes: request.notes,
        channel_id: request.channel_id,
        ref_number: Some(request.ref_number.clone()),
        parent_id: None,
        settle_to: None,
    };

    match execute_transaction(ctx, params).await {
        Ok((posted, messages)) => {
            tracing::info!(
                transaction_id = %posted.transaction().id,
                wallet_id = %request.wallet_id,
                ref_number = %request.ref_number,
                flag = %product,
                "Bank credit recorded"
            );
            let mut response = TransferResponse::new(posted.transaction().id);
            response.messages = messages;
            Ok(response)
        }
        Err(AppError::DuplicatePayment(_)) => {
            let mut uow = ctx.store.begin().await?;
            let payment = uow
                .find_payment_by_ref(&request.ref_number)
                .await?
                .ok_or_else(|| AppError::DuplicatePayment(request.ref_number.clone()))?;
            let existing = uow
                .transaction_for_payment(payment.id)
                .await?
                .ok_or_else(|| AppError::DuplicatePayment(request.ref_number.clone()))?;
            tracing::info!(
                transaction_id = %existing.id,
                ref_number = %request.ref_number,
                "Bank credit already processed"
            );
            Ok(TransferResponse::new(existing.id))
        }
        Err(e) => Err(e),
    }
}

/// Ask the bank for a virtual account the wallet can be topped up through.
pub async fn request_top_up(
    ctx: &LedgerContext,
    wallet_id: Uuid,
    amount: i64,
) -> Result<TopUpResponse, AppError> {
    if amount <= 0 {
        return Err(AppError::InvalidAmount);
    }
    let mut uow = ctx.store.begin().await?;
    usable_wallet(uow.as_mut(), wallet_id).await?;

    let job = SettlementJob::new(
        SettlementKind::VirtualAccount,
        wallet_id,
        amount,
        ctx.clock.now(),
    );
    uow.enqueue_job(&job).await?;
    uow.commit().await?;

    tracing::info!(job_id = %job.id, wallet_id = %wallet_id, amount, "Top-up requested");
    Ok(TopUpResponse {
        job_id: job.id,
        status: job.status,
    })
}

/// Confirm a beneficiary with the destination bank before transferring.
pub async fn inquire_bank_account(
    ctx: &LedgerContext,
    request: InquiryRequest,
) -> Result<InquiryResult, AppError> {
    let (account, _) = {
        let mut uow = ctx.store.begin().await?;
        beneficiary(uow.as_mut(), request.wallet_id, request.bank_account_id).await?
    };
    let destination = account.destination();

    let started = std::time::Instant::now();
    let result = ctx.gateway.get_interbank_inquiry(&destination).await;
    let latency_ms = started.elapsed().as_millis() as i64;

    let log = ExternalLog::new(
        None,
        "get_interbank_inquiry",
        serde_json::to_value(&destination).unwrap_or_default(),
        match &result {
            Ok(found) => serde_json::to_value(found).ok(),
            Err(e) => Some(serde_json::json!({ "error": e.to_string() })),
        },
        latency_ms,
        result.is_ok(),
        ctx.clock.now(),
    );
    if let Err(e) = ctx.store.append_external_log(&log).await {
        tracing::warn!(error = %e, "Failed to record inquiry log");
    }

    result.map_err(|e| AppError::InquiryFailed(e.to_string()))
}

/// Wallet history in `[from, to)`, oldest first.
pub async fn history(
    ctx: &LedgerContext,
    wallet_id: Uuid,
    query: HistoryQuery,
) -> Result<Vec<TransactionView>, AppError> {
    if query.from >= query.to {
        return Err(AppError::InvalidRequest(
            "from must be before to".to_string(),
        ));
    }
    wallet_service::get_wallet(ctx, wallet_id).await?;

    let rows = ctx
        .store
        .list_transactions(wallet_id, query.from, query.to)
        .await?;
    Ok(rows
        .into_iter()
        .filter(|(transaction, _)| query.direction.includes(transaction))
        .map(|(transaction, payment)| TransactionView::new(transaction, &payment))
        .collect())
}

pub async fn get_transaction(
    ctx: &LedgerContext,
    transaction_id: Uuid,
) -> Result<TransactionView, AppError> {
    let mut uow = ctx.store.begin().await?;
    let transaction = uow
        .get_transaction(transaction_id)
        .await?
        .ok_or(AppError::TransactionNotFound(transaction_id))?;
    let payment = uow
        .get_payment(transaction.payment_id)
        .await?
        .ok_or_else(|| AppError::Store(format!("transaction {transaction_id} has no payment")))?;
    Ok(TransactionView::new(transaction, &payment))
}
