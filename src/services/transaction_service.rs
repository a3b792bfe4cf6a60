//! Transaction core - the only code that changes wallet balances.
//!
//! This service handles:
//! - Payment creation with ref_number idempotency
//! - Locked, re-verified debits and unconditional credits
//! - Enqueueing the settlement job for debits that leave the ledger
//!
//! # Atomicity Guarantees
//!
//! Everything here runs inside the caller's unit of work. A failure anywhere
//! leaves nothing behind once the caller drops it: the payment, the
//! transaction, the balance change and the settlement job roll back together.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::context::LedgerContext;
use crate::error::AppError;
use crate::models::bank::BankDestination;
use crate::models::payment::{NewPayment, Payment, PaymentStatus, PaymentType};
use crate::models::settlement::SettlementJob;
use crate::models::transaction::Transaction;
use crate::services::registry::{Draft, Loaded, TransactionProduct};
use crate::store::UnitOfWork;

/// Public reason code for a rolled-back ledger write.
pub const TRANSFER_FAILED: &str = "TRANSFER_FAILED";

/// Where a debit is delivered once it leaves the ledger.
#[derive(Debug, Clone)]
pub struct Settlement {
    pub destination: BankDestination,
    /// Payment plan and instalments an auto-debit covers
    pub plan: Option<(Uuid, Vec<Uuid>)>,
}

/// Parameters for `process_transaction`.
#[derive(Debug, Clone)]
pub struct TransactionParams {
    /// Wallet whose balance moves
    pub wallet_id: Uuid,
    pub source: String,
    pub destination: String,
    /// Magnitude in minor units; the sign comes from `is_credit`
    pub amount: i64,
    pub is_credit: bool,
    pub flag: String,
    pub notes: Option<String>,
    pub channel_id: Option<String>,
    pub ref_number: Option<String>,
    pub parent_id: Option<Uuid>,
    pub settle_to: Option<Settlement>,
}

/// Result of a posted transaction.
#[derive(Debug, Clone)]
pub struct Posted {
    pub loaded: Loaded,
    pub job: Option<SettlementJob>,
}

impl Posted {
    pub fn transaction(&self) -> &Transaction {
        &self.loaded.transaction
    }
}

/// Collapse store failures into the public `TRANSFER_FAILED` reason.
///
/// Validation errors pass through unchanged so callers can still tell an
/// insufficient balance from a broken connection.
pub fn ledger_failure(error: AppError) -> AppError {
    if error.is_persistence() {
        tracing::error!(error = %error, "Ledger write rolled back");
        AppError::UnprocessableEntity(TRANSFER_FAILED.to_string())
    } else {
        error
    }
}

/// Insert a payment.
///
/// # Errors
///
/// - `DuplicatePayment`: `ref_number` already recorded. Callers treat this as
///   "already processed".
pub async fn create_payment(
    uow: &mut dyn UnitOfWork,
    now: DateTime<Utc>,
    new_payment: NewPayment,
) -> Result<Payment, AppError> {
    let payment = new_payment.into_payment(now);
    uow.insert_payment(&payment).await?;
    Ok(payment)
}

/// Remove `amount` from a wallet.
///
/// Takes the wallet's row lock and re-checks the balance under it, so two
/// concurrent debits can never both pass a stale check.
///
/// # Errors
///
/// - `WalletNotFound`
/// - `InsufficientBalance`: balance below `amount`; nothing is written
/// - `InvalidAmount`: `amount` has no absolute value in `i64`
pub async fn debit_transaction(
    uow: &mut dyn UnitOfWork,
    now: DateTime<Utc>,
    product: TransactionProduct,
    payment: &Payment,
    params: &TransactionParams,
) -> Result<(Transaction, Option<SettlementJob>), AppError> {
    let amount = params.amount.checked_abs().ok_or(AppError::InvalidAmount)?;
    let mut wallet = uow.lock_wallet(params.wallet_id).await?;
    wallet.balance = match wallet.balance.checked_sub(amount) {
        Some(balance) if balance >= 0 => balance,
        _ => return Err(AppError::InsufficientBalance),
    };
    wallet.updated_at = now;
    uow.update_wallet(&wallet).await?;

    let transaction = new_transaction(now, product, payment.id, -amount, params);
    uow.insert_transaction(&transaction).await?;

    let job = match (product.settlement_kind(), &params.settle_to) {
        (Some(kind), Some(settlement)) => {
            let mut job = SettlementJob::new(kind, wallet.id, amount, now)
                .for_payment(payment.id)
                .to(settlement.destination.clone());
            if let Some((payment_plan_id, plan_ids)) = &settlement.plan {
                job = job.for_plan(*payment_plan_id, plan_ids.clone());
            }
            uow.enqueue_job(&job).await?;
            Some(job)
        }
        _ => None,
    };

    Ok((transaction, job))
}

/// Add `amount` to a wallet.
///
/// Fails with `InvalidAmount` when the new balance would not fit in `i64`.
pub async fn credit_transaction(
    uow: &mut dyn UnitOfWork,
    now: DateTime<Utc>,
    product: TransactionProduct,
    payment: &Payment,
    params: &TransactionParams,
) -> Result<Transaction, AppError> {
    let amount = params.amount.checked_abs().ok_or(AppError::InvalidAmount)?;
    let mut wallet = uow.lock_wallet(params.wallet_id).await?;
    wallet.balance = wallet
        .balance
        .checked_add(amount)
        .ok_or(AppError::InvalidAmount)?;
    wallet.updated_at = now;
    uow.update_wallet(&wallet).await?;

    let transaction = new_transaction(now, product, payment.id, amount, params);
    uow.insert_transaction(&transaction).await?;
    Ok(transaction)
}

fn new_transaction(
    now: DateTime<Utc>,
    product: TransactionProduct,
    payment_id: Uuid,
    amount: i64,
    params: &TransactionParams,
) -> Transaction {
    Transaction {
        id: Uuid::new_v4(),
        payment_id,
        wallet_id: params.wallet_id,
        amount,
        transaction_type: product.flag().to_string(),
        notes: params.notes.clone(),
        parent_id: params.parent_id,
        created_at: now,
    }
}

/// Create a payment and its single transaction.
///
/// # Process
///
/// 1. Resolve the flag and check the type's invariants
/// 2. Check the parent transaction exists
/// 3. Create the payment (PENDING if it settles against the bank, DONE otherwise)
/// 4. Dispatch to debit or credit
///
/// # Errors
///
/// Validation errors (`InsufficientBalance`, `DuplicatePayment`,
/// `MissingChannel`, ...) are returned as-is. Store failures become
/// `UnprocessableEntity("TRANSFER_FAILED")`. Either way the caller must drop or
/// roll back the unit of work.
pub async fn process_transaction(
    uow: &mut dyn UnitOfWork,
    now: DateTime<Utc>,
    params: TransactionParams,
) -> Result<Posted, AppError> {
    if params.amount == 0 {
        return Err(AppError::InvalidAmount);
    }
    let product = TransactionProduct::resolve(&params.flag)?;
    product.validate(Draft {
        channel_id: params.channel_id.as_deref(),
        parent_id: params.parent_id,
        has_destination: params.settle_to.is_some(),
    })?;

    post(uow, now, product, params).await.map_err(ledger_failure)
}

async fn post(
    uow: &mut dyn UnitOfWork,
    now: DateTime<Utc>,
    product: TransactionProduct,
    params: TransactionParams,
) -> Result<Posted, AppError> {
    if let Some(parent_id) = params.parent_id {
        if uow.get_transaction(parent_id).await?.is_none() {
            return Err(AppError::MissingParent(product.flag().to_string()));
        }
    }

    let amount = params.amount.checked_abs().ok_or(AppError::InvalidAmount)?;
    let settles = params.settle_to.is_some() && product.settlement_kind().is_some();
    let payment = create_payment(
        uow,
        now,
        NewPayment {
            source_account: params.source.clone(),
            destination: params.destination.clone(),
            amount: if params.is_credit { amount } else { -amount },
            payment_type: if params.is_credit {
                PaymentType::Credit
            } else {
                PaymentType::Debit
            },
            channel_id: params.channel_id.clone(),
            ref_number: params.ref_number.clone(),
            status: if settles {
                PaymentStatus::Pending
            } else {
                PaymentStatus::Done
            },
        },
    )
    .await?;

    let (transaction, job) = if params.is_credit {
        let transaction = credit_transaction(uow, now, product, &payment, &params).await?;
        (transaction, None)
    } else {
        debit_transaction(uow, now, product, &payment, &params).await?
    };

    tracing::debug!(
        transaction_id = %transaction.id,
        wallet_id = %transaction.wallet_id,
        flag = %product,
        amount = transaction.amount,
        "Transaction posted"
    );

    Ok(Posted {
        loaded: product.load(transaction, payment),
        job,
    })
}

/// Post a single transaction and its type's side effects in one unit of work
/// and commit them together. Returns the side-effect messages alongside.
pub async fn execute_transaction(
    ctx: &LedgerContext,
    params: TransactionParams,
) -> Result<(Posted, Vec<String>), AppError> {
    let mut uow = ctx.store.begin().await.map_err(ledger_failure)?;
    let posted = process_transaction(uow.as_mut(), ctx.clock.now(), params).await?;
    let messages = posted
        .loaded
        .post_create(uow.as_mut(), ctx)
        .await
        .map_err(ledger_failure)?;
    uow.commit().await.map_err(ledger_failure)?;
    Ok((posted, messages))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::wallet::Wallet;
    use crate::store::{InMemoryLedgerStore, LedgerStore};

    async fn funded_wallet(store: &InMemoryLedgerStore, balance: i64) -> Wallet {
        let mut wallet = Wallet::new("123456", Utc::now());
        wallet.balance = balance;
        let mut uow = store.begin().await.unwrap();
        uow.insert_wallet(&wallet).await.unwrap();
        uow.commit().await.unwrap();
        wallet
    }

    fn params(wallet_id: Uuid, amount: i64, is_credit: bool, flag: &str) -> TransactionParams {
        TransactionParams {
            wallet_id,
            source: wallet_id.to_string(),
            destination: "elsewhere".into(),
            amount,
            is_credit,
            flag: flag.into(),
            notes: None,
            channel_id: None,
            ref_number: None,
            parent_id: None,
            settle_to: None,
        }
    }

    #[tokio::test]
    async fn test_debit_is_negative_and_reduces_balance() {
        let store = InMemoryLedgerStore::new();
        let wallet = funded_wallet(&store, 10_000).await;

        let mut uow = store.begin().await.unwrap();
        let posted = process_transaction(
            uow.as_mut(),
            Utc::now(),
            params(wallet.id, 1_500, false, "TRANSFER"),
        )
        .await
        .unwrap();
        assert_eq!(posted.transaction().amount, -1_500);
        assert_eq!(posted.loaded.payment.status, PaymentStatus::Done);
        assert_eq!(uow.lock_wallet(wallet.id).await.unwrap().balance, 8_500);
    }

    #[tokio::test]
    async fn test_insufficient_balance_writes_nothing() {
        let store = InMemoryLedgerStore::new();
        let wallet = funded_wallet(&store, 100).await;

        let mut uow = store.begin().await.unwrap();
        let err = process_transaction(
            uow.as_mut(),
            Utc::now(),
            params(wallet.id, 150, false, "TRANSFER"),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::InsufficientBalance));
        drop(uow);

        assert_eq!(store.total_balance().await, 100);
        let rows = store
            .list_transactions(wallet.id, DateTime::<Utc>::MIN_UTC, DateTime::<Utc>::MAX_UTC)
            .await
            .unwrap();
        assert!(rows.is_empty());
    }

    #[tokio::test]
    async fn test_credit_past_i64_range_rejected() {
        let store = InMemoryLedgerStore::new();
        let wallet = funded_wallet(&store, i64::MAX - 10).await;

        let mut uow = store.begin().await.unwrap();
        let err = process_transaction(
            uow.as_mut(),
            Utc::now(),
            params(wallet.id, 11, true, "RECEIVE_PAYROLL"),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::InvalidAmount));
        drop(uow);

        assert_eq!(store.total_balance().await, i64::MAX - 10);
    }

    #[tokio::test]
    async fn test_duplicate_ref_surfaces_typed() {
        let store = InMemoryLedgerStore::new();
        let wallet = funded_wallet(&store, 0).await;
        let mut credit = params(wallet.id, 500, true, "RECEIVE_PAYROLL");
        credit.ref_number = Some("PAY-1".into());

        let mut uow = store.begin().await.unwrap();
        process_transaction(uow.as_mut(), Utc::now(), credit.clone())
            .await
            .unwrap();
        let err = process_transaction(uow.as_mut(), Utc::now(), credit)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::DuplicatePayment(_)));
    }

    #[tokio::test]
    async fn test_missing_parent_rejected() {
        let store = InMemoryLedgerStore::new();
        let wallet = funded_wallet(&store, 1_000).await;
        let mut fee = params(wallet.id, 100, false, "TRANSFER_FEE");
        fee.parent_id = Some(Uuid::new_v4());

        let mut uow = store.begin().await.unwrap();
        let err = process_transaction(uow.as_mut(), Utc::now(), fee)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::MissingParent(_)));
    }

    #[tokio::test]
    async fn test_bank_transfer_enqueues_settlement() {
        let store = InMemoryLedgerStore::new();
        let wallet = funded_wallet(&store, 5_000).await;
        let mut debit = params(wallet.id, 2_000, false, "BANK_TRANSFER");
        debit.settle_to = Some(Settlement {
            destination: BankDestination {
                bank_code: "014".into(),
                account_no: "1234567890".into(),
                account_name: "Budi".into(),
            },
            plan: None,
        });

        let mut uow = store.begin().await.unwrap();
        let posted = process_transaction(uow.as_mut(), Utc::now(), debit)
            .await
            .unwrap();
        uow.commit().await.unwrap();

        let job = posted.job.expect("settlement job");
        assert_eq!(job.amount, 2_000);
        assert_eq!(job.payment_id, Some(posted.loaded.payment.id));
        assert_eq!(posted.loaded.payment.status, PaymentStatus::Pending);
        assert_eq!(store.jobs().await.len(), 1);
    }
}
