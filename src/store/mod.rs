//! Ledger persistence port.
//!
//! The ledger talks to storage through two traits:
//! - `LedgerStore`: the pool-level handle; opens units of work and serves the
//!   few read paths that need no transaction
//! - `UnitOfWork`: one ACID transaction. `lock_*` methods take an exclusive row
//!   lock held until commit or rollback (`SELECT ... FOR UPDATE` semantics).
//!   Dropping a unit of work without committing rolls it back.
//!
//! Two implementations ship with the crate: `postgres::PgLedgerStore` (sqlx) and
//! `memory::InMemoryLedgerStore`.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::bank::{Bank, BankAccount};
use crate::models::external_log::ExternalLog;
use crate::models::payment::Payment;
use crate::models::payment_plan::{PaymentPlan, Plan, PlanStatus};
use crate::models::quota::{Quota, QuotaUsage};
use crate::models::settlement::{SettlementJob, SettlementKind};
use crate::models::transaction::Transaction;
use crate::models::wallet::Wallet;

pub use memory::InMemoryLedgerStore;
pub use postgres::PgLedgerStore;

pub type StoreResult<T> = Result<T, AppError>;

#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Cheap connectivity check.
    async fn ping(&self) -> StoreResult<()>;

    /// Open a unit of work.
    async fn begin(&self) -> StoreResult<Box<dyn UnitOfWork>>;

    /// Transactions of a wallet created in `[from, to)`, oldest first, with their payments.
    async fn list_transactions(
        &self,
        wallet_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> StoreResult<Vec<(Transaction, Payment)>>;

    /// Jobs ready to run: PENDING/RETRY whose `next_attempt_at` has passed, and
    /// IN_FLIGHT jobs untouched since `stale_before`.
    async fn due_jobs(
        &self,
        now: DateTime<Utc>,
        stale_before: DateTime<Utc>,
        limit: usize,
    ) -> StoreResult<Vec<SettlementJob>>;

    /// Append a gateway audit record outside any unit of work.
    async fn append_external_log(&self, log: &ExternalLog) -> StoreResult<()>;
}

#[async_trait]
pub trait UnitOfWork: Send {
    // === Wallets ===
    async fn insert_wallet(&mut self, wallet: &Wallet) -> StoreResult<()>;
    async fn get_wallet(&mut self, id: Uuid) -> StoreResult<Option<Wallet>>;
    /// Exclusive row lock; `WalletNotFound` if missing.
    async fn lock_wallet(&mut self, id: Uuid) -> StoreResult<Wallet>;
    async fn update_wallet(&mut self, wallet: &Wallet) -> StoreResult<()>;

    // === Payments ===
    /// `DuplicatePayment` if `ref_number` is already taken.
    async fn insert_payment(&mut self, payment: &Payment) -> StoreResult<()>;
    async fn get_payment(&mut self, id: Uuid) -> StoreResult<Option<Payment>>;
    async fn find_payment_by_ref(&mut self, ref_number: &str) -> StoreResult<Option<Payment>>;
    async fn update_payment(&mut self, payment: &Payment) -> StoreResult<()>;

    // === Transactions ===
    async fn insert_transaction(&mut self, transaction: &Transaction) -> StoreResult<()>;
    async fn get_transaction(&mut self, id: Uuid) -> StoreResult<Option<Transaction>>;
    async fn transaction_for_payment(&mut self, payment_id: Uuid)
    -> StoreResult<Option<Transaction>>;
    async fn child_transactions(&mut self, parent_id: Uuid) -> StoreResult<Vec<Transaction>>;

    // === Quotas ===
    async fn insert_quota(&mut self, quota: &Quota) -> StoreResult<()>;
    /// The earliest-starting quota of the wallet whose validity window
    /// contains `now` and whose net usage is below its allowance.
    async fn available_quota(
        &mut self,
        wallet_id: Uuid,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<Quota>>;
    /// Net usage recorded against a quota.
    async fn quota_used(&mut self, quota_id: Uuid) -> StoreResult<i64>;
    async fn quota_usage_for(&mut self, transaction_id: Uuid) -> StoreResult<Option<QuotaUsage>>;
    /// Returns `false` when the transaction already has a usage row.
    async fn insert_quota_usage(&mut self, usage: &QuotaUsage) -> StoreResult<bool>;

    // === Banks ===
    async fn insert_bank(&mut self, bank: &Bank) -> StoreResult<()>;
    async fn get_bank(&mut self, code: &str) -> StoreResult<Option<Bank>>;
    async fn insert_bank_account(&mut self, account: &BankAccount) -> StoreResult<()>;
    async fn get_bank_account(&mut self, id: Uuid) -> StoreResult<Option<BankAccount>>;

    // === Payment plans ===
    async fn insert_payment_plan(&mut self, plan: &PaymentPlan, plans: &[Plan]) -> StoreResult<()>;
    async fn get_payment_plan(&mut self, id: Uuid) -> StoreResult<Option<PaymentPlan>>;
    /// Exclusive row lock; `PaymentPlanNotFound` if missing.
    async fn lock_payment_plan(&mut self, id: Uuid) -> StoreResult<PaymentPlan>;
    async fn active_payment_plan(&mut self, wallet_id: Uuid) -> StoreResult<Option<PaymentPlan>>;
    async fn update_payment_plan(&mut self, plan: &PaymentPlan) -> StoreResult<()>;
    async fn plans_for(&mut self, payment_plan_id: Uuid) -> StoreResult<Vec<Plan>>;
    async fn set_plan_status(&mut self, plan_ids: &[Uuid], status: PlanStatus) -> StoreResult<()>;

    // === Settlement jobs ===
    async fn enqueue_job(&mut self, job: &SettlementJob) -> StoreResult<()>;
    async fn get_job(&mut self, id: Uuid) -> StoreResult<Option<SettlementJob>>;
    /// Exclusive row lock; `SettlementJobNotFound` if missing.
    async fn lock_job(&mut self, id: Uuid) -> StoreResult<SettlementJob>;
    async fn update_job(&mut self, job: &SettlementJob) -> StoreResult<()>;
    async fn jobs_for_payment(&mut self, payment_id: Uuid) -> StoreResult<Vec<SettlementJob>>;
    async fn jobs_for_plan(
        &mut self,
        payment_plan_id: Uuid,
        kind: SettlementKind,
    ) -> StoreResult<Vec<SettlementJob>>;

    async fn commit(self: Box<Self>) -> StoreResult<()>;
    async fn rollback(self: Box<Self>) -> StoreResult<()>;
}
