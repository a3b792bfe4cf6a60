//! In-memory ledger store.
//!
//! Used by the test suite and for running the service without PostgreSQL.
//! Each unit of work reads from a snapshot taken at `begin`, stages its writes,
//! and applies them to the shared tables in one step at commit. Row locks are
//! per-id `tokio::sync::Mutex`es held as owned guards until the unit of work
//! ends, so two units of work locking the same wallet serialize exactly like
//! `SELECT ... FOR UPDATE` does.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use uuid::Uuid;

use super::{LedgerStore, StoreResult, UnitOfWork};
use crate::error::AppError;
use crate::models::bank::{Bank, BankAccount};
use crate::models::external_log::ExternalLog;
use crate::models::payment::Payment;
use crate::models::payment_plan::{PaymentPlan, Plan, PlanStatus};
use crate::models::quota::{Quota, QuotaUsage};
use crate::models::settlement::{SettlementJob, SettlementKind, SettlementStatus};
use crate::models::transaction::Transaction;
use crate::models::wallet::Wallet;

#[derive(Debug, Default, Clone)]
struct Tables {
    wallets: HashMap<Uuid, Wallet>,
    payments: HashMap<Uuid, Payment>,
    /// Insertion order is creation order
    transactions: Vec<Transaction>,
    quotas: HashMap<Uuid, Quota>,
    quota_usages: Vec<QuotaUsage>,
    banks: HashMap<String, Bank>,
    bank_accounts: HashMap<Uuid, BankAccount>,
    payment_plans: HashMap<Uuid, PaymentPlan>,
    plans: HashMap<Uuid, Plan>,
    jobs: HashMap<Uuid, SettlementJob>,
}

/// A staged write, replayed against the live tables on commit.
#[derive(Debug, Clone)]
enum Write {
    Wallet(Wallet),
    NewPayment(Payment),
    Payment(Payment),
    NewTransaction(Transaction),
    Quota(Quota),
    NewQuotaUsage(QuotaUsage),
    Bank(Bank),
    BankAccount(BankAccount),
    PaymentPlan(PaymentPlan),
    Plan(Plan),
    Job(SettlementJob),
}

impl Tables {
    fn quota_used(&self, quota_id: Uuid) -> i64 {
        self.quota_usages
            .iter()
            .filter(|u| u.quota_id == quota_id)
            .map(|u| i64::from(u.usage))
            .sum()
    }

    fn payment_by_ref(&self, ref_number: &str) -> Option<&Payment> {
        self.payments
            .values()
            .find(|p| p.ref_number.as_deref() == Some(ref_number))
    }

    /// Unique constraints, checked against the live tables at commit.
    fn check(&self, write: &Write) -> StoreResult<()> {
        match write {
            Write::NewPayment(payment) => {
                if let Some(ref_number) = payment.ref_number.as_deref() {
                    if self.payment_by_ref(ref_number).is_some() {
                        return Err(AppError::DuplicatePayment(ref_number.to_string()));
                    }
                }
            }
            Write::NewTransaction(tx) => {
                if self.transactions.iter().any(|t| t.payment_id == tx.payment_id) {
                    return Err(AppError::Store(format!(
                        "payment {} already has a transaction",
                        tx.payment_id
                    )));
                }
            }
            Write::NewQuotaUsage(usage) => {
                if self
                    .quota_usages
                    .iter()
                    .any(|u| u.transaction_id == usage.transaction_id)
                {
                    return Err(AppError::Store(format!(
                        "transaction {} already has a quota usage",
                        usage.transaction_id
                    )));
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn apply(&mut self, write: Write) {
        match write {
            Write::Wallet(wallet) => {
                self.wallets.insert(wallet.id, wallet);
            }
            Write::NewPayment(payment) | Write::Payment(payment) => {
                self.payments.insert(payment.id, payment);
            }
            Write::NewTransaction(tx) => self.transactions.push(tx),
            Write::Quota(quota) => {
                self.quotas.insert(quota.id, quota);
            }
            Write::NewQuotaUsage(usage) => self.quota_usages.push(usage),
            Write::Bank(bank) => {
                self.banks.insert(bank.code.clone(), bank);
            }
            Write::BankAccount(account) => {
                self.bank_accounts.insert(account.id, account);
            }
            Write::PaymentPlan(plan) => {
                self.payment_plans.insert(plan.id, plan);
            }
            Write::Plan(plan) => {
                self.plans.insert(plan.id, plan);
            }
            Write::Job(job) => {
                self.jobs.insert(job.id, job);
            }
        }
    }
}

type RowLocks = Arc<Mutex<HashMap<Uuid, Arc<Mutex<()>>>>>;

/// Ledger store backed by process memory.
#[derive(Clone, Default)]
pub struct InMemoryLedgerStore {
    tables: Arc<RwLock<Tables>>,
    row_locks: RowLocks,
    /// Rows whose lock fails, for exercising rollback paths
    broken_rows: Arc<RwLock<HashSet<Uuid>>>,
    external_logs: Arc<RwLock<Vec<ExternalLog>>>,
}

impl InMemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every later attempt to lock row `id` fail with a store error.
    pub async fn break_row(&self, id: Uuid) {
        self.broken_rows.write().await.insert(id);
    }

    pub async fn repair_row(&self, id: Uuid) {
        self.broken_rows.write().await.remove(&id);
    }

    /// Gateway audit records appended so far.
    pub async fn external_logs(&self) -> Vec<ExternalLog> {
        self.external_logs.read().await.clone()
    }

    /// All settlement jobs, oldest first.
    pub async fn jobs(&self) -> Vec<SettlementJob> {
        let mut jobs: Vec<_> = self.tables.read().await.jobs.values().cloned().collect();
        jobs.sort_by_key(|job| job.created_at);
        jobs
    }

    /// Sum of all wallet balances.
    pub async fn total_balance(&self) -> i64 {
        self.tables
            .read()
            .await
            .wallets
            .values()
            .map(|w| w.balance)
            .sum()
    }
}

#[async_trait]
impl LedgerStore for InMemoryLedgerStore {
    async fn ping(&self) -> StoreResult<()> {
        Ok(())
    }

    async fn begin(&self) -> StoreResult<Box<dyn UnitOfWork>> {
        let working = self.tables.read().await.clone();
        Ok(Box::new(InMemoryUnitOfWork {
            live: self.tables.clone(),
            row_locks: self.row_locks.clone(),
            broken_rows: self.broken_rows.clone(),
            working,
            staged: Vec::new(),
            held: HashMap::new(),
        }))
    }

    async fn list_transactions(
        &self,
        wallet_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> StoreResult<Vec<(Transaction, Payment)>> {
        let tables = self.tables.read().await;
        let mut rows = Vec::new();
        for tx in tables
            .transactions
            .iter()
            .filter(|t| t.wallet_id == wallet_id && t.created_at >= from && t.created_at < to)
        {
            let payment = tables.payments.get(&tx.payment_id).cloned().ok_or_else(|| {
                AppError::Store(format!("transaction {} has no payment", tx.id))
            })?;
            rows.push((tx.clone(), payment));
        }
        Ok(rows)
    }

    async fn due_jobs(
        &self,
        now: DateTime<Utc>,
        stale_before: DateTime<Utc>,
        limit: usize,
    ) -> StoreResult<Vec<SettlementJob>> {
        let tables = self.tables.read().await;
        let mut due: Vec<SettlementJob> = tables
            .jobs
            .values()
            .filter(|job| match job.status {
                SettlementStatus::Pending | SettlementStatus::Retry => job.next_attempt_at <= now,
                SettlementStatus::InFlight => job.updated_at < stale_before,
                _ => false,
            })
            .cloned()
            .collect();
        due.sort_by_key(|job| job.next_attempt_at);
        due.truncate(limit);
        Ok(due)
    }

    async fn append_external_log(&self, log: &ExternalLog) -> StoreResult<()> {
        self.external_logs.write().await.push(log.clone());
        Ok(())
    }
}

struct InMemoryUnitOfWork {
    live: Arc<RwLock<Tables>>,
    row_locks: RowLocks,
    broken_rows: Arc<RwLock<HashSet<Uuid>>>,
    working: Tables,
    staged: Vec<Write>,
    held: HashMap<Uuid, OwnedMutexGuard<()>>,
}

impl InMemoryUnitOfWork {
    /// Take the row lock for `id` unless this unit of work already holds it.
    ///
    /// A fresh lock rebases the working copy on the latest committed state, so
    /// reads after the lock see commits made while we waited for it.
    async fn acquire(&mut self, id: Uuid) -> StoreResult<()> {
        if self.held.contains_key(&id) {
            return Ok(());
        }
        if self.broken_rows.read().await.contains(&id) {
            return Err(AppError::Store(format!("row {id} could not be locked")));
        }
        let lock = {
            let mut locks = self.row_locks.lock().await;
            locks.entry(id).or_default().clone()
        };
        let guard = lock.lock_owned().await;
        self.held.insert(id, guard);

        let mut working = self.live.read().await.clone();
        for write in &self.staged {
            working.apply(write.clone());
        }
        self.working = working;
        Ok(())
    }

    fn stage(&mut self, write: Write) {
        self.working.apply(write.clone());
        self.staged.push(write);
    }
}

#[async_trait]
impl UnitOfWork for InMemoryUnitOfWork {
    async fn insert_wallet(&mut self, wallet: &Wallet) -> StoreResult<()> {
        self.stage(Write::Wallet(wallet.clone()));
        Ok(())
    }

    async fn get_wallet(&mut self, id: Uuid) -> StoreResult<Option<Wallet>> {
        Ok(self.working.wallets.get(&id).cloned())
    }

    async fn lock_wallet(&mut self, id: Uuid) -> StoreResult<Wallet> {
        self.acquire(id).await?;
        self.working
            .wallets
            .get(&id)
            .cloned()
            .ok_or(AppError::WalletNotFound(id))
    }

    async fn update_wallet(&mut self, wallet: &Wallet) -> StoreResult<()> {
        if !self.working.wallets.contains_key(&wallet.id) {
            return Err(AppError::WalletNotFound(wallet.id));
        }
        self.stage(Write::Wallet(wallet.clone()));
        Ok(())
    }

    async fn insert_payment(&mut self, payment: &Payment) -> StoreResult<()> {
        let write = Write::NewPayment(payment.clone());
        self.working.check(&write)?;
        self.stage(write);
        Ok(())
    }

    async fn get_payment(&mut self, id: Uuid) -> StoreResult<Option<Payment>> {
        Ok(self.working.payments.get(&id).cloned())
    }

    async fn find_payment_by_ref(&mut self, ref_number: &str) -> StoreResult<Option<Payment>> {
        Ok(self.working.payment_by_ref(ref_number).cloned())
    }

    async fn update_payment(&mut self, payment: &Payment) -> StoreResult<()> {
        self.stage(Write::Payment(payment.clone()));
        Ok(())
    }

    async fn insert_transaction(&mut self, transaction: &Transaction) -> StoreResult<()> {
        self.working.check(&Write::NewTransaction(transaction.clone()))?;
        self.stage(Write::NewTransaction(transaction.clone()));
        Ok(())
    }

    async fn get_transaction(&mut self, id: Uuid) -> StoreResult<Option<Transaction>> {
        Ok(self.working.transactions.iter().find(|t| t.id == id).cloned())
    }

    async fn transaction_for_payment(
        &mut self,
        payment_id: Uuid,
    ) -> StoreResult<Option<Transaction>> {
        Ok(self
            .working
            .transactions
            .iter()
            .find(|t| t.payment_id == payment_id)
            .cloned())
    }

    async fn child_transactions(&mut self, parent_id: Uuid) -> StoreResult<Vec<Transaction>> {
        Ok(self
            .working
            .transactions
            .iter()
            .filter(|t| t.parent_id == Some(parent_id))
            .cloned()
            .collect())
    }

    async fn insert_quota(&mut self, quota: &Quota) -> StoreResult<()> {
        self.stage(Write::Quota(quota.clone()));
        Ok(())
    }

    async fn available_quota(
        &mut self,
        wallet_id: Uuid,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<Quota>> {
        let tables = &self.working;
        Ok(tables
            .quotas
            .values()
            .filter(|q| q.wallet_id == wallet_id && q.is_valid_at(now))
            .filter(|q| tables.quota_used(q.id) < i64::from(q.no_of_transactions))
            .min_by_key(|q| q.start_valid)
            .cloned())
    }

    async fn quota_used(&mut self, quota_id: Uuid) -> StoreResult<i64> {
        Ok(self.working.quota_used(quota_id))
    }

    async fn quota_usage_for(&mut self, transaction_id: Uuid) -> StoreResult<Option<QuotaUsage>> {
        Ok(self
            .working
            .quota_usages
            .iter()
            .find(|u| u.transaction_id == transaction_id)
            .cloned())
    }

    async fn insert_quota_usage(&mut self, usage: &QuotaUsage) -> StoreResult<bool> {
        let write = Write::NewQuotaUsage(usage.clone());
        if self.working.check(&write).is_err() {
            return Ok(false);
        }
        self.stage(write);
        Ok(true)
    }

    async fn insert_bank(&mut self, bank: &Bank) -> StoreResult<()> {
        self.stage(Write::Bank(bank.clone()));
        Ok(())
    }

    async fn get_bank(&mut self, code: &str) -> StoreResult<Option<Bank>> {
        Ok(self.working.banks.get(code).cloned())
    }

    async fn insert_bank_account(&mut self, account: &BankAccount) -> StoreResult<()> {
        self.stage(Write::BankAccount(account.clone()));
        Ok(())
    }

    async fn get_bank_account(&mut self, id: Uuid) -> StoreResult<Option<BankAccount>> {
        Ok(self.working.bank_accounts.get(&id).cloned())
    }

    async fn insert_payment_plan(&mut self, plan: &PaymentPlan, plans: &[Plan]) -> StoreResult<()> {
        self.stage(Write::PaymentPlan(plan.clone()));
        for instalment in plans {
            self.stage(Write::Plan(instalment.clone()));
        }
        Ok(())
    }

    async fn get_payment_plan(&mut self, id: Uuid) -> StoreResult<Option<PaymentPlan>> {
        Ok(self.working.payment_plans.get(&id).cloned())
    }

    async fn lock_payment_plan(&mut self, id: Uuid) -> StoreResult<PaymentPlan> {
        self.acquire(id).await?;
        self.working
            .payment_plans
            .get(&id)
            .cloned()
            .ok_or(AppError::PaymentPlanNotFound(id))
    }

    async fn active_payment_plan(&mut self, wallet_id: Uuid) -> StoreResult<Option<PaymentPlan>> {
        Ok(self
            .working
            .payment_plans
            .values()
            .find(|p| p.wallet_id == wallet_id && p.is_active)
            .cloned())
    }

    async fn update_payment_plan(&mut self, plan: &PaymentPlan) -> StoreResult<()> {
        self.stage(Write::PaymentPlan(plan.clone()));
        Ok(())
    }

    async fn plans_for(&mut self, payment_plan_id: Uuid) -> StoreResult<Vec<Plan>> {
        let mut plans: Vec<Plan> = self
            .working
            .plans
            .values()
            .filter(|p| p.payment_plan_id == payment_plan_id)
            .cloned()
            .collect();
        plans.sort_by_key(|p| p.due_date);
        Ok(plans)
    }

    async fn set_plan_status(&mut self, plan_ids: &[Uuid], status: PlanStatus) -> StoreResult<()> {
        for id in plan_ids {
            if let Some(mut plan) = self.working.plans.get(id).cloned() {
                plan.status = status;
                self.stage(Write::Plan(plan));
            }
        }
        Ok(())
    }

    async fn enqueue_job(&mut self, job: &SettlementJob) -> StoreResult<()> {
        self.stage(Write::Job(job.clone()));
        Ok(())
    }

    async fn get_job(&mut self, id: Uuid) -> StoreResult<Option<SettlementJob>> {
        Ok(self.working.jobs.get(&id).cloned())
    }

    async fn lock_job(&mut self, id: Uuid) -> StoreResult<SettlementJob> {
        self.acquire(id).await?;
        self.working
            .jobs
            .get(&id)
            .cloned()
            .ok_or(AppError::SettlementJobNotFound(id))
    }

    async fn update_job(&mut self, job: &SettlementJob) -> StoreResult<()> {
        self.stage(Write::Job(job.clone()));
        Ok(())
    }

    async fn jobs_for_payment(&mut self, payment_id: Uuid) -> StoreResult<Vec<SettlementJob>> {
        Ok(self
            .working
            .jobs
            .values()
            .filter(|job| job.payment_id == Some(payment_id))
            .cloned()
            .collect())
    }

    async fn jobs_for_plan(
        &mut self,
        payment_plan_id: Uuid,
        kind: SettlementKind,
    ) -> StoreResult<Vec<SettlementJob>> {
        let mut jobs: Vec<SettlementJob> = self
            .working
            .jobs
            .values()
            .filter(|job| job.payment_plan_id == Some(payment_plan_id) && job.kind == kind)
            .cloned()
            .collect();
        jobs.sort_by_key(|job| job.created_at);
        Ok(jobs)
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        let InMemoryUnitOfWork {
            live, staged, held, ..
        } = *self;
        let mut tables = live.write().await;
        for write in &staged {
            tables.check(write)?;
        }
        for write in staged {
            tables.apply(write);
        }
        drop(tables);
        drop(held);
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> StoreResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::payment::{NewPayment, PaymentStatus, PaymentType};
    use std::time::Duration;

    fn payment(ref_number: Option<&str>) -> Payment {
        NewPayment {
            source_account: "src".into(),
            destination: "dst".into(),
            amount: 100,
            payment_type: PaymentType::Credit,
            channel_id: None,
            ref_number: ref_number.map(str::to_string),
            status: PaymentStatus::Done,
        }
        .into_payment(Utc::now())
    }

    #[tokio::test]
    async fn test_rollback_discards_writes() {
        let store = InMemoryLedgerStore::new();
        let wallet = Wallet::new("123456", Utc::now());

        let mut uow = store.begin().await.unwrap();
        uow.insert_wallet(&wallet).await.unwrap();
        uow.rollback().await.unwrap();

        let mut uow = store.begin().await.unwrap();
        assert!(uow.get_wallet(wallet.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_dropped_unit_of_work_discards_writes() {
        let store = InMemoryLedgerStore::new();
        let wallet = Wallet::new("123456", Utc::now());
        {
            let mut uow = store.begin().await.unwrap();
            uow.insert_wallet(&wallet).await.unwrap();
        }
        assert_eq!(store.total_balance().await, 0);
        let mut uow = store.begin().await.unwrap();
        assert!(uow.get_wallet(wallet.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_ref_rejected_within_unit_of_work() {
        let store = InMemoryLedgerStore::new();
        let mut uow = store.begin().await.unwrap();
        uow.insert_payment(&payment(Some("BANK-1"))).await.unwrap();
        let err = uow.insert_payment(&payment(Some("BANK-1"))).await.unwrap_err();
        assert!(matches!(err, AppError::DuplicatePayment(_)));
    }

    #[tokio::test]
    async fn test_duplicate_ref_rejected_at_commit() {
        let store = InMemoryLedgerStore::new();
        let mut first = store.begin().await.unwrap();
        let mut second = store.begin().await.unwrap();
        first.insert_payment(&payment(Some("BANK-2"))).await.unwrap();
        second.insert_payment(&payment(Some("BANK-2"))).await.unwrap();

        first.commit().await.unwrap();
        let err = second.commit().await.unwrap_err();
        assert!(matches!(err, AppError::DuplicatePayment(_)));
    }

    #[tokio::test]
    async fn test_payments_without_ref_never_conflict() {
        let store = InMemoryLedgerStore::new();
        let mut uow = store.begin().await.unwrap();
        uow.insert_payment(&payment(None)).await.unwrap();
        uow.insert_payment(&payment(None)).await.unwrap();
        uow.commit().await.unwrap();
    }

    #[tokio::test]
    async fn test_lock_wallet_sees_commits_made_while_waiting() {
        let store = InMemoryLedgerStore::new();
        let wallet = Wallet::new("123456", Utc::now());
        let mut uow = store.begin().await.unwrap();
        uow.insert_wallet(&wallet).await.unwrap();
        uow.commit().await.unwrap();

        let mut holder = store.begin().await.unwrap();
        let mut locked = holder.lock_wallet(wallet.id).await.unwrap();

        let waiter_store = store.clone();
        let waiter = tokio::spawn(async move {
            let mut uow = waiter_store.begin().await.unwrap();
            uow.lock_wallet(wallet.id).await.unwrap().balance
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        locked.balance = 700;
        holder.update_wallet(&locked).await.unwrap();
        holder.commit().await.unwrap();

        assert_eq!(waiter.await.unwrap(), 700);
    }

    #[tokio::test]
    async fn test_lock_is_reentrant_within_unit_of_work() {
        let store = InMemoryLedgerStore::new();
        let wallet = Wallet::new("123456", Utc::now());
        let mut uow = store.begin().await.unwrap();
        uow.insert_wallet(&wallet).await.unwrap();
        uow.commit().await.unwrap();

        let mut uow = store.begin().await.unwrap();
        let mut locked = uow.lock_wallet(wallet.id).await.unwrap();
        locked.balance = 50;
        uow.update_wallet(&locked).await.unwrap();
        assert_eq!(uow.lock_wallet(wallet.id).await.unwrap().balance, 50);
    }

    #[tokio::test]
    async fn test_quota_usage_is_unique_per_transaction() {
        let store = InMemoryLedgerStore::new();
        let usage = QuotaUsage {
            id: Uuid::new_v4(),
            quota_id: Uuid::new_v4(),
            transaction_id: Uuid::new_v4(),
            usage: 1,
            created_at: Utc::now(),
        };
        let mut uow = store.begin().await.unwrap();
        assert!(uow.insert_quota_usage(&usage).await.unwrap());
        let again = QuotaUsage {
            id: Uuid::new_v4(),
            ..usage.clone()
        };
        assert!(!uow.insert_quota_usage(&again).await.unwrap());
        assert_eq!(uow.quota_used(usage.quota_id).await.unwrap(), 1);
    }
}
