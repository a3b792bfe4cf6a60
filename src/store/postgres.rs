//! PostgreSQL ledger store.
//!
//! A unit of work is one `sqlx::Transaction`. Row locks are `SELECT ... FOR UPDATE`
//! and uniqueness (payment ref, one transaction per payment, one quota usage per
//! transaction) is enforced by the schema.

use std::collections::HashMap;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{FromRow, Postgres, Row};
use uuid::Uuid;

use super::{LedgerStore, StoreResult, UnitOfWork};
use crate::db::DbPool;
use crate::error::AppError;
use crate::models::UnknownVariant;
use crate::models::bank::{Bank, BankAccount, BankDestination};
use crate::models::external_log::ExternalLog;
use crate::models::payment::Payment;
use crate::models::payment_plan::{PaymentPlan, Plan, PlanStatus};
use crate::models::quota::{Quota, QuotaUsage};
use crate::models::settlement::{SettlementJob, SettlementKind};
use crate::models::transaction::Transaction;
use crate::models::wallet::Wallet;

/// Decode a text column into one of the ledger's string-backed enums.
fn enum_column<T>(row: &PgRow, column: &str) -> Result<T, sqlx::Error>
where
    T: FromStr<Err = UnknownVariant>,
{
    let raw: String = row.try_get(column)?;
    raw.parse().map_err(|e: UnknownVariant| sqlx::Error::ColumnDecode {
        index: column.to_string(),
        source: Box::new(e),
    })
}

fn destination_columns(row: &PgRow) -> Result<Option<BankDestination>, sqlx::Error> {
    let bank_code: Option<String> = row.try_get("destination_bank_code")?;
    let account_no: Option<String> = row.try_get("destination_account_no")?;
    let account_name: Option<String> = row.try_get("destination_account_name")?;
    Ok(match (bank_code, account_no, account_name) {
        (Some(bank_code), Some(account_no), Some(account_name)) => Some(BankDestination {
            bank_code,
            account_no,
            account_name,
        }),
        _ => None,
    })
}

impl<'r> FromRow<'r, PgRow> for Payment {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(Payment {
            id: row.try_get("id")?,
            source_account: row.try_get("source_account")?,
            destination: row.try_get("destination")?,
            amount: row.try_get("amount")?,
            payment_type: enum_column(row, "payment_type")?,
            channel_id: row.try_get("channel_id")?,
            ref_number: row.try_get("ref_number")?,
            status: enum_column(row, "status")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

impl<'r> FromRow<'r, PgRow> for Quota {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(Quota {
            id: row.try_get("id")?,
            wallet_id: row.try_get("wallet_id")?,
            start_valid: row.try_get("start_valid")?,
            end_valid: row.try_get("end_valid")?,
            no_of_transactions: row.try_get("no_of_transactions")?,
            reward_type: enum_column(row, "reward_type")?,
            reward_amount: row.try_get("reward_amount")?,
        })
    }
}

impl<'r> FromRow<'r, PgRow> for Bank {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(Bank {
            code: row.try_get("code")?,
            name: row.try_get("name")?,
            tier: enum_column(row, "tier")?,
        })
    }
}

impl<'r> FromRow<'r, PgRow> for PaymentPlan {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        let destination =
            destination_columns(row)?.ok_or_else(|| sqlx::Error::ColumnNotFound(
                "destination_bank_code".to_string(),
            ))?;
        Ok(PaymentPlan {
            id: row.try_get("id")?,
            wallet_id: row.try_get("wallet_id")?,
            destination,
            is_active: row.try_get("is_active")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

impl<'r> FromRow<'r, PgRow> for Plan {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(Plan {
            id: row.try_get("id")?,
            payment_plan_id: row.try_get("payment_plan_id")?,
            amount: row.try_get("amount")?,
            due_date: row.try_get("due_date")?,
            status: enum_column(row, "status")?,
        })
    }
}

impl<'r> FromRow<'r, PgRow> for SettlementJob {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(SettlementJob {
            id: row.try_get("id")?,
            kind: enum_column(row, "kind")?,
            status: enum_column(row, "status")?,
            wallet_id: row.try_get("wallet_id")?,
            payment_id: row.try_get("payment_id")?,
            payment_plan_id: row.try_get("payment_plan_id")?,
            plan_ids: row.try_get("plan_ids")?,
            amount: row.try_get("amount")?,
            destination: destination_columns(row)?,
            request_ref: row.try_get("request_ref")?,
            attempt_count: row.try_get("attempt_count")?,
            reschedule_count: row.try_get("reschedule_count")?,
            next_attempt_at: row.try_get("next_attempt_at")?,
            last_error: row.try_get("last_error")?,
            bank_ref: row.try_get("bank_ref")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

/// Ledger store on a PostgreSQL pool.
#[derive(Clone)]
pub struct PgLedgerStore {
    pool: DbPool,
}

impl PgLedgerStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LedgerStore for PgLedgerStore {
    async fn ping(&self) -> StoreResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn begin(&self) -> StoreResult<Box<dyn UnitOfWork>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgUnitOfWork { tx }))
    }

    async fn list_transactions(
        &self,
        wallet_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> StoreResult<Vec<(Transaction, Payment)>> {
        let transactions = sqlx::query_as::<_, Transaction>(
            r#"
            SELECT * FROM transactions
            WHERE wallet_id = $1 AND created_at >= $2 AND created_at < $3
            ORDER BY created_at
            "#,
        )
        .bind(wallet_id)
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await?;

        let payment_ids: Vec<Uuid> = transactions.iter().map(|t| t.payment_id).collect();
        let mut payments: HashMap<Uuid, Payment> =
            sqlx::query_as::<_, Payment>("SELECT * FROM payments WHERE id = ANY($1)")
                .bind(&payment_ids)
                .fetch_all(&self.pool)
                .await?
                .into_iter()
                .map(|p| (p.id, p))
                .collect();

        transactions
            .into_iter()
            .map(|tx| {
                let payment = payments.remove(&tx.payment_id).ok_or_else(|| {
                    AppError::Store(format!("transaction {} has no payment", tx.id))
                })?;
                Ok((tx, payment))
            })
            .collect()
    }

    async fn due_jobs(
        &self,
        now: DateTime<Utc>,
        stale_before: DateTime<Utc>,
        limit: usize,
    ) -> StoreResult<Vec<SettlementJob>> {
        let jobs = sqlx::query_as::<_, SettlementJob>(
            r#"
            SELECT * FROM settlement_jobs
            WHERE (status IN ('PENDING', 'RETRY') AND next_attempt_at <= $1)
               OR (status = 'IN_FLIGHT' AND updated_at < $2)
            ORDER BY next_attempt_at
            LIMIT $3
            "#,
        )
        .bind(now)
        .bind(stale_before)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        Ok(jobs)
    }

    async fn append_external_log(&self, log: &ExternalLog) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO external_logs (id, job_id, operation, request, response, latency_ms, is_success, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(log.id)
        .bind(log.job_id)
        .bind(&log.operation)
        .bind(&log.request)
        .bind(&log.response)
        .bind(log.latency_ms)
        .bind(log.is_success)
        .bind(log.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

pub struct PgUnitOfWork {
    tx: sqlx::Transaction<'static, Postgres>,
}

#[async_trait]
impl UnitOfWork for PgUnitOfWork {
    async fn insert_wallet(&mut self, wallet: &Wallet) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO wallets (id, balance, is_locked, pin_hash, pin_attempts, pin_attempts_expire_at, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(wallet.id)
        .bind(wallet.balance)
        .bind(wallet.is_locked)
        .bind(&wallet.pin_hash)
        .bind(wallet.pin_attempts)
        .bind(wallet.pin_attempts_expire_at)
        .bind(wallet.created_at)
        .bind(wallet.updated_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn get_wallet(&mut self, id: Uuid) -> StoreResult<Option<Wallet>> {
        let wallet = sqlx::query_as::<_, Wallet>("SELECT * FROM wallets WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await?;
        Ok(wallet)
    }

    async fn lock_wallet(&mut self, id: Uuid) -> StoreResult<Wallet> {
        sqlx::query_as::<_, Wallet>("SELECT * FROM wallets WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await?
            .ok_or(AppError::WalletNotFound(id))
    }

    async fn update_wallet(&mut self, wallet: &Wallet) -> StoreResult<()> {
        let updated = sqlx::query(
            r#"
            UPDATE wallets
            SET balance = $2,
                is_locked = $3,
                pin_attempts = $4,
                pin_attempts_expire_at = $5,
                updated_at = $6
            WHERE id = $1
            "#,
        )
        .bind(wallet.id)
        .bind(wallet.balance)
        .bind(wallet.is_locked)
        .bind(wallet.pin_attempts)
        .bind(wallet.pin_attempts_expire_at)
        .bind(wallet.updated_at)
        .execute(&mut *self.tx)
        .await?
        .rows_affected();

        if updated == 0 {
            return Err(AppError::WalletNotFound(wallet.id));
        }
        Ok(())
    }

    async fn insert_payment(&mut self, payment: &Payment) -> StoreResult<()> {
        let inserted = sqlx::query(
            r#"
            INSERT INTO payments (id, source_account, destination, amount, payment_type, channel_id, ref_number, status, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (ref_number) DO NOTHING
            "#,
        )
        .bind(payment.id)
        .bind(&payment.source_account)
        .bind(&payment.destination)
        .bind(payment.amount)
        .bind(payment.payment_type.as_str())
        .bind(&payment.channel_id)
        .bind(&payment.ref_number)
        .bind(payment.status.as_str())
        .bind(payment.created_at)
        .bind(payment.updated_at)
        .execute(&mut *self.tx)
        .await?
        .rows_affected();

        if inserted == 0 {
            return Err(AppError::DuplicatePayment(
                payment.ref_number.clone().unwrap_or_default(),
            ));
        }
        Ok(())
    }

    async fn get_payment(&mut self, id: Uuid) -> StoreResult<Option<Payment>> {
        let payment = sqlx::query_as::<_, Payment>("SELECT * FROM payments WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await?;
        Ok(payment)
    }

    async fn find_payment_by_ref(&mut self, ref_number: &str) -> StoreResult<Option<Payment>> {
        let payment = sqlx::query_as::<_, Payment>("SELECT * FROM payments WHERE ref_number = $1")
            .bind(ref_number)
            .fetch_optional(&mut *self.tx)
            .await?;
        Ok(payment)
    }

    async fn update_payment(&mut self, payment: &Payment) -> StoreResult<()> {
        sqlx::query(
            "UPDATE payments SET ref_number = $2, status = $3, updated_at = $4 WHERE id = $1",
        )
        .bind(payment.id)
        .bind(&payment.ref_number)
        .bind(payment.status.as_str())
        .bind(payment.updated_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn insert_transaction(&mut self, transaction: &Transaction) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO transactions (id, payment_id, wallet_id, amount, transaction_type, notes, parent_id, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(transaction.id)
        .bind(transaction.payment_id)
        .bind(transaction.wallet_id)
        .bind(transaction.amount)
        .bind(&transaction.transaction_type)
        .bind(&transaction.notes)
        .bind(transaction.parent_id)
        .bind(transaction.created_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn get_transaction(&mut self, id: Uuid) -> StoreResult<Option<Transaction>> {
        let transaction =
            sqlx::query_as::<_, Transaction>("SELECT * FROM transactions WHERE id = $1")
                .bind(id)
                .fetch_optional(&mut *self.tx)
                .await?;
        Ok(transaction)
    }

    async fn transaction_for_payment(
        &mut self,
        payment_id: Uuid,
    ) -> StoreResult<Option<Transaction>> {
        let transaction =
            sqlx::query_as::<_, Transaction>("SELECT * FROM transactions WHERE payment_id = $1")
                .bind(payment_id)
                .fetch_optional(&mut *self.tx)
                .await?;
        Ok(transaction)
    }

    async fn child_transactions(&mut self, parent_id: Uuid) -> StoreResult<Vec<Transaction>> {
        let children = sqlx::query_as::<_, Transaction>(
            "SELECT * FROM transactions WHERE parent_id = $1 ORDER BY created_at",
        )
        .bind(parent_id)
        .fetch_all(&mut *self.tx)
        .await?;
        Ok(children)
    }

    async fn insert_quota(&mut self, quota: &Quota) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO quotas (id, wallet_id, start_valid, end_valid, no_of_transactions, reward_type, reward_amount)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(quota.id)
        .bind(quota.wallet_id)
        .bind(quota.start_valid)
        .bind(quota.end_valid)
        .bind(quota.no_of_transactions)
        .bind(quota.reward_type.as_str())
        .bind(quota.reward_amount)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn available_quota(
        &mut self,
        wallet_id: Uuid,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<Quota>> {
        let quota = sqlx::query_as::<_, Quota>(
            r#"
            SELECT q.* FROM quotas q
            WHERE q.wallet_id = $1 AND q.start_valid <= $2 AND q.end_valid > $2
              AND (
                  SELECT COALESCE(SUM(u.usage), 0) FROM quota_usages u
                  WHERE u.quota_id = q.id
              ) < q.no_of_transactions
            ORDER BY q.start_valid
            LIMIT 1
            "#,
        )
        .bind(wallet_id)
        .bind(now)
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(quota)
    }

    async fn quota_used(&mut self, quota_id: Uuid) -> StoreResult<i64> {
        let used = sqlx::query_scalar::<_, i64>(
            "SELECT COALESCE(SUM(usage), 0)::BIGINT FROM quota_usages WHERE quota_id = $1",
        )
        .bind(quota_id)
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(used)
    }

    async fn quota_usage_for(&mut self, transaction_id: Uuid) -> StoreResult<Option<QuotaUsage>> {
        let usage = sqlx::query_as::<_, QuotaUsage>(
            "SELECT * FROM quota_usages WHERE transaction_id = $1",
        )
        .bind(transaction_id)
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(usage)
    }

    async fn insert_quota_usage(&mut self, usage: &QuotaUsage) -> StoreResult<bool> {
        let inserted = sqlx::query(
            r#"
            INSERT INTO quota_usages (id, quota_id, transaction_id, usage, created_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (transaction_id) DO NOTHING
            "#,
        )
        .bind(usage.id)
        .bind(usage.quota_id)
        .bind(usage.transaction_id)
        .bind(usage.usage)
        .bind(usage.created_at)
        .execute(&mut *self.tx)
        .await?
        .rows_affected();
        Ok(inserted == 1)
    }

    async fn insert_bank(&mut self, bank: &Bank) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO banks (code, name, tier) VALUES ($1, $2, $3)
            ON CONFLICT (code) DO UPDATE SET name = EXCLUDED.name, tier = EXCLUDED.tier
            "#,
        )
        .bind(&bank.code)
        .bind(&bank.name)
        .bind(bank.tier.as_str())
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn get_bank(&mut self, code: &str) -> StoreResult<Option<Bank>> {
        let bank = sqlx::query_as::<_, Bank>("SELECT * FROM banks WHERE code = $1")
            .bind(code)
            .fetch_optional(&mut *self.tx)
            .await?;
        Ok(bank)
    }

    async fn insert_bank_account(&mut self, account: &BankAccount) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO bank_accounts (id, wallet_id, bank_code, account_no, account_name)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(account.id)
        .bind(account.wallet_id)
        .bind(&account.bank_code)
        .bind(&account.account_no)
        .bind(&account.account_name)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn get_bank_account(&mut self, id: Uuid) -> StoreResult<Option<BankAccount>> {
        let account =
            sqlx::query_as::<_, BankAccount>("SELECT * FROM bank_accounts WHERE id = $1")
                .bind(id)
                .fetch_optional(&mut *self.tx)
                .await?;
        Ok(account)
    }

    async fn insert_payment_plan(&mut self, plan: &PaymentPlan, plans: &[Plan]) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO payment_plans (id, wallet_id, destination_bank_code, destination_account_no, destination_account_name, is_active, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(plan.id)
        .bind(plan.wallet_id)
        .bind(&plan.destination.bank_code)
        .bind(&plan.destination.account_no)
        .bind(&plan.destination.account_name)
        .bind(plan.is_active)
        .bind(plan.created_at)
        .execute(&mut *self.tx)
        .await?;

        for instalment in plans {
            sqlx::query(
                r#"
                INSERT INTO plans (id, payment_plan_id, amount, due_date, status)
                VALUES ($1, $2, $3, $4, $5)
                "#,
            )
            .bind(instalment.id)
            .bind(instalment.payment_plan_id)
            .bind(instalment.amount)
            .bind(instalment.due_date)
            .bind(instalment.status.as_str())
            .execute(&mut *self.tx)
            .await?;
        }
        Ok(())
    }

    async fn get_payment_plan(&mut self, id: Uuid) -> StoreResult<Option<PaymentPlan>> {
        let plan = sqlx::query_as::<_, PaymentPlan>("SELECT * FROM payment_plans WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await?;
        Ok(plan)
    }

    async fn lock_payment_plan(&mut self, id: Uuid) -> StoreResult<PaymentPlan> {
        sqlx::query_as::<_, PaymentPlan>("SELECT * FROM payment_plans WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await?
            .ok_or(AppError::PaymentPlanNotFound(id))
    }

    async fn active_payment_plan(&mut self, wallet_id: Uuid) -> StoreResult<Option<PaymentPlan>> {
        let plan = sqlx::query_as::<_, PaymentPlan>(
            "SELECT * FROM payment_plans WHERE wallet_id = $1 AND is_active",
        )
        .bind(wallet_id)
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(plan)
    }

    async fn update_payment_plan(&mut self, plan: &PaymentPlan) -> StoreResult<()> {
        sqlx::query("UPDATE payment_plans SET is_active = $2 WHERE id = $1")
            .bind(plan.id)
            .bind(plan.is_active)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn plans_for(&mut self, payment_plan_id: Uuid) -> StoreResult<Vec<Plan>> {
        let plans = sqlx::query_as::<_, Plan>(
            "SELECT * FROM plans WHERE payment_plan_id = $1 ORDER BY due_date",
        )
        .bind(payment_plan_id)
        .fetch_all(&mut *self.tx)
        .await?;
        Ok(plans)
    }

    async fn set_plan_status(&mut self, plan_ids: &[Uuid], status: PlanStatus) -> StoreResult<()> {
        sqlx::query("UPDATE plans SET status = $1 WHERE id = ANY($2)")
            .bind(status.as_str())
            .bind(plan_ids)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn enqueue_job(&mut self, job: &SettlementJob) -> StoreResult<()> {
        let destination = job.destination.as_ref();
        sqlx::query(
            r#"
            INSERT INTO settlement_jobs (
                id, kind, status, wallet_id, payment_id, payment_plan_id, plan_ids, amount,
                destination_bank_code, destination_account_no, destination_account_name,
                request_ref, attempt_count, reschedule_count, next_attempt_at, last_error,
                bank_ref, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19)
            "#,
        )
        .bind(job.id)
        .bind(job.kind.as_str())
        .bind(job.status.as_str())
        .bind(job.wallet_id)
        .bind(job.payment_id)
        .bind(job.payment_plan_id)
        .bind(&job.plan_ids)
        .bind(job.amount)
        .bind(destination.map(|d| d.bank_code.clone()))
        .bind(destination.map(|d| d.account_no.clone()))
        .bind(destination.map(|d| d.account_name.clone()))
        .bind(&job.request_ref)
        .bind(job.attempt_count)
        .bind(job.reschedule_count)
        .bind(job.next_attempt_at)
        .bind(&job.last_error)
        .bind(&job.bank_ref)
        .bind(job.created_at)
        .bind(job.updated_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn get_job(&mut self, id: Uuid) -> StoreResult<Option<SettlementJob>> {
        let job = sqlx::query_as::<_, SettlementJob>("SELECT * FROM settlement_jobs WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await?;
        Ok(job)
    }

    async fn lock_job(&mut self, id: Uuid) -> StoreResult<SettlementJob> {
        sqlx::query_as::<_, SettlementJob>(
            "SELECT * FROM settlement_jobs WHERE id = $1 FOR UPDATE",
        )
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await?
        .ok_or(AppError::SettlementJobNotFound(id))
    }

    async fn update_job(&mut self, job: &SettlementJob) -> StoreResult<()> {
        sqlx::query(
            r#"
            UPDATE settlement_jobs
            SET status = $2,
                attempt_count = $3,
                reschedule_count = $4,
                next_attempt_at = $5,
                last_error = $6,
                bank_ref = $7,
                updated_at = $8
            WHERE id = $1
            "#,
        )
        .bind(job.id)
        .bind(job.status.as_str())
        .bind(job.attempt_count)
        .bind(job.reschedule_count)
        .bind(job.next_attempt_at)
        .bind(&job.last_error)
        .bind(&job.bank_ref)
        .bind(job.updated_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn jobs_for_payment(&mut self, payment_id: Uuid) -> StoreResult<Vec<SettlementJob>> {
        let jobs = sqlx::query_as::<_, SettlementJob>(
            "SELECT * FROM settlement_jobs WHERE payment_id = $1 ORDER BY created_at",
        )
        .bind(payment_id)
        .fetch_all(&mut *self.tx)
        .await?;
        Ok(jobs)
    }

    async fn jobs_for_plan(
        &mut self,
        payment_plan_id: Uuid,
        kind: SettlementKind,
    ) -> StoreResult<Vec<SettlementJob>> {
        let jobs = sqlx::query_as::<_, SettlementJob>(
            r#"
            SELECT * FROM settlement_jobs
            WHERE payment_plan_id = $1 AND kind = $2
            ORDER BY created_at
            "#,
        )
        .bind(payment_plan_id)
        .bind(kind.as_str())
        .fetch_all(&mut *self.tx)
        .await?;
        Ok(jobs)
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> StoreResult<()> {
        self.tx.rollback().await?;
        Ok(())
    }
}
