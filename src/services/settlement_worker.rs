//! Settlement Worker
//!
//! Background worker that delivers committed ledger movements to the bank.
//!
//! Every job is claimed (`IN_FLIGHT`, attempt counted) and committed before the
//! gateway is called, so a crash mid-call leaves a stale `IN_FLIGHT` row that a
//! later scan re-claims. A re-claimed payment job first asks the bank whether
//! its client reference already went through. The worker never touches wallet
//! balances.

use std::time::{Duration, Instant};

use chrono::{DateTime, Days, Utc};
use rand::Rng;
use serde::Serialize;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::SettlementPolicy;
use crate::context::LedgerContext;
use crate::error::AppError;
use crate::gateway::{GatewayError, PaymentRequest, RemotePaymentStatus, VirtualAccountRequest};
use crate::models::external_log::ExternalLog;
use crate::models::payment::PaymentStatus;
use crate::models::payment_plan::PlanStatus;
use crate::models::settlement::{SettlementJob, SettlementKind, SettlementStatus};
use crate::services::payment_plan_service::{self, DeferReason, PlanDecision, start_of};
use crate::store::UnitOfWork;

/// Seconds to wait before retry number `attempt`: `uniform(min, max) ^ attempt`.
pub fn backoff_secs(policy: &SettlementPolicy, attempt: i32) -> f64 {
    let base = if policy.backoff_max > policy.backoff_min {
        rand::rng().random_range(policy.backoff_min..policy.backoff_max)
    } else {
        policy.backoff_min
    };
    base.powi(attempt.max(1))
}

fn retry_at(now: DateTime<Utc>, policy: &SettlementPolicy, attempt: i32) -> DateTime<Utc> {
    let millis = (backoff_secs(policy, attempt) * 1000.0) as i64;
    now + chrono::Duration::milliseconds(millis)
}

fn is_due(job: &SettlementJob, now: DateTime<Utc>, stale_before: DateTime<Utc>) -> bool {
    match job.status {
        SettlementStatus::Pending | SettlementStatus::Retry => job.next_attempt_at <= now,
        SettlementStatus::InFlight => job.updated_at < stale_before,
        SettlementStatus::Settled | SettlementStatus::Failed => false,
    }
}

/// What one attempt produced.
enum Outcome {
    /// Bank reference, or the issued virtual account number
    Delivered(String),
    Failed(String),
    /// Scheduler ran; carry its decision over to the job
    Scheduled(PlanDecision),
}

/// Settlement Worker
///
/// Periodically scans for due jobs and drives each one through a single attempt.
pub struct SettlementWorker {
    ctx: LedgerContext,
    poll_interval: Duration,
}

impl SettlementWorker {
    pub fn new(ctx: LedgerContext, poll_interval: Duration) -> Self {
        Self { ctx, poll_interval }
    }

    /// Run the worker loop forever.
    pub async fn run(&self) -> ! {
        info!(
            poll_interval_secs = self.poll_interval.as_secs(),
            batch_size = self.ctx.config.settlement.batch_size,
            "Starting settlement worker"
        );

        loop {
            if let Err(e) = self.run_once().await {
                error!(error = %e, "Settlement scan failed");
            }

            tokio::time::sleep(self.poll_interval).await;
        }
    }

    /// Run a single scan. Returns how many jobs reached a terminal state.
    pub async fn run_once(&self) -> Result<usize, AppError> {
        let policy = &self.ctx.config.settlement;
        let now = self.ctx.clock.now();
        let stale_before = now - chrono::Duration::seconds(policy.stale_after_secs);

        let jobs = self
            .ctx
            .store
            .due_jobs(now, stale_before, policy.batch_size)
            .await?;
        if jobs.is_empty() {
            debug!("No settlement jobs due");
            return Ok(0);
        }

        let mut finished = 0;
        for job in &jobs {
            match self.process(job.id).await {
                Ok(status) if status.is_terminal() => finished += 1,
                Ok(_) => {}
                Err(e) => {
                    error!(job_id = %job.id, kind = job.kind.as_str(), error = %e, "Failed to process settlement job");
                }
            }
        }

        if finished > 0 {
            info!(count = finished, "Settlement jobs finished this scan");
        }
        Ok(finished)
    }

    /// Make one attempt at a job and return the status it was left in.
    pub async fn process(&self, job_id: Uuid) -> Result<SettlementStatus, AppError> {
        let Some((job, recovering)) = self.claim(job_id).await? else {
            let mut uow = self.ctx.store.begin().await?;
            let job = uow
                .get_job(job_id)
                .await?
                .ok_or(AppError::SettlementJobNotFound(job_id))?;
            return Ok(job.status);
        };

        debug!(
            job_id = %job.id,
            kind = job.kind.as_str(),
            attempt = job.attempt_count,
            recovering,
            "Attempting settlement job"
        );

        let outcome = match job.kind {
            SettlementKind::PlanSchedule => self.schedule(&job).await,
            SettlementKind::VirtualAccount => self.issue_virtual_account(&job).await,
            SettlementKind::BankTransfer | SettlementKind::PlanDebit => {
                self.deliver(&job, recovering).await
            }
        };

        match outcome {
            Outcome::Delivered(bank_ref) => self.complete(job.id, bank_ref).await,
            Outcome::Failed(reason) => self.fail(job.id, reason).await,
            Outcome::Scheduled(decision) => self.after_schedule(job.id, decision).await,
        }
    }

    /// Mark a due job IN_FLIGHT and count the attempt. `None` if another worker
    /// got there first or the job is not due.
    async fn claim(&self, job_id: Uuid) -> Result<Option<(SettlementJob, bool)>, AppError> {
        let now = self.ctx.clock.now();
        let stale_before =
            now - chrono::Duration::seconds(self.ctx.config.settlement.stale_after_secs);

        let mut uow = self.ctx.store.begin().await?;
        let mut job = uow.lock_job(job_id).await?;
        if !is_due(&job, now, stale_before) {
            return Ok(None);
        }

        let recovering = job.status == SettlementStatus::InFlight;
        if recovering {
            warn!(job_id = %job.id, attempt = job.attempt_count, "Re-claiming stale settlement job");
        }
        job.status = SettlementStatus::InFlight;
        job.attempt_count += 1;
        job.updated_at = now;
        uow.update_job(&job).await?;
        uow.commit().await?;
        Ok(Some((job, recovering)))
    }

    async fn record<T: Serialize, R: Serialize>(
        &self,
        job_id: Uuid,
        operation: &str,
        request: &T,
        result: &Result<R, GatewayError>,
        started: Instant,
    ) {
        let response = match result {
            Ok(body) => serde_json::to_value(body).ok(),
            Err(e) => Some(serde_json::json!({ "error": e.to_string() })),
        };
        let log = ExternalLog::new(
            Some(job_id),
            operation,
            serde_json::to_value(request).unwrap_or_default(),
            response,
            started.elapsed().as_millis() as i64,
            result.is_ok(),
            self.ctx.clock.now(),
        );
        if let Err(e) = self.ctx.store.append_external_log(&log).await {
            warn!(job_id = %job_id, error = %e, "Failed to record gateway call");
        }
    }

    async fn deliver(&self, job: &SettlementJob, recovering: bool) -> Outcome {
        let Some(destination) = job.destination.clone() else {
            return Outcome::Failed("job has no destination".to_string());
        };

        if recovering {
            let started = Instant::now();
            let status = self.ctx.gateway.get_payment_status(&job.request_ref).await;
            self.record(job.id, "get_payment_status", &job.request_ref, &status, started)
                .await;
            match status {
                Ok(RemotePaymentStatus::Settled { bank_ref }) => {
                    info!(job_id = %job.id, bank_ref = %bank_ref, "Bank already executed payment");
                    return Outcome::Delivered(bank_ref);
                }
                Ok(RemotePaymentStatus::Pending) => {
                    return Outcome::Failed("payment still pending at bank".to_string());
                }
                Ok(RemotePaymentStatus::Failed { .. } | RemotePaymentStatus::NotFound) => {}
                Err(e) => return Outcome::Failed(e.to_string()),
            }
        }

        let request = PaymentRequest {
            request_ref: job.request_ref.clone(),
            wallet_id: job.wallet_id,
            amount: job.amount,
            destination,
        };
        let started = Instant::now();
        let result = self.ctx.gateway.do_payment(&request).await;
        self.record(job.id, "do_payment", &request, &result, started)
            .await;
        match result {
            Ok(receipt) => Outcome::Delivered(receipt.bank_ref),
            Err(e) => Outcome::Failed(e.to_string()),
        }
    }

    async fn issue_virtual_account(&self, job: &SettlementJob) -> Outcome {
        let request = VirtualAccountRequest {
            request_ref: job.request_ref.clone(),
            wallet_id: job.wallet_id,
            amount: job.amount,
        };
        let started = Instant::now();
        let result = self.ctx.gateway.create_virtual_account(&request).await;
        self.record(job.id, "create_virtual_account", &request, &result, started)
            .await;
        match result {
            Ok(account) => Outcome::Delivered(account.account_no),
            Err(e) => Outcome::Failed(e.to_string()),
        }
    }

    async fn schedule(&self, job: &SettlementJob) -> Outcome {
        let Some(payment_plan_id) = job.payment_plan_id else {
            return Outcome::Failed("job has no payment plan".to_string());
        };
        match payment_plan_service::run_plan(&self.ctx, payment_plan_id, false).await {
            Ok(decision) => Outcome::Scheduled(decision),
            Err(e) => Outcome::Failed(e.to_string()),
        }
    }

    /// Lock a job that this worker holds IN_FLIGHT. `None` if something else
    /// moved it on in the meantime.
    async fn reload(
        &self,
        uow: &mut dyn UnitOfWork,
        job_id: Uuid,
    ) -> Result<Option<SettlementJob>, AppError> {
        let job = uow.lock_job(job_id).await?;
        if job.status != SettlementStatus::InFlight {
            warn!(job_id = %job_id, status = %job.status, "Settlement job changed while in flight");
            return Ok(None);
        }
        Ok(Some(job))
    }

    async fn complete(&self, job_id: Uuid, bank_ref: String) -> Result<SettlementStatus, AppError> {
        let now = self.ctx.clock.now();
        let mut uow = self.ctx.store.begin().await?;
        let Some(mut job) = self.reload(uow.as_mut(), job_id).await? else {
            return Ok(uow.lock_job(job_id).await?.status);
        };

        if let Some(payment_id) = job.payment_id {
            if let Some(mut payment) = uow.get_payment(payment_id).await? {
                payment.ref_number = Some(bank_ref.clone());
                if payment.status == PaymentStatus::Pending {
                    payment.status = PaymentStatus::Done;
                }
                payment.updated_at = now;
                uow.update_payment(&payment).await?;
            }
        }
        if job.kind == SettlementKind::PlanDebit {
            if let Some(payment_plan_id) = job.payment_plan_id {
                payment_plan_service::mark_paid(uow.as_mut(), payment_plan_id, &job.plan_ids)
                    .await?;
            }
        }

        job.status = SettlementStatus::Settled;
        job.bank_ref = Some(bank_ref);
        job.last_error = None;
        job.updated_at = now;
        uow.update_job(&job).await?;
        uow.commit().await?;

        info!(
            job_id = %job.id,
            kind = job.kind.as_str(),
            attempts = job.attempt_count,
            bank_ref = job.bank_ref.as_deref().unwrap_or_default(),
            "Settlement job settled"
        );
        Ok(job.status)
    }

    async fn fail(&self, job_id: Uuid, reason: String) -> Result<SettlementStatus, AppError> {
        let now = self.ctx.clock.now();
        let policy = &self.ctx.config.settlement;
        let mut uow = self.ctx.store.begin().await?;
        let Some(mut job) = self.reload(uow.as_mut(), job_id).await? else {
            return Ok(uow.lock_job(job_id).await?.status);
        };
        job.last_error = Some(reason);
        job.updated_at = now;

        if job.attempt_count <= policy.max_retries {
            job.status = SettlementStatus::Retry;
            job.next_attempt_at = retry_at(now, policy, job.attempt_count);
            warn!(
                job_id = %job.id,
                attempt = job.attempt_count,
                next_attempt_at = %job.next_attempt_at,
                error = job.last_error.as_deref().unwrap_or_default(),
                "Settlement attempt failed, retrying"
            );
        } else if job.kind.reschedules() {
            self.reschedule(uow.as_mut(), &mut job, now).await?;
        } else {
            job.status = SettlementStatus::Failed;
            error!(
                job_id = %job.id,
                kind = job.kind.as_str(),
                payment_id = ?job.payment_id,
                attempts = job.attempt_count,
                error = job.last_error.as_deref().unwrap_or_default(),
                "Settlement failed after exhausting retries; needs operator attention"
            );
        }

        uow.update_job(&job).await?;
        uow.commit().await?;
        Ok(job.status)
    }

    /// Push a recurring job to tomorrow with a fresh retry budget, or give up
    /// once it has been pushed back `max_retry_days` times.
    async fn reschedule(
        &self,
        uow: &mut dyn UnitOfWork,
        job: &mut SettlementJob,
        now: DateTime<Utc>,
    ) -> Result<(), AppError> {
        let today = now.date_naive();
        let Some(payment_plan_id) = job.payment_plan_id else {
            job.status = SettlementStatus::Failed;
            return Ok(());
        };

        if job.reschedule_count >= self.ctx.config.settlement.max_retry_days {
            job.status = SettlementStatus::Failed;
            payment_plan_service::mark_failed(uow, payment_plan_id, &job.plan_ids, today).await?;
            error!(
                job_id = %job.id,
                payment_plan_id = %payment_plan_id,
                days = job.reschedule_count,
                "Payment plan collection failed after rescheduling"
            );
            return Ok(());
        }

        let tomorrow = today.checked_add_days(Days::new(1)).unwrap_or(today);
        job.status = SettlementStatus::Pending;
        job.reschedule_count += 1;
        job.attempt_count = 0;
        job.next_attempt_at = start_of(tomorrow);
        if !job.plan_ids.is_empty() {
            uow.set_plan_status(&job.plan_ids, PlanStatus::Retrying)
                .await?;
        }
        warn!(
            job_id = %job.id,
            payment_plan_id = %payment_plan_id,
            day = job.reschedule_count,
            next_attempt_at = %job.next_attempt_at,
            "Payment plan job rescheduled"
        );
        Ok(())
    }

    async fn after_schedule(
        &self,
        job_id: Uuid,
        decision: PlanDecision,
    ) -> Result<SettlementStatus, AppError> {
        let now = self.ctx.clock.now();
        let mut uow = self.ctx.store.begin().await?;
        let Some(mut job) = self.reload(uow.as_mut(), job_id).await? else {
            return Ok(uow.lock_job(job_id).await?.status);
        };
        job.updated_at = now;

        match decision {
            PlanDecision::NoPlan | PlanDecision::DebitNow { .. } => {
                job.status = SettlementStatus::Settled;
                job.last_error = None;
                info!(job_id = %job.id, payment_plan_id = ?job.payment_plan_id, "Payment plan schedule ran");
            }
            PlanDecision::Deferred {
                reason: DeferReason::NotDue,
                until,
            } => {
                job.status = SettlementStatus::Pending;
                job.attempt_count = 0;
                job.next_attempt_at = start_of(until);
            }
            PlanDecision::Deferred { reason, .. } => {
                job.last_error = Some(format!("deferred: {reason:?}"));
                self.reschedule(uow.as_mut(), &mut job, now).await?;
            }
        }

        uow.update_job(&job).await?;
        uow.commit().await?;
        Ok(job.status)
    }
}
