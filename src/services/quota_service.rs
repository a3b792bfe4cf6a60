//! Quota/reward engine.
//!
//! A quota grants a wallet a number of rewarded transactions inside a validity
//! window. Usage rows are written in the same unit of work as the transaction
//! they reward; a transaction can consume at most one usage.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::quota::{QuotaReward, QuotaUsage};
use crate::models::transaction::Transaction;
use crate::store::UnitOfWork;

/// Consume one use of the wallet's current quota for `transaction`.
///
/// Returns `QuotaReward::NONE` when there is no valid quota, the allowance is
/// spent, or the transaction was already counted.
pub async fn use_quota(
    uow: &mut dyn UnitOfWork,
    now: DateTime<Utc>,
    wallet_id: Uuid,
    transaction: &Transaction,
) -> Result<QuotaReward, AppError> {
    if uow.quota_usage_for(transaction.id).await?.is_some() {
        return Ok(QuotaReward::NONE);
    }
    let Some(quota) = uow.available_quota(wallet_id, now).await? else {
        tracing::debug!(wallet_id = %wallet_id, "No quota with allowance left");
        return Ok(QuotaReward::NONE);
    };

    let recorded = uow
        .insert_quota_usage(&QuotaUsage {
            id: Uuid::new_v4(),
            quota_id: quota.id,
            transaction_id: transaction.id,
            usage: 1,
            created_at: now,
        })
        .await?;
    if !recorded {
        return Ok(QuotaReward::NONE);
    }

    let reward_amount = quota.reward_for(transaction.amount);
    Ok(QuotaReward {
        is_rewarded: reward_amount > 0,
        reward_amount,
    })
}

/// Give back the use `original` consumed, recorded against `reversal`.
///
/// Returns whether anything was restored.
pub async fn revert_usage(
    uow: &mut dyn UnitOfWork,
    now: DateTime<Utc>,
    original: &Transaction,
    reversal: &Transaction,
) -> Result<bool, AppError> {
    let Some(usage) = uow.quota_usage_for(original.id).await? else {
        return Ok(false);
    };
    if usage.usage <= 0 {
        return Ok(false);
    }
    uow.insert_quota_usage(&QuotaUsage {
        id: Uuid::new_v4(),
        quota_id: usage.quota_id,
        transaction_id: reversal.id,
        usage: -usage.usage,
        created_at: now,
    })
    .await
}
