//! Wallet onboarding and PIN verification.

use chrono::Duration;
use uuid::Uuid;

use crate::context::LedgerContext;
use crate::error::AppError;
use crate::models::wallet::Wallet;
use crate::services::transaction_service::ledger_failure;

const PIN_LENGTHS: std::ops::RangeInclusive<usize> = 4..=6;

/// Open a wallet with zero balance.
///
/// # Errors
///
/// - `InvalidRequest`: PIN is not 4 to 6 digits
pub async fn open_wallet(ctx: &LedgerContext, pin: &str) -> Result<Wallet, AppError> {
    if !PIN_LENGTHS.contains(&pin.len()) || !pin.bytes().all(|b| b.is_ascii_digit()) {
        return Err(AppError::InvalidRequest(
            "PIN must be 4 to 6 digits".to_string(),
        ));
    }

    let wallet = Wallet::new(pin, ctx.clock.now());
    let mut uow = ctx.store.begin().await?;
    uow.insert_wallet(&wallet).await?;
    uow.commit().await?;

    tracing::info!(wallet_id = %wallet.id, "Wallet opened");
    Ok(wallet)
}

pub async fn get_wallet(ctx: &LedgerContext, wallet_id: Uuid) -> Result<Wallet, AppError> {
    let mut uow = ctx.store.begin().await?;
    uow.get_wallet(wallet_id)
        .await?
        .ok_or(AppError::WalletNotFound(wallet_id))
}

/// Check a PIN against the wallet, maintaining the failed-attempt counter.
///
/// Runs in its own unit of work so a failed attempt is recorded even though the
/// operation it guards is rejected.
///
/// # Errors
///
/// - `WalletLocked`: wallet was already locked
/// - `IncorrectPin`: wrong PIN, attempts remain
/// - `MaxPinAttempt`: wrong PIN that used up the allowance; the wallet is now locked
pub async fn verify_pin(ctx: &LedgerContext, wallet_id: Uuid, pin: &str) -> Result<(), AppError> {
    let now = ctx.clock.now();
    let policy = &ctx.config.pin;

    let mut uow = ctx.store.begin().await.map_err(ledger_failure)?;
    let mut wallet = uow.lock_wallet(wallet_id).await?;
    if wallet.is_locked {
        return Err(AppError::WalletLocked);
    }

    if wallet.pin_matches(pin) {
        if wallet.pin_attempts != 0 || wallet.pin_attempts_expire_at.is_some() {
            wallet.pin_attempts = 0;
            wallet.pin_attempts_expire_at = None;
            wallet.updated_at = now;
            uow.update_wallet(&wallet).await?;
            uow.commit().await?;
        }
        return Ok(());
    }

    let live = wallet.live_pin_attempts(now);
    if live == 0 {
        wallet.pin_attempts_expire_at = Some(now + Duration::minutes(policy.window_minutes));
    }
    wallet.pin_attempts = live + 1;
    wallet.updated_at = now;

    let exhausted = wallet.pin_attempts >= policy.max_attempts;
    if exhausted {
        wallet.is_locked = true;
    }
    uow.update_wallet(&wallet).await?;
    uow.commit().await?;

    if exhausted {
        tracing::warn!(wallet_id = %wallet_id, attempts = wallet.pin_attempts, "Wallet locked after repeated incorrect PIN");
        Err(AppError::MaxPinAttempt)
    } else {
        tracing::warn!(wallet_id = %wallet_id, attempts = wallet.pin_attempts, "Incorrect PIN");
        Err(AppError::IncorrectPin)
    }
}
