//! Bank-facing HTTP handlers.
//!
//! - POST /api/v1/bank-callbacks/credits - Incoming credit from the bank
//! - POST /api/v1/bank-accounts/inquiry - Confirm a beneficiary with its bank

use axum::{Json, extract::State};

use crate::{
    context::LedgerContext,
    error::AppError,
    gateway::InquiryResult,
    models::{
        bank::InquiryRequest,
        transaction::{BankCreditRequest, TransferResponse},
    },
    services::transfer_service,
};

/// Record a credit the bank pushed to us (virtual account deposit, payroll).
///
/// # Request Body
///
/// ```json
/// {
///   "wallet_id": "550e8400-...",
///   "amount": 5000000,
///   "flag": "RECEIVE_PAYROLL",
///   "source_account": "014:1234567890",
///   "channel_id": null,
///   "ref_number": "BCA-20261018-0001"
/// }
/// ```
///
/// # Idempotency
///
/// Replaying a callback with the same `ref_number` returns the transaction the
/// first delivery created, with 200 OK.
///
/// # Response
///
/// `messages` contains `"AUTO_DEBIT"` when a payroll credit deferred a payment
/// plan collection.
pub async fn receive_credit(
    State(ctx): State<LedgerContext>,
    Json(request): Json<BankCreditRequest>,
) -> Result<Json<TransferResponse>, AppError> {
    let response = transfer_service::receive_bank_credit(&ctx, request).await?;
    Ok(Json(response))
}

/// Look up a registered beneficiary at its bank.
///
/// # Response (200 OK)
///
/// ```json
/// {
///   "bank_code": "014",
///   "bank_name": "BANK CENTRAL ASIA",
///   "account_no": "1234567890",
///   "account_name": "BUDI SANTOSO",
///   "transfer_ref": "INQ-20261018-000123"
/// }
/// ```
///
/// # Errors
///
/// - **404**: bank account not registered to this wallet
/// - **502**: the bank could not answer
pub async fn inquiry(
    State(ctx): State<LedgerContext>,
    Json(request): Json<InquiryRequest>,
) -> Result<Json<InquiryResult>, AppError> {
    let result = transfer_service::inquire_bank_account(&ctx, request).await?;
    Ok(Json(result))
}
