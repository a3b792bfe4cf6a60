//! Transfer and transaction HTTP handlers.
//!
//! This module implements the money-movement API endpoints:
//! - POST /api/v1/transfers/internal - Wallet to wallet
//! - POST /api/v1/transfers/external - Wallet to a registered bank account
//! - POST /api/v1/transactions/:id/refund - Reverse a transaction
//! - GET /api/v1/transactions/:id - Get transaction details

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use uuid::Uuid;

use crate::{
    context::LedgerContext,
    error::AppError,
    models::transaction::{
        ExternalTransferRequest, InternalTransferRequest, RefundResponse, TransactionView,
        TransferResponse,
    },
    services::transfer_service,
};

/// Transfer money between two wallets.
///
/// # Request Body
///
/// ```json
/// {
///   "source": "550e8400-...",
///   "destination": "660e8400-...",
///   "amount": 1500,
///   "pin": "123456",
///   "notes": "Dinner",
///   "flag": "TRANSFER"
/// }
/// ```
///
/// # Atomicity
///
/// The debit and the paired credit are committed together.
///
/// # Response (201 Created)
///
/// ```json
/// {
///   "transaction_id": "770e8400-..."
/// }
/// ```
pub async fn internal_transfer(
    State(ctx): State<LedgerContext>,
    Json(request): Json<InternalTransferRequest>,
) -> Result<(StatusCode, Json<TransferResponse>), AppError> {
    let response = transfer_service::internal_transfer(&ctx, request).await?;
    Ok((StatusCode::CREATED, Json(response)))
}

/// Send money to a registered bank account.
///
/// The ledger is debited (amount plus fee) immediately; delivery to the bank
/// happens in the background.
///
/// # Response (201 Created)
///
/// ```json
/// {
///   "transaction_id": "770e8400-...",
///   "fee_transaction_id": "880e8400-...",
///   "cashback_transaction_id": "990e8400-..."
/// }
/// ```
pub async fn external_transfer(
    State(ctx): State<LedgerContext>,
    Json(request): Json<ExternalTransferRequest>,
) -> Result<(StatusCode, Json<TransferResponse>), AppError> {
    let response = transfer_service::external_transfer(&ctx, request).await?;
    Ok((StatusCode::CREATED, Json(response)))
}

/// Refund a transaction.
///
/// # Response (200 OK)
///
/// ```json
/// {
///   "reversal_ids": ["aa0e8400-...", "bb0e8400-..."]
/// }
/// ```
///
/// # Errors
///
/// - **409**: already refunded, or the bank payment is still in progress
/// - **422**: the transaction is a refund or its type is not refundable
pub async fn refund(
    State(ctx): State<LedgerContext>,
    Path(id): Path<Uuid>,
) -> Result<Json<RefundResponse>, AppError> {
    let response = transfer_service::refund(&ctx, id).await?;
    Ok(Json(response))
}

/// Get transaction details by ID.
pub async fn get_transaction(
    State(ctx): State<LedgerContext>,
    Path(id): Path<Uuid>,
) -> Result<Json<TransactionView>, AppError> {
    let view = transfer_service::get_transaction(&ctx, id).await?;
    Ok(Json(view))
}
