//! Wallet HTTP handlers.
//!
//! This module implements wallet-related API endpoints:
//! - POST /api/v1/wallets - Open a wallet
//! - GET /api/v1/wallets/:id - Get wallet by ID
//! - GET /api/v1/wallets/:id/transactions - Wallet history
//! - POST /api/v1/wallets/:id/top-up - Request a virtual account for a top-up

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use uuid::Uuid;

use crate::{
    context::LedgerContext,
    error::AppError,
    models::{
        settlement::{TopUpRequest, TopUpResponse},
        transaction::{HistoryQuery, TransactionView},
        wallet::{OpenWalletRequest, WalletResponse},
    },
    services::{transfer_service, wallet_service},
};

/// Open a new wallet.
///
/// # Request Body
///
/// ```json
/// {
///   "pin": "123456"
/// }
/// ```
///
/// # Response (201 Created)
///
/// ```json
/// {
///   "id": "550e8400-e29b-41d4-a716-446655440000",
///   "balance": 0,
///   "is_locked": false,
///   "created_at": "2026-10-18T10:00:00Z",
///   "updated_at": "2026-10-18T10:00:00Z"
/// }
/// ```
pub async fn open_wallet(
    State(ctx): State<LedgerContext>,
    Json(request): Json<OpenWalletRequest>,
) -> Result<(StatusCode, Json<WalletResponse>), AppError> {
    let wallet = wallet_service::open_wallet(&ctx, &request.pin).await?;
    Ok((StatusCode::CREATED, Json(wallet.into())))
}

/// Get a wallet by ID.
///
/// # Response
///
/// - **Success (200 OK)**: Returns the wallet
/// - **Error (404)**: Wallet not found
pub async fn get_wallet(
    State(ctx): State<LedgerContext>,
    Path(id): Path<Uuid>,
) -> Result<Json<WalletResponse>, AppError> {
    let wallet = wallet_service::get_wallet(&ctx, id).await?;
    Ok(Json(wallet.into()))
}

/// Wallet history for a date range.
///
/// # Query Parameters
///
/// - `from`, `to`: RFC 3339 timestamps, `from` inclusive and `to` exclusive
/// - `direction`: `all` (default), `in` or `out`
///
/// ```text
/// GET /api/v1/wallets/{id}/transactions?from=2026-10-01T00:00:00Z&to=2026-11-01T00:00:00Z&direction=out
/// ```
pub async fn history(
    State(ctx): State<LedgerContext>,
    Path(id): Path<Uuid>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Vec<TransactionView>>, AppError> {
    let views = transfer_service::history(&ctx, id, query).await?;
    Ok(Json(views))
}

/// Ask the bank for a virtual account to top up through.
///
/// The request is queued; the issued account number lands on the settlement
/// job once the bank answers.
///
/// # Response (202 Accepted)
///
/// ```json
/// {
///   "job_id": "880e8400-e29b-41d4-a716-446655440003",
///   "status": "PENDING"
/// }
/// ```
pub async fn request_top_up(
    State(ctx): State<LedgerContext>,
    Path(id): Path<Uuid>,
    Json(request): Json<TopUpRequest>,
) -> Result<(StatusCode, Json<TopUpResponse>), AppError> {
    let response = transfer_service::request_top_up(&ctx, id, request.amount).await?;
    Ok((StatusCode::ACCEPTED, Json(response)))
}
