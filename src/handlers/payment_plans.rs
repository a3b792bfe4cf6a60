//! Payment plan HTTP handlers.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use uuid::Uuid;

use crate::{
    context::LedgerContext,
    error::AppError,
    models::payment_plan::{CreatePaymentPlanRequest, PaymentPlanResponse, SettlePlanResponse},
    services::payment_plan_service,
};

/// Register a repayment plan.
///
/// `POST /api/v1/payment-plans`
///
/// # Errors
///
/// - **404**: bank account not registered to the wallet
/// - **409**: the wallet already has an active plan
pub async fn create_payment_plan(
    State(ctx): State<LedgerContext>,
    Json(request): Json<CreatePaymentPlanRequest>,
) -> Result<(StatusCode, Json<PaymentPlanResponse>), AppError> {
    let response = payment_plan_service::create_payment_plan(&ctx, request).await?;
    Ok((StatusCode::CREATED, Json(response)))
}

/// Try to collect what a plan owes now.
///
/// `POST /api/v1/payment-plans/:id/settle`
pub async fn settle_plan(
    State(ctx): State<LedgerContext>,
    Path(id): Path<Uuid>,
) -> Result<Json<SettlePlanResponse>, AppError> {
    let messages = payment_plan_service::settle_plan(&ctx, id).await?;
    Ok(Json(SettlePlanResponse { messages }))
}
