//! Error types and HTTP error response handling.
//!
//! This module defines all ledger errors and how they are converted
//! into HTTP responses with appropriate status codes and JSON bodies.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use uuid::Uuid;

/// Application-wide error type.
///
/// # Error Categories
///
/// - **Validation Errors**: client-caused, never retried (PIN, balance, lock state, refunds)
/// - **Lookup Errors**: referenced records that don't exist
/// - **Persistence Errors**: store failures; the unit of work is rolled back
/// - **Registry Errors**: transaction flags the registry doesn't know
///
/// Remote bank failures are not represented here; see `gateway::GatewayError`.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Database operation failed (e.g., connection error, query error).
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Store backend failure that is not a sqlx error.
    #[error("Store error: {0}")]
    Store(String),

    /// A ledger write was rolled back. Carries the public reason code.
    #[error("Unprocessable entity: {0}")]
    UnprocessableEntity(String),

    #[error("Unknown transaction type: {0}")]
    UnknownTransactionType(String),

    #[error("Transaction type {flag} cannot be used here: {reason}")]
    InvalidTransactionType { flag: String, reason: &'static str },

    #[error("Wallet not found: {0}")]
    WalletNotFound(Uuid),

    #[error("Transaction not found: {0}")]
    TransactionNotFound(Uuid),

    #[error("Bank account not found")]
    BankAccountNotFound,

    #[error("Payment plan not found: {0}")]
    PaymentPlanNotFound(Uuid),

    #[error("Settlement job not found: {0}")]
    SettlementJobNotFound(Uuid),

    #[error("Incorrect PIN")]
    IncorrectPin,

    /// The attempt that used up the PIN allowance; the wallet is now locked.
    #[error("Maximum PIN attempts reached")]
    MaxPinAttempt,

    #[error("Wallet is locked")]
    WalletLocked,

    #[error("Insufficient balance")]
    InsufficientBalance,

    #[error("Source and destination wallet cannot be the same")]
    SameAccount,

    #[error("Amount must be positive")]
    InvalidAmount,

    /// A payment with this ref_number already exists. Callers treat this as
    /// "already processed".
    #[error("Duplicate payment: {0}")]
    DuplicatePayment(String),

    #[error("Transaction already refunded")]
    AlreadyRefunded,

    #[error("A refund cannot be refunded")]
    CannotRefundRefund,

    #[error("Transaction type {0} is not refundable")]
    NotRefundable(String),

    #[error("Settlement still in progress")]
    SettlementInProgress,

    #[error("Top-up requires a channel id")]
    MissingChannel,

    #[error("Transaction type {0} requires a parent transaction")]
    MissingParent(String),

    #[error("Wallet already has an active payment plan")]
    PaymentPlanExists,

    /// Request body or parameters are invalid.
    #[error("Invalid request")]
    InvalidRequest(String),

    /// The bank could not resolve a beneficiary during inquiry.
    #[error("Bank inquiry failed: {0}")]
    InquiryFailed(String),
}

impl AppError {
    /// Stable code used in API responses.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Database(_) | AppError::Store(_) => "internal_error",
            AppError::UnprocessableEntity(_) => "unprocessable_entity",
            AppError::UnknownTransactionType(_) => "unknown_transaction_type",
            AppError::InvalidTransactionType { .. } => "invalid_transaction_type",
            AppError::WalletNotFound(_) => "wallet_not_found",
            AppError::TransactionNotFound(_) => "transaction_not_found",
            AppError::BankAccountNotFound => "bank_account_not_found",
            AppError::PaymentPlanNotFound(_) => "payment_plan_not_found",
            AppError::SettlementJobNotFound(_) => "settlement_job_not_found",
            AppError::IncorrectPin => "incorrect_pin",
            AppError::MaxPinAttempt => "max_pin_attempt",
            AppError::WalletLocked => "wallet_locked",
            AppError::InsufficientBalance => "insufficient_balance",
            AppError::SameAccount => "same_account",
            AppError::InvalidAmount => "invalid_amount",
            AppError::DuplicatePayment(_) => "duplicate_payment",
            AppError::AlreadyRefunded => "already_refunded",
            AppError::CannotRefundRefund => "cannot_refund_refund",
            AppError::NotRefundable(_) => "not_refundable",
            AppError::SettlementInProgress => "settlement_in_progress",
            AppError::MissingChannel => "missing_channel",
            AppError::MissingParent(_) => "missing_parent",
            AppError::PaymentPlanExists => "payment_plan_exists",
            AppError::InvalidRequest(_) => "invalid_request",
            AppError::InquiryFailed(_) => "inquiry_failed",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Database(_) | AppError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::WalletNotFound(_)
            | AppError::TransactionNotFound(_)
            | AppError::BankAccountNotFound
            | AppError::PaymentPlanNotFound(_)
            | AppError::SettlementJobNotFound(_) => StatusCode::NOT_FOUND,
            AppError::IncorrectPin | AppError::MaxPinAttempt => StatusCode::UNAUTHORIZED,
            AppError::WalletLocked => StatusCode::FORBIDDEN,
            AppError::DuplicatePayment(_)
            | AppError::AlreadyRefunded
            | AppError::SettlementInProgress
            | AppError::PaymentPlanExists => StatusCode::CONFLICT,
            AppError::InvalidRequest(_)
            | AppError::InvalidAmount
            | AppError::SameAccount
            | AppError::UnknownTransactionType(_)
            | AppError::InvalidTransactionType { .. }
            | AppError::MissingChannel
            | AppError::MissingParent(_) => StatusCode::BAD_REQUEST,
            AppError::InquiryFailed(_) => StatusCode::BAD_GATEWAY,
            AppError::UnprocessableEntity(_)
            | AppError::InsufficientBalance
            | AppError::CannotRefundRefund
            | AppError::NotRefundable(_) => StatusCode::UNPROCESSABLE_ENTITY,
        }
    }

    /// Store failures that roll back a ledger write.
    pub fn is_persistence(&self) -> bool {
        matches!(self, AppError::Database(_) | AppError::Store(_))
    }
}

/// Convert AppError into an HTTP response.
///
/// # Response Format
///
/// ```json
/// {
///   "error": {
///     "code": "insufficient_balance",
///     "message": "Insufficient balance"
///   }
/// }
/// ```
///
/// Persistence errors hide their details from the client.
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let message = match self {
            AppError::Database(_) | AppError::Store(_) => {
                tracing::error!(error = %self, "Request failed with internal error");
                "An internal error occurred".to_string()
            }
            AppError::UnprocessableEntity(ref reason) => reason.clone(),
            AppError::InvalidRequest(ref msg) => msg.clone(),
            _ => self.to_string(),
        };

        let body = Json(json!({
            "error": {
                "code": self.code(),
                "message": message
            }
        }));

        (self.status(), body).into_response()
    }
}
