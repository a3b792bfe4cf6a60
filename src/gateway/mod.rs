//! Bank gateway port.
//!
//! The ledger reaches the partner bank only through `BankGateway`. Calls are
//! synchronous with a timeout and always carry the client reference the bank
//! dedups on. Only the settlement worker and the beneficiary inquiry call it,
//! and never while a wallet row is locked.

pub mod http;
pub mod mock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::bank::BankDestination;

pub use http::HttpBankGateway;
pub use mock::MockBankGateway;

/// Remote failure. Every variant is transient from the worker's point of view.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GatewayError {
    #[error("bank gateway timed out")]
    Timeout,

    #[error("bank gateway returned HTTP {0}")]
    Status(u16),

    #[error("bank rejected request: {code} {message}")]
    Rejected { code: String, message: String },

    #[error("malformed bank response: {0}")]
    Malformed(String),

    #[error("transport error: {0}")]
    Transport(String),
}

/// Outbound interbank payment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentRequest {
    /// Client reference, stable across retries
    pub request_ref: String,
    pub wallet_id: Uuid,
    /// Positive minor units
    pub amount: i64,
    pub destination: BankDestination,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentReceipt {
    pub bank_ref: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VirtualAccountRequest {
    pub request_ref: String,
    pub wallet_id: Uuid,
    pub amount: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VirtualAccount {
    pub account_no: String,
    pub expires_at: Option<DateTime<Utc>>,
}

/// Beneficiary as the destination bank knows it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InquiryResult {
    pub bank_code: String,
    pub bank_name: String,
    pub account_no: String,
    pub account_name: String,
    /// Inquiry reference the bank expects on the follow-up transfer
    pub transfer_ref: String,
}

/// What the bank knows about a client reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RemotePaymentStatus {
    Settled { bank_ref: String },
    Pending,
    Failed { reason: String },
    /// The bank never received the reference
    NotFound,
}

#[async_trait]
pub trait BankGateway: Send + Sync {
    async fn create_virtual_account(
        &self,
        request: &VirtualAccountRequest,
    ) -> Result<VirtualAccount, GatewayError>;

    async fn do_payment(&self, request: &PaymentRequest) -> Result<PaymentReceipt, GatewayError>;

    async fn get_interbank_inquiry(
        &self,
        destination: &BankDestination,
    ) -> Result<InquiryResult, GatewayError>;

    async fn get_payment_status(
        &self,
        request_ref: &str,
    ) -> Result<RemotePaymentStatus, GatewayError>;
}
