//! HTTP request handlers (route handlers).
//!
//! Each handler is an async function that:
//! 1. Receives HTTP request data (JSON body, URL params, query string)
//! 2. Calls the matching ledger service with the shared `LedgerContext`
//! 3. Returns HTTP response (JSON, status code)

use axum::{
    Router,
    routing::{get, post},
};

use crate::context::LedgerContext;

/// Bank callbacks and beneficiary inquiry
pub mod bank;
/// Health check endpoint
pub mod health;
/// Payment plan endpoints
pub mod payment_plans;
/// Transfer, refund and transaction lookup endpoints
pub mod transfers;
/// Wallet endpoints
pub mod wallets;

/// All API routes, with the ledger context as shared state.
pub fn router(ctx: LedgerContext) -> Router {
    Router::new()
        .route("/health", get(health::health_check))
        // Wallets
        .route("/api/v1/wallets", post(wallets::open_wallet))
        .route("/api/v1/wallets/{id}", get(wallets::get_wallet))
        .route("/api/v1/wallets/{id}/transactions", get(wallets::history))
        .route("/api/v1/wallets/{id}/top-up", post(wallets::request_top_up))
        // Transfers
        .route(
            "/api/v1/transfers/internal",
            post(transfers::internal_transfer),
        )
        .route(
            "/api/v1/transfers/external",
            post(transfers::external_transfer),
        )
        .route(
            "/api/v1/transactions/{id}",
            get(transfers::get_transaction),
        )
        .route(
            "/api/v1/transactions/{id}/refund",
            post(transfers::refund),
        )
        // Bank
        .route(
            "/api/v1/bank-callbacks/credits",
            post(bank::receive_credit),
        )
        .route("/api/v1/bank-accounts/inquiry", post(bank::inquiry))
        // Payment plans
        .route(
            "/api/v1/payment-plans",
            post(payment_plans::create_payment_plan),
        )
        .route(
            "/api/v1/payment-plans/{id}/settle",
            post(payment_plans::settle_plan),
        )
        .with_state(ctx)
}
