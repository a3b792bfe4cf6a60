//! Scripted bank gateway for tests and local runs.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

use super::{
    BankGateway, GatewayError, InquiryResult, PaymentReceipt, PaymentRequest,
    RemotePaymentStatus, VirtualAccount, VirtualAccountRequest,
};
use crate::models::bank::BankDestination;

/// Bank that settles everything unless told to fail.
///
/// Executed payments are remembered by client reference, so resending a
/// reference returns the original bank ref without a second execution, as a
/// real bank dedups.
#[derive(Default)]
pub struct MockBankGateway {
    payment_calls: AtomicUsize,
    executed_payments: AtomicUsize,
    virtual_account_calls: AtomicUsize,
    inquiry_calls: AtomicUsize,
    status_calls: AtomicUsize,
    /// Upcoming `do_payment` calls that fail before anything else is checked
    failures_queued: Mutex<Vec<GatewayError>>,
    fail_all_payments: Mutex<bool>,
    fail_inquiry: Mutex<bool>,
    executed: Mutex<HashMap<String, String>>,
}

fn guard<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

impl MockBankGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `count` payment attempts with `error`.
    pub fn fail_next_payments(&self, count: usize, error: GatewayError) {
        let mut queued = guard(&self.failures_queued);
        queued.extend(std::iter::repeat_n(error, count));
    }

    pub fn set_fail_all_payments(&self, fail: bool) {
        *guard(&self.fail_all_payments) = fail;
    }

    pub fn set_fail_inquiry(&self, fail: bool) {
        *guard(&self.fail_inquiry) = fail;
    }

    /// Record a payment as executed on the bank side without a call, as if a
    /// previous attempt succeeded but its response was lost.
    pub fn mark_executed(&self, request_ref: &str, bank_ref: &str) {
        guard(&self.executed).insert(request_ref.to_string(), bank_ref.to_string());
        self.executed_payments.fetch_add(1, Ordering::SeqCst);
    }

    /// Every `do_payment` call, successful or not.
    pub fn payment_calls(&self) -> usize {
        self.payment_calls.load(Ordering::SeqCst)
    }

    /// Distinct payments the bank actually executed.
    pub fn executed_payments(&self) -> usize {
        self.executed_payments.load(Ordering::SeqCst)
    }

    pub fn virtual_account_calls(&self) -> usize {
        self.virtual_account_calls.load(Ordering::SeqCst)
    }

    pub fn inquiry_calls(&self) -> usize {
        self.inquiry_calls.load(Ordering::SeqCst)
    }

    pub fn status_calls(&self) -> usize {
        self.status_calls.load(Ordering::SeqCst)
    }

    pub fn bank_ref_for(&self, request_ref: &str) -> Option<String> {
        guard(&self.executed).get(request_ref).cloned()
    }
}

#[async_trait]
impl BankGateway for MockBankGateway {
    async fn create_virtual_account(
        &self,
        request: &VirtualAccountRequest,
    ) -> Result<VirtualAccount, GatewayError> {
        let n = self.virtual_account_calls.fetch_add(1, Ordering::SeqCst);
        let account_no = format!("8808{:08}", n + 1);
        tracing::debug!(request_ref = %request.request_ref, %account_no, "Mock virtual account issued");
        Ok(VirtualAccount {
            account_no,
            expires_at: None,
        })
    }

    async fn do_payment(&self, request: &PaymentRequest) -> Result<PaymentReceipt, GatewayError> {
        self.payment_calls.fetch_add(1, Ordering::SeqCst);

        {
            let mut queued = guard(&self.failures_queued);
            if !queued.is_empty() {
                return Err(queued.remove(0));
            }
        }
        if *guard(&self.fail_all_payments) {
            return Err(GatewayError::Status(503));
        }

        let mut executed = guard(&self.executed);
        if let Some(bank_ref) = executed.get(&request.request_ref) {
            return Ok(PaymentReceipt {
                bank_ref: bank_ref.clone(),
            });
        }
        let bank_ref = format!("BR-{}", executed.len() + 1);
        executed.insert(request.request_ref.clone(), bank_ref.clone());
        self.executed_payments.fetch_add(1, Ordering::SeqCst);
        Ok(PaymentReceipt { bank_ref })
    }

    async fn get_interbank_inquiry(
        &self,
        destination: &BankDestination,
    ) -> Result<InquiryResult, GatewayError> {
        let call = self.inquiry_calls.fetch_add(1, Ordering::SeqCst) + 1;
        if *guard(&self.fail_inquiry) {
            return Err(GatewayError::Rejected {
                code: "ACCOUNT_NOT_FOUND".into(),
                message: "beneficiary account not found".into(),
            });
        }
        Ok(InquiryResult {
            bank_code: destination.bank_code.clone(),
            bank_name: format!("BANK {}", destination.bank_code),
            account_no: destination.account_no.clone(),
            account_name: destination.account_name.to_uppercase(),
            transfer_ref: format!("INQ-{call}"),
        })
    }

    async fn get_payment_status(
        &self,
        request_ref: &str,
    ) -> Result<RemotePaymentStatus, GatewayError> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        Ok(match guard(&self.executed).get(request_ref) {
            Some(bank_ref) => RemotePaymentStatus::Settled {
                bank_ref: bank_ref.clone(),
            },
            None => RemotePaymentStatus::NotFound,
        })
    }
}
