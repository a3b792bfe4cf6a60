//! Transaction type registry.
//!
//! Every ledger movement carries a flag naming its product. The set of products
//! is closed: `TransactionProduct::resolve` maps a flag onto its variant, and the
//! variant decides direction, pairing, refundability, settlement and the
//! invariants a new transaction of that type must satisfy.

use std::fmt;

use uuid::Uuid;

use crate::context::LedgerContext;
use crate::error::AppError;
use crate::models::payment::Payment;
use crate::models::settlement::SettlementKind;
use crate::models::transaction::Transaction;
use crate::services::payment_plan_service;
use crate::store::UnitOfWork;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransactionProduct {
    Transfer,
    ReceiveTransfer,
    Payroll,
    ReceivePayroll,
    Withdraw,
    BankTransfer,
    TransferFee,
    TopUp,
    AutoDebit,
    Cashback,
    WithdrawRefund,
    BankTransferRefund,
    TransferFeeRefund,
    TopUpRefund,
    AutoDebitRefund,
}

const ALL: [TransactionProduct; 15] = [
    TransactionProduct::Transfer,
    TransactionProduct::ReceiveTransfer,
    TransactionProduct::Payroll,
    TransactionProduct::ReceivePayroll,
    TransactionProduct::Withdraw,
    TransactionProduct::BankTransfer,
    TransactionProduct::TransferFee,
    TransactionProduct::TopUp,
    TransactionProduct::AutoDebit,
    TransactionProduct::Cashback,
    TransactionProduct::WithdrawRefund,
    TransactionProduct::BankTransferRefund,
    TransactionProduct::TransferFeeRefund,
    TransactionProduct::TopUpRefund,
    TransactionProduct::AutoDebitRefund,
];

/// Fields of a transaction about to be created that type invariants look at.
#[derive(Debug, Clone, Copy)]
pub struct Draft<'a> {
    pub channel_id: Option<&'a str>,
    pub parent_id: Option<Uuid>,
    pub has_destination: bool,
}

/// A created transaction bound to its payment and product.
#[derive(Debug, Clone)]
pub struct Loaded {
    pub product: TransactionProduct,
    pub transaction: Transaction,
    pub payment: Payment,
}

impl TransactionProduct {
    /// Look up the product for a flag.
    pub fn resolve(flag: &str) -> Result<Self, AppError> {
        ALL.iter()
            .copied()
            .find(|product| product.flag() == flag)
            .ok_or_else(|| AppError::UnknownTransactionType(flag.to_string()))
    }

    pub fn flag(&self) -> &'static str {
        match self {
            TransactionProduct::Transfer => "TRANSFER",
            TransactionProduct::ReceiveTransfer => "RECEIVE_TRANSFER",
            TransactionProduct::Payroll => "PAYROLL",
            TransactionProduct::ReceivePayroll => "RECEIVE_PAYROLL",
            TransactionProduct::Withdraw => "WITHDRAW",
            TransactionProduct::BankTransfer => "BANK_TRANSFER",
            TransactionProduct::TransferFee => "TRANSFER_FEE",
            TransactionProduct::TopUp => "TOP_UP",
            TransactionProduct::AutoDebit => "AUTO_DEBIT",
            TransactionProduct::Cashback => "CASHBACK",
            TransactionProduct::WithdrawRefund => "WITHDRAW_REFUND",
            TransactionProduct::BankTransferRefund => "BANK_TRANSFER_REFUND",
            TransactionProduct::TransferFeeRefund => "TRANSFER_FEE_REFUND",
            TransactionProduct::TopUpRefund => "TOP_UP_REFUND",
            TransactionProduct::AutoDebitRefund => "AUTO_DEBIT_REFUND",
        }
    }

    /// Whether a transaction of this type adds to the wallet balance.
    pub fn is_credit(&self) -> bool {
        matches!(
            self,
            TransactionProduct::ReceiveTransfer
                | TransactionProduct::ReceivePayroll
                | TransactionProduct::TopUp
                | TransactionProduct::Cashback
                | TransactionProduct::WithdrawRefund
                | TransactionProduct::BankTransferRefund
                | TransactionProduct::TransferFeeRefund
                | TransactionProduct::AutoDebitRefund
        )
    }

    pub fn is_refund(&self) -> bool {
        matches!(
            self,
            TransactionProduct::WithdrawRefund
                | TransactionProduct::BankTransferRefund
                | TransactionProduct::TransferFeeRefund
                | TransactionProduct::TopUpRefund
                | TransactionProduct::AutoDebitRefund
        )
    }

    /// Receiver leg of a wallet-to-wallet product.
    pub fn paired_receive(&self) -> Option<Self> {
        match self {
            TransactionProduct::Transfer => Some(TransactionProduct::ReceiveTransfer),
            TransactionProduct::Payroll => Some(TransactionProduct::ReceivePayroll),
            _ => None,
        }
    }

    /// Reversal product, for types that can be refunded.
    pub fn refund_flag(&self) -> Option<Self> {
        match self {
            TransactionProduct::Withdraw => Some(TransactionProduct::WithdrawRefund),
            TransactionProduct::BankTransfer => Some(TransactionProduct::BankTransferRefund),
            TransactionProduct::TransferFee => Some(TransactionProduct::TransferFeeRefund),
            TransactionProduct::TopUp => Some(TransactionProduct::TopUpRefund),
            TransactionProduct::AutoDebit => Some(TransactionProduct::AutoDebitRefund),
            _ => None,
        }
    }

    /// Types whose debit is delivered to a bank account by the settlement worker.
    pub fn settlement_kind(&self) -> Option<SettlementKind> {
        match self {
            TransactionProduct::Withdraw | TransactionProduct::BankTransfer => {
                Some(SettlementKind::BankTransfer)
            }
            TransactionProduct::AutoDebit => Some(SettlementKind::PlanDebit),
            _ => None,
        }
    }

    /// Types a caller may start an outbound bank transfer with.
    pub fn is_external(&self) -> bool {
        matches!(
            self,
            TransactionProduct::Withdraw | TransactionProduct::BankTransfer
        )
    }

    /// Types a bank callback may credit a wallet with.
    pub fn is_bank_credit(&self) -> bool {
        matches!(
            self,
            TransactionProduct::TopUp | TransactionProduct::ReceivePayroll
        )
    }

    /// Type-specific invariants checked before anything is written.
    pub fn validate(&self, draft: Draft<'_>) -> Result<(), AppError> {
        if *self == TransactionProduct::TopUp && draft.channel_id.is_none_or(str::is_empty) {
            return Err(AppError::MissingChannel);
        }
        let needs_parent = self.is_refund()
            || matches!(
                self,
                TransactionProduct::ReceiveTransfer
                    | TransactionProduct::TransferFee
                    | TransactionProduct::Cashback
            );
        if needs_parent && draft.parent_id.is_none() {
            return Err(AppError::MissingParent(self.flag().to_string()));
        }
        if self.settlement_kind().is_some() && !draft.has_destination {
            return Err(AppError::InvalidTransactionType {
                flag: self.flag().to_string(),
                reason: "requires a bank destination",
            });
        }
        Ok(())
    }

    /// Bind a freshly created transaction to its payment.
    pub fn load(self, transaction: Transaction, payment: Payment) -> Loaded {
        Loaded {
            product: self,
            transaction,
            payment,
        }
    }
}

impl fmt::Display for TransactionProduct {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.flag())
    }
}

impl Loaded {
    /// Follow-on effects of the transaction, written into the same unit of work
    /// so they commit or roll back with it. Returns the messages to surface to
    /// the caller.
    pub async fn post_create(
        &self,
        uow: &mut dyn UnitOfWork,
        ctx: &LedgerContext,
    ) -> Result<Vec<String>, AppError> {
        match self.product {
            TransactionProduct::ReceivePayroll => {
                payment_plan_service::on_payroll_received(
                    uow,
                    ctx,
                    self.transaction.wallet_id,
                    self.transaction.amount,
                )
                .await
            }
            _ => Ok(Vec::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft() -> Draft<'static> {
        Draft {
            channel_id: None,
            parent_id: None,
            has_destination: false,
        }
    }

    #[test]
    fn test_resolve_round_trips_every_flag() {
        for product in ALL {
            assert_eq!(TransactionProduct::resolve(product.flag()).unwrap(), product);
        }
    }

    #[test]
    fn test_unknown_flag() {
        let err = TransactionProduct::resolve("LOAN").unwrap_err();
        assert!(matches!(err, AppError::UnknownTransactionType(flag) if flag == "LOAN"));
    }

    #[test]
    fn test_top_up_requires_channel() {
        let err = TransactionProduct::TopUp.validate(draft()).unwrap_err();
        assert!(matches!(err, AppError::MissingChannel));

        let ok = Draft {
            channel_id: Some("BCA_VA"),
            ..draft()
        };
        assert!(TransactionProduct::TopUp.validate(ok).is_ok());
    }

    #[test]
    fn test_refund_requires_parent() {
        let err = TransactionProduct::BankTransferRefund
            .validate(draft())
            .unwrap_err();
        assert!(matches!(err, AppError::MissingParent(_)));
    }

    #[test]
    fn test_outbound_requires_destination() {
        let err = TransactionProduct::BankTransfer.validate(draft()).unwrap_err();
        assert!(matches!(err, AppError::InvalidTransactionType { .. }));
    }

    #[test]
    fn test_refunds_are_not_refundable() {
        for product in ALL.into_iter().filter(TransactionProduct::is_refund) {
            assert!(product.refund_flag().is_none());
        }
    }

    #[test]
    fn test_refund_reverses_direction() {
        for product in ALL {
            if let Some(refund) = product.refund_flag() {
                assert_ne!(product.is_credit(), refund.is_credit(), "{product}");
                assert_eq!(refund.flag(), format!("{}_REFUND", product.flag()));
            }
        }
    }

    #[test]
    fn test_internal_products_pair_with_receive() {
        assert_eq!(
            TransactionProduct::Transfer.paired_receive(),
            Some(TransactionProduct::ReceiveTransfer)
        );
        assert_eq!(
            TransactionProduct::Payroll.paired_receive(),
            Some(TransactionProduct::ReceivePayroll)
        );
        assert!(TransactionProduct::BankTransfer.paired_receive().is_none());
    }
}
