#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, TimeZone, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use wallet_ledger::clock::{Clock, ManualClock};
use wallet_ledger::config::LedgerConfig;
use wallet_ledger::context::LedgerContext;
use wallet_ledger::gateway::MockBankGateway;
use wallet_ledger::models::bank::{Bank, BankAccount, TransferTier};
use wallet_ledger::models::payment_plan::Plan;
use wallet_ledger::models::quota::{Quota, RewardType};
use wallet_ledger::models::settlement::SettlementJob;
use wallet_ledger::models::transaction::{
    BankCreditRequest, ExternalTransferRequest, InternalTransferRequest,
};
use wallet_ledger::services::settlement_worker::SettlementWorker;
use wallet_ledger::services::{transfer_service, wallet_service};
use wallet_ledger::store::{InMemoryLedgerStore, LedgerStore};

pub const PIN: &str = "123456";
pub const BCA: &str = "014";
pub const OWN_BANK: &str = "009";

pub fn start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 10, 18, 9, 0, 0).unwrap()
}

/// Ledger over the in-memory store, a scripted bank and a manual clock.
pub struct Harness {
    pub ctx: LedgerContext,
    pub store: InMemoryLedgerStore,
    pub gateway: Arc<MockBankGateway>,
    pub clock: Arc<ManualClock>,
}

impl Harness {
    pub async fn new() -> Self {
        Self::with_config(LedgerConfig::default()).await
    }

    pub async fn with_config(config: LedgerConfig) -> Self {
        let store = InMemoryLedgerStore::new();
        let gateway = Arc::new(MockBankGateway::new());
        let clock = Arc::new(ManualClock::new(start_time()));
        let ctx = LedgerContext::new(Arc::new(store.clone()), gateway.clone(), config)
            .with_clock(clock.clone());

        let harness = Self {
            ctx,
            store,
            gateway,
            clock,
        };
        harness.seed_bank(BCA, "BCA", TransferTier::Online).await;
        harness.seed_bank(OWN_BANK, "Own Bank", TransferTier::Online).await;
        harness.seed_bank("008", "Mandiri", TransferTier::Clearing).await;
        harness
    }

    pub async fn seed_bank(&self, code: &str, name: &str, tier: TransferTier) {
        let mut uow = self.store.begin().await.unwrap();
        uow.insert_bank(&Bank {
            code: code.to_string(),
            name: name.to_string(),
            tier,
        })
        .await
        .unwrap();
        uow.commit().await.unwrap();
    }

    pub async fn bank_account(&self, wallet_id: Uuid, bank_code: &str) -> Uuid {
        let account = BankAccount {
            id: Uuid::new_v4(),
            wallet_id,
            bank_code: bank_code.to_string(),
            account_no: "1234567890".to_string(),
            account_name: "Budi Santoso".to_string(),
        };
        let mut uow = self.store.begin().await.unwrap();
        uow.insert_bank_account(&account).await.unwrap();
        uow.commit().await.unwrap();
        account.id
    }

    pub async fn grant_quota(
        &self,
        wallet_id: Uuid,
        uses: i32,
        reward_type: RewardType,
        reward_amount: Decimal,
    ) {
        let now = self.clock.now();
        let mut uow = self.store.begin().await.unwrap();
        uow.insert_quota(&Quota {
            id: Uuid::new_v4(),
            wallet_id,
            start_valid: now - Duration::days(1),
            end_valid: now + Duration::days(30),
            no_of_transactions: uses,
            reward_type,
            reward_amount,
        })
        .await
        .unwrap();
        uow.commit().await.unwrap();
    }

    /// Open a wallet and fund it through a virtual account deposit.
    pub async fn wallet(&self, balance: i64) -> Uuid {
        let wallet = wallet_service::open_wallet(&self.ctx, PIN).await.unwrap();
        if balance > 0 {
            self.top_up(wallet.id, balance).await;
        }
        wallet.id
    }

    pub async fn top_up(&self, wallet_id: Uuid, amount: i64) -> Uuid {
        transfer_service::receive_bank_credit(
            &self.ctx,
            BankCreditRequest {
                wallet_id,
                amount,
                flag: "TOP_UP".to_string(),
                source_account: "VA".to_string(),
                channel_id: Some("VA-BCA".to_string()),
                ref_number: format!("VA-{}", Uuid::new_v4()),
                notes: None,
            },
        )
        .await
        .unwrap()
        .transaction_id
    }

    pub async fn balance(&self, wallet_id: Uuid) -> i64 {
        wallet_service::get_wallet(&self.ctx, wallet_id)
            .await
            .unwrap()
            .balance
    }

    pub fn internal(&self, source: Uuid, destination: Uuid, amount: i64) -> InternalTransferRequest {
        InternalTransferRequest {
            source,
            destination,
            amount,
            pin: PIN.to_string(),
            notes: None,
            flag: "TRANSFER".to_string(),
        }
    }

    pub fn external(&self, source: Uuid, bank_account_id: Uuid, amount: i64) -> ExternalTransferRequest {
        ExternalTransferRequest {
            source,
            bank_account_id,
            amount,
            pin: PIN.to_string(),
            notes: None,
            flag: "BANK_TRANSFER".to_string(),
        }
    }

    pub fn worker(&self) -> SettlementWorker {
        SettlementWorker::new(self.ctx.clone(), StdDuration::from_secs(1))
    }

    /// Scan `rounds` times, moving the clock forward by `step` after each scan.
    pub async fn run_worker(&self, rounds: usize, step: Duration) {
        let worker = self.worker();
        for _ in 0..rounds {
            worker.run_once().await.unwrap();
            self.clock.advance(step);
        }
    }

    pub async fn jobs(&self) -> Vec<SettlementJob> {
        self.store.jobs().await
    }

    pub async fn instalments(&self, payment_plan_id: Uuid) -> Vec<Plan> {
        let mut uow = self.store.begin().await.unwrap();
        uow.plans_for(payment_plan_id).await.unwrap()
    }
}
