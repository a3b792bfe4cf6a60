//! Shared handles passed to every ledger operation.

use std::sync::Arc;

use crate::clock::{Clock, SystemClock};
use crate::config::LedgerConfig;
use crate::gateway::BankGateway;
use crate::store::LedgerStore;

/// Everything an operation needs: the store it opens units of work on, the
/// bank gateway, configuration as plain data, and the time source.
///
/// Cheap to clone; used as axum router state.
#[derive(Clone)]
pub struct LedgerContext {
    pub store: Arc<dyn LedgerStore>,
    pub gateway: Arc<dyn BankGateway>,
    pub config: Arc<LedgerConfig>,
    pub clock: Arc<dyn Clock>,
}

impl LedgerContext {
    pub fn new(
        store: Arc<dyn LedgerStore>,
        gateway: Arc<dyn BankGateway>,
        config: LedgerConfig,
    ) -> Self {
        Self {
            store,
            gateway,
            config: Arc::new(config),
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }
}
