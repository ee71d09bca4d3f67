//! Simulated balance ledger
//!
//! Tracks the dry-run token balance that simulated transfers draw down.

use async_trait::async_trait;
use parking_lot::Mutex;
use rust_decimal::Decimal;

/// Collaborator notified when the simulated path moves funds
#[async_trait]
pub trait BalanceLedger: Send + Sync {
    /// Subtract a simulated transfer. Never goes below zero.
    async fn decrement(&self, amount: Decimal);

    /// Credit an amount back, e.g. after a simulated replacement. Saturates
    /// at the largest representable balance.
    async fn increment(&self, amount: Decimal);

    /// Current simulated balance
    fn balance(&self) -> Decimal;
}

/// In-memory ledger; lost on restart
pub struct InMemoryLedger {
    balance: Mutex<Decimal>,
}

impl InMemoryLedger {
    pub fn new(opening_balance: Decimal) -> Self {
        Self {
            balance: Mutex::new(opening_balance),
        }
    }
}

#[async_trait]
impl BalanceLedger for InMemoryLedger {
    async fn decrement(&self, amount: Decimal) {
        let mut balance = self.balance.lock();
        *balance = balance.saturating_sub(amount).max(Decimal::ZERO);
        log::debug!("[Ledger] -{} -> {}", amount, *balance);
    }

    async fn increment(&self, amount: Decimal) {
        let mut balance = self.balance.lock();
        *balance = balance.saturating_add(amount);
        log::debug!("[Ledger] +{} -> {}", amount, *balance);
    }

    fn balance(&self) -> Decimal {
        *self.balance.lock()
    }
}
