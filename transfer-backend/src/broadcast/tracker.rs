//! Pending transaction tracker
//!
//! Single slot holding the most recently broadcast, not-yet-finalized
//! transaction. Emitting a new record discards the old reference; the old
//! transaction itself is unaffected on-chain.

use chrono::{DateTime, Utc};
use ethers::types::H256;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use super::classifier::{CallOutcome, Classified, ErrorKind};
use super::ledger::BalanceLedger;
use crate::transfer_queue::{Asset, Chain, ExecutionMode, TransferStatus, shorten};
use crate::wallet::{ChainError, SignerSession};

/// The in-flight transaction the operator can cancel or replace
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingTransactionRecord {
    /// Transaction hash (real) or synthesized identifier (simulated)
    pub tx_ref: String,
    /// Queue entries carried by this transaction
    pub entry_ids: Vec<String>,
    /// Destination, or a batch marker for multi-recipient calls
    pub destination: String,
    pub amount: Decimal,
    pub chain: Chain,
    pub asset: Asset,
    pub mode: ExecutionMode,
    pub status: TransferStatus,
    pub emitted_at: DateTime<Utc>,
}

impl PendingTransactionRecord {
    pub fn new(
        tx_ref: impl Into<String>,
        entry_ids: Vec<String>,
        destination: impl Into<String>,
        amount: Decimal,
        chain: Chain,
        asset: Asset,
        mode: ExecutionMode,
    ) -> Self {
        Self {
            tx_ref: tx_ref.into(),
            entry_ids,
            destination: destination.into(),
            amount,
            chain,
            asset,
            mode,
            status: TransferStatus::Pending,
            emitted_at: Utc::now(),
        }
    }
}

/// Result of a cancel/replace request
#[derive(Debug, Clone, PartialEq)]
pub enum ReplaceOutcome {
    /// No transaction was being tracked
    NothingPending,
    /// The tracked transaction was superseded. Entries listed in
    /// `record.entry_ids` are moved to `Replaced` by whoever holds them,
    /// see `ExecutionReport::apply_replacement`.
    Replaced {
        record: PendingTransactionRecord,
        /// Hash of the zero-value replacement, for real replacements
        replacement_ref: Option<String>,
    },
    /// The replacement attempt failed; the record is still tracked
    Failed(Classified),
}

/// Single-slot holder for the most recent in-flight transaction
pub struct PendingTxTracker {
    slot: Mutex<Option<PendingTransactionRecord>>,
    replace_delay: Duration,
}

impl PendingTxTracker {
    pub fn new(replace_delay: Duration) -> Self {
        Self {
            slot: Mutex::new(None),
            replace_delay,
        }
    }

    /// Track a newly emitted transaction, discarding any previous reference
    pub fn set(&self, record: PendingTransactionRecord) {
        let mut slot = self.slot.lock();
        if let Some(previous) = slot.as_ref() {
            log::debug!(
                "[Tracker] Superseding {} with {}",
                shorten(&previous.tx_ref, 18),
                shorten(&record.tx_ref, 18)
            );
        }
        log::info!("[Tracker] Tracking {} ({})", record.tx_ref, record.mode);
        *slot = Some(record);
    }

    pub fn get(&self) -> Option<PendingTransactionRecord> {
        self.slot.lock().clone()
    }

    /// Drop the record once its transaction settled, if it is still the tracked one
    pub fn finalize(&self, tx_ref: &str) -> bool {
        let mut slot = self.slot.lock();
        if slot.as_ref().is_some_and(|r| r.tx_ref == tx_ref) {
            log::info!("[Tracker] {} settled, clearing slot", tx_ref);
            *slot = None;
            true
        } else {
            false
        }
    }

    /// Cancel or replace the tracked transaction
    ///
    /// On-chain records are replaced through the session with a zero-value
    /// transfer at the same nonce, which requires real mode. Simulated records
    /// wait out the artificial delay, flip to `Replaced` and credit the
    /// ledger back.
    pub async fn cancel_or_replace(
        &self,
        mode: ExecutionMode,
        session: Option<&Arc<dyn SignerSession>>,
        ledger: &dyn BalanceLedger,
    ) -> ReplaceOutcome {
        let Some(record) = self.get() else {
            return ReplaceOutcome::NothingPending;
        };

        let replacement_ref = match (record.mode, mode, session) {
            (ExecutionMode::Simulated, _, _) => {
                tokio::time::sleep(self.replace_delay).await;
                if record.asset.is_fungible_token() {
                    ledger.increment(record.amount).await;
                }
                None
            }
            (ExecutionMode::Real, ExecutionMode::Real, Some(session)) => {
                let outcome: CallOutcome<H256> = match record.tx_ref.parse::<H256>() {
                    Ok(hash) => session.replace_with_cancel(hash).await.into(),
                    Err(_) => Err::<H256, ChainError>(ChainError::new(format!(
                        "'{}' is not an on-chain transaction hash",
                        record.tx_ref
                    )))
                    .into(),
                };
                match outcome {
                    CallOutcome::Success(hash) => Some(format!("{:?}", hash)),
                    CallOutcome::Classified(failure) => return ReplaceOutcome::Failed(failure),
                }
            }
            (ExecutionMode::Real, ExecutionMode::Simulated, _) => {
                return ReplaceOutcome::Failed(Classified {
                    kind: ErrorKind::Unknown,
                    message: "tracked transaction is on-chain; switch to real mode to replace it"
                        .to_string(),
                });
            }
            (ExecutionMode::Real, ExecutionMode::Real, None) => {
                return ReplaceOutcome::Failed(Classified {
                    kind: ErrorKind::Unknown,
                    message: "no signing session available to send a replacement".to_string(),
                });
            }
        };

        let mut replaced = record;
        replaced.status = TransferStatus::Replaced;
        self.finalize(&replaced.tx_ref);

        ReplaceOutcome::Replaced {
            record: replaced,
            replacement_ref,
        }
    }
}

impl Default for PendingTxTracker {
    fn default() -> Self {
        Self::new(Duration::from_millis(2000))
    }
}
