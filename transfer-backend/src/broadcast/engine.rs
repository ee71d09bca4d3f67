//! Broadcast engine
//!
//! Turns a drained queue snapshot into chain calls. Three paths:
//!
//! - **Atomic batch**: every entry is the token on the session's chain and a
//!   batcher is configured. Allowance check, approval when short, one
//!   `batchTransfer`. Any failure aborts the whole batch.
//! - **Per-entry real**: one `transfer` per entry; a failure is logged and
//!   the next entry still runs.
//! - **Simulated**: artificial delays and a synthesized identifier. Used in
//!   simulated mode and for entries that have no direct call.

use ethers::types::{Address, H256, U256};
use ethers::utils::parse_units;
use rust_decimal::Decimal;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use super::classifier::{CallOutcome, Classified, ErrorKind, classify};
use super::ledger::BalanceLedger;
use super::oplog::BroadcastLog;
use super::tracker::{PendingTransactionRecord, PendingTxTracker, ReplaceOutcome};
use crate::config::Config;
use crate::transfer_queue::{
    Asset, AuthContext, ExecutionMode, TransferEntry, TransferStatus, shorten,
};
use crate::wallet::{ChainError, SignerSession};

/// Decimals assumed when the token does not answer `decimals()`
pub const FALLBACK_TOKEN_DECIMALS: u8 = 6;

/// Destination recorded for multi-recipient batch transactions
pub const BATCH_DESTINATION: &str = "MULTI_BATCH";

/// Contract addresses and artificial delays the engine runs with
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub token_address: Address,
    pub batcher_address: Option<Address>,
    pub build_delay: Duration,
    pub broadcast_delay: Duration,
}

impl EngineSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            token_address: config.token_address,
            batcher_address: config.batcher_address,
            build_delay: config.build_delay,
            broadcast_delay: config.broadcast_delay,
        }
    }
}

/// What one `execute` call did
#[derive(Debug, Clone)]
pub struct ExecutionReport {
    /// Log lines produced by this execution, oldest first
    pub log: Vec<String>,
    /// The snapshot with statuses and references updated
    pub entries: Vec<TransferEntry>,
    /// Tracked transaction after the execution, if any
    pub pending: Option<PendingTransactionRecord>,
    /// Amount drawn from the simulated ledger
    pub simulated_debit: Decimal,
    /// Whether the atomic batch path was taken
    pub batched: bool,
}

impl ExecutionReport {
    pub fn confirmed_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| e.status() == TransferStatus::Confirmed)
            .count()
    }

    /// Move the entries carried by a replaced transaction to `Replaced`.
    /// Returns how many entries changed; settled entries are left alone.
    pub fn apply_replacement(&mut self, outcome: &ReplaceOutcome) -> usize {
        let ReplaceOutcome::Replaced { record, .. } = outcome else {
            return 0;
        };
        self.entries
            .iter_mut()
            .filter(|e| record.entry_ids.iter().any(|id| id == e.id()))
            .filter_map(|e| e.mark_replaced().then_some(()))
            .count()
    }
}

/// Collects the lines of one execution while mirroring them into the shared log
struct RunLog<'a> {
    shared: &'a BroadcastLog,
    lines: Vec<String>,
}

impl<'a> RunLog<'a> {
    fn new(shared: &'a BroadcastLog) -> Self {
        Self {
            shared,
            lines: Vec::new(),
        }
    }

    fn note(&mut self, message: impl AsRef<str>) {
        let line = self.shared.push(message);
        self.lines.push(line);
    }
}

pub struct BroadcastEngine {
    settings: EngineSettings,
    tracker: Arc<PendingTxTracker>,
    ledger: Arc<dyn BalanceLedger>,
    log: Arc<BroadcastLog>,
}

impl BroadcastEngine {
    pub fn new(
        settings: EngineSettings,
        tracker: Arc<PendingTxTracker>,
        ledger: Arc<dyn BalanceLedger>,
        log: Arc<BroadcastLog>,
    ) -> Self {
        Self {
            settings,
            tracker,
            ledger,
            log,
        }
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn tracker(&self) -> &Arc<PendingTxTracker> {
        &self.tracker
    }

    pub fn ledger(&self) -> &Arc<dyn BalanceLedger> {
        &self.ledger
    }

    pub fn log(&self) -> &Arc<BroadcastLog> {
        &self.log
    }

    /// Execute a drained snapshot
    ///
    /// The mode is read once here and applies to the whole snapshot.
    pub async fn execute(
        &self,
        snapshot: Vec<TransferEntry>,
        mode: ExecutionMode,
        auth: &AuthContext,
    ) -> ExecutionReport {
        let mut run = RunLog::new(&self.log);
        let mut entries = snapshot;

        if entries.is_empty() {
            return ExecutionReport {
                log: run.lines,
                entries,
                pending: self.tracker.get(),
                simulated_debit: Decimal::ZERO,
                batched: false,
            };
        }

        run.note(format!(
            "Executing {} transfer(s) in {} mode, authority: {}",
            entries.len(),
            mode,
            auth.describe()
        ));

        let session = match mode {
            ExecutionMode::Real => {
                let session = auth.session();
                if session.is_none() {
                    run.note("No signing session connected; real mode falls back to simulation");
                }
                session
            }
            ExecutionMode::Simulated => None,
        };

        if let Some(session) = session {
            if let Some(batcher) = self.batch_target(&entries, session.as_ref()) {
                self.execute_batch(&mut entries, session.as_ref(), batcher, &mut run)
                    .await;
                return ExecutionReport {
                    log: run.lines,
                    entries,
                    pending: self.tracker.get(),
                    simulated_debit: Decimal::ZERO,
                    batched: true,
                };
            }
        }

        let mut simulated_debit = Decimal::ZERO;
        for entry in entries.iter_mut() {
            match session {
                Some(session) if has_direct_call(entry, session.as_ref()) => {
                    self.execute_direct(entry, session.as_ref(), &mut run).await;
                }
                Some(session) => {
                    run.note(format!(
                        "No direct call for {} on {} from a {} session, simulating",
                        entry.asset(),
                        entry.chain(),
                        session.chain()
                    ));
                    let debit = self.execute_simulated(entry, &mut run).await;
                    simulated_debit = simulated_debit.saturating_add(debit);
                }
                None => {
                    let debit = self.execute_simulated(entry, &mut run).await;
                    simulated_debit = simulated_debit.saturating_add(debit);
                }
            }
        }

        ExecutionReport {
            log: run.lines,
            entries,
            pending: self.tracker.get(),
            simulated_debit,
            batched: false,
        }
    }

    /// Cancel or replace the tracked transaction
    ///
    /// With nothing tracked this returns `NothingPending` and touches nothing.
    pub async fn cancel_pending(&self, mode: ExecutionMode, auth: &AuthContext) -> ReplaceOutcome {
        let Some(record) = self.tracker.get() else {
            return ReplaceOutcome::NothingPending;
        };

        self.log.push(format!(
            "Replacement requested for {} ({} {})",
            shorten(&record.tx_ref, 18),
            record.amount,
            record.asset
        ));

        let outcome = self
            .tracker
            .cancel_or_replace(mode, auth.session(), self.ledger.as_ref())
            .await;

        match &outcome {
            ReplaceOutcome::Replaced {
                record,
                replacement_ref: Some(replacement),
            } => {
                self.log.push(format!(
                    "Transaction {} replaced by {}",
                    shorten(&record.tx_ref, 18),
                    replacement
                ));
            }
            ReplaceOutcome::Replaced { record, .. } => {
                self.log.push(format!(
                    "Simulated transaction {} replaced, {} {} returned to balance",
                    shorten(&record.tx_ref, 18),
                    record.amount,
                    record.asset
                ));
            }
            ReplaceOutcome::Failed(failure) => {
                self.log.push(failure.log_line());
            }
            ReplaceOutcome::NothingPending => {}
        }

        outcome
    }

    /// Batcher to use when every entry can ride one atomic call
    fn batch_target(&self, entries: &[TransferEntry], session: &dyn SignerSession) -> Option<Address> {
        let batcher = self.settings.batcher_address?;
        let chain = session.chain();
        let eligible = chain.is_evm()
            && entries
                .iter()
                .all(|e| e.asset() == Asset::Usdt && e.chain() == chain);
        eligible.then_some(batcher)
    }

    async fn execute_batch(
        &self,
        entries: &mut [TransferEntry],
        session: &dyn SignerSession,
        batcher: Address,
        run: &mut RunLog<'_>,
    ) {
        let token = self.settings.token_address;
        let chain = session.chain();
        run.note(format!(
            "Atomic batch path engaged: {} recipient(s) on {} via {:?}",
            entries.len(),
            chain.network_name(),
            batcher
        ));

        let decimals = self.token_decimals(session, token, run).await;

        let mut recipients = Vec::with_capacity(entries.len());
        let mut amounts = Vec::with_capacity(entries.len());
        for entry in entries.iter() {
            let prepared = parse_address(entry.destination())
                .and_then(|to| to_base_units(entry.amount(), decimals).map(|amount| (to, amount)));
            match prepared {
                Ok((to, amount)) => {
                    recipients.push(to);
                    amounts.push(amount);
                }
                Err(err) => return abort_batch(entries.len(), classify(&err), run),
            }
        }
        let (total, total_human) = match batch_totals(entries, &amounts) {
            Ok(totals) => totals,
            Err(err) => return abort_batch(entries.len(), classify(&err), run),
        };

        let allowance = match CallOutcome::from(session.allowance(token, session.address(), batcher).await)
        {
            CallOutcome::Success(allowance) => allowance,
            CallOutcome::Classified(failure) => return abort_batch(entries.len(), failure, run),
        };

        if allowance < total {
            run.note(format!(
                "Allowance {} below batch total {}, approval requested for exactly {} {}",
                allowance,
                total,
                total_human,
                Asset::Usdt
            ));
            let approval = match CallOutcome::from(session.send_approval(token, batcher, total).await) {
                CallOutcome::Success(hash) => hash,
                CallOutcome::Classified(failure) => return abort_batch(entries.len(), failure, run),
            };
            run.note(format!("Approval {:?} sent, waiting for finality", approval));
            if let CallOutcome::Classified(failure) =
                CallOutcome::from(session.wait_for_finality(approval).await)
            {
                return abort_batch(entries.len(), failure, run);
            }
            run.note("Approval finalized");
        } else {
            run.note(format!("Allowance {} covers batch total {}", allowance, total));
        }

        run.note(format!(
            "Submitting atomic batch broadcast: {} {} to {} recipient(s)",
            total_human,
            Asset::Usdt,
            recipients.len()
        ));
        let hash = match CallOutcome::from(
            session
                .send_batch_transfer(batcher, token, recipients, amounts)
                .await,
        ) {
            CallOutcome::Success(hash) => hash,
            CallOutcome::Classified(failure) => return abort_batch(entries.len(), failure, run),
        };

        let tx_ref = format_hash(hash);
        for entry in entries.iter_mut() {
            entry.record_broadcast(&tx_ref);
        }
        self.tracker.set(PendingTransactionRecord::new(
            &tx_ref,
            entries.iter().map(|e| e.id().to_string()).collect(),
            BATCH_DESTINATION,
            total_human,
            chain,
            Asset::Usdt,
            ExecutionMode::Real,
        ));
        run.note(format!("Batch transaction {} sent, waiting for finality", tx_ref));

        match CallOutcome::from(session.wait_for_finality(hash).await) {
            CallOutcome::Success(()) => {
                self.tracker.finalize(&tx_ref);
                for entry in entries.iter_mut() {
                    entry.mark_confirmed();
                }
                run.note(format!(
                    "Batch confirmed: {} transfer(s) settled in {}",
                    entries.len(),
                    shorten(&tx_ref, 18)
                ));
            }
            CallOutcome::Classified(failure) => {
                if failure.kind == ErrorKind::ContractReverted {
                    self.tracker.finalize(&tx_ref);
                }
                abort_batch(entries.len(), failure, run);
            }
        }
    }

    async fn execute_direct(
        &self,
        entry: &mut TransferEntry,
        session: &dyn SignerSession,
        run: &mut RunLog<'_>,
    ) {
        let token = self.settings.token_address;
        run.note(format!(
            "Direct transfer of {} {} to {} on {}",
            entry.amount(),
            entry.asset(),
            entry.short_destination(),
            entry.chain()
        ));

        let decimals = self.token_decimals(session, token, run).await;
        let prepared = parse_address(entry.destination())
            .and_then(|to| to_base_units(entry.amount(), decimals).map(|amount| (to, amount)));
        let (to, amount) = match prepared {
            Ok(prepared) => prepared,
            Err(err) => {
                run.note(classify(&err).log_line());
                return;
            }
        };

        let hash = match CallOutcome::from(session.send_transfer(token, to, amount).await) {
            CallOutcome::Success(hash) => hash,
            CallOutcome::Classified(failure) => {
                run.note(failure.log_line());
                return;
            }
        };

        let tx_ref = format_hash(hash);
        entry.record_broadcast(&tx_ref);
        self.tracker.set(PendingTransactionRecord::new(
            &tx_ref,
            vec![entry.id().to_string()],
            entry.destination(),
            entry.amount(),
            entry.chain(),
            entry.asset(),
            ExecutionMode::Real,
        ));
        run.note(format!("Transaction {} sent, waiting for finality", tx_ref));

        match CallOutcome::from(session.wait_for_finality(hash).await) {
            CallOutcome::Success(()) => {
                self.tracker.finalize(&tx_ref);
                entry.mark_confirmed();
                run.note(format!(
                    "Confirmed {} {} to {}",
                    entry.amount(),
                    entry.asset(),
                    entry.short_destination()
                ));
            }
            CallOutcome::Classified(failure) => {
                if failure.kind == ErrorKind::ContractReverted {
                    self.tracker.finalize(&tx_ref);
                }
                run.note(failure.log_line());
            }
        }
    }

    /// Dry-run one entry. Returns the amount debited from the ledger.
    async fn execute_simulated(&self, entry: &mut TransferEntry, run: &mut RunLog<'_>) -> Decimal {
        run.note(format!(
            "Building simulated payload: {} {} to {} on {}",
            entry.amount(),
            entry.asset(),
            entry.short_destination(),
            entry.chain()
        ));
        tokio::time::sleep(self.settings.build_delay).await;

        run.note(format!(
            "Relaying simulated payload through {}",
            entry.chain().network_name()
        ));
        tokio::time::sleep(self.settings.broadcast_delay).await;

        let tx_ref = synthesize_tx_ref();
        entry.record_broadcast(&tx_ref);
        entry.mark_confirmed();
        self.tracker.set(PendingTransactionRecord::new(
            &tx_ref,
            vec![entry.id().to_string()],
            entry.destination(),
            entry.amount(),
            entry.chain(),
            entry.asset(),
            ExecutionMode::Simulated,
        ));
        run.note(format!(
            "Simulated transfer complete, synthesized hash {}",
            shorten(&tx_ref, 24)
        ));

        if entry.asset().is_fungible_token() {
            self.ledger.decrement(entry.amount()).await;
            entry.amount()
        } else {
            Decimal::ZERO
        }
    }

    async fn token_decimals(&self, session: &dyn SignerSession, token: Address, run: &mut RunLog<'_>) -> u8 {
        match session.token_decimals(token).await {
            Ok(decimals) => decimals,
            Err(err) => {
                log::warn!("[Broadcast] decimals() failed for {:?}: {}", token, err);
                run.note(format!(
                    "Token decimals unavailable, assuming {}",
                    FALLBACK_TOKEN_DECIMALS
                ));
                FALLBACK_TOKEN_DECIMALS
            }
        }
    }
}

/// Entries the session can move with a real token call
fn has_direct_call(entry: &TransferEntry, session: &dyn SignerSession) -> bool {
    entry.asset().is_fungible_token() && entry.chain() == session.chain() && entry.chain().is_evm()
}

fn abort_batch(count: usize, failure: Classified, run: &mut RunLog<'_>) {
    run.note(failure.log_line());
    log::warn!(
        "[Broadcast] Atomic batch aborted, {} entr{} left pending",
        count,
        if count == 1 { "y" } else { "ies" }
    );
}

/// Batch total in base units and in token units; overflow aborts the batch
fn batch_totals(entries: &[TransferEntry], amounts: &[U256]) -> Result<(U256, Decimal), ChainError> {
    let overflow = || ChainError::new("batch total overflows the amount range");
    let total = amounts
        .iter()
        .try_fold(U256::zero(), |acc, amount| acc.checked_add(*amount))
        .ok_or_else(overflow)?;
    let total_human = entries
        .iter()
        .try_fold(Decimal::ZERO, |acc, e| acc.checked_add(e.amount()))
        .ok_or_else(overflow)?;
    Ok((total, total_human))
}

fn parse_address(raw: &str) -> Result<Address, ChainError> {
    Address::from_str(raw).map_err(|_| ChainError::new(format!("'{}' is not a hex address", raw)))
}

/// Human amount to base units at the token's precision
pub fn to_base_units(amount: Decimal, decimals: u8) -> Result<U256, ChainError> {
    parse_units(amount.normalize().to_string(), u32::from(decimals))
        .map(U256::from)
        .map_err(|e| ChainError::new(format!("cannot express {} with {} decimals: {}", amount, decimals, e)))
}

/// Full 0x-prefixed hex of a transaction hash
pub fn format_hash(hash: H256) -> String {
    format!("{:?}", hash)
}

/// Random 32-byte identifier in transaction hash form
pub fn synthesize_tx_ref() -> String {
    let bytes: [u8; 32] = rand::random();
    format!("0x{}", hex::encode(bytes))
}
