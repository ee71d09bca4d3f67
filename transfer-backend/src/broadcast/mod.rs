//! Broadcast Subsystem
//!
//! Executes drained queue snapshots and tracks what they emitted.
//!
//! ## Flow
//! 1. `BroadcastEngine::execute` picks the batch, per-entry or simulated path
//! 2. Chain failures are mapped onto `ErrorKind` by `classify`, one log line each
//! 3. The last emitted transaction sits in `PendingTxTracker` until it settles
//!    or the operator replaces it with `cancel_pending`

mod classifier;
mod engine;
mod ledger;
mod oplog;
mod tracker;


pub use classifier::{Classified, ErrorKind};
pub use engine::{BroadcastEngine, EngineSettings, ExecutionReport};
pub use ledger::{BalanceLedger, InMemoryLedger};
pub use oplog::{BroadcastLog, DEFAULT_LOG_CAPACITY};
pub use tracker::{PendingTransactionRecord, PendingTxTracker, ReplaceOutcome};
