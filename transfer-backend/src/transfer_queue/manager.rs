//! Transfer queue manager
//!
//! Ordered storage for validated transfers awaiting an execute trigger.

use parking_lot::Mutex;
use rust_decimal::Decimal;
use std::sync::Arc;

use super::types::TransferEntry;

/// Ordered queue of validated, not-yet-broadcast transfers
///
/// No size bound is enforced here; throttling belongs to the operator
/// surface.
pub struct TransferQueue {
    entries: Mutex<Vec<TransferEntry>>,
}

impl TransferQueue {
    /// Create an empty queue
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
        }
    }

    /// Append an entry to the end of the queue, returning its id
    pub fn append(&self, entry: TransferEntry) -> String {
        let id = entry.id().to_string();
        log::info!(
            "[TransferQueue] Queuing {} {} on {} to {} ({})",
            entry.amount(),
            entry.asset(),
            entry.chain(),
            entry.short_destination(),
            id
        );
        self.entries.lock().push(entry);
        id
    }

    /// Remove an entry by id. Unknown ids are a no-op.
    pub fn remove(&self, id: &str) -> Option<TransferEntry> {
        let mut entries = self.entries.lock();
        let position = entries.iter().position(|e| e.id() == id)?;
        let removed = entries.remove(position);
        log::info!("[TransferQueue] Removed {}", id);
        Some(removed)
    }

    /// Take the full ordered contents, leaving the queue empty
    ///
    /// Entries appended after this returns belong to the next execution.
    pub fn drain_all(&self) -> Vec<TransferEntry> {
        let drained = std::mem::take(&mut *self.entries.lock());
        if !drained.is_empty() {
            log::info!("[TransferQueue] Drained {} entries for broadcast", drained.len());
        }
        drained
    }

    /// Snapshot of the queue in order, without draining it
    pub fn list(&self) -> Vec<TransferEntry> {
        self.entries.lock().clone()
    }

    /// Sum of all queued amounts, saturating at `Decimal::MAX`
    pub fn total_amount(&self) -> Decimal {
        self.entries
            .lock()
            .iter()
            .fold(Decimal::ZERO, |acc, e| acc.saturating_add(e.amount()))
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl Default for TransferQueue {
    fn default() -> Self {
        Self::new()
    }
}

/// Create an Arc-wrapped TransferQueue for sharing across tasks
pub fn create_transfer_queue() -> Arc<TransferQueue> {
    Arc::new(TransferQueue::new())
}
