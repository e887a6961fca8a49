//! Per-session record of what happened to every submitted document.

use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};

use crate::domain::{BulkItemResult, BulkResponse};
use crate::error::{IndexError, JoinedError};

use super::IndexSummary;

#[derive(Debug, Default)]
struct LedgerState {
    submitted: usize,
    accepted: usize,
    errors: Vec<IndexError>,
    /// Chunks dispatched but not yet settled, by sequence number.
    in_flight: HashMap<u64, usize>,
}

/// Shared between the session and its workers. Each dispatched chunk is
/// settled exactly once; a settle for a chunk that was already expired is
/// ignored.
#[derive(Debug, Default)]
pub(crate) struct OutcomeLedger {
    state: Mutex<LedgerState>,
}

impl OutcomeLedger {
    pub fn register(&self, seq: u64, documents: usize) {
        let mut state = self.state.lock();
        state.submitted += documents;
        state.in_flight.insert(seq, documents);
    }

    pub fn record_failure(&self, error: IndexError) {
        self.state.lock().errors.push(error);
    }

    /// Settle a chunk from the backend's per-item results.
    pub fn settle_response(&self, seq: u64, ids: &[String], response: &BulkResponse) {
        let mut state = self.state.lock();
        if state.in_flight.remove(&seq).is_none() {
            return;
        }

        for (id, outcome) in ids.iter().zip(reconcile(ids, &response.items)) {
            match outcome {
                Some(item) if item.is_success() => state.accepted += 1,
                Some(item) => {
                    let (kind, reason) = item
                        .error
                        .as_ref()
                        .map(|e| (e.kind.clone(), e.reason.clone()))
                        .unwrap_or_else(|| {
                            ("unexpected_status".to_string(), format!("status {}", item.status))
                        });
                    state.errors.push(IndexError::DocumentRejected {
                        id: id.clone(),
                        status: item.status,
                        kind,
                        reason,
                    });
                }
                None => state.errors.push(IndexError::DocumentRejected {
                    id: id.clone(),
                    status: 0,
                    kind: "missing_item".to_string(),
                    reason: "document missing from bulk response".to_string(),
                }),
            }
        }
    }

    /// Settle a chunk whose request failed as a whole.
    pub fn settle_transport(&self, seq: u64, reason: String) {
        let mut state = self.state.lock();
        if let Some(documents) = state.in_flight.remove(&seq) {
            state.errors.push(IndexError::Transport { documents, reason });
        }
    }

    /// Fail every unsettled chunk as timed out. Returns the number of
    /// documents affected.
    pub fn expire_in_flight(&self) -> usize {
        let mut state = self.state.lock();
        let documents: usize = state.in_flight.drain().map(|(_, n)| n).sum();
        if documents > 0 {
            state.errors.push(IndexError::Timeout { documents });
        }
        documents
    }

    /// Fail every unsettled chunk as a transport failure.
    pub fn fail_in_flight(&self, reason: &str) {
        let mut state = self.state.lock();
        let documents: usize = state.in_flight.drain().map(|(_, n)| n).sum();
        if documents > 0 {
            state.errors.push(IndexError::Transport {
                documents,
                reason: reason.to_string(),
            });
        }
    }

    pub fn summary(&self) -> IndexSummary {
        let state = self.state.lock();
        IndexSummary {
            submitted: state.submitted,
            accepted: state.accepted,
            failed: state.errors.iter().map(IndexError::documents).sum(),
        }
    }

    pub fn joined_error(&self) -> Result<(), JoinedError> {
        match JoinedError::from_errors(self.state.lock().errors.clone()) {
            Some(joined) => Err(joined),
            None => Ok(()),
        }
    }
}

/// Match response items to submitted ids: by `_id` first, then by position.
/// The result has one slot per id; `None` means no item was found.
fn reconcile<'a>(ids: &[String], items: &'a [BulkItemResult]) -> Vec<Option<&'a BulkItemResult>> {
    let mut slots: Vec<Option<&BulkItemResult>> = vec![None; ids.len()];

    let mut positions: HashMap<&str, VecDeque<usize>> = HashMap::new();
    for (pos, id) in ids.iter().enumerate() {
        positions.entry(id.as_str()).or_default().push_back(pos);
    }

    let mut unmatched = Vec::new();
    for (pos, item) in items.iter().enumerate() {
        let slot = item
            .id
            .as_deref()
            .and_then(|id| positions.get_mut(id))
            .and_then(VecDeque::pop_front);
        match slot {
            Some(slot) => slots[slot] = Some(item),
            None => unmatched.push((pos, item)),
        }
    }

    for (pos, item) in unmatched {
        if let Some(slot) = slots.get_mut(pos) {
            if slot.is_none() {
                *slot = Some(item);
            }
        }
    }

    slots
}
