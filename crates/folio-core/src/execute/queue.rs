//! FIFO run queue with per-entry tickets.

use std::collections::VecDeque;

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use super::RunId;
use crate::document::CellId;

/// One queued run of a cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueEntry {
    pub cell_id: CellId,
    pub run_id: RunId,
    ticket: u64,
}

/// Whether the queue has work.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueStatus {
    #[default]
    Idle,
    Draining,
}

/// Queue counters carried by [`QueueStateChanged`](super::NotebookEvent::QueueStateChanged).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueSummary {
    pub status: QueueStatus,
    /// Cell whose handler is in flight.
    pub executing: Option<CellId>,
    /// Number of pending entries.
    pub pending: usize,
}

/// Serializable view of the queue.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueState {
    pub status: QueueStatus,
    /// Cell whose handler is in flight.
    pub executing: Option<CellId>,
    /// Pending entries in dispatch order.
    pub pending: Vec<CellId>,
}

/// The run queue. Owned by the engine actor.
///
/// Each cell has at most one pending entry. Superseding a cell swaps in an
/// entry with a fresh ticket, keeping its slot.
#[derive(Debug, Default)]
pub struct RunQueue {
    pending: VecDeque<QueueEntry>,
    executing: Option<QueueEntry>,
    live: FxHashMap<CellId, u64>,
    next_ticket: u64,
}

impl RunQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a run of `cell_id`.
    pub fn enqueue(&mut self, cell_id: CellId, run_id: RunId) {
        let entry = self.issue(cell_id, run_id);
        self.pending.push_back(entry);
    }

    /// Replace the pending entry of `cell_id` with a fresh one in the same slot.
    ///
    /// Returns the replaced entry, or `None` when the cell has no pending entry.
    pub fn supersede(&mut self, cell_id: CellId) -> Option<QueueEntry> {
        let position = self.live_position(cell_id)?;
        let old = self.pending[position];
        self.pending[position] = self.issue(cell_id, old.run_id);
        Some(old)
    }

    /// Pop the next entry and mark it executing.
    pub fn dequeue(&mut self) -> Option<QueueEntry> {
        if self.executing.is_some() {
            return None;
        }
        let entry = self.pending.pop_front()?;
        self.live.remove(&entry.cell_id);
        self.executing = Some(entry);
        Some(entry)
    }

    /// Mark the executing entry as settled.
    pub fn complete(&mut self, cell_id: CellId) -> Option<QueueEntry> {
        if self.executing.is_some_and(|e| e.cell_id == cell_id) {
            self.executing.take()
        } else {
            None
        }
    }

    /// Remove every pending entry, returning them in order.
    pub fn drain_pending(&mut self) -> Vec<QueueEntry> {
        self.live.clear();
        self.pending.drain(..).collect()
    }

    /// Whether `cell_id` has a pending entry or is executing.
    pub fn contains(&self, cell_id: CellId) -> bool {
        self.live.contains_key(&cell_id) || self.executing.is_some_and(|e| e.cell_id == cell_id)
    }

    pub fn executing(&self) -> Option<QueueEntry> {
        self.executing
    }

    pub fn is_draining(&self) -> bool {
        self.executing.is_some() || !self.pending.is_empty()
    }

    fn status(&self) -> QueueStatus {
        if self.is_draining() {
            QueueStatus::Draining
        } else {
            QueueStatus::Idle
        }
    }

    /// Status and counts, without listing the pending cells.
    pub fn summary(&self) -> QueueSummary {
        QueueSummary {
            status: self.status(),
            executing: self.executing.map(|e| e.cell_id),
            pending: self.pending.len(),
        }
    }

    pub fn state(&self) -> QueueState {
        QueueState {
            status: self.status(),
            executing: self.executing.map(|e| e.cell_id),
            pending: self.pending.iter().map(|e| e.cell_id).collect(),
        }
    }

    fn issue(&mut self, cell_id: CellId, run_id: RunId) -> QueueEntry {
        let ticket = self.next_ticket;
        self.next_ticket += 1;
        self.live.insert(cell_id, ticket);
        QueueEntry {
            cell_id,
            run_id,
            ticket,
        }
    }

    fn live_position(&self, cell_id: CellId) -> Option<usize> {
        let ticket = self.live.get(&cell_id)?;
        self.pending
            .iter()
            .position(|e| e.cell_id == cell_id && e.ticket == *ticket)
    }
}
