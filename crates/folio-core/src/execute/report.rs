//! Per-request run reports.

use serde::{Deserialize, Serialize};

use crate::document::CellId;
use crate::output::CellFailure;

/// Identifier of one run request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RunId(pub(crate) u64);

impl RunId {
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "run_{}", self.0)
    }
}

/// Why a queued entry was dropped without calling its handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// The cell was removed from the document.
    Removed,
    /// The cell was edited while queued; a fresh entry in the same run
    /// carries the new content.
    Superseded,
}

/// Why a queued entry was cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CancelReason {
    /// `cancel()` was called.
    Requested,
    /// An earlier cell failed with continue-on-error off.
    HaltedOnError(CellId),
}

/// What happened to one target of a run request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", content = "detail", rename_all = "snake_case")]
pub enum CellOutcome {
    Done,
    Error(CellFailure),
    Skipped(SkipReason),
    Cancelled(CancelReason),
    /// The cell was already queued or running; that run covers this request.
    Coalesced,
}

impl CellOutcome {
    pub fn is_done(&self) -> bool {
        matches!(self, CellOutcome::Done)
    }

    pub fn is_superseded(&self) -> bool {
        matches!(self, CellOutcome::Skipped(SkipReason::Superseded))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellReport {
    pub cell_id: CellId,
    pub outcome: CellOutcome,
}

/// Outcome of every target of one run request, in settle order.
///
/// A cell edited while queued appears twice: once as superseded, then with
/// the outcome of its requeued entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: RunId,
    pub outcomes: Vec<CellReport>,
}

impl RunReport {
    pub fn new(run_id: RunId) -> Self {
        Self {
            run_id,
            outcomes: Vec::new(),
        }
    }

    /// Final outcome of `cell_id`.
    pub fn outcome(&self, cell_id: CellId) -> Option<&CellOutcome> {
        self.outcomes
            .iter()
            .rev()
            .find(|r| r.cell_id == cell_id)
            .map(|r| &r.outcome)
    }

    /// Whether every target finished successfully.
    pub fn all_done(&self) -> bool {
        self.outcomes
            .iter()
            .all(|r| r.outcome.is_done() || r.outcome.is_superseded())
    }

    pub fn failures(&self) -> impl Iterator<Item = (CellId, &CellFailure)> {
        self.outcomes.iter().filter_map(|r| match &r.outcome {
            CellOutcome::Error(failure) => Some((r.cell_id, failure)),
            _ => None,
        })
    }

    pub(crate) fn push(&mut self, cell_id: CellId, outcome: CellOutcome) {
        self.outcomes.push(CellReport { cell_id, outcome });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_queries() {
        let mut report = RunReport::new(RunId(3));
        report.push(CellId::new(0), CellOutcome::Done);
        report.push(CellId::new(1), CellOutcome::Error(CellFailure::handler("bad")));
        report.push(
            CellId::new(2),
            CellOutcome::Cancelled(CancelReason::HaltedOnError(CellId::new(1))),
        );

        assert!(!report.all_done());
        assert_eq!(report.outcome(CellId::new(0)), Some(&CellOutcome::Done));
        let failures: Vec<CellId> = report.failures().map(|(id, _)| id).collect();
        assert_eq!(failures, vec![CellId::new(1)]);
    }

    #[test]
    fn test_superseded_entry_yields_to_requeued_outcome() {
        let mut report = RunReport::new(RunId(1));
        report.push(CellId::new(0), CellOutcome::Skipped(SkipReason::Superseded));
        report.push(CellId::new(1), CellOutcome::Done);
        report.push(CellId::new(0), CellOutcome::Done);

        assert!(report.all_done());
        assert_eq!(report.outcome(CellId::new(0)), Some(&CellOutcome::Done));
    }

    #[test]
    fn test_outcome_serialization() {
        let json = serde_json::to_value(CellOutcome::Skipped(SkipReason::Removed)).unwrap();
        assert_eq!(json["outcome"], "skipped");
        assert_eq!(json["detail"], "removed");
        assert_eq!(RunId(4).to_string(), "run_4");
    }
}
