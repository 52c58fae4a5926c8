//! Events broadcast by a notebook instance.

use serde::{Deserialize, Serialize};

use super::{QueueSummary, RunReport};
use crate::document::{CellId, RunState};
use crate::output::CellOutput;

/// State change notification.
///
/// Subscribers that fall behind miss events; a fresh
/// [`snapshot`](super::NotebookHandle::snapshot) resynchronizes them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NotebookEvent {
    CellStateChanged { cell_id: CellId, state: RunState },
    CellOutputUpdated { cell_id: CellId, output: Option<CellOutput> },
    DocumentChanged { version: u64 },
    QueueStateChanged { summary: QueueSummary },
    RunFinished { report: RunReport },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_tagging() {
        let event = NotebookEvent::CellStateChanged {
            cell_id: CellId::new(2),
            state: RunState::Running,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "cell_state_changed");
        assert_eq!(json["state"], "running");

        let back: NotebookEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back, event);
    }

    #[test]
    fn test_queue_event_carries_counts() {
        let event = NotebookEvent::QueueStateChanged {
            summary: QueueSummary {
                executing: Some(CellId::new(1)),
                pending: 12,
                ..QueueSummary::default()
            },
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "queue_state_changed");
        assert_eq!(json["summary"]["pending"], 12);
        assert_eq!(json["summary"]["status"], "idle");
    }
}
