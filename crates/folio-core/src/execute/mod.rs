//! Execution engine for notebook instances.
//!
//! # Architecture
//!
//! ```text
//! NotebookHandle ──Command──▶ ┌─────────────── Engine task ───────────────┐
//!   (cloneable)   (mpsc)      │ DocumentModel   RunQueue   RuntimeNamespace │
//!        ▲                    │        │            │             │         │
//!        │ oneshot reply      │        └── dispatch ┴── moved into ┘         │
//!        └────────────────────│               in-flight handler call        │
//!                             └──────────────────────┬──────────────────────┘
//!                                                    │ broadcast
//!                                                    ▼
//!                                              NotebookEvent
//! ```
//!
//! Run requests are queued in document order at request time and executed one
//! at a time. Edits, cancellation and new requests are handled while a cell is
//! running; they never interleave with a handler call.

mod engine;
mod events;
mod handle;
mod queue;
mod report;

pub use engine::{CONTINUE_ON_ERROR_KEY, RUN_ON_LOAD_KEY};
pub use events::NotebookEvent;
pub use handle::{
    CellView, EngineConfig, Notebook, NotebookBuilder, NotebookHandle, NotebookSnapshot,
    RunHandle, RunTarget,
};
pub use queue::{QueueEntry, QueueState, QueueStatus, QueueSummary, RunQueue};
pub use report::{CancelReason, CellOutcome, CellReport, RunId, RunReport, SkipReason};
