//! Core runtime for Folio notebooks.
//!
//! This crate provides:
//! - The plain-text notebook format (parse and serialize)
//! - The live document model with run states and staleness tracking
//! - A registry mapping cell types to pluggable handlers
//! - The runtime namespace shared by every cell of a notebook
//! - An actor-based execution engine with an ordered run queue

pub mod document;
pub mod error;
pub mod execute;
pub mod format;
pub mod handler;
pub mod output;
pub mod runtime;

pub use document::{
    Cell, CellContent, CellId, CellMetadata, DocumentModel, NotebookContent, Properties, RunState,
};
pub use error::{Error, Result};
pub use execute::{
    CancelReason, CellOutcome, EngineConfig, Notebook, NotebookBuilder, NotebookEvent,
    NotebookHandle, NotebookSnapshot, RunHandle, RunId, RunReport, RunTarget, SkipReason,
};
pub use format::{ParseAnomaly, ParsedDocument, parse, serialize};
pub use handler::{
    CellHandler, CellSnapshot, EditorKind, HandlerError, HandlerRegistry, HandlerResult,
    SyncHandler,
};
pub use output::{CellFailure, CellOutput, ConsoleEntry, ConsoleLevel, FailureKind};
pub use runtime::{AbortHandle, Libraries, RuntimeNamespace};
