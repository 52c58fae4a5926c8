//! The notebook actor.
//!
//! One task owns the document model, the run queue and the runtime namespace.
//! Handles talk to it through [`Command`]s; it answers on oneshot channels and
//! broadcasts [`NotebookEvent`]s.
//!
//! While a handler call is in flight the namespace lives inside the in-flight
//! future and comes back when the call settles. Dispatch only happens when the
//! namespace is home, which is what keeps one call in flight at a time.

use std::sync::Arc;

use futures::future::BoxFuture;
use rustc_hash::FxHashMap;
use serde_json::Value;
use tokio::sync::{broadcast, mpsc, oneshot};
use uuid::Uuid;

use super::queue::{QueueEntry, RunQueue};
use super::{
    CancelReason, CellOutcome, CellView, EngineConfig, NotebookEvent, NotebookSnapshot, RunId,
    RunReport, RunTarget, SkipReason,
};
use crate::document::{CellId, DocumentModel, RunState, is_truthy};
use crate::error::{Error, Result};
use crate::handler::{CellSnapshot, HandlerRegistry, HandlerResult};
use crate::output::{CellFailure, CellOutput};
use crate::runtime::{AbortHandle, RuntimeNamespace};

/// Notebook metadata key overriding [`EngineConfig::continue_on_error`].
pub const CONTINUE_ON_ERROR_KEY: &str = "continue_on_error";

/// Notebook metadata key (or cell property) requesting a run on open.
pub const RUN_ON_LOAD_KEY: &str = "run_on_load";

type Reply<T> = oneshot::Sender<T>;

/// Accepted run request: its id and where the report will arrive.
pub(crate) type RunTicket = (RunId, oneshot::Receiver<RunReport>);

pub(crate) enum Command {
    InsertCell {
        index: usize,
        cell_type: String,
        content: String,
        reply: Reply<Result<CellId>>,
    },
    RemoveCell {
        id: CellId,
        reply: Reply<Result<()>>,
    },
    MoveCell {
        id: CellId,
        index: usize,
        reply: Reply<Result<()>>,
    },
    UpdateContent {
        id: CellId,
        text: String,
        reply: Reply<Result<()>>,
    },
    SetProperty {
        id: CellId,
        key: String,
        value: Value,
        reply: Reply<Result<()>>,
    },
    SetCellType {
        id: CellId,
        cell_type: String,
        reply: Reply<Result<()>>,
    },
    SetMetadata {
        key: String,
        value: Value,
        reply: Reply<()>,
    },
    ClearOutputs {
        reply: Reply<usize>,
    },
    MarkSaved {
        reply: Reply<u64>,
    },
    Run {
        target: RunTarget,
        reply: Reply<Result<RunTicket>>,
    },
    Cancel {
        reply: Reply<usize>,
    },
    Snapshot {
        reply: Reply<NotebookSnapshot>,
    },
    Shutdown {
        reply: Reply<()>,
    },
}

type InFlight = BoxFuture<'static, (RuntimeNamespace, HandlerResult)>;

enum Step {
    Command(Option<Command>),
    Settled(RuntimeNamespace, HandlerResult),
}

/// A run request with targets still outstanding.
struct PendingRun {
    outstanding: usize,
    report: RunReport,
    reply: Reply<RunReport>,
}

pub(crate) struct Engine {
    instance_id: Uuid,
    model: DocumentModel,
    queue: RunQueue,
    /// `None` while a handler call holds it.
    namespace: Option<RuntimeNamespace>,
    registry: Arc<HandlerRegistry>,
    config: EngineConfig,
    events: broadcast::Sender<NotebookEvent>,
    runs: FxHashMap<RunId, PendingRun>,
    next_run: u64,
    /// Abort handle of the cell in flight.
    running_abort: Option<AbortHandle>,
}

impl Engine {
    pub(crate) fn new(
        instance_id: Uuid,
        model: DocumentModel,
        namespace: RuntimeNamespace,
        registry: Arc<HandlerRegistry>,
        config: EngineConfig,
        events: broadcast::Sender<NotebookEvent>,
    ) -> Self {
        Self {
            instance_id,
            model,
            queue: RunQueue::new(),
            namespace: Some(namespace),
            registry,
            config,
            events,
            runs: FxHashMap::default(),
            next_run: 0,
            running_abort: None,
        }
    }

    /// Main loop. Returns on shutdown or when every handle is dropped.
    pub(crate) async fn run(mut self, mut commands: mpsc::Receiver<Command>) {
        tracing::debug!("Notebook {} started", self.instance_id);
        let mut in_flight: Option<InFlight> = None;

        loop {
            if in_flight.is_none() {
                in_flight = self.dispatch_next();
            }

            let step = match in_flight.as_mut() {
                Some(call) => tokio::select! {
                    biased;
                    (namespace, result) = call => Step::Settled(namespace, result),
                    command = commands.recv() => Step::Command(command),
                },
                None => Step::Command(commands.recv().await),
            };

            match step {
                Step::Settled(namespace, result) => {
                    in_flight = None;
                    self.settle(namespace, result);
                }
                Step::Command(Some(command)) => {
                    if !self.handle(command) {
                        break;
                    }
                }
                Step::Command(None) => break,
            }
        }

        if !self.runs.is_empty() {
            tracing::debug!(
                "Notebook {} dropping {} unfinished runs",
                self.instance_id,
                self.runs.len()
            );
        }
        tracing::debug!("Notebook {} stopped", self.instance_id);
    }

    /// Apply one command. Returns false on shutdown.
    fn handle(&mut self, command: Command) -> bool {
        match command {
            Command::InsertCell {
                index,
                cell_type,
                content,
                reply,
            } => {
                let result = self.model.insert_cell(index, cell_type, content);
                if let Ok(id) = result {
                    self.emit(NotebookEvent::CellStateChanged {
                        cell_id: id,
                        state: RunState::Idle,
                    });
                    self.emit_document_changed();
                }
                let _ = reply.send(result);
            }
            Command::RemoveCell { id, reply } => {
                let result = self.model.remove_cell(id).map(|_| {
                    tracing::debug!("Removed {}", id);
                });
                if result.is_ok() {
                    self.emit_document_changed();
                }
                let _ = reply.send(result);
            }
            Command::MoveCell { id, index, reply } => {
                let result = self.model.move_cell(id, index);
                if result.is_ok() {
                    self.emit_document_changed();
                }
                let _ = reply.send(result);
            }
            Command::UpdateContent { id, text, reply } => {
                let result = self.edit_cell(id, |model| model.update_cell_content(id, text));
                let _ = reply.send(result);
            }
            Command::SetProperty {
                id,
                key,
                value,
                reply,
            } => {
                let result = self.edit_cell(id, |model| model.set_property(id, key, value));
                let _ = reply.send(result);
            }
            Command::SetCellType {
                id,
                cell_type,
                reply,
            } => {
                let result = self.edit_cell(id, |model| model.set_cell_type(id, cell_type));
                let _ = reply.send(result);
            }
            Command::SetMetadata { key, value, reply } => {
                self.model.set_metadata(key, value);
                self.emit_document_changed();
                let _ = reply.send(());
            }
            Command::ClearOutputs { reply } => {
                let cleared = self.model.clear_outputs();
                for &cell_id in &cleared {
                    self.emit(NotebookEvent::CellOutputUpdated {
                        cell_id,
                        output: None,
                    });
                    self.emit(NotebookEvent::CellStateChanged {
                        cell_id,
                        state: RunState::Idle,
                    });
                }
                let _ = reply.send(cleared.len());
            }
            Command::MarkSaved { reply } => {
                self.model.mark_saved();
                let _ = reply.send(self.model.version());
            }
            Command::Run { target, reply } => {
                let _ = reply.send(self.enqueue(target));
            }
            Command::Cancel { reply } => {
                let _ = reply.send(self.cancel());
            }
            Command::Snapshot { reply } => {
                let _ = reply.send(self.snapshot());
            }
            Command::Shutdown { reply } => {
                tracing::info!("Shutting down notebook {}", self.instance_id);
                if let Some(abort) = &self.running_abort {
                    abort.abort();
                }
                let _ = reply.send(());
                return false;
            }
        }
        true
    }

    // =========================================================================
    // Run requests
    // =========================================================================

    /// Queue the cells named by `target`.
    ///
    /// Targets already queued or running are reported as coalesced.
    pub(crate) fn enqueue(&mut self, target: RunTarget) -> Result<RunTicket> {
        let ids = self.resolve_target(target)?;

        let run_id = RunId(self.next_run);
        self.next_run += 1;
        let (reply, receiver) = oneshot::channel();
        let mut run = PendingRun {
            outstanding: 0,
            report: RunReport::new(run_id),
            reply,
        };

        for id in ids {
            let pending = self.model.state(id).is_some_and(RunState::is_pending);
            if pending || self.queue.contains(id) {
                tracing::debug!("Coalescing {} into its pending run", id);
                run.report.push(id, CellOutcome::Coalesced);
                continue;
            }
            if self.model.mark_queued(id).is_err() {
                continue;
            }
            self.queue.enqueue(id, run_id);
            run.outstanding += 1;
            self.emit(NotebookEvent::CellStateChanged {
                cell_id: id,
                state: RunState::Queued,
            });
        }

        tracing::info!(
            "Notebook {}: {} queued {} cells",
            self.instance_id,
            run_id,
            run.outstanding
        );

        if run.outstanding == 0 {
            self.finish_report(run);
        } else {
            self.runs.insert(run_id, run);
        }
        self.emit_queue_state();
        Ok((run_id, receiver))
    }

    /// Cells of `target` in document order.
    fn resolve_target(&self, target: RunTarget) -> Result<Vec<CellId>> {
        match target {
            RunTarget::All => Ok(self.model.cell_ids()),
            RunTarget::Cell(id) => {
                if self.model.contains(id) {
                    Ok(vec![id])
                } else {
                    Err(Error::CellNotFound(id))
                }
            }
            RunTarget::Cells(ids) => {
                let mut positioned = Vec::with_capacity(ids.len());
                for id in ids {
                    let position = self.model.position(id).ok_or(Error::CellNotFound(id))?;
                    positioned.push((position, id));
                }
                positioned.sort_unstable();
                positioned.dedup();
                Ok(positioned.into_iter().map(|(_, id)| id).collect())
            }
        }
    }

    /// Drop every queued entry and trip the running cell's abort handle.
    ///
    /// Returns the number of entries cancelled.
    fn cancel(&mut self) -> usize {
        let drained = self.queue.drain_pending();
        let count = drained.len();
        for entry in drained {
            self.cancel_entry(entry, CancelReason::Requested);
        }
        if let Some(abort) = &self.running_abort {
            tracing::info!("Aborting running cell in notebook {}", self.instance_id);
            abort.abort();
        }
        self.emit_queue_state();
        count
    }

    fn cancel_entry(&mut self, entry: QueueEntry, reason: CancelReason) {
        let id = entry.cell_id;
        let outcome = if self.model.contains(id) {
            if let Some(state) = self.model.unqueue(id) {
                self.emit(NotebookEvent::CellStateChanged { cell_id: id, state });
            }
            CellOutcome::Cancelled(reason)
        } else {
            CellOutcome::Skipped(SkipReason::Removed)
        };
        self.record(entry.run_id, id, outcome);
    }

    // =========================================================================
    // Dispatch and settle
    // =========================================================================

    /// Start the next entry, skipping cells removed while queued.
    fn dispatch_next(&mut self) -> Option<InFlight> {
        loop {
            if self.namespace.is_none() {
                return None;
            }
            let entry = self.queue.dequeue()?;
            let id = entry.cell_id;

            let cell = self.model.cell(id).map(|c| {
                (
                    c.cell_type().to_string(),
                    c.content().to_string(),
                    c.properties().clone(),
                )
            });
            let Some((cell_type, content, inline)) = cell else {
                tracing::debug!("Skipping removed {}", id);
                self.queue.complete(id);
                self.record(entry.run_id, id, CellOutcome::Skipped(SkipReason::Removed));
                self.emit_queue_state();
                continue;
            };

            if self.model.mark_running(id).is_err() {
                self.queue.complete(id);
                continue;
            }
            self.emit(NotebookEvent::CellStateChanged {
                cell_id: id,
                state: RunState::Running,
            });
            self.emit_queue_state();

            let Some(handler) = self.registry.resolve(&cell_type) else {
                tracing::warn!("No handler registered for cell type '{}'", cell_type);
                self.queue.complete(id);
                let failure = CellFailure::unknown_cell_type(&cell_type);
                self.finish_entry(entry, CellOutput::failed(failure));
                continue;
            };

            let mut namespace = self.namespace.take()?;

            let abort = AbortHandle::new();
            namespace.begin_cell(id, abort.clone());
            self.running_abort = Some(abort);

            let snapshot = CellSnapshot {
                id,
                properties: inline.overlay(&handler.default_properties()),
                cell_type,
                content,
            };
            tracing::debug!("Running {} ({})", id, snapshot.cell_type);

            return Some(Box::pin(async move {
                let result = handler.run(&snapshot, &mut namespace).await;
                (namespace, result)
            }));
        }
    }

    /// Take the namespace back from a finished call and record its result.
    fn settle(&mut self, mut namespace: RuntimeNamespace, result: HandlerResult) {
        let console = namespace.finish_cell();
        self.namespace = Some(namespace);
        self.running_abort = None;

        let Some(entry) = self.queue.executing() else {
            return;
        };
        self.queue.complete(entry.cell_id);

        let mut output = match result {
            Ok(output) => output,
            Err(err) => {
                tracing::debug!("{} failed: {}", entry.cell_id, err);
                CellOutput::failed(CellFailure::handler(err.message))
            }
        };
        if !console.is_empty() {
            let mut merged = console;
            merged.append(&mut output.console);
            output.console = merged;
        }
        self.finish_entry(entry, output);
    }

    /// Store the output of a finished entry, report it and apply the
    /// continue-on-error policy.
    fn finish_entry(&mut self, entry: QueueEntry, output: CellOutput) {
        let id = entry.cell_id;
        let outcome = match &output.failure {
            Some(failure) => CellOutcome::Error(failure.clone()),
            None => CellOutcome::Done,
        };

        if self.model.contains(id) {
            if let Ok(state) = self.model.finish_run(id, output.clone()) {
                self.emit(NotebookEvent::CellOutputUpdated {
                    cell_id: id,
                    output: Some(output),
                });
                self.emit(NotebookEvent::CellStateChanged { cell_id: id, state });
            }
        }

        let failed = matches!(outcome, CellOutcome::Error(_));
        self.record(entry.run_id, id, outcome);

        if failed && !self.continue_on_error() {
            let drained = self.queue.drain_pending();
            if !drained.is_empty() {
                tracing::info!(
                    "{} failed; cancelling {} queued cells",
                    id,
                    drained.len()
                );
            }
            for entry in drained {
                self.cancel_entry(entry, CancelReason::HaltedOnError(id));
            }
        }
        self.emit_queue_state();
    }

    fn continue_on_error(&self) -> bool {
        match self.model.metadata().get(CONTINUE_ON_ERROR_KEY) {
            Some(value) => is_truthy(value),
            None => self.config.continue_on_error,
        }
    }

    // =========================================================================
    // Reports and events
    // =========================================================================

    fn record(&mut self, run_id: RunId, cell_id: CellId, outcome: CellOutcome) {
        let Some(run) = self.runs.get_mut(&run_id) else {
            return;
        };
        run.report.push(cell_id, outcome);
        run.outstanding = run.outstanding.saturating_sub(1);
        if run.outstanding == 0 {
            if let Some(run) = self.runs.remove(&run_id) {
                self.finish_report(run);
            }
        }
    }

    fn finish_report(&self, run: PendingRun) {
        tracing::info!(
            "Notebook {}: {} finished ({} targets)",
            self.instance_id,
            run.report.run_id,
            run.report.outcomes.len()
        );
        self.emit(NotebookEvent::RunFinished {
            report: run.report.clone(),
        });
        let _ = run.reply.send(run.report);
    }

    /// Apply an edit and keep the queue consistent with it.
    ///
    /// A queued cell's entry is reported as superseded and replaced by a fresh
    /// entry in the same slot, so the new content runs in its original turn.
    fn edit_cell(
        &mut self,
        id: CellId,
        edit: impl FnOnce(&mut DocumentModel) -> Result<()>,
    ) -> Result<()> {
        let before = self.model.state(id);
        edit(&mut self.model)?;

        if before == Some(RunState::Queued) {
            if let Some(old) = self.queue.supersede(id) {
                tracing::debug!("Requeued edited {}", id);
                // The fresh entry settles separately in the same run.
                if let Some(run) = self.runs.get_mut(&old.run_id) {
                    run.outstanding += 1;
                }
                self.record(old.run_id, id, CellOutcome::Skipped(SkipReason::Superseded));
            }
        }
        let after = self.model.state(id);
        if after != before {
            if let Some(state) = after {
                self.emit(NotebookEvent::CellStateChanged { cell_id: id, state });
            }
        }
        self.emit_document_changed();
        Ok(())
    }

    pub(crate) fn snapshot(&self) -> NotebookSnapshot {
        NotebookSnapshot {
            version: self.model.version(),
            dirty: self.model.is_dirty(),
            content: self.model.to_content(),
            cells: self
                .model
                .cells()
                .iter()
                .map(|cell| CellView {
                    id: cell.id(),
                    cell_type: cell.cell_type().to_string(),
                    content: cell.content().to_string(),
                    properties: cell.properties().clone(),
                    state: cell.state(),
                    output: cell.output().cloned(),
                })
                .collect(),
            queue: self.queue.state(),
        }
    }

    /// Cells to run when the notebook is opened.
    pub(crate) fn run_on_load_target(&self) -> Option<RunTarget> {
        if self.model.metadata().is_set(RUN_ON_LOAD_KEY) {
            return Some(RunTarget::All);
        }
        let ids: Vec<CellId> = self
            .model
            .cells()
            .iter()
            .filter(|cell| {
                let defaults = self
                    .registry
                    .resolve(cell.cell_type())
                    .map(|h| h.default_properties())
                    .unwrap_or_default();
                cell.properties().overlay(&defaults).is_set(RUN_ON_LOAD_KEY)
            })
            .map(|cell| cell.id())
            .collect();
        (!ids.is_empty()).then_some(RunTarget::Cells(ids))
    }

    fn emit_document_changed(&self) {
        self.emit(NotebookEvent::DocumentChanged {
            version: self.model.version(),
        });
    }

    fn emit_queue_state(&self) {
        self.emit(NotebookEvent::QueueStateChanged {
            summary: self.queue.summary(),
        });
    }

    fn emit(&self, event: NotebookEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}
