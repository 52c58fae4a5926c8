//! Client side of a notebook instance.

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tokio::sync::{broadcast, mpsc, oneshot};
use uuid::Uuid;

use super::engine::{Command, Engine};
use super::{NotebookEvent, QueueState, RunId, RunReport};
use crate::document::{CellId, DocumentModel, NotebookContent, Properties, RunState};
use crate::error::{Error, Result};
use crate::format::{self, ParseAnomaly};
use crate::handler::HandlerRegistry;
use crate::output::CellOutput;
use crate::runtime::{Libraries, RuntimeNamespace};

/// Engine settings.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Keep draining the queue after a cell fails. Notebook metadata
    /// `continue_on_error` overrides this when present.
    pub continue_on_error: bool,
    /// Broadcast buffer; slow subscribers lag past this many events.
    pub event_capacity: usize,
    /// Commands buffered before handle calls wait.
    pub command_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            continue_on_error: false,
            event_capacity: 256,
            command_capacity: 64,
        }
    }
}

/// Which cells a run request covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunTarget {
    All,
    Cell(CellId),
    /// Run in document order regardless of the order given.
    Cells(Vec<CellId>),
}

/// A cell as seen from outside the actor.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CellView {
    pub id: CellId,
    pub cell_type: String,
    pub content: String,
    pub properties: Properties,
    pub state: RunState,
    pub output: Option<CellOutput>,
}

/// Point-in-time copy of a notebook instance.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NotebookSnapshot {
    pub version: u64,
    /// Unsaved changes since the last `mark_saved`.
    pub dirty: bool,
    /// Persisted form of the document.
    pub content: NotebookContent,
    pub cells: Vec<CellView>,
    pub queue: QueueState,
}

impl NotebookSnapshot {
    pub fn cell(&self, id: CellId) -> Option<&CellView> {
        self.cells.iter().find(|c| c.id == id)
    }

    pub fn state(&self, id: CellId) -> Option<RunState> {
        self.cell(id).map(|c| c.state)
    }

    /// The document in text form.
    pub fn to_text(&self) -> String {
        format::serialize(&self.content)
    }
}

/// Pending result of a run request.
#[derive(Debug)]
pub struct RunHandle {
    run_id: RunId,
    receiver: oneshot::Receiver<RunReport>,
}

impl RunHandle {
    pub fn run_id(&self) -> RunId {
        self.run_id
    }

    /// Wait until every target of the request has settled.
    pub async fn wait(self) -> Result<RunReport> {
        self.receiver.await.map_err(|_| Error::NotebookClosed)
    }
}

/// Cloneable handle to a running notebook instance.
///
/// Every call is a message to the instance's actor. Once the instance has shut
/// down, calls fail with [`Error::NotebookClosed`].
#[derive(Clone)]
pub struct NotebookHandle {
    instance_id: Uuid,
    commands: mpsc::Sender<Command>,
    events: broadcast::Sender<NotebookEvent>,
}

impl NotebookHandle {
    pub fn instance_id(&self) -> Uuid {
        self.instance_id
    }

    /// Whether the actor has stopped.
    pub fn is_closed(&self) -> bool {
        self.commands.is_closed()
    }

    /// Receive every event emitted from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<NotebookEvent> {
        self.events.subscribe()
    }

    // =========================================================================
    // Document mutations
    // =========================================================================

    pub async fn insert_cell(
        &self,
        index: usize,
        cell_type: impl Into<String>,
        content: impl Into<String>,
    ) -> Result<CellId> {
        let (cell_type, content) = (cell_type.into(), content.into());
        self.request(|reply| Command::InsertCell {
            index,
            cell_type,
            content,
            reply,
        })
        .await?
    }

    pub async fn remove_cell(&self, id: CellId) -> Result<()> {
        self.request(|reply| Command::RemoveCell { id, reply }).await?
    }

    pub async fn move_cell(&self, id: CellId, new_index: usize) -> Result<()> {
        self.request(|reply| Command::MoveCell {
            id,
            index: new_index,
            reply,
        })
        .await?
    }

    pub async fn update_cell_content(&self, id: CellId, text: impl Into<String>) -> Result<()> {
        let text = text.into();
        self.request(|reply| Command::UpdateContent { id, text, reply })
            .await?
    }

    /// Set a cell property. `null` removes it.
    pub async fn set_property(
        &self,
        id: CellId,
        key: impl Into<String>,
        value: impl Into<Value>,
    ) -> Result<()> {
        let (key, value) = (key.into(), value.into());
        self.request(|reply| Command::SetProperty {
            id,
            key,
            value,
            reply,
        })
        .await?
    }

    pub async fn set_cell_type(&self, id: CellId, cell_type: impl Into<String>) -> Result<()> {
        let cell_type = cell_type.into();
        self.request(|reply| Command::SetCellType {
            id,
            cell_type,
            reply,
        })
        .await?
    }

    /// Set a notebook metadata entry. `null` removes it.
    pub async fn set_metadata(
        &self,
        key: impl Into<String>,
        value: impl Into<Value>,
    ) -> Result<()> {
        let (key, value) = (key.into(), value.into());
        self.request(|reply| Command::SetMetadata { key, value, reply })
            .await
    }

    /// Reset settled cells to `Idle` and drop their outputs. Returns how many
    /// cells changed.
    pub async fn clear_outputs(&self) -> Result<usize> {
        self.request(|reply| Command::ClearOutputs { reply }).await
    }

    /// Record that the current version was persisted. Returns that version.
    pub async fn mark_saved(&self) -> Result<u64> {
        self.request(|reply| Command::MarkSaved { reply }).await
    }

    // =========================================================================
    // Execution
    // =========================================================================

    pub async fn run_cell(&self, id: CellId) -> Result<RunHandle> {
        self.run(RunTarget::Cell(id)).await
    }

    pub async fn run_cells(&self, ids: impl IntoIterator<Item = CellId>) -> Result<RunHandle> {
        self.run(RunTarget::Cells(ids.into_iter().collect())).await
    }

    /// Queue every cell in current document order.
    pub async fn run_all(&self) -> Result<RunHandle> {
        self.run(RunTarget::All).await
    }

    pub async fn run(&self, target: RunTarget) -> Result<RunHandle> {
        let (run_id, receiver) = self
            .request(|reply| Command::Run { target, reply })
            .await??;
        Ok(RunHandle { run_id, receiver })
    }

    /// Drop queued work and signal the running cell to abort. Returns how many
    /// queued entries were cancelled.
    pub async fn cancel(&self) -> Result<usize> {
        self.request(|reply| Command::Cancel { reply }).await
    }

    pub async fn snapshot(&self) -> Result<NotebookSnapshot> {
        self.request(|reply| Command::Snapshot { reply }).await
    }

    /// Stop the instance. Unfinished runs resolve to `NotebookClosed`.
    pub async fn shutdown(&self) -> Result<()> {
        self.request(|reply| Command::Shutdown { reply }).await
    }

    async fn request<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T> {
        let (reply, receiver) = oneshot::channel();
        self.commands
            .send(make(reply))
            .await
            .map_err(|_| Error::NotebookClosed)?;
        receiver.await.map_err(|_| Error::NotebookClosed)
    }
}

impl std::fmt::Debug for NotebookHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotebookHandle")
            .field("instance_id", &self.instance_id)
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// A freshly spawned notebook instance.
#[derive(Debug)]
pub struct Notebook {
    pub handle: NotebookHandle,
    /// Run started because of `run_on_load`.
    pub initial_run: Option<RunHandle>,
    /// Problems found while parsing the source text.
    pub anomalies: Vec<ParseAnomaly>,
}

impl Notebook {
    pub fn builder(content: NotebookContent) -> NotebookBuilder {
        NotebookBuilder::new(content)
    }

    /// Parse `text` and prepare an instance for it.
    pub fn open(text: &str) -> NotebookBuilder {
        let parsed = format::parse(text);
        for anomaly in &parsed.anomalies {
            tracing::warn!("{}", anomaly);
        }
        NotebookBuilder {
            anomalies: parsed.anomalies,
            ..NotebookBuilder::new(parsed.content)
        }
    }
}

/// Configures and spawns a notebook instance.
pub struct NotebookBuilder {
    content: NotebookContent,
    anomalies: Vec<ParseAnomaly>,
    registry: Option<Arc<HandlerRegistry>>,
    libraries: Libraries,
    config: EngineConfig,
    run_on_load: bool,
}

impl NotebookBuilder {
    pub fn new(content: NotebookContent) -> Self {
        Self {
            content,
            anomalies: Vec::new(),
            registry: None,
            libraries: Libraries::default(),
            config: EngineConfig::default(),
            run_on_load: true,
        }
    }

    /// Use `registry` instead of the process-wide one.
    pub fn registry(mut self, registry: Arc<HandlerRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn libraries(mut self, libraries: Libraries) -> Self {
        self.libraries = libraries;
        self
    }

    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Whether to honor `run_on_load` when spawning. On by default.
    pub fn run_on_load(mut self, enabled: bool) -> Self {
        self.run_on_load = enabled;
        self
    }

    /// Spawn the instance actor on the current tokio runtime.
    ///
    /// # Panics
    ///
    /// Panics when called outside a tokio runtime.
    pub fn spawn(self) -> Notebook {
        let instance_id = Uuid::new_v4();
        let registry = self.registry.unwrap_or_else(HandlerRegistry::global);
        let (events, _) = broadcast::channel(self.config.event_capacity.max(1));
        let (commands, receiver) = mpsc::channel(self.config.command_capacity.max(1));

        let model = DocumentModel::from_content(self.content);
        tracing::info!(
            "Opening notebook {} with {} cells",
            instance_id,
            model.len()
        );

        let mut engine = Engine::new(
            instance_id,
            model,
            RuntimeNamespace::new(self.libraries),
            registry,
            self.config,
            events.clone(),
        );

        let initial_run = self
            .run_on_load
            .then(|| engine.run_on_load_target())
            .flatten()
            .and_then(|target| engine.enqueue(target).ok())
            .map(|(run_id, receiver)| RunHandle { run_id, receiver });

        tokio::spawn(engine.run(receiver));

        Notebook {
            handle: NotebookHandle {
                instance_id,
                commands,
                events,
            },
            initial_run,
            anomalies: self.anomalies,
        }
    }
}
