//! The live, mutable notebook.

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{CellContent, CellMetadata, NotebookContent, Properties};
use crate::error::{Error, Result};
use crate::output::CellOutput;

/// Unique identifier for a cell within one live notebook.
///
/// Assigned at insertion and never reused, so removing a cell and inserting
/// the same text again yields a different id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CellId(pub(crate) u64);

impl CellId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for CellId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "cell_{}", self.0)
    }
}

/// Execution state of a cell. Not persisted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    /// Never run, or reset.
    #[default]
    Idle,
    /// Waiting in the run queue.
    Queued,
    /// Handler call in flight.
    Running,
    /// Last run succeeded.
    Done,
    /// Last run failed.
    Error,
    /// Output is from an older version of the cell.
    Stale,
}

impl RunState {
    /// Queued or running.
    pub fn is_pending(self) -> bool {
        matches!(self, RunState::Queued | RunState::Running)
    }
}

/// A cell in the live document.
#[derive(Debug, Clone)]
pub struct Cell {
    id: CellId,
    cell_type: String,
    content: String,
    metadata: CellMetadata,
    state: RunState,
    output: Option<CellOutput>,
    /// Set when the cell was edited while its handler was running.
    edited_while_running: bool,
}

impl Cell {
    fn new(id: CellId, content: CellContent) -> Self {
        Self {
            id,
            cell_type: content.cell_type,
            content: content.content,
            metadata: content.metadata,
            state: RunState::Idle,
            output: None,
            edited_while_running: false,
        }
    }

    pub fn id(&self) -> CellId {
        self.id
    }

    pub fn cell_type(&self) -> &str {
        &self.cell_type
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn properties(&self) -> &Properties {
        &self.metadata.properties
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    /// Output of the last settled run.
    pub fn output(&self) -> Option<&CellOutput> {
        self.output.as_ref()
    }

    /// Persisted form of this cell.
    pub fn to_content(&self) -> CellContent {
        CellContent {
            cell_type: self.cell_type.clone(),
            content: self.content.clone(),
            metadata: self.metadata.clone(),
        }
    }

    /// Apply the staleness rule for an edit.
    ///
    /// `Queued` cells keep their state; the run queue replaces their entry.
    fn mark_edited(&mut self) {
        match self.state {
            RunState::Done | RunState::Error => self.state = RunState::Stale,
            RunState::Running => self.edited_while_running = true,
            RunState::Idle | RunState::Queued | RunState::Stale => {}
        }
    }
}

/// Live notebook: ordered cells, metadata, run state and a version counter.
#[derive(Debug, Clone)]
pub struct DocumentModel {
    format_version: u32,
    metadata: Properties,
    cells: Vec<Cell>,
    /// Position of every cell in `cells`.
    index: FxHashMap<CellId, usize>,
    version: u64,
    saved_version: u64,
    next_id: u64,
}

impl DocumentModel {
    /// Create an empty document.
    pub fn new() -> Self {
        Self::from_content(NotebookContent::new())
    }

    /// Load persisted content, assigning fresh cell ids.
    pub fn from_content(content: NotebookContent) -> Self {
        let mut model = Self {
            format_version: content.format_version,
            metadata: content.metadata,
            cells: Vec::with_capacity(content.cells.len()),
            index: FxHashMap::default(),
            version: 0,
            saved_version: 0,
            next_id: 0,
        };
        for cell in content.cells {
            let id = model.allocate_id();
            model.index.insert(id, model.cells.len());
            model.cells.push(Cell::new(id, cell));
        }
        model
    }

    /// Persisted form of the current document.
    pub fn to_content(&self) -> NotebookContent {
        NotebookContent {
            format_version: self.format_version,
            cells: self.cells.iter().map(Cell::to_content).collect(),
            metadata: self.metadata.clone(),
        }
    }

    fn allocate_id(&mut self) -> CellId {
        let id = CellId::new(self.next_id);
        self.next_id += 1;
        id
    }

    /// Refresh positions of the cells at `start` and after.
    fn reindex_from(&mut self, start: usize) {
        for (i, cell) in self.cells.iter().enumerate().skip(start) {
            self.index.insert(cell.id, i);
        }
    }

    fn touch(&mut self) {
        self.version += 1;
    }

    /// Monotonic counter bumped by every document mutation.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Whether there are mutations since the last [`mark_saved`](Self::mark_saved).
    pub fn is_dirty(&self) -> bool {
        self.version != self.saved_version
    }

    /// Record that the host persisted the current version.
    pub fn mark_saved(&mut self) {
        self.saved_version = self.version;
    }

    pub fn metadata(&self) -> &Properties {
        &self.metadata
    }

    pub fn format_version(&self) -> u32 {
        self.format_version
    }

    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn cell(&self, id: CellId) -> Option<&Cell> {
        self.position(id).map(|i| &self.cells[i])
    }

    pub fn contains(&self, id: CellId) -> bool {
        self.index.contains_key(&id)
    }

    /// Index of the cell in document order.
    pub fn position(&self, id: CellId) -> Option<usize> {
        self.index.get(&id).copied()
    }

    pub fn state(&self, id: CellId) -> Option<RunState> {
        self.cell(id).map(Cell::state)
    }

    /// All cell ids in document order.
    pub fn cell_ids(&self) -> Vec<CellId> {
        self.cells.iter().map(|c| c.id).collect()
    }

    fn cell_mut(&mut self, id: CellId) -> Result<&mut Cell> {
        let index = self.position(id).ok_or(Error::CellNotFound(id))?;
        Ok(&mut self.cells[index])
    }

    // =========================================================================
    // Document operations
    // =========================================================================

    /// Insert a new cell at `index` (which may equal the cell count to append).
    pub fn insert_cell(
        &mut self,
        index: usize,
        cell_type: impl Into<String>,
        content: impl Into<String>,
    ) -> Result<CellId> {
        let cell_type = cell_type.into();
        validate_cell_type(&cell_type)?;
        let len = self.cells.len();
        if index > len {
            return Err(Error::InvalidIndex { index, len });
        }
        let id = self.allocate_id();
        self.cells
            .insert(index, Cell::new(id, CellContent::new(cell_type, content)));
        self.reindex_from(index);
        self.touch();
        Ok(id)
    }

    /// Remove a cell, returning it.
    pub fn remove_cell(&mut self, id: CellId) -> Result<Cell> {
        let index = self.position(id).ok_or(Error::CellNotFound(id))?;
        let cell = self.cells.remove(index);
        self.index.remove(&id);
        self.reindex_from(index);
        self.touch();
        Ok(cell)
    }

    /// Move a cell so it ends up at `new_index`.
    pub fn move_cell(&mut self, id: CellId, new_index: usize) -> Result<()> {
        let index = self.position(id).ok_or(Error::CellNotFound(id))?;
        let len = self.cells.len();
        if new_index >= len {
            return Err(Error::InvalidIndex {
                index: new_index,
                len,
            });
        }
        if index != new_index {
            let cell = self.cells.remove(index);
            self.cells.insert(new_index, cell);
            self.reindex_from(index.min(new_index));
        }
        self.touch();
        Ok(())
    }

    /// Replace a cell's source text.
    pub fn update_cell_content(&mut self, id: CellId, text: impl Into<String>) -> Result<()> {
        let cell = self.cell_mut(id)?;
        cell.content = text.into();
        cell.mark_edited();
        self.touch();
        Ok(())
    }

    /// Set a cell property. A `null` value removes the key.
    pub fn set_property(&mut self, id: CellId, key: impl Into<String>, value: Value) -> Result<()> {
        let key = key.into();
        if key.is_empty() {
            return Err(Error::InvalidPropertyKey(key));
        }
        let cell = self.cell_mut(id)?;
        if value.is_null() {
            cell.metadata.properties.remove(&key);
        } else {
            cell.metadata.properties.insert(key, value);
        }
        cell.mark_edited();
        self.touch();
        Ok(())
    }

    /// Change the type of a cell.
    pub fn set_cell_type(&mut self, id: CellId, cell_type: impl Into<String>) -> Result<()> {
        let cell_type = cell_type.into();
        validate_cell_type(&cell_type)?;
        let cell = self.cell_mut(id)?;
        cell.cell_type = cell_type;
        cell.mark_edited();
        self.touch();
        Ok(())
    }

    /// Set a notebook-level metadata entry. A `null` value removes the key.
    pub fn set_metadata(&mut self, key: impl Into<String>, value: Value) {
        let key = key.into();
        if value.is_null() {
            self.metadata.remove(&key);
        } else {
            self.metadata.insert(key, value);
        }
        self.touch();
    }

    /// Drop outputs of every settled cell and return them to `Idle`.
    ///
    /// Queued and running cells are left alone. Returns the ids that changed.
    pub fn clear_outputs(&mut self) -> Vec<CellId> {
        let mut cleared = Vec::new();
        for cell in &mut self.cells {
            if cell.state.is_pending() {
                continue;
            }
            if cell.state != RunState::Idle || cell.output.is_some() {
                cell.state = RunState::Idle;
                cell.output = None;
                cleared.push(cell.id);
            }
        }
        cleared
    }

    // =========================================================================
    // Run state transitions (driven by the execution engine)
    // =========================================================================

    pub(crate) fn mark_queued(&mut self, id: CellId) -> Result<()> {
        self.cell_mut(id)?.state = RunState::Queued;
        Ok(())
    }

    pub(crate) fn mark_running(&mut self, id: CellId) -> Result<()> {
        let cell = self.cell_mut(id)?;
        cell.state = RunState::Running;
        cell.edited_while_running = false;
        Ok(())
    }

    /// Attach the output of a settled run and return the resulting state.
    ///
    /// An edit that arrived mid-run turns the result into `Stale`.
    pub(crate) fn finish_run(&mut self, id: CellId, output: CellOutput) -> Result<RunState> {
        let cell = self.cell_mut(id)?;
        cell.state = if output.is_failure() {
            RunState::Error
        } else {
            RunState::Done
        };
        cell.output = Some(output);
        if std::mem::take(&mut cell.edited_while_running) {
            cell.state = RunState::Stale;
        }
        Ok(cell.state)
    }

    /// Return a queued cell to `Idle`. Other states are left unchanged.
    pub(crate) fn unqueue(&mut self, id: CellId) -> Option<RunState> {
        let cell = self.cell_mut(id).ok()?;
        if cell.state == RunState::Queued {
            cell.state = RunState::Idle;
            Some(cell.state)
        } else {
            None
        }
    }
}

/// Cell types sit between `[` and `]` on the delimiter line.
fn validate_cell_type(cell_type: &str) -> Result<()> {
    if cell_type.is_empty() || cell_type.contains(|c: char| c.is_whitespace() || c == ']') {
        return Err(Error::InvalidCellType(cell_type.to_string()));
    }
    Ok(())
}

impl Default for DocumentModel {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::CellFailure;
    use serde_json::json;

    fn model_with(cells: &[(&str, &str)]) -> (DocumentModel, Vec<CellId>) {
        let mut model = DocumentModel::new();
        let ids = cells
            .iter()
            .enumerate()
            .map(|(i, (ty, src))| model.insert_cell(i, *ty, *src).unwrap())
            .collect();
        (model, ids)
    }

    #[test]
    fn test_ids_are_never_reused() {
        let (mut model, ids) = model_with(&[("markdown", "a")]);
        model.remove_cell(ids[0]).unwrap();
        let again = model.insert_cell(0, "markdown", "a").unwrap();
        assert_ne!(again, ids[0]);
    }

    #[test]
    fn test_every_mutation_bumps_version() {
        let mut model = DocumentModel::new();
        assert_eq!(model.version(), 0);

        let a = model.insert_cell(0, "markdown", "a").unwrap();
        let b = model.insert_cell(1, "markdown", "b").unwrap();
        model.move_cell(b, 0).unwrap();
        model.update_cell_content(a, "a2").unwrap();
        model.set_property(a, "collapsed", json!(true)).unwrap();
        model.remove_cell(b).unwrap();
        assert_eq!(model.version(), 6);
    }

    #[test]
    fn test_failed_operations_leave_version_alone() {
        let mut model = DocumentModel::new();
        assert!(matches!(
            model.insert_cell(3, "markdown", ""),
            Err(Error::InvalidIndex { index: 3, len: 0 })
        ));
        assert!(model.update_cell_content(CellId::new(99), "x").is_err());
        assert_eq!(model.version(), 0);
    }

    #[test]
    fn test_dirty_tracking() {
        let mut model = DocumentModel::new();
        assert!(!model.is_dirty());
        model.insert_cell(0, "markdown", "").unwrap();
        assert!(model.is_dirty());
        model.mark_saved();
        assert!(!model.is_dirty());
    }

    #[test]
    fn test_move_cell_reorders() {
        let (mut model, ids) = model_with(&[("a", "1"), ("b", "2"), ("c", "3")]);
        model.move_cell(ids[0], 2).unwrap();
        assert_eq!(model.cell_ids(), vec![ids[1], ids[2], ids[0]]);
        assert!(model.move_cell(ids[0], 3).is_err());
    }

    #[test]
    fn test_edit_done_cell_goes_stale_others_unchanged() {
        let (mut model, ids) = model_with(&[("a", "1"), ("b", "2")]);
        for &id in &ids {
            model.mark_queued(id).unwrap();
            model.mark_running(id).unwrap();
            model.finish_run(id, CellOutput::text("ok")).unwrap();
        }

        model.update_cell_content(ids[0], "changed").unwrap();
        assert_eq!(model.state(ids[0]), Some(RunState::Stale));
        assert_eq!(model.state(ids[1]), Some(RunState::Done));
    }

    #[test]
    fn test_edit_error_cell_goes_stale() {
        let (mut model, ids) = model_with(&[("a", "1")]);
        model.mark_running(ids[0]).unwrap();
        let state = model
            .finish_run(ids[0], CellOutput::failed(CellFailure::handler("boom")))
            .unwrap();
        assert_eq!(state, RunState::Error);

        model.set_property(ids[0], "collapsed", json!(true)).unwrap();
        assert_eq!(model.state(ids[0]), Some(RunState::Stale));
    }

    #[test]
    fn test_edit_while_running_applies_after_finish() {
        let (mut model, ids) = model_with(&[("a", "1")]);
        model.mark_running(ids[0]).unwrap();
        model.update_cell_content(ids[0], "2").unwrap();
        assert_eq!(model.state(ids[0]), Some(RunState::Running));

        let state = model.finish_run(ids[0], CellOutput::text("1")).unwrap();
        assert_eq!(state, RunState::Stale);
        assert_eq!(model.cell(ids[0]).unwrap().output().unwrap().text.as_deref(), Some("1"));
    }

    #[test]
    fn test_edit_idle_cell_stays_idle() {
        let (mut model, ids) = model_with(&[("a", "1")]);
        model.update_cell_content(ids[0], "2").unwrap();
        assert_eq!(model.state(ids[0]), Some(RunState::Idle));
    }

    #[test]
    fn test_null_property_removes_key() {
        let (mut model, ids) = model_with(&[("a", "1")]);
        model.set_property(ids[0], "k", json!(1)).unwrap();
        model.set_property(ids[0], "k", Value::Null).unwrap();
        assert!(!model.cell(ids[0]).unwrap().properties().contains_key("k"));
    }

    #[test]
    fn test_clear_outputs_skips_pending_cells() {
        let (mut model, ids) = model_with(&[("a", "1"), ("b", "2")]);
        model.mark_running(ids[0]).unwrap();
        model.finish_run(ids[0], CellOutput::text("x")).unwrap();
        model.mark_queued(ids[1]).unwrap();

        let cleared = model.clear_outputs();
        assert_eq!(cleared, vec![ids[0]]);
        assert_eq!(model.state(ids[0]), Some(RunState::Idle));
        assert!(model.cell(ids[0]).unwrap().output().is_none());
        assert_eq!(model.state(ids[1]), Some(RunState::Queued));
    }

    #[test]
    fn test_unwritable_cell_types_are_rejected() {
        let (mut model, ids) = model_with(&[("markdown", "a")]);
        for bad in ["", "my type", "a]b", "line\nbreak"] {
            assert!(matches!(
                model.insert_cell(0, bad, ""),
                Err(Error::InvalidCellType(_))
            ));
            assert!(matches!(
                model.set_cell_type(ids[0], bad),
                Err(Error::InvalidCellType(_))
            ));
        }
        assert_eq!(model.len(), 1);
        assert_eq!(model.cell(ids[0]).unwrap().cell_type(), "markdown");
        assert_eq!(model.version(), 1);
    }

    #[test]
    fn test_empty_property_key_is_rejected() {
        let (mut model, ids) = model_with(&[("markdown", "a")]);
        assert!(matches!(
            model.set_property(ids[0], "", json!(1)),
            Err(Error::InvalidPropertyKey(_))
        ));
        model.set_property(ids[0], "two words", json!(1)).unwrap();
        assert_eq!(model.cell(ids[0]).unwrap().properties().len(), 1);
    }

    #[test]
    fn test_lookup_follows_structural_edits() {
        let (mut model, ids) = model_with(&[("a", "1"), ("b", "2"), ("c", "3"), ("d", "4")]);
        model.move_cell(ids[3], 0).unwrap();
        model.remove_cell(ids[1]).unwrap();
        let e = model.insert_cell(1, "e", "5").unwrap();

        let order = model.cell_ids();
        assert_eq!(order, vec![ids[3], e, ids[0], ids[2]]);
        for (i, id) in order.iter().enumerate() {
            assert_eq!(model.position(*id), Some(i));
            assert_eq!(model.cell(*id).unwrap().id(), *id);
        }
        assert!(!model.contains(ids[1]));
        assert!(model.update_cell_content(ids[1], "x").is_err());
    }

    #[test]
    fn test_content_round_trip_through_model() {
        let content = NotebookContent::new()
            .with_cell(CellContent::new("markdown", "# hi").with_property("collapsed", true))
            .with_cell(CellContent::new("json", "{}"));
        let model = DocumentModel::from_content(content.clone());
        assert_eq!(model.to_content(), content);
        assert_eq!(model.len(), 2);
    }
}
