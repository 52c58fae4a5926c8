//! Cell handlers and the registry that maps cell types to them.
//!
//! A handler turns the content of one cell into a [`CellOutput`]. It gets a
//! read-only [`CellSnapshot`] of the cell and exclusive access to the
//! notebook's [`RuntimeNamespace`] for the duration of the call.
//!
//! # Example
//!
//! ```
//! use folio_core::handler::{CellSnapshot, HandlerRegistry, SyncHandler};
//! use folio_core::output::CellOutput;
//! use folio_core::runtime::RuntimeNamespace;
//!
//! let registry = HandlerRegistry::new();
//! registry.register(
//!     "shout",
//!     SyncHandler::new(|cell: &CellSnapshot, _ns: &mut RuntimeNamespace| {
//!         Ok(CellOutput::text(cell.content.to_uppercase()))
//!     }),
//! );
//! assert!(registry.contains("shout"));
//! ```

mod registry;

pub use registry::HandlerRegistry;

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};

use crate::document::{CellId, Properties};
use crate::output::CellOutput;
use crate::runtime::RuntimeNamespace;

/// Result of one handler call.
pub type HandlerResult = std::result::Result<CellOutput, HandlerError>;

/// Failure raised by a handler. Recorded on the cell, never propagated.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct HandlerError {
    pub message: String,
}

impl HandlerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<String> for HandlerError {
    fn from(message: String) -> Self {
        Self { message }
    }
}

impl From<&str> for HandlerError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

impl From<serde_json::Error> for HandlerError {
    fn from(err: serde_json::Error) -> Self {
        Self::new(err.to_string())
    }
}

/// What a handler sees of the cell it runs.
///
/// `properties` are the handler's defaults overlaid by the cell's inline
/// properties.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CellSnapshot {
    pub id: CellId,
    pub cell_type: String,
    pub content: String,
    pub properties: Properties,
}

/// Hint for the external editor about how to present a cell type.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EditorKind {
    #[default]
    Code,
    RichText,
    None,
}

/// Executes cells of one type.
pub trait CellHandler: Send + Sync {
    /// Run the cell against the shared namespace.
    fn run<'a>(
        &'a self,
        cell: &'a CellSnapshot,
        namespace: &'a mut RuntimeNamespace,
    ) -> BoxFuture<'a, HandlerResult>;

    /// Properties applied when the cell does not set them inline.
    fn default_properties(&self) -> Properties {
        Properties::new()
    }

    fn editor(&self) -> EditorKind {
        EditorKind::Code
    }

    /// Called once when the handler is replaced or unregistered.
    fn dispose(&self) {}
}

/// Adapter for handlers that finish without awaiting anything.
pub struct SyncHandler<F> {
    run: F,
    defaults: Properties,
    editor: EditorKind,
}

impl<F> SyncHandler<F>
where
    F: Fn(&CellSnapshot, &mut RuntimeNamespace) -> HandlerResult + Send + Sync,
{
    pub fn new(run: F) -> Self {
        Self {
            run,
            defaults: Properties::new(),
            editor: EditorKind::Code,
        }
    }

    pub fn with_defaults(mut self, defaults: Properties) -> Self {
        self.defaults = defaults;
        self
    }

    pub fn with_editor(mut self, editor: EditorKind) -> Self {
        self.editor = editor;
        self
    }
}

impl<F> CellHandler for SyncHandler<F>
where
    F: Fn(&CellSnapshot, &mut RuntimeNamespace) -> HandlerResult + Send + Sync,
{
    fn run<'a>(
        &'a self,
        cell: &'a CellSnapshot,
        namespace: &'a mut RuntimeNamespace,
    ) -> BoxFuture<'a, HandlerResult> {
        let result = (self.run)(cell, namespace);
        Box::pin(futures::future::ready(result))
    }

    fn default_properties(&self) -> Properties {
        self.defaults.clone()
    }

    fn editor(&self) -> EditorKind {
        self.editor
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn snapshot(content: &str) -> CellSnapshot {
        CellSnapshot {
            id: CellId::new(0),
            cell_type: "test".to_string(),
            content: content.to_string(),
            properties: Properties::new(),
        }
    }

    #[tokio::test]
    async fn test_sync_handler_runs_closure() {
        let handler = SyncHandler::new(|cell: &CellSnapshot, ns: &mut RuntimeNamespace| {
            ns.set("seen", cell.content.clone());
            Ok(CellOutput::text("ok"))
        });
        let mut ns = RuntimeNamespace::default();
        let out = handler.run(&snapshot("abc"), &mut ns).await.unwrap();
        assert_eq!(out.text.as_deref(), Some("ok"));
        assert_eq!(ns.get("seen"), Some(&json!("abc")));
    }

    #[tokio::test]
    async fn test_sync_handler_error() {
        let handler = SyncHandler::new(|_: &CellSnapshot, _: &mut RuntimeNamespace| {
            Err("boom".into())
        });
        let mut ns = RuntimeNamespace::default();
        let err = handler.run(&snapshot(""), &mut ns).await.unwrap_err();
        assert_eq!(err.to_string(), "boom");
    }

    #[test]
    fn test_defaults_and_editor() {
        let defaults: Properties = [("hidden".to_string(), json!(true))].into_iter().collect();
        let handler = SyncHandler::new(|_: &CellSnapshot, _: &mut RuntimeNamespace| {
            Ok(CellOutput::empty())
        })
        .with_defaults(defaults.clone())
        .with_editor(EditorKind::RichText);
        assert_eq!(handler.default_properties(), defaults);
        assert_eq!(handler.editor(), EditorKind::RichText);
    }

    #[test]
    fn test_handler_error_from_json() {
        let err: HandlerError = serde_json::from_str::<serde_json::Value>("{")
            .unwrap_err()
            .into();
        assert!(err.message.contains("EOF"));
    }
}
