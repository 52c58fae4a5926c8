//! Thread-safe map from cell type to handler.

use std::sync::{Arc, LazyLock, PoisonError, RwLock};

use rustc_hash::FxHashMap;

use super::CellHandler;

static GLOBAL: LazyLock<Arc<HandlerRegistry>> = LazyLock::new(|| Arc::new(HandlerRegistry::new()));

/// Registry of cell handlers keyed by cell type.
///
/// Registration is last-writer-wins. Resolution hands out an `Arc` to a fully
/// constructed handler, so a notebook never sees a half-registered one.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: RwLock<FxHashMap<String, Arc<dyn CellHandler>>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide registry.
    pub fn global() -> Arc<HandlerRegistry> {
        Arc::clone(&GLOBAL)
    }

    /// Register `handler` for `cell_type`, replacing any previous one.
    ///
    /// The replaced handler is disposed and returned.
    pub fn register(
        &self,
        cell_type: impl Into<String>,
        handler: impl CellHandler + 'static,
    ) -> Option<Arc<dyn CellHandler>> {
        self.register_arc(cell_type, Arc::new(handler))
    }

    pub fn register_arc(
        &self,
        cell_type: impl Into<String>,
        handler: Arc<dyn CellHandler>,
    ) -> Option<Arc<dyn CellHandler>> {
        let cell_type = cell_type.into();
        let previous = self
            .handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(cell_type.clone(), handler);

        if let Some(previous) = &previous {
            tracing::debug!("Replaced handler for cell type '{}'", cell_type);
            previous.dispose();
        }
        previous
    }

    /// Remove the handler for `cell_type`, disposing it.
    pub fn unregister(&self, cell_type: &str) -> Option<Arc<dyn CellHandler>> {
        let previous = self
            .handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(cell_type);
        if let Some(previous) = &previous {
            previous.dispose();
        }
        previous
    }

    pub fn resolve(&self, cell_type: &str) -> Option<Arc<dyn CellHandler>> {
        self.handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(cell_type)
            .cloned()
    }

    pub fn contains(&self, cell_type: &str) -> bool {
        self.handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(cell_type)
    }

    /// Registered cell types, sorted.
    pub fn cell_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self
            .handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        types.sort_unstable();
        types
    }
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("cell_types", &self.cell_types())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use futures::future::BoxFuture;

    use super::*;
    use crate::handler::{CellSnapshot, HandlerResult, SyncHandler};
    use crate::output::CellOutput;
    use crate::runtime::RuntimeNamespace;

    struct Tracked {
        disposed: Arc<AtomicUsize>,
    }

    impl CellHandler for Tracked {
        fn run<'a>(
            &'a self,
            _cell: &'a CellSnapshot,
            _namespace: &'a mut RuntimeNamespace,
        ) -> BoxFuture<'a, HandlerResult> {
            Box::pin(async { Ok(CellOutput::empty()) })
        }

        fn dispose(&self) {
            self.disposed.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn noop() -> impl CellHandler {
        SyncHandler::new(|_: &CellSnapshot, _: &mut RuntimeNamespace| Ok(CellOutput::empty()))
    }

    #[test]
    fn test_register_and_resolve() {
        let registry = HandlerRegistry::new();
        assert!(registry.register("markdown", noop()).is_none());
        assert!(registry.resolve("markdown").is_some());
        assert!(registry.resolve("python").is_none());
    }

    #[test]
    fn test_replacement_disposes_previous() {
        let disposed = Arc::new(AtomicUsize::new(0));
        let registry = HandlerRegistry::new();
        registry.register(
            "x",
            Tracked {
                disposed: Arc::clone(&disposed),
            },
        );
        let previous = registry.register("x", noop());
        assert!(previous.is_some());
        assert_eq!(disposed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unregister_disposes() {
        let disposed = Arc::new(AtomicUsize::new(0));
        let registry = HandlerRegistry::new();
        registry.register(
            "x",
            Tracked {
                disposed: Arc::clone(&disposed),
            },
        );
        assert!(registry.unregister("x").is_some());
        assert!(registry.unregister("x").is_none());
        assert_eq!(disposed.load(Ordering::SeqCst), 1);
        assert!(!registry.contains("x"));
    }

    #[test]
    fn test_cell_types_sorted() {
        let registry = HandlerRegistry::new();
        registry.register("json", noop());
        registry.register("html", noop());
        registry.register("markdown", noop());
        assert_eq!(registry.cell_types(), vec!["html", "json", "markdown"]);
    }

    #[test]
    fn test_global_is_shared() {
        let a = HandlerRegistry::global();
        let b = HandlerRegistry::global();
        assert!(Arc::ptr_eq(&a, &b));
    }
}
