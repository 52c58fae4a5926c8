//! The shared runtime namespace handed to every handler call.

use std::any::Any;
use std::collections::BTreeMap;
use std::sync::Arc;

use rustc_hash::FxHashMap;
use serde::Serialize;
use serde_json::Value;

use super::AbortHandle;
use crate::document::CellId;
use crate::output::{ConsoleEntry, ConsoleLevel};

/// Version of the stable global set.
///
/// Adding a handle keeps the version; removing or renaming one bumps it.
pub const NAMESPACE_VERSION: u32 = 1;

/// Name of the handle every namespace exposes.
pub const RUNTIME_HANDLE: &str = "runtime";

/// Payload of the `runtime` handle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RuntimeInfo {
    /// folio-core version.
    pub version: &'static str,
    pub namespace_version: u32,
}

impl RuntimeInfo {
    fn current() -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION"),
            namespace_version: NAMESPACE_VERSION,
        }
    }
}

type LibraryHandle = Arc<dyn Any + Send + Sync>;

/// Immutable set of named library handles.
///
/// Built once; cloning shares the same handles.
#[derive(Clone)]
pub struct Libraries {
    handles: Arc<FxHashMap<String, LibraryHandle>>,
}

impl Libraries {
    pub fn builder() -> LibrariesBuilder {
        LibrariesBuilder::new()
    }

    /// Typed access to a handle.
    pub fn get<T: Any + Send + Sync>(&self, name: &str) -> Option<&T> {
        self.handles.get(name).and_then(|h| h.downcast_ref::<T>())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.handles.contains_key(name)
    }

    /// Handle names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.handles.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl Default for Libraries {
    fn default() -> Self {
        LibrariesBuilder::new().build()
    }
}

impl std::fmt::Debug for Libraries {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Libraries")
            .field("names", &self.names())
            .finish()
    }
}

/// Builder for [`Libraries`]. Always installs the `runtime` handle.
pub struct LibrariesBuilder {
    handles: FxHashMap<String, LibraryHandle>,
}

impl LibrariesBuilder {
    fn new() -> Self {
        let mut handles: FxHashMap<String, LibraryHandle> = FxHashMap::default();
        handles.insert(RUNTIME_HANDLE.to_string(), Arc::new(RuntimeInfo::current()));
        Self { handles }
    }

    /// Add a library handle. `runtime` is reserved and cannot be replaced.
    pub fn with<T: Any + Send + Sync>(mut self, name: impl Into<String>, library: T) -> Self {
        let name = name.into();
        if name == RUNTIME_HANDLE {
            tracing::warn!("Ignoring attempt to replace the reserved '{}' library", RUNTIME_HANDLE);
            return self;
        }
        self.handles.insert(name, Arc::new(library));
        self
    }

    pub fn build(self) -> Libraries {
        Libraries {
            handles: Arc::new(self.handles),
        }
    }
}

/// Console sink for the currently running cell.
#[derive(Debug, Clone, Default)]
pub struct Console {
    entries: Vec<ConsoleEntry>,
}

impl Console {
    pub fn log(&mut self, message: impl Into<String>) {
        self.push(ConsoleLevel::Log, message);
    }

    pub fn warn(&mut self, message: impl Into<String>) {
        self.push(ConsoleLevel::Warn, message);
    }

    pub fn error(&mut self, message: impl Into<String>) {
        self.push(ConsoleLevel::Error, message);
    }

    pub fn entries(&self) -> &[ConsoleEntry] {
        &self.entries
    }

    fn push(&mut self, level: ConsoleLevel, message: impl Into<String>) {
        self.entries.push(ConsoleEntry {
            level,
            message: message.into(),
        });
    }

    fn drain(&mut self) -> Vec<ConsoleEntry> {
        std::mem::take(&mut self.entries)
    }
}

/// Mutable context shared by every cell of one notebook instance.
///
/// Cells see each other's variables on purpose: executing cells in document
/// order against one namespace behaves like one top-level scope.
#[derive(Debug)]
pub struct RuntimeNamespace {
    libraries: Libraries,
    vars: BTreeMap<String, Value>,
    console: Console,
    abort: AbortHandle,
    current_cell: Option<CellId>,
}

impl RuntimeNamespace {
    pub fn new(libraries: Libraries) -> Self {
        Self {
            libraries,
            vars: BTreeMap::new(),
            console: Console::default(),
            abort: AbortHandle::new(),
            current_cell: None,
        }
    }

    pub fn libraries(&self) -> &Libraries {
        &self.libraries
    }

    /// Typed access to a library handle.
    pub fn library<T: Any + Send + Sync>(&self, name: &str) -> Option<&T> {
        self.libraries.get(name)
    }

    /// Read a scratch variable.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.vars.get(name)
    }

    /// Write a scratch variable, returning the previous value.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.vars.insert(name.into(), value.into())
    }

    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.vars.remove(name)
    }

    /// All scratch variables in name order.
    pub fn vars(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.vars.iter()
    }

    pub fn console(&mut self) -> &mut Console {
        &mut self.console
    }

    /// Abort handle of the running cell.
    pub fn abort_handle(&self) -> &AbortHandle {
        &self.abort
    }

    pub fn is_aborted(&self) -> bool {
        self.abort.is_aborted()
    }

    /// Cell currently executing against this namespace.
    pub fn current_cell(&self) -> Option<CellId> {
        self.current_cell
    }

    pub(crate) fn begin_cell(&mut self, cell_id: CellId, abort: AbortHandle) {
        self.current_cell = Some(cell_id);
        self.abort = abort;
        self.console.drain();
    }

    /// Finish the current cell and hand back what it printed.
    pub(crate) fn finish_cell(&mut self) -> Vec<ConsoleEntry> {
        self.current_cell = None;
        self.console.drain()
    }
}

impl Default for RuntimeNamespace {
    fn default() -> Self {
        Self::new(Libraries::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Debug, PartialEq)]
    struct Greeter(&'static str);

    #[test]
    fn test_runtime_handle_is_always_present() {
        let libs = Libraries::default();
        let info = libs.get::<RuntimeInfo>(RUNTIME_HANDLE).unwrap();
        assert_eq!(info.namespace_version, NAMESPACE_VERSION);
        assert_eq!(libs.names(), vec![RUNTIME_HANDLE]);
    }

    #[test]
    fn test_typed_library_access() {
        let libs = Libraries::builder().with("greeter", Greeter("hi")).build();
        assert_eq!(libs.get::<Greeter>("greeter"), Some(&Greeter("hi")));
        assert!(libs.get::<String>("greeter").is_none());
        assert!(libs.get::<Greeter>("missing").is_none());
    }

    #[test]
    fn test_runtime_handle_cannot_be_replaced() {
        let libs = Libraries::builder().with(RUNTIME_HANDLE, Greeter("x")).build();
        assert!(libs.get::<RuntimeInfo>(RUNTIME_HANDLE).is_some());
    }

    #[test]
    fn test_vars_are_shared_across_cells() {
        let mut ns = RuntimeNamespace::default();
        ns.begin_cell(CellId::new(0), AbortHandle::new());
        ns.set("x", 1);
        ns.finish_cell();

        ns.begin_cell(CellId::new(1), AbortHandle::new());
        assert_eq!(ns.get("x"), Some(&json!(1)));
        assert_eq!(ns.set("x", 2), Some(json!(1)));
    }

    #[test]
    fn test_console_is_scoped_to_current_cell() {
        let mut ns = RuntimeNamespace::default();
        ns.begin_cell(CellId::new(0), AbortHandle::new());
        ns.console().log("one");
        ns.console().warn("two");
        assert_eq!(ns.current_cell(), Some(CellId::new(0)));

        let entries = ns.finish_cell();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].level, ConsoleLevel::Warn);
        assert!(ns.console().entries().is_empty());
        assert_eq!(ns.current_cell(), None);
    }

    #[test]
    fn test_abort_handle_swapped_per_cell() {
        let mut ns = RuntimeNamespace::default();
        let first = AbortHandle::new();
        ns.begin_cell(CellId::new(0), first.clone());
        first.abort();
        assert!(ns.is_aborted());

        ns.begin_cell(CellId::new(1), AbortHandle::new());
        assert!(!ns.is_aborted());
    }
}
