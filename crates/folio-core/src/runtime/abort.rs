//! Cooperative cancellation for running cells.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Flag a long-running handler can poll to learn that its run was cancelled.
///
/// Every dispatched cell gets a fresh handle through its namespace. Cancelling
/// the notebook trips the handle of the cell in flight; the engine never
/// interrupts a handler, so honoring the flag is up to the handler.
///
/// # Example
///
/// ```
/// use folio_core::runtime::AbortHandle;
///
/// let handle = AbortHandle::new();
/// let seen_by_handler = handle.clone();
///
/// assert!(!seen_by_handler.is_aborted());
/// handle.abort();
/// assert!(seen_by_handler.is_aborted());
/// ```
#[derive(Debug, Clone, Default)]
pub struct AbortHandle {
    aborted: Arc<AtomicBool>,
}

impl AbortHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether cancellation was requested for this run.
    pub fn is_aborted(&self) -> bool {
        self.aborted.load(Ordering::Relaxed)
    }

    /// Request cancellation. Visible to every clone.
    pub fn abort(&self) {
        self.aborted.store(true, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_handle_is_not_aborted() {
        assert!(!AbortHandle::new().is_aborted());
        assert!(!AbortHandle::default().is_aborted());
    }

    #[test]
    fn test_clones_share_state() {
        let handle = AbortHandle::new();
        let clone = handle.clone();
        clone.abort();
        assert!(handle.is_aborted());
    }
}
