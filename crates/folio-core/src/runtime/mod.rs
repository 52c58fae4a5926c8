//! Runtime namespace shared by executing cells.
//!
//! This module provides:
//! - Immutable library handles (`Libraries`), resolved once per notebook
//! - The mutable scratch area cells use to pass values along
//! - A console sink scoped to the running cell
//! - Cooperative cancellation (`AbortHandle`)

mod abort;
mod namespace;

pub use abort::AbortHandle;
pub use namespace::{
    Console, Libraries, LibrariesBuilder, NAMESPACE_VERSION, RUNTIME_HANDLE, RuntimeInfo,
    RuntimeNamespace,
};
