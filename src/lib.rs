//! Purpose: Shared library crate used by the `csvserve` binary and tests.
//! Exports: `api` (table service, schemas, paging, errors) and `core` (loader, coercion).
//! Role: Library backing the binary; the HTTP layer lives in the binary crate.
//! Invariants: Core modules prefer explicit inputs/outputs over hidden state.
pub mod api;
pub mod core;
mod table_paths;
