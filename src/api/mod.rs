//! Purpose: Define the public Rust API boundary for csvserve.
//! Exports: Table service, paging, schema, and error types needed by the CLI and server.
//! Role: Public, additive-only surface; hides the loader's internals.
//! Invariants: This module is the only public path to table loading.

mod page;
mod tables;

#[doc(hidden)]
pub use crate::core::error::to_exit_code;
pub use crate::core::error::{Error, ErrorKind};
pub use crate::core::loader::{LoadedTable, Record};
pub use crate::core::schema::{FieldSpec, FieldType, SchemaRegistry, TableSchema};
pub use crate::table_paths::DEFAULT_DATA_DIR;
pub use page::{DATE_COLUMNS, DEFAULT_LIMIT, MAX_LIMIT, Page, PageRequest, filter_by_date, paginate};
pub use tables::{
    ApiResult, DEFAULT_EXPOSED_TABLES, ExposedTables, TableDescription, TableService,
    ValidationMode,
};
