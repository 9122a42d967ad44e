//! Purpose: Shared data-directory and table-name path resolution helpers.
//! Exports: `DEFAULT_DATA_DIR`, `check_table_name`, and `resolve_table_path`.
//! Role: Keep CLI, service, and HTTP path semantics aligned from one source.
//! Invariants: Default data directory remains `data` relative to the working directory.
//! Invariants: Table names never escape the data directory.

use std::path::{Path, PathBuf};

pub const DEFAULT_DATA_DIR: &str = "data";

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub(crate) enum TableNameResolveError {
    Empty,
    ContainsPathSeparator,
    ParentReference,
}

impl TableNameResolveError {
    pub(crate) fn message(self) -> &'static str {
        match self {
            TableNameResolveError::Empty => "table name must not be empty",
            TableNameResolveError::ContainsPathSeparator => {
                "table name must not contain path separators"
            }
            TableNameResolveError::ParentReference => "table name must not contain '..'",
        }
    }
}

pub(crate) fn check_table_name(name: &str) -> Result<(), TableNameResolveError> {
    if name.is_empty() {
        return Err(TableNameResolveError::Empty);
    }
    if name.chars().any(|ch| ch == '/' || ch == '\\') {
        return Err(TableNameResolveError::ContainsPathSeparator);
    }
    if name.contains("..") {
        return Err(TableNameResolveError::ParentReference);
    }
    Ok(())
}

pub(crate) fn resolve_table_path(
    name: &str,
    data_dir: &Path,
) -> Result<PathBuf, TableNameResolveError> {
    check_table_name(name)?;
    Ok(data_dir.join(format!("{name}.csv")))
}
