//! Purpose: Define the table service used by the HTTP server and the CLI.
//! Exports: `ExposedTables`, `ValidationMode`, `TableService`, `TableDescription`.
//! Role: Single boundary joining the exposed-table set, the CSV loader, and schemas.
//! Invariants: Only names in the exposed set are ever resolved to files.
//! Invariants: Every load reads the file from disk; nothing is cached.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::core::error::{Error, ErrorKind};
use crate::core::loader::{self, LoadedTable, Record};
use crate::core::schema::{FieldType, SchemaRegistry};
use crate::table_paths::{TableNameResolveError, check_table_name, resolve_table_path};

pub type ApiResult<T> = Result<T, Error>;

pub const DEFAULT_EXPOSED_TABLES: &str =
    "delivery_events,fuel_purchases,safety_incidents,maintenance_records";

/// The fixed, ordered set of table names served for the life of the process.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ExposedTables(Vec<String>);

impl ExposedTables {
    /// Parses a comma-separated list. Entries are trimmed, blanks dropped,
    /// and repeats collapsed to their first occurrence.
    pub fn parse(list: &str) -> ApiResult<Self> {
        let mut names: Vec<String> = Vec::new();
        for name in list.split(',').map(str::trim).filter(|name| !name.is_empty()) {
            check_table_name(name).map_err(|err| name_error(name, err))?;
            if !names.iter().any(|existing| existing == name) {
                names.push(name.to_string());
            }
        }
        if names.is_empty() {
            return Err(Error::new(ErrorKind::Usage)
                .with_message("no tables are exposed")
                .with_hint("Set EXPOSED_TABLES to a comma-separated list of table names."));
        }
        Ok(Self(names))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.iter().any(|exposed| exposed == name)
    }

    pub fn names(&self) -> &[String] {
        &self.0
    }
}

impl Default for ExposedTables {
    fn default() -> Self {
        Self(
            DEFAULT_EXPOSED_TABLES
                .split(',')
                .map(str::to_string)
                .collect(),
        )
    }
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum ValidationMode {
    #[default]
    Strict,
    Off,
}

#[derive(Clone, Debug, PartialEq)]
pub struct TableDescription {
    pub table: String,
    pub columns: Vec<(String, FieldType)>,
}

#[derive(Clone, Debug)]
pub struct TableService {
    data_dir: PathBuf,
    exposed: Arc<ExposedTables>,
    schemas: Arc<SchemaRegistry>,
    validation: ValidationMode,
}

impl TableService {
    pub fn new(data_dir: impl Into<PathBuf>, exposed: ExposedTables) -> Self {
        Self {
            data_dir: data_dir.into(),
            exposed: Arc::new(exposed),
            schemas: Arc::new(SchemaRegistry::builtin()),
            validation: ValidationMode::Strict,
        }
    }

    pub fn with_schemas(mut self, schemas: SchemaRegistry) -> Self {
        self.schemas = Arc::new(schemas);
        self
    }

    pub fn with_validation(mut self, validation: ValidationMode) -> Self {
        self.validation = validation;
        self
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn exposed(&self) -> &ExposedTables {
        &self.exposed
    }

    pub fn validation(&self) -> ValidationMode {
        self.validation
    }

    pub fn table_path(&self, table: &str) -> ApiResult<PathBuf> {
        if !self.exposed.contains(table) {
            return Err(Error::new(ErrorKind::NotExposed)
                .with_message(format!("table '{table}' is not exposed"))
                .with_table(table)
                .with_hint(format!("Exposed tables: {}", self.exposed.names().join(", "))));
        }
        resolve_table_path(table, &self.data_dir).map_err(|err| name_error(table, err))
    }

    /// Reads and, unless validation is off, coerces every row of `table`.
    pub fn load(&self, table: &str) -> ApiResult<LoadedTable> {
        let path = self.table_path(table)?;
        let mut loaded = loader::read_csv(table, &path)?;
        if self.validation == ValidationMode::Strict {
            self.schemas.check_header(table, &loaded.columns)?;
            let records = std::mem::take(&mut loaded.records);
            loaded.records = records
                .into_iter()
                .enumerate()
                .map(|(index, record)| self.schemas.validate(table, index as u64 + 1, record))
                .collect::<ApiResult<Vec<Record>>>()?;
        }
        tracing::info!(table, rows = loaded.len(), path = %path.display(), "loaded table");
        Ok(loaded)
    }

    pub fn records(&self, table: &str) -> ApiResult<Vec<Record>> {
        self.load(table).map(|loaded| loaded.records)
    }

    /// Column names from the file header, typed by the declared schema
    /// where one applies and `string` otherwise.
    pub fn describe(&self, table: &str) -> ApiResult<TableDescription> {
        let path = self.table_path(table)?;
        let loaded = loader::read_csv(table, &path)?;
        let schema = match self.validation {
            ValidationMode::Strict => self.schemas.get(table),
            ValidationMode::Off => None,
        };
        let columns = loaded
            .columns
            .into_iter()
            .map(|column| {
                let field_type = schema
                    .and_then(|schema| schema.get(&column))
                    .map_or(FieldType::String, |spec| spec.field_type);
                (column, field_type)
            })
            .collect();
        Ok(TableDescription {
            table: table.to_string(),
            columns,
        })
    }

    /// Names of the CSV files present in the data directory, sorted. A
    /// missing directory lists as empty.
    pub fn list_tables(&self) -> ApiResult<Vec<String>> {
        let entries = match std::fs::read_dir(&self.data_dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => {
                return Err(Error::new(ErrorKind::Io)
                    .with_message("failed to read data directory")
                    .with_path(&self.data_dir)
                    .with_source(err));
            }
        };

        let mut tables = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|err| {
                Error::new(ErrorKind::Io)
                    .with_message("failed to read data directory entry")
                    .with_path(&self.data_dir)
                    .with_source(err)
            })?;
            let path = entry.path();
            let is_csv = path
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"));
            if !is_csv || !path.is_file() {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|stem| stem.to_str()) {
                tables.push(stem.to_string());
            }
        }
        tables.sort();
        Ok(tables)
    }
}

fn name_error(name: &str, err: TableNameResolveError) -> Error {
    Error::new(ErrorKind::Usage)
        .with_message(err.message())
        .with_table(name)
}
