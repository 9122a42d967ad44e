// CSV file to ordered JSON records; the file is read on every call.
// The header row fixes the column set: every record carries exactly those keys.
use std::fs::File;
use std::path::Path;

use csv::{ReaderBuilder, StringRecord, Trim};
use serde_json::{Map, Value};

use crate::core::error::{Error, ErrorKind};

pub type Record = Map<String, Value>;

#[derive(Clone, Debug, Default, PartialEq)]
pub struct LoadedTable {
    pub columns: Vec<String>,
    pub records: Vec<Record>,
}

impl LoadedTable {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

pub fn read_csv(table: &str, path: &Path) -> Result<LoadedTable, Error> {
    let file = File::open(path).map_err(|err| {
        let kind = match err.kind() {
            std::io::ErrorKind::NotFound => ErrorKind::FileNotFound,
            _ => ErrorKind::Io,
        };
        Error::new(kind)
            .with_message("failed to open table file")
            .with_table(table)
            .with_path(path)
            .with_source(err)
    })?;

    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(false)
        .trim(Trim::All)
        .from_reader(file);

    let columns = read_header(table, path, &mut reader)?;

    let mut records = Vec::new();
    for (index, result) in reader.records().enumerate() {
        let row = index as u64 + 1;
        let record = result.map_err(|err| csv_error(table, path, row, err))?;
        records.push(to_record(&columns, &record));
    }

    tracing::debug!(table, rows = records.len(), path = %path.display(), "read csv");
    Ok(LoadedTable { columns, records })
}

fn read_header(
    table: &str,
    path: &Path,
    reader: &mut csv::Reader<File>,
) -> Result<Vec<String>, Error> {
    let header = reader.headers().map_err(|err| csv_error(table, path, 0, err))?;
    if header.is_empty() {
        return Err(parse_error(table, path).with_message("missing header row"));
    }

    let mut columns: Vec<String> = Vec::with_capacity(header.len());
    for (position, name) in header.iter().enumerate() {
        if name.is_empty() {
            return Err(parse_error(table, path)
                .with_message(format!("header column {} is empty", position + 1)));
        }
        if columns.iter().any(|existing| existing == name) {
            return Err(parse_error(table, path)
                .with_message("duplicate header column")
                .with_field(name));
        }
        columns.push(name.to_string());
    }
    Ok(columns)
}

fn to_record(columns: &[String], record: &StringRecord) -> Record {
    columns
        .iter()
        .zip(record.iter())
        .map(|(column, cell)| {
            let value = if cell.is_empty() {
                Value::Null
            } else {
                Value::String(cell.to_string())
            };
            (column.clone(), value)
        })
        .collect()
}

fn parse_error(table: &str, path: &Path) -> Error {
    Error::new(ErrorKind::Parse)
        .with_table(table)
        .with_path(path)
}

fn csv_error(table: &str, path: &Path, row: u64, err: csv::Error) -> Error {
    let message = match err.kind() {
        csv::ErrorKind::UnequalLengths {
            expected_len, len, ..
        } => format!("row has {len} columns, header has {expected_len}"),
        csv::ErrorKind::Utf8 { .. } => "row is not valid UTF-8".to_string(),
        csv::ErrorKind::Io(_) => {
            return Error::new(ErrorKind::Io)
                .with_message("failed to read table file")
                .with_table(table)
                .with_path(path)
                .with_source(err);
        }
        _ => "malformed csv".to_string(),
    };
    let mut out = parse_error(table, path).with_message(message);
    if row > 0 {
        out = out.with_row(row);
    }
    out.with_source(err)
}
