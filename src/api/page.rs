//! Purpose: Offset/limit windows and date-range filtering over loaded records.
//! Exports: `PageRequest`, `Page`, `paginate`, `filter_by_date`, `DATE_COLUMNS`.
//! Role: Backs the paged `/api/<table>` endpoint; the plain table route never pages.
//! Invariants: `limit` is always within `1..=MAX_LIMIT`.
//! Invariants: Filtering keeps record order and never mutates records.

use serde::Serialize;
use serde_json::Value;

use crate::core::dates;
use crate::core::error::{Error, ErrorKind};
use crate::core::loader::Record;

pub const DEFAULT_LIMIT: usize = 1000;
pub const MAX_LIMIT: usize = 5000;

/// Columns tried, in order, when a date window is requested.
pub const DATE_COLUMNS: &[&str] = &[
    "load_date",
    "dispatch_date",
    "purchase_date",
    "incident_date",
    "maintenance_date",
    "month",
    "scheduled_datetime",
    "actual_datetime",
    "event_date",
    "created_at",
    "updated_at",
];

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct PageRequest {
    pub offset: usize,
    pub limit: Option<usize>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

impl PageRequest {
    pub fn limit(&self) -> Result<usize, Error> {
        let limit = self.limit.unwrap_or(DEFAULT_LIMIT);
        if limit == 0 || limit > MAX_LIMIT {
            return Err(Error::new(ErrorKind::Usage)
                .with_message(format!("limit must be between 1 and {MAX_LIMIT}"))
                .with_hint(format!("Use limit <= {MAX_LIMIT} and page with offset.")));
        }
        Ok(limit)
    }

    fn has_window(&self) -> bool {
        self.start_date.is_some() || self.end_date.is_some()
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Page {
    pub table: String,
    pub offset: usize,
    pub limit: usize,
    pub returned: usize,
    pub total_available: usize,
    pub has_more: bool,
    pub data: Vec<Record>,
}

pub fn paginate(table: &str, records: Vec<Record>, request: &PageRequest) -> Result<Page, Error> {
    let limit = request.limit()?;
    let records = if request.has_window() {
        filter_by_date(
            records,
            request.start_date.as_deref(),
            request.end_date.as_deref(),
        )
    } else {
        records
    };

    let total_available = records.len();
    let data: Vec<Record> = records
        .into_iter()
        .skip(request.offset)
        .take(limit)
        .collect();
    Ok(Page {
        table: table.to_string(),
        offset: request.offset,
        limit,
        returned: data.len(),
        total_available,
        has_more: request.offset.saturating_add(limit) < total_available,
        data,
    })
}

/// Keeps records whose first date-like column falls inside `[start, end]`.
/// Unparsable bounds are ignored; rows whose value does not parse are
/// dropped once any bound applies. Tables with no date-like column are
/// returned unchanged.
pub fn filter_by_date(records: Vec<Record>, start: Option<&str>, end: Option<&str>) -> Vec<Record> {
    let Some(column) = records
        .first()
        .and_then(|first| {
            DATE_COLUMNS
                .iter()
                .copied()
                .find(|column| first.contains_key(*column))
        })
    else {
        return records;
    };

    let start = parse_bound("start_date", start);
    let end = parse_bound("end_date", end);
    if start.is_none() && end.is_none() {
        return records;
    }

    let before = records.len();
    let kept: Vec<Record> = records
        .into_iter()
        .filter(|record| {
            let Some(value) = record
                .get(column)
                .and_then(Value::as_str)
                .and_then(dates::parse_datetime)
            else {
                return false;
            };
            start.is_none_or(|start| value >= start) && end.is_none_or(|end| value <= end)
        })
        .collect();
    tracing::info!(column, before, after = kept.len(), "filtered by date");
    kept
}

fn parse_bound(name: &str, raw: Option<&str>) -> Option<time::PrimitiveDateTime> {
    let raw = raw?;
    let parsed = dates::parse_datetime(raw);
    if parsed.is_none() {
        tracing::warn!(bound = name, value = raw, "ignoring unparsable date bound");
    }
    parsed
}
