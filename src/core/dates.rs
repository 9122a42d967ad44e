// Date and datetime parsing for CSV cells and query bounds.
// Accepted inputs are a small fixed set; everything is normalized to naive UTC.
use time::format_description::BorrowedFormatItem;
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::parsing::Parsed;
use time::{Date, OffsetDateTime, PrimitiveDateTime, Time, UtcOffset};

const DATE: &[BorrowedFormatItem<'static>] = format_description!("[year]-[month]-[day]");
const DATETIME_T: &[BorrowedFormatItem<'static>] =
    format_description!("[year]-[month]-[day]T[hour]:[minute]:[second][optional [.[subsecond]]]");
const DATETIME_SPACE: &[BorrowedFormatItem<'static>] =
    format_description!("[year]-[month]-[day] [hour]:[minute]:[second][optional [.[subsecond]]]");
const MONTH: &[BorrowedFormatItem<'static>] = format_description!("[year]-[month]");
const DATETIME_OUT: &[BorrowedFormatItem<'static>] =
    format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]");

pub fn parse_datetime(input: &str) -> Option<PrimitiveDateTime> {
    let input = input.trim();
    if let Ok(value) = OffsetDateTime::parse(input, &Rfc3339) {
        let utc = value.to_offset(UtcOffset::UTC);
        return Some(PrimitiveDateTime::new(utc.date(), utc.time()));
    }
    if let Ok(value) = PrimitiveDateTime::parse(input, DATETIME_T) {
        return Some(value);
    }
    if let Ok(value) = PrimitiveDateTime::parse(input, DATETIME_SPACE) {
        return Some(value);
    }
    Date::parse(input, DATE)
        .ok()
        .or_else(|| parse_month(input))
        .map(|date| PrimitiveDateTime::new(date, Time::MIDNIGHT))
}

/// `YYYY-MM` reads as the first day of that month.
fn parse_month(input: &str) -> Option<Date> {
    let mut parsed = Parsed::new();
    let rest = parsed.parse_items(input.as_bytes(), MONTH).ok()?;
    if !rest.is_empty() {
        return None;
    }
    Date::from_calendar_date(parsed.year()?, parsed.month()?, 1).ok()
}

pub fn parse_date(input: &str) -> Option<Date> {
    let input = input.trim();
    Date::parse(input, DATE)
        .ok()
        .or_else(|| parse_datetime(input).map(|value| value.date()))
}

pub fn format_datetime(value: PrimitiveDateTime) -> Option<String> {
    value.format(DATETIME_OUT).ok()
}

pub fn format_date(value: Date) -> Option<String> {
    value.format(DATE).ok()
}
