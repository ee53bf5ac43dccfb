//! Turn a raw dataset into an aligned `(t, cases)` series.
//!
//! Column selection is either explicit or auto-detected:
//! - date column: first non-numeric column (natural order) whose non-empty
//!   cells all parse as dates. Integer and float columns never qualify, so a
//!   leading numeric id column is not mistaken for epoch timestamps.
//! - case column: last column declared `Int` or `Float`
//!
//! Accepted cells: ISO dates and date-times (minute or second precision,
//! optional fractional seconds), RFC 3339 values with `Z` or an offset (kept
//! as written, offset dropped), `dd/mm/yyyy`, `mm/dd/yyyy` and month names
//! such as `Jan 5, 2024` or `5 January 2024`.
//!
//! Cells like `01/02/2024` are ambiguous. Each column is read with one order:
//! day-first when every cell parses that way, otherwise month-first if that
//! parses more cells.
//!
//! Rows whose date does not parse are dropped, the rest are sorted by date
//! (stable) and re-indexed from 0.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use thiserror::Error;
use tracing::debug;

use super::table::{Column, Dataset};
use crate::domain::ObservationSeries;

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
];
const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%B %d, %Y",
    "%B %d %Y",
    "%d %B %Y",
    "%d-%B-%Y",
];
const DAY_FIRST_FORMATS: &[&str] = &["%d/%m/%Y", "%d-%m-%Y", "%d.%m.%Y"];
const MONTH_FIRST_FORMATS: &[&str] = &["%m/%d/%Y", "%m-%d-%Y"];

/// How to read numeric dates whose first two fields could be either day or month.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DayOrder {
    DayFirst,
    MonthFirst,
}

impl DayOrder {
    fn formats(self) -> &'static [&'static str] {
        match self {
            DayOrder::DayFirst => DAY_FIRST_FORMATS,
            DayOrder::MonthFirst => MONTH_FIRST_FORMATS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum PrepareError {
    #[error("no date column found")]
    NoDateColumnFound,
    #[error("no numeric case column found")]
    NoNumericColumnFound,
    #[error("column `{0}` does not exist")]
    UnknownColumn(String),
    #[error("row {row}: `{value}` in column `{column}` is not a non-negative case count")]
    InvalidCaseValue {
        row: usize,
        column: String,
        value: String,
    },
    #[error("no rows with a parseable date")]
    NoRows,
}

/// Parse a single date cell, day-first when ambiguous. Plain dates map to midnight.
pub fn parse_date(raw: &str) -> Option<NaiveDateTime> {
    parse_date_with(raw, DayOrder::DayFirst).or_else(|| parse_date_with(raw, DayOrder::MonthFirst))
}

/// Parse a single date cell reading ambiguous numeric dates in `order`.
pub fn parse_date_with(raw: &str, order: DayOrder) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .or_else(|| DateTime::parse_from_rfc3339(raw).ok().map(|dt| dt.naive_local()))
        .or_else(|| {
            DATE_FORMATS
                .iter()
                .chain(order.formats())
                .find_map(|fmt| NaiveDate::parse_from_str(raw, fmt).ok())
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

/// Pick the day order for a column and count the cells it parses.
fn column_day_order(col: &Column) -> (DayOrder, usize) {
    let parsed = |order| {
        col.cells
            .iter()
            .flatten()
            .filter(|v| parse_date_with(v, order).is_some())
            .count()
    };
    let day_first = parsed(DayOrder::DayFirst);
    let month_first = parsed(DayOrder::MonthFirst);
    if month_first > day_first {
        (DayOrder::MonthFirst, month_first)
    } else {
        (DayOrder::DayFirst, day_first)
    }
}

fn is_date_column(col: &Column) -> bool {
    if col.dtype.is_numeric() {
        return false;
    }
    let non_empty = col.cells.iter().flatten().count();
    non_empty > 0 && column_day_order(col).1 == non_empty
}

fn lookup<'a>(dataset: &'a Dataset, name: &str) -> Result<&'a Column, PrepareError> {
    dataset
        .column(name)
        .ok_or_else(|| PrepareError::UnknownColumn(name.to_string()))
}

fn detect_date_column(dataset: &Dataset) -> Result<&Column, PrepareError> {
    dataset
        .columns()
        .iter()
        .find(|c| is_date_column(c))
        .ok_or(PrepareError::NoDateColumnFound)
}

fn detect_case_column(dataset: &Dataset) -> Result<&Column, PrepareError> {
    dataset
        .columns()
        .iter()
        .rev()
        .find(|c| c.dtype.is_numeric())
        .ok_or(PrepareError::NoNumericColumnFound)
}

fn parse_case(col: &Column, row: usize) -> Result<f64, PrepareError> {
    let raw = col.get(row).unwrap_or("");
    match raw.parse::<f64>() {
        Ok(v) if v.is_finite() && v >= 0.0 => Ok(v),
        _ => Err(PrepareError::InvalidCaseValue {
            row,
            column: col.name.clone(),
            value: raw.to_string(),
        }),
    }
}

/// Build the observation series. Explicit column names are used as given;
/// a `None` is auto-detected independently of the other.
pub fn prepare(
    dataset: &Dataset,
    date_col: Option<&str>,
    case_col: Option<&str>,
) -> Result<ObservationSeries, PrepareError> {
    let dates = match date_col {
        Some(name) => lookup(dataset, name)?,
        None => detect_date_column(dataset)?,
    };
    let cases = match case_col {
        Some(name) => lookup(dataset, name)?,
        None => detect_case_column(dataset)?,
    };
    let (order, _) = column_day_order(dates);
    debug!(date_col = %dates.name, case_col = %cases.name, ?order, "columns selected");

    let mut rows: Vec<(NaiveDateTime, f64)> = Vec::with_capacity(dataset.n_rows());
    for row in 0..dataset.n_rows() {
        let Some(date) = dates.get(row).and_then(|raw| parse_date_with(raw, order)) else {
            continue;
        };
        rows.push((date, parse_case(cases, row)?));
    }
    if rows.is_empty() {
        return Err(PrepareError::NoRows);
    }
    let dropped = dataset.n_rows() - rows.len();
    if dropped > 0 {
        debug!(dropped, "dropped rows without a parseable date");
    }

    rows.sort_by_key(|(date, _)| *date);

    Ok(ObservationSeries {
        t: (0..rows.len()).collect(),
        cases: rows.iter().map(|(_, c)| *c).collect(),
        dates: rows.iter().map(|(d, _)| *d).collect(),
        date_col: dates.name.clone(),
        case_col: cases.name.clone(),
    })
}
