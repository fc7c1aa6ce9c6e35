//! Day-ahead payload → flat interval rows.
//!
//! A payload is parsed in two steps: the day header (`deliveryDateCET`,
//! `updatedAt`, `currency`, `resolutionInMinutes`) once, then every entry of
//! `multiIndexEntries`. A missing or unreadable delivery date drops the whole
//! day; a bad entry drops only itself.

use crate::models::regions::{self, REGION_COUNT};
use crate::models::{DayHeader, IntervalRow};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, error, info, warn};

/// Why a single interval entry was skipped.
#[derive(Debug, Error)]
pub enum EntryError {
    #[error("entry is not a JSON object")]
    NotAnObject,

    #[error("missing field `{0}`")]
    MissingField(&'static str),

    #[error("invalid timestamp {value:?} in `{field}`: {source}")]
    BadTimestamp {
        field: &'static str,
        value: String,
        #[source]
        source: chrono::ParseError,
    },

    #[error("interval ends at {end} but starts at {start}")]
    EmptyInterval {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
}

/// Flatten one day's payload. `None` or a payload without a usable
/// `deliveryDateCET` yields no rows.
pub fn parse_day(payload: Option<&Value>) -> Vec<IntervalRow> {
    let Some(data) = payload else {
        warn!("No payload to parse");
        return vec![];
    };

    let Some(header) = parse_header(data) else {
        warn!("No delivery_date found in API response");
        return vec![];
    };

    let Some(entries) = data.get("multiIndexEntries").and_then(Value::as_array) else {
        warn!("{}: response has no multiIndexEntries", header.delivery_date);
        return vec![];
    };

    let mut rows = Vec::with_capacity(entries.len());
    for (i, entry) in entries.iter().enumerate() {
        match parse_entry(&header, entry) {
            Ok(row) => rows.push(row),
            Err(e) => error!("{}: skipping entry {}: {}", header.delivery_date, i, e),
        }
    }

    info!("Parsed {} intervals for {}", rows.len(), header.delivery_date);
    rows
}

fn parse_header(data: &Value) -> Option<DayHeader> {
    let delivery_date = data
        .get("deliveryDateCET")
        .and_then(Value::as_str)
        .and_then(parse_date)?;

    let updated_at = data
        .get("updatedAt")
        .and_then(Value::as_str)
        .and_then(|s| parse_timestamp(s).ok());
    if updated_at.is_none() {
        debug!("{}: no usable updatedAt", delivery_date);
    }

    let resolution = data
        .get("resolutionInMinutes")
        .and_then(Value::as_i64)
        .and_then(|r| i32::try_from(r).ok())
        .unwrap_or(0);

    Some(DayHeader {
        delivery_date,
        updated_at,
        currency: data.get("currency").and_then(Value::as_str).map(str::to_owned),
        resolution,
    })
}

fn parse_entry(header: &DayHeader, entry: &Value) -> Result<IntervalRow, EntryError> {
    let entry = entry.as_object().ok_or(EntryError::NotAnObject)?;

    let start_time = timestamp_field(entry, "deliveryStart")?;
    let end_time = timestamp_field(entry, "deliveryEnd")?;
    if end_time <= start_time {
        return Err(EntryError::EmptyInterval {
            start: start_time,
            end: end_time,
        });
    }

    let mut prices = [None; REGION_COUNT];
    if let Some(areas) = entry.get("entryPerArea").and_then(Value::as_object) {
        for (region, price) in areas {
            match regions::position(region) {
                Some(i) => prices[i] = price.as_f64(),
                None => debug!("Ignoring unrequested region {}", region),
            }
        }
    }

    Ok(header.row(start_time, end_time, prices))
}

fn timestamp_field(
    entry: &serde_json::Map<String, Value>,
    field: &'static str,
) -> Result<DateTime<Utc>, EntryError> {
    let raw = entry
        .get(field)
        .and_then(Value::as_str)
        .ok_or(EntryError::MissingField(field))?;

    parse_timestamp(raw).map_err(|source| EntryError::BadTimestamp {
        field,
        value: raw.to_string(),
        source,
    })
}

// ── Scalar parsers ────────────────────────────────────────────────────────────

/// RFC 3339 ("2025-08-01T22:00:00Z", "…+02:00") or a naive ISO timestamp,
/// which is taken as UTC.
pub fn parse_timestamp(s: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    let s = s.trim();
    match DateTime::parse_from_rfc3339(s) {
        Ok(dt) => Ok(dt.with_timezone(&Utc)),
        Err(e) => NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
            .map(|naive| naive.and_utc())
            .map_err(|_| e),
    }
}

/// "2025-08-01", or the date part of a full timestamp.
pub fn parse_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .or_else(|| parse_timestamp(s).ok().map(|dt| dt.date_naive()))
}
