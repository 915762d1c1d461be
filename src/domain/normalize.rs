//! Normalization of numeric and date tokens coming from forms and broker files.
//!
//! Everything that enters the ledger passes through here first, so the store
//! only ever sees canonical decimals and UTC timestamps.

use chrono::{DateTime, Duration, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use thiserror::Error;
use tracing::warn;

use super::Decimal;

/// Accepts `YYYY-MM-DD HH:MM:SS` with optional fractional seconds.
const DATE_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

/// Flat tolerance for the close guard (1e-16).
pub fn flat_tolerance() -> Decimal {
    Decimal::from_parts(1, 16)
}

/// Amounts are stored with at most 16 integer digits.
const MAX_INTEGER_DIGITS: u32 = 16;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum NormalizeError {
    #[error("invalid number {0:?}")]
    InvalidNumber(String),
    #[error("number {0:?} exceeds 16 integer digits")]
    OutOfRange(String),
    #[error("invalid date {0:?}")]
    InvalidDate(String),
    #[error("date {0:?} does not exist in timezone {1}")]
    NonexistentLocalTime(String, String),
}

/// Clean a numeric token from a broker export.
///
/// Blank, `--` and `-` mean zero; thousands separators and a leading `+` are
/// dropped.
pub fn normalize_csv_decimal(raw: &str) -> String {
    let value = raw.trim();
    if value.is_empty() || value == "--" || value == "-" {
        return "0".to_string();
    }
    let cleaned = value.replace(',', "");
    let cleaned = cleaned.strip_prefix('+').unwrap_or(cleaned.as_str());
    if cleaned.is_empty() || cleaned == "-" {
        return "0".to_string();
    }
    cleaned.to_string()
}

/// Reject magnitudes of `10^16` and above.
fn within_range(value: Decimal, raw: &str) -> Result<Decimal, NormalizeError> {
    let limit = Decimal::from(10i64.pow(MAX_INTEGER_DIGITS));
    if value.abs() >= limit {
        return Err(NormalizeError::OutOfRange(raw.to_string()));
    }
    Ok(value)
}

/// Normalize and parse a numeric token from a broker export.
pub fn parse_csv_decimal(raw: &str) -> Result<Decimal, NormalizeError> {
    let cleaned = normalize_csv_decimal(raw);
    let value = Decimal::from_str_canonical(&cleaned)
        .map_err(|_| NormalizeError::InvalidNumber(raw.to_string()))?;
    within_range(value, raw)
}

/// Parse a numeric form field. Blank input is `None` so callers can report
/// which required field is missing.
pub fn parse_form_decimal(raw: Option<&str>) -> Result<Option<Decimal>, NormalizeError> {
    match raw.map(str::trim) {
        None | Some("") => Ok(None),
        Some(value) => {
            let parsed = Decimal::from_str_canonical(value)
                .map_err(|_| NormalizeError::InvalidNumber(value.to_string()))?;
            within_range(parsed, value).map(Some)
        }
    }
}

/// Parse a broker timestamp that is already expressed in UTC.
pub fn parse_csv_datetime_utc(raw: &str) -> Result<DateTime<Utc>, NormalizeError> {
    let value = raw.trim();
    NaiveDateTime::parse_from_str(value, DATE_TIME_FORMAT)
        .map(|naive| naive.and_utc())
        .map_err(|_| NormalizeError::InvalidDate(value.to_string()))
}

/// Resolve an IANA timezone name. Unknown or empty names fall back to UTC.
pub fn resolve_timezone(name: &str) -> Tz {
    let name = name.trim();
    match name.parse::<Tz>() {
        Ok(tz) => tz,
        Err(_) => {
            if !name.is_empty() {
                warn!(timezone = %name, "Unknown timezone, falling back to UTC");
            }
            Tz::UTC
        }
    }
}

/// Interpret a local wall-clock date in the caller's timezone and convert it
/// to UTC. Ambiguous times (DST fold) resolve to the earlier instant.
pub fn parse_local_datetime(value: &str, timezone: &str) -> Result<DateTime<Utc>, NormalizeError> {
    let value = value.trim();
    let naive = NaiveDateTime::parse_from_str(value, DATE_TIME_FORMAT)
        .map_err(|_| NormalizeError::InvalidDate(value.to_string()))?;
    let tz = resolve_timezone(timezone);
    tz.from_local_datetime(&naive)
        .earliest()
        .map(|local| local.with_timezone(&Utc))
        .ok_or_else(|| NormalizeError::NonexistentLocalTime(value.to_string(), tz.name().to_string()))
}

/// Upper bound of an import window. A bound given to the whole second covers
/// the full second, so `12:00:00` admits rows stamped `12:00:00.999`.
pub fn parse_window_stop(value: &str, timezone: &str) -> Result<DateTime<Utc>, NormalizeError> {
    let stop = parse_local_datetime(value, timezone)?;
    if value.contains('.') {
        Ok(stop)
    } else {
        Ok(stop + Duration::milliseconds(999))
    }
}
