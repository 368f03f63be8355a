//! Query window flags.

use anyhow::{anyhow, bail, Context, Result};
use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, Utc};
use shared::backend::TimeWindow;

/// Layouts accepted without an offset, read as UTC.
const NAIVE_FORMATS: [&str; 3] = ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M"];

/// Parses one absolute instant.
///
/// Accepts RFC 3339, `YYYY-MM-DDTHH:MM:SS`, `YYYY-MM-DD HH:MM:SS`,
/// `YYYY-MM-DD HH:MM` and `YYYY-MM-DD` (midnight).
///
/// # Errors
///
/// Returns an error if no layout matches.
pub fn parse_instant(value: &str) -> Result<DateTime<Utc>> {
    if let Ok(t) = DateTime::parse_from_rfc3339(value) {
        return Ok(t.with_timezone(&Utc));
    }
    for format in NAIVE_FORMATS {
        if let Ok(t) = NaiveDateTime::parse_from_str(value, format) {
            return Ok(t.and_utc());
        }
    }
    if let Ok(d) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        if let Some(t) = d.and_hms_opt(0, 0, 0) {
            return Ok(t.and_utc());
        }
    }
    bail!(
        "unable to parse time '{value}'. Supported formats: RFC3339 (2024-01-15T10:00:00Z), \
         ISO8601 (2024-01-15T10:00:00), date only (2024-01-15)"
    )
}

/// Parses a `from,to` pair.
///
/// # Errors
///
/// Returns an error if the value is not two comma separated instants or the
/// window does not start before it ends.
pub fn parse_time_range(value: &str) -> Result<TimeWindow> {
    let (from, to) = value
        .split_once(',')
        .ok_or_else(|| anyhow!("time range must be in format 'from,to', got: {value}"))?;
    let (from, to) = (from.trim(), to.trim());
    if to.contains(',') {
        bail!("time range must be in format 'from,to', got: {value}");
    }

    let start = parse_instant(from).with_context(|| format!("invalid start time '{from}'"))?;
    let end = parse_instant(to).with_context(|| format!("invalid end time '{to}'"))?;
    Ok(TimeWindow::new(start, end)?)
}

/// Parses a relative duration such as `45s`, `30m`, `2h` or `7d`.
///
/// # Errors
///
/// Returns an error if the amount or the unit is invalid.
pub fn parse_since(value: &str) -> Result<Duration> {
    let value = value.trim();
    let split = value
        .find(|c: char| !c.is_ascii_digit())
        .ok_or_else(|| anyhow!("duration '{value}' needs a unit (s, m, h, d)"))?;
    let (amount, unit) = value.split_at(split);
    let amount: i64 = amount
        .parse()
        .with_context(|| format!("invalid duration '{value}'"))?;

    let duration = match unit {
        "s" => Duration::try_seconds(amount),
        "m" => Duration::try_minutes(amount),
        "h" => Duration::try_hours(amount),
        "d" => Duration::try_days(amount),
        _ => bail!("unknown duration unit '{unit}' in '{value}' (use s, m, h or d)"),
    };
    duration.ok_or_else(|| anyhow!("duration '{value}' is out of range"))
}

/// Resolves the query window from the `--time-range` and `--since` flags.
///
/// Defaults to the last hour when neither is given.
///
/// # Errors
///
/// Returns an error if a flag cannot be parsed or the window is empty.
pub fn resolve_window(time_range: Option<&str>, since: Option<&str>) -> Result<TimeWindow> {
    if let Some(range) = time_range.filter(|r| !r.trim().is_empty()) {
        return parse_time_range(range);
    }
    let lookback = match since {
        Some(since) => parse_since(since)?,
        None => Duration::hours(1),
    };
    Ok(TimeWindow::last(lookback)?)
}
