//! Parsing of configured times and durations, and the forecast step list.

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime};

use crate::errors::DtExtractErr;

const SECONDS_PER_DAY: i64 = 86_400;

/// Parse an ISO-8601 duration such as `PT6H`, `P1DT2H30M` or `P2D`.
///
/// Only days, hours, minutes and seconds are accepted; years and months have no fixed length.
pub fn parse_duration(text: &str) -> Result<Duration, DtExtractErr> {
    let invalid = || DtExtractErr::InvalidDuration(text.to_owned());

    let upper = text.trim().to_uppercase();
    let body = upper.strip_prefix('P').ok_or_else(invalid)?;
    if body.is_empty() {
        return Err(invalid());
    }

    let (date_part, time_part) = match body.split_once('T') {
        Some((_, "")) => return Err(invalid()),
        Some((date, time)) => (date, Some(time)),
        None => (body, None),
    };

    let mut seconds: i64 = 0;
    let mut accumulate = |part: &str, units: &[(char, i64)]| -> Result<(), DtExtractErr> {
        let mut number = String::new();
        for c in part.chars() {
            if c.is_ascii_digit() {
                number.push(c);
                continue;
            }

            let scale = units
                .iter()
                .find(|(unit, _)| *unit == c)
                .map(|(_, scale)| *scale)
                .ok_or_else(invalid)?;
            let value: i64 = number.parse().map_err(|_| invalid())?;
            seconds = value
                .checked_mul(scale)
                .and_then(|part| seconds.checked_add(part))
                .ok_or_else(invalid)?;
            number.clear();
        }

        if number.is_empty() {
            Ok(())
        } else {
            Err(invalid())
        }
    };

    accumulate(date_part, &[('W', 7 * SECONDS_PER_DAY), ('D', SECONDS_PER_DAY)])?;
    if let Some(time_part) = time_part {
        accumulate(time_part, &[('H', 3600), ('M', 60), ('S', 1)])?;
    }

    Duration::try_seconds(seconds).ok_or_else(invalid)
}

/// Split a non-negative duration the way a calendar delay is expressed: whole days and the
/// seconds left over.
pub fn days_and_seconds(duration: Duration) -> (i64, i64) {
    let total = duration.num_seconds();
    (
        total.div_euclid(SECONDS_PER_DAY),
        total.rem_euclid(SECONDS_PER_DAY),
    )
}

/// Parse a base time. Accepts RFC 3339 (`2024-03-05T00:00:00Z`), a naive `2024-03-05T00:00:00`,
/// `YYYYMMDDHH` or `YYYYMMDD`.
pub fn parse_basetime(text: &str) -> Result<NaiveDateTime, DtExtractErr> {
    let text = text.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Ok(dt.naive_utc());
    }

    if let Ok(dt) = NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S") {
        return Ok(dt);
    }

    let invalid = || DtExtractErr::Config(format!("invalid date/time: {}", text));
    if text.len() == 10 && text.chars().all(|c| c.is_ascii_digit()) {
        let date = NaiveDate::parse_from_str(&text[..8], "%Y%m%d")?;
        let hour: u32 = text[8..].parse().map_err(|_| invalid())?;
        return date.and_hms_opt(hour, 0, 0).ok_or_else(invalid);
    }

    let date = NaiveDate::parse_from_str(text, "%Y%m%d")?;
    date.and_hms_opt(0, 0, 0).ok_or_else(invalid)
}

/// The date of a time as the integer `YYYYMMDD` used by date repeats.
pub fn ymd(time: &NaiveDateTime) -> u32 {
    // Formatting a valid date always yields eight digits.
    time.format("%Y%m%d").to_string().parse().unwrap_or(0)
}

/// Hourly forecast steps from 0 to the end of the forecast range, inclusive.
pub fn step_list(forecast_range: Duration) -> Result<Vec<String>, DtExtractErr> {
    if forecast_range < Duration::zero() {
        return Err(DtExtractErr::InvalidDuration(format!(
            "negative forecast range: {}",
            forecast_range
        )));
    }

    let max_step = forecast_range.num_hours();
    Ok((0..=max_step).map(|step| step.to_string()).collect())
}

/*--------------------------------------------------------------------------------------------------
                                          Unit Tests
--------------------------------------------------------------------------------------------------*/
