use anyhow::{anyhow, bail, Result};
use chrono::{Local, NaiveDate, NaiveTime};

/// Resolve the weekday used for timetable lookup, either from the real clock
/// or from a caller-supplied simulated time.
///
/// Accepted override shapes (after normalizing `+` to space, so URL-encoded
/// query values pass through unchanged):
/// - `YYYY-MM-DD` (exactly 10 characters) — weekday of that calendar date
/// - `<Weekday> HH:MM` — the weekday token title-cased verbatim; the time
///   must be a valid 24-hour `HH:MM` but is not otherwise used
pub fn resolve_weekday(fake_time: Option<&str>) -> Result<String> {
    let Some(raw) = fake_time else {
        return Ok(Local::now().format("%A").to_string());
    };

    let cleaned = raw.replace('+', " ");

    if cleaned.contains('-') && cleaned.len() == 10 {
        let date = NaiveDate::parse_from_str(&cleaned, "%Y-%m-%d")
            .map_err(|_| anyhow!("invalid date in fake time, expected YYYY-MM-DD"))?;
        return Ok(date.format("%A").to_string());
    }

    let parts: Vec<&str> = cleaned.split(' ').collect();
    if parts.len() != 2 {
        bail!("fake time must be 'Friday HH:MM' or 'YYYY-MM-DD'");
    }

    NaiveTime::parse_from_str(parts[1], "%H:%M")
        .map_err(|_| anyhow!("invalid time in fake time, expected HH:MM"))?;

    Ok(title_case(parts[0]))
}

/// Resolve an optional `YYYY-MM-DD` parameter to the canonical zero-padded
/// form, defaulting to today's local date. Every attendance operation keys
/// its rows on the string this returns.
pub fn resolve_date(date: Option<&str>) -> Result<String> {
    match date {
        Some(raw) => {
            let parsed = NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
                .map_err(|_| anyhow!("invalid date, expected YYYY-MM-DD"))?;
            Ok(parsed.format("%Y-%m-%d").to_string())
        }
        None => Ok(Local::now().format("%Y-%m-%d").to_string()),
    }
}

fn title_case(token: &str) -> String {
    let lower = token.to_lowercase();
    let mut chars = lower.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => lower,
    }
}
