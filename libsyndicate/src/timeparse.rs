//! Parsing of human-readable schedule times
//!
//! The CLI accepts relative durations ("30m", "2h"), natural language
//! ("tomorrow", "next friday 10am"), and absolute timestamps
//! ("2026-09-01 15:00").

use chrono::{DateTime, Duration, Utc};

use crate::error::{Result, SyndicateError};

/// Parse a schedule string into a UTC time
///
/// # Errors
///
/// Returns `Validation` if the string is empty or matches no supported
/// format. Whether the result lies in the future is the caller's check,
/// against its own clock.
pub fn parse_schedule(input: &str) -> Result<DateTime<Utc>> {
    if input.is_empty() {
        return Err(SyndicateError::Validation(
            "schedule string cannot be empty".to_string(),
        ));
    }

    if let Ok(duration) = parse_duration(input) {
        return Ok(Utc::now() + duration);
    }

    if let Ok(dt) = parse_natural_language(input) {
        return Ok(dt);
    }

    Err(SyndicateError::Validation(format!(
        "could not parse schedule string: {}",
        input
    )))
}

/// Parse a duration string like "1h" or "45 min"
fn parse_duration(input: &str) -> Result<Duration> {
    if let Ok(std_duration) = humantime::parse_duration(input) {
        let seconds = std_duration.as_secs() as i64;
        return Duration::try_seconds(seconds)
            .ok_or_else(|| SyndicateError::Validation("duration out of range".to_string()));
    }

    Err(SyndicateError::Validation(format!(
        "could not parse duration: {}",
        input
    )))
}

/// Parse natural language and absolute time expressions
fn parse_natural_language(input: &str) -> Result<DateTime<Utc>> {
    chrono_english::parse_date_string(input, Utc::now(), chrono_english::Dialect::Us)
        .map_err(|e| SyndicateError::Validation(format!("could not parse time: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_duration_minutes() {
        let scheduled = parse_schedule("30m").unwrap();
        let diff = (scheduled - Utc::now()).num_minutes();
        assert!(diff >= 29 && diff <= 31, "Expected ~30 minutes, got {}", diff);
    }

    #[test]
    fn test_parse_duration_hours() {
        let scheduled = parse_schedule("2h").unwrap();
        let diff = (scheduled - Utc::now()).num_minutes();
        assert!(diff >= 119 && diff <= 121, "Expected ~120 minutes, got {}", diff);
    }

    #[test]
    fn test_parse_duration_days() {
        let scheduled = parse_schedule("1d").unwrap();
        let diff = (scheduled - Utc::now()).num_hours();
        assert!(diff >= 23 && diff <= 25, "Expected ~24 hours, got {}", diff);
    }

    #[test]
    fn test_parse_duration_with_space() {
        let scheduled = parse_schedule("1 hour").unwrap();
        let diff = (scheduled - Utc::now()).num_minutes();
        assert!(diff >= 59 && diff <= 61, "Expected ~60 minutes, got {}", diff);
    }

    #[test]
    fn test_parse_tomorrow() {
        let scheduled = parse_schedule("tomorrow").unwrap();
        let diff = (scheduled - Utc::now()).num_hours();
        assert!(diff >= 20 && diff <= 28, "Expected ~24 hours, got {}", diff);
    }

    #[test]
    fn test_parse_absolute_date() {
        let scheduled = parse_schedule("2030-06-01 15:00").unwrap();
        assert_eq!(scheduled.timestamp(), 1906815600);
    }

    #[test]
    fn test_parse_empty_string() {
        assert!(parse_schedule("").is_err());
    }

    #[test]
    fn test_parse_invalid_format() {
        assert!(parse_schedule("not a time").is_err());
    }
}
