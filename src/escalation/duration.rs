//! ISO-8601 duration parsing for escalation rule timeouts.

use regex::Regex;
use std::sync::OnceLock;
use tracing::warn;

const FALLBACK_MS: i64 = 3_600_000;

fn pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^P(?:(\d+)D)?(?:T(?:(\d+)H)?(?:(\d+)M)?(?:(\d+)S)?)?$").expect("static regex")
    })
}

/// Parses `P[nD][T[nH][nM][nS]]` into milliseconds. Missing components
/// default to 0. On anything that fails to match — including an empty
/// string or a bare `"P"`/`"PT"` with nothing after it and no digits at
/// all — falls back to one hour and logs a warning; this parser never
/// fails the caller.
pub fn parse_duration_ms(input: &str) -> i64 {
    let Some(captures) = pattern().captures(input) else {
        warn!(duration = input, "malformed ISO-8601 duration, defaulting to 1h");
        return FALLBACK_MS;
    };

    let has_any_component = (1..=4).any(|i| captures.get(i).is_some());
    if !has_any_component {
        warn!(duration = input, "empty ISO-8601 duration, defaulting to 1h");
        return FALLBACK_MS;
    }

    let days: i64 = component(&captures, 1);
    let hours: i64 = component(&captures, 2);
    let minutes: i64 = component(&captures, 3);
    let seconds: i64 = component(&captures, 4);

    (((days * 24 + hours) * 60 + minutes) * 60 + seconds) * 1_000
}

fn component(captures: &regex::Captures, index: usize) -> i64 {
    captures
        .get(index)
        .map(|m| m.as_str().parse().unwrap_or(0))
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_hours() {
        assert_eq!(parse_duration_ms("PT1H"), 3_600_000);
    }

    #[test]
    fn test_parse_minutes() {
        assert_eq!(parse_duration_ms("PT30M"), 1_800_000);
    }

    #[test]
    fn test_parse_combined() {
        assert_eq!(parse_duration_ms("P1DT2H30M15S"), 95_415_000);
    }

    #[test]
    fn test_malformed_falls_back_to_one_hour() {
        assert_eq!(parse_duration_ms("not-a-duration"), FALLBACK_MS);
    }

    #[test]
    fn test_empty_falls_back_to_one_hour() {
        assert_eq!(parse_duration_ms("PT"), FALLBACK_MS);
        assert_eq!(parse_duration_ms("P"), FALLBACK_MS);
    }
}
