// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Shared helpers for date/time formatting.

use chrono::{DateTime, DurationRound, SecondsFormat, TimeDelta, Utc};

/// Format a UTC timestamp as RFC3339 using a `Z` suffix.
pub fn format_utc_rfc3339(date: DateTime<Utc>) -> String {
    date.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Parse an RFC3339 timestamp from a JSON payload string.
///
/// Accepts values with or without fractional seconds and rounds the result
/// to the nearest millisecond.
pub fn parse_json_date(raw: &str) -> Option<DateTime<Utc>> {
    let parsed = DateTime::parse_from_rfc3339(raw).ok()?.with_timezone(&Utc);
    parsed
        .duration_round(TimeDelta::milliseconds(1))
        .ok()
        .or(Some(parsed))
}
