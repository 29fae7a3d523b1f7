// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Next-run computation for the three schedule kinds (§4.8 `schedule_task`,
//! §4.9 step 5). Shared by the `schedule_task` tool and the scheduler loop so
//! there is exactly one place that understands cron/interval/once.
//!
//! Cron stepping always uses UTC. `Config::timezone` is accepted and stored
//! per group for display purposes, but stepping a cron schedule through an
//! IANA timezone needs a timezone-database crate that is not otherwise used
//! anywhere in this codebase; pulling one in for this alone was judged not
//! worth the dependency (see DESIGN.md).

use chrono::{DateTime, TimeZone, Utc};
use cron::Schedule;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleKind {
    Cron,
    Interval,
    Once,
}

impl ScheduleKind {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "cron" => Some(Self::Cron),
            "interval" => Some(Self::Interval),
            "once" => Some(Self::Once),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Cron => "cron",
            Self::Interval => "interval",
            Self::Once => "once",
        }
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ScheduleError {
    #[error("Invalid interval value")]
    InvalidInterval,
    #[error("Invalid timestamp")]
    InvalidTimestamp,
    #[error("Invalid cron expression")]
    InvalidCron,
}

/// Prepends a `"0"` seconds field to a conventional 5-field cron expression
/// (`minute hour day month weekday`, the form `schedule_task` callers are
/// expected to supply) so it matches the 6-field form the `cron` crate
/// requires. Expressions that already have 6+ whitespace-separated fields
/// are passed through unchanged.
fn normalize_cron_expression(value: &str) -> String {
    let field_count = value.split_whitespace().count();
    if field_count == 5 {
        format!("0 {value}")
    } else {
        value.to_string()
    }
}

/// Compute the next UTC-millisecond run time for a (kind, value) pair, given
/// the current time in UTC milliseconds.
///
/// - `cron`: the next firing of the 5/6-field cron expression strictly after `now`.
/// - `interval`: a positive integer millisecond count; `now + value`.
/// - `once`: an RFC 3339 / ISO 8601 timestamp; returned verbatim if it parses
///   (no check that it is in the future — a past `once` fires on the next
///   scheduler tick, consistent with `due_tasks`).
pub fn compute_next_run(kind: ScheduleKind, value: &str, now_ms: i64) -> Result<Option<i64>, ScheduleError> {
    match kind {
        ScheduleKind::Cron => {
            let normalized = normalize_cron_expression(value);
            let schedule = Schedule::from_str(&normalized).map_err(|_| ScheduleError::InvalidCron)?;
            let after: DateTime<Utc> = Utc
                .timestamp_millis_opt(now_ms)
                .single()
                .ok_or(ScheduleError::InvalidCron)?;
            Ok(schedule.after(&after).next().map(|dt| dt.timestamp_millis()))
        }
        ScheduleKind::Interval => {
            let ms: i64 = value.parse().map_err(|_| ScheduleError::InvalidInterval)?;
            if ms <= 0 {
                return Err(ScheduleError::InvalidInterval);
            }
            Ok(Some(now_ms + ms))
        }
        ScheduleKind::Once => {
            let dt = DateTime::parse_from_rfc3339(value).map_err(|_| ScheduleError::InvalidTimestamp)?;
            Ok(Some(dt.timestamp_millis()))
        }
    }
}

/// Re-compute the next run for a recurring schedule after one firing —
/// used by the scheduler after a task executes (§4.9 step 5). `once`
/// schedules never recur; this always returns `None` for them, which drives
/// the task to `completed`.
pub fn next_run_after_fire(kind: ScheduleKind, value: &str, fired_at_ms: i64) -> Option<i64> {
    match kind {
        ScheduleKind::Cron => compute_next_run(kind, value, fired_at_ms).ok().flatten(),
        ScheduleKind::Interval => compute_next_run(kind, value, fired_at_ms).ok().flatten(),
        ScheduleKind::Once => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interval_computes_offset_from_now() {
        let next = compute_next_run(ScheduleKind::Interval, "5000", 1_000).unwrap();
        assert_eq!(next, Some(6_000));
    }

    #[test]
    fn interval_rejects_non_numeric_value() {
        let err = compute_next_run(ScheduleKind::Interval, "not-a-number", 0).unwrap_err();
        assert_eq!(err, ScheduleError::InvalidInterval);
    }

    #[test]
    fn interval_rejects_non_positive_value() {
        assert_eq!(
            compute_next_run(ScheduleKind::Interval, "0", 0).unwrap_err(),
            ScheduleError::InvalidInterval
        );
        assert_eq!(
            compute_next_run(ScheduleKind::Interval, "-5", 0).unwrap_err(),
            ScheduleError::InvalidInterval
        );
    }

    #[test]
    fn once_parses_rfc3339_timestamp() {
        let next = compute_next_run(ScheduleKind::Once, "2030-01-01T09:00:00Z", 0).unwrap();
        assert!(next.unwrap() > 0);
    }

    #[test]
    fn once_rejects_malformed_timestamp() {
        let err = compute_next_run(ScheduleKind::Once, "not-a-date", 0).unwrap_err();
        assert_eq!(err, ScheduleError::InvalidTimestamp);
    }

    #[test]
    fn cron_rejects_malformed_expression() {
        let err = compute_next_run(ScheduleKind::Cron, "not a cron expr", 0).unwrap_err();
        assert_eq!(err, ScheduleError::InvalidCron);
    }

    #[test]
    fn cron_computes_earliest_future_fire() {
        // Every minute, seconds field included (cron crate requires 6 fields).
        let next = compute_next_run(ScheduleKind::Cron, "0 * * * * *", 0).unwrap();
        assert!(next.unwrap() > 0);
    }

    #[test]
    fn cron_accepts_conventional_5_field_expression() {
        // "Daily summary" example from the scheduling tool's documented
        // scenario: a bare 5-field expression with no seconds.
        let next = compute_next_run(ScheduleKind::Cron, "0 9 * * *", 0).unwrap();
        assert!(next.unwrap() > 0);
    }

    #[test]
    fn cron_5_and_6_field_forms_agree() {
        let five = compute_next_run(ScheduleKind::Cron, "0 9 * * *", 0).unwrap();
        let six = compute_next_run(ScheduleKind::Cron, "0 0 9 * * *", 0).unwrap();
        assert_eq!(five, six);
    }

    #[test]
    fn once_never_recurs_after_firing() {
        assert_eq!(next_run_after_fire(ScheduleKind::Once, "2030-01-01T09:00:00Z", 1_000), None);
    }

    #[test]
    fn interval_recurs_after_firing() {
        let next = next_run_after_fire(ScheduleKind::Interval, "1000", 5_000);
        assert_eq!(next, Some(6_000));
    }
}
