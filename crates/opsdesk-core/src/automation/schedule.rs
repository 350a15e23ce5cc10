//! Next-run computation for scheduled rules

use chrono::{DateTime, Duration, Utc};
use cron::Schedule;
use opsdesk_common::{Error, Result};
use std::str::FromStr;

/// Inputs that decide when a scheduled rule fires next
#[derive(Debug, Clone, Default)]
pub struct ScheduleSpec<'a> {
    pub cadence: Option<&'a str>,
    pub cron_expression: Option<&'a str>,
    pub scheduled_time: Option<DateTime<Utc>>,
    pub run_once: bool,
}

/// Compute the next run strictly after `after`.
///
/// A `run_once` rule fires at its `scheduled_time`; a past time is due
/// immediately. Otherwise a cron expression wins over a cadence. Returns
/// `Ok(None)` for a `run_once` rule that has no time left to fire.
pub fn next_run(spec: &ScheduleSpec<'_>, after: DateTime<Utc>) -> Result<Option<DateTime<Utc>>> {
    if spec.run_once {
        let at = spec.scheduled_time.ok_or_else(|| {
            Error::InvalidInput("A run-once rule needs a scheduled_time".to_string())
        })?;
        return Ok(Some(at));
    }

    if let Some(expr) = spec.cron_expression {
        let schedule = Schedule::from_str(&normalize_cron(expr))
            .map_err(|e| Error::InvalidInput(format!("Invalid cron expression: {}", e)))?;
        return Ok(schedule.after(&after).next());
    }

    if let Some(cadence) = spec.cadence {
        let interval = match cadence {
            "hourly" => Duration::hours(1),
            "daily" => Duration::days(1),
            "weekly" => Duration::weeks(1),
            other => {
                return Err(Error::InvalidInput(format!(
                    "Unknown cadence '{}'",
                    other
                )))
            }
        };
        return Ok(Some(after + interval));
    }

    Err(Error::InvalidInput(
        "A scheduled rule needs a cadence, cron expression, or scheduled time".to_string(),
    ))
}

/// Accept the standard 5-field form by prepending a seconds field; the
/// cron crate wants 6 or 7 fields.
fn normalize_cron(expr: &str) -> String {
    let trimmed = expr.trim();
    match trimmed.split_whitespace().count() {
        5 => format!("0 {}", trimmed),
        _ => trimmed.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
    }

    #[test]
    fn test_normalize_cron_adds_seconds_field() {
        assert_eq!(normalize_cron("*/5 * * * *"), "0 */5 * * * *");
        assert_eq!(normalize_cron("0 0 9 * * MON"), "0 0 9 * * MON");
    }

    #[test]
    fn test_cadence_intervals() {
        let now = at(2024, 3, 1, 12, 0);
        let spec = ScheduleSpec {
            cadence: Some("hourly"),
            ..Default::default()
        };
        assert_eq!(next_run(&spec, now).unwrap(), Some(at(2024, 3, 1, 13, 0)));

        let spec = ScheduleSpec {
            cadence: Some("daily"),
            ..Default::default()
        };
        assert_eq!(next_run(&spec, now).unwrap(), Some(at(2024, 3, 2, 12, 0)));

        let spec = ScheduleSpec {
            cadence: Some("fortnightly"),
            ..Default::default()
        };
        assert!(next_run(&spec, now).is_err());
    }

    #[test]
    fn test_cron_expression_five_field() {
        let now = at(2024, 3, 1, 12, 30);
        let spec = ScheduleSpec {
            cron_expression: Some("0 9 * * *"),
            ..Default::default()
        };
        assert_eq!(next_run(&spec, now).unwrap(), Some(at(2024, 3, 2, 9, 0)));
    }

    #[test]
    fn test_cron_wins_over_cadence() {
        let now = at(2024, 3, 1, 12, 30);
        let spec = ScheduleSpec {
            cadence: Some("weekly"),
            cron_expression: Some("0 9 * * *"),
            ..Default::default()
        };
        assert_eq!(next_run(&spec, now).unwrap(), Some(at(2024, 3, 2, 9, 0)));
    }

    #[test]
    fn test_run_once_uses_scheduled_time() {
        let now = at(2024, 3, 1, 12, 0);
        let spec = ScheduleSpec {
            run_once: true,
            scheduled_time: Some(at(2024, 3, 5, 8, 0)),
            ..Default::default()
        };
        assert_eq!(next_run(&spec, now).unwrap(), Some(at(2024, 3, 5, 8, 0)));

        // A past time is still returned: the rule is due immediately
        let spec = ScheduleSpec {
            run_once: true,
            scheduled_time: Some(at(2024, 1, 1, 0, 0)),
            ..Default::default()
        };
        assert_eq!(next_run(&spec, now).unwrap(), Some(at(2024, 1, 1, 0, 0)));
    }

    #[test]
    fn test_invalid_inputs_rejected() {
        let now = at(2024, 3, 1, 12, 0);
        assert!(next_run(&ScheduleSpec::default(), now).is_err());
        assert!(next_run(
            &ScheduleSpec {
                cron_expression: Some("not cron"),
                ..Default::default()
            },
            now
        )
        .is_err());
        assert!(next_run(
            &ScheduleSpec {
                run_once: true,
                ..Default::default()
            },
            now
        )
        .is_err());
    }
}
