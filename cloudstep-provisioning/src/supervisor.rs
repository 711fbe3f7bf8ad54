//! Timeout and cleanup supervision for time-bounded operations

use std::time::Duration;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::warn;

use crate::context::Timing;
use crate::types::Operation;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DurationParseError {
    #[error("empty duration")]
    Empty,
    #[error("invalid duration `{0}`")]
    Invalid(String),
    #[error("missing unit in duration `{0}`")]
    MissingUnit(String),
    #[error("unknown unit `{unit}` in duration `{input}`")]
    UnknownUnit { unit: String, input: String },
}

/// Parse a Go-style duration such as `"20m"`, `"1h30m"` or `"1.5h"`.
///
/// Units: `ns`, `us`/`µs`, `ms`, `s`, `m`, `h`. Negative durations are rejected.
pub fn parse_duration(input: &str) -> Result<Duration, DurationParseError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(DurationParseError::Empty);
    }
    let body = trimmed.strip_prefix('+').unwrap_or(trimmed);
    if body == "0" {
        return Ok(Duration::ZERO);
    }

    let mut rest = body;
    let mut seconds = 0f64;
    while !rest.is_empty() {
        let number_len = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        if number_len == 0 {
            return Err(DurationParseError::Invalid(input.to_string()));
        }
        let value: f64 = rest[..number_len]
            .parse()
            .map_err(|_| DurationParseError::Invalid(input.to_string()))?;
        rest = &rest[number_len..];

        let unit_len = rest
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(rest.len());
        let scale = match &rest[..unit_len] {
            "" => return Err(DurationParseError::MissingUnit(input.to_string())),
            "ns" => 1e-9,
            "us" | "µs" => 1e-6,
            "ms" => 1e-3,
            "s" => 1.0,
            "m" => 60.0,
            "h" => 3600.0,
            unit => {
                return Err(DurationParseError::UnknownUnit {
                    unit: unit.to_string(),
                    input: input.to_string(),
                })
            }
        };
        seconds += value * scale;
        rest = &rest[unit_len..];
    }

    Duration::try_from_secs_f64(seconds).map_err(|_| DurationParseError::Invalid(input.to_string()))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverrunCheck {
    Ok,
    Overrun { elapsed: Duration, budget: Duration },
}

impl OverrunCheck {
    pub fn is_overrun(&self) -> bool {
        matches!(self, OverrunCheck::Overrun { .. })
    }
}

/// What happened to the partially created resource after a timeout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CleanupReport {
    Deleted,
    Failed(String),
    NotAttempted,
}

#[derive(Debug, Clone)]
pub struct TimeoutSupervisor {
    fallback: Duration,
}

impl TimeoutSupervisor {
    pub fn new(fallback: Duration) -> Self {
        Self { fallback }
    }

    /// Parsed budget, or the fallback when `raw` is not a valid duration.
    pub fn budget(&self, raw: &str) -> Duration {
        parse_duration(raw).unwrap_or_else(|e| {
            warn!(
                timeout = raw,
                fallback_secs = self.fallback.as_secs(),
                "Unparseable timeout, using fallback: {}",
                e
            );
            self.fallback
        })
    }

    /// Operations without a timeout never overrun.
    pub fn check_overrun(&self, timing: &Timing, now: DateTime<Utc>) -> OverrunCheck {
        let Some(raw) = timing.timeout.as_deref() else {
            return OverrunCheck::Ok;
        };
        let budget = self.budget(raw);
        let elapsed = (now - timing.started_at).to_std().unwrap_or_default();
        if elapsed >= budget {
            OverrunCheck::Overrun { elapsed, budget }
        } else {
            OverrunCheck::Ok
        }
    }

    pub fn timeout_message(&self, resource: &str, operation: Operation, report: &CleanupReport) -> String {
        let head = format!("Timeout reached when waiting for {} {}.", resource, operation.noun());
        match report {
            CleanupReport::Deleted => format!(
                "{} Resource has been deleted because delete-on-timeout is enabled. \
                 If you suspect a transient error, wait before retrying to allow resource deletion to finish.",
                head
            ),
            CleanupReport::Failed(reason) => format!(
                "{} Cleanup was attempted because delete-on-timeout is enabled but failed: {}. \
                 The resource may need to be removed manually.",
                head, reason
            ),
            CleanupReport::NotAttempted => format!(
                "{} Cleanup was not performed because delete-on-timeout is disabled.",
                head
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;

    fn timing(minutes_ago: i64, timeout: Option<&str>) -> (Timing, DateTime<Utc>) {
        let now = Utc::now();
        let timing = Timing {
            started_at: now - ChronoDuration::minutes(minutes_ago),
            timeout: timeout.map(str::to_string),
            delete_on_timeout: true,
        };
        (timing, now)
    }

    fn supervisor() -> TimeoutSupervisor {
        TimeoutSupervisor::new(Duration::from_secs(20 * 60))
    }

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("20m"), Ok(Duration::from_secs(1200)));
        assert_eq!(parse_duration("1h30m"), Ok(Duration::from_secs(5400)));
        assert_eq!(parse_duration("90s"), Ok(Duration::from_secs(90)));
        assert_eq!(parse_duration("1.5h"), Ok(Duration::from_secs(5400)));
        assert_eq!(parse_duration("250ms"), Ok(Duration::from_millis(250)));
        assert_eq!(parse_duration("0"), Ok(Duration::ZERO));
    }

    #[test]
    fn test_parse_duration_rejects_garbage() {
        assert_eq!(parse_duration(""), Err(DurationParseError::Empty));
        assert_eq!(parse_duration("20"), Err(DurationParseError::MissingUnit("20".to_string())));
        assert!(matches!(parse_duration("20d"), Err(DurationParseError::UnknownUnit { .. })));
        assert!(matches!(parse_duration("-5m"), Err(DurationParseError::Invalid(_))));
        assert!(matches!(parse_duration("soon"), Err(DurationParseError::Invalid(_))));
    }

    #[test]
    fn test_overrun_after_budget() {
        let (t, now) = timing(25, Some("20m"));
        assert_eq!(
            supervisor().check_overrun(&t, now),
            OverrunCheck::Overrun {
                elapsed: Duration::from_secs(25 * 60),
                budget: Duration::from_secs(20 * 60),
            }
        );
    }

    #[test]
    fn test_within_budget() {
        let (t, now) = timing(10, Some("20m"));
        assert_eq!(supervisor().check_overrun(&t, now), OverrunCheck::Ok);
    }

    #[test]
    fn test_unparseable_budget_uses_fallback() {
        let s = TimeoutSupervisor::new(Duration::from_secs(5 * 60));
        let (t, now) = timing(6, Some("twenty minutes"));
        assert!(s.check_overrun(&t, now).is_overrun());
        let (t, now) = timing(4, Some("twenty minutes"));
        assert!(!s.check_overrun(&t, now).is_overrun());
    }

    #[test]
    fn test_no_budget_never_overruns() {
        let (t, now) = timing(24 * 60, None);
        assert_eq!(supervisor().check_overrun(&t, now), OverrunCheck::Ok);
    }

    #[test]
    fn test_messages_distinguish_cleanup() {
        let s = supervisor();
        let deleted = s.timeout_message("stream processor", Operation::Create, &CleanupReport::Deleted);
        assert!(deleted.starts_with("Timeout reached when waiting for stream processor creation."));
        assert!(deleted.contains("Resource has been deleted"));

        let skipped = s.timeout_message("stream processor", Operation::Create, &CleanupReport::NotAttempted);
        assert!(skipped.contains("Cleanup was not performed"));

        let failed = s.timeout_message(
            "stream processor",
            Operation::Create,
            &CleanupReport::Failed("remote API returned 500: oops".to_string()),
        );
        assert!(failed.contains("removed manually"));
    }
}
