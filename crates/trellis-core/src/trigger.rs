//! Scheduled-job trigger specs: fixed intervals and cron expressions.
//!
//! A trigger spec is the string a script passes when registering a job:
//!
//! - `every:30s`, `every:5m`, `every:2h` — fixed interval
//! - `interval:45` — fixed interval in bare seconds
//! - `*/5 * * * *` — 5-field cron (minute hour day-of-month month day-of-week)
//!
//! Parsing happens synchronously at registration time so a malformed spec
//! is a configuration error reported back to the registering call, never a
//! runtime fault.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Datelike, Duration as ChronoDuration, Timelike, Utc};
use thiserror::Error;

/// Error produced by trigger spec parsing.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid trigger spec {spec:?}: {message}")]
pub struct TriggerParseError {
    /// The offending spec string.
    pub spec: String,
    /// What was wrong with it.
    pub message: String,
}

/// A parsed job trigger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TriggerSpec {
    /// Fire every fixed interval, measured from the previous firing.
    Every(Duration),
    /// Fire when the cron expression matches the current minute.
    Cron(CronExpr),
}

impl TriggerSpec {
    /// Parse a trigger spec string.
    ///
    /// # Errors
    ///
    /// Returns [`TriggerParseError`] for unknown forms, zero intervals, and
    /// malformed cron fields.
    pub fn parse(spec: &str) -> Result<Self, TriggerParseError> {
        let trimmed = spec.trim();
        if let Some(rest) = trimmed.strip_prefix("every:") {
            return parse_interval(spec, rest).map(Self::Every);
        }
        if let Some(rest) = trimmed.strip_prefix("interval:") {
            return parse_interval_secs(spec, rest).map(Self::Every);
        }
        if trimmed.split_whitespace().count() == 5 {
            return CronExpr::parse(trimmed)
                .map(Self::Cron)
                .map_err(|message| TriggerParseError {
                    spec: spec.to_owned(),
                    message,
                });
        }
        Err(TriggerParseError {
            spec: spec.to_owned(),
            message: "expected `every:<n><s|m|h>`, `interval:<secs>`, or a 5-field cron expression"
                .to_owned(),
        })
    }

    /// The next firing strictly after `after`, given the previous firing.
    ///
    /// For intervals the anchor is `after` itself; for cron the next
    /// matching minute boundary is found. Returns `None` if no firing
    /// occurs within the next 366 days (e.g. `0 0 30 2 *`).
    #[must_use]
    pub fn next_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            Self::Every(interval) => {
                let delta = ChronoDuration::from_std(*interval).ok()?;
                after.checked_add_signed(delta)
            },
            Self::Cron(expr) => expr.next_after(after),
        }
    }
}

impl fmt::Display for TriggerSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Every(d) => write!(f, "every:{}s", d.as_secs()),
            Self::Cron(expr) => write!(f, "{}", expr.source),
        }
    }
}

fn parse_interval(spec: &str, rest: &str) -> Result<Duration, TriggerParseError> {
    let err = |message: &str| TriggerParseError {
        spec: spec.to_owned(),
        message: message.to_owned(),
    };
    if rest.len() < 2 || !rest.is_char_boundary(rest.len() - 1) {
        return Err(err("interval needs a number and a unit, e.g. every:5m"));
    }
    let (digits, unit) = rest.split_at(rest.len() - 1);
    let value: u64 = digits
        .parse()
        .map_err(|_| err("interval count must be a positive integer"))?;
    if value == 0 {
        return Err(err("interval must be greater than zero"));
    }
    let secs = match unit {
        "s" => value,
        "m" => value.saturating_mul(60),
        "h" => value.saturating_mul(3600),
        _ => return Err(err("interval unit must be s, m, or h")),
    };
    Ok(Duration::from_secs(secs))
}

fn parse_interval_secs(spec: &str, rest: &str) -> Result<Duration, TriggerParseError> {
    let err = |message: &str| TriggerParseError {
        spec: spec.to_owned(),
        message: message.to_owned(),
    };
    let secs: u64 = rest
        .parse()
        .map_err(|_| err("interval seconds must be a positive integer"))?;
    if secs == 0 {
        return Err(err("interval must be greater than zero"));
    }
    Ok(Duration::from_secs(secs))
}

/// A parsed 5-field cron expression.
///
/// Fields are minute, hour, day-of-month, month, day-of-week (0-6,
/// Sunday = 0, with 7 accepted as Sunday). Each field supports `*`,
/// single values, ranges `a-b`, steps `*/n` and `a-b/n`, and comma lists.
/// When both day fields are restricted, a date matches if either does
/// (classic vixie-cron behavior).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CronExpr {
    source: String,
    minutes: u64,
    hours: u64,
    days_of_month: u64,
    months: u64,
    days_of_week: u64,
    dom_restricted: bool,
    dow_restricted: bool,
}

impl CronExpr {
    /// Parse a 5-field cron expression.
    fn parse(source: &str) -> Result<Self, String> {
        let fields: Vec<&str> = source.split_whitespace().collect();
        if fields.len() != 5 {
            return Err(format!("expected 5 fields, got {}", fields.len()));
        }
        Ok(Self {
            source: source.to_owned(),
            minutes: parse_field(fields[0], 0, 59, "minute")?,
            hours: parse_field(fields[1], 0, 23, "hour")?,
            days_of_month: parse_field(fields[2], 1, 31, "day-of-month")?,
            months: parse_field(fields[3], 1, 12, "month")?,
            days_of_week: parse_dow(fields[4])?,
            dom_restricted: fields[2] != "*",
            dow_restricted: fields[4] != "*",
        })
    }

    /// Whether the expression matches the minute containing `at`.
    #[must_use]
    pub fn matches(&self, at: DateTime<Utc>) -> bool {
        if self.minutes & (1 << at.minute()) == 0 {
            return false;
        }
        if self.hours & (1 << at.hour()) == 0 {
            return false;
        }
        if self.months & (1 << at.month()) == 0 {
            return false;
        }
        let dom_match = self.days_of_month & (1 << at.day()) != 0;
        let dow_match = self.days_of_week & (1 << at.weekday().num_days_from_sunday()) != 0;
        if self.dom_restricted && self.dow_restricted {
            dom_match || dow_match
        } else {
            dom_match && dow_match
        }
    }

    /// The next matching minute boundary strictly after `after`, or `None`
    /// if nothing matches within 366 days.
    #[must_use]
    pub fn next_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        // Advance to the next whole minute, then scan. 366 days bounds the
        // scan for expressions that can never fire (e.g. Feb 30).
        let mut candidate = after
            .with_second(0)?
            .with_nanosecond(0)?
            .checked_add_signed(ChronoDuration::minutes(1))?;
        let limit = after.checked_add_signed(ChronoDuration::days(366))?;
        while candidate <= limit {
            if self.matches(candidate) {
                return Some(candidate);
            }
            candidate = candidate.checked_add_signed(ChronoDuration::minutes(1))?;
        }
        None
    }
}

/// Parse one cron field into a bitmask over `[min, max]`.
fn parse_field(field: &str, min: u32, max: u32, name: &str) -> Result<u64, String> {
    let mut mask: u64 = 0;
    for part in field.split(',') {
        let (range, step) = match part.split_once('/') {
            Some((r, s)) => {
                let step: u32 = s
                    .parse()
                    .map_err(|_| format!("{name}: bad step in {part:?}"))?;
                if step == 0 {
                    return Err(format!("{name}: step must be greater than zero"));
                }
                (r, step)
            },
            None => (part, 1),
        };
        let (lo, hi) = if range == "*" {
            (min, max)
        } else if let Some((a, b)) = range.split_once('-') {
            let lo: u32 = a
                .parse()
                .map_err(|_| format!("{name}: bad range start in {part:?}"))?;
            let hi: u32 = b
                .parse()
                .map_err(|_| format!("{name}: bad range end in {part:?}"))?;
            (lo, hi)
        } else {
            let v: u32 = range
                .parse()
                .map_err(|_| format!("{name}: bad value {part:?}"))?;
            (v, v)
        };
        if lo > hi {
            return Err(format!("{name}: range start exceeds end in {part:?}"));
        }
        if lo < min || hi > max {
            return Err(format!("{name}: value out of range {min}-{max} in {part:?}"));
        }
        let mut v = lo;
        while v <= hi {
            mask |= 1 << v;
            v = v.saturating_add(step);
        }
    }
    Ok(mask)
}

/// Day-of-week accepts 0-7 with 7 folded into Sunday.
fn parse_dow(field: &str) -> Result<u64, String> {
    let mask = parse_field(field, 0, 7, "day-of-week")?;
    let folded = if mask & (1 << 7) != 0 {
        (mask & !(1 << 7)) | 1
    } else {
        mask
    };
    Ok(folded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
    }

    #[test]
    fn parses_intervals() {
        assert_eq!(
            TriggerSpec::parse("every:30s").unwrap(),
            TriggerSpec::Every(Duration::from_secs(30))
        );
        assert_eq!(
            TriggerSpec::parse("every:5m").unwrap(),
            TriggerSpec::Every(Duration::from_secs(300))
        );
        assert_eq!(
            TriggerSpec::parse("every:2h").unwrap(),
            TriggerSpec::Every(Duration::from_secs(7200))
        );
    }

    #[test]
    fn parses_bare_second_intervals() {
        assert_eq!(
            TriggerSpec::parse("interval:45").unwrap(),
            TriggerSpec::Every(Duration::from_secs(45))
        );
        assert!(TriggerSpec::parse("interval:0").is_err());
        assert!(TriggerSpec::parse("interval:abc").is_err());
    }

    #[test]
    fn rejects_malformed_intervals() {
        assert!(TriggerSpec::parse("every:").is_err());
        assert!(TriggerSpec::parse("every:5x").is_err());
        assert!(TriggerSpec::parse("every:0m").is_err());
        assert!(TriggerSpec::parse("every:-3s").is_err());
    }

    #[test]
    fn rejects_unknown_forms() {
        assert!(TriggerSpec::parse("daily").is_err());
        assert!(TriggerSpec::parse("* * * *").is_err());
        assert!(TriggerSpec::parse("").is_err());
    }

    #[test]
    fn parses_simple_cron() {
        let spec = TriggerSpec::parse("*/15 * * * *").unwrap();
        assert!(matches!(spec, TriggerSpec::Cron(_)));
    }

    #[test]
    fn rejects_out_of_range_cron_fields() {
        assert!(TriggerSpec::parse("60 * * * *").is_err());
        assert!(TriggerSpec::parse("* 24 * * *").is_err());
        assert!(TriggerSpec::parse("* * 0 * *").is_err());
        assert!(TriggerSpec::parse("* * * 13 *").is_err());
        assert!(TriggerSpec::parse("* * * * 8").is_err());
        assert!(TriggerSpec::parse("*/0 * * * *").is_err());
        assert!(TriggerSpec::parse("5-2 * * * *").is_err());
    }

    #[test]
    fn cron_matches_exact_minute() {
        let TriggerSpec::Cron(expr) = TriggerSpec::parse("30 14 * * *").unwrap() else {
            panic!("expected cron");
        };
        assert!(expr.matches(at(2026, 3, 10, 14, 30)));
        assert!(!expr.matches(at(2026, 3, 10, 14, 31)));
        assert!(!expr.matches(at(2026, 3, 10, 15, 30)));
    }

    #[test]
    fn cron_step_and_list() {
        let TriggerSpec::Cron(expr) = TriggerSpec::parse("*/20 9,17 * * *").unwrap() else {
            panic!("expected cron");
        };
        assert!(expr.matches(at(2026, 1, 5, 9, 0)));
        assert!(expr.matches(at(2026, 1, 5, 17, 40)));
        assert!(!expr.matches(at(2026, 1, 5, 9, 10)));
        assert!(!expr.matches(at(2026, 1, 5, 12, 0)));
    }

    #[test]
    fn cron_dow_seven_is_sunday() {
        let TriggerSpec::Cron(expr) = TriggerSpec::parse("0 0 * * 7").unwrap() else {
            panic!("expected cron");
        };
        // 2026-03-08 is a Sunday.
        assert!(expr.matches(at(2026, 3, 8, 0, 0)));
        assert!(!expr.matches(at(2026, 3, 9, 0, 0)));
    }

    #[test]
    fn cron_dom_dow_union_when_both_restricted() {
        // Classic vixie behavior: "0 0 13 * 5" fires on the 13th AND on
        // every Friday.
        let TriggerSpec::Cron(expr) = TriggerSpec::parse("0 0 13 * 5").unwrap() else {
            panic!("expected cron");
        };
        // 2026-02-13 is a Friday (both match).
        assert!(expr.matches(at(2026, 2, 13, 0, 0)));
        // 2026-03-13 is a Friday; 2026-04-13 is a Monday (dom only).
        assert!(expr.matches(at(2026, 4, 13, 0, 0)));
        // 2026-02-06 is a Friday (dow only).
        assert!(expr.matches(at(2026, 2, 6, 0, 0)));
        // 2026-02-11 is a Wednesday, not the 13th.
        assert!(!expr.matches(at(2026, 2, 11, 0, 0)));
    }

    #[test]
    fn next_after_interval_adds_to_anchor() {
        let spec = TriggerSpec::parse("every:10m").unwrap();
        let anchor = at(2026, 6, 1, 12, 0);
        assert_eq!(spec.next_after(anchor), Some(at(2026, 6, 1, 12, 10)));
    }

    #[test]
    fn next_after_cron_finds_next_minute_boundary() {
        let spec = TriggerSpec::parse("0 * * * *").unwrap();
        let anchor = Utc.with_ymd_and_hms(2026, 6, 1, 12, 30, 42).unwrap();
        assert_eq!(spec.next_after(anchor), Some(at(2026, 6, 1, 13, 0)));
    }

    #[test]
    fn next_after_cron_strictly_after() {
        let spec = TriggerSpec::parse("30 12 * * *").unwrap();
        let anchor = at(2026, 6, 1, 12, 30);
        assert_eq!(spec.next_after(anchor), Some(at(2026, 6, 2, 12, 30)));
    }

    #[test]
    fn impossible_cron_yields_none() {
        let spec = TriggerSpec::parse("0 0 30 2 *").unwrap();
        assert_eq!(spec.next_after(at(2026, 1, 1, 0, 0)), None);
    }

    #[test]
    fn display_round_trips_meaningfully() {
        assert_eq!(
            TriggerSpec::parse("every:90s").unwrap().to_string(),
            "every:90s"
        );
        assert_eq!(
            TriggerSpec::parse("*/5 * * * *").unwrap().to_string(),
            "*/5 * * * *"
        );
    }
}
