//! Five-field cron expressions, evaluated in UTC.
//!
//! `minute hour day-of-month month day-of-week`, each field accepting `*`,
//! numbers, `a-b` ranges, `/step` and comma lists. Months and weekdays also
//! take three-letter names; weekday `7` is Sunday like `0`. When both day
//! fields are restricted a day matches if either does.

use crate::error::{IngestError, Result};
use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveDateTime, Timelike, Utc};
use std::fmt;
use std::str::FromStr;

/// Years searched before a schedule is declared unsatisfiable (`0 0 30 2 *`).
const SEARCH_YEARS: i32 = 5;

const MONTHS: [&str; 12] = [
    "jan", "feb", "mar", "apr", "may", "jun", "jul", "aug", "sep", "oct", "nov", "dec",
];
const WEEKDAYS: [&str; 7] = ["sun", "mon", "tue", "wed", "thu", "fri", "sat"];

/// Set of allowed values for one field, as a bitmask.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Field(u64);

impl Field {
    const fn contains(self, value: u32) -> bool {
        value < 64 && self.0 & (1 << value) != 0
    }
}

struct Spec {
    name: &'static str,
    min: u32,
    max: u32,
    names: &'static [&'static str],
    name_offset: u32,
}

const MINUTE: Spec = Spec { name: "minute", min: 0, max: 59, names: &[], name_offset: 0 };
const HOUR: Spec = Spec { name: "hour", min: 0, max: 23, names: &[], name_offset: 0 };
const DAY: Spec = Spec { name: "day-of-month", min: 1, max: 31, names: &[], name_offset: 0 };
const MONTH: Spec = Spec { name: "month", min: 1, max: 12, names: &MONTHS, name_offset: 1 };
const WEEKDAY: Spec = Spec { name: "day-of-week", min: 0, max: 7, names: &WEEKDAYS, name_offset: 0 };

/// A parsed cron schedule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CronSchedule {
    expression: String,
    minutes: Field,
    hours: Field,
    days: Field,
    months: Field,
    weekdays: Field,
    days_restricted: bool,
    weekdays_restricted: bool,
}

impl CronSchedule {
    /// Parse an expression. `@hourly`, `@daily`, `@weekly`, `@monthly` and
    /// `@yearly` are accepted as shorthands.
    ///
    /// # Errors
    ///
    /// Returns [`IngestError::InvalidCron`] naming the offending field.
    pub fn parse(expression: &str) -> Result<Self> {
        let expression = expression.trim();
        let expanded = match expression {
            "@hourly" => "0 * * * *",
            "@daily" | "@midnight" => "0 0 * * *",
            "@weekly" => "0 0 * * 0",
            "@monthly" => "0 0 1 * *",
            "@yearly" | "@annually" => "0 0 1 1 *",
            other => other,
        };
        let invalid = |reason: String| IngestError::InvalidCron {
            expression: expression.to_string(),
            reason,
        };

        let fields: Vec<&str> = expanded.split_whitespace().collect();
        let [minute, hour, day, month, weekday] = fields.as_slice() else {
            return Err(invalid(format!("expected 5 fields, got {}", fields.len())));
        };

        let mut weekdays = parse_field(weekday, &WEEKDAY).map_err(&invalid)?;
        if weekdays.contains(7) {
            weekdays = Field((weekdays.0 | 1) & !(1 << 7));
        }

        Ok(Self {
            expression: expression.to_string(),
            minutes: parse_field(minute, &MINUTE).map_err(&invalid)?,
            hours: parse_field(hour, &HOUR).map_err(&invalid)?,
            days: parse_field(day, &DAY).map_err(&invalid)?,
            months: parse_field(month, &MONTH).map_err(&invalid)?,
            weekdays,
            days_restricted: !day.starts_with('*'),
            weekdays_restricted: !weekday.starts_with('*'),
        })
    }

    /// The expression as written.
    #[must_use]
    pub fn expression(&self) -> &str {
        &self.expression
    }

    /// First matching minute strictly after `after`, or `None` if nothing
    /// matches within the search horizon.
    #[must_use]
    pub fn next_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let start = after.naive_utc().with_second(0)?.with_nanosecond(0)? + Duration::minutes(1);
        let horizon = start.year() + SEARCH_YEARS;
        let mut t = start;

        while t.year() <= horizon {
            if !self.months.contains(t.month()) {
                t = first_of_next_month(t)?;
                continue;
            }
            if !self.day_matches(t.date()) {
                t = t.date().succ_opt()?.and_hms_opt(0, 0, 0)?;
                continue;
            }
            if !self.hours.contains(t.hour()) {
                t = (t + Duration::hours(1)).with_minute(0)?;
                continue;
            }
            if !self.minutes.contains(t.minute()) {
                t += Duration::minutes(1);
                continue;
            }
            return Some(t.and_utc());
        }
        None
    }

    fn day_matches(&self, date: NaiveDate) -> bool {
        let dom = self.days.contains(date.day());
        let dow = self.weekdays.contains(date.weekday().num_days_from_sunday());
        if self.days_restricted && self.weekdays_restricted {
            dom || dow
        } else {
            dom && dow
        }
    }
}

impl FromStr for CronSchedule {
    type Err = IngestError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for CronSchedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.expression)
    }
}

fn first_of_next_month(t: NaiveDateTime) -> Option<NaiveDateTime> {
    let (year, month) = if t.month() == 12 {
        (t.year() + 1, 1)
    } else {
        (t.year(), t.month() + 1)
    };
    NaiveDate::from_ymd_opt(year, month, 1)?.and_hms_opt(0, 0, 0)
}

fn parse_field(text: &str, spec: &Spec) -> std::result::Result<Field, String> {
    let mut mask = 0u64;
    for part in text.split(',') {
        let (range, step) = match part.split_once('/') {
            Some((range, step)) => {
                let step: u32 = step
                    .parse()
                    .map_err(|_| format!("{}: bad step '{step}'", spec.name))?;
                if step == 0 {
                    return Err(format!("{}: step must be positive", spec.name));
                }
                (range, step)
            }
            None => (part, 1),
        };

        let (low, high) = if range == "*" {
            (spec.min, spec.max)
        } else if let Some((low, high)) = range.split_once('-') {
            (value(low, spec)?, value(high, spec)?)
        } else {
            let single = value(range, spec)?;
            // `5/15` runs from 5 to the end of the range.
            (single, if step > 1 { spec.max } else { single })
        };
        if low > high {
            return Err(format!("{}: range {low}-{high} is reversed", spec.name));
        }

        for v in (low..=high).step_by(step as usize) {
            mask |= 1 << v;
        }
    }
    Ok(Field(mask))
}

fn value(text: &str, spec: &Spec) -> std::result::Result<u32, String> {
    let lower = text.to_ascii_lowercase();
    let parsed = spec
        .names
        .iter()
        .zip(spec.name_offset..)
        .find_map(|(name, v)| (*name == lower).then_some(v))
        .or_else(|| lower.parse().ok())
        .ok_or_else(|| format!("{}: cannot parse '{text}'", spec.name))?;

    if parsed < spec.min || parsed > spec.max {
        return Err(format!(
            "{}: {parsed} outside {}-{}",
            spec.name, spec.min, spec.max
        ));
    }
    Ok(parsed)
}
