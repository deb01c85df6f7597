//! Five-field cron expressions: `minute hour day-of-month month day-of-week`.
//!
//! Each field accepts `*`, `N`, `N-M`, `*/S`, `N-M/S`, `N/S` and comma lists.
//! Day-of-week runs 0 (Sunday) to 6; `7` is accepted as Sunday too.

use chrono::{DateTime, Datelike, Days, Duration, NaiveDate, Timelike, Utc};
use hemobank_core::{Error, Result};
use std::fmt;
use std::str::FromStr;

/// Days searched by [`CronExpr::next_after`] before giving up.
const SEARCH_DAYS: u64 = 366 * 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Field {
    name: &'static str,
    min: u32,
    max: u32,
}

const MINUTE: Field = Field { name: "minute", min: 0, max: 59 };
const HOUR: Field = Field { name: "hour", min: 0, max: 23 };
const DAY_OF_MONTH: Field = Field { name: "day-of-month", min: 1, max: 31 };
const MONTH: Field = Field { name: "month", min: 1, max: 12 };
const DAY_OF_WEEK: Field = Field { name: "day-of-week", min: 0, max: 7 };

/// A parsed cron expression. Each field is a bitmask of allowed values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CronExpr {
    source: String,
    minutes: u64,
    hours: u64,
    days_of_month: u64,
    months: u64,
    days_of_week: u64,
}

fn invalid(message: String) -> Error {
    Error::Config { message }
}

fn number(text: &str, field: Field) -> Result<u32> {
    let value: u32 = text
        .parse()
        .map_err(|_| invalid(format!("{}: '{text}' is not a number", field.name)))?;
    if value < field.min || value > field.max {
        return Err(invalid(format!(
            "{}: {value} outside {}-{}",
            field.name, field.min, field.max
        )));
    }
    Ok(value)
}

fn parse_field(text: &str, field: Field) -> Result<u64> {
    let mut mask = 0u64;

    for part in text.split(',') {
        let (range, step) = match part.split_once('/') {
            Some((range, step)) => {
                let step: u32 = step
                    .parse()
                    .map_err(|_| invalid(format!("{}: bad step '{step}'", field.name)))?;
                if step == 0 {
                    return Err(invalid(format!("{}: step cannot be zero", field.name)));
                }
                (range, Some(step))
            }
            None => (part, None),
        };

        let (start, end) = if range == "*" {
            (field.min, field.max)
        } else if let Some((lo, hi)) = range.split_once('-') {
            let (lo, hi) = (number(lo, field)?, number(hi, field)?);
            if lo > hi {
                return Err(invalid(format!("{}: range {lo}-{hi} is reversed", field.name)));
            }
            (lo, hi)
        } else {
            let start = number(range, field)?;
            // `N/S` runs from N to the field's end.
            (start, if step.is_some() { field.max } else { start })
        };

        for value in (start..=end).step_by(step.unwrap_or(1) as usize) {
            mask |= 1 << value;
        }
    }

    if mask == 0 {
        return Err(invalid(format!("{}: no values", field.name)));
    }
    Ok(mask)
}

fn has(mask: u64, value: u32) -> bool {
    mask & (1 << value) != 0
}

impl CronExpr {
    pub fn parse(expr: &str) -> Result<Self> {
        let fields: Vec<&str> = expr.split_whitespace().collect();
        let [minute, hour, dom, month, dow] = fields.as_slice() else {
            return Err(invalid(format!(
                "expected 5 fields (minute hour dom month dow), got {}",
                fields.len()
            )));
        };

        let mut days_of_week = parse_field(dow, DAY_OF_WEEK)?;
        if has(days_of_week, 7) {
            days_of_week = (days_of_week | 1) & !(1 << 7);
        }

        Ok(Self {
            source: fields.join(" "),
            minutes: parse_field(minute, MINUTE)?,
            hours: parse_field(hour, HOUR)?,
            days_of_month: parse_field(dom, DAY_OF_MONTH)?,
            months: parse_field(month, MONTH)?,
            days_of_week,
        })
    }

    fn matches_day(&self, date: NaiveDate) -> bool {
        has(self.days_of_month, date.day())
            && has(self.months, date.month())
            && has(self.days_of_week, date.weekday().num_days_from_sunday())
    }

    /// Whether `dt` falls in a matching minute.
    pub fn matches(&self, dt: &DateTime<Utc>) -> bool {
        self.matches_day(dt.date_naive()) && has(self.hours, dt.hour()) && has(self.minutes, dt.minute())
    }

    /// The first matching minute strictly after `dt`.
    pub fn next_after(&self, dt: &DateTime<Utc>) -> Option<DateTime<Utc>> {
        let start = dt.date_naive();
        let after = dt.hour() * 60 + dt.minute();

        (0..SEARCH_DAYS).find_map(|offset| {
            let date = start.checked_add_days(Days::new(offset))?;
            if !self.matches_day(date) {
                return None;
            }
            let first_minute_of_day = (0..24 * 60).find(|&m| {
                (offset > 0 || m > after) && has(self.hours, m / 60) && has(self.minutes, m % 60)
            })?;
            let midnight = date.and_hms_opt(0, 0, 0)?.and_utc();
            Some(midnight + Duration::minutes(i64::from(first_minute_of_day)))
        })
    }
}

impl FromStr for CronExpr {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for CronExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}
