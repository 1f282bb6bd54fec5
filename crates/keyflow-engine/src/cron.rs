//! Five-field cron expressions: minute, hour, day of month, month, day of week.
//!
//! Fields accept `*`, numbers, `a-b` ranges, `/n` steps and comma lists.
//! Months and weekdays also accept three-letter names, and weekday `7` is
//! Sunday. A day field starting with `*` (including `*/n`) counts as
//! unrestricted: the date must then satisfy both day fields. When both day
//! fields are restricted a date matches if either does.

use chrono::{Datelike, NaiveDate, NaiveDateTime, TimeDelta, Timelike};

/// Days searched forward before giving up; covers the 28-year cycle of
/// weekdays over calendar dates.
const SEARCH_DAYS: u32 = 366 * 28;

/// Month names, January first.
const MONTHS: [&str; 12] = [
    "jan", "feb", "mar", "apr", "may", "jun", "jul", "aug", "sep", "oct", "nov", "dec",
];
/// Weekday names, Sunday first.
const WEEKDAYS: [&str; 7] = ["sun", "mon", "tue", "wed", "thu", "fri", "sat"];
/// Longest possible length of each month.
const MAX_MONTH_DAYS: [u32; 12] = [31, 29, 31, 30, 31, 30, 31, 31, 30, 31, 30, 31];

/// A parsed cron expression. Each field is a bitset of allowed values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CronExpr {
    /// Allowed minutes.
    minutes: u64,
    /// Allowed hours.
    hours: u64,
    /// Allowed days of month.
    days: u64,
    /// Allowed months.
    months: u64,
    /// Allowed weekdays, Sunday = 0.
    weekdays: u64,
    /// Day-of-month field was unrestricted.
    days_any: bool,
    /// Day-of-week field was unrestricted.
    weekdays_any: bool,
}

/// Bounds and names of one cron field.
struct Field {
    /// Field name for error messages.
    name: &'static str,
    /// Smallest value.
    min: u32,
    /// Largest value.
    max: u32,
    /// Accepted names, if any.
    names: &'static [&'static str],
    /// Value of the first name.
    names_base: u32,
}

/// Minute field.
const MINUTE: Field = Field {
    name: "minute",
    min: 0,
    max: 59,
    names: &[],
    names_base: 0,
};
/// Hour field.
const HOUR: Field = Field {
    name: "hour",
    min: 0,
    max: 23,
    names: &[],
    names_base: 0,
};
/// Day-of-month field.
const DAY: Field = Field {
    name: "day of month",
    min: 1,
    max: 31,
    names: &[],
    names_base: 0,
};
/// Month field.
const MONTH: Field = Field {
    name: "month",
    min: 1,
    max: 12,
    names: &MONTHS,
    names_base: 1,
};
// 7 is accepted and folded onto 0 after parsing.
/// Day-of-week field; `7` also means Sunday.
const WEEKDAY: Field = Field {
    name: "day of week",
    min: 0,
    max: 7,
    names: &WEEKDAYS,
    names_base: 0,
};

impl Field {
    /// Parse a single number or name.
    fn value(&self, s: &str) -> Result<u32, String> {
        let lower = s.to_ascii_lowercase();
        if let Some(pos) = self.names.iter().position(|n| *n == lower) {
            return Ok(pos as u32 + self.names_base);
        }
        let v: u32 = s
            .parse()
            .map_err(|_| format!("invalid {} value {s:?}", self.name))?;
        if v < self.min || v > self.max {
            return Err(format!(
                "{} value {v} out of range {}-{}",
                self.name, self.min, self.max
            ));
        }
        Ok(v)
    }

    /// Parse one field into a bitset; the flag reports a leading `*`.
    fn parse(&self, text: &str) -> Result<(u64, bool), String> {
        let mut bits = 0u64;
        for item in text.split(',') {
            let (range, step) = match item.split_once('/') {
                Some((r, s)) => {
                    let step: u32 = s
                        .parse()
                        .map_err(|_| format!("invalid {} step {s:?}", self.name))?;
                    if step == 0 || step > self.max {
                        return Err(format!(
                            "{} step {step} out of range 1-{}",
                            self.name, self.max
                        ));
                    }
                    (r, step)
                }
                None => (item, 1),
            };
            let (lo, hi) = if range == "*" {
                (self.min, self.max)
            } else if let Some((a, b)) = range.split_once('-') {
                let (a, b) = (self.value(a)?, self.value(b)?);
                if a > b {
                    return Err(format!("{} range {range:?} is reversed", self.name));
                }
                (a, b)
            } else {
                let a = self.value(range)?;
                // `a/n` runs from a to the end of the field.
                (a, if step > 1 { self.max } else { a })
            };
            let mut v = lo;
            while v <= hi {
                bits |= 1 << v;
                let Some(next) = v.checked_add(step) else {
                    break;
                };
                v = next;
            }
        }
        if bits == 0 {
            return Err(format!("empty {} field", self.name));
        }
        Ok((bits, text.starts_with('*')))
    }
}

/// Bit test.
fn has(bits: u64, v: u32) -> bool {
    bits & (1 << v) != 0
}

impl CronExpr {
    /// Parse a five-field expression. Expressions that can never match a
    /// calendar date, such as `0 0 30 2 *`, are rejected.
    pub fn parse(expr: &str) -> Result<Self, String> {
        let fields: Vec<&str> = expr.split_whitespace().collect();
        let [m, h, dom, mon, dow] = fields.as_slice() else {
            return Err(format!("expected 5 fields, found {}", fields.len()));
        };
        let (minutes, _) = MINUTE.parse(m)?;
        let (hours, _) = HOUR.parse(h)?;
        let (days, days_any) = DAY.parse(dom)?;
        let (months, _) = MONTH.parse(mon)?;
        let (mut weekdays, weekdays_any) = WEEKDAY.parse(dow)?;
        if has(weekdays, 7) {
            weekdays = (weekdays & !(1 << 7)) | 1;
        }
        let cron = Self {
            minutes,
            hours,
            days,
            months,
            weekdays,
            days_any,
            weekdays_any,
        };
        if !cron.can_fire() {
            return Err("expression never matches a calendar date".into());
        }
        Ok(cron)
    }

    /// Whether some calendar date satisfies the day and month fields.
    fn can_fire(&self) -> bool {
        if self.days_any || !self.weekdays_any {
            return true;
        }
        (1..=12u32).any(|m| {
            has(self.months, m) && (1..=MAX_MONTH_DAYS[(m - 1) as usize]).any(|d| has(self.days, d))
        })
    }

    /// Day-of-month / day-of-week match with cron OR semantics.
    fn date_matches(&self, date: NaiveDate) -> bool {
        if !has(self.months, date.month()) {
            return false;
        }
        let dom = has(self.days, date.day());
        let dow = has(self.weekdays, date.weekday().num_days_from_sunday());
        if self.days_any || self.weekdays_any {
            dom && dow
        } else {
            dom || dow
        }
    }

    /// Whether `at` (to the minute) matches the expression.
    pub fn matches(&self, at: NaiveDateTime) -> bool {
        self.date_matches(at.date()) && has(self.hours, at.hour()) && has(self.minutes, at.minute())
    }

    /// First matching minute strictly after `now`.
    pub fn next_after(&self, now: NaiveDateTime) -> Option<NaiveDateTime> {
        let start = now.date().and_hms_opt(now.hour(), now.minute(), 0)? + TimeDelta::minutes(1);
        let mut date = start.date();
        for _ in 0..SEARCH_DAYS {
            if self.date_matches(date) {
                let first_day = date == start.date();
                for hour in 0..24 {
                    if !has(self.hours, hour) || (first_day && hour < start.hour()) {
                        continue;
                    }
                    let from = if first_day && hour == start.hour() {
                        start.minute()
                    } else {
                        0
                    };
                    if let Some(minute) = (from..60).find(|m| has(self.minutes, *m)) {
                        return date.and_hms_opt(hour, minute, 0);
                    }
                }
            }
            date = date.succ_opt()?;
        }
        None
    }
}
