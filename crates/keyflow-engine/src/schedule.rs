//! Schedule expressions and next-fire computation.

use chrono::{Datelike, NaiveDateTime, NaiveTime, TimeDelta, Weekday};
use keyflow_protocol::ScheduleKind;
use thiserror::Error;

use crate::cron::CronExpr;

/// A schedule expression that could not be armed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid {kind} schedule {expression:?}: {message}")]
pub struct ScheduleParseError {
    /// Declared kind.
    pub kind: ScheduleKind,
    /// Expression as written.
    pub expression: String,
    /// What is wrong with it.
    pub message: String,
}

/// A parsed schedule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Schedule {
    /// Every day at a fixed time.
    Daily(NaiveTime),
    /// At a fixed time on selected weekdays.
    Weekly {
        /// Selected days, Monday first, no duplicates.
        days: Vec<Weekday>,
        /// Time of day.
        at: NaiveTime,
    },
    /// Five-field cron.
    Cron(CronExpr),
}

/// Weekdays, Monday first.
const WEEK: [Weekday; 7] = [
    Weekday::Mon,
    Weekday::Tue,
    Weekday::Wed,
    Weekday::Thu,
    Weekday::Fri,
    Weekday::Sat,
    Weekday::Sun,
];

/// Parse `HH:MM` or `HH:MM:SS`.
fn parse_time(s: &str) -> Result<NaiveTime, String> {
    let s = s.trim();
    NaiveTime::parse_from_str(s, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M:%S"))
        .map_err(|_| format!("expected HH:MM, found {s:?}"))
}

/// Parse a weekday name or number, `0` = Monday through `6` = Sunday.
fn parse_weekday(s: &str) -> Result<Weekday, String> {
    let s = s.trim();
    if !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit()) {
        return s
            .parse::<usize>()
            .ok()
            .and_then(|n| WEEK.get(n).copied())
            .ok_or_else(|| format!("weekday number {s:?} out of range 0-6"));
    }
    s.parse::<Weekday>()
        .map_err(|_| format!("unknown weekday {s:?}"))
}

/// Parse a day list such as `mon,wed-fri`.
fn parse_days(s: &str) -> Result<Vec<Weekday>, String> {
    let mut mask = [false; 7];
    for item in s.split(',') {
        match item.split_once('-') {
            Some((a, b)) => {
                let (a, b) = (parse_weekday(a)?, parse_weekday(b)?);
                let mut d = a;
                loop {
                    mask[d.num_days_from_monday() as usize] = true;
                    if d == b {
                        break;
                    }
                    d = d.succ();
                }
            }
            None => mask[parse_weekday(item)?.num_days_from_monday() as usize] = true,
        }
    }
    let days: Vec<Weekday> = WEEK
        .iter()
        .zip(mask)
        .filter_map(|(d, on)| on.then_some(*d))
        .collect();
    if days.is_empty() {
        return Err("no weekdays given".into());
    }
    Ok(days)
}

impl Schedule {
    /// Parse `expression` according to `kind`.
    ///
    /// - daily: `"HH:MM"`
    /// - weekly: `"<days>@HH:MM"` where days is a comma list of names,
    ///   numbers (`0` = Monday) or ranges, e.g. `"wed@09:00"`,
    ///   `"mon,thu@18:30"`, `"mon-fri@08:00"`, `"0-4@08:00"`
    /// - cron: five fields
    pub fn parse(kind: ScheduleKind, expression: &str) -> Result<Self, ScheduleParseError> {
        let parsed = match kind {
            ScheduleKind::Daily => parse_time(expression).map(Self::Daily),
            ScheduleKind::Weekly => match expression.split_once('@') {
                Some((days, time)) => parse_days(days)
                    .and_then(|days| parse_time(time).map(|at| Self::Weekly { days, at })),
                None => Err("expected <days>@HH:MM".into()),
            },
            ScheduleKind::Cron => CronExpr::parse(expression).map(Self::Cron),
        };
        parsed.map_err(|message| ScheduleParseError {
            kind,
            expression: expression.to_string(),
            message,
        })
    }

    /// First fire time strictly after `now`. Missed fire times before `now`
    /// are never returned.
    pub fn next_after(&self, now: NaiveDateTime) -> Option<NaiveDateTime> {
        match self {
            Self::Daily(at) => {
                let today = now.date().and_time(*at);
                if today > now {
                    Some(today)
                } else {
                    Some(today + TimeDelta::days(1))
                }
            }
            Self::Weekly { days, at } => (0..=7)
                .map(|offset| now.date() + TimeDelta::days(offset))
                .filter(|date| days.contains(&date.weekday()))
                .map(|date| date.and_time(*at))
                .find(|candidate| *candidate > now),
            Self::Cron(c) => c.next_after(now),
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, Timelike};
    use proptest::prelude::*;

    use super::*;

    fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, mo, d)
            .and_then(|date| date.and_hms_opt(h, mi, 0))
            .expect("valid datetime")
    }

    #[test]
    fn daily_after_the_time_rolls_to_tomorrow() {
        let s = Schedule::parse(ScheduleKind::Daily, "09:00").expect("parse");
        assert_eq!(s.next_after(at(2024, 5, 1, 10, 0)), Some(at(2024, 5, 2, 9, 0)));
        assert_eq!(s.next_after(at(2024, 5, 1, 8, 0)), Some(at(2024, 5, 1, 9, 0)));
        assert_eq!(s.next_after(at(2024, 5, 1, 9, 0)), Some(at(2024, 5, 2, 9, 0)));
    }

    #[test]
    fn weekly_on_tuesday_fires_wednesday_same_week() {
        // 2024-05-07 is a Tuesday.
        let s = Schedule::parse(ScheduleKind::Weekly, "wed@09:00").expect("parse");
        assert_eq!(s.next_after(at(2024, 5, 7, 12, 0)), Some(at(2024, 5, 8, 9, 0)));
        // Past this week's slot: next Wednesday.
        assert_eq!(s.next_after(at(2024, 5, 8, 9, 0)), Some(at(2024, 5, 15, 9, 0)));
    }

    #[test]
    fn weekly_day_lists_and_ranges() {
        let s = Schedule::parse(ScheduleKind::Weekly, "mon-fri@08:30").expect("parse");
        // Friday evening to Monday morning.
        assert_eq!(s.next_after(at(2024, 5, 10, 18, 0)), Some(at(2024, 5, 13, 8, 30)));
        let Schedule::Weekly { days, .. } =
            Schedule::parse(ScheduleKind::Weekly, "thursday,mon@18:00").expect("parse")
        else {
            panic!("weekly");
        };
        assert_eq!(days, vec![Weekday::Mon, Weekday::Thu]);
        let wrap = Schedule::parse(ScheduleKind::Weekly, "sat-mon@10:00").expect("parse");
        assert_eq!(wrap.next_after(at(2024, 5, 7, 0, 0)), Some(at(2024, 5, 11, 10, 0)));
    }

    #[test]
    fn weekly_numeric_days_start_on_monday() {
        let numeric = Schedule::parse(ScheduleKind::Weekly, "0-4@08:30").expect("parse");
        let named = Schedule::parse(ScheduleKind::Weekly, "mon-fri@08:30").expect("parse");
        assert_eq!(numeric, named);
        let Schedule::Weekly { days, .. } =
            Schedule::parse(ScheduleKind::Weekly, "6,sat@10:00").expect("parse")
        else {
            panic!("weekly");
        };
        assert_eq!(days, vec![Weekday::Sat, Weekday::Sun]);
        assert!(Schedule::parse(ScheduleKind::Weekly, "7@10:00").is_err());
    }

    #[test]
    fn parse_errors_carry_kind_and_expression() {
        let e = Schedule::parse(ScheduleKind::Daily, "25:00").expect_err("bad time");
        assert_eq!(e.kind, ScheduleKind::Daily);
        assert_eq!(e.expression, "25:00");
        assert!(Schedule::parse(ScheduleKind::Weekly, "09:00").is_err());
        assert!(Schedule::parse(ScheduleKind::Weekly, "funday@09:00").is_err());
        assert!(Schedule::parse(ScheduleKind::Cron, "0 0 30 2 *").is_err());
    }

    proptest! {
        #[test]
        fn daily_next_is_within_a_day(h in 0u32..24, m in 0u32..60, nh in 0u32..24, nm in 0u32..60) {
            let s = Schedule::parse(ScheduleKind::Daily, &format!("{h:02}:{m:02}")).expect("parse");
            let now = at(2024, 6, 15, nh, nm);
            let next = s.next_after(now).expect("fires");
            prop_assert!(next > now);
            prop_assert!(next - now <= TimeDelta::days(1));
            prop_assert_eq!((next.hour(), next.minute()), (h, m));
        }
    }
}
