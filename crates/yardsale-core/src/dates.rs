//! Symbolic date filters resolved to concrete ISO date bounds.

use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, Duration, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};

use crate::CoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DateRange {
    #[default]
    Any,
    Today,
    Weekend,
    NextWeekend,
}

/// Inclusive date bounds sent to the sales endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateWindow {
    pub from: NaiveDate,
    pub to: NaiveDate,
}

impl DateWindow {
    /// Canonical `from..to` key used when comparing query states.
    #[must_use]
    pub fn key(&self) -> String {
        format!("{}..{}", self.from, self.to)
    }
}

impl DateRange {
    pub const ALL: [DateRange; 4] = [
        DateRange::Any,
        DateRange::Today,
        DateRange::Weekend,
        DateRange::NextWeekend,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            DateRange::Any => "any",
            DateRange::Today => "today",
            DateRange::Weekend => "weekend",
            DateRange::NextWeekend => "next_weekend",
        }
    }

    /// Resolve the preset relative to `today`. `Any` has no bounds.
    ///
    /// Weekends are Saturday through Sunday. On a Sunday the current weekend
    /// is just today, and the next weekend starts six days later.
    #[must_use]
    pub fn resolve(self, today: NaiveDate) -> Option<DateWindow> {
        match self {
            DateRange::Any => None,
            DateRange::Today => Some(DateWindow {
                from: today,
                to: today,
            }),
            DateRange::Weekend => {
                let saturday = weekend_saturday(today);
                Some(DateWindow {
                    from: today.max(saturday),
                    to: saturday + Duration::days(1),
                })
            }
            DateRange::NextWeekend => {
                let saturday = weekend_saturday(today) + Duration::days(7);
                Some(DateWindow {
                    from: saturday,
                    to: saturday + Duration::days(1),
                })
            }
        }
    }

    /// Key for the resolved window, `"any"` when unbounded.
    #[must_use]
    pub fn resolved_key(self, today: NaiveDate) -> String {
        self.resolve(today)
            .map_or_else(|| "any".to_owned(), |w| w.key())
    }
}

/// Saturday of the weekend that `today` is in or heading towards.
fn weekend_saturday(today: NaiveDate) -> NaiveDate {
    match today.weekday() {
        Weekday::Sun => today - Duration::days(1),
        other => {
            let days_until =
                Weekday::Sat.num_days_from_monday() - other.num_days_from_monday();
            today + Duration::days(i64::from(days_until))
        }
    }
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DateRange {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "any" | "" => Ok(DateRange::Any),
            "today" => Ok(DateRange::Today),
            "weekend" | "this_weekend" => Ok(DateRange::Weekend),
            "next_weekend" => Ok(DateRange::NextWeekend),
            other => Err(CoreError::InvalidDateRange(other.to_owned())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    // 2026-10-14 is a Wednesday.
    #[test]
    fn any_has_no_bounds() {
        assert!(DateRange::Any.resolve(d(2026, 10, 14)).is_none());
        assert_eq!(DateRange::Any.resolved_key(d(2026, 10, 14)), "any");
    }

    #[test]
    fn today_is_a_single_day() {
        let w = DateRange::Today.resolve(d(2026, 10, 14)).unwrap();
        assert_eq!(w.from, d(2026, 10, 14));
        assert_eq!(w.to, d(2026, 10, 14));
    }

    #[test]
    fn weekend_from_midweek_is_upcoming_saturday_and_sunday() {
        let w = DateRange::Weekend.resolve(d(2026, 10, 14)).unwrap();
        assert_eq!(w.from, d(2026, 10, 17));
        assert_eq!(w.to, d(2026, 10, 18));
    }

    #[test]
    fn weekend_on_saturday_starts_today() {
        let w = DateRange::Weekend.resolve(d(2026, 10, 17)).unwrap();
        assert_eq!(w.from, d(2026, 10, 17));
        assert_eq!(w.to, d(2026, 10, 18));
    }

    #[test]
    fn weekend_on_sunday_is_just_today() {
        let w = DateRange::Weekend.resolve(d(2026, 10, 18)).unwrap();
        assert_eq!(w.from, d(2026, 10, 18));
        assert_eq!(w.to, d(2026, 10, 18));
    }

    #[test]
    fn next_weekend_is_seven_days_after_this_weekend() {
        let w = DateRange::NextWeekend.resolve(d(2026, 10, 14)).unwrap();
        assert_eq!(w.from, d(2026, 10, 24));
        assert_eq!(w.to, d(2026, 10, 25));

        let from_sunday = DateRange::NextWeekend.resolve(d(2026, 10, 18)).unwrap();
        assert_eq!(from_sunday.from, d(2026, 10, 24));
    }

    #[test]
    fn parses_known_presets() {
        assert_eq!("weekend".parse::<DateRange>().unwrap(), DateRange::Weekend);
        assert_eq!(
            "Next_Weekend".parse::<DateRange>().unwrap(),
            DateRange::NextWeekend
        );
        assert!(matches!(
            "fortnight".parse::<DateRange>(),
            Err(CoreError::InvalidDateRange(ref v)) if v == "fortnight"
        ));
    }

    #[test]
    fn serde_uses_snake_case() {
        let json = serde_json::to_string(&DateRange::NextWeekend).unwrap();
        assert_eq!(json, "\"next_weekend\"");
    }
}
