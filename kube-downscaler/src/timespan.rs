//! Time windows during which workloads are scaled down (or kept up).
//!
//! A window is either absolute (`2024-01-01T00:00:00Z - 2024-01-02T00:00:00Z`) or
//! relative (`mon-fri 08:00-18:00 Europe/Berlin`). Several windows are joined
//! with commas and a list is active whenever any one of its windows is.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, Timelike, Utc, Weekday};
use chrono_tz::Tz;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{Error, Result};

static ABSOLUTE_TIMESPAN: Lazy<Regex> = Lazy::new(|| {
    let rfc3339 = r"(.+Z|.+[+-]\d{2}:\d{2})";
    Regex::new(&format!(r"^{rfc3339} *- *{rfc3339}$")).expect("absolute timespan pattern compiles")
});

const NANOS_PER_SECOND: u64 = 1_000_000_000;

/// Nanoseconds since local midnight. `24:00` is representable and sorts after
/// every instant of the day.
#[derive(Debug, Clone, Copy, Eq, Ord, PartialEq, PartialOrd)]
struct TimeOfDay(u64);

impl TimeOfDay {
    fn from_hm(hour: u32, minute: u32) -> Self {
        TimeOfDay((u64::from(hour) * 3600 + u64::from(minute) * 60) * NANOS_PER_SECOND)
    }

    fn of<T: Timelike>(time: &T) -> Self {
        let nanos = u64::from(time.nanosecond()).min(NANOS_PER_SECOND - 1);
        TimeOfDay(u64::from(time.num_seconds_from_midnight()) * NANOS_PER_SECOND + nanos)
    }

    fn parse(value: &str) -> Result<Self> {
        let format_error = |reason: &str| Error::TimeSpanFormat {
            span: value.to_string(),
            reason: reason.to_string(),
        };

        let (hour, minute) = value
            .split_once(':')
            .ok_or_else(|| format_error("time of day must be HH:MM"))?;
        let hour: i32 = hour
            .parse()
            .map_err(|_| format_error("failed to parse hour of time of day"))?;
        let minute: i32 = minute
            .parse()
            .map_err(|_| format_error("failed to parse minute of time of day"))?;

        if !(0..=24).contains(&hour) || !(0..60).contains(&minute) {
            return Err(Error::TimeOfDayRange {
                value: value.to_string(),
            });
        }
        Ok(TimeOfDay::from_hm(hour as u32, minute as u32))
    }
}

impl fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let minutes = self.0 / NANOS_PER_SECOND / 60;
        write!(f, "{:02}:{:02}", minutes / 60, minutes % 60)
    }
}

/// A recurring window: a weekday range combined with a time-of-day range,
/// evaluated in `timezone`. Either range may wrap (`fri-mon`, `22:00-06:00`).
#[derive(Debug, Clone, PartialEq)]
pub struct RelativeTimeSpan {
    timezone: Tz,
    weekday_from: Weekday,
    weekday_to: Weekday,
    time_from: TimeOfDay,
    time_to: TimeOfDay,
}

impl RelativeTimeSpan {
    fn is_weekday_in_range(&self, weekday: Weekday) -> bool {
        let day = weekday.num_days_from_sunday();
        let from = self.weekday_from.num_days_from_sunday();
        let to = self.weekday_to.num_days_from_sunday();
        if from <= to {
            return day >= from && day <= to;
        }
        day >= from || day <= to
    }

    // The wrapping branch is inclusive at both ends while the plain branch
    // excludes its upper bound. Kept as-is to match existing schedules.
    fn is_time_of_day_in_range(&self, time: TimeOfDay) -> bool {
        if self.time_from > self.time_to {
            return time >= self.time_from || time <= self.time_to;
        }
        time >= self.time_from && time < self.time_to
    }

    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        let local = instant.with_timezone(&self.timezone);
        self.is_time_of_day_in_range(TimeOfDay::of(&local)) && self.is_weekday_in_range(local.weekday())
    }
}

impl FromStr for RelativeTimeSpan {
    type Err = Error;

    fn from_str(span: &str) -> Result<Self> {
        let invalid = || Error::TimeSpanFormat {
            span: span.to_string(),
            reason: "expected '<weekday>-<weekday> <HH:MM>-<HH:MM> <timezone>'".to_string(),
        };

        let parts: Vec<&str> = span.split(' ').collect();
        let [weekdays, times, timezone] = parts.as_slice() else {
            return Err(invalid());
        };
        let (weekday_from, weekday_to) = weekdays.split_once('-').ok_or_else(invalid)?;
        let (time_from, time_to) = times.split_once('-').ok_or_else(invalid)?;
        if weekday_to.contains('-') || time_to.contains('-') {
            return Err(invalid());
        }

        let timezone = timezone.parse::<Tz>().map_err(|err| Error::Timezone {
            zone: timezone.to_string(),
            reason: err.to_string(),
        })?;

        Ok(RelativeTimeSpan {
            timezone,
            time_from: TimeOfDay::parse(time_from)?,
            time_to: TimeOfDay::parse(time_to)?,
            weekday_from: parse_weekday(weekday_from, span)?,
            weekday_to: parse_weekday(weekday_to, span)?,
        })
    }
}

impl fmt::Display for RelativeTimeSpan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}-{} {}-{} {}",
            weekday_name(self.weekday_from),
            weekday_name(self.weekday_to),
            self.time_from,
            self.time_to,
            self.timezone
        )
    }
}

fn parse_weekday(value: &str, span: &str) -> Result<Weekday> {
    let weekday = match value.to_ascii_lowercase().as_str() {
        "sun" => Weekday::Sun,
        "mon" => Weekday::Mon,
        "tue" => Weekday::Tue,
        "wed" => Weekday::Wed,
        "thu" => Weekday::Thu,
        "fri" => Weekday::Fri,
        "sat" => Weekday::Sat,
        _ => {
            return Err(Error::TimeSpanFormat {
                span: span.to_string(),
                reason: format!("invalid weekday {value:?}"),
            });
        }
    };
    Ok(weekday)
}

fn weekday_name(weekday: Weekday) -> &'static str {
    match weekday {
        Weekday::Sun => "sun",
        Weekday::Mon => "mon",
        Weekday::Tue => "tue",
        Weekday::Wed => "wed",
        Weekday::Thu => "thu",
        Weekday::Fri => "fri",
        Weekday::Sat => "sat",
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TimeSpan {
    /// Matches `from <= now < to`.
    Absolute { from: DateTime<Utc>, to: DateTime<Utc> },
    Relative(RelativeTimeSpan),
}

impl TimeSpan {
    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        match self {
            TimeSpan::Absolute { from, to } => *from <= instant && instant < *to,
            TimeSpan::Relative(span) => span.contains(instant),
        }
    }

    fn parse_absolute(span: &str, from: &str, to: &str) -> Result<Self> {
        let timestamp = |value: &str| {
            DateTime::parse_from_rfc3339(value.trim())
                .map(|parsed| parsed.with_timezone(&Utc))
                .map_err(|err| Error::TimeSpanFormat {
                    span: span.to_string(),
                    reason: format!("failed to parse rfc3339 timestamp {value:?}: {err}"),
                })
        };
        Ok(TimeSpan::Absolute {
            from: timestamp(from)?,
            to: timestamp(to)?,
        })
    }
}

impl FromStr for TimeSpan {
    type Err = Error;

    fn from_str(span: &str) -> Result<Self> {
        let span = span.trim();
        if let Some(captures) = ABSOLUTE_TIMESPAN.captures(span) {
            return TimeSpan::parse_absolute(span, &captures[1], &captures[2]);
        }
        span.parse().map(TimeSpan::Relative)
    }
}

impl fmt::Display for TimeSpan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimeSpan::Absolute { from, to } => write!(f, "{} - {}", from.to_rfc3339(), to.to_rfc3339()),
            TimeSpan::Relative(span) => write!(f, "{span}"),
        }
    }
}

/// Comma separated list of windows. An empty list is never active.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TimeSpans(Vec<TimeSpan>);

impl TimeSpans {
    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        self.0.iter().any(|span| span.contains(instant))
    }

    /// Whether the wall clock is currently inside any window.
    pub fn is_active(&self) -> bool {
        self.contains(Utc::now())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromStr for TimeSpans {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self> {
        if value.trim().is_empty() {
            return Ok(TimeSpans::default());
        }
        value
            .split(',')
            .map(str::parse)
            .collect::<Result<Vec<TimeSpan>>>()
            .map(TimeSpans)
    }
}

impl fmt::Display for TimeSpans {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let spans: Vec<String> = self.0.iter().map(ToString::to_string).collect();
        f.write_str(&spans.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(year: i32, month: u32, day: u32, hour: u32, minute: u32, second: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(year, month, day, hour, minute, second).unwrap()
    }

    #[test]
    fn weekday_range_wraps_over_the_weekend() {
        let spans: TimeSpans = "fri-mon 00:00-23:59 UTC".parse().unwrap();
        // 2024-01-06 is a Saturday.
        assert!(spans.contains(at(2024, 1, 6, 12, 0, 0)));
        assert!(spans.contains(at(2024, 1, 7, 12, 0, 0)));
        assert!(spans.contains(at(2024, 1, 8, 12, 0, 0)));
        assert!(spans.contains(at(2024, 1, 5, 12, 0, 0)));
        assert!(!spans.contains(at(2024, 1, 10, 12, 0, 0)));
    }

    #[test]
    fn time_range_wraps_over_midnight() {
        let spans: TimeSpans = "mon-fri 22:00-06:00 UTC".parse().unwrap();
        assert!(spans.contains(at(2024, 1, 9, 23, 0, 0)));
        assert!(spans.contains(at(2024, 1, 9, 2, 0, 0)));
        assert!(!spans.contains(at(2024, 1, 9, 12, 0, 0)));
    }

    #[test]
    fn wrapping_time_range_includes_both_ends() {
        let spans: TimeSpans = "mon-sun 22:00-06:00 UTC".parse().unwrap();
        assert!(spans.contains(at(2024, 1, 9, 22, 0, 0)));
        assert!(spans.contains(at(2024, 1, 9, 6, 0, 0)));
        assert!(!spans.contains(at(2024, 1, 9, 6, 0, 1)));
    }

    #[test]
    fn plain_time_range_excludes_upper_bound() {
        let spans: TimeSpans = "mon-sun 08:00-18:00 UTC".parse().unwrap();
        assert!(spans.contains(at(2024, 1, 9, 8, 0, 0)));
        assert!(spans.contains(at(2024, 1, 9, 17, 59, 59)));
        assert!(!spans.contains(at(2024, 1, 9, 18, 0, 0)));
    }

    #[test]
    fn midnight_as_24_covers_the_whole_day() {
        let spans: TimeSpans = "sat-sun 00:00-24:00 UTC".parse().unwrap();
        assert!(spans.contains(at(2024, 1, 6, 23, 59, 59)));
        assert!(!spans.contains(at(2024, 1, 8, 0, 0, 0)));
    }

    #[test]
    fn absolute_span_is_half_open() {
        let spans: TimeSpans = "2024-01-01T00:00:00Z - 2024-01-02T00:00:00Z".parse().unwrap();
        assert!(spans.contains(at(2024, 1, 1, 0, 0, 0)));
        assert!(spans.contains(at(2024, 1, 1, 23, 59, 59)));
        assert!(!spans.contains(at(2024, 1, 2, 0, 0, 0)));
        assert!(!spans.contains(at(2023, 12, 31, 23, 59, 59)));
    }

    #[test]
    fn absolute_span_accepts_offsets() {
        let span: TimeSpan = "2024-01-01T00:00:00+02:00-2024-01-01T06:00:00+02:00".parse().unwrap();
        assert!(span.contains(at(2023, 12, 31, 22, 0, 0)));
        assert!(!span.contains(at(2024, 1, 1, 4, 0, 0)));
    }

    #[test]
    fn relative_span_is_evaluated_in_its_timezone() {
        let spans: TimeSpans = "Mon-Fri 08:00-16:00 Europe/Berlin".parse().unwrap();
        // 07:30 UTC is 08:30 in Berlin during winter.
        assert!(spans.contains(at(2024, 1, 9, 7, 30, 0)));
        assert!(!spans.contains(at(2024, 1, 9, 15, 30, 0)));
    }

    #[test]
    fn any_matching_span_is_enough() {
        let spans: TimeSpans = "sat-sun 00:00-24:00 UTC, mon-fri 20:00-21:00 UTC".parse().unwrap();
        assert!(spans.contains(at(2024, 1, 9, 20, 30, 0)));
        assert!(spans.contains(at(2024, 1, 6, 10, 0, 0)));
        assert!(!spans.contains(at(2024, 1, 9, 10, 0, 0)));
    }

    #[test]
    fn empty_list_matches_nothing() {
        let spans: TimeSpans = "".parse().unwrap();
        assert!(spans.is_empty());
        assert!(!spans.contains(at(2024, 1, 9, 10, 0, 0)));
    }

    #[test]
    fn out_of_range_time_is_a_range_error() {
        let err = "mon-fri 25:00-06:00 UTC".parse::<TimeSpans>().unwrap_err();
        assert!(matches!(err, Error::TimeOfDayRange { .. }));
        let err = "mon-fri 08:60-09:00 UTC".parse::<TimeSpans>().unwrap_err();
        assert!(matches!(err, Error::TimeOfDayRange { .. }));
    }

    #[test]
    fn malformed_spans_are_format_errors() {
        for span in [
            "mon-fri 08:00-16:00",
            "monday-fri 08:00-16:00 UTC",
            "mon-fri 0800-1600 UTC",
            "mon-fri-sat 08:00-16:00 UTC",
            "mon-fri  08:00-16:00 UTC",
        ] {
            let err = span.parse::<TimeSpans>().unwrap_err();
            assert!(matches!(err, Error::TimeSpanFormat { .. }), "{span}: {err}");
        }
    }

    #[test]
    fn unknown_timezone_is_reported() {
        let err = "mon-fri 08:00-16:00 Mars/Olympus".parse::<TimeSpans>().unwrap_err();
        assert!(matches!(err, Error::Timezone { .. }));
    }

    #[test]
    fn display_round_trips_relative_spans() {
        let span: TimeSpan = "Mon-Fri 08:00-16:30 Europe/Berlin".parse().unwrap();
        assert_eq!(span.to_string(), "mon-fri 08:00-16:30 Europe/Berlin");
    }
}
