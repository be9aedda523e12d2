//! Date, time and duration values.
//!
//! Values with no timezone are compared as if they were in UTC. Durations are ordered
//! by `(months, seconds)`, which gives every duration a total order usable as a key.

use crate::error::XdmError;
use chrono::{FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, TimeDelta};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

fn split_timezone(s: &str) -> Result<(&str, Option<FixedOffset>), XdmError> {
    if let Some(rest) = s.strip_suffix('Z') {
        return Ok((rest, FixedOffset::east_opt(0)));
    }
    let bytes = s.as_bytes();
    if bytes.len() > 6 {
        let sign_at = bytes.len() - 6;
        let sign = bytes[sign_at];
        if (sign == b'+' || sign == b'-') && bytes[bytes.len() - 3] == b':' {
            let tz = &s[sign_at + 1..];
            let (hours, minutes) = tz
                .split_once(':')
                .ok_or_else(|| XdmError::lexical("timezone", s))?;
            let hours: i32 = hours.parse().map_err(|_| XdmError::lexical("timezone", s))?;
            let minutes: i32 = minutes
                .parse()
                .map_err(|_| XdmError::lexical("timezone", s))?;
            if hours > 14 || minutes > 59 {
                return Err(XdmError::lexical("timezone", s));
            }
            let mut secs = hours * 3600 + minutes * 60;
            if sign == b'-' {
                secs = -secs;
            }
            let offset = FixedOffset::east_opt(secs).ok_or_else(|| XdmError::lexical("timezone", s))?;
            return Ok((&s[..sign_at], Some(offset)));
        }
    }
    Ok((s, None))
}

fn format_timezone(tz: Option<FixedOffset>, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match tz {
        None => Ok(()),
        Some(offset) if offset.local_minus_utc() == 0 => write!(f, "Z"),
        Some(offset) => {
            let secs = offset.local_minus_utc();
            let sign = if secs < 0 { '-' } else { '+' };
            let secs = secs.abs();
            write!(f, "{}{:02}:{:02}", sign, secs / 3600, (secs % 3600) / 60)
        }
    }
}

fn to_utc(naive: NaiveDateTime, tz: Option<FixedOffset>) -> NaiveDateTime {
    match tz {
        Some(offset) => naive - TimeDelta::seconds(i64::from(offset.local_minus_utc())),
        None => naive,
    }
}

macro_rules! ordered_by_instant {
    ($ty:ty) => {
        impl PartialEq for $ty {
            fn eq(&self, other: &Self) -> bool {
                self.instant() == other.instant()
            }
        }

        impl Eq for $ty {}

        impl Hash for $ty {
            fn hash<H: Hasher>(&self, state: &mut H) {
                self.instant().hash(state);
            }
        }

        impl PartialOrd for $ty {
            fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
                Some(self.cmp(other))
            }
        }

        impl Ord for $ty {
            fn cmp(&self, other: &Self) -> Ordering {
                self.instant().cmp(&other.instant())
            }
        }
    };
}

#[derive(Debug, Clone, Copy)]
pub struct DateValue {
    pub date: NaiveDate,
    pub timezone: Option<FixedOffset>,
}

impl DateValue {
    pub fn parse(s: &str) -> Result<Self, XdmError> {
        let s = s.trim();
        let (body, timezone) = split_timezone(s)?;
        let date =
            NaiveDate::parse_from_str(body, "%Y-%m-%d").map_err(|_| XdmError::lexical("xs:date", s))?;
        Ok(Self { date, timezone })
    }

    fn instant(&self) -> NaiveDateTime {
        to_utc(self.date.and_time(NaiveTime::MIN), self.timezone)
    }
}

impl fmt::Display for DateValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.date.format("%Y-%m-%d"))?;
        format_timezone(self.timezone, f)
    }
}

ordered_by_instant!(DateValue);

#[derive(Debug, Clone, Copy)]
pub struct DateTimeValue {
    pub value: NaiveDateTime,
    pub timezone: Option<FixedOffset>,
}

impl DateTimeValue {
    pub fn parse(s: &str) -> Result<Self, XdmError> {
        let s = s.trim();
        let (body, timezone) = split_timezone(s)?;
        let value = NaiveDateTime::parse_from_str(body, "%Y-%m-%dT%H:%M:%S%.f")
            .map_err(|_| XdmError::lexical("xs:dateTime", s))?;
        Ok(Self { value, timezone })
    }

    pub fn from_date(date: &DateValue) -> Self {
        Self {
            value: date.date.and_time(NaiveTime::MIN),
            timezone: date.timezone,
        }
    }

    fn instant(&self) -> NaiveDateTime {
        to_utc(self.value, self.timezone)
    }
}

impl fmt::Display for DateTimeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.value.format("%Y-%m-%dT%H:%M:%S%.f"))?;
        format_timezone(self.timezone, f)
    }
}

ordered_by_instant!(DateTimeValue);

#[derive(Debug, Clone, Copy)]
pub struct TimeValue {
    pub time: NaiveTime,
    pub timezone: Option<FixedOffset>,
}

impl TimeValue {
    pub fn parse(s: &str) -> Result<Self, XdmError> {
        let s = s.trim();
        let (body, timezone) = split_timezone(s)?;
        let time = NaiveTime::parse_from_str(body, "%H:%M:%S%.f")
            .map_err(|_| XdmError::lexical("xs:time", s))?;
        Ok(Self { time, timezone })
    }

    fn instant(&self) -> NaiveDateTime {
        // Reference date used by XML Schema for comparing times.
        let reference = NaiveDate::from_ymd_opt(1972, 12, 31).unwrap_or_default();
        to_utc(reference.and_time(self.time), self.timezone)
    }
}

impl fmt::Display for TimeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.time.format("%H:%M:%S%.f"))?;
        format_timezone(self.timezone, f)
    }
}

ordered_by_instant!(TimeValue);

/// An `xs:duration` split into a month component and a second component.
/// Both components carry the same sign.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct DurationValue {
    pub months: i64,
    pub seconds: Decimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DurationKind {
    Any,
    DayTime,
    YearMonth,
}

impl DurationValue {
    pub fn parse(s: &str, kind: DurationKind) -> Result<Self, XdmError> {
        let target = match kind {
            DurationKind::Any => "xs:duration",
            DurationKind::DayTime => "xs:dayTimeDuration",
            DurationKind::YearMonth => "xs:yearMonthDuration",
        };
        let original = s.trim();
        let err = || XdmError::lexical(target, original);

        let (negative, rest) = match original.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, original),
        };
        let rest = rest.strip_prefix('P').ok_or_else(err)?;
        let (date_part, time_part) = match rest.split_once('T') {
            Some((d, t)) => {
                if t.is_empty() {
                    return Err(err());
                }
                (d, Some(t))
            }
            None => (rest, None),
        };
        if date_part.is_empty() && time_part.is_none() {
            return Err(err());
        }

        let mut months: i64 = 0;
        let mut seconds = Decimal::ZERO;
        let mut has_year_month = false;
        let mut has_day_time = false;

        let mut number = String::new();
        let mut last_rank = 0;
        for c in date_part.chars() {
            if c.is_ascii_digit() {
                number.push(c);
                continue;
            }
            let value: i64 = number.parse().map_err(|_| err())?;
            number.clear();
            let rank = match c {
                'Y' => {
                    months += value * 12;
                    1
                }
                'M' => {
                    months += value;
                    2
                }
                'D' => {
                    seconds += Decimal::from(value) * Decimal::from(86_400);
                    has_day_time = true;
                    3
                }
                _ => return Err(err()),
            };
            if rank <= last_rank {
                return Err(err());
            }
            if rank < 3 {
                has_year_month = true;
            }
            last_rank = rank;
        }
        if !number.is_empty() {
            return Err(err());
        }

        if let Some(time_part) = time_part {
            has_day_time = true;
            let mut last_rank = 0;
            for c in time_part.chars() {
                if c.is_ascii_digit() || c == '.' {
                    number.push(c);
                    continue;
                }
                let rank = match c {
                    'H' => 1,
                    'M' => 2,
                    'S' => 3,
                    _ => return Err(err()),
                };
                if rank <= last_rank || (rank < 3 && number.contains('.')) {
                    return Err(err());
                }
                let value = Decimal::from_str(&number).map_err(|_| err())?;
                number.clear();
                let factor = match rank {
                    1 => 3600,
                    2 => 60,
                    _ => 1,
                };
                seconds += value * Decimal::from(factor);
                last_rank = rank;
            }
            if !number.is_empty() {
                return Err(err());
            }
        }

        match kind {
            DurationKind::DayTime if has_year_month => return Err(err()),
            DurationKind::YearMonth if has_day_time => return Err(err()),
            _ => {}
        }

        if negative {
            months = -months;
            seconds = -seconds;
        }
        Ok(Self { months, seconds })
    }

    pub fn is_negative(&self) -> bool {
        self.months < 0 || (self.seconds.is_sign_negative() && !self.seconds.is_zero())
    }

    pub fn format(&self, kind: DurationKind) -> String {
        let negative = self.is_negative();
        let months = self.months.abs();
        let seconds = self.seconds.abs();
        let mut out = String::new();
        if negative {
            out.push('-');
        }
        out.push('P');

        if kind != DurationKind::DayTime {
            let (years, months) = (months / 12, months % 12);
            if years > 0 {
                out.push_str(&format!("{}Y", years));
            }
            if months > 0 {
                out.push_str(&format!("{}M", months));
            }
        }

        if kind != DurationKind::YearMonth {
            let whole = seconds.trunc();
            let fraction = seconds - whole;
            let whole = whole.to_i64().unwrap_or(0);
            let (days, rem) = (whole / 86_400, whole % 86_400);
            let (hours, rem) = (rem / 3600, rem % 3600);
            let (minutes, secs) = (rem / 60, rem % 60);
            if days > 0 {
                out.push_str(&format!("{}D", days));
            }
            if hours > 0 || minutes > 0 || secs > 0 || !fraction.is_zero() {
                out.push('T');
                if hours > 0 {
                    out.push_str(&format!("{}H", hours));
                }
                if minutes > 0 {
                    out.push_str(&format!("{}M", minutes));
                }
                if secs > 0 || !fraction.is_zero() {
                    let total = Decimal::from(secs) + fraction;
                    out.push_str(&format!("{}S", total.normalize()));
                }
            }
        }

        if out.ends_with('P') {
            match kind {
                DurationKind::YearMonth => out.push_str("0M"),
                _ => out.push_str("T0S"),
            }
            if negative {
                out.remove(0);
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_date_with_timezone_compares_in_utc() {
        let a = DateTimeValue::parse("2024-01-01T10:00:00+02:00").unwrap();
        let b = DateTimeValue::parse("2024-01-01T08:00:00Z").unwrap();
        assert_eq!(a, b);
        let c = DateTimeValue::parse("2024-01-01T08:00:01").unwrap();
        assert!(b < c);
    }

    #[test]
    fn test_date_round_trips_lexical_form() {
        assert_eq!(DateValue::parse("2023-05-17").unwrap().to_string(), "2023-05-17");
        assert_eq!(DateValue::parse("2023-05-17-05:00").unwrap().to_string(), "2023-05-17-05:00");
        assert!(DateValue::parse("2023-13-01").is_err());
    }

    #[test]
    fn test_duration_parse_and_format() {
        let d = DurationValue::parse("P1Y2M3DT4H5M6.5S", DurationKind::Any).unwrap();
        assert_eq!(d.months, 14);
        assert_eq!(d.format(DurationKind::Any), "P1Y2M3DT4H5M6.5S");

        let neg = DurationValue::parse("-PT90M", DurationKind::DayTime).unwrap();
        assert_eq!(neg.format(DurationKind::DayTime), "-PT1H30M");

        assert!(DurationValue::parse("P1Y", DurationKind::DayTime).is_err());
        assert!(DurationValue::parse("P1D", DurationKind::YearMonth).is_err());
        assert!(DurationValue::parse("P", DurationKind::Any).is_err());
        assert!(DurationValue::parse("PT", DurationKind::Any).is_err());
        assert_eq!(
            DurationValue::parse("PT0S", DurationKind::Any).unwrap().format(DurationKind::Any),
            "PT0S"
        );
    }
}
