use std::str::FromStr;

use chrono::{Datelike, Duration, Utc};

use crate::api::errors::FacetError;
use crate::api::types::Scalar;
use crate::host::TimeBucketer;

/// Default histogram bucketing: fixed-width or calendar-aligned (UTC)
/// intervals over epoch-millisecond timestamps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateInterval {
  Fixed(i64),
  Calendar(CalendarUnit),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalendarUnit {
  Day,
  Week,
  Month,
  Quarter,
  Year,
}

impl FromStr for DateInterval {
  type Err = FacetError;

  fn from_str(raw: &str) -> Result<Self, Self::Err> {
    if let Some(unit) = parse_calendar_interval(raw) {
      return Ok(DateInterval::Calendar(unit));
    }
    let seconds = parse_interval_seconds(raw)
      .ok_or_else(|| FacetError::invalid(format!("invalid interval `{raw}`")))?;
    let millis = (seconds * 1_000.0).round() as i64;
    if millis <= 0 {
      return Err(FacetError::invalid(format!(
        "interval `{raw}` must be at least one millisecond"
      )));
    }
    Ok(DateInterval::Fixed(millis))
  }
}

impl TimeBucketer for DateInterval {
  fn bucket(&self, timestamp_millis: i64) -> Option<i64> {
    match self {
      DateInterval::Fixed(step) => timestamp_millis.div_euclid(*step).checked_mul(*step),
      DateInterval::Calendar(unit) => truncate_calendar(timestamp_millis, *unit),
    }
  }
}

/// Named calendar units only. Numeric forms such as `1m` or `1w` are fixed
/// durations.
pub(crate) fn parse_calendar_interval(raw: &str) -> Option<CalendarUnit> {
  match raw.to_ascii_lowercase().as_str() {
    "day" => Some(CalendarUnit::Day),
    "week" => Some(CalendarUnit::Week),
    "month" => Some(CalendarUnit::Month),
    "quarter" => Some(CalendarUnit::Quarter),
    "year" => Some(CalendarUnit::Year),
    _ => None,
  }
}

/// Parses `<number><unit>` with units `ms`, `s`, `m`, `h`, `d`, `w`; a bare
/// number is seconds.
pub(crate) fn parse_interval_seconds(raw: &str) -> Option<f64> {
  let mut idx = 0usize;
  for ch in raw.chars() {
    if ch.is_ascii_digit() || ch == '.' {
      idx += ch.len_utf8();
    } else {
      break;
    }
  }
  if idx == 0 {
    return None;
  }
  let value: f64 = raw[..idx].parse().ok()?;
  let mult = match &raw[idx..] {
    "" | "s" => 1.0,
    "ms" => 0.001,
    "m" => 60.0,
    "h" => 3600.0,
    "d" => 86_400.0,
    "w" => 604_800.0,
    _ => return None,
  };
  Some(value * mult)
}

fn truncate_calendar(value: i64, unit: CalendarUnit) -> Option<i64> {
  let dt = chrono::DateTime::<Utc>::from_timestamp_millis(value)?;
  let date = dt.date_naive();
  let start_date = match unit {
    CalendarUnit::Day => date,
    CalendarUnit::Week => {
      date.checked_sub_signed(Duration::days(date.weekday().num_days_from_monday() as i64))?
    }
    CalendarUnit::Month => date.with_day(1)?,
    CalendarUnit::Quarter => {
      let quarter_start = ((date.month() - 1) / 3) * 3 + 1;
      date.with_day(1)?.with_month(quarter_start)?
    }
    CalendarUnit::Year => date.with_day(1)?.with_month(1)?,
  };
  let start_dt = start_date.and_hms_opt(0, 0, 0)?;
  Some(chrono::DateTime::<Utc>::from_naive_utc_and_offset(start_dt, Utc).timestamp_millis())
}

/// Epoch-millisecond view of a timestamp field value. Integers are taken as
/// millis, strings may be integers or RFC 3339 datetimes.
pub fn timestamp_millis(value: &Scalar) -> Option<i64> {
  match value {
    Scalar::Int(v) => Some(*v),
    Scalar::Str(s) => s.trim().parse::<i64>().ok().or_else(|| {
      chrono::DateTime::parse_from_rfc3339(s.trim())
        .ok()
        .map(|dt| dt.timestamp_millis())
    }),
  }
}
