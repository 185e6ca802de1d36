use crate::database::models::{DayKey, PeriodKey};
use anyhow::Result;
use chrono::{DateTime, Datelike, Days, FixedOffset, NaiveDate, NaiveTime, Utc, Weekday};

pub fn jst_offset() -> FixedOffset {
    FixedOffset::east_opt(9 * 3600).unwrap()
}

/// Parses `+09:00`, `-05:30`, `+9` or a bare hour count such as `9`.
pub fn parse_utc_offset(value: &str) -> Result<FixedOffset> {
    let value = value.trim();
    let (sign, rest) = match value.strip_prefix('-') {
        Some(rest) => (-1, rest),
        None => (1, value.strip_prefix('+').unwrap_or(value)),
    };

    let (hours, minutes) = match rest.split_once(':') {
        Some((h, m)) => (h.parse::<i32>()?, m.parse::<i32>()?),
        None => (rest.parse::<i32>()?, 0),
    };

    if !(0..=23).contains(&hours) || !(0..=59).contains(&minutes) {
        return Err(anyhow::anyhow!("UTC offset out of range: {}", value));
    }

    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
        .ok_or_else(|| anyhow::anyhow!("UTC offset out of range: {}", value))
}

pub fn parse_time_string(time_str: &str) -> Result<NaiveTime> {
    let time_str = time_str.trim();

    if let Ok(time) = NaiveTime::parse_from_str(time_str, "%H:%M") {
        return Ok(time);
    }

    if let Ok(time) = NaiveTime::parse_from_str(time_str, "%H:%M:%S") {
        return Ok(time);
    }

    Err(anyhow::anyhow!("Invalid time format. Use HH:MM or HH:MM:SS"))
}

pub fn local_date(instant: DateTime<Utc>, offset: FixedOffset) -> NaiveDate {
    instant.with_timezone(&offset).date_naive()
}

/// First day of the week containing `date`. Days before `week_start` belong
/// to the previous week, so with a Monday start a Sunday steps back six days.
pub fn week_start_of(date: NaiveDate, week_start: Weekday) -> NaiveDate {
    let since_start = (7 + date.weekday().num_days_from_monday()
        - week_start.num_days_from_monday())
        % 7;
    date.checked_sub_days(Days::new(since_start as u64))
        .unwrap_or(date)
}

pub fn period_key_of(instant: DateTime<Utc>, offset: FixedOffset, week_start: Weekday) -> PeriodKey {
    period_key_of_date(local_date(instant, offset), week_start)
}

pub fn period_key_of_date(date: NaiveDate, week_start: Weekday) -> PeriodKey {
    PeriodKey::from_date(week_start_of(date, week_start))
}

pub fn day_key_of(instant: DateTime<Utc>, offset: FixedOffset) -> DayKey {
    DayKey::from_date(local_date(instant, offset))
}

/// The instant `date` begins in the given offset.
pub fn local_midnight(date: NaiveDate, offset: FixedOffset) -> DateTime<Utc> {
    let midnight = date.and_time(NaiveTime::default());
    (midnight - offset_duration(offset)).and_utc()
}

fn offset_duration(offset: FixedOffset) -> chrono::Duration {
    chrono::Duration::seconds(offset.local_minus_utc() as i64)
}

pub fn format_datetime(datetime: DateTime<Utc>, offset: FixedOffset) -> String {
    datetime
        .with_timezone(&offset)
        .format("%Y-%m-%d %H:%M:%S %:z")
        .to_string()
}
