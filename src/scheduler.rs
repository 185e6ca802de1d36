use crate::utils::time::{format_datetime, local_date, parse_time_string};
use crate::utils::tracker::{ReportSink, RosterProvider, Tracker};
use chrono::{DateTime, Datelike, Days, FixedOffset, NaiveTime, Utc, Weekday};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use thiserror::Error;
use tokio::task::JoinHandle;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ScheduleError {
    #[error("expected `<day> HH:MM`, got {0:?}")]
    Shape(String),
    #[error("unknown day {0:?}, use a weekday name or `daily`")]
    Day(String),
    #[error("invalid time {0:?}, use HH:MM")]
    Time(String),
}

/// A weekly (or daily) wall-clock time such as `Sun 21:00`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Schedule {
    pub weekday: Option<Weekday>,
    pub time: NaiveTime,
}

impl Schedule {
    pub fn parse(expression: &str) -> Result<Self, ScheduleError> {
        let mut parts = expression.split_whitespace();
        let (Some(day), Some(time), None) = (parts.next(), parts.next(), parts.next()) else {
            return Err(ScheduleError::Shape(expression.to_string()));
        };

        let weekday = match day.to_ascii_lowercase().as_str() {
            "daily" | "*" => None,
            other => Some(
                other
                    .parse::<Weekday>()
                    .map_err(|_| ScheduleError::Day(day.to_string()))?,
            ),
        };
        let time = parse_time_string(time).map_err(|_| ScheduleError::Time(time.to_string()))?;

        Ok(Self { weekday, time })
    }

    /// The first firing strictly after `now`, evaluated in `offset`.
    pub fn next_after(&self, now: DateTime<Utc>, offset: FixedOffset) -> DateTime<Utc> {
        let today = local_date(now, offset);

        (0..=7u64)
            .filter_map(|ahead| today.checked_add_days(Days::new(ahead)))
            .filter(|date| self.weekday.is_none_or(|weekday| date.weekday() == weekday))
            .filter_map(|date| date.and_time(self.time).and_local_timezone(offset).single())
            .map(|local| local.with_timezone(&Utc))
            .find(|candidate| *candidate > now)
            .unwrap_or_else(|| now + chrono::Duration::days(7))
    }
}

impl fmt::Display for Schedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.weekday {
            Some(weekday) => write!(f, "{} {}", weekday, self.time.format("%H:%M")),
            None => write!(f, "daily {}", self.time.format("%H:%M")),
        }
    }
}

pub fn spawn_report_job(
    schedule: Schedule,
    offset: FixedOffset,
    tracker: Arc<Tracker>,
    roster: Arc<dyn RosterProvider>,
    sink: Arc<dyn ReportSink>,
) -> JoinHandle<()> {
    spawn_job("report", schedule, offset, move || {
        let tracker = tracker.clone();
        let roster = roster.clone();
        let sink = sink.clone();
        async move {
            match tracker
                .deliver_report(roster.as_ref(), sink.as_ref(), Utc::now())
                .await
            {
                Ok(true) => tracing::info!("Scheduled report delivered"),
                Ok(false) => tracing::info!("Scheduled report skipped"),
                Err(e) => tracing::error!("Scheduled report failed: {:?}", e),
            }
        }
    })
}

pub fn spawn_reset_job(schedule: Schedule, offset: FixedOffset, tracker: Arc<Tracker>) -> JoinHandle<()> {
    spawn_job("reset", schedule, offset, move || {
        let tracker = tracker.clone();
        async move {
            if let Err(e) = tracker.scheduled_reset(Utc::now()).await {
                tracing::error!("Scheduled reset failed: {:?}", e);
            }
        }
    })
}

fn spawn_job<F, Fut>(name: &'static str, schedule: Schedule, offset: FixedOffset, mut job: F) -> JoinHandle<()>
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    tokio::spawn(async move {
        tracing::info!("Scheduled {} job: {}", name, schedule);
        loop {
            let now = Utc::now();
            let next = schedule.next_after(now, offset);
            tracing::debug!("Next {} at {}", name, format_datetime(next, offset));

            let wait = (next - now).to_std().unwrap_or_default();
            tokio::time::sleep(wait).await;
            job().await;
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::time::jst_offset;
    use chrono::TimeZone;
    use rstest::rstest;

    fn jst(day: u32, hour: u32, minute: u32) -> DateTime<Utc> {
        jst_offset()
            .with_ymd_and_hms(2024, 3, day, hour, minute, 0)
            .unwrap()
            .with_timezone(&Utc)
    }

    #[rstest]
    #[case("Sun 21:00", Some(Weekday::Sun), 21, 0)]
    #[case("monday 00:00", Some(Weekday::Mon), 0, 0)]
    #[case("daily 09:30", None, 9, 30)]
    #[case("* 23:59:00", None, 23, 59)]
    fn parses_expressions(
        #[case] input: &str,
        #[case] weekday: Option<Weekday>,
        #[case] hour: u32,
        #[case] minute: u32,
    ) {
        let schedule = Schedule::parse(input).unwrap();
        assert_eq!(schedule.weekday, weekday);
        assert_eq!(schedule.time, NaiveTime::from_hms_opt(hour, minute, 0).unwrap());
    }

    #[rstest]
    #[case("Sun", ScheduleError::Shape("Sun".to_string()))]
    #[case("Funday 09:00", ScheduleError::Day("Funday".to_string()))]
    #[case("Sun 25:00", ScheduleError::Time("25:00".to_string()))]
    #[case("Sun 09:00 extra", ScheduleError::Shape("Sun 09:00 extra".to_string()))]
    fn rejects_bad_expressions(#[case] input: &str, #[case] expected: ScheduleError) {
        assert_eq!(Schedule::parse(input), Err(expected));
    }

    #[test]
    fn next_weekly_firing_is_later_this_week() {
        // Wednesday 2024-03-06 10:00 JST
        let schedule = Schedule::parse("Sun 21:00").unwrap();
        assert_eq!(schedule.next_after(jst(6, 10, 0), jst_offset()), jst(10, 21, 0));
    }

    #[test]
    fn firing_time_itself_schedules_the_following_week() {
        let schedule = Schedule::parse("Sun 21:00").unwrap();
        assert_eq!(schedule.next_after(jst(10, 21, 0), jst_offset()), jst(17, 21, 0));
    }

    #[test]
    fn daily_schedule_rolls_to_tomorrow_once_passed() {
        let schedule = Schedule::parse("daily 09:00").unwrap();
        assert_eq!(schedule.next_after(jst(6, 8, 59), jst_offset()), jst(6, 9, 0));
        assert_eq!(schedule.next_after(jst(6, 9, 1), jst_offset()), jst(7, 9, 0));
    }

    #[test]
    fn schedule_display_round_trips() {
        let schedule = Schedule::parse("sun 21:00").unwrap();
        assert_eq!(Schedule::parse(&schedule.to_string()).unwrap(), schedule);
    }
}
