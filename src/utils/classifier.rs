use crate::database::models::{DayKey, PeriodKey};
use crate::utils::time::{day_key_of, local_midnight, period_key_of};
use chrono::{DateTime, FixedOffset, NaiveDate, Utc, Weekday};
use regex::Regex;
use std::sync::LazyLock;
use thiserror::Error;

// `[2024-03-04 / standup] anything`
static TITLE_DATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*\[\s*(\d{4}-\d{2}-\d{2})\s*[/|:\-]\s*([^\]]*?)\s*\]")
        .expect("title pattern compiles")
});

/// Where qualifying activity comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackedSource {
    /// Every message in one flat channel.
    Channel(u64),
    /// Every message in any thread of one forum.
    ForumThreads(u64),
    /// Only the opening post of each forum thread, credited to its owner.
    ForumOpeners(u64),
}

impl TrackedSource {
    pub fn channel_id(&self) -> u64 {
        match self {
            TrackedSource::Channel(id)
            | TrackedSource::ForumThreads(id)
            | TrackedSource::ForumOpeners(id) => *id,
        }
    }

    pub fn is_forum(&self) -> bool {
        !matches!(self, TrackedSource::Channel(_))
    }
}

/// A message or thread creation as delivered by the gateway.
#[derive(Debug, Clone)]
pub struct ActivityEvent {
    pub author_id: u64,
    pub author_name: String,
    pub is_bot: bool,
    pub channel_id: u64,
    pub parent_id: Option<u64>,
    pub is_thread_opener: bool,
    pub thread_owner_id: Option<u64>,
    pub thread_owner_name: Option<String>,
    pub thread_title: Option<String>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QualifyingEvent {
    pub user_id: u64,
    pub display_name: String,
    pub effective_at: DateTime<Utc>,
    pub day_key: DayKey,
    pub period_key: PeriodKey,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Rejection {
    #[error("author is a bot")]
    Bot,
    #[error("not posted in the tracked source")]
    UntrackedSource,
    #[error("not the opening post of the thread")]
    NotThreadOpener,
    #[error("thread has no owner")]
    MissingThreadOwner,
    #[error("title does not start with a [YYYY-MM-DD / ...] tag: {0:?}")]
    MalformedTitle(String),
}

#[derive(Debug, Clone)]
pub struct Classifier {
    pub source: TrackedSource,
    pub title_dates: bool,
    pub offset: FixedOffset,
    pub week_start: Weekday,
}

impl Classifier {
    pub fn classify(&self, event: &ActivityEvent) -> Result<QualifyingEvent, Rejection> {
        if event.is_bot {
            return Err(Rejection::Bot);
        }

        let (user_id, display_name) = match self.source {
            TrackedSource::Channel(id) => {
                if event.channel_id != id {
                    return Err(Rejection::UntrackedSource);
                }
                (event.author_id, event.author_name.clone())
            }
            TrackedSource::ForumThreads(id) => {
                if event.parent_id != Some(id) {
                    return Err(Rejection::UntrackedSource);
                }
                (event.author_id, event.author_name.clone())
            }
            TrackedSource::ForumOpeners(id) => {
                if event.parent_id != Some(id) {
                    return Err(Rejection::UntrackedSource);
                }
                if !event.is_thread_opener {
                    return Err(Rejection::NotThreadOpener);
                }
                let owner = event.thread_owner_id.ok_or(Rejection::MissingThreadOwner)?;
                (owner, owner_name(event, owner))
            }
        };

        let declared = if self.title_dates && self.source.is_forum() {
            let title = event.thread_title.as_deref().unwrap_or_default();
            let date = parse_title_date(title)
                .ok_or_else(|| Rejection::MalformedTitle(title.to_string()))?;
            Some(date)
        } else {
            None
        };

        let effective_at = match declared {
            Some(date) => local_midnight(date, self.offset),
            None => event.timestamp,
        };

        Ok(QualifyingEvent {
            user_id,
            display_name,
            effective_at,
            day_key: day_key_of(effective_at, self.offset),
            period_key: period_key_of(effective_at, self.offset, self.week_start),
        })
    }
}

fn owner_name(event: &ActivityEvent, owner: u64) -> String {
    if owner == event.author_id {
        return event.author_name.clone();
    }
    event
        .thread_owner_name
        .clone()
        .unwrap_or_else(|| owner.to_string())
}

/// Extracts the date a thread title declares, if the title has the
/// `[YYYY-MM-DD <sep> text]` prefix and the date exists on the calendar.
pub fn parse_title_date(title: &str) -> Option<NaiveDate> {
    let captures = TITLE_DATE.captures(title)?;
    NaiveDate::parse_from_str(&captures[1], "%Y-%m-%d").ok()
}
