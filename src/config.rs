use crate::database::models::RetentionPolicy;
use crate::scheduler::Schedule;
use crate::utils::classifier::{Classifier, TrackedSource};
use crate::utils::time::{jst_offset, parse_utc_offset};
use crate::utils::tracker::TrackerSettings;
use anyhow::Result;
use chrono::{FixedOffset, Weekday};
use std::env;
use std::str::FromStr;

#[derive(Debug, Clone)]
pub struct Config {
    pub discord_token: String,
    pub guild_id: u64,
    pub tracked_source: TrackedSource,
    pub title_dates: bool,
    pub report_channel_id: Option<u64>,
    pub required_role_id: Option<u64>,
    pub weekly_quota: u32,
    pub dedup_daily: bool,
    pub tag_underperformers: bool,
    pub report_schedule: Option<Schedule>,
    pub reset_schedule: Option<Schedule>,
    pub utc_offset: FixedOffset,
    pub week_start: Weekday,
    pub retention: RetentionPolicy,
    pub data_file: String,
    pub announce_online: bool,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        let required = |key: &str| {
            var(key).ok_or_else(|| anyhow::anyhow!("{} environment variable is required", key))
        };

        let discord_token = required("DISCORD_TOKEN")?;
        let guild_id = parse_id("GUILD_ID", &required("GUILD_ID")?)?;
        let sync_channel_id = parse_id("SYNC_CHANNEL_ID", &required("SYNC_CHANNEL_ID")?)?;

        let tracked_source = match var("TRACK_MODE").as_deref().map(str::trim) {
            None | Some("channel") => TrackedSource::Channel(sync_channel_id),
            Some("forum") => TrackedSource::ForumThreads(sync_channel_id),
            Some("forum-openers") => TrackedSource::ForumOpeners(sync_channel_id),
            Some(other) => {
                return Err(anyhow::anyhow!(
                    "TRACK_MODE must be channel, forum or forum-openers, got {}",
                    other
                ));
            }
        };

        let report_channel_id = var("REPORT_CHANNEL_ID")
            .map(|value| parse_id("REPORT_CHANNEL_ID", &value))
            .transpose()?;
        let required_role_id = var("REQUIRED_ROLE_ID")
            .map(|value| parse_id("REQUIRED_ROLE_ID", &value))
            .transpose()?;

        let weekly_quota = parse_or("WEEKLY_QUOTA", var("WEEKLY_QUOTA"), 5u32)?;
        let title_dates = parse_flag("TITLE_DATES", var("TITLE_DATES"), false)?;
        let dedup_daily = parse_flag("DEDUP_DAILY", var("DEDUP_DAILY"), true)?;
        let tag_underperformers = parse_flag("TAG_UNDERPERFORMERS", var("TAG_UNDERPERFORMERS"), true)?;
        let announce_online = parse_flag("ANNOUNCE_ONLINE", var("ANNOUNCE_ONLINE"), false)?;

        let report_schedule = parse_schedule("REPORT_SCHEDULE", var("REPORT_SCHEDULE"), "Sun 21:00")?;
        let reset_schedule = parse_schedule("RESET_SCHEDULE", var("RESET_SCHEDULE"), "Mon 00:00")?;

        let utc_offset = var("TZ_OFFSET")
            .map(|value| parse_utc_offset(&value).map_err(|e| anyhow::anyhow!("TZ_OFFSET: {}", e)))
            .transpose()?
            .unwrap_or_else(jst_offset);
        let week_start = parse_or("WEEK_START", var("WEEK_START"), Weekday::Mon)?;
        let retention = parse_or("RETENTION", var("RETENTION"), RetentionPolicy::Retain)?;

        let data_file = var("DATA_FILE").unwrap_or_else(|| "data.json".to_string());

        Ok(Config {
            discord_token,
            guild_id,
            tracked_source,
            title_dates,
            report_channel_id,
            required_role_id,
            weekly_quota,
            dedup_daily,
            tag_underperformers,
            report_schedule,
            reset_schedule,
            utc_offset,
            week_start,
            retention,
            data_file,
            announce_online,
        })
    }

    pub fn tracker_settings(&self) -> TrackerSettings {
        TrackerSettings {
            classifier: Classifier {
                source: self.tracked_source,
                title_dates: self.title_dates,
                offset: self.utc_offset,
                week_start: self.week_start,
            },
            dedup_daily: self.dedup_daily,
            required_count: self.weekly_quota,
            tag_underperformers: self.tag_underperformers,
            retention: self.retention,
        }
    }
}

fn parse_id(key: &str, value: &str) -> Result<u64> {
    value
        .trim()
        .parse::<u64>()
        .map_err(|_| anyhow::anyhow!("{} must be a numeric id, got {}", key, value))
}

fn parse_or<T: FromStr>(key: &str, value: Option<String>, default: T) -> Result<T> {
    match value {
        Some(value) => value
            .trim()
            .parse::<T>()
            .map_err(|_| anyhow::anyhow!("Invalid value for {}: {}", key, value)),
        None => Ok(default),
    }
}

fn parse_flag(key: &str, value: Option<String>, default: bool) -> Result<bool> {
    match value.as_deref().map(|v| v.trim().to_ascii_lowercase()) {
        None => Ok(default),
        Some(v) => match v.as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(anyhow::anyhow!("{} must be true or false, got {}", key, v)),
        },
    }
}

fn parse_schedule(key: &str, value: Option<String>, default: &str) -> Result<Option<Schedule>> {
    let expression = value.unwrap_or_else(|| default.to_string());
    if expression.trim().eq_ignore_ascii_case("off") {
        return Ok(None);
    }
    Schedule::parse(&expression)
        .map(Some)
        .map_err(|e| anyhow::anyhow!("{}: {}", key, e))
}
