use crate::database::LedgerStore;
use crate::database::ledger::RecordOutcome;
use crate::database::models::{Ledger, PeriodKey, RetentionPolicy, RosterMember};
use crate::utils::classifier::{ActivityEvent, Classifier, Rejection};
use crate::utils::format::{format_count_summary, generate_report};
use crate::utils::time::period_key_of;
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::Mutex;

/// Supplies the members who must meet the quota, fetched fresh per report.
#[async_trait]
pub trait RosterProvider: Send + Sync {
    async fn fetch_roster(&self) -> Result<Vec<RosterMember>>;
}

/// Where report text is posted.
#[async_trait]
pub trait ReportSink: Send + Sync {
    async fn deliver_report(&self, text: &str) -> Result<()>;
}

#[derive(Debug, Clone)]
pub struct TrackerSettings {
    pub classifier: Classifier,
    pub dedup_daily: bool,
    pub required_count: u32,
    pub tag_underperformers: bool,
    pub retention: RetentionPolicy,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventOutcome {
    Credited { user_id: u64, count: u32 },
    AlreadyCredited { user_id: u64 },
    Rejected(Rejection),
    /// Belongs to a period that has already been rolled over.
    Stale(PeriodKey),
    /// Declares a date in a week that has not started yet.
    FutureDated(PeriodKey),
}

/// Owns the ledger and serialises every access to it. Each mutation is
/// written to disk before it becomes visible in memory.
pub struct Tracker {
    store: LedgerStore,
    ledger: Mutex<Ledger>,
    /// Timestamp of the message each stored display name came from. Gateway
    /// events are handled concurrently and can reach the lock out of order.
    /// Only locked while `ledger` is held.
    name_seen: Mutex<HashMap<u64, DateTime<Utc>>>,
    settings: TrackerSettings,
}

impl Tracker {
    pub async fn open(store: LedgerStore, settings: TrackerSettings, now: DateTime<Utc>) -> Result<Self> {
        let current = period_key_of(now, settings.classifier.offset, settings.classifier.week_start);

        let loader = store.clone();
        let fallback = current.clone();
        let mut ledger = tokio::task::spawn_blocking(move || loader.load(&fallback)).await??;

        ledger.rollover(&current, settings.retention);
        persist(&store, &ledger).await?;

        tracing::info!(
            "Ledger ready at {} (current period {}, {} period(s) kept)",
            store.path().display(),
            current,
            ledger.periods.len()
        );

        Ok(Self {
            store,
            ledger: Mutex::new(ledger),
            name_seen: Mutex::new(HashMap::new()),
            settings,
        })
    }

    pub fn settings(&self) -> &TrackerSettings {
        &self.settings
    }

    pub fn current_period(&self, now: DateTime<Utc>) -> PeriodKey {
        let classifier = &self.settings.classifier;
        period_key_of(now, classifier.offset, classifier.week_start)
    }

    pub async fn on_activity_event(&self, event: &ActivityEvent, now: DateTime<Utc>) -> Result<EventOutcome> {
        let qualified = match self.settings.classifier.classify(event) {
            Ok(qualified) => qualified,
            Err(rejection) => return Ok(EventOutcome::Rejected(rejection)),
        };

        let current = self.current_period(now);
        let mut ledger = self.ledger.lock().await;
        let mut next = ledger.clone();
        next.rollover(&current, self.settings.retention);

        if qualified.period_key < current {
            self.commit(&mut ledger, next).await?;
            return Ok(EventOutcome::Stale(qualified.period_key));
        }
        if qualified.period_key > current {
            self.commit(&mut ledger, next).await?;
            return Ok(EventOutcome::FutureDated(qualified.period_key));
        }

        let user_id = qualified.user_id;
        let user_key = user_id.to_string();
        let mut name_seen = self.name_seen.lock().await;
        let name_is_newer = name_seen.get(&user_id).is_none_or(|seen| *seen <= event.timestamp);
        let prior_name = next.record(&current, &user_key).map(|record| record.name.clone());

        let outcome = next.record_event(
            &current,
            &user_key,
            &qualified.display_name,
            &qualified.day_key,
            self.settings.dedup_daily,
        );
        if let (false, Some(name)) = (name_is_newer, prior_name) {
            if let Some(record) = next.periods.get_mut(&current).and_then(|period| period.get_mut(&user_key)) {
                record.name = name;
            }
        }
        self.commit(&mut ledger, next).await?;
        if name_is_newer {
            name_seen.insert(user_id, event.timestamp);
        }

        Ok(match outcome {
            RecordOutcome::Credited { count } => EventOutcome::Credited { user_id, count },
            RecordOutcome::AlreadyCredited => EventOutcome::AlreadyCredited { user_id },
        })
    }

    /// Rolls over to the wall-clock period if needed and renders the report.
    pub async fn report(&self, roster: &[RosterMember], now: DateTime<Utc>) -> Result<Option<String>> {
        let current = self.current_period(now);
        let ledger = self.rolled_over(now).await?;

        Ok(generate_report(
            &ledger,
            &current,
            roster,
            self.settings.required_count,
            self.settings.tag_underperformers,
        ))
    }

    /// Fetches the roster, renders the report and hands it to `sink`.
    /// Returns whether a report was delivered; collaborator failures are
    /// logged and skipped.
    pub async fn deliver_report(
        &self,
        roster: &dyn RosterProvider,
        sink: &dyn ReportSink,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let members = match roster.fetch_roster().await {
            Ok(members) => members,
            Err(e) => {
                tracing::warn!("Skipping report, roster unavailable: {:?}", e);
                return Ok(false);
            }
        };

        let Some(text) = self.report(&members, now).await? else {
            tracing::info!("Skipping report, roster is empty");
            return Ok(false);
        };

        if let Err(e) = sink.deliver_report(&text).await {
            tracing::warn!("Failed to deliver report: {:?}", e);
            return Ok(false);
        }

        Ok(true)
    }

    /// Scheduled boundary: idempotent rollover to the wall-clock period.
    pub async fn scheduled_reset(&self, now: DateTime<Utc>) -> Result<bool> {
        let current = self.current_period(now);
        let mut ledger = self.ledger.lock().await;
        let mut next = ledger.clone();
        if !next.rollover(&current, self.settings.retention) {
            return Ok(false);
        }
        self.commit(&mut ledger, next).await?;
        tracing::info!("Rolled over to period {}", current);
        Ok(true)
    }

    /// Drops every period and starts an empty current one.
    pub async fn hard_reset(&self, now: DateTime<Utc>) -> Result<()> {
        let current = self.current_period(now);
        let mut ledger = self.ledger.lock().await;
        let mut next = Ledger::default();
        next.rollover(&current, self.settings.retention);
        self.commit(&mut ledger, next).await?;
        tracing::info!("Ledger reset, current period {}", current);
        Ok(())
    }

    pub async fn count_summary(&self, now: DateTime<Utc>) -> Result<String> {
        let current = self.current_period(now);
        let ledger = self.rolled_over(now).await?;
        Ok(format_count_summary(&ledger, &current))
    }

    pub async fn member_count(&self, user_id: u64, now: DateTime<Utc>) -> Result<u32> {
        let current = self.current_period(now);
        let ledger = self.rolled_over(now).await?;
        Ok(ledger
            .record(&current, &user_id.to_string())
            .map(|record| record.count)
            .unwrap_or(0))
    }

    /// Snapshot of the ledger after the wall-clock rollover check.
    async fn rolled_over(&self, now: DateTime<Utc>) -> Result<Ledger> {
        let current = self.current_period(now);
        let mut ledger = self.ledger.lock().await;
        let mut next = ledger.clone();
        if next.rollover(&current, self.settings.retention) {
            tracing::info!("Rolled over to period {}", current);
            self.commit(&mut ledger, next).await?;
        }
        Ok(ledger.clone())
    }

    async fn commit(&self, ledger: &mut Ledger, next: Ledger) -> Result<()> {
        if *ledger == next {
            return Ok(());
        }
        persist(&self.store, &next).await?;
        *ledger = next;
        Ok(())
    }
}

async fn persist(store: &LedgerStore, ledger: &Ledger) -> Result<()> {
    let store = store.clone();
    let snapshot = ledger.clone();
    tokio::task::spawn_blocking(move || store.save(&snapshot)).await??;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::classifier::TrackedSource;
    use crate::utils::time::jst_offset;
    use chrono::{NaiveDate, TimeZone, Weekday};
    use std::sync::Mutex as StdMutex;

    const SYNC: u64 = 100;
    const FORUM: u64 = 200;

    struct FixedRoster(Result<Vec<RosterMember>, String>);

    #[async_trait]
    impl RosterProvider for FixedRoster {
        async fn fetch_roster(&self) -> Result<Vec<RosterMember>> {
            self.0.clone().map_err(|e| anyhow::anyhow!(e))
        }
    }

    #[derive(Default)]
    struct RecordingSink(StdMutex<Vec<String>>);

    #[async_trait]
    impl ReportSink for RecordingSink {
        async fn deliver_report(&self, text: &str) -> Result<()> {
            self.0.lock().unwrap().push(text.to_string());
            Ok(())
        }
    }

    fn settings(retention: RetentionPolicy) -> TrackerSettings {
        TrackerSettings {
            classifier: Classifier {
                source: TrackedSource::Channel(SYNC),
                title_dates: false,
                offset: jst_offset(),
                week_start: Weekday::Mon,
            },
            dedup_daily: true,
            required_count: 2,
            tag_underperformers: true,
            retention,
        }
    }

    fn forum_openers_settings() -> TrackerSettings {
        let mut settings = settings(RetentionPolicy::Retain);
        settings.classifier.source = TrackedSource::ForumOpeners(FORUM);
        settings.classifier.title_dates = true;
        settings
    }

    fn week_of(y: i32, m: u32, d: u32) -> PeriodKey {
        PeriodKey::from_date(NaiveDate::from_ymd_opt(y, m, d).unwrap())
    }

    // 2024-03-06 is a Wednesday; hours are JST.
    fn jst(day: u32, hour: u32) -> DateTime<Utc> {
        jst_offset()
            .with_ymd_and_hms(2024, 3, day, hour, 0, 0)
            .unwrap()
            .with_timezone(&Utc)
    }

    fn post(user_id: u64, name: &str, at: DateTime<Utc>) -> ActivityEvent {
        ActivityEvent {
            author_id: user_id,
            author_name: name.to_string(),
            is_bot: false,
            channel_id: SYNC,
            parent_id: None,
            is_thread_opener: false,
            thread_owner_id: None,
            thread_owner_name: None,
            thread_title: None,
            timestamp: at,
        }
    }

    fn forum_post(title: &str, author_id: u64, owner_id: u64, at: DateTime<Utc>) -> ActivityEvent {
        ActivityEvent {
            channel_id: 500,
            parent_id: Some(FORUM),
            is_thread_opener: true,
            thread_owner_id: Some(owner_id),
            thread_owner_name: Some(format!("owner{}", owner_id)),
            thread_title: Some(title.to_string()),
            ..post(author_id, &format!("user{}", author_id), at)
        }
    }

    async fn open(dir: &tempfile::TempDir, retention: RetentionPolicy) -> Tracker {
        let store = LedgerStore::new(dir.path().join("data.json"));
        Tracker::open(store, settings(retention), jst(6, 9)).await.unwrap()
    }

    #[tokio::test]
    async fn qualifying_events_are_credited_once_per_day_and_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let tracker = open(&dir, RetentionPolicy::Retain).await;

        let first = tracker.on_activity_event(&post(1, "alice", jst(6, 10)), jst(6, 10)).await.unwrap();
        let again = tracker.on_activity_event(&post(1, "alice", jst(6, 11)), jst(6, 11)).await.unwrap();
        let next_day = tracker.on_activity_event(&post(1, "alice", jst(7, 10)), jst(7, 10)).await.unwrap();

        assert_eq!(first, EventOutcome::Credited { user_id: 1, count: 1 });
        assert_eq!(again, EventOutcome::AlreadyCredited { user_id: 1 });
        assert_eq!(next_day, EventOutcome::Credited { user_id: 1, count: 2 });

        let reopened = open(&dir, RetentionPolicy::Retain).await;
        assert_eq!(reopened.member_count(1, jst(7, 12)).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn untracked_messages_do_not_touch_the_ledger() {
        let dir = tempfile::tempdir().unwrap();
        let tracker = open(&dir, RetentionPolicy::Retain).await;

        let mut event = post(1, "alice", jst(6, 10));
        event.channel_id = SYNC + 1;
        assert_eq!(
            tracker.on_activity_event(&event, jst(6, 10)).await.unwrap(),
            EventOutcome::Rejected(Rejection::UntrackedSource)
        );
        assert_eq!(tracker.member_count(1, jst(6, 10)).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn new_week_rolls_over_before_recording() {
        let dir = tempfile::tempdir().unwrap();
        let tracker = open(&dir, RetentionPolicy::Discard).await;
        tracker.on_activity_event(&post(1, "alice", jst(6, 10)), jst(6, 10)).await.unwrap();

        let outcome = tracker.on_activity_event(&post(1, "alice", jst(11, 10)), jst(11, 10)).await.unwrap();
        assert_eq!(outcome, EventOutcome::Credited { user_id: 1, count: 1 });

        let ledger = tracker.ledger.lock().await;
        assert_eq!(ledger.periods.len(), 1);
        assert_eq!(ledger.current_period().unwrap().as_str(), "2024-03-11");
    }

    #[tokio::test]
    async fn events_for_a_rolled_over_week_are_rejected_as_stale() {
        let dir = tempfile::tempdir().unwrap();
        let tracker = open(&dir, RetentionPolicy::Retain).await;

        let late = post(1, "alice", jst(10, 23));
        let outcome = tracker.on_activity_event(&late, jst(11, 0)).await.unwrap();
        assert_eq!(outcome, EventOutcome::Stale(tracker.current_period(jst(10, 23))));
        assert_eq!(tracker.member_count(1, jst(11, 1)).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn report_is_delivered_for_the_fetched_roster() {
        let dir = tempfile::tempdir().unwrap();
        let tracker = open(&dir, RetentionPolicy::Retain).await;
        tracker.on_activity_event(&post(1, "alice", jst(6, 10)), jst(6, 10)).await.unwrap();
        tracker.on_activity_event(&post(1, "alice", jst(7, 10)), jst(7, 10)).await.unwrap();

        let roster = FixedRoster(Ok(vec![
            RosterMember::new(1, "Alice"),
            RosterMember::new(2, "Bob"),
        ]));
        let sink = RecordingSink::default();

        assert!(tracker.deliver_report(&roster, &sink, jst(10, 21)).await.unwrap());
        let delivered = sink.0.lock().unwrap();
        assert_eq!(delivered.len(), 1);
        assert!(delivered[0].contains("- Alice: 2/2 ✓"));
        assert!(delivered[0].contains("- Bob: 0/2"));
        assert!(delivered[0].ends_with("<@2>"));
    }

    #[tokio::test]
    async fn roster_failures_and_empty_rosters_skip_the_report() {
        let dir = tempfile::tempdir().unwrap();
        let tracker = open(&dir, RetentionPolicy::Retain).await;
        let sink = RecordingSink::default();

        let failing = FixedRoster(Err("gateway down".to_string()));
        assert!(!tracker.deliver_report(&failing, &sink, jst(10, 21)).await.unwrap());

        let empty = FixedRoster(Ok(Vec::new()));
        assert!(!tracker.deliver_report(&empty, &sink, jst(10, 21)).await.unwrap());

        assert!(sink.0.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn scheduled_reset_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let tracker = open(&dir, RetentionPolicy::Retain).await;
        tracker.on_activity_event(&post(1, "alice", jst(6, 10)), jst(6, 10)).await.unwrap();

        assert!(!tracker.scheduled_reset(jst(6, 12)).await.unwrap());
        assert_eq!(tracker.member_count(1, jst(6, 12)).await.unwrap(), 1);

        assert!(tracker.scheduled_reset(jst(11, 0)).await.unwrap());
        assert!(!tracker.scheduled_reset(jst(11, 0)).await.unwrap());
        assert_eq!(tracker.member_count(1, jst(11, 1)).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn hard_reset_clears_the_current_week() {
        let dir = tempfile::tempdir().unwrap();
        let tracker = open(&dir, RetentionPolicy::Retain).await;
        tracker.on_activity_event(&post(1, "alice", jst(6, 10)), jst(6, 10)).await.unwrap();

        tracker.hard_reset(jst(6, 12)).await.unwrap();
        assert_eq!(tracker.member_count(1, jst(6, 12)).await.unwrap(), 0);
        assert!(tracker.count_summary(jst(6, 12)).await.unwrap().ends_with("- (no data)"));
    }

    #[tokio::test]
    async fn declared_title_dates_choose_the_period_and_credit_the_owner() {
        let dir = tempfile::tempdir().unwrap();
        let store = LedgerStore::new(dir.path().join("data.json"));
        let now = jst(10, 12);
        let tracker = Tracker::open(store, forum_openers_settings(), now).await.unwrap();

        let future = tracker.on_activity_event(&forum_post("[2024-03-12 / x]", 8, 7, now), now).await.unwrap();
        assert_eq!(future, EventOutcome::FutureDated(week_of(2024, 3, 11)));

        let past = tracker.on_activity_event(&forum_post("[2024-02-28 / x]", 8, 7, now), now).await.unwrap();
        assert_eq!(past, EventOutcome::Stale(week_of(2024, 2, 26)));

        let current = tracker
            .on_activity_event(&forum_post("[2024-03-04 / standup]", 8, 7, now), now)
            .await
            .unwrap();
        assert_eq!(current, EventOutcome::Credited { user_id: 7, count: 1 });

        let malformed = tracker
            .on_activity_event(&forum_post("standup march 4", 8, 7, now), now)
            .await
            .unwrap();
        assert!(matches!(malformed, EventOutcome::Rejected(Rejection::MalformedTitle(_))));

        assert_eq!(tracker.member_count(7, now).await.unwrap(), 1);
        assert_eq!(tracker.member_count(8, now).await.unwrap(), 0);
        let ledger = tracker.ledger.lock().await;
        assert_eq!(ledger.periods.len(), 1);
        assert_eq!(ledger.record(&week_of(2024, 3, 4), "7").unwrap().name, "owner7");
    }

    #[tokio::test]
    async fn failed_writes_leave_memory_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let state_dir = dir.path().join("state");
        std::fs::create_dir(&state_dir).unwrap();
        let store = LedgerStore::new(state_dir.join("data.json"));
        let tracker = Tracker::open(store, settings(RetentionPolicy::Retain), jst(6, 9)).await.unwrap();

        std::fs::remove_dir_all(&state_dir).unwrap();

        let result = tracker.on_activity_event(&post(1, "alice", jst(6, 10)), jst(6, 10)).await;
        assert!(result.is_err());
        assert_eq!(tracker.member_count(1, jst(6, 10)).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn older_messages_do_not_overwrite_a_newer_display_name() {
        let dir = tempfile::tempdir().unwrap();
        let tracker = open(&dir, RetentionPolicy::Retain).await;
        let week = tracker.current_period(jst(6, 12));
        let name = |ledger: &Ledger| ledger.record(&week, "1").unwrap().name.clone();

        tracker.on_activity_event(&post(1, "alice (new)", jst(6, 11)), jst(6, 11)).await.unwrap();
        let late = tracker.on_activity_event(&post(1, "alice (old)", jst(6, 10)), jst(6, 11)).await.unwrap();
        assert_eq!(late, EventOutcome::AlreadyCredited { user_id: 1 });
        assert_eq!(name(&*tracker.ledger.lock().await), "alice (new)");

        tracker.on_activity_event(&post(1, "alice (newest)", jst(6, 12)), jst(6, 12)).await.unwrap();
        assert_eq!(name(&*tracker.ledger.lock().await), "alice (newest)");
    }
}
