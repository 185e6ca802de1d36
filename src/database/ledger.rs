use crate::database::models::{
    AttendanceRecord, DayKey, Ledger, PeriodKey, PeriodLedger, RetentionPolicy,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
    Credited { count: u32 },
    AlreadyCredited,
}

impl Ledger {
    /// The period currently accumulating: the most recent one.
    pub fn current_period(&self) -> Option<&PeriodKey> {
        self.periods.keys().next_back()
    }

    pub fn period(&self, period: &PeriodKey) -> Option<&PeriodLedger> {
        self.periods.get(period)
    }

    pub fn record(&self, period: &PeriodKey, user_id: &str) -> Option<&AttendanceRecord> {
        self.periods.get(period)?.get(user_id)
    }

    pub fn record_event(
        &mut self,
        period: &PeriodKey,
        user_id: &str,
        display_name: &str,
        day: &DayKey,
        dedup: bool,
    ) -> RecordOutcome {
        let record = self
            .periods
            .entry(period.clone())
            .or_default()
            .entry(user_id.to_string())
            .or_insert_with(|| AttendanceRecord::new(display_name));

        // Nickname changes show up in the next report.
        record.name = display_name.to_string();

        if dedup && !record.days.insert(day.clone()) {
            return RecordOutcome::AlreadyCredited;
        }

        record.count += 1;
        RecordOutcome::Credited { count: record.count }
    }

    /// Makes `new_period` the current period. Returns whether anything changed,
    /// so a second call with the same key is a no-op.
    pub fn rollover(&mut self, new_period: &PeriodKey, retention: RetentionPolicy) -> bool {
        match self.current_period() {
            Some(current) if current == new_period => return false,
            Some(current) if current > new_period && retention == RetentionPolicy::Retain => {
                tracing::warn!(
                    "Ignoring rollover to {} which is older than current period {}",
                    new_period,
                    current
                );
                return false;
            }
            _ => {}
        }

        if retention == RetentionPolicy::Discard {
            self.periods.clear();
        }
        self.periods.insert(new_period.clone(), PeriodLedger::new());
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use rstest::{fixture, rstest};

    fn period(y: i32, m: u32, d: u32) -> PeriodKey {
        PeriodKey::from_date(NaiveDate::from_ymd_opt(y, m, d).unwrap())
    }

    fn day(y: i32, m: u32, d: u32) -> DayKey {
        DayKey::from_date(NaiveDate::from_ymd_opt(y, m, d).unwrap())
    }

    #[fixture]
    fn ledger() -> Ledger {
        let mut ledger = Ledger::default();
        ledger.rollover(&period(2024, 3, 4), RetentionPolicy::Retain);
        ledger
    }

    #[rstest]
    fn dedup_credits_one_event_per_day(mut ledger: Ledger) {
        let week = period(2024, 3, 4);
        for _ in 0..5 {
            ledger.record_event(&week, "1", "alice", &day(2024, 3, 4), true);
        }
        assert_eq!(
            ledger.record_event(&week, "1", "alice", &day(2024, 3, 4), true),
            RecordOutcome::AlreadyCredited
        );
        assert_eq!(
            ledger.record_event(&week, "1", "alice", &day(2024, 3, 5), true),
            RecordOutcome::Credited { count: 2 }
        );

        let record = ledger.record(&week, "1").unwrap();
        assert_eq!(record.count, 2);
        assert_eq!(record.count as usize, record.days.len());
    }

    #[rstest]
    fn raw_mode_counts_every_event(mut ledger: Ledger) {
        let week = period(2024, 3, 4);
        for _ in 0..3 {
            ledger.record_event(&week, "1", "alice", &day(2024, 3, 4), false);
        }
        let record = ledger.record(&week, "1").unwrap();
        assert_eq!(record.count, 3);
        assert!(record.days.is_empty());
    }

    #[rstest]
    fn display_name_is_last_write_wins(mut ledger: Ledger) {
        let week = period(2024, 3, 4);
        ledger.record_event(&week, "1", "alice", &day(2024, 3, 4), true);
        ledger.record_event(&week, "1", "alice (away)", &day(2024, 3, 4), true);
        assert_eq!(ledger.record(&week, "1").unwrap().name, "alice (away)");
    }

    #[rstest]
    #[case(RetentionPolicy::Retain)]
    #[case(RetentionPolicy::Discard)]
    fn rollover_is_idempotent(mut ledger: Ledger, #[case] retention: RetentionPolicy) {
        ledger.record_event(&period(2024, 3, 4), "1", "alice", &day(2024, 3, 4), true);

        assert!(ledger.rollover(&period(2024, 3, 11), retention));
        let once = ledger.clone();
        assert!(!ledger.rollover(&period(2024, 3, 11), retention));
        assert_eq!(ledger, once);
        assert_eq!(ledger.current_period(), Some(&period(2024, 3, 11)));
        assert!(ledger.period(&period(2024, 3, 11)).unwrap().is_empty());
    }

    #[rstest]
    fn discard_rollover_drops_previous_periods(mut ledger: Ledger) {
        ledger.record_event(&period(2024, 3, 4), "1", "alice", &day(2024, 3, 4), true);
        ledger.rollover(&period(2024, 3, 11), RetentionPolicy::Discard);
        assert_eq!(ledger.periods.len(), 1);
        assert!(ledger.period(&period(2024, 3, 4)).is_none());
    }

    #[rstest]
    fn retain_rollover_keeps_history(mut ledger: Ledger) {
        ledger.record_event(&period(2024, 3, 4), "1", "alice", &day(2024, 3, 4), true);
        ledger.rollover(&period(2024, 3, 11), RetentionPolicy::Retain);
        assert_eq!(ledger.periods.len(), 2);
        assert_eq!(ledger.record(&period(2024, 3, 4), "1").unwrap().count, 1);
    }

    #[rstest]
    fn retain_rollover_never_moves_backwards(mut ledger: Ledger) {
        assert!(!ledger.rollover(&period(2024, 2, 26), RetentionPolicy::Retain));
        assert_eq!(ledger.current_period(), Some(&period(2024, 3, 4)));
    }
}
