use crate::database::models::{AttendanceRecord, Ledger, PeriodKey, PeriodLedger};
use serde::Deserialize;
use std::collections::BTreeMap;
use tracing::info;

/// A record as older versions of the bot stored it.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum StoredRecord {
    Record(AttendanceRecord),
    Count(u32),
}

impl StoredRecord {
    fn into_record(self, user_id: &str) -> AttendanceRecord {
        match self {
            StoredRecord::Record(record) => record,
            StoredRecord::Count(count) => AttendanceRecord {
                name: user_id.to_string(),
                count,
                ..AttendanceRecord::default()
            },
        }
    }
}

/// Every shape the ledger file has had. Variants are tried in order, so the
/// current layout wins whenever it fits.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum StoredLedger {
    Current(BTreeMap<PeriodKey, PeriodLedger>),
    LegacyCountOnly(BTreeMap<PeriodKey, BTreeMap<String, StoredRecord>>),
    LegacyFlatMap(BTreeMap<String, StoredRecord>),
}

impl StoredLedger {
    pub fn decode(raw: &str) -> serde_json::Result<Self> {
        serde_json::from_str(raw)
    }

    pub fn shape(&self) -> &'static str {
        match self {
            StoredLedger::Current(_) => "current",
            StoredLedger::LegacyCountOnly(_) => "legacy count-only",
            StoredLedger::LegacyFlatMap(_) => "legacy flat",
        }
    }

    /// Normalizes to the current shape. Flat data carries no period, so it is
    /// placed under `fallback_period`.
    pub fn into_ledger(self, fallback_period: &PeriodKey) -> Ledger {
        let shape = self.shape();
        let periods = match self {
            StoredLedger::Current(periods) => return Ledger { periods },
            StoredLedger::LegacyCountOnly(periods) => periods
                .into_iter()
                .map(|(period, users)| (period, upgrade_users(users)))
                .collect(),
            StoredLedger::LegacyFlatMap(users) => {
                let mut periods = BTreeMap::new();
                periods.insert(fallback_period.clone(), upgrade_users(users));
                periods
            }
        };

        info!("Upgraded {} ledger data to the current layout", shape);
        Ledger { periods }
    }
}

fn upgrade_users(users: BTreeMap<String, StoredRecord>) -> PeriodLedger {
    users
        .into_iter()
        .map(|(user_id, stored)| {
            let record = stored.into_record(&user_id);
            (user_id, record)
        })
        .collect()
}
