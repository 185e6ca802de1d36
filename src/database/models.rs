use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

const KEY_FORMAT: &str = "%Y-%m-%d";

/// Identifier of a weekly accounting period: the local date the week starts on.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PeriodKey(String);

impl PeriodKey {
    pub fn from_date(date: NaiveDate) -> Self {
        Self(date.format(KEY_FORMAT).to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PeriodKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Local calendar date a credit was earned on.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DayKey(String);

impl DayKey {
    pub fn from_date(date: NaiveDate) -> Self {
        Self(date.format(KEY_FORMAT).to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DayKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttendanceRecord {
    pub name: String,
    pub count: u32,
    #[serde(default, with = "day_set")]
    pub days: BTreeSet<DayKey>,
}

impl AttendanceRecord {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            count: 0,
            days: BTreeSet::new(),
        }
    }
}

/// Per-user records of one period, keyed by user id.
pub type PeriodLedger = BTreeMap<String, AttendanceRecord>;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Ledger {
    pub periods: BTreeMap<PeriodKey, PeriodLedger>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetentionPolicy {
    Retain,
    Discard,
}

impl RetentionPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            RetentionPolicy::Retain => "retain",
            RetentionPolicy::Discard => "discard",
        }
    }
}

impl std::str::FromStr for RetentionPolicy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "retain" | "keep" => Ok(RetentionPolicy::Retain),
            "discard" => Ok(RetentionPolicy::Discard),
            other => Err(anyhow::anyhow!("Invalid retention policy: {}", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RosterMember {
    pub user_id: u64,
    pub display_name: String,
}

impl RosterMember {
    pub fn new(user_id: u64, display_name: &str) -> Self {
        Self {
            user_id,
            display_name: display_name.to_string(),
        }
    }
}

// Stored as `{ "<dayKey>": true }`.
mod day_set {
    use super::DayKey;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::collections::{BTreeMap, BTreeSet};

    pub fn serialize<S: Serializer>(days: &BTreeSet<DayKey>, serializer: S) -> Result<S::Ok, S::Error> {
        let map: BTreeMap<&DayKey, bool> = days.iter().map(|day| (day, true)).collect();
        map.serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<BTreeSet<DayKey>, D::Error> {
        let map = BTreeMap::<DayKey, bool>::deserialize(deserializer)?;
        Ok(map
            .into_iter()
            .filter_map(|(day, credited)| credited.then_some(day))
            .collect())
    }
}
