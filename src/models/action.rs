use std::collections::BTreeMap;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use super::alert::Alert;
use crate::db::SerializationError;

/// Store-assigned surrogate key of a pharmacist action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActionId(pub i64);

impl std::fmt::Display for ActionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Patients affected at one registered site.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteCount {
    pub site_id: String,
    pub patients: u32,
}

/// Per-site counts of one action, one entry per registered site in
/// registry order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SiteCounts(Vec<SiteCount>);

impl SiteCounts {
    pub fn new(entries: Vec<SiteCount>) -> Self {
        Self(entries)
    }

    pub fn get(&self, site_id: &str) -> Option<u32> {
        self.0
            .iter()
            .find(|c| c.site_id == site_id)
            .map(|c| c.patients)
    }

    pub fn iter(&self) -> impl Iterator<Item = &SiteCount> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn total(&self) -> u64 {
        self.0.iter().map(|c| u64::from(c.patients)).sum()
    }
}

/// Immutable, append-only record of a response to an alert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PharmacistAction {
    pub action_id: ActionId,
    pub alert_id: String,
    pub action_taken: String,
    pub timestamp: DateTime<Utc>,
    pub site_counts: SiteCounts,
}

impl PharmacistAction {
    /// Flat `timestamp, action_taken, <site>...` row, one column per site.
    pub fn wide_row(&self) -> serde_json::Map<String, serde_json::Value> {
        let mut row = serde_json::Map::new();
        row.insert("action_id".into(), self.action_id.0.into());
        row.insert(
            "timestamp".into(),
            self.timestamp
                .to_rfc3339_opts(SecondsFormat::Secs, true)
                .into(),
        );
        row.insert("action_taken".into(), self.action_taken.clone().into());
        for count in self.site_counts.iter() {
            row.insert(count.site_id.clone(), count.patients.into());
        }
        row
    }
}

/// Caller-side request to record an action.
///
/// Counts are signed so that negative submissions reach validation instead
/// of failing to parse.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionSubmission {
    pub alert_id: String,
    pub action_taken: String,
    #[serde(default)]
    pub site_counts: BTreeMap<String, i64>,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

impl ActionSubmission {
    pub fn new(alert_id: impl Into<String>, action_taken: impl Into<String>) -> Self {
        Self {
            alert_id: alert_id.into(),
            action_taken: action_taken.into(),
            site_counts: BTreeMap::new(),
            timestamp: None,
        }
    }

    pub fn with_count(mut self, site_id: impl Into<String>, patients: i64) -> Self {
        self.site_counts.insert(site_id.into(), patients);
        self
    }

    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }
}

/// One alert joined with its action history.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AlertDetail {
    /// `None` when no alert is stored under the requested id.
    pub alert: Option<Alert>,
    /// Readable actions in insertion order.
    pub actions: Vec<PharmacistAction>,
    /// Alert or action rows that failed to decode.
    pub unreadable: Vec<SerializationError>,
}

impl AlertDetail {
    pub fn is_empty(&self) -> bool {
        self.alert.is_none() && self.actions.is_empty() && self.unreadable.is_empty()
    }
}
