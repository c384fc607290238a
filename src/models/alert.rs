use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// Raw payload as handed over by the ingestion collaborator.
pub type RawRecord = serde_json::Map<String, serde_json::Value>;

/// Severity assigned when the source does not provide one.
pub const DEFAULT_SEVERITY: &str = "Medium";

/// Publication date of an alert, or the explicit "unknown" sentinel when the
/// source omitted it or gave something unparsable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PublishedDate {
    Known(DateTime<Utc>),
    Unknown,
}

impl PublishedDate {
    pub fn as_datetime(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::Known(dt) => Some(*dt),
            Self::Unknown => None,
        }
    }

    pub fn is_known(&self) -> bool {
        matches!(self, Self::Known(_))
    }

    /// RFC 3339 text for storage, sub-second digits kept; `None` for the
    /// sentinel.
    pub fn to_storage(&self) -> Option<String> {
        self.as_datetime()
            .map(|dt| dt.to_rfc3339_opts(SecondsFormat::AutoSi, true))
    }
}

impl From<Option<DateTime<Utc>>> for PublishedDate {
    fn from(value: Option<DateTime<Utc>>) -> Self {
        match value {
            Some(dt) => Self::Known(dt),
            None => Self::Unknown,
        }
    }
}

impl std::fmt::Display for PublishedDate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Known(dt) => write!(f, "{}", dt.format("%Y-%m-%d")),
            Self::Unknown => f.write_str("unknown"),
        }
    }
}

/// Canonical medical alert. `alert_id` is the sole identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub alert_id: String,
    pub title: String,
    pub date_published: PublishedDate,
    pub severity: String,
    pub summary: String,
    pub affected_products: Vec<String>,
    pub recommendations: Vec<String>,
    pub source_url: String,
    pub source_name: String,
    /// Original un-normalized payload, kept verbatim for audit.
    pub raw_data: RawRecord,
}

impl Alert {
    /// An alert carrying only its id, every other field at its default.
    pub fn empty(alert_id: impl Into<String>) -> Self {
        Self {
            alert_id: alert_id.into(),
            title: String::new(),
            date_published: PublishedDate::Unknown,
            severity: DEFAULT_SEVERITY.to_string(),
            summary: String::new(),
            affected_products: Vec::new(),
            recommendations: Vec::new(),
            source_url: String::new(),
            source_name: String::new(),
            raw_data: RawRecord::new(),
        }
    }
}
