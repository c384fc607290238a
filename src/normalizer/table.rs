use serde::Serialize;

use crate::models::{Alert, PublishedDate, RawRecord};

/// Canonical column names, in schema order.
pub const ALERT_COLUMNS: [&str; 10] = [
    "alert_id",
    "title",
    "date_published",
    "severity",
    "summary",
    "affected_products",
    "recommendations",
    "source_url",
    "source_name",
    "raw_data",
];

/// One typed column of an [`AlertTable`]. Every cell of a column shares
/// the variant's type, whatever shape the raw input had.
#[derive(Debug, Clone, PartialEq)]
pub enum Column<'a> {
    Text(Vec<&'a str>),
    Date(Vec<PublishedDate>),
    List(Vec<&'a [String]>),
    Map(Vec<&'a RawRecord>),
}

impl Column<'_> {
    pub fn len(&self) -> usize {
        match self {
            Self::Text(v) => v.len(),
            Self::Date(v) => v.len(),
            Self::List(v) => v.len(),
            Self::Map(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Uniformly-typed collection of canonical alerts, in input order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct AlertTable {
    rows: Vec<Alert>,
}

impl AlertTable {
    pub fn new(rows: Vec<Alert>) -> Self {
        Self { rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Alert> {
        self.rows.iter()
    }

    pub fn rows(&self) -> &[Alert] {
        &self.rows
    }

    pub fn into_rows(self) -> Vec<Alert> {
        self.rows
    }

    /// Last row carrying `alert_id` (later rows win, as they do on upsert).
    pub fn find(&self, alert_id: &str) -> Option<&Alert> {
        self.rows.iter().rev().find(|a| a.alert_id == alert_id)
    }

    /// Column view by canonical name.
    pub fn column(&self, name: &str) -> Option<Column<'_>> {
        let text = |f: fn(&Alert) -> &str| Column::Text(self.rows.iter().map(f).collect());
        let list = |f: fn(&Alert) -> &[String]| Column::List(self.rows.iter().map(f).collect());

        let column = match name {
            "alert_id" => text(|a| a.alert_id.as_str()),
            "title" => text(|a| a.title.as_str()),
            "severity" => text(|a| a.severity.as_str()),
            "summary" => text(|a| a.summary.as_str()),
            "source_url" => text(|a| a.source_url.as_str()),
            "source_name" => text(|a| a.source_name.as_str()),
            "date_published" => Column::Date(self.rows.iter().map(|a| a.date_published).collect()),
            "affected_products" => list(|a| a.affected_products.as_slice()),
            "recommendations" => list(|a| a.recommendations.as_slice()),
            "raw_data" => Column::Map(self.rows.iter().map(|a| &a.raw_data).collect()),
            _ => return None,
        };
        Some(column)
    }
}

impl IntoIterator for AlertTable {
    type Item = Alert;
    type IntoIter = std::vec::IntoIter<Alert>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.into_iter()
    }
}

impl<'a> IntoIterator for &'a AlertTable {
    type Item = &'a Alert;
    type IntoIter = std::slice::Iter<'a, Alert>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.iter()
    }
}

impl FromIterator<Alert> for AlertTable {
    fn from_iter<I: IntoIterator<Item = Alert>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}
