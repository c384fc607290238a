//! Read facade for the presentation layer.
//!
//! Exposes reads only; alerts are written through [`crate::ingest`].

use serde::Serialize;

use crate::db::{AlertStore, SerializationError, StoreError};
use crate::models::AlertDetail;
use crate::normalizer::AlertTable;

/// Every readable alert plus the rows that failed to decode.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AlertListing {
    pub alerts: AlertTable,
    pub unreadable: Vec<SerializationError>,
}

pub struct AlertQueries<'a> {
    store: &'a dyn AlertStore,
}

impl<'a> AlertQueries<'a> {
    pub fn new(store: &'a dyn AlertStore) -> Self {
        Self { store }
    }

    pub fn list_alerts(&self) -> Result<AlertListing, StoreError> {
        let mut listing = AlertListing::default();
        let mut alerts = Vec::new();
        for row in self.store.get_all_alerts()? {
            match row {
                Ok(alert) => alerts.push(alert),
                Err(e) => {
                    tracing::warn!(record = %e.record, field = e.field, "Skipping unreadable alert");
                    listing.unreadable.push(e);
                }
            }
        }
        listing.alerts = AlertTable::new(alerts);
        Ok(listing)
    }

    /// Missing ids yield an empty detail.
    pub fn alert_detail(&self, alert_id: &str) -> Result<AlertDetail, StoreError> {
        self.store.get_alert_with_actions(alert_id)
    }
}
