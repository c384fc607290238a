//! Write paths: raw payloads through the normalizer, actions through the
//! action aggregator inside the store.

use serde::Serialize;

use crate::db::{AlertStore, StoreError};
use crate::models::{ActionId, ActionSubmission, RawRecord};
use crate::normalizer::normalize_all;

/// Outcome of one ingestion batch.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct IngestReport {
    pub stored: usize,
    pub rejected: Vec<RejectedRecord>,
}

/// A record the store refused; the rest of the batch still went through.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RejectedRecord {
    /// Position in the submitted batch.
    pub index: usize,
    pub alert_id: String,
    pub reason: String,
}

/// Normalize and upsert a batch in order.
///
/// Validation and encoding failures are per record and land in
/// [`IngestReport::rejected`]. Anything else (connection, backend) aborts
/// the batch and is returned as the error; records before it stay stored.
pub fn ingest_records(
    store: &dyn AlertStore,
    raws: &[RawRecord],
) -> Result<IngestReport, StoreError> {
    let table = normalize_all(raws);
    let mut report = IngestReport::default();

    for (index, alert) in table.iter().enumerate() {
        match store.upsert_alert(alert) {
            Ok(()) => report.stored += 1,
            Err(e @ (StoreError::Validation(_) | StoreError::Serialization(_))) => {
                tracing::warn!(index, alert_id = %alert.alert_id, error = %e, "Alert rejected");
                report.rejected.push(RejectedRecord {
                    index,
                    alert_id: alert.alert_id.clone(),
                    reason: e.to_string(),
                });
            }
            Err(e) => return Err(e),
        }
    }

    tracing::info!(
        stored = report.stored,
        rejected = report.rejected.len(),
        "Ingestion batch complete"
    );
    Ok(report)
}

/// Record a pharmacist action against an alert.
pub fn record_action(
    store: &dyn AlertStore,
    submission: &ActionSubmission,
) -> Result<ActionId, StoreError> {
    store.insert_action(submission)
}
