//! Hosted backend: a Postgres database reached through its PostgREST API.
//!
//! Network access goes through [`RestTransport`] so the store logic can be
//! exercised against an in-memory fake. Each write is a single request,
//! which the server applies atomically.

pub mod ddl;
mod postgrest;

#[cfg(test)]
pub(crate) mod fake;

pub use ddl::schema_ddl;
pub use postgrest::PostgrestClient;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::SecondsFormat;
use serde::Deserialize;
use serde_json::{json, Value};

use super::codec::{self, EncodedAlert};
use super::sites::{
    counts_from_json, counts_to_json, materialize_site_counts, project_stored_counts,
};
use super::{
    assemble_detail, validate_alert, AlertRows, AlertStore, SerializationError, StoreError,
};
use crate::models::{
    ActionId, ActionSubmission, Alert, AlertDetail, PharmacistAction, SiteRegistry,
};

pub const ALERTS_TABLE: &str = "alerts";
pub const ACTIONS_TABLE: &str = "pharmacist_actions";
pub const ACTIONS_WIDE_VIEW: &str = "pharmacist_actions_wide";

/// Minimal PostgREST surface the hosted store needs.
pub trait RestTransport: Send + Sync {
    /// Succeeds when `table` exists and is readable.
    fn probe(&self, table: &str) -> Result<(), StoreError>;

    /// `GET /{table}` with PostgREST query parameters; returns the row array.
    fn select(&self, table: &str, query: &[(&str, String)]) -> Result<Vec<Value>, StoreError>;

    /// Insert or replace on the `on_conflict` key.
    fn upsert(&self, table: &str, row: &Value, on_conflict: &str) -> Result<(), StoreError>;

    /// Insert one row and return it as stored, generated columns included.
    fn insert_returning(&self, table: &str, row: &Value) -> Result<Value, StoreError>;
}

pub struct RemoteStore<T = PostgrestClient> {
    transport: T,
    sites: Arc<SiteRegistry>,
    connected: AtomicBool,
}

impl<T: RestTransport> RemoteStore<T> {
    pub fn new(transport: T, sites: Arc<SiteRegistry>) -> Self {
        Self {
            transport,
            sites,
            connected: AtomicBool::new(false),
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    fn connect_if_needed(&self) -> Result<(), StoreError> {
        if self.connected.load(Ordering::Acquire) {
            return Ok(());
        }
        self.transport.probe(ALERTS_TABLE)?;
        self.connected.store(true, Ordering::Release);
        tracing::info!("Hosted store connected");
        Ok(())
    }
}

impl<T: RestTransport> AlertStore for RemoteStore<T> {
    fn connect(&self) -> Result<(), StoreError> {
        self.connect_if_needed()
    }

    fn close(&self) {
        if self.connected.swap(false, Ordering::AcqRel) {
            tracing::debug!("Hosted store released");
        }
    }

    fn ensure_schema(&self) -> Result<(), StoreError> {
        for table in [ALERTS_TABLE, ACTIONS_TABLE] {
            if let Err(e) = self.transport.probe(table) {
                if matches!(e, StoreError::SchemaMissing { .. }) {
                    tracing::warn!(
                        table,
                        "Hosted table missing; run `alertrx schema` and apply the DDL"
                    );
                }
                return Err(e);
            }
        }
        self.connected.store(true, Ordering::Release);
        Ok(())
    }

    fn upsert_alert(&self, alert: &Alert) -> Result<(), StoreError> {
        validate_alert(alert)?;
        let row = serde_json::to_value(EncodedAlert::encode(alert)?).map_err(|e| {
            SerializationError::new(alert.alert_id.as_str(), "row", e.to_string())
        })?;
        self.connect_if_needed()?;
        self.transport.upsert(ALERTS_TABLE, &row, "alert_id")?;
        tracing::debug!(alert_id = %alert.alert_id, "Alert upserted");
        Ok(())
    }

    fn insert_action(&self, submission: &ActionSubmission) -> Result<ActionId, StoreError> {
        let counts = materialize_site_counts(&self.sites, &submission.site_counts)?;
        let mut row = json!({
            "alert_id": submission.alert_id,
            "action_taken": submission.action_taken,
            "site_counts": counts_to_json(&counts),
        });
        if let (Some(ts), Value::Object(map)) = (submission.timestamp, &mut row) {
            map.insert(
                "timestamp".into(),
                Value::from(ts.to_rfc3339_opts(SecondsFormat::AutoSi, true)),
            );
        }

        self.connect_if_needed()?;
        let stored = self.transport.insert_returning(ACTIONS_TABLE, &row)?;
        let action_id = stored
            .get("action_id")
            .and_then(Value::as_i64)
            .map(ActionId)
            .ok_or_else(|| {
                SerializationError::new(ACTIONS_TABLE, "action_id", "missing from insert response")
            })?;

        tracing::info!(
            alert_id = %submission.alert_id,
            action_id = %action_id,
            patients = counts.total(),
            "Pharmacist action recorded"
        );
        Ok(action_id)
    }

    fn get_all_alerts(&self) -> Result<AlertRows, StoreError> {
        self.connect_if_needed()?;
        let mut rows = self.transport.select(
            ALERTS_TABLE,
            &[("select", "*".into()), ("order", "alert_id.asc".into())],
        )?;
        // Postgres sorts text by locale collation; the embedded store sorts bytewise.
        rows.sort_by(|a, b| a["alert_id"].as_str().cmp(&b["alert_id"].as_str()));
        Ok(rows.into_iter().map(decode_alert_row).collect())
    }

    fn get_alert_with_actions(&self, alert_id: &str) -> Result<AlertDetail, StoreError> {
        self.connect_if_needed()?;
        let alert = self
            .transport
            .select(
                ALERTS_TABLE,
                &[
                    ("select", "*".into()),
                    ("alert_id", format!("eq.{alert_id}")),
                    ("limit", "1".into()),
                ],
            )?
            .into_iter()
            .next()
            .map(decode_alert_row);

        let actions = self
            .transport
            .select(
                ACTIONS_TABLE,
                &[
                    ("select", "*".into()),
                    ("alert_id", format!("eq.{alert_id}")),
                    ("order", "action_id.asc".into()),
                ],
            )?
            .into_iter()
            .map(|row| decode_action_row(&self.sites, row));

        Ok(assemble_detail(alert, actions))
    }

    fn sites(&self) -> &SiteRegistry {
        &self.sites
    }
}

fn decode_alert_row(row: Value) -> Result<Alert, SerializationError> {
    let record = row
        .get("alert_id")
        .and_then(Value::as_str)
        .unwrap_or("<unknown>")
        .to_string();
    let encoded: EncodedAlert = serde_json::from_value(row)
        .map_err(|e| SerializationError::new(record, "row", e.to_string()))?;
    encoded.decode()
}

#[derive(Deserialize)]
struct ActionRow {
    action_id: i64,
    alert_id: String,
    action_taken: String,
    timestamp: String,
    #[serde(default)]
    site_counts: Value,
}

fn decode_action_row(
    registry: &SiteRegistry,
    row: Value,
) -> Result<PharmacistAction, SerializationError> {
    let record = match row.get("action_id") {
        Some(id) => format!("action {id}"),
        None => "action <unknown>".to_string(),
    };
    let parsed: ActionRow = serde_json::from_value(row)
        .map_err(|e| SerializationError::new(record.as_str(), "row", e.to_string()))?;
    let timestamp = codec::decode_timestamp(&record, codec::FIELD_TIMESTAMP, &parsed.timestamp)?;
    let pairs = counts_from_json(&record, &parsed.site_counts)?;
    Ok(PharmacistAction {
        action_id: ActionId(parsed.action_id),
        alert_id: parsed.alert_id,
        action_taken: parsed.action_taken,
        timestamp,
        site_counts: project_stored_counts(registry, pairs),
    })
}
