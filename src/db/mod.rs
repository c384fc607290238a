//! Persistence store: one capability interface, two interchangeable backends.
//!
//! [`AlertStore`] is implemented by the embedded [`SqliteStore`] and the hosted
//! [`RemoteStore`]; [`open_store`] picks one from configuration so callers stay
//! backend-agnostic. Structured fields are persisted through [`codec`] and
//! per-site counts through the action aggregator in [`sites`].

pub mod codec;
pub mod local;
pub mod remote;
pub mod sites;
pub mod sqlite;

pub use local::SqliteStore;
pub use remote::{PostgrestClient, RemoteStore, RestTransport};

use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;

use crate::config::{AppConfig, BackendConfig};
use crate::models::{
    ActionId, ActionSubmission, Alert, AlertDetail, PharmacistAction, SiteRegistry,
};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Store unreachable: {0}")]
    Connection(String),

    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Serialization(#[from] SerializationError),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Hosted store returned error (status {status}): {body}")]
    Remote { status: u16, body: String },

    #[error("Migration failed at version {version}: {reason}")]
    MigrationFailed { version: i64, reason: String },

    #[error("Table {table} is missing from the hosted store; apply the schema DDL first")]
    SchemaMissing { table: String },

    #[error("Internal lock error")]
    LockPoisoned,
}

/// Rejected before any write is attempted.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Alert has no alert_id")]
    MissingAlertId,

    #[error("Site {0} is not registered")]
    UnknownSite(String),

    #[error("Negative patient count {count} for site {site_id}")]
    NegativeCount { site_id: String, count: i64 },

    #[error("Patient count {count} for site {site_id} is out of range")]
    CountOutOfRange { site_id: String, count: i64 },
}

/// A stored structured field failed strict decoding.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Cannot decode {field} of {record}: {reason}")]
pub struct SerializationError {
    /// Alert id, or `action <id>` for action rows.
    pub record: String,
    pub field: &'static str,
    pub reason: String,
}

impl SerializationError {
    pub fn new(record: impl Into<String>, field: &'static str, reason: impl Into<String>) -> Self {
        Self {
            record: record.into(),
            field,
            reason: reason.into(),
        }
    }
}

/// Serialized as its message.
impl Serialize for SerializationError {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Result of a full alert scan: each row decoded independently.
pub type AlertRows = Vec<Result<Alert, SerializationError>>;

/// Storage capability shared by both backends.
///
/// Every operation connects lazily when [`AlertStore::connect`] was not
/// called first. All failures come back as typed results.
pub trait AlertStore: Send + Sync {
    /// Acquire the underlying resource. Idempotent.
    fn connect(&self) -> Result<(), StoreError>;

    /// Release the underlying resource. Safe to call repeatedly.
    fn close(&self);

    /// Create-if-absent of every table; no effect on existing data.
    fn ensure_schema(&self) -> Result<(), StoreError>;

    /// Insert or fully replace the alert keyed by `alert_id`.
    fn upsert_alert(&self, alert: &Alert) -> Result<(), StoreError>;

    /// Append one action; counts are validated and completed first.
    fn insert_action(&self, submission: &ActionSubmission) -> Result<ActionId, StoreError>;

    /// Full scan of stored alerts, decode failures reported per row.
    fn get_all_alerts(&self) -> Result<AlertRows, StoreError>;

    /// Point lookup joined with the alert's actions in insertion order.
    /// A miss is an empty [`AlertDetail`], not an error. Rows that fail to
    /// decode are reported in [`AlertDetail::unreadable`].
    fn get_alert_with_actions(&self, alert_id: &str) -> Result<AlertDetail, StoreError>;

    /// Registry the store validates site counts against.
    fn sites(&self) -> &SiteRegistry;
}

/// Join independently decoded rows into one detail. Rows that failed to
/// decode land in [`AlertDetail::unreadable`]; the readable rest is kept.
pub(crate) fn assemble_detail(
    alert: Option<Result<Alert, SerializationError>>,
    actions: impl IntoIterator<Item = Result<PharmacistAction, SerializationError>>,
) -> AlertDetail {
    let mut detail = AlertDetail::default();
    match alert {
        Some(Ok(alert)) => detail.alert = Some(alert),
        Some(Err(e)) => detail.unreadable.push(e),
        None => {}
    }
    for action in actions {
        match action {
            Ok(action) => detail.actions.push(action),
            Err(e) => detail.unreadable.push(e),
        }
    }
    for e in &detail.unreadable {
        tracing::warn!(record = %e.record, field = e.field, "Skipping unreadable row");
    }
    detail
}

/// Open the backend selected by configuration. Nothing is connected yet.
pub fn open_store(config: &AppConfig) -> Result<Box<dyn AlertStore>, StoreError> {
    let sites = Arc::new(config.sites.clone());
    match &config.backend {
        BackendConfig::Local { path } => {
            tracing::info!(path = %path.display(), "Using embedded alert store");
            Ok(Box::new(SqliteStore::open(path, sites)))
        }
        BackendConfig::Remote {
            url,
            api_key,
            timeout_secs,
        } => {
            tracing::info!(url = %url, "Using hosted alert store");
            let client = PostgrestClient::new(url, api_key, *timeout_secs)?;
            Ok(Box::new(RemoteStore::new(client, sites)))
        }
    }
}

/// Checks shared by both backends before an alert is written.
pub(crate) fn validate_alert(alert: &Alert) -> Result<(), ValidationError> {
    if alert.alert_id.trim().is_empty() {
        return Err(ValidationError::MissingAlertId);
    }
    Ok(())
}
