//! Embedded backend: one SQLite file (or an in-memory database).
//!
//! Writes go through a single connection behind a mutex, which serialises
//! every upsert and action insert. File databases run in WAL mode with a
//! second, read-only connection so reads never wait on a writer. In-memory
//! databases cannot be shared between connections and route reads through
//! the writer.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::SecondsFormat;
use rusqlite::{params, Connection, OptionalExtension, Row};

use super::codec::{self, EncodedAlert};
use super::sites::{materialize_site_counts, project_stored_counts};
use super::{
    assemble_detail, sqlite, validate_alert, AlertRows, AlertStore, SerializationError,
    StoreError,
};
use crate::models::{
    ActionId, ActionSubmission, Alert, AlertDetail, PharmacistAction, SiteRegistry,
};

const ALERT_SELECT: &str = "SELECT alert_id, title, date_published, severity, summary,
        affected_products, recommendations, source_url, source_name, raw_data
 FROM alerts";

#[derive(Debug, Clone, PartialEq, Eq)]
enum Location {
    File(PathBuf),
    Memory,
}

pub struct SqliteStore {
    location: Location,
    sites: Arc<SiteRegistry>,
    writer: Mutex<Option<Connection>>,
    reader: Mutex<Option<Connection>>,
}

impl SqliteStore {
    /// Store backed by the file at `path`. Nothing is opened until first use.
    pub fn open(path: &Path, sites: Arc<SiteRegistry>) -> Self {
        Self::with_location(Location::File(path.to_path_buf()), sites)
    }

    /// Private in-memory database, dropped on [`AlertStore::close`].
    pub fn open_in_memory(sites: Arc<SiteRegistry>) -> Self {
        Self::with_location(Location::Memory, sites)
    }

    fn with_location(location: Location, sites: Arc<SiteRegistry>) -> Self {
        Self {
            location,
            sites,
            writer: Mutex::new(None),
            reader: Mutex::new(None),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        match &self.location {
            Location::File(path) => Some(path),
            Location::Memory => None,
        }
    }

    fn open_writer_connection(&self) -> Result<Connection, StoreError> {
        let conn = match &self.location {
            Location::File(path) => {
                if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                    std::fs::create_dir_all(parent).map_err(|e| {
                        StoreError::Connection(format!("{}: {e}", parent.display()))
                    })?;
                }
                sqlite::open_writer(path)
            }
            Location::Memory => sqlite::open_memory_database(),
        };
        let conn = conn.map_err(into_connection_error)?;
        tracing::info!(location = ?self.location, "Embedded store connected");
        Ok(conn)
    }

    fn with_writer<T>(
        &self,
        f: impl FnOnce(&Connection) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let mut guard = self.writer.lock().map_err(|_| StoreError::LockPoisoned)?;
        let conn = match &mut *guard {
            Some(conn) => conn,
            slot => slot.insert(self.open_writer_connection()?),
        };
        f(conn)
    }

    fn with_reader<T>(
        &self,
        f: impl FnOnce(&Connection) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let path = match &self.location {
            Location::File(path) => path,
            Location::Memory => return self.with_writer(f),
        };
        // The reader opens read-only, so the file must exist first.
        self.connect()?;
        let mut guard = self.reader.lock().map_err(|_| StoreError::LockPoisoned)?;
        let conn = match &mut *guard {
            Some(conn) => conn,
            slot => slot.insert(sqlite::open_reader(path).map_err(into_connection_error)?),
        };
        f(conn)
    }
}

impl AlertStore for SqliteStore {
    fn connect(&self) -> Result<(), StoreError> {
        self.with_writer(|_| Ok(()))
    }

    fn close(&self) {
        for slot in [&self.reader, &self.writer] {
            let taken = match slot.lock() {
                Ok(mut guard) => guard.take(),
                Err(poisoned) => poisoned.into_inner().take(),
            };
            if let Some(conn) = taken {
                if let Err((_, e)) = conn.close() {
                    tracing::warn!(error = %e, "Error while closing embedded store");
                }
            }
        }
    }

    fn ensure_schema(&self) -> Result<(), StoreError> {
        self.with_writer(|conn| {
            sqlite::run_migrations(conn)?;
            sqlite::sync_sites(conn, &self.sites)
        })
    }

    fn upsert_alert(&self, alert: &Alert) -> Result<(), StoreError> {
        validate_alert(alert)?;
        let row = EncodedAlert::encode(alert)?;
        self.with_writer(|conn| {
            conn.execute(
                "INSERT INTO alerts (alert_id, title, date_published, severity, summary,
                    affected_products, recommendations, source_url, source_name, raw_data)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
                 ON CONFLICT(alert_id) DO UPDATE SET
                    title = excluded.title,
                    date_published = excluded.date_published,
                    severity = excluded.severity,
                    summary = excluded.summary,
                    affected_products = excluded.affected_products,
                    recommendations = excluded.recommendations,
                    source_url = excluded.source_url,
                    source_name = excluded.source_name,
                    raw_data = excluded.raw_data",
                params![
                    row.alert_id,
                    row.title,
                    row.date_published,
                    row.severity,
                    row.summary,
                    row.affected_products,
                    row.recommendations,
                    row.source_url,
                    row.source_name,
                    row.raw_data,
                ],
            )?;
            Ok(())
        })?;
        tracing::debug!(alert_id = %alert.alert_id, "Alert upserted");
        Ok(())
    }

    fn insert_action(&self, submission: &ActionSubmission) -> Result<ActionId, StoreError> {
        let counts = materialize_site_counts(&self.sites, &submission.site_counts)?;
        let timestamp = submission
            .timestamp
            .map(|t| t.to_rfc3339_opts(SecondsFormat::AutoSi, true));

        let action_id = self.with_writer(|conn| {
            let tx = conn.unchecked_transaction()?;
            tx.execute(
                "INSERT INTO pharmacist_actions (alert_id, action_taken, timestamp)
                 VALUES (?1, ?2, COALESCE(?3, strftime('%Y-%m-%dT%H:%M:%fZ', 'now')))",
                params![submission.alert_id, submission.action_taken, timestamp],
            )?;
            let action_id = tx.last_insert_rowid();
            {
                let mut stmt = tx.prepare(
                    "INSERT INTO action_site_counts (action_id, site_id, patient_count)
                     VALUES (?1, ?2, ?3)",
                )?;
                for count in counts.iter() {
                    stmt.execute(params![action_id, count.site_id, count.patients])?;
                }
            }
            tx.commit()?;
            Ok(ActionId(action_id))
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
        self.with_reader(|conn| {
            let mut stmt = conn.prepare(&format!("{ALERT_SELECT} ORDER BY alert_id"))?;
            let rows = stmt
                .query_map([], encoded_alert_from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows.into_iter().map(EncodedAlert::decode).collect())
        })
    }

    fn get_alert_with_actions(&self, alert_id: &str) -> Result<AlertDetail, StoreError> {
        self.with_reader(|conn| {
            // One read transaction so the alert and its actions come from
            // the same snapshot.
            let tx = conn.unchecked_transaction()?;
            let alert = tx
                .query_row(
                    &format!("{ALERT_SELECT} WHERE alert_id = ?1"),
                    [alert_id],
                    encoded_alert_from_row,
                )
                .optional()?
                .map(EncodedAlert::decode);
            let actions = load_actions(&tx, &self.sites, alert_id)?;
            Ok(assemble_detail(alert, actions))
        })
    }

    fn sites(&self) -> &SiteRegistry {
        &self.sites
    }
}

impl Drop for SqliteStore {
    fn drop(&mut self) {
        self.close();
    }
}

fn into_connection_error(err: StoreError) -> StoreError {
    match err {
        StoreError::Sqlite(e) => StoreError::Connection(e.to_string()),
        other => other,
    }
}

fn encoded_alert_from_row(row: &Row<'_>) -> rusqlite::Result<EncodedAlert> {
    Ok(EncodedAlert {
        alert_id: row.get(0)?,
        title: row.get(1)?,
        date_published: row.get(2)?,
        severity: row.get(3)?,
        summary: row.get(4)?,
        affected_products: row.get(5)?,
        recommendations: row.get(6)?,
        source_url: row.get(7)?,
        source_name: row.get(8)?,
        raw_data: row.get(9)?,
    })
}

fn load_actions(
    conn: &Connection,
    registry: &SiteRegistry,
    alert_id: &str,
) -> Result<Vec<Result<PharmacistAction, SerializationError>>, StoreError> {
    let mut counts: BTreeMap<i64, Vec<(String, u32)>> = BTreeMap::new();
    {
        let mut stmt = conn.prepare(
            "SELECT c.action_id, c.site_id, c.patient_count
             FROM action_site_counts c
             JOIN pharmacist_actions a ON a.action_id = c.action_id
             WHERE a.alert_id = ?1",
        )?;
        let rows = stmt.query_map([alert_id], |row| {
            Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?, row.get::<_, u32>(2)?))
        })?;
        for row in rows {
            let (action_id, site_id, patients) = row?;
            counts.entry(action_id).or_default().push((site_id, patients));
        }
    }

    let mut stmt = conn.prepare(
        "SELECT action_id, action_taken, timestamp
         FROM pharmacist_actions
         WHERE alert_id = ?1
         ORDER BY action_id ASC",
    )?;
    let rows = stmt.query_map([alert_id], |row| {
        Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?, row.get::<_, String>(2)?))
    })?;

    let mut actions = Vec::new();
    for row in rows {
        let (action_id, action_taken, timestamp) = row?;
        let site_counts =
            project_stored_counts(registry, counts.remove(&action_id).unwrap_or_default());
        let action = codec::decode_timestamp(
            &format!("action {action_id}"),
            codec::FIELD_TIMESTAMP,
            &timestamp,
        )
        .map(|timestamp| PharmacistAction {
            action_id: ActionId(action_id),
            alert_id: alert_id.to_string(),
            action_taken,
            timestamp,
            site_counts,
        });
        actions.push(action);
    }
    Ok(actions)
}
