use std::path::Path;

use rusqlite::{params, Connection, OpenFlags};

use super::StoreError;
use crate::models::SiteRegistry;

const BUSY_TIMEOUT_MS: u32 = 5_000;

/// Open the read-write connection for a database file. Does not migrate.
pub fn open_writer(path: &Path) -> Result<Connection, StoreError> {
    let conn = Connection::open(path)?;
    configure_pragmas(&conn)?;
    Ok(conn)
}

/// Open a read-only connection to an existing database file.
///
/// With the writer in WAL mode this connection reads the last committed
/// snapshot without waiting on an open write transaction.
pub fn open_reader(path: &Path) -> Result<Connection, StoreError> {
    let conn = Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )?;
    conn.busy_timeout(std::time::Duration::from_millis(u64::from(BUSY_TIMEOUT_MS)))?;
    conn.execute_batch("PRAGMA query_only=ON;")?;
    Ok(conn)
}

/// Open an in-memory database (for testing)
pub fn open_memory_database() -> Result<Connection, StoreError> {
    let conn = Connection::open_in_memory()?;
    configure_pragmas(&conn)?;
    Ok(conn)
}

fn configure_pragmas(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch(&format!(
        "PRAGMA journal_mode=WAL;
         PRAGMA synchronous=NORMAL;
         PRAGMA busy_timeout={BUSY_TIMEOUT_MS};
         PRAGMA foreign_keys=ON;"
    ))?;
    Ok(())
}

/// Run all pending migrations
pub fn run_migrations(conn: &Connection) -> Result<(), StoreError> {
    let current_version = get_current_version(conn);

    let migrations: Vec<(i64, &str)> = vec![(
        1,
        include_str!("../../resources/migrations/001_initial.sql"),
    )];

    for (version, sql) in migrations {
        if version > current_version {
            tracing::info!("Running migration v{version}");
            conn.execute_batch(sql)
                .map_err(|e| StoreError::MigrationFailed {
                    version,
                    reason: e.to_string(),
                })?;
        }
    }

    Ok(())
}

/// Get the current schema version (0 if no schema exists yet)
fn get_current_version(conn: &Connection) -> i64 {
    conn.query_row("SELECT MAX(version) FROM schema_version", [], |row| {
        row.get::<_, Option<i64>>(0)
    })
    .ok()
    .flatten()
    .unwrap_or(0)
}

/// Mirror the configured registry into the `sites` table.
///
/// Sites are only ever added or re-positioned; rows for sites dropped from
/// configuration stay so that historic counts keep their foreign key.
pub fn sync_sites(conn: &Connection, registry: &SiteRegistry) -> Result<(), StoreError> {
    let tx = conn.unchecked_transaction()?;
    {
        let mut stmt = tx.prepare(
            "INSERT INTO sites (site_id, position) VALUES (?1, ?2)
             ON CONFLICT(site_id) DO UPDATE SET position = excluded.position",
        )?;
        for (position, site_id) in registry.iter().enumerate() {
            stmt.execute(params![site_id, position as i64])?;
        }
    }
    tx.commit()?;
    tracing::debug!(sites = registry.len(), "Site registry synchronised");
    Ok(())
}

/// Count tables in the database (for verification)
pub fn count_tables(conn: &Connection) -> Result<i64, StoreError> {
    let count = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name NOT LIKE 'sqlite_%'",
        [],
        |row| row.get::<_, i64>(0),
    )?;
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::UnknownSitePolicy;

    fn migrated() -> Connection {
        let conn = open_memory_database().unwrap();
        run_migrations(&conn).unwrap();
        conn
    }

    #[test]
    fn database_initializes_all_tables() {
        let conn = migrated();
        // schema_version, alerts, pharmacist_actions, sites, action_site_counts
        assert_eq!(count_tables(&conn).unwrap(), 5);
    }

    #[test]
    fn schema_version_is_current() {
        let conn = migrated();
        assert_eq!(get_current_version(&conn), 1);
    }

    #[test]
    fn fresh_database_reports_version_zero() {
        let conn = open_memory_database().unwrap();
        assert_eq!(get_current_version(&conn), 0);
    }

    #[test]
    fn migration_idempotent() {
        let conn = migrated();
        assert!(run_migrations(&conn).is_ok());
        assert_eq!(get_current_version(&conn), 1);
    }

    #[test]
    fn foreign_keys_enabled() {
        let conn = migrated();
        let fk: i64 = conn
            .query_row("PRAGMA foreign_keys", [], |row| row.get(0))
            .unwrap();
        assert_eq!(fk, 1);
    }

    #[test]
    fn negative_counts_rejected_by_schema() {
        let conn = migrated();
        conn.execute("INSERT INTO sites (site_id, position) VALUES ('S', 0)", [])
            .unwrap();
        conn.execute(
            "INSERT INTO pharmacist_actions (alert_id, action_taken) VALUES ('A1', 'x')",
            [],
        )
        .unwrap();
        let result = conn.execute(
            "INSERT INTO action_site_counts (action_id, site_id, patient_count) VALUES (1, 'S', -1)",
            [],
        );
        assert!(result.is_err());
    }

    #[test]
    fn sync_sites_keeps_retired_rows_and_updates_order() {
        let conn = migrated();
        let first = SiteRegistry::new(
            vec!["A".into(), "B".into()],
            UnknownSitePolicy::Reject,
        )
        .unwrap();
        sync_sites(&conn, &first).unwrap();

        let second = SiteRegistry::new(
            vec!["C".into(), "A".into()],
            UnknownSitePolicy::Reject,
        )
        .unwrap();
        sync_sites(&conn, &second).unwrap();

        let rows: Vec<(String, i64)> = conn
            .prepare("SELECT site_id, position FROM sites ORDER BY site_id")
            .unwrap()
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(
            rows,
            vec![("A".into(), 1), ("B".into(), 1), ("C".into(), 0)]
        );
    }
}
