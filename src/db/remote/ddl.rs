//! DDL for the hosted store.
//!
//! The REST surface cannot create tables, so the schema is handed to an
//! operator (`alertrx schema`) to apply once in the hosted SQL editor.

use std::fmt::Write as _;

use crate::models::SiteRegistry;

use super::{ACTIONS_TABLE, ACTIONS_WIDE_VIEW, ALERTS_TABLE};

/// Full schema script for the hosted Postgres database, including a
/// read-only wide view with one integer column per registered site.
pub fn schema_ddl(registry: &SiteRegistry) -> String {
    let mut sql = String::new();

    let _ = writeln!(
        sql,
        "CREATE TABLE IF NOT EXISTS {ALERTS_TABLE} (
    alert_id text PRIMARY KEY,
    title text NOT NULL DEFAULT '',
    date_published text,
    severity text NOT NULL DEFAULT 'Medium',
    summary text NOT NULL DEFAULT '',
    affected_products text NOT NULL DEFAULT '[]',
    recommendations text NOT NULL DEFAULT '[]',
    source_url text NOT NULL DEFAULT '',
    source_name text NOT NULL DEFAULT '',
    raw_data text NOT NULL DEFAULT '{{}}'
);
"
    );

    let _ = writeln!(
        sql,
        "CREATE TABLE IF NOT EXISTS {ACTIONS_TABLE} (
    action_id bigint GENERATED ALWAYS AS IDENTITY PRIMARY KEY,
    alert_id text NOT NULL,
    action_taken text NOT NULL,
    \"timestamp\" timestamptz NOT NULL DEFAULT now(),
    site_counts jsonb NOT NULL DEFAULT '{{}}'::jsonb
        CHECK (jsonb_typeof(site_counts) = 'object')
);

CREATE INDEX IF NOT EXISTS idx_{ACTIONS_TABLE}_alert
    ON {ACTIONS_TABLE} (alert_id, action_id);
"
    );

    let _ = writeln!(
        sql,
        "CREATE OR REPLACE VIEW {ACTIONS_WIDE_VIEW} AS\nSELECT\n    action_id,\n    alert_id,\n    \"timestamp\",\n    action_taken{}\nFROM {ACTIONS_TABLE};",
        registry
            .iter()
            .map(|site| format!(
                ",\n    COALESCE((site_counts ->> {})::integer, 0) AS {}",
                quote_literal(site),
                quote_ident(site)
            ))
            .collect::<String>()
    );

    sql
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::UnknownSitePolicy;

    #[test]
    fn ddl_declares_both_tables_and_wide_view() {
        let registry = SiteRegistry::new(
            vec!["Ashfields".into(), "Orchard".into()],
            UnknownSitePolicy::Reject,
        )
        .unwrap();
        let sql = schema_ddl(&registry);
        assert!(sql.contains("CREATE TABLE IF NOT EXISTS alerts ("));
        assert!(sql.contains("CREATE TABLE IF NOT EXISTS pharmacist_actions ("));
        assert!(sql.contains("raw_data text NOT NULL DEFAULT '{}'"));
        assert!(sql.contains("CREATE OR REPLACE VIEW pharmacist_actions_wide AS"));
        assert!(sql.contains(
            "COALESCE((site_counts ->> 'Ashfields')::integer, 0) AS \"Ashfields\""
        ));
        assert!(sql.find("\"Ashfields\"") < sql.find("\"Orchard\""));
    }

    #[test]
    fn site_names_are_quoted() {
        let registry = SiteRegistry::new(
            vec!["O'Brien \"North\"".into()],
            UnknownSitePolicy::Reject,
        )
        .unwrap();
        let sql = schema_ddl(&registry);
        assert!(sql.contains("->> 'O''Brien \"North\"'"));
        assert!(sql.contains("AS \"O'Brien \"\"North\"\"\""));
    }

    #[test]
    fn empty_registry_still_produces_a_view() {
        let registry = SiteRegistry::new(vec![], UnknownSitePolicy::Reject).unwrap();
        let sql = schema_ddl(&registry);
        assert!(sql.contains("    action_taken\nFROM pharmacist_actions;"));
    }
}
