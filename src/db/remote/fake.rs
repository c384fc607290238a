//! In-memory stand-in for a PostgREST endpoint (tests only).

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use chrono::{SecondsFormat, Utc};
use serde_json::Value;

use super::RestTransport;
use crate::db::StoreError;

#[derive(Default)]
pub struct FakeRest {
    tables: Mutex<BTreeMap<String, Vec<Value>>>,
    missing: BTreeSet<String>,
    next_id: Mutex<i64>,
    offline: AtomicBool,
    pub probes: AtomicUsize,
}

impl FakeRest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tables that answer every request with "not found".
    pub fn without_table(mut self, table: &str) -> Self {
        self.missing.insert(table.to_string());
        self
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Write a row directly, bypassing the store (for corrupt-data tests).
    pub fn seed(&self, table: &str, row: Value) {
        if let Ok(mut tables) = self.tables.lock() {
            tables.entry(table.to_string()).or_default().push(row);
        }
    }

    pub fn rows(&self, table: &str) -> Vec<Value> {
        self.tables
            .lock()
            .map(|t| t.get(table).cloned().unwrap_or_default())
            .unwrap_or_default()
    }

    fn reachable(&self, table: &str) -> Result<(), StoreError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(StoreError::Connection("Cannot reach fake".into()));
        }
        if self.missing.contains(table) {
            return Err(StoreError::Remote {
                status: 404,
                body: format!("relation \"{table}\" does not exist"),
            });
        }
        Ok(())
    }
}

fn row_matches(row: &Value, filters: &[(&str, &str)]) -> bool {
    filters.iter().all(|(column, expected)| match row.get(*column) {
        Some(Value::String(s)) => s == expected,
        Some(other) => other.to_string() == *expected,
        None => false,
    })
}

impl RestTransport for FakeRest {
    fn probe(&self, table: &str) -> Result<(), StoreError> {
        self.probes.fetch_add(1, Ordering::SeqCst);
        match self.reachable(table) {
            Err(StoreError::Remote { status: 404, .. }) => Err(StoreError::SchemaMissing {
                table: table.to_string(),
            }),
            other => other,
        }
    }

    fn select(&self, table: &str, query: &[(&str, String)]) -> Result<Vec<Value>, StoreError> {
        self.reachable(table)?;
        let mut filters = Vec::new();
        let mut order: Option<(&str, bool)> = None;
        let mut limit: Option<usize> = None;
        for (key, value) in query {
            match *key {
                "select" => {}
                "order" => {
                    let (column, direction) =
                        value.split_once('.').unwrap_or((value.as_str(), "asc"));
                    order = Some((column, direction == "desc"));
                }
                "limit" => limit = value.parse().ok(),
                column => {
                    if let Some(expected) = value.strip_prefix("eq.") {
                        filters.push((column, expected));
                    }
                }
            }
        }

        let mut rows: Vec<Value> = self
            .rows(table)
            .into_iter()
            .filter(|row| row_matches(row, &filters))
            .collect();
        if let Some((column, desc)) = order {
            rows.sort_by(|a, b| {
                let ord = match (&a[column], &b[column]) {
                    (Value::Number(x), Value::Number(y)) => x
                        .as_f64()
                        .partial_cmp(&y.as_f64())
                        .unwrap_or(std::cmp::Ordering::Equal),
                    (x, y) => x.to_string().cmp(&y.to_string()),
                };
                if desc { ord.reverse() } else { ord }
            });
        }
        if let Some(limit) = limit {
            rows.truncate(limit);
        }
        Ok(rows)
    }

    fn upsert(&self, table: &str, row: &Value, on_conflict: &str) -> Result<(), StoreError> {
        self.reachable(table)?;
        let mut tables = self.tables.lock().map_err(|_| StoreError::LockPoisoned)?;
        let rows = tables.entry(table.to_string()).or_default();
        match rows.iter_mut().find(|r| r[on_conflict] == row[on_conflict]) {
            Some(existing) => *existing = row.clone(),
            None => rows.push(row.clone()),
        }
        Ok(())
    }

    fn insert_returning(&self, table: &str, row: &Value) -> Result<Value, StoreError> {
        self.reachable(table)?;
        let mut stored = row.clone();
        let id = {
            let mut next = self.next_id.lock().map_err(|_| StoreError::LockPoisoned)?;
            *next += 1;
            *next
        };
        if let Value::Object(map) = &mut stored {
            map.insert("action_id".into(), Value::from(id));
            map.entry("timestamp").or_insert_with(|| {
                Value::from(Utc::now().to_rfc3339_opts(SecondsFormat::Micros, false))
            });
        }
        self.tables
            .lock()
            .map_err(|_| StoreError::LockPoisoned)?
            .entry(table.to_string())
            .or_default()
            .push(stored.clone());
        Ok(stored)
    }
}
