//! `alertrx` command line.
//!
//! - `alertrx init`                      - create or verify the store schema
//! - `alertrx schema`                    - print the hosted DDL
//! - `alertrx ingest <file.json>`        - normalize and store raw alerts
//! - `alertrx list`                      - every stored alert
//! - `alertrx show <alert_id>`           - one alert with its actions
//! - `alertrx record <alert_id> <text>`  - record a pharmacist action
//!
//! Results go to stdout as JSON; diagnostics go to stderr through tracing.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::config::{AppConfig, BackendConfig, ConfigError};
use crate::db::{self, AlertStore, StoreError};
use crate::ingest::{ingest_records, record_action};
use crate::models::{ActionSubmission, RawRecord};
use crate::query::AlertQueries;

/// Medical alert store and pharmacist action log
#[derive(Parser, Debug)]
#[command(name = "alertrx", version)]
#[command(about = "Normalize medical alerts and record pharmacist actions", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create the embedded schema, or verify the hosted one
    Init,
    /// Print the DDL to apply on the hosted database
    Schema,
    /// Normalize and upsert raw alerts from a JSON file (array of objects)
    Ingest {
        file: PathBuf,
    },
    /// List stored alerts
    List,
    /// Show one alert with its action history
    Show {
        alert_id: String,
        /// Print actions as flat rows with one column per site
        #[arg(long)]
        wide: bool,
    },
    /// Record a pharmacist action against an alert
    Record {
        alert_id: String,
        action_taken: String,
        /// Patients affected at a site, as SITE=N (repeatable)
        #[arg(short, long = "count", value_parser = parse_site_count)]
        counts: Vec<(String, i64)>,
        /// Action time (RFC 3339); defaults to now
        #[arg(long)]
        at: Option<DateTime<Utc>>,
    },
}

#[derive(Error, Debug)]
pub enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Expected a JSON array of alert objects")]
    NotAnArray,
}

pub fn run(cli: Cli) -> Result<(), CliError> {
    let config = AppConfig::from_env()?;

    if let Commands::Schema = cli.command {
        print!("{}", db::remote::schema_ddl(&config.sites));
        return Ok(());
    }

    let store = db::open_store(&config)?;
    let result = dispatch(cli.command, &config, store.as_ref());
    store.close();
    result
}

fn dispatch(command: Commands, config: &AppConfig, store: &dyn AlertStore) -> Result<(), CliError> {
    store.ensure_schema()?;

    match command {
        Commands::Init => {
            let location = match &config.backend {
                BackendConfig::Local { path } => path.display().to_string(),
                BackendConfig::Remote { url, .. } => url.clone(),
            };
            print_json(&serde_json::json!({
                "backend": config.backend.kind().as_str(),
                "location": location,
                "sites": store.sites().iter().collect::<Vec<_>>(),
            }))
        }
        Commands::Schema => Ok(()),
        Commands::Ingest { file } => {
            let raws = read_raw_records(&file)?;
            let report = ingest_records(store, &raws)?;
            print_json(&report)
        }
        Commands::List => {
            let listing = AlertQueries::new(store).list_alerts()?;
            print_json(&listing)
        }
        Commands::Show { alert_id, wide } => {
            let detail = AlertQueries::new(store).alert_detail(&alert_id)?;
            if wide {
                let rows: Vec<_> = detail.actions.iter().map(|a| a.wide_row()).collect();
                print_json(&rows)
            } else {
                print_json(&detail)
            }
        }
        Commands::Record {
            alert_id,
            action_taken,
            counts,
            at,
        } => {
            let mut submission = ActionSubmission::new(alert_id, action_taken);
            for (site_id, patients) in counts {
                submission = submission.with_count(site_id, patients);
            }
            submission.timestamp = at;
            let action_id = record_action(store, &submission)?;
            print_json(&serde_json::json!({ "action_id": action_id }))
        }
    }
}

/// Load a batch file. Entries that are not JSON objects are skipped.
fn read_raw_records(path: &Path) -> Result<Vec<RawRecord>, CliError> {
    let text = std::fs::read_to_string(path).map_err(|source| CliError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_raw_records(&text)
}

fn parse_raw_records(text: &str) -> Result<Vec<RawRecord>, CliError> {
    let Value::Array(items) = serde_json::from_str::<Value>(text)? else {
        return Err(CliError::NotAnArray);
    };
    let mut raws = Vec::with_capacity(items.len());
    for (index, item) in items.into_iter().enumerate() {
        match item {
            Value::Object(map) => raws.push(map),
            _ => tracing::warn!(index, "Skipping batch entry that is not an object"),
        }
    }
    Ok(raws)
}

fn parse_site_count(arg: &str) -> Result<(String, i64), String> {
    let (site, count) = arg
        .split_once('=')
        .ok_or_else(|| format!("expected SITE=N, got {arg:?}"))?;
    let site = site.trim();
    if site.is_empty() {
        return Err(format!("missing site in {arg:?}"));
    }
    let count = count
        .trim()
        .parse::<i64>()
        .map_err(|e| format!("invalid count in {arg:?}: {e}"))?;
    Ok((site.to_string(), count))
}

fn print_json<T: Serialize>(value: &T) -> Result<(), CliError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
