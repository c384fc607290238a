//! Process-wide configuration, read once at start-up.
//!
//! Backend selection, storage location and the registered site list all come
//! from the environment. Nothing here is re-read during a run: the resulting
//! [`AppConfig`] is handed to [`crate::db::open_store`] and the site registry
//! is shared by reference from there on.

use std::path::PathBuf;

use thiserror::Error;

use crate::models::{BackendKind, SiteRegistry, UnknownSitePolicy};

/// Application-level constants
pub const APP_NAME: &str = "AlertRx";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default database file name inside the data directory.
pub const DB_FILE_NAME: &str = "alertrx.db";

/// Default request timeout for the hosted backend.
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;

pub const ENV_BACKEND: &str = "ALERTRX_BACKEND";
pub const ENV_DB_PATH: &str = "ALERTRX_DB_PATH";
pub const ENV_REMOTE_URL: &str = "SUPABASE_URL";
pub const ENV_REMOTE_KEY: &str = "SUPABASE_KEY";
pub const ENV_HTTP_TIMEOUT: &str = "ALERTRX_HTTP_TIMEOUT_SECS";
pub const ENV_SITES: &str = "ALERTRX_SITES";
pub const ENV_UNKNOWN_SITES: &str = "ALERTRX_UNKNOWN_SITES";

/// Practices registered by default, in display order.
pub const DEFAULT_SITES: &[&str] = &[
    "Scarsdale-Medical-Centre",
    "Earls-Court-Surgery",
    "Stanhope-Mews-Surgery",
    "The-Chelsea-Practice",
    "Health-Partners-at-Violet-Melchett",
    "Emperors-Gate-Health-Centre",
    "Knightsbridge-Medical-Centre",
    "Earls-Court-Medical-Centre",
    "The-Abingdon-Medical-Practice",
    "The-Good-Practice",
    "Royal-Hospital-Chelsea",
    "Kensington-Park-Medical-Centre",
];

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required environment variable {0}")]
    MissingVar(&'static str),

    #[error("Invalid value for {field}: {value}")]
    InvalidEnum { field: String, value: String },

    #[error("Invalid value for {var}: {reason}")]
    InvalidValue { var: &'static str, reason: String },

    #[error("Invalid site registry: {0}")]
    InvalidSites(String),
}

/// Where alerts and actions are persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendConfig {
    /// Embedded SQLite file.
    Local { path: PathBuf },
    /// Hosted PostgREST endpoint (Supabase).
    Remote {
        url: String,
        api_key: String,
        timeout_secs: u64,
    },
}

impl BackendConfig {
    pub fn kind(&self) -> BackendKind {
        match self {
            Self::Local { .. } => BackendKind::Local,
            Self::Remote { .. } => BackendKind::Remote,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub backend: BackendConfig,
    pub sites: SiteRegistry,
}

impl AppConfig {
    /// Build the configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let kind = match get(ENV_BACKEND) {
            Some(v) => v.to_ascii_lowercase().parse::<BackendKind>()?,
            None => BackendKind::Local,
        };

        let backend = match kind {
            BackendKind::Local => BackendConfig::Local {
                path: get(ENV_DB_PATH)
                    .map(PathBuf::from)
                    .unwrap_or_else(default_db_path),
            },
            BackendKind::Remote => {
                let url = get(ENV_REMOTE_URL).ok_or(ConfigError::MissingVar(ENV_REMOTE_URL))?;
                let api_key = get(ENV_REMOTE_KEY).ok_or(ConfigError::MissingVar(ENV_REMOTE_KEY))?;
                let timeout_secs = match get(ENV_HTTP_TIMEOUT) {
                    Some(v) => v.parse::<u64>().map_err(|e| ConfigError::InvalidValue {
                        var: ENV_HTTP_TIMEOUT,
                        reason: e.to_string(),
                    })?,
                    None => DEFAULT_HTTP_TIMEOUT_SECS,
                };
                BackendConfig::Remote {
                    url,
                    api_key,
                    timeout_secs,
                }
            }
        };

        let policy = match get(ENV_UNKNOWN_SITES) {
            Some(v) => v.to_ascii_lowercase().parse::<UnknownSitePolicy>()?,
            None => UnknownSitePolicy::Reject,
        };

        let site_ids: Vec<String> = match get(ENV_SITES) {
            Some(list) => list.split(',').map(|s| s.trim().to_string()).collect(),
            None => DEFAULT_SITES.iter().map(|s| s.to_string()).collect(),
        };
        let sites = SiteRegistry::new(site_ids, policy)?;

        Ok(Self { backend, sites })
    }
}

/// Get the application data directory.
/// ~/AlertRx/ when a home directory is known, the working directory otherwise.
pub fn app_data_dir() -> PathBuf {
    match dirs::home_dir() {
        Some(home) => home.join(APP_NAME),
        None => PathBuf::from("."),
    }
}

/// Default location of the embedded database.
pub fn default_db_path() -> PathBuf {
    app_data_dir().join(DB_FILE_NAME)
}

/// Log filter used when `RUST_LOG` is not set.
pub fn default_log_filter() -> &'static str {
    "alertrx_lib=info,alertrx=info"
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_to_local_backend_with_registered_sites() {
        let config = AppConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.backend.kind(), BackendKind::Local);
        assert_eq!(config.sites.len(), DEFAULT_SITES.len());
        assert_eq!(config.sites.unknown_policy(), UnknownSitePolicy::Reject);
        match config.backend {
            BackendConfig::Local { path } => assert!(path.ends_with(DB_FILE_NAME)),
            other => panic!("unexpected backend {other:?}"),
        }
    }

    #[test]
    fn local_path_override() {
        let config =
            AppConfig::from_lookup(lookup(&[(ENV_DB_PATH, "/tmp/alerts.db")])).unwrap();
        assert_eq!(
            config.backend,
            BackendConfig::Local {
                path: PathBuf::from("/tmp/alerts.db")
            }
        );
    }

    #[test]
    fn remote_requires_url_and_key() {
        let err = AppConfig::from_lookup(lookup(&[(ENV_BACKEND, "remote")])).unwrap_err();
        assert!(matches!(err, ConfigError::MissingVar(ENV_REMOTE_URL)));

        let err = AppConfig::from_lookup(lookup(&[
            (ENV_BACKEND, "remote"),
            (ENV_REMOTE_URL, "https://example.supabase.co"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::MissingVar(ENV_REMOTE_KEY)));
    }

    #[test]
    fn remote_backend_parsed() {
        let config = AppConfig::from_lookup(lookup(&[
            (ENV_BACKEND, "Remote"),
            (ENV_REMOTE_URL, "https://example.supabase.co"),
            (ENV_REMOTE_KEY, "anon-key"),
            (ENV_HTTP_TIMEOUT, "5"),
        ]))
        .unwrap();
        assert_eq!(
            config.backend,
            BackendConfig::Remote {
                url: "https://example.supabase.co".into(),
                api_key: "anon-key".into(),
                timeout_secs: 5,
            }
        );
    }

    #[test]
    fn unknown_backend_rejected() {
        let err = AppConfig::from_lookup(lookup(&[(ENV_BACKEND, "mongo")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEnum { .. }));
    }

    #[test]
    fn bad_timeout_rejected() {
        let err = AppConfig::from_lookup(lookup(&[
            (ENV_BACKEND, "remote"),
            (ENV_REMOTE_URL, "https://example.supabase.co"),
            (ENV_REMOTE_KEY, "k"),
            (ENV_HTTP_TIMEOUT, "soon"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { var: ENV_HTTP_TIMEOUT, .. }));
    }

    #[test]
    fn site_list_and_policy_override() {
        let config = AppConfig::from_lookup(lookup(&[
            (ENV_SITES, "SiteA, SiteB ,SiteC"),
            (ENV_UNKNOWN_SITES, "ignore"),
        ]))
        .unwrap();
        let ids: Vec<&str> = config.sites.iter().collect();
        assert_eq!(ids, vec!["SiteA", "SiteB", "SiteC"]);
        assert_eq!(config.sites.unknown_policy(), UnknownSitePolicy::Ignore);
    }

    #[test]
    fn duplicate_sites_rejected() {
        let err =
            AppConfig::from_lookup(lookup(&[(ENV_SITES, "SiteA,SiteA")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidSites(_)));
    }

    #[test]
    fn app_data_dir_named_after_app() {
        let dir = app_data_dir();
        if dirs::home_dir().is_some() {
            assert!(dir.ends_with(APP_NAME));
        }
    }

    #[test]
    fn app_version_matches_cargo() {
        assert_eq!(APP_VERSION, "0.1.0");
    }
}
