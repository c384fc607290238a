use std::collections::HashSet;

use crate::config::ConfigError;

use super::enums::UnknownSitePolicy;

/// Fixed columns of a wide action row; a site cannot share their names.
pub const RESERVED_SITE_NAMES: [&str; 4] =
    ["action_id", "alert_id", "timestamp", "action_taken"];

/// Closed, ordered set of registered care sites for one run.
///
/// Built once from configuration and shared by reference into the store.
/// Order is the display order used when actions are projected to wide rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiteRegistry {
    sites: Vec<String>,
    unknown_policy: UnknownSitePolicy,
}

impl SiteRegistry {
    pub fn new(
        sites: Vec<String>,
        unknown_policy: UnknownSitePolicy,
    ) -> Result<Self, ConfigError> {
        let mut seen = HashSet::new();
        for site in &sites {
            if site.trim().is_empty() {
                return Err(ConfigError::InvalidSites("blank site identifier".into()));
            }
            if site.trim() != site {
                return Err(ConfigError::InvalidSites(format!(
                    "site identifier has surrounding whitespace: {site:?}"
                )));
            }
            if RESERVED_SITE_NAMES.contains(&site.as_str()) {
                return Err(ConfigError::InvalidSites(format!(
                    "site {site} collides with a fixed action column"
                )));
            }
            if !seen.insert(site.as_str()) {
                return Err(ConfigError::InvalidSites(format!("duplicate site {site}")));
            }
        }
        Ok(Self {
            sites,
            unknown_policy,
        })
    }

    pub fn contains(&self, site_id: &str) -> bool {
        self.sites.iter().any(|s| s == site_id)
    }

    pub fn position(&self, site_id: &str) -> Option<usize> {
        self.sites.iter().position(|s| s == site_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.sites.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.sites.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sites.is_empty()
    }

    pub fn unknown_policy(&self) -> UnknownSitePolicy {
        self.unknown_policy
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry(ids: &[&str]) -> Result<SiteRegistry, ConfigError> {
        SiteRegistry::new(
            ids.iter().map(|s| s.to_string()).collect(),
            UnknownSitePolicy::Reject,
        )
    }

    #[test]
    fn keeps_declared_order() {
        let reg = registry(&["Zeta", "Alpha", "Mid"]).unwrap();
        assert_eq!(reg.iter().collect::<Vec<_>>(), vec!["Zeta", "Alpha", "Mid"]);
        assert_eq!(reg.position("Alpha"), Some(1));
        assert!(reg.contains("Mid"));
        assert!(!reg.contains("mid"));
    }

    #[test]
    fn rejects_blank_and_duplicate_ids() {
        assert!(registry(&["A", ""]).is_err());
        assert!(registry(&["A", " B"]).is_err());
        assert!(registry(&["A", "B", "A"]).is_err());
    }

    #[test]
    fn rejects_names_of_fixed_action_columns() {
        for reserved in RESERVED_SITE_NAMES {
            let err = registry(&["SiteA", reserved]).unwrap_err();
            assert!(matches!(err, ConfigError::InvalidSites(_)), "{reserved}");
        }
        assert!(registry(&["Timestamp", "action_id_site"]).is_ok());
    }

    #[test]
    fn empty_registry_is_allowed() {
        let reg = registry(&[]).unwrap();
        assert!(reg.is_empty());
    }
}
