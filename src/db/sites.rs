//! Action aggregator: turns a free-form per-site submission into a fully
//! populated, validated set of counts.
//!
//! Policy:
//! - every registered site is present, defaulting to 0;
//! - unregistered site ids are rejected, or dropped when the registry is
//!   configured with [`UnknownSitePolicy::Ignore`];
//! - counts are integers ≥ 0; negative values are an error, never clamped.
//!
//! Validation covers the whole submission before anything is returned, so a
//! failed call never leads to a partial write.

use std::collections::BTreeMap;

use serde_json::Value;

use super::{SerializationError, ValidationError};
use crate::models::{SiteCount, SiteCounts, SiteRegistry, UnknownSitePolicy};

pub fn materialize_site_counts(
    registry: &SiteRegistry,
    submitted: &BTreeMap<String, i64>,
) -> Result<SiteCounts, ValidationError> {
    for (site_id, &count) in submitted {
        if !registry.contains(site_id) {
            match registry.unknown_policy() {
                UnknownSitePolicy::Reject => {
                    return Err(ValidationError::UnknownSite(site_id.clone()));
                }
                UnknownSitePolicy::Ignore => {
                    tracing::warn!(site_id = %site_id, "Ignoring count for unregistered site");
                    continue;
                }
            }
        }
        if count < 0 {
            return Err(ValidationError::NegativeCount {
                site_id: site_id.clone(),
                count,
            });
        }
        if u32::try_from(count).is_err() {
            return Err(ValidationError::CountOutOfRange {
                site_id: site_id.clone(),
                count,
            });
        }
    }

    let entries = registry
        .iter()
        .map(|site_id| SiteCount {
            site_id: site_id.to_string(),
            patients: submitted
                .get(site_id)
                .and_then(|&c| u32::try_from(c).ok())
                .unwrap_or(0),
        })
        .collect();
    Ok(SiteCounts::new(entries))
}

/// Rebuild counts read back from storage in registry order.
///
/// Registered sites absent from the stored pairs read as 0, which keeps
/// actions recorded before a site was registered readable. Stored pairs
/// for sites no longer registered are left out of the projection.
pub fn project_stored_counts<I>(registry: &SiteRegistry, stored: I) -> SiteCounts
where
    I: IntoIterator<Item = (String, u32)>,
{
    let mut by_site: BTreeMap<String, u32> = BTreeMap::new();
    for (site_id, patients) in stored {
        if registry.contains(&site_id) {
            by_site.insert(site_id, patients);
        } else {
            tracing::debug!(site_id = %site_id, "Stored count for unregistered site left out");
        }
    }
    SiteCounts::new(
        registry
            .iter()
            .map(|site_id| SiteCount {
                site_id: site_id.to_string(),
                patients: by_site.get(site_id).copied().unwrap_or(0),
            })
            .collect(),
    )
}

/// JSON object form used by the hosted backend's `site_counts` column.
pub fn counts_to_json(counts: &SiteCounts) -> Value {
    Value::Object(
        counts
            .iter()
            .map(|c| (c.site_id.clone(), Value::from(c.patients)))
            .collect(),
    )
}

/// Strict decode of the hosted `site_counts` column: an object whose values
/// are non-negative integers that fit a `u32`.
pub fn counts_from_json(
    record: &str,
    value: &Value,
) -> Result<Vec<(String, u32)>, SerializationError> {
    let map = match value {
        Value::Object(map) => map,
        Value::Null => return Ok(Vec::new()),
        _ => {
            return Err(SerializationError::new(
                record,
                "site_counts",
                "expected JSON object",
            ))
        }
    };
    map.iter()
        .map(|(site_id, v)| {
            v.as_u64()
                .and_then(|n| u32::try_from(n).ok())
                .map(|n| (site_id.clone(), n))
                .ok_or_else(|| {
                    SerializationError::new(
                        record,
                        "site_counts",
                        format!("count for {site_id} is not a non-negative integer"),
                    )
                })
        })
        .collect()
}
