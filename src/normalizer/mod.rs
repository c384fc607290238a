//! Normalizer: raw heterogeneous alert payloads into canonical [`Alert`]s.
//!
//! Absorbs data-quality problems in the input instead of failing: a missing
//! or mistyped field resolves to its documented default, list fields are
//! coerced (scalar → singleton, null → empty), and unparsable dates become
//! [`PublishedDate::Unknown`]. This is the only path that creates alerts.

pub mod coerce;
pub mod date;
pub mod table;

pub use table::{AlertTable, Column, ALERT_COLUMNS};

use uuid::Uuid;

use crate::models::{Alert, RawRecord, DEFAULT_SEVERITY};

use self::coerce::{non_blank_text, string_list, text_or_empty};

/// Namespace for ids derived from source coordinates when a payload has none.
const DERIVED_ID_NAMESPACE: Uuid = Uuid::NAMESPACE_URL;

/// Normalize one raw payload. Never fails.
pub fn normalize(raw: &RawRecord) -> Alert {
    let title = text_or_empty(raw.get("title"));
    let source_url = text_or_empty(raw.get("source_url"));
    let source_name = text_or_empty(raw.get("source_name"));

    // Source parsers emit the body as `content`; `summary` wins when present.
    let summary = non_blank_text(raw.get("summary"))
        .or_else(|| non_blank_text(raw.get("content")))
        .unwrap_or_default();

    let alert_id = match non_blank_text(raw.get("alert_id")) {
        Some(id) => id.trim().to_string(),
        None => derive_alert_id(&source_name, &source_url, &title).unwrap_or_default(),
    };

    Alert {
        alert_id,
        date_published: date::parse_published(raw.get("date_published")),
        severity: non_blank_text(raw.get("severity"))
            .unwrap_or_else(|| DEFAULT_SEVERITY.to_string()),
        summary,
        affected_products: string_list(raw.get("affected_products")),
        recommendations: string_list(raw.get("recommendations")),
        title,
        source_url,
        source_name,
        raw_data: raw.clone(),
    }
}

/// Normalize a batch, preserving input order.
pub fn normalize_all(raws: &[RawRecord]) -> AlertTable {
    let table: AlertTable = raws.iter().map(normalize).collect();
    let unidentified = table.iter().filter(|a| a.alert_id.is_empty()).count();
    tracing::debug!(
        records = table.len(),
        unidentified,
        "Normalized alert batch"
    );
    table
}

/// Stable id for payloads without `alert_id`: UUID v5 over the source
/// coordinates, so re-ingesting the same item yields the same key.
/// `None` when there is nothing to derive from.
pub fn derive_alert_id(source_name: &str, source_url: &str, title: &str) -> Option<String> {
    if source_url.trim().is_empty() && title.trim().is_empty() {
        return None;
    }
    let key = format!("{}\n{}\n{}", source_name.trim(), source_url.trim(), title.trim());
    Some(format!(
        "derived-{}",
        Uuid::new_v5(&DERIVED_ID_NAMESPACE, key.as_bytes())
    ))
}
